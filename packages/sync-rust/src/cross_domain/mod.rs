//! Concurrent fan-out of namespace-keyed queries.
//!
//! Each query runs against the client its namespace resolves to. A failing
//! or panicking query only affects its own entry in the result; a namespace
//! that resolves to no client is left out.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::error::panic_message;
use crate::registry::ClientHandle;
use crate::router::SchemaRouter;

mod probe;

pub use probe::{ConnectionTarget, ConnectionTestResult, ConnectionTester, HealthProbe, TestFailure};

/// A query to run against one namespace's client.
pub type QueryFn = Box<dyn FnOnce(Arc<ClientHandle>) -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

/// Boxes an async closure as a [`QueryFn`].
pub fn query<F, Fut>(f: F) -> QueryFn
where
    F: FnOnce(Arc<ClientHandle>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Box::new(move |client| Box::pin(f(client)))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one namespace's query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceResult {
    Data(Value),
    Error(String),
}

impl NamespaceResult {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Per-namespace outcomes, ordered by namespace name.
///
/// Serializes as `{"<namespace>": {"data": ...} | {"error": "..."}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CrossDomainResult(BTreeMap<String, NamespaceResult>);

impl CrossDomainResult {
    #[must_use]
    pub fn get(&self, namespace: &str) -> Option<&NamespaceResult> {
        self.0.get(namespace)
    }

    /// Data returned for `namespace`, if its query succeeded.
    #[must_use]
    pub fn data(&self, namespace: &str) -> Option<&Value> {
        match self.0.get(namespace) {
            Some(NamespaceResult::Data(value)) => Some(value),
            _ => None,
        }
    }

    /// Error message for `namespace`, if its query failed.
    #[must_use]
    pub fn error(&self, namespace: &str) -> Option<&str> {
        match self.0.get(namespace) {
            Some(NamespaceResult::Error(message)) => Some(message),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, namespace: &str) -> bool {
        self.0.contains_key(namespace)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NamespaceResult)> {
        self.0.iter()
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, NamespaceResult> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// CrossDomainQuery
// ---------------------------------------------------------------------------

/// Runs namespace-keyed queries concurrently.
pub struct CrossDomainQuery {
    router: Arc<SchemaRouter>,
}

impl CrossDomainQuery {
    pub fn new(router: Arc<SchemaRouter>) -> Self {
        Self { router }
    }

    /// Resolves each namespace and runs its query; never fails as a whole.
    ///
    /// Sub-queries run concurrently within the caller's task. If the same
    /// namespace appears twice, the later entry wins.
    pub async fn run(&self, queries: Vec<(String, QueryFn)>) -> CrossDomainResult {
        let tasks = queries.into_iter().map(|(namespace, f)| async move {
            let Some(client) = self.router.resolve(&namespace).await else {
                tracing::debug!(namespace = %namespace, "namespace unavailable, omitted");
                return None;
            };
            // Calling `f` inside the guarded future also catches panics raised
            // before the query's first await.
            let outcome = AssertUnwindSafe(async move { f(client).await })
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(Ok(value)) => NamespaceResult::Data(value),
                Ok(Err(err)) => {
                    tracing::warn!(namespace = %namespace, error = %err, "cross-domain query failed");
                    NamespaceResult::Error(format!("{err:#}"))
                }
                Err(panic) => {
                    let message = format!("query panicked: {}", panic_message(panic.as_ref()));
                    tracing::warn!(namespace = %namespace, panic = %message, "cross-domain query panicked");
                    NamespaceResult::Error(message)
                }
            };
            Some((namespace, result))
        });

        let map = join_all(tasks).await.into_iter().flatten().collect();
        CrossDomainResult(map)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use fieldhouse_core::{ConnectionConfig, Row, SystemClock};
    use serde_json::json;

    use super::*;
    use crate::backend::MemoryClientFactory;
    use crate::config::TieBreakPolicy;
    use crate::registry::ConnectionRegistry;
    use crate::secrets::MemorySecretStore;

    async fn setup() -> (CrossDomainQuery, Arc<MemoryClientFactory>) {
        let factory = Arc::new(MemoryClientFactory::new());
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::clone(&factory) as Arc<dyn crate::backend::ClientFactory>,
            Arc::new(MemorySecretStore::new()),
            Arc::new(SystemClock),
        ));
        registry
            .register("a", ConnectionConfig::new("A", "https://a"))
            .await
            .unwrap();
        registry
            .register("b", ConnectionConfig::new("B", "https://b"))
            .await
            .unwrap();
        let router = Arc::new(SchemaRouter::new(registry, "default", TieBreakPolicy::default()));
        (CrossDomainQuery::new(router), factory)
    }

    fn count_users() -> QueryFn {
        query(|client| async move {
            let rows = client.from("users").execute().await?;
            Ok(json!({ "count": rows.len() }))
        })
    }

    #[tokio::test]
    async fn failure_is_isolated_per_namespace() {
        let (fanout, factory) = setup().await;
        factory.backend("https://a").fail_table("A", "users", "boom");
        let row: Row = json!({"id": "u1"}).as_object().cloned().unwrap();
        factory.backend("https://b").seed("B", "users", vec![row]);

        let result = fanout
            .run(vec![
                ("A".to_string(), count_users()),
                ("B".to_string(), count_users()),
            ])
            .await;

        assert!(result.error("A").unwrap().contains("boom"));
        assert_eq!(result.data("B"), Some(&json!({"count": 1})));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "A": {"error": result.error("A").unwrap()},
                "B": {"data": {"count": 1}}
            })
        );
    }

    fn explode() -> anyhow::Result<Value> {
        panic!("exploded")
    }

    #[tokio::test]
    async fn panics_are_captured() {
        let (fanout, _) = setup().await;
        let result = fanout
            .run(vec![
                ("A".to_string(), query(|_client| async move { explode() })),
                ("B".to_string(), count_users()),
            ])
            .await;
        assert_eq!(result.error("A"), Some("query panicked: exploded"));
        assert_eq!(result.data("B"), Some(&json!({"count": 0})));
    }

    #[tokio::test]
    async fn synchronous_panic_in_query_fn_is_captured() {
        let (fanout, _) = setup().await;
        let boxed: QueryFn = Box::new(
            |_client: Arc<ClientHandle>| -> BoxFuture<'static, anyhow::Result<Value>> {
                panic!("before future")
            },
        );
        let result = fanout.run(vec![("A".to_string(), boxed)]).await;
        assert!(result.get("A").unwrap().is_error());
    }

    #[tokio::test]
    async fn unresolved_namespace_is_omitted() {
        let (fanout, _) = setup().await;
        let result = fanout
            .run(vec![
                ("A".to_string(), count_users()),
                ("nowhere".to_string(), count_users()),
            ])
            .await;
        assert_eq!(result.len(), 1);
        assert!(!result.contains("nowhere"));
    }

    #[tokio::test]
    async fn empty_input_yields_empty_result() {
        let (fanout, _) = setup().await;
        assert!(fanout.run(Vec::new()).await.is_empty());
    }
}
