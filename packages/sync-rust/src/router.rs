//! Namespace-to-client resolution.
//!
//! A namespace is served by the first active connection registered for it
//! (or the most recently updated one, depending on [`TieBreakPolicy`]). With
//! none, the router builds an uncached fallback handle from the default
//! connection with the namespace substituted.

use std::sync::Arc;

use fieldhouse_core::{Connection, ConnectionStatus};

use crate::config::TieBreakPolicy;
use crate::registry::{ClientHandle, ConnectionRegistry};

/// Resolves logical namespaces to client handles.
pub struct SchemaRouter {
    registry: Arc<ConnectionRegistry>,
    default_connection: String,
    tie_break: TieBreakPolicy,
}

impl SchemaRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        default_connection: impl Into<String>,
        tie_break: TieBreakPolicy,
    ) -> Self {
        Self {
            registry,
            default_connection: default_connection.into(),
            tie_break,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn default_connection(&self) -> &str {
        &self.default_connection
    }

    /// The connection that serves `namespace` directly, if any.
    ///
    /// Inactive connections are skipped.
    #[must_use]
    pub fn primary(&self, namespace: &str) -> Option<Connection> {
        let mut candidates = self
            .registry
            .connections()
            .into_iter()
            .filter(|c| c.namespace == namespace && c.status != ConnectionStatus::Inactive);
        match self.tie_break {
            TieBreakPolicy::FirstRegistered => candidates.next(),
            // Earliest registration wins on equal timestamps.
            TieBreakPolicy::MostRecentlyUpdated => {
                candidates.reduce(|best, c| if c.updated_at > best.updated_at { c } else { best })
            }
        }
    }

    /// The client for `namespace`, or `None` when neither a matching
    /// connection nor the default connection is usable.
    pub async fn resolve(&self, namespace: &str) -> Option<Arc<ClientHandle>> {
        if let Some(connection) = self.primary(namespace) {
            match self.registry.client_for(&connection.name).await {
                Ok(handle) => return Some(handle),
                Err(err) => {
                    tracing::warn!(
                        namespace,
                        connection = %connection.name,
                        error = %err,
                        "primary connection unusable, trying fallback"
                    );
                }
            }
        }
        self.fallback(namespace).await
    }

    async fn fallback(&self, namespace: &str) -> Option<Arc<ClientHandle>> {
        let Some(default) = self.registry.connection(&self.default_connection) else {
            tracing::debug!(namespace, "no connection and no default connection");
            return None;
        };
        match self
            .registry
            .build_handle(&default.with_namespace(namespace), true)
            .await
        {
            Ok(handle) => {
                tracing::debug!(
                    namespace,
                    connection = %default.name,
                    "using fallback client"
                );
                Some(Arc::new(handle))
            }
            Err(err) => {
                tracing::warn!(namespace, error = %err, "fallback client unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use fieldhouse_core::{Clock, ConnectionConfig, SystemClock};
    use parking_lot::Mutex;

    use super::*;
    use crate::backend::MemoryClientFactory;
    use crate::secrets::MemorySecretStore;

    fn registry() -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(
            Arc::new(MemoryClientFactory::new()),
            Arc::new(MemorySecretStore::new()),
            Arc::new(SystemClock),
        ))
    }

    fn router(registry: &Arc<ConnectionRegistry>) -> SchemaRouter {
        SchemaRouter::new(Arc::clone(registry), "default", TieBreakPolicy::default())
    }

    #[tokio::test]
    async fn single_connection_serves_its_namespace() {
        let registry = registry();
        registry
            .register("c1", ConnectionConfig::new("academies", "https://x"))
            .await
            .unwrap();
        let handle = router(&registry).resolve("academies").await.unwrap();
        assert_eq!(handle.url(), "https://x");
        assert_eq!(handle.connection_name(), "c1");
        assert!(!handle.is_fallback());
    }

    #[tokio::test]
    async fn first_registered_wins() {
        let registry = registry();
        registry
            .register("c1", ConnectionConfig::new("academies", "https://one"))
            .await
            .unwrap();
        registry
            .register("c2", ConnectionConfig::new("academies", "https://two"))
            .await
            .unwrap();
        let handle = router(&registry).resolve("academies").await.unwrap();
        assert_eq!(handle.connection_name(), "c1");
    }

    #[tokio::test]
    async fn inactive_connections_are_skipped() {
        let registry = registry();
        registry
            .register(
                "c1",
                ConnectionConfig::new("academies", "https://one")
                    .with_status(ConnectionStatus::Inactive),
            )
            .await
            .unwrap();
        registry
            .register("c2", ConnectionConfig::new("academies", "https://two"))
            .await
            .unwrap();
        let handle = router(&registry).resolve("academies").await.unwrap();
        assert_eq!(handle.connection_name(), "c2");
    }

    #[tokio::test]
    async fn fallback_uses_default_with_namespace_substituted() {
        let registry = registry();
        registry
            .register("default", ConnectionConfig::new("shared", "https://d"))
            .await
            .unwrap();
        let router = router(&registry);

        let handle = router.resolve("financial").await.unwrap();
        assert!(handle.is_fallback());
        assert_eq!(handle.namespace(), "financial");
        assert_eq!(handle.url(), "https://d");

        // Not cached: the registry's handle for "default" is untouched.
        assert_eq!(registry.cached("default").unwrap().namespace(), "shared");
        let again = router.resolve("financial").await.unwrap();
        assert!(!Arc::ptr_eq(&handle, &again));
    }

    #[tokio::test]
    async fn no_match_and_no_default_is_none() {
        let registry = registry();
        registry
            .register("c1", ConnectionConfig::new("academies", "https://x"))
            .await
            .unwrap();
        assert!(router(&registry).resolve("financial").await.is_none());
    }

    struct SteppingClock(Mutex<chrono::DateTime<Utc>>);

    impl Clock for SteppingClock {
        fn now(&self) -> chrono::DateTime<Utc> {
            let mut now = self.0.lock();
            *now += Duration::seconds(1);
            *now
        }
    }

    #[tokio::test]
    async fn most_recently_updated_policy() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(MemoryClientFactory::new()),
            Arc::new(MemorySecretStore::new()),
            Arc::new(SteppingClock(Mutex::new(start))),
        ));
        for name in ["c1", "c2", "c3"] {
            registry
                .register(name, ConnectionConfig::new("academies", format!("https://{name}")))
                .await
                .unwrap();
        }
        // Touch c2 so it is the newest.
        registry
            .register("c2", ConnectionConfig::new("academies", "https://c2b"))
            .await
            .unwrap();

        let router = SchemaRouter::new(
            Arc::clone(&registry),
            "default",
            TieBreakPolicy::MostRecentlyUpdated,
        );
        assert_eq!(router.primary("academies").unwrap().name, "c2");
        assert_eq!(
            SchemaRouter::new(registry, "default", TieBreakPolicy::FirstRegistered)
                .primary("academies")
                .unwrap()
                .name,
            "c1"
        );
    }

    #[tokio::test]
    async fn unusable_primary_falls_back() {
        let registry = registry();
        registry
            .register("default", ConnectionConfig::new("shared", "https://d"))
            .await
            .unwrap();
        registry
            .register(
                "vaulted",
                ConnectionConfig::new("financial", "https://f").with_secret_ref("missing"),
            )
            .await
            .unwrap();
        let handle = router(&registry).resolve("financial").await.unwrap();
        assert!(handle.is_fallback());
    }
}
