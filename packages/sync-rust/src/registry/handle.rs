//! Client handles: a backend client bound to one connection's URL,
//! credential, and namespace.

use std::fmt;
use std::sync::Arc;

use fieldhouse_core::{Connection, FilterOp, Mutation, Row, TableQuery};
use serde::Serialize;
use serde_json::Value;

use crate::backend::BackendClient;
use crate::error::BackendError;

/// Public view of a handle's configuration. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientConfigView {
    pub name: String,
    pub namespace: String,
    pub url: String,
    pub has_credentials: bool,
    /// Whether the handle was built from the default connection for a
    /// namespace with no connection of its own.
    pub fallback: bool,
}

/// A live client for one connection.
///
/// Created by the registry; cached until its connection is replaced or
/// removed. Fallback handles built by the router are never cached.
pub struct ClientHandle {
    connection_name: String,
    namespace: String,
    url: String,
    credential_fingerprint: Option<String>,
    fallback: bool,
    client: Arc<dyn BackendClient>,
}

impl ClientHandle {
    pub(crate) fn new(
        connection: &Connection,
        credential_fingerprint: Option<String>,
        fallback: bool,
        client: Arc<dyn BackendClient>,
    ) -> Self {
        Self {
            connection_name: connection.name.clone(),
            namespace: connection.namespace.clone(),
            url: connection.url.clone(),
            credential_fingerprint,
            fallback,
            client,
        }
    }

    #[must_use]
    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Short hash of the bound credential, if any.
    #[must_use]
    pub fn credential_fingerprint(&self) -> Option<&str> {
        self.credential_fingerprint.as_deref()
    }

    #[must_use]
    pub fn config(&self) -> ClientConfigView {
        ClientConfigView {
            name: self.connection_name.clone(),
            namespace: self.namespace.clone(),
            url: self.url.clone(),
            has_credentials: self.credential_fingerprint.is_some(),
            fallback: self.fallback,
        }
    }

    /// Starts a query or write against `table`.
    #[must_use]
    pub fn from(&self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder {
            client: self.client.as_ref(),
            query: TableQuery::new(table),
        }
    }

    /// Runs a prepared read.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub async fn select(&self, query: &TableQuery) -> Result<Vec<Row>, BackendError> {
        self.client.select(query).await
    }

    /// Applies a prepared write.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub async fn mutate(&self, mutation: &Mutation) -> Result<Vec<Row>, BackendError> {
        self.client.mutate(mutation).await
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("connection_name", &self.connection_name)
            .field("namespace", &self.namespace)
            .field("url", &self.url)
            .field(
                "credentials",
                &self.credential_fingerprint.as_ref().map(|_| "[REDACTED]"),
            )
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Fluent query surface: `handle.from("users").select("id").eq("id", x).single()`.
pub struct QueryBuilder<'a> {
    client: &'a dyn BackendClient,
    query: TableQuery,
}

impl QueryBuilder<'_> {
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        self.query = self.query.select(columns);
        self
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.query = self.query.eq(column, value);
        self
    }

    #[must_use]
    pub fn neq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.query = self.query.neq(column, value);
        self
    }

    #[must_use]
    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.query = self.query.gte(column, value);
        self
    }

    #[must_use]
    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.query = self.query.lte(column, value);
        self
    }

    #[must_use]
    pub fn lt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.query = self.query.lt(column, value);
        self
    }

    #[must_use]
    pub fn filter(mut self, column: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.query = self.query.filter(column, op, value);
        self
    }

    #[must_use]
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.query = self.query.order(column, ascending);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.query = self.query.limit(n);
        self
    }

    /// The query built so far.
    #[must_use]
    pub fn query(&self) -> &TableQuery {
        &self.query
    }

    /// All matching rows.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub async fn execute(self) -> Result<Vec<Row>, BackendError> {
        self.client.select(&self.query).await
    }

    /// Exactly one row; `NotFound` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] for an empty result, otherwise
    /// propagates the backend's error.
    pub async fn single(self) -> Result<Row, BackendError> {
        let table = self.query.table.clone();
        self.maybe_single()
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("no matching row in {table}")))
    }

    /// The first matching row, if any.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub async fn maybe_single(mut self) -> Result<Option<Row>, BackendError> {
        self.query.limit = Some(1);
        Ok(self.client.select(&self.query).await?.into_iter().next())
    }

    /// Inserts `rows` and returns them as stored.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub async fn insert(self, rows: Vec<Row>) -> Result<Vec<Row>, BackendError> {
        self.client
            .mutate(&Mutation::Insert {
                table: self.query.table,
                rows,
            })
            .await
    }

    /// Applies `patch` to every row matching the filters.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub async fn update(self, patch: Row) -> Result<Vec<Row>, BackendError> {
        self.client
            .mutate(&Mutation::Update {
                table: self.query.table,
                filters: self.query.filters,
                patch,
            })
            .await
    }

    /// Deletes every row matching the filters.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Rejected`] when no filter is set, otherwise
    /// propagates the backend's error.
    pub async fn delete(self) -> Result<Vec<Row>, BackendError> {
        if self.query.filters.is_empty() {
            return Err(BackendError::Rejected(format!(
                "refusing unfiltered delete on {}",
                self.query.table
            )));
        }
        self.client
            .mutate(&Mutation::Delete {
                table: self.query.table,
                filters: self.query.filters,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fieldhouse_core::{ConnectionEndpoints, ConnectionOptions, ConnectionStatus, Secret};
    use serde_json::json;

    use super::*;
    use crate::backend::{ClientFactory, ClientOptions, MemoryClientFactory};

    fn connection() -> Connection {
        let now = Utc::now();
        Connection {
            name: "c1".to_string(),
            namespace: "academies".to_string(),
            url: "https://x".to_string(),
            credentials: None,
            endpoints: ConnectionEndpoints::default(),
            options: ConnectionOptions::default(),
            status: ConnectionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn handle(factory: &MemoryClientFactory, secret: Option<&Secret>) -> ClientHandle {
        let conn = connection();
        let client = factory
            .create_client(&conn.url, secret, &ClientOptions::for_connection(&conn))
            .unwrap();
        ClientHandle::new(&conn, secret.map(Secret::fingerprint), false, client)
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn debug_and_config_never_show_secret() {
        let factory = MemoryClientFactory::new();
        let secret = Secret::new("super-secret-key");
        let handle = handle(&factory, Some(&secret));

        let debug = format!("{handle:?}");
        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("[REDACTED]"));

        let view = serde_json::to_string(&handle.config()).unwrap();
        assert!(!view.contains("super-secret-key"));
        assert!(handle.config().has_credentials);
        assert_eq!(handle.credential_fingerprint(), Some(secret.fingerprint().as_str()));
    }

    #[tokio::test]
    async fn builder_reads_filtered_rows() {
        let factory = MemoryClientFactory::new();
        factory.backend("https://x").seed(
            "academies",
            "players",
            vec![
                row(json!({"id": "p1", "academy_id": "a1", "full_name": "Ana"})),
                row(json!({"id": "p2", "academy_id": "a2", "full_name": "Ben"})),
            ],
        );
        let handle = handle(&factory, None);

        let rows = handle
            .from("players")
            .select("id")
            .eq("academy_id", "a2")
            .execute()
            .await
            .unwrap();
        assert_eq!(rows, vec![row(json!({"id": "p2"}))]);

        let single = handle.from("players").eq("id", "p1").single().await.unwrap();
        assert_eq!(single["full_name"], "Ana");

        let missing = handle.from("players").eq("id", "zz").single().await;
        assert!(matches!(missing, Err(BackendError::NotFound(_))));
        assert!(handle
            .from("players")
            .eq("id", "zz")
            .maybe_single()
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn builder_writes() {
        let factory = MemoryClientFactory::new();
        let handle = handle(&factory, None);

        let inserted = handle
            .from("payments")
            .insert(vec![row(json!({"amount": 10, "status": "pending"}))])
            .await
            .unwrap();
        let id = inserted[0]["id"].clone();

        let updated = handle
            .from("payments")
            .eq("id", id.clone())
            .update(row(json!({"status": "completed"})))
            .await
            .unwrap();
        assert_eq!(updated[0]["status"], "completed");

        let deleted = handle.from("payments").eq("id", id).delete().await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert!(factory.backend("https://x").rows("academies", "payments").is_empty());
    }

    #[tokio::test]
    async fn unfiltered_delete_is_refused() {
        let factory = MemoryClientFactory::new();
        let handle = handle(&factory, None);
        let result = handle.from("payments").delete().await;
        assert!(matches!(result, Err(BackendError::Rejected(_))));
        assert_eq!(factory.backend("https://x").write_count("academies"), 0);
    }
}
