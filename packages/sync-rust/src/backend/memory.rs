//! In-memory [`BackendClient`] implementation backed by [`DashMap`].
//!
//! One [`MemoryBackend`] stands in for one backend server: it holds tables
//! for every namespace (schema) reachable through that server's URL.
//! Clients created for different namespaces on the same URL share it, which
//! mirrors how a fallback client with an overridden namespace reaches the
//! default server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use fieldhouse_core::{Mutation, Row, Secret, TableQuery};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::{BackendClient, ClientFactory, ClientOptions};
use crate::error::BackendError;

type TableKey = (String, String);

/// In-process backend server with per-namespace tables.
///
/// Unknown tables read as empty. Every `mutate` call is recorded per
/// namespace, including calls that fail, so tests can assert that a
/// namespace received no writes at all.
#[derive(Default)]
pub struct MemoryBackend {
    tables: DashMap<TableKey, Vec<Row>>,
    writes: DashMap<String, Vec<Mutation>>,
    failing: DashMap<TableKey, String>,
    required_key: RwLock<Option<String>>,
    reads: AtomicUsize,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires clients to present `key`; others get `Unauthorized`.
    pub fn require_key(&self, key: impl Into<String>) {
        *self.required_key.write() = Some(key.into());
    }

    /// Seeds rows without recording them as writes.
    pub fn seed(&self, namespace: &str, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .entry((namespace.to_string(), table.to_string()))
            .or_default()
            .extend(rows);
    }

    /// Makes every call touching `namespace.table` fail with a 500.
    pub fn fail_table(&self, namespace: &str, table: &str, message: impl Into<String>) {
        self.failing
            .insert((namespace.to_string(), table.to_string()), message.into());
    }

    /// Snapshot of a table's rows.
    #[must_use]
    pub fn rows(&self, namespace: &str, table: &str) -> Vec<Row> {
        self.tables
            .get(&(namespace.to_string(), table.to_string()))
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    /// Mutations received for `namespace`, in arrival order.
    #[must_use]
    pub fn writes(&self, namespace: &str) -> Vec<Mutation> {
        self.writes
            .get(namespace)
            .map(|w| w.value().clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn write_count(&self, namespace: &str) -> usize {
        self.writes.get(namespace).map_or(0, |w| w.len())
    }

    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn authorize(&self, presented: Option<&str>) -> Result<(), BackendError> {
        match self.required_key.read().as_deref() {
            Some(required) if presented != Some(required) => {
                Err(BackendError::Unauthorized("invalid api key".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn check_failing(&self, namespace: &str, table: &str) -> Result<(), BackendError> {
        match self.failing.get(&(namespace.to_string(), table.to_string())) {
            Some(message) => Err(BackendError::Status {
                status: 500,
                message: message.value().clone(),
            }),
            None => Ok(()),
        }
    }

    fn select_rows(&self, namespace: &str, query: &TableQuery) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .tables
            .get(&(namespace.to_string(), query.table.clone()))
            .map(|rows| {
                rows.value()
                    .iter()
                    .filter(|row| query.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        query.sort(&mut rows);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows.iter().map(|row| query.project(row)).collect()
    }

    fn apply(&self, namespace: &str, mutation: &Mutation) -> Vec<Row> {
        let key = (namespace.to_string(), mutation.table().to_string());
        let mut table = self.tables.entry(key).or_default();
        match mutation {
            Mutation::Insert { rows, .. } => {
                let inserted: Vec<Row> = rows
                    .iter()
                    .map(|row| {
                        let mut row = row.clone();
                        row.entry("id")
                            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
                        row
                    })
                    .collect();
                table.extend(inserted.iter().cloned());
                inserted
            }
            Mutation::Update { filters, patch, .. } => {
                let matcher = filter_query(mutation.table(), filters);
                let mut updated = Vec::new();
                for row in table.iter_mut().filter(|row| matcher.matches(row)) {
                    for (column, value) in patch {
                        row.insert(column.clone(), value.clone());
                    }
                    updated.push(row.clone());
                }
                updated
            }
            Mutation::Delete { filters, .. } => {
                let matcher = filter_query(mutation.table(), filters);
                let (removed, kept): (Vec<Row>, Vec<Row>) =
                    table.drain(..).partition(|row| matcher.matches(row));
                *table = kept;
                removed
            }
        }
    }
}

fn filter_query(table: &str, filters: &[fieldhouse_core::Filter]) -> TableQuery {
    TableQuery {
        filters: filters.to_vec(),
        ..TableQuery::new(table)
    }
}

/// Client view of a [`MemoryBackend`] for one namespace.
struct MemoryClient {
    backend: Arc<MemoryBackend>,
    namespace: String,
    api_key: Option<String>,
}

#[async_trait]
impl BackendClient for MemoryClient {
    async fn select(&self, query: &TableQuery) -> Result<Vec<Row>, BackendError> {
        self.backend.reads.fetch_add(1, Ordering::Relaxed);
        self.backend.authorize(self.api_key.as_deref())?;
        self.backend.check_failing(&self.namespace, &query.table)?;
        Ok(self.backend.select_rows(&self.namespace, query))
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<Vec<Row>, BackendError> {
        self.backend
            .writes
            .entry(self.namespace.clone())
            .or_default()
            .push(mutation.clone());
        self.backend.authorize(self.api_key.as_deref())?;
        self.backend.check_failing(&self.namespace, mutation.table())?;
        Ok(self.backend.apply(&self.namespace, mutation))
    }
}

/// Factory handing out [`MemoryBackend`] clients, one backend per URL.
#[derive(Default)]
pub struct MemoryClientFactory {
    backends: DashMap<String, Arc<MemoryBackend>>,
    created: AtomicUsize,
}

impl MemoryClientFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend serving `url`, created on first use.
    pub fn backend(&self, url: &str) -> Arc<MemoryBackend> {
        Arc::clone(
            self.backends
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(MemoryBackend::new()))
                .value(),
        )
    }

    /// Number of clients created so far.
    #[must_use]
    pub fn clients_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl ClientFactory for MemoryClientFactory {
    fn create_client(
        &self,
        url: &str,
        credentials: Option<&Secret>,
        options: &ClientOptions,
    ) -> Result<Arc<dyn BackendClient>, BackendError> {
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryClient {
            backend: self.backend(url),
            namespace: options.namespace.clone(),
            api_key: credentials.map(|s| s.expose().to_string()),
        }))
    }
}
