//! Backend client seam.
//!
//! The engine never speaks a wire protocol itself. It asks a [`ClientFactory`]
//! for a [`BackendClient`] bound to one URL, credential, and namespace, and
//! drives it with [`TableQuery`] reads and [`Mutation`] writes.
//!
//! Implementations:
//! - [`MemoryBackend`]: in-process tables, for tests and local development
//! - [`RestBackend`]: PostgREST-compatible HTTP API via `reqwest`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fieldhouse_core::{Connection, Mutation, Row, Secret, TableQuery};

use crate::error::BackendError;

mod memory;
mod rest;

pub use memory::{MemoryBackend, MemoryClientFactory};
pub use rest::{RestBackend, RestClientFactory};

/// Options forwarded to [`ClientFactory::create_client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Namespace (database schema) the client reads and writes.
    pub namespace: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum idle connections kept per host.
    pub pool_size: u32,
    /// Whether plain-HTTP URLs should be refused.
    pub tls_enabled: bool,
    /// Data API base when it differs from the connection URL.
    pub data_url: Option<String>,
}

impl ClientOptions {
    /// Options derived from a connection's settings.
    #[must_use]
    pub fn for_connection(connection: &Connection) -> Self {
        Self {
            namespace: connection.namespace.clone(),
            timeout: Duration::from_secs(connection.options.timeout_seconds),
            pool_size: connection.options.pool_size,
            tls_enabled: connection.options.tls_enabled,
            data_url: connection.endpoints.data.clone(),
        }
    }
}

/// A live client for one backend partition.
///
/// Used as `Arc<dyn BackendClient>`.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Run a read and return the matching rows.
    async fn select(&self, query: &TableQuery) -> Result<Vec<Row>, BackendError>;

    /// Apply a write and return the affected rows as stored.
    async fn mutate(&self, mutation: &Mutation) -> Result<Vec<Row>, BackendError>;
}

/// Builds backend clients.
pub trait ClientFactory: Send + Sync {
    /// Creates a client for `url`, authenticating with `credentials` when given.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the client cannot be constructed (for
    /// example, an invalid URL or TLS requirement violation).
    fn create_client(
        &self,
        url: &str,
        credentials: Option<&Secret>,
        options: &ClientOptions,
    ) -> Result<Arc<dyn BackendClient>, BackendError>;
}
