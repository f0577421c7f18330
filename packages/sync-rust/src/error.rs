//! Error taxonomy for the sync engine.

use fieldhouse_core::ConnectionError;

use crate::secrets::SecretStoreError;
use crate::store::StoreError;

/// Failure of a single backend call (one select or one mutation).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("authentication rejected by backend: {0}")]
    Unauthorized(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Whether the backend refused the credentials.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Errors surfaced by registry, router, and domain operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),
    #[error("no client available for namespace {0}")]
    NamespaceUnavailable(String),
    #[error("record {id} not found in namespace {namespace}")]
    SourceNotFound { namespace: String, id: String },
    #[error("player {player_id} has no primary parent")]
    PrimaryParentNotFound { player_id: String },
    #[error("authentication failed for connection {connection}: {message}")]
    AuthenticationFailure { connection: String, message: String },
    #[error("backend call failed on {namespace}.{table}: {source}")]
    BackendCall {
        namespace: String,
        table: String,
        #[source]
        source: BackendError,
    },
    #[error("failed to build client for connection {connection}: {source}")]
    ClientBuild {
        connection: String,
        #[source]
        source: BackendError,
    },
    #[error("invalid connection {name}: {source}")]
    InvalidConnection {
        name: String,
        #[source]
        source: ConnectionError,
    },
    #[error("malformed record in {table}: {message}")]
    MalformedRecord { table: String, message: String },
    #[error("secret store error: {0}")]
    Secret(#[from] SecretStoreError),
    #[error("connection store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Wraps a backend failure with the namespace and table it happened on.
    pub fn backend(namespace: &str, table: &str, source: BackendError) -> Self {
        Self::BackendCall {
            namespace: namespace.to_string(),
            table: table.to_string(),
            source,
        }
    }

    pub(crate) fn invalid(name: &str, source: ConnectionError) -> Self {
        Self::InvalidConnection {
            name: name.to_string(),
            source,
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
