//! Persistence for connection configs and system settings.
//!
//! Defines [`ConnectionStore`], the external store behind the
//! `database_connections` and `system_settings` tables. Connections are read
//! at startup and written on every administrative mutation (see
//! [`ConnectionAdmin`](crate::registry::ConnectionAdmin)).
//!
//! Implementations:
//! - [`NullConnectionStore`]: discards writes, reads nothing
//! - [`MemoryConnectionStore`]: process-local, for tests
//! - [`JsonFileConnectionStore`]: a JSON document on disk, used by the CLI

use async_trait::async_trait;
use fieldhouse_core::{Connection, SystemSetting};

mod json_file;
mod memory;
mod null;

pub use json_file::{JsonFileConnectionStore, StoreDocument};
pub use memory::MemoryConnectionStore;
pub use null::NullConnectionStore;

/// Errors raised by a connection store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store document is malformed: {0}")]
    Format(#[from] serde_json::Error),
    #[error("store backend failed: {0}")]
    Backend(String),
}

/// External persistence for connection configs and settings.
///
/// Used as `Arc<dyn ConnectionStore>`.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// All stored connections, in stored order.
    async fn load_connections(&self) -> Result<Vec<Connection>, StoreError>;

    /// Insert or replace the connection with the same name.
    async fn save_connection(&self, connection: &Connection) -> Result<(), StoreError>;

    /// Delete a connection by name. Deleting an absent name succeeds.
    async fn delete_connection(&self, name: &str) -> Result<(), StoreError>;

    /// All stored settings.
    async fn load_settings(&self) -> Result<Vec<SystemSetting>, StoreError>;

    /// Insert or replace the setting with the same key.
    async fn save_setting(&self, setting: &SystemSetting) -> Result<(), StoreError>;

    /// Whether this is a null (no-op) implementation.
    ///
    /// Returns `false` by default. Null implementations override to return `true`.
    fn is_null(&self) -> bool {
        false
    }
}
