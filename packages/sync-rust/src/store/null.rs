//! No-op [`ConnectionStore`] implementation.
//!
//! [`NullConnectionStore`] discards all writes and returns empty results for
//! reads. It is the default when connections are registered in code and do
//! not need to survive a restart.

use async_trait::async_trait;
use fieldhouse_core::{Connection, SystemSetting};

use super::{ConnectionStore, StoreError};

/// No-op `ConnectionStore` for tests and ephemeral registries.
pub struct NullConnectionStore;

#[async_trait]
impl ConnectionStore for NullConnectionStore {
    async fn load_connections(&self) -> Result<Vec<Connection>, StoreError> {
        Ok(Vec::new())
    }

    async fn save_connection(&self, _connection: &Connection) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete_connection(&self, _name: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load_settings(&self) -> Result<Vec<SystemSetting>, StoreError> {
        Ok(Vec::new())
    }

    async fn save_setting(&self, _setting: &SystemSetting) -> Result<(), StoreError> {
        Ok(())
    }

    fn is_null(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fieldhouse_core::{ConnectionEndpoints, ConnectionOptions, ConnectionStatus};

    use super::*;

    #[tokio::test]
    async fn writes_are_discarded() {
        let store = NullConnectionStore;
        let now = Utc::now();
        let connection = Connection {
            name: "c1".to_string(),
            namespace: "academies".to_string(),
            url: "https://x".to_string(),
            credentials: None,
            endpoints: ConnectionEndpoints::default(),
            options: ConnectionOptions::default(),
            status: ConnectionStatus::Active,
            created_at: now,
            updated_at: now,
        };
        store.save_connection(&connection).await.unwrap();
        assert!(store.load_connections().await.unwrap().is_empty());
        assert!(store.delete_connection("c1").await.is_ok());
    }

    #[tokio::test]
    async fn settings_read_empty() {
        let store = NullConnectionStore;
        assert!(store.load_settings().await.unwrap().is_empty());
    }

    #[test]
    fn is_null_returns_true() {
        assert!(NullConnectionStore.is_null());
    }
}
