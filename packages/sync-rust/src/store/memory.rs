//! Process-local [`ConnectionStore`].

use async_trait::async_trait;
use fieldhouse_core::{Connection, SystemSetting};
use parking_lot::RwLock;

use super::{ConnectionStore, StoreError};

/// Keeps connections and settings in memory, preserving insertion order.
#[derive(Default)]
pub struct MemoryConnectionStore {
    connections: RwLock<Vec<Connection>>,
    settings: RwLock<Vec<SystemSetting>>,
}

impl MemoryConnectionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `connections`.
    #[must_use]
    pub fn with_connections(connections: Vec<Connection>) -> Self {
        Self {
            connections: RwLock::new(connections),
            settings: RwLock::default(),
        }
    }

    /// Snapshot of a stored connection.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Connection> {
        self.connections
            .read()
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn load_connections(&self) -> Result<Vec<Connection>, StoreError> {
        Ok(self.connections.read().clone())
    }

    async fn save_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        let mut connections = self.connections.write();
        match connections.iter_mut().find(|c| c.name == connection.name) {
            Some(existing) => *existing = connection.clone(),
            None => connections.push(connection.clone()),
        }
        Ok(())
    }

    async fn delete_connection(&self, name: &str) -> Result<(), StoreError> {
        self.connections.write().retain(|c| c.name != name);
        Ok(())
    }

    async fn load_settings(&self) -> Result<Vec<SystemSetting>, StoreError> {
        Ok(self.settings.read().clone())
    }

    async fn save_setting(&self, setting: &SystemSetting) -> Result<(), StoreError> {
        let mut settings = self.settings.write();
        match settings.iter_mut().find(|s| s.key == setting.key) {
            Some(existing) => *existing = setting.clone(),
            None => settings.push(setting.clone()),
        }
        Ok(())
    }
}
