//! Administrative write-through over the registry.
//!
//! [`ConnectionAdmin`] loads persisted connections into a
//! [`ConnectionRegistry`] at startup and mirrors every create, update, and
//! delete into the [`ConnectionStore`], reporting the outcome through a
//! [`Notifier`].

use std::sync::Arc;

use dashmap::DashMap;
use fieldhouse_core::{
    Clock, Connection, ConnectionConfig, CredentialInput, CredentialRef, Secret, SystemSetting,
};
use serde_json::Value;

use super::ConnectionRegistry;
use crate::error::SyncError;
use crate::notify::Notifier;
use crate::store::ConnectionStore;

/// Persistent connection and settings management.
pub struct ConnectionAdmin {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn ConnectionStore>,
    notifier: Arc<dyn Notifier>,
    settings: DashMap<String, SystemSetting>,
    clock: Arc<dyn Clock>,
}

impl ConnectionAdmin {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn ConnectionStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            notifier,
            settings: DashMap::new(),
            clock,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Loads every stored connection into the registry, then the settings.
    ///
    /// Connections that cannot be restored are skipped with a warning.
    /// Returns the number of connections loaded.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the store cannot be read.
    pub async fn load(&self) -> Result<usize, SyncError> {
        let connections = self.store.load_connections().await?;
        let mut loaded = 0;
        for connection in connections {
            let name = connection.name.clone();
            match self.registry.restore(connection).await {
                Ok(()) => loaded += 1,
                Err(err) => {
                    tracing::warn!(connection = %name, error = %err, "skipping stored connection");
                }
            }
        }

        for setting in self.store.load_settings().await? {
            self.settings.insert(setting.key.clone(), setting);
        }

        tracing::info!(
            connections = loaded,
            settings = self.settings.len(),
            "connection store loaded"
        );
        Ok(loaded)
    }

    /// Registers (or replaces) a connection and persists it.
    ///
    /// When the store write fails the registry entry and the owned secret
    /// are put back the way they were. With a null store nothing is
    /// persisted and only failures are notified.
    ///
    /// # Errors
    ///
    /// Returns the registration error, or [`SyncError::Store`] when the
    /// write-through fails.
    pub async fn save_connection(
        &self,
        name: &str,
        config: ConnectionConfig,
    ) -> Result<Connection, SyncError> {
        let existed = self.registry.contains(name);
        let result = self.save_inner(name, config).await;

        match &result {
            Ok(_) if self.store.is_null() => {}
            Ok(_) => {
                let title = if existed {
                    "Connection updated"
                } else {
                    "Connection created"
                };
                self.notifier.success(title, name);
            }
            Err(err) => self
                .notifier
                .failure("Failed to save connection", &err.to_string()),
        }
        result
    }

    async fn save_inner(
        &self,
        name: &str,
        config: ConnectionConfig,
    ) -> Result<Connection, SyncError> {
        if self.store.is_null() {
            let connection = self.registry.register(name, config).await?;
            tracing::debug!(connection = %name, "null connection store, save not persisted");
            return Ok(connection);
        }

        let owned = CredentialRef::for_connection(name);
        let previous = self.registry.connection(name);
        let touches_secret = matches!(config.credentials, Some(CredentialInput::ApiKey(_)))
            || previous.as_ref().and_then(|c| c.credentials.as_ref()) == Some(&owned);
        let previous_secret = if touches_secret {
            Some(self.registry.secrets().get(&owned).await?)
        } else {
            None
        };

        let connection = self.registry.register(name, config).await?;
        if let Err(err) = self.store.save_connection(&connection).await {
            self.roll_back(name, previous, previous_secret).await;
            return Err(err.into());
        }
        Ok(connection)
    }

    /// Undoes a registration whose write-through failed.
    ///
    /// `previous_secret` is `Some` when the registration could have written
    /// or deleted the owned secret, holding its value from before.
    async fn roll_back(
        &self,
        name: &str,
        previous: Option<Connection>,
        previous_secret: Option<Option<Secret>>,
    ) {
        if previous.is_none() {
            self.registry.remove(name).await;
        }

        if let Some(previous_secret) = previous_secret {
            let owned = CredentialRef::for_connection(name);
            let secrets = self.registry.secrets();
            let reverted = match previous_secret {
                Some(secret) => secrets.put(&owned, secret).await,
                None => secrets.delete(&owned).await,
            };
            if let Err(err) = reverted {
                tracing::warn!(
                    connection = %name,
                    error = %err,
                    "failed to revert connection secret"
                );
            }
        }

        if let Some(connection) = previous {
            if let Err(err) = self.registry.restore(connection).await {
                tracing::warn!(connection = %name, error = %err, "failed to revert connection");
            }
        }
        tracing::debug!(connection = %name, "registration rolled back");
    }

    /// Deletes a connection from the store and the registry.
    ///
    /// A credential the registry wrote for this connection is removed from
    /// the secret store too; shared secret references are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConnectionNotFound`] for an unknown name, or the
    /// store error when the delete cannot be persisted.
    pub async fn delete_connection(&self, name: &str) -> Result<Connection, SyncError> {
        let result = self.delete_inner(name).await;
        match &result {
            Ok(_) if self.store.is_null() => {}
            Ok(_) => self.notifier.success("Connection deleted", name),
            Err(err) => self
                .notifier
                .failure("Failed to delete connection", &err.to_string()),
        }
        result
    }

    async fn delete_inner(&self, name: &str) -> Result<Connection, SyncError> {
        if !self.registry.contains(name) {
            return Err(SyncError::ConnectionNotFound(name.to_string()));
        }
        if !self.store.is_null() {
            self.store.delete_connection(name).await?;
        }
        self.registry
            .remove(name)
            .await
            .ok_or_else(|| SyncError::ConnectionNotFound(name.to_string()))
    }

    #[must_use]
    pub fn setting(&self, key: &str) -> Option<SystemSetting> {
        self.settings.get(key).map(|s| s.value().clone())
    }

    /// All settings, sorted by key.
    #[must_use]
    pub fn settings(&self) -> Vec<SystemSetting> {
        let mut settings: Vec<SystemSetting> =
            self.settings.iter().map(|s| s.value().clone()).collect();
        settings.sort_by(|a, b| a.key.cmp(&b.key));
        settings
    }

    /// Stores a setting and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when the write-through fails; the
    /// in-memory value is left unchanged in that case.
    pub async fn set_setting(
        &self,
        key: &str,
        value: Value,
        description: Option<String>,
    ) -> Result<SystemSetting, SyncError> {
        let setting = SystemSetting {
            key: key.to_string(),
            value,
            description,
            updated_at: self.clock.now(),
        };
        if !self.store.is_null() {
            self.store.save_setting(&setting).await?;
        }
        self.settings.insert(setting.key.clone(), setting.clone());
        Ok(setting)
    }
}
