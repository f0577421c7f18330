//! [`ConnectionStore`] backed by a single JSON document on disk.
//!
//! Document shape:
//!
//! ```json
//! { "database_connections": [ ... ], "system_settings": [ ... ] }
//! ```
//!
//! A missing file reads as an empty document. Every write rewrites the whole
//! file through a temporary sibling and a rename.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fieldhouse_core::{Connection, SystemSetting};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{ConnectionStore, StoreError};

/// On-disk document.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub database_connections: Vec<Connection>,
    #[serde(default)]
    pub system_settings: Vec<SystemSetting>,
}

/// JSON file store used by the CLI.
pub struct JsonFileConnectionStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileConnectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StoreDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(StoreDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(StoreDocument::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_document(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn modify<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreDocument) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        f(&mut document);
        self.write_document(&document).await
    }
}

#[async_trait]
impl ConnectionStore for JsonFileConnectionStore {
    async fn load_connections(&self) -> Result<Vec<Connection>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.database_connections)
    }

    async fn save_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        let connection = connection.clone();
        self.modify(move |doc| {
            match doc
                .database_connections
                .iter_mut()
                .find(|c| c.name == connection.name)
            {
                Some(existing) => *existing = connection,
                None => doc.database_connections.push(connection),
            }
        })
        .await
    }

    async fn delete_connection(&self, name: &str) -> Result<(), StoreError> {
        self.modify(|doc| doc.database_connections.retain(|c| c.name != name))
            .await
    }

    async fn load_settings(&self) -> Result<Vec<SystemSetting>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.system_settings)
    }

    async fn save_setting(&self, setting: &SystemSetting) -> Result<(), StoreError> {
        let setting = setting.clone();
        self.modify(move |doc| {
            match doc.system_settings.iter_mut().find(|s| s.key == setting.key) {
                Some(existing) => *existing = setting,
                None => doc.system_settings.push(setting),
            }
        })
        .await
    }
}
