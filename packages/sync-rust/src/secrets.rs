//! Secret stores: where connection credentials actually live.
//!
//! Connections only carry a [`CredentialRef`]; the registry dereferences it
//! through a [`SecretStore`] when it builds a client handle.

use async_trait::async_trait;
use dashmap::DashMap;
use fieldhouse_core::{CredentialRef, Secret};

/// Errors raised by a secret store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretStoreError {
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
}

/// Pluggable secret storage.
///
/// Used as `Arc<dyn SecretStore>`.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Look up a secret. `Ok(None)` means the key is not set.
    async fn get(&self, reference: &CredentialRef) -> Result<Option<Secret>, SecretStoreError>;

    /// Store or overwrite a secret.
    async fn put(&self, reference: &CredentialRef, secret: Secret) -> Result<(), SecretStoreError>;

    /// Remove a secret. Removing an absent key succeeds.
    async fn delete(&self, reference: &CredentialRef) -> Result<(), SecretStoreError>;
}

/// Process-local secret store.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: DashMap<String, Secret>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored secrets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, reference: &CredentialRef) -> Result<Option<Secret>, SecretStoreError> {
        Ok(self.secrets.get(reference.key()).map(|s| s.value().clone()))
    }

    async fn put(&self, reference: &CredentialRef, secret: Secret) -> Result<(), SecretStoreError> {
        self.secrets.insert(reference.key().to_string(), secret);
        Ok(())
    }

    async fn delete(&self, reference: &CredentialRef) -> Result<(), SecretStoreError> {
        self.secrets.remove(reference.key());
        Ok(())
    }
}

/// Reads secrets from environment variables, with an in-memory overlay for
/// secrets supplied at runtime.
///
/// Key `connections/main/api_key` maps to `FIELDHOUSE_CONNECTIONS_MAIN_API_KEY`
/// with the default prefix. Overlay entries shadow the environment.
pub struct EnvSecretStore {
    prefix: String,
    overlay: DashMap<String, Secret>,
}

impl EnvSecretStore {
    /// Store reading `FIELDHOUSE_*` variables.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix("FIELDHOUSE")
    }

    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            overlay: DashMap::new(),
        }
    }

    /// Environment variable consulted for `reference`.
    #[must_use]
    pub fn variable_name(&self, reference: &CredentialRef) -> String {
        let suffix: String = reference
            .key()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{suffix}", self.prefix)
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get(&self, reference: &CredentialRef) -> Result<Option<Secret>, SecretStoreError> {
        if let Some(secret) = self.overlay.get(reference.key()) {
            return Ok(Some(secret.value().clone()));
        }
        Ok(std::env::var(self.variable_name(reference))
            .ok()
            .filter(|v| !v.is_empty())
            .map(Secret::new))
    }

    async fn put(&self, reference: &CredentialRef, secret: Secret) -> Result<(), SecretStoreError> {
        self.overlay.insert(reference.key().to_string(), secret);
        Ok(())
    }

    async fn delete(&self, reference: &CredentialRef) -> Result<(), SecretStoreError> {
        self.overlay.remove(reference.key());
        Ok(())
    }
}
