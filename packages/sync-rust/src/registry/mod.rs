//! Named backend connections and their cached client handles.
//!
//! The registry keeps connections in registration order (the order the schema
//! router scans) and at most one cached [`ClientHandle`] per connection.
//! Plaintext credentials supplied at registration are moved into the
//! [`SecretStore`]; connections only keep a [`CredentialRef`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use fieldhouse_core::{
    Clock, Connection, ConnectionConfig, ConnectionError, ConnectionSummary, CredentialInput,
    CredentialRef, Secret,
};
use parking_lot::RwLock;
use reqwest::Url;

use crate::backend::{ClientFactory, ClientOptions};
use crate::error::SyncError;
use crate::secrets::SecretStore;

mod admin;
mod handle;

pub use admin::ConnectionAdmin;
pub use handle::{ClientConfigView, ClientHandle, QueryBuilder};

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

struct Entry {
    connection: Connection,
    client: Option<Arc<ClientHandle>>,
    /// Bumped on every replacement so a lazily built handle for a stale
    /// connection is never cached.
    generation: u64,
}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

/// Thread-safe registry of named connections.
///
/// Uses `DashMap` for concurrent lookup plus an ordered name list for
/// deterministic scans. Never holds a map guard across an `.await`.
pub struct ConnectionRegistry {
    entries: DashMap<String, Entry>,
    order: RwLock<Vec<String>>,
    secrets: Arc<dyn SecretStore>,
    factory: Arc<dyn ClientFactory>,
    clock: Arc<dyn Clock>,
    generation: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        secrets: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            order: RwLock::new(Vec::new()),
            secrets,
            factory,
            clock,
            generation: AtomicU64::new(0),
        }
    }

    /// Registers or replaces the connection `name`.
    ///
    /// A plaintext API key is written to the secret store under
    /// [`CredentialRef::for_connection`]. When credentials resolve (or none
    /// are configured) the client handle is built immediately. No backend
    /// call is made. Replacing a name keeps its position and `created_at`
    /// and drops the previous handle. A key the registry stored for the
    /// previous credentials is deleted when the new credentials differ.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConnection`] for a config that fails
    /// validation, or [`SyncError::Secret`] if the key cannot be stored.
    pub async fn register(
        &self,
        name: &str,
        config: ConnectionConfig,
    ) -> Result<Connection, SyncError> {
        validate(name, &config)?;

        let credentials = match config.credentials {
            None => None,
            Some(CredentialInput::ApiKey(secret)) => {
                let reference = CredentialRef::for_connection(name);
                self.secrets.put(&reference, secret).await?;
                Some(reference)
            }
            Some(CredentialInput::SecretRef(reference)) => Some(reference),
        };

        let now = self.clock.now();
        let (created_at, previous_credentials) =
            self.entries.get(name).map_or((now, None), |entry| {
                (entry.connection.created_at, entry.connection.credentials.clone())
            });

        let connection = Connection {
            name: name.to_string(),
            namespace: config.namespace.trim().to_string(),
            url: config.url.trim().to_string(),
            credentials,
            endpoints: config.endpoints,
            options: config.options,
            status: config.status,
            created_at,
            updated_at: now,
        };

        let client = self.try_build(&connection).await;
        let replaced = self.store_entry(connection.clone(), client);
        if previous_credentials != connection.credentials {
            self.release_owned_secret(name, previous_credentials.as_ref())
                .await;
        }

        tracing::info!(
            connection = %connection.name,
            namespace = %connection.namespace,
            status = connection.status.as_str(),
            replaced,
            "connection registered"
        );
        Ok(connection)
    }

    /// Re-inserts a previously persisted connection as-is.
    ///
    /// Used when loading from a [`ConnectionStore`](crate::store::ConnectionStore);
    /// timestamps are kept and no secret is written.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConnection`] when the stored URL is unusable.
    pub async fn restore(&self, connection: Connection) -> Result<(), SyncError> {
        parse_url(&connection.name, &connection.url)?;
        let client = self.try_build(&connection).await;
        self.store_entry(connection, client);
        Ok(())
    }

    /// The handle for `name`, building and caching it if needed.
    ///
    /// Returns `None` for an unknown name or when the handle cannot be built
    /// (for example, the credential is missing from the secret store).
    pub async fn get(&self, name: &str) -> Option<Arc<ClientHandle>> {
        match self.client_for(name).await {
            Ok(handle) => Some(handle),
            Err(SyncError::ConnectionNotFound(_)) => None,
            Err(err) => {
                tracing::warn!(connection = %name, error = %err, "client handle unavailable");
                None
            }
        }
    }

    /// Like [`get`](Self::get) but reports why no handle is available.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConnectionNotFound`] for an unknown name, or the
    /// error raised while resolving credentials or building the client.
    pub async fn client_for(&self, name: &str) -> Result<Arc<ClientHandle>, SyncError> {
        let (connection, generation) = {
            let entry = self
                .entries
                .get(name)
                .ok_or_else(|| SyncError::ConnectionNotFound(name.to_string()))?;
            if let Some(client) = &entry.client {
                return Ok(Arc::clone(client));
            }
            (entry.connection.clone(), entry.generation)
        };

        let built = Arc::new(self.build_handle(&connection, false).await?);

        if let Some(mut entry) = self.entries.get_mut(name) {
            if entry.generation == generation {
                return Ok(Arc::clone(entry.client.get_or_insert_with(|| built)));
            }
        }
        Ok(built)
    }

    /// The cached handle for `name`, without building one.
    #[must_use]
    pub fn cached(&self, name: &str) -> Option<Arc<ClientHandle>> {
        self.entries
            .get(name)
            .and_then(|entry| entry.client.clone())
    }

    /// Removes `name` and its handle, returning the removed connection.
    ///
    /// A credential the registry wrote for this connection is deleted from
    /// the secret store; shared secret references are left alone. A failed
    /// secret delete is logged and does not keep the connection registered.
    pub async fn remove(&self, name: &str) -> Option<Connection> {
        let connection = {
            let mut order = self.order.write();
            let (_, entry) = self.entries.remove(name)?;
            order.retain(|n| n != name);
            entry.connection
        };
        self.release_owned_secret(name, connection.credentials.as_ref())
            .await;
        tracing::info!(connection = %name, "connection removed");
        Some(connection)
    }

    /// All connections in registration order, without secrets.
    #[must_use]
    pub fn list(&self) -> Vec<ConnectionSummary> {
        self.names()
            .iter()
            .filter_map(|name| {
                self.entries
                    .get(name)
                    .map(|entry| ConnectionSummary::new(&entry.connection, entry.client.is_some()))
            })
            .collect()
    }

    #[must_use]
    pub fn connection(&self, name: &str) -> Option<Connection> {
        self.entries.get(name).map(|entry| entry.connection.clone())
    }

    /// All connections in registration order.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection> {
        self.names()
            .iter()
            .filter_map(|name| self.connection(name))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.secrets
    }

    /// Builds an uncached handle for `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AuthenticationFailure`] when the referenced
    /// credential is not in the secret store, [`SyncError::Secret`] when the
    /// store fails, or [`SyncError::ClientBuild`] when the factory refuses.
    pub async fn build_handle(
        &self,
        connection: &Connection,
        fallback: bool,
    ) -> Result<ClientHandle, SyncError> {
        let secret = match &connection.credentials {
            None => None,
            Some(reference) => Some(self.secrets.get(reference).await?.ok_or_else(|| {
                SyncError::AuthenticationFailure {
                    connection: connection.name.clone(),
                    message: format!("credential {} is not in the secret store", reference.key()),
                }
            })?),
        };
        self.handle_with_secret(connection, secret, fallback)
    }

    /// Builds a throwaway handle for a config that is not registered.
    ///
    /// Nothing is stored: a plaintext key is used directly and never written
    /// to the secret store.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register) validation, plus the errors of
    /// [`build_handle`](Self::build_handle).
    pub async fn handle_for_config(
        &self,
        name: &str,
        config: &ConnectionConfig,
    ) -> Result<ClientHandle, SyncError> {
        validate(name, config)?;
        let now = self.clock.now();
        let mut connection = Connection {
            name: name.to_string(),
            namespace: config.namespace.trim().to_string(),
            url: config.url.trim().to_string(),
            credentials: None,
            endpoints: config.endpoints.clone(),
            options: config.options,
            status: config.status,
            created_at: now,
            updated_at: now,
        };
        match &config.credentials {
            None => self.handle_with_secret(&connection, None, false),
            Some(CredentialInput::ApiKey(secret)) => {
                self.handle_with_secret(&connection, Some(secret.clone()), false)
            }
            Some(CredentialInput::SecretRef(reference)) => {
                connection.credentials = Some(reference.clone());
                self.build_handle(&connection, false).await
            }
        }
    }

    fn handle_with_secret(
        &self,
        connection: &Connection,
        secret: Option<Secret>,
        fallback: bool,
    ) -> Result<ClientHandle, SyncError> {
        let client = self
            .factory
            .create_client(
                &connection.url,
                secret.as_ref(),
                &ClientOptions::for_connection(connection),
            )
            .map_err(|source| SyncError::ClientBuild {
                connection: connection.name.clone(),
                source,
            })?;
        Ok(ClientHandle::new(
            connection,
            secret.as_ref().map(Secret::fingerprint),
            fallback,
            client,
        ))
    }

    /// Eager build at registration. Failures leave the handle to be built
    /// lazily on first use.
    async fn try_build(&self, connection: &Connection) -> Option<Arc<ClientHandle>> {
        match self.build_handle(connection, false).await {
            Ok(handle) => Some(Arc::new(handle)),
            Err(err) => {
                tracing::debug!(
                    connection = %connection.name,
                    error = %err,
                    "deferring client handle creation"
                );
                None
            }
        }
    }

    /// Inserts or replaces an entry. Returns whether a previous entry existed.
    fn store_entry(&self, connection: Connection, client: Option<Arc<ClientHandle>>) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let name = connection.name.clone();
        let mut order = self.order.write();
        let previous = self.entries.insert(
            name.clone(),
            Entry {
                connection,
                client,
                generation,
            },
        );
        if previous.is_none() {
            order.push(name);
        }
        previous.is_some()
    }

    /// Deletes the registry-owned secret of `name` when `credentials` points at it.
    async fn release_owned_secret(&self, name: &str, credentials: Option<&CredentialRef>) {
        let owned = CredentialRef::for_connection(name);
        if credentials != Some(&owned) {
            return;
        }
        if let Err(err) = self.secrets.delete(&owned).await {
            tracing::warn!(connection = %name, error = %err, "failed to delete connection secret");
        }
    }

    fn names(&self) -> Vec<String> {
        self.order.read().clone()
    }
}

fn validate(name: &str, config: &ConnectionConfig) -> Result<(), SyncError> {
    config
        .validate(name)
        .map_err(|err| SyncError::invalid(name, err))?;
    parse_url(name, config.url.trim())
}

fn parse_url(name: &str, url: &str) -> Result<(), SyncError> {
    Url::parse(url).map(|_| ()).map_err(|err| {
        SyncError::invalid(
            name,
            ConnectionError::InvalidUrl {
                url: url.to_string(),
                reason: err.to_string(),
            },
        )
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
