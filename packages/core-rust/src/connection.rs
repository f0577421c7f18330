//! Backend connection descriptions.
//!
//! A [`Connection`] names one backend partition and says how to reach it. It
//! never holds a plaintext secret: credentials are a [`CredentialRef`] into a
//! secret store. Plaintext only travels inbound, inside [`ConnectionConfig`],
//! and is moved into the secret store at registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::secret::Secret;

/// Lifecycle status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Serving traffic.
    #[default]
    Active,
    /// Configured but excluded from namespace routing.
    Inactive,
    /// Being verified by an administrator.
    Testing,
}

impl ConnectionStatus {
    /// Returns the status as a lowercase string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Testing => "testing",
        }
    }
}

/// Optional per-connection endpoint URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEndpoints {
    /// Reachability probe, hit with a plain GET by connection testing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<String>,
    /// Authentication endpoint (informational; auth is out of scope).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Data API base, when it differs from the connection URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Transport options forwarded to the client factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Whether TLS is required.
    pub tls_enabled: bool,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Maximum idle connections kept per host.
    pub pool_size: u32,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            tls_enabled: true,
            timeout_seconds: 30,
            pool_size: 10,
        }
    }
}

/// Reference to a credential held by a secret store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialRef(pub String);

impl CredentialRef {
    /// The store key a registry assigns to a plaintext credential supplied
    /// for connection `name`.
    #[must_use]
    pub fn for_connection(name: &str) -> Self {
        Self(format!("connections/{name}/api_key"))
    }

    /// Returns the secret-store key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.0
    }
}

/// Credential as supplied by a caller registering a connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialInput {
    /// Plaintext key; moved into the secret store on registration.
    ApiKey(Secret),
    /// Key already present in the secret store.
    SecretRef(CredentialRef),
}

impl CredentialInput {
    fn is_blank(&self) -> bool {
        match self {
            Self::ApiKey(secret) => secret.is_blank(),
            Self::SecretRef(reference) => reference.key().trim().is_empty(),
        }
    }
}

/// Registration input for a connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    /// Logical domain served by this connection.
    pub namespace: String,
    /// Backend base URL.
    pub url: String,
    /// Connection-level credential; anonymous when absent.
    #[serde(default)]
    pub credentials: Option<CredentialInput>,
    #[serde(default)]
    pub endpoints: ConnectionEndpoints,
    #[serde(default, rename = "config")]
    pub options: ConnectionOptions,
    #[serde(default)]
    pub status: ConnectionStatus,
}

impl ConnectionConfig {
    /// Minimal config: namespace and URL, anonymous, active.
    pub fn new(namespace: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            url: url.into(),
            credentials: None,
            endpoints: ConnectionEndpoints::default(),
            options: ConnectionOptions::default(),
            status: ConnectionStatus::Active,
        }
    }

    /// Builder-style setter for a plaintext API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.credentials = Some(CredentialInput::ApiKey(Secret::new(key)));
        self
    }

    /// Builder-style setter for a secret-store reference.
    #[must_use]
    pub fn with_secret_ref(mut self, key: impl Into<String>) -> Self {
        self.credentials = Some(CredentialInput::SecretRef(CredentialRef(key.into())));
        self
    }

    /// Builder-style setter for the health-check endpoint.
    #[must_use]
    pub fn with_health_check(mut self, url: impl Into<String>) -> Self {
        self.endpoints.health_check = Some(url.into());
        self
    }

    /// Builder-style setter for the status.
    #[must_use]
    pub fn with_status(mut self, status: ConnectionStatus) -> Self {
        self.status = status;
        self
    }

    /// Checks the required fields for a connection named `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] naming the first invalid field.
    pub fn validate(&self, name: &str) -> Result<(), ConnectionError> {
        if name.trim().is_empty() {
            return Err(ConnectionError::MissingField("name"));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConnectionError::MissingField("namespace"));
        }
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ConnectionError::MissingField("url"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConnectionError::InvalidUrl {
                url: url.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        if self.credentials.as_ref().is_some_and(CredentialInput::is_blank) {
            return Err(ConnectionError::EmptyCredential);
        }
        Ok(())
    }
}

/// A registered connection. Safe to persist and list: holds no secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub name: String,
    pub namespace: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialRef>,
    #[serde(default)]
    pub endpoints: ConnectionEndpoints,
    #[serde(default, rename = "config")]
    pub options: ConnectionOptions,
    #[serde(default)]
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Copy of this connection serving `namespace` instead.
    #[must_use]
    pub fn with_namespace(&self, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..self.clone()
        }
    }
}

/// Listing view of a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSummary {
    pub name: String,
    pub namespace: String,
    pub url: String,
    pub status: ConnectionStatus,
    pub endpoints: ConnectionEndpoints,
    #[serde(rename = "config")]
    pub options: ConnectionOptions,
    /// Whether a credential reference is configured.
    pub has_credentials: bool,
    /// Whether a client handle is currently cached.
    pub has_client: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionSummary {
    /// Builds the listing view of `connection`.
    #[must_use]
    pub fn new(connection: &Connection, has_client: bool) -> Self {
        Self {
            name: connection.name.clone(),
            namespace: connection.namespace.clone(),
            url: connection.url.clone(),
            status: connection.status,
            endpoints: connection.endpoints.clone(),
            options: connection.options,
            has_credentials: connection.credentials.is_some(),
            has_client,
            created_at: connection.created_at,
            updated_at: connection.updated_at,
        }
    }
}

/// Validation failures for connection configs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("credential must not be empty")]
    EmptyCredential,
}
