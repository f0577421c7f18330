//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::RetryPolicy;

/// How the schema router picks among several active connections serving the
/// same namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// The earliest registered connection wins.
    #[default]
    FirstRegistered,
    /// The connection with the latest `updated_at` wins; registration order
    /// breaks exact ties.
    MostRecentlyUpdated,
}

/// Logical namespaces the domain operations read from and write to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Users and players (academy operations).
    pub primary: String,
    /// Payments and invoices.
    pub financial: String,
    /// Cross-application shared records.
    pub shared: String,
    /// Destination of audit entries.
    pub audit: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            primary: "academies".to_string(),
            financial: "financial".to_string(),
            shared: "shared".to_string(),
            audit: "shared".to_string(),
        }
    }
}

/// Top-level engine configuration.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Connection used to build fallback clients for namespaces with no
    /// connection of their own.
    pub default_connection: String,
    pub namespaces: NamespaceConfig,
    pub tie_break: TieBreakPolicy,
    /// Table read by the connection-test capability probe.
    pub probe_table: String,
    /// Timeout for the connection-test probe and health check, in milliseconds.
    pub health_check_timeout_ms: u64,
    pub retry: RetryPolicy,
    /// Maximum number of dead letters kept; the oldest are evicted first.
    pub dead_letter_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_connection: "default".to_string(),
            namespaces: NamespaceConfig::default(),
            tie_break: TieBreakPolicy::default(),
            probe_table: "system_settings".to_string(),
            health_check_timeout_ms: 5_000,
            retry: RetryPolicy::default(),
            dead_letter_capacity: 256,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    /// Parses a JSON config document.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed JSON or mistyped fields.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Reads and parses a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_json_str(&raw)?)
    }
}
