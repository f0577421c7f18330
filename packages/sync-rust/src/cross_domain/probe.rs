//! Connection testing.
//!
//! A test builds a throwaway client, runs a minimal capability probe
//! (`select id limit 1` on the probe table) and, when the connection has a
//! health-check endpoint, a plain GET against it. Both steps share one
//! timeout, enforced with `tokio::time::timeout`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fieldhouse_core::{ConnectionConfig, ConnectionEndpoints};
use serde::Serialize;

use crate::error::{BackendError, SyncError};
use crate::registry::{ClientHandle, ConnectionRegistry};

/// What to test: a registered connection or an unsaved config.
#[derive(Debug, Clone)]
pub enum ConnectionTarget {
    Name(String),
    Config {
        name: String,
        config: ConnectionConfig,
    },
}

impl ConnectionTarget {
    fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Config { name, .. } => name,
        }
    }
}

impl From<&str> for ConnectionTarget {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Why a connection test failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestFailure {
    UnknownConnection,
    InvalidConfig,
    Authentication,
    Unreachable,
    Timeout,
    HealthCheck,
}

/// Result of the health-check GET.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthProbe {
    pub url: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Outcome of a connection test. Produced for every target; testing never
/// returns an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTestResult {
    pub connection: String,
    pub success: bool,
    pub message: String,
    /// Whether the backend accepted the credentials.
    pub auth_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthProbe>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<TestFailure>,
}

impl ConnectionTestResult {
    fn failed(connection: &str, failure: TestFailure, message: String, started: Instant) -> Self {
        Self {
            connection: connection.to_string(),
            success: false,
            message,
            auth_ok: false,
            health: None,
            latency_ms: elapsed_ms(started),
            failure: Some(failure),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// ConnectionTester
// ---------------------------------------------------------------------------

/// Tests connections without touching the registry's cached handles.
pub struct ConnectionTester {
    registry: Arc<ConnectionRegistry>,
    http: reqwest::Client,
    probe_table: String,
    timeout: Duration,
}

impl ConnectionTester {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        probe_table: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            http: reqwest::Client::new(),
            probe_table: probe_table.into(),
            timeout,
        }
    }

    /// Runs the probe and the health check against `target`.
    pub async fn test(&self, target: ConnectionTarget) -> ConnectionTestResult {
        let started = Instant::now();
        let name = target.name().to_string();

        let (handle, endpoints) = match self.prepare(target).await {
            Ok(prepared) => prepared,
            Err((failure, message)) => {
                tracing::info!(connection = %name, ?failure, "connection test failed");
                return ConnectionTestResult::failed(&name, failure, message, started);
            }
        };

        let probe = tokio::time::timeout(
            self.timeout,
            handle
                .from(&self.probe_table)
                .select("id")
                .limit(1)
                .execute(),
        )
        .await;

        let (mut failure, auth_ok, mut message) = match probe {
            Ok(Ok(_)) => (None, true, "Connection successful".to_string()),
            Ok(Err(BackendError::Unauthorized(detail))) => (
                Some(TestFailure::Authentication),
                false,
                format!("Authentication failed: {detail}"),
            ),
            Ok(Err(BackendError::Transport(detail))) => (
                Some(TestFailure::Unreachable),
                false,
                format!("Backend unreachable: {detail}"),
            ),
            // Credentials were accepted; the table or data may simply be absent.
            Ok(Err(err)) => (None, true, format!("Connection successful ({err})")),
            Err(_) => (
                Some(TestFailure::Timeout),
                false,
                format!("Probe timed out after {} ms", self.timeout.as_millis()),
            ),
        };

        let health = match endpoints.health_check {
            Some(url) => Some(self.health_check(url).await),
            None => None,
        };
        if let Some(probe) = health.as_ref().filter(|h| !h.ok) {
            if failure.is_none() {
                failure = Some(TestFailure::HealthCheck);
                message = format!(
                    "Health check failed: {}",
                    probe
                        .error
                        .clone()
                        .or_else(|| probe.status.map(|s| format!("status {s}")))
                        .unwrap_or_default()
                );
            }
        }

        let result = ConnectionTestResult {
            connection: name,
            success: failure.is_none(),
            message,
            auth_ok,
            health,
            latency_ms: elapsed_ms(started),
            failure,
        };
        tracing::info!(
            connection = %result.connection,
            success = result.success,
            latency_ms = result.latency_ms,
            "connection test finished"
        );
        result
    }

    async fn prepare(
        &self,
        target: ConnectionTarget,
    ) -> Result<(ClientHandle, ConnectionEndpoints), (TestFailure, String)> {
        match target {
            ConnectionTarget::Name(name) => {
                let connection = self.registry.connection(&name).ok_or_else(|| {
                    (
                        TestFailure::UnknownConnection,
                        SyncError::ConnectionNotFound(name.clone()).to_string(),
                    )
                })?;
                let handle = self
                    .registry
                    .build_handle(&connection, false)
                    .await
                    .map_err(classify)?;
                Ok((handle, connection.endpoints))
            }
            ConnectionTarget::Config { name, config } => {
                let handle = self
                    .registry
                    .handle_for_config(&name, &config)
                    .await
                    .map_err(classify)?;
                Ok((handle, config.endpoints))
            }
        }
    }

    async fn health_check(&self, url: String) -> HealthProbe {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.http.get(&url).send()).await;
        let (ok, status, error) = match outcome {
            Ok(Ok(response)) => {
                let status = response.status();
                (status.is_success(), Some(status.as_u16()), None)
            }
            Ok(Err(err)) => (false, None, Some(err.to_string())),
            Err(_) => (
                false,
                None,
                Some(format!("timed out after {} ms", self.timeout.as_millis())),
            ),
        };
        HealthProbe {
            url,
            ok,
            status,
            error,
            latency_ms: elapsed_ms(started),
        }
    }
}

fn classify(err: SyncError) -> (TestFailure, String) {
    let failure = match &err {
        SyncError::AuthenticationFailure { .. } => TestFailure::Authentication,
        SyncError::InvalidConnection { .. } | SyncError::ClientBuild { .. } => {
            TestFailure::InvalidConfig
        }
        _ => TestFailure::Unreachable,
    };
    (failure, err.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use fieldhouse_core::{Row, SystemClock};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::backend::{ClientFactory, MemoryClientFactory};
    use crate::secrets::MemorySecretStore;

    fn tester(timeout: Duration) -> (ConnectionTester, Arc<MemoryClientFactory>) {
        let factory = Arc::new(MemoryClientFactory::new());
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::clone(&factory) as Arc<dyn ClientFactory>,
            Arc::new(MemorySecretStore::new()),
            Arc::new(SystemClock),
        ));
        (
            ConnectionTester::new(registry, "system_settings", timeout),
            factory,
        )
    }

    #[tokio::test]
    async fn registered_connection_without_health_check_succeeds() {
        let (tester, factory) = tester(Duration::from_secs(5));
        let row: Row = json!({"id": "s1"}).as_object().cloned().unwrap();
        factory.backend("https://x").seed("academies", "system_settings", vec![row]);
        tester
            .registry
            .register("c1", ConnectionConfig::new("academies", "https://x"))
            .await
            .unwrap();

        let result = tester.test("c1".into()).await;
        assert!(result.success, "{}", result.message);
        assert!(result.auth_ok);
        assert!(result.health.is_none());
        assert_eq!(factory.backend("https://x").read_count(), 1);
    }

    #[tokio::test]
    async fn missing_probe_table_is_not_a_failure() {
        let (tester, factory) = tester(Duration::from_secs(5));
        factory
            .backend("https://x")
            .fail_table("academies", "system_settings", "relation does not exist");
        let result = tester
            .test(ConnectionTarget::Config {
                name: "draft".to_string(),
                config: ConnectionConfig::new("academies", "https://x"),
            })
            .await;
        assert!(result.success);
        assert!(result.auth_ok);
    }

    #[tokio::test]
    async fn rejected_key_is_an_auth_failure() {
        let (tester, factory) = tester(Duration::from_secs(5));
        factory.backend("https://x").require_key("right");
        let result = tester
            .test(ConnectionTarget::Config {
                name: "draft".to_string(),
                config: ConnectionConfig::new("academies", "https://x").with_api_key("wrong"),
            })
            .await;
        assert!(!result.success);
        assert!(!result.auth_ok);
        assert_eq!(result.failure, Some(TestFailure::Authentication));
        assert!(!result.message.contains("wrong"));
    }

    #[tokio::test]
    async fn unknown_connection_fails_without_error() {
        let (tester, _) = tester(Duration::from_secs(5));
        let result = tester.test("ghost".into()).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(TestFailure::UnknownConnection));
    }

    #[tokio::test]
    async fn invalid_config_fails_without_error() {
        let (tester, _) = tester(Duration::from_secs(5));
        let result = tester
            .test(ConnectionTarget::Config {
                name: "draft".to_string(),
                config: ConnectionConfig::new("", "https://x"),
            })
            .await;
        assert_eq!(result.failure, Some(TestFailure::InvalidConfig));
    }

    #[tokio::test]
    async fn unreachable_health_check_fails_without_error() {
        let (tester, _) = tester(Duration::from_secs(2));
        let result = tester
            .test(ConnectionTarget::Config {
                name: "draft".to_string(),
                config: ConnectionConfig::new("academies", "https://x")
                    .with_health_check("http://127.0.0.1:1/health"),
            })
            .await;
        assert!(!result.success);
        assert!(result.auth_ok);
        assert_eq!(result.failure, Some(TestFailure::HealthCheck));
        let health = result.health.unwrap();
        assert!(!health.ok);
        assert!(health.error.is_some());
    }

    #[tokio::test]
    async fn healthy_endpoint_passes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (tester, _) = tester(Duration::from_secs(5));
        let result = tester
            .test(ConnectionTarget::Config {
                name: "draft".to_string(),
                config: ConnectionConfig::new("academies", "https://x")
                    .with_health_check(format!("{}/health", server.uri())),
            })
            .await;
        assert!(result.success, "{}", result.message);
        assert_eq!(result.health.unwrap().status, Some(200));
    }

    #[tokio::test]
    async fn unhealthy_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (tester, _) = tester(Duration::from_secs(5));
        let result = tester
            .test(ConnectionTarget::Config {
                name: "draft".to_string(),
                config: ConnectionConfig::new("academies", "https://x")
                    .with_health_check(server.uri()),
            })
            .await;
        assert_eq!(result.failure, Some(TestFailure::HealthCheck));
        assert_eq!(result.health.unwrap().status, Some(503));
    }

    #[tokio::test]
    async fn slow_health_check_is_cut_off_by_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let (tester, _) = tester(Duration::from_millis(200));
        let started = Instant::now();
        let result = tester
            .test(ConnectionTarget::Config {
                name: "draft".to_string(),
                config: ConnectionConfig::new("academies", "https://x")
                    .with_health_check(server.uri()),
            })
            .await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.failure, Some(TestFailure::HealthCheck));
        assert!(result.health.unwrap().error.unwrap().contains("timed out"));
    }
}
