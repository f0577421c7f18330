//! `DataHub`: the service object collaborators talk to.
//!
//! Owns the registry, router, fan-out, tester and domain operations, all
//! sharing one client factory, secret store and clock. Construct one per
//! process and pass it around.

use std::sync::Arc;

use fieldhouse_core::{
    Actor, Clock, Connection, ConnectionConfig, ConnectionSummary, DateRange, Row, SyncOperation,
    SyncOperationId, SystemClock, UserRef,
};
use serde_json::Value;

use crate::backend::ClientFactory;
use crate::config::SyncConfig;
use crate::cross_domain::{
    ConnectionTarget, ConnectionTestResult, ConnectionTester, CrossDomainResult, QueryFn,
};
use crate::domain::{CrossAppAnalytics, DomainOperations, FinancialSummary, UserSyncReport};
use crate::error::SyncError;
use crate::notify::Notifier;
use crate::queue::SyncQueue;
use crate::registry::{ClientHandle, ConnectionAdmin, ConnectionRegistry};
use crate::router::SchemaRouter;
use crate::secrets::SecretStore;
use crate::store::ConnectionStore;

pub struct DataHub {
    config: SyncConfig,
    registry: Arc<ConnectionRegistry>,
    router: Arc<SchemaRouter>,
    tester: ConnectionTester,
    domain: Arc<DomainOperations>,
    clock: Arc<dyn Clock>,
}

impl DataHub {
    pub fn new(
        config: SyncConfig,
        factory: Arc<dyn ClientFactory>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self::with_clock(config, factory, secrets, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SyncConfig,
        factory: Arc<dyn ClientFactory>,
        secrets: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(factory, secrets, Arc::clone(&clock)));
        let router = Arc::new(SchemaRouter::new(
            Arc::clone(&registry),
            config.default_connection.clone(),
            config.tie_break,
        ));
        let tester = ConnectionTester::new(
            Arc::clone(&registry),
            config.probe_table.clone(),
            config.health_check_timeout(),
        );
        let domain = DomainOperations::new(Arc::clone(&router), &config, Arc::clone(&clock));
        Self {
            config,
            registry,
            router,
            tester,
            domain,
            clock,
        }
    }

    /// Persistence-backed administration over this hub's registry.
    pub fn admin(
        &self,
        store: Arc<dyn ConnectionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> ConnectionAdmin {
        ConnectionAdmin::new(
            Arc::clone(&self.registry),
            store,
            notifier,
            Arc::clone(&self.clock),
        )
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn router(&self) -> &Arc<SchemaRouter> {
        &self.router
    }

    #[must_use]
    pub fn queue(&self) -> &SyncQueue {
        self.domain.queue()
    }

    #[must_use]
    pub fn domain(&self) -> &Arc<DomainOperations> {
        &self.domain
    }

    // -- connections --------------------------------------------------------

    /// See [`ConnectionRegistry::register`].
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidConnection`] for an invalid config, or a secret
    /// store error while moving the credential.
    pub async fn register_connection(
        &self,
        name: &str,
        config: ConnectionConfig,
    ) -> Result<Connection, SyncError> {
        self.registry.register(name, config).await
    }

    pub async fn get_client(&self, name: &str) -> Option<Arc<ClientHandle>> {
        self.registry.get(name).await
    }

    /// Client serving `namespace`, falling back to the default connection.
    pub async fn get_schema_client(&self, namespace: &str) -> Option<Arc<ClientHandle>> {
        self.router.resolve(namespace).await
    }

    #[must_use]
    pub fn list_connections(&self) -> Vec<ConnectionSummary> {
        self.registry.list()
    }

    /// See [`ConnectionRegistry::remove`].
    pub async fn remove_connection(&self, name: &str) -> Option<Connection> {
        self.registry.remove(name).await
    }

    pub async fn test_connection(&self, target: impl Into<ConnectionTarget>) -> ConnectionTestResult {
        self.tester.test(target.into()).await
    }

    // -- cross-domain -------------------------------------------------------

    pub async fn cross_schema_query(&self, queries: Vec<(String, QueryFn)>) -> CrossDomainResult {
        self.domain.fanout().run(queries).await
    }

    pub fn queue_sync(&self, operation: SyncOperation) -> SyncOperationId {
        self.domain.queue_sync(operation)
    }

    /// # Errors
    ///
    /// See [`DomainOperations::sync_user`].
    pub async fn sync_user(
        &self,
        user_ref: &UserRef,
        source_namespace: &str,
        target_namespaces: &[String],
    ) -> Result<UserSyncReport, SyncError> {
        self.domain
            .sync_user(user_ref, source_namespace, target_namespaces)
            .await
    }

    /// # Errors
    ///
    /// See [`DomainOperations::create_payment_from_reference`].
    pub async fn create_payment_from_reference(
        &self,
        player_ref: &UserRef,
        payload: Row,
    ) -> Result<Row, SyncError> {
        self.domain
            .create_payment_from_reference(player_ref, payload)
            .await
    }

    /// # Errors
    ///
    /// See [`DomainOperations::create_payment_from_reference_as`].
    pub async fn create_payment_from_reference_as(
        &self,
        actor: &Actor,
        player_ref: &UserRef,
        payload: Row,
    ) -> Result<Row, SyncError> {
        self.domain
            .create_payment_from_reference_as(actor, player_ref, payload)
            .await
    }

    /// # Errors
    ///
    /// See [`DomainOperations::get_financial_summary`].
    pub async fn get_financial_summary(&self, range: DateRange) -> Result<FinancialSummary, SyncError> {
        self.domain.get_financial_summary(range).await
    }

    pub async fn get_cross_app_analytics(&self, range: DateRange) -> CrossAppAnalytics {
        self.domain.get_cross_app_analytics(range).await
    }

    /// Redacted configuration of every registered connection's handle, for
    /// diagnostics. Connections whose handle cannot be built are skipped.
    pub async fn client_configs(&self) -> Vec<Value> {
        let mut out = Vec::new();
        for summary in self.registry.list() {
            if let Some(handle) = self.registry.get(&summary.name).await {
                out.push(serde_json::to_value(handle.config()).unwrap_or(Value::Null));
            }
        }
        out
    }
}
