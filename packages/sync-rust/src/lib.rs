//! Fieldhouse Sync: connection registry, schema routing, cross-domain
//! fan-out queries, and the serialized sync queue behind user, payment and
//! audit propagation.

pub mod backend;
pub mod config;
pub mod cross_domain;
pub mod domain;
pub mod error;
pub mod hub;
pub mod notify;
pub mod queue;
pub mod registry;
pub mod router;
pub mod secrets;
pub mod store;
pub mod telemetry;

pub use backend::{
    BackendClient, ClientFactory, ClientOptions, MemoryBackend, MemoryClientFactory, RestBackend,
    RestClientFactory,
};
pub use config::{NamespaceConfig, SyncConfig, TieBreakPolicy};
pub use cross_domain::{
    query, ConnectionTarget, ConnectionTestResult, CrossDomainQuery, CrossDomainResult,
    NamespaceResult, QueryFn, TestFailure,
};
pub use domain::{
    CrossAppAnalytics, DomainOperations, FinancialSummary, TargetOutcome, UserSyncReport,
};
pub use error::{BackendError, SyncError};
pub use hub::DataHub;
pub use notify::{Notifier, RecordingNotifier, TracingNotifier};
pub use queue::{DeadLetter, QueueState, QueueStats, RetryPolicy, SyncExecutor, SyncQueue};
pub use registry::{ClientHandle, ConnectionAdmin, ConnectionRegistry, QueryBuilder};
pub use router::SchemaRouter;
pub use secrets::{EnvSecretStore, MemorySecretStore, SecretStore, SecretStoreError};
pub use store::{
    ConnectionStore, JsonFileConnectionStore, MemoryConnectionStore, NullConnectionStore,
    StoreError,
};
pub use telemetry::{init_tracing, LogFormat};
