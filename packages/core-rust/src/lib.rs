//! Fieldhouse Core: connections, sync operations, audit entries, user records,
//! and backend-agnostic query descriptions.

pub mod audit;
pub mod clock;
pub mod connection;
pub mod context;
pub mod query;
pub mod secret;
pub mod sync;
pub mod types;
pub mod user;

pub use audit::{AuditAction, AuditLogEntry};
pub use clock::{format_timestamp, Clock, FixedClock, SystemClock};
pub use connection::{
    Connection, ConnectionConfig, ConnectionEndpoints, ConnectionError, ConnectionOptions,
    ConnectionStatus, ConnectionSummary, CredentialInput, CredentialRef,
};
pub use context::Actor;
pub use query::{Filter, FilterOp, Mutation, OrderBy, TableQuery};
pub use secret::Secret;
pub use sync::{FinancialAction, QueuedOperation, SyncOperation, SyncOperationId};
pub use types::{DateRange, Row, SystemSetting};
pub use user::{RolePayload, UserRecord, UserRef, UserReference};
