//! Units of deferred cross-domain work.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::AuditLogEntry;
use crate::types::Row;
use crate::user::UserRef;

/// Opaque identifier assigned to an operation when it is enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncOperationId(pub Uuid);

impl SyncOperationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncOperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncOperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Write performed by a [`SyncOperation::FinancialSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialAction {
    Create,
    Update,
    Delete,
}

fn default_financial_table() -> String {
    "payments".to_string()
}

/// Cross-domain side effect, processed by the sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOperation {
    /// Propagate a user reference from one namespace to others.
    UserSync {
        source_namespace: String,
        target_namespaces: Vec<String>,
        user_ref: UserRef,
    },
    /// Write to the financial namespace. `update` and `delete` address the
    /// row by the payload's `id`.
    FinancialSync {
        action: FinancialAction,
        #[serde(default = "default_financial_table")]
        table: String,
        payload: Row,
    },
    /// Append an audit entry.
    AuditLog { entry: AuditLogEntry },
}

impl SyncOperation {
    /// Short kind label, used in logs and dead-letter records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserSync { .. } => "user_sync",
            Self::FinancialSync { .. } => "financial_sync",
            Self::AuditLog { .. } => "audit_log",
        }
    }

    /// Financial write against the default `payments` table.
    #[must_use]
    pub fn financial(action: FinancialAction, payload: Row) -> Self {
        Self::FinancialSync {
            action,
            table: default_financial_table(),
            payload,
        }
    }
}

/// An operation accepted by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: SyncOperationId,
    pub enqueued_at: DateTime<Utc>,
    pub operation: SyncOperation,
}

impl QueuedOperation {
    #[must_use]
    pub fn new(operation: SyncOperation, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: SyncOperationId::new(),
            enqueued_at,
            operation,
        }
    }
}
