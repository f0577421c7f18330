//! Audit log entries. Write-only: the engine appends them and never reads
//! them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::format_timestamp;
use crate::context::Actor;
use crate::types::Row;

/// Kind of mutation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
}

/// One audit record describing a mutation in some namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Namespace whose table was mutated.
    pub namespace: String,
    pub table_name: String,
    pub record_id: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Value>,
    pub actor_id: String,
    pub actor_role: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Entry for an insert of `new_values` into `namespace.table`.
    #[must_use]
    pub fn insert(
        namespace: &str,
        table: &str,
        record_id: &str,
        new_values: Value,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            table_name: table.to_string(),
            record_id: record_id.to_string(),
            action: AuditAction::Insert,
            old_values: None,
            new_values: Some(new_values),
            actor_id: actor.id.clone(),
            actor_role: actor.role.clone(),
            timestamp: at,
        }
    }

    /// Row form for the `audit_logs` table.
    #[must_use]
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("namespace".into(), Value::String(self.namespace.clone()));
        row.insert("table_name".into(), Value::String(self.table_name.clone()));
        row.insert("record_id".into(), Value::String(self.record_id.clone()));
        row.insert(
            "action".into(),
            serde_json::to_value(self.action).unwrap_or(Value::Null),
        );
        row.insert(
            "old_values".into(),
            self.old_values.clone().unwrap_or(Value::Null),
        );
        row.insert(
            "new_values".into(),
            self.new_values.clone().unwrap_or(Value::Null),
        );
        row.insert("actor_id".into(), Value::String(self.actor_id.clone()));
        row.insert("actor_role".into(), Value::String(self.actor_role.clone()));
        row.insert(
            "timestamp".into(),
            Value::String(format_timestamp(self.timestamp)),
        );
        row
    }
}
