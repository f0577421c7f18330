//! Cross-domain use cases: user propagation, payment creation through the
//! player-parent relation, audit logging, financial summary, and analytics.
//!
//! [`DomainOperations`] is also the [`SyncExecutor`] behind the sync queue;
//! it owns the queue and hands it a weak reference to itself.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fieldhouse_core::{
    format_timestamp, Actor, AuditLogEntry, Clock, DateRange, FinancialAction, Row, SyncOperation,
    SyncOperationId, UserRecord, UserRef, UserReference,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{NamespaceConfig, SyncConfig};
use crate::cross_domain::{query, CrossDomainQuery, CrossDomainResult, QueryFn};
use crate::error::{BackendError, SyncError};
use crate::queue::{SyncExecutor, SyncQueue};
use crate::registry::ClientHandle;
use crate::router::SchemaRouter;

const USERS: &str = "users";
const USER_REFERENCES: &str = "user_references";
const PLAYERS: &str = "players";
const PLAYER_PARENTS: &str = "player_parents";
const PAYMENTS: &str = "payments";
const INVOICES: &str = "invoices";
const AUDIT_LOGS: &str = "audit_logs";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of propagating a user into one target namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum TargetOutcome {
    Inserted,
    AlreadyPresent,
    /// No client for the namespace.
    Unavailable,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub namespace: String,
    pub outcome: TargetOutcome,
}

/// Per-target outcomes of a user sync, in target order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSyncReport {
    pub user_id: String,
    pub source_namespace: String,
    pub targets: Vec<TargetReport>,
}

impl UserSyncReport {
    #[must_use]
    pub fn outcome(&self, namespace: &str) -> Option<&TargetOutcome> {
        self.targets
            .iter()
            .find(|t| t.namespace == namespace)
            .map(|t| &t.outcome)
    }

    /// Targets that could not be written.
    #[must_use]
    pub fn incomplete(&self) -> Vec<&TargetReport> {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, TargetOutcome::Failed(_) | TargetOutcome::Unavailable))
            .collect()
    }
}

/// Totals over the financial namespace for one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialSummary {
    pub period: DateRange,
    /// Sum of completed payments.
    pub total_revenue: f64,
    /// Sum of pending payments.
    pub pending_amount: f64,
    pub payment_count: usize,
    pub invoice_count: usize,
    /// Unpaid invoices whose due date has passed.
    pub overdue_invoices: usize,
    /// Sum of unpaid, uncancelled invoices.
    pub outstanding_amount: f64,
}

/// Time-bounded slices per namespace, with the requested period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossAppAnalytics {
    pub period: DateRange,
    pub namespaces: CrossDomainResult,
}

// ---------------------------------------------------------------------------
// DomainOperations
// ---------------------------------------------------------------------------

pub struct DomainOperations {
    router: Arc<SchemaRouter>,
    fanout: CrossDomainQuery,
    queue: SyncQueue,
    namespaces: NamespaceConfig,
    clock: Arc<dyn Clock>,
    actor: Actor,
}

impl DomainOperations {
    /// Operations attributed to [`Actor::system`] unless a call names an actor.
    pub fn new(router: Arc<SchemaRouter>, config: &SyncConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::with_actor(router, config, clock, Actor::system())
    }

    /// Like [`new`](Self::new) with `actor` as the default audit actor.
    pub fn with_actor(
        router: Arc<SchemaRouter>,
        config: &SyncConfig,
        clock: Arc<dyn Clock>,
        actor: Actor,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let executor: Weak<dyn SyncExecutor> = this.clone();
            let queue = SyncQueue::new(
                executor,
                config.retry,
                config.dead_letter_capacity,
                Arc::clone(&clock),
            );
            Self {
                fanout: CrossDomainQuery::new(Arc::clone(&router)),
                router,
                queue,
                namespaces: config.namespaces.clone(),
                clock,
                actor,
            }
        })
    }

    #[must_use]
    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Default actor recorded on audit entries.
    #[must_use]
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    #[must_use]
    pub fn fanout(&self) -> &CrossDomainQuery {
        &self.fanout
    }

    #[must_use]
    pub fn namespaces(&self) -> &NamespaceConfig {
        &self.namespaces
    }

    /// Enqueues a deferred operation.
    pub fn queue_sync(&self, operation: SyncOperation) -> SyncOperationId {
        self.queue.enqueue(operation)
    }

    async fn client(&self, namespace: &str) -> Result<Arc<ClientHandle>, SyncError> {
        self.router
            .resolve(namespace)
            .await
            .ok_or_else(|| SyncError::NamespaceUnavailable(namespace.to_string()))
    }

    // -- user propagation ---------------------------------------------------

    /// Copies a reference to `user_ref` into each target namespace's
    /// `user_references` table, skipping targets that already hold one.
    ///
    /// # Errors
    ///
    /// Fails before any write when the source is unavailable, the user is
    /// missing ([`SyncError::SourceNotFound`]) or the row is malformed.
    /// Per-target failures are reported in the returned report instead.
    pub async fn sync_user(
        &self,
        user_ref: &UserRef,
        source_namespace: &str,
        target_namespaces: &[String],
    ) -> Result<UserSyncReport, SyncError> {
        let source = self.client(source_namespace).await?;
        let row = source
            .from(USERS)
            .eq("id", user_ref.id.as_str())
            .maybe_single()
            .await
            .map_err(|e| SyncError::backend(source_namespace, USERS, e))?
            .ok_or_else(|| SyncError::SourceNotFound {
                namespace: source_namespace.to_string(),
                id: user_ref.id.clone(),
            })?;
        let user = UserRecord::from_row(row).map_err(|e| SyncError::MalformedRecord {
            table: USERS.to_string(),
            message: e.to_string(),
        })?;
        let reference = UserReference::from_user(&user, source_namespace, self.clock.now());

        let mut targets = Vec::with_capacity(target_namespaces.len());
        for namespace in target_namespaces {
            let outcome = match self.router.resolve(namespace).await {
                None => TargetOutcome::Unavailable,
                Some(client) => match propagate(&client, &reference).await {
                    Ok(outcome) => outcome,
                    Err(err) => TargetOutcome::Failed(err.to_string()),
                },
            };
            targets.push(TargetReport {
                namespace: namespace.clone(),
                outcome,
            });
        }

        let report = UserSyncReport {
            user_id: user.id,
            source_namespace: source_namespace.to_string(),
            targets,
        };
        tracing::info!(
            user_id = %report.user_id,
            source = source_namespace,
            targets = report.targets.len(),
            incomplete = report.incomplete().len(),
            "user sync finished"
        );
        Ok(report)
    }

    // -- payments -----------------------------------------------------------

    /// Records a payment for a player, billed to the player's primary parent.
    ///
    /// Reads happen before any write. The audit entry is queued after the
    /// insert commits; its failure never affects the returned payment.
    ///
    /// # Errors
    ///
    /// [`SyncError::SourceNotFound`] for an unknown player,
    /// [`SyncError::PrimaryParentNotFound`] when no parent link is flagged
    /// primary, [`SyncError::NamespaceUnavailable`] when either namespace has
    /// no client, or the wrapped backend error.
    pub async fn create_payment_from_reference(
        &self,
        player_ref: &UserRef,
        payload: Row,
    ) -> Result<Row, SyncError> {
        self.create_payment_from_reference_as(&self.actor, player_ref, payload)
            .await
    }

    /// Like [`create_payment_from_reference`](Self::create_payment_from_reference),
    /// with the audit entry attributed to `actor`.
    ///
    /// # Errors
    ///
    /// See [`create_payment_from_reference`](Self::create_payment_from_reference).
    pub async fn create_payment_from_reference_as(
        &self,
        actor: &Actor,
        player_ref: &UserRef,
        payload: Row,
    ) -> Result<Row, SyncError> {
        let primary_ns = self.namespaces.primary.as_str();
        let primary = self.client(primary_ns).await?;

        primary
            .from(PLAYERS)
            .select("id")
            .eq("id", player_ref.id.as_str())
            .maybe_single()
            .await
            .map_err(|e| SyncError::backend(primary_ns, PLAYERS, e))?
            .ok_or_else(|| SyncError::SourceNotFound {
                namespace: primary_ns.to_string(),
                id: player_ref.id.clone(),
            })?;

        let link = primary
            .from(PLAYER_PARENTS)
            .eq("player_id", player_ref.id.as_str())
            .eq("is_primary", true)
            .maybe_single()
            .await
            .map_err(|e| SyncError::backend(primary_ns, PLAYER_PARENTS, e))?
            .ok_or_else(|| SyncError::PrimaryParentNotFound {
                player_id: player_ref.id.clone(),
            })?;
        let parent_id = link
            .get("parent_id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::MalformedRecord {
                table: PLAYER_PARENTS.to_string(),
                message: "parent_id is missing or not a string".to_string(),
            })?
            .to_string();

        let financial_ns = self.namespaces.financial.as_str();
        let financial = self.client(financial_ns).await?;

        let now = self.clock.now();
        let mut row = payload;
        row.insert("player_id".into(), Value::String(player_ref.id.clone()));
        row.insert("parent_id".into(), Value::String(parent_id));
        row.entry("status").or_insert_with(|| json!("pending"));
        row.entry("created_at")
            .or_insert_with(|| Value::String(format_timestamp(now)));

        let payment = financial
            .from(PAYMENTS)
            .insert(vec![row])
            .await
            .map_err(|e| SyncError::backend(financial_ns, PAYMENTS, e))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                SyncError::backend(
                    financial_ns,
                    PAYMENTS,
                    BackendError::Decode("insert returned no rows".to_string()),
                )
            })?;

        let record_id = payment
            .get("id")
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let entry = AuditLogEntry::insert(
            financial_ns,
            PAYMENTS,
            &record_id,
            Value::Object(payment.clone()),
            actor,
            now,
        );
        self.queue.enqueue(SyncOperation::AuditLog { entry });

        tracing::info!(
            player_id = %player_ref.id,
            payment_id = %record_id,
            actor = %actor.id,
            "payment created"
        );
        Ok(payment)
    }

    /// Applies a financial create, update, or delete. Update and delete
    /// target the row whose `id` is in `payload`.
    ///
    /// # Errors
    ///
    /// [`SyncError::MalformedRecord`] when an update or delete payload has no
    /// `id`, otherwise namespace or backend errors.
    pub async fn apply_financial(
        &self,
        action: FinancialAction,
        table: &str,
        payload: Row,
    ) -> Result<Vec<Row>, SyncError> {
        let namespace = self.namespaces.financial.as_str();
        let client = self.client(namespace).await?;
        let wrap = |e| SyncError::backend(namespace, table, e);

        if action == FinancialAction::Create {
            return client.from(table).insert(vec![payload]).await.map_err(wrap);
        }

        let mut patch = payload;
        let id = patch.remove("id").ok_or_else(|| SyncError::MalformedRecord {
            table: table.to_string(),
            message: format!("{action:?} requires an id"),
        })?;
        let written = match action {
            FinancialAction::Update => client.from(table).eq("id", id).update(patch).await,
            _ => client.from(table).eq("id", id).delete().await,
        };
        written.map_err(wrap)
    }

    // -- audit --------------------------------------------------------------

    /// Appends `entry` to the audit namespace.
    ///
    /// # Errors
    ///
    /// Namespace or backend errors. Queue callers log and drop them.
    pub async fn log_audit(&self, entry: &AuditLogEntry) -> Result<(), SyncError> {
        let namespace = self.namespaces.audit.as_str();
        let client = self.client(namespace).await?;
        client
            .from(AUDIT_LOGS)
            .insert(vec![entry.to_row()])
            .await
            .map_err(|e| SyncError::backend(namespace, AUDIT_LOGS, e))?;
        Ok(())
    }

    // -- reporting ----------------------------------------------------------

    /// Payment and invoice totals for records created within `range`.
    ///
    /// # Errors
    ///
    /// Namespace or backend errors from the financial namespace.
    pub async fn get_financial_summary(&self, range: DateRange) -> Result<FinancialSummary, SyncError> {
        let namespace = self.namespaces.financial.as_str();
        let client = self.client(namespace).await?;

        let payments = in_range(&client, PAYMENTS, range)
            .await
            .map_err(|e| SyncError::backend(namespace, PAYMENTS, e))?;
        let invoices = in_range(&client, INVOICES, range)
            .await
            .map_err(|e| SyncError::backend(namespace, INVOICES, e))?;

        let today = self.clock.now().date_naive();

        Ok(FinancialSummary {
            period: range,
            total_revenue: sum_amounts(&payments, |s| s == "completed"),
            pending_amount: sum_amounts(&payments, |s| s == "pending"),
            payment_count: payments.len(),
            invoice_count: invoices.len(),
            overdue_invoices: invoices
                .iter()
                .filter(|r| is_unpaid(status(r)))
                .filter(|r| due_date(r).is_some_and(|due| due < today))
                .count(),
            outstanding_amount: sum_amounts(&invoices, is_unpaid),
        })
    }

    /// New users and players from the primary namespace, payments and
    /// invoices from the financial namespace, and new users from the shared
    /// namespace, all created within `range`.
    ///
    /// A failing namespace is reported in place; the others still return.
    pub async fn get_cross_app_analytics(&self, range: DateRange) -> CrossAppAnalytics {
        let ns = &self.namespaces;
        let queries: Vec<(String, QueryFn)> = vec![
            (ns.primary.clone(), slices(&[USERS, PLAYERS], range)),
            (ns.financial.clone(), slices(&[PAYMENTS, INVOICES], range)),
            (ns.shared.clone(), slices(&[USERS], range)),
        ];
        CrossAppAnalytics {
            period: range,
            namespaces: self.fanout.run(queries).await,
        }
    }
}

#[async_trait]
impl SyncExecutor for DomainOperations {
    async fn execute(&self, operation: &SyncOperation) -> anyhow::Result<()> {
        match operation {
            SyncOperation::UserSync {
                source_namespace,
                target_namespaces,
                user_ref,
            } => {
                let report = self
                    .sync_user(user_ref, source_namespace, target_namespaces)
                    .await?;
                let incomplete: Vec<&str> = report
                    .incomplete()
                    .iter()
                    .map(|t| t.namespace.as_str())
                    .collect();
                if !incomplete.is_empty() {
                    anyhow::bail!("user {} not propagated to {}", user_ref.id, incomplete.join(", "));
                }
            }
            SyncOperation::FinancialSync {
                action,
                table,
                payload,
            } => {
                self.apply_financial(*action, table, payload.clone()).await?;
            }
            SyncOperation::AuditLog { entry } => self.log_audit(entry).await?,
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn propagate(
    client: &ClientHandle,
    reference: &UserReference,
) -> Result<TargetOutcome, BackendError> {
    let existing = client
        .from(USER_REFERENCES)
        .select("source_user_id")
        .eq("source_user_id", reference.source_user_id.as_str())
        .eq("source_namespace", reference.source_namespace.as_str())
        .maybe_single()
        .await?;
    if existing.is_some() {
        return Ok(TargetOutcome::AlreadyPresent);
    }
    client
        .from(USER_REFERENCES)
        .insert(vec![reference.to_row()])
        .await?;
    Ok(TargetOutcome::Inserted)
}

async fn in_range(
    client: &ClientHandle,
    table: &str,
    range: DateRange,
) -> Result<Vec<Row>, BackendError> {
    client
        .from(table)
        .gte("created_at", format_timestamp(range.start))
        .lte("created_at", format_timestamp(range.end))
        .order("created_at", true)
        .execute()
        .await
}

/// A query returning `{table: {count, records}}` for each table.
fn slices(tables: &[&'static str], range: DateRange) -> QueryFn {
    let tables = tables.to_vec();
    query(move |client| async move {
        let mut out = serde_json::Map::new();
        for table in tables {
            let rows = in_range(&client, table, range).await?;
            out.insert(
                table.to_string(),
                json!({ "count": rows.len(), "records": rows }),
            );
        }
        Ok(Value::Object(out))
    })
}

fn is_unpaid(status: &str) -> bool {
    status != "paid" && status != "cancelled"
}

/// Sum of `amount` over rows whose status passes `keep`, rounded to cents.
fn sum_amounts(rows: &[Row], keep: impl Fn(&str) -> bool) -> f64 {
    round_cents(rows.iter().filter(|r| keep(status(r))).map(amount).sum())
}

fn status(row: &Row) -> &str {
    row.get("status").and_then(Value::as_str).unwrap_or("")
}

/// Numeric `amount`, accepting JSON numbers and numeric strings.
fn amount(row: &Row) -> f64 {
    match row.get("amount") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn due_date(row: &Row) -> Option<NaiveDate> {
    let raw = row.get("due_date")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use fieldhouse_core::{ConnectionConfig, FixedClock};

    use super::*;
    use crate::backend::{ClientFactory, MemoryBackend, MemoryClientFactory};
    use crate::config::TieBreakPolicy;
    use crate::queue::RetryPolicy;
    use crate::registry::ConnectionRegistry;
    use crate::secrets::MemorySecretStore;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    struct Fixture {
        ops: Arc<DomainOperations>,
        factory: Arc<MemoryClientFactory>,
    }

    impl Fixture {
        fn academies(&self) -> Arc<MemoryBackend> {
            self.factory.backend("https://academies")
        }
        fn financial(&self) -> Arc<MemoryBackend> {
            self.factory.backend("https://financial")
        }
        fn shared(&self) -> Arc<MemoryBackend> {
            self.factory.backend("https://shared")
        }
    }

    async fn router_over(
        factory: &Arc<MemoryClientFactory>,
        clock: &Arc<dyn Clock>,
    ) -> Arc<SchemaRouter> {
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::clone(factory) as Arc<dyn ClientFactory>,
            Arc::new(MemorySecretStore::new()),
            Arc::clone(clock),
        ));
        for ns in ["academies", "financial", "shared"] {
            registry
                .register(ns, ConnectionConfig::new(ns, format!("https://{ns}")))
                .await
                .unwrap();
        }
        Arc::new(SchemaRouter::new(registry, "default", TieBreakPolicy::default()))
    }

    async fn fixture_with(config: SyncConfig) -> Fixture {
        let factory = Arc::new(MemoryClientFactory::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now()));
        let router = router_over(&factory, &clock).await;
        Fixture {
            ops: DomainOperations::new(router, &config, clock),
            factory,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(SyncConfig::default()).await
    }

    fn seed_user(backend: &MemoryBackend) {
        backend.seed(
            "academies",
            USERS,
            vec![row(json!({
                "id": "u1",
                "email": "ana@example.com",
                "full_name": "Ana Silva",
                "role": "coach",
                "license_number": "L-9"
            }))],
        );
    }

    fn seed_player(backend: &MemoryBackend, primary_parent: bool) {
        backend.seed("academies", PLAYERS, vec![row(json!({"id": "p1", "full_name": "Leo"}))]);
        backend.seed(
            "academies",
            PLAYER_PARENTS,
            vec![
                row(json!({"player_id": "p1", "parent_id": "par-2", "is_primary": false})),
                row(json!({"player_id": "p1", "parent_id": "par-1", "is_primary": primary_parent})),
            ],
        );
    }

    #[tokio::test]
    async fn missing_source_user_writes_nothing() {
        let f = fixture().await;
        let err = f
            .ops
            .sync_user(&UserRef::new("missing"), "academies", &["financial".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SourceNotFound { ref id, .. } if id == "missing"));
        assert_eq!(f.financial().write_count("financial"), 0);
    }

    #[tokio::test]
    async fn sync_user_inserts_once_per_target() {
        let f = fixture().await;
        seed_user(&f.academies());
        let targets = vec!["financial".to_string(), "shared".to_string(), "nowhere".to_string()];

        let report = f
            .ops
            .sync_user(&UserRef::new("u1"), "academies", &targets)
            .await
            .unwrap();
        assert_eq!(report.outcome("financial"), Some(&TargetOutcome::Inserted));
        assert_eq!(report.outcome("shared"), Some(&TargetOutcome::Inserted));
        assert_eq!(report.outcome("nowhere"), Some(&TargetOutcome::Unavailable));

        let refs = f.financial().rows("financial", USER_REFERENCES);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0]["source_user_id"], "u1");
        assert_eq!(refs[0]["role"], "coach");
        assert_eq!(refs[0]["synced_at"], "2024-06-15T12:00:00.000Z");

        let again = f
            .ops
            .sync_user(&UserRef::new("u1"), "academies", &targets[..1])
            .await
            .unwrap();
        assert_eq!(again.outcome("financial"), Some(&TargetOutcome::AlreadyPresent));
        assert_eq!(f.financial().rows("financial", USER_REFERENCES).len(), 1);
    }

    #[tokio::test]
    async fn failing_target_is_reported_not_raised() {
        let f = fixture().await;
        seed_user(&f.academies());
        f.financial().fail_table("financial", USER_REFERENCES, "disk full");
        let report = f
            .ops
            .sync_user(
                &UserRef::new("u1"),
                "academies",
                &["financial".to_string(), "shared".to_string()],
            )
            .await
            .unwrap();
        assert!(matches!(report.outcome("financial"), Some(TargetOutcome::Failed(m)) if m.contains("disk full")));
        assert_eq!(report.outcome("shared"), Some(&TargetOutcome::Inserted));
        assert_eq!(report.incomplete().len(), 1);
    }

    #[tokio::test]
    async fn malformed_user_row_is_rejected() {
        let f = fixture().await;
        f.academies()
            .seed("academies", USERS, vec![row(json!({"id": "u2", "role": "wizard"}))]);
        let err = f
            .ops
            .sync_user(&UserRef::new("u2"), "academies", &["shared".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord { .. }));
        assert_eq!(f.shared().write_count("shared"), 0);
    }

    #[tokio::test]
    async fn payment_without_primary_parent_writes_nothing() {
        let f = fixture().await;
        seed_player(&f.academies(), false);
        let err = f
            .ops
            .create_payment_from_reference(&UserRef::new("p1"), row(json!({"amount": 50})))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PrimaryParentNotFound { ref player_id } if player_id == "p1"));
        assert_eq!(f.financial().write_count("financial"), 0);
        assert_eq!(f.ops.queue().stats().enqueued, 0);
    }

    #[tokio::test]
    async fn payment_for_unknown_player_is_source_not_found() {
        let f = fixture().await;
        let err = f
            .ops
            .create_payment_from_reference(&UserRef::new("ghost"), Row::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SourceNotFound { .. }));
        assert_eq!(f.financial().write_count("financial"), 0);
    }

    #[tokio::test]
    async fn payment_links_primary_parent_and_audits() {
        let f = fixture().await;
        seed_player(&f.academies(), true);

        let payment = f
            .ops
            .create_payment_from_reference(
                &UserRef::new("p1"),
                row(json!({"amount": 75.5, "description": "June fees"})),
            )
            .await
            .unwrap();
        assert_eq!(payment["player_id"], "p1");
        assert_eq!(payment["parent_id"], "par-1");
        assert_eq!(payment["status"], "pending");

        f.ops.queue().wait_idle().await;
        let audit = f.shared().rows("shared", AUDIT_LOGS);
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0]["table_name"], "payments");
        assert_eq!(audit[0]["action"], "INSERT");
        assert_eq!(audit[0]["record_id"], payment["id"]);
    }

    #[tokio::test]
    async fn audit_entry_records_the_acting_user() {
        let factory = Arc::new(MemoryClientFactory::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now()));
        let router = router_over(&factory, &clock).await;
        let ops = DomainOperations::with_actor(
            router,
            &SyncConfig::default(),
            clock,
            Actor::new("staff-7", "admin"),
        );
        assert_eq!(ops.actor().id, "staff-7");
        seed_player(&factory.backend("https://academies"), true);

        ops.create_payment_from_reference(&UserRef::new("p1"), row(json!({"amount": 20})))
            .await
            .unwrap();
        ops.create_payment_from_reference_as(
            &Actor::new("par-1", "parent"),
            &UserRef::new("p1"),
            row(json!({"amount": 30})),
        )
        .await
        .unwrap();
        ops.queue().wait_idle().await;

        let audit = factory.backend("https://shared").rows("shared", AUDIT_LOGS);
        let mut actors: Vec<&str> = audit
            .iter()
            .filter_map(|entry| entry["actor_id"].as_str())
            .collect();
        actors.sort_unstable();
        assert_eq!(actors, vec!["par-1", "staff-7"]);
    }

    #[tokio::test]
    async fn sync_user_accepts_null_columns() {
        let f = fixture().await;
        f.academies().seed(
            "academies",
            USERS,
            vec![row(json!({
                "id": "u2",
                "email": "leo@example.com",
                "full_name": null,
                "role": "player",
                "position": null
            }))],
        );

        let report = f
            .ops
            .sync_user(&UserRef::new("u2"), "academies", &["financial".to_string()])
            .await
            .unwrap();
        assert_eq!(report.outcome("financial"), Some(&TargetOutcome::Inserted));
        let refs = f.financial().rows("financial", USER_REFERENCES);
        assert_eq!(refs[0]["full_name"], "");
        assert_eq!(refs[0]["role"], "player");
    }

    #[tokio::test]
    async fn audit_failure_does_not_undo_payment() {
        let f = fixture().await;
        seed_player(&f.academies(), true);
        f.shared().fail_table("shared", AUDIT_LOGS, "audit offline");

        let payment = f
            .ops
            .create_payment_from_reference(&UserRef::new("p1"), row(json!({"amount": 10})))
            .await
            .unwrap();
        f.ops.queue().wait_idle().await;

        assert_eq!(f.financial().rows("financial", PAYMENTS).len(), 1);
        assert!(payment.contains_key("id"));
        let letters = f.ops.queue().dead_letters();
        assert_eq!(letters.len(), 1);
        assert!(letters[0].error.contains("audit offline"));
    }

    #[tokio::test]
    async fn queued_operations_dispatch_by_kind() {
        let f = fixture_with(SyncConfig {
            retry: RetryPolicy::attempts(1),
            ..SyncConfig::default()
        })
        .await;
        seed_user(&f.academies());

        f.ops.queue_sync(SyncOperation::UserSync {
            source_namespace: "academies".to_string(),
            target_namespaces: vec!["shared".to_string()],
            user_ref: UserRef::new("u1"),
        });
        f.ops.queue_sync(SyncOperation::financial(
            FinancialAction::Create,
            row(json!({"id": "pay-9", "amount": 20, "status": "pending"})),
        ));
        f.ops.queue_sync(SyncOperation::financial(
            FinancialAction::Update,
            row(json!({"id": "pay-9", "status": "completed"})),
        ));
        f.ops.queue().wait_idle().await;

        assert_eq!(f.shared().rows("shared", USER_REFERENCES).len(), 1);
        let payments = f.financial().rows("financial", PAYMENTS);
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0]["status"], "completed");
        assert_eq!(f.ops.queue().stats().succeeded, 3);

        f.ops.queue_sync(SyncOperation::financial(
            FinancialAction::Delete,
            row(json!({"id": "pay-9"})),
        ));
        f.ops.queue_sync(SyncOperation::financial(
            FinancialAction::Delete,
            row(json!({"amount": 1})),
        ));
        f.ops.queue().wait_idle().await;
        assert!(f.financial().rows("financial", PAYMENTS).is_empty());
        assert_eq!(f.ops.queue().stats().failed, 1);
    }

    #[tokio::test]
    async fn queued_user_sync_with_unavailable_target_is_dead_lettered() {
        let f = fixture().await;
        seed_user(&f.academies());
        f.ops.queue_sync(SyncOperation::UserSync {
            source_namespace: "academies".to_string(),
            target_namespaces: vec!["nowhere".to_string()],
            user_ref: UserRef::new("u1"),
        });
        f.ops.queue().wait_idle().await;
        let letters = f.ops.queue().dead_letters();
        assert_eq!(letters.len(), 1);
        assert!(letters[0].error.contains("nowhere"));
    }

    #[tokio::test]
    async fn financial_summary_totals() {
        let f = fixture().await;
        f.financial().seed(
            "financial",
            PAYMENTS,
            vec![
                row(json!({"amount": 100.25, "status": "completed", "created_at": "2024-06-10T00:00:00Z"})),
                row(json!({"amount": "49.75", "status": "completed", "created_at": "2024-06-11T00:00:00Z"})),
                row(json!({"amount": 30, "status": "pending", "created_at": "2024-06-12T00:00:00Z"})),
                row(json!({"amount": 999, "status": "completed", "created_at": "2024-01-01T00:00:00Z"})),
            ],
        );
        f.financial().seed(
            "financial",
            INVOICES,
            vec![
                row(json!({"amount": 80, "status": "sent", "due_date": "2024-06-01", "created_at": "2024-06-02T00:00:00Z"})),
                row(json!({"amount": 20, "status": "sent", "due_date": "2024-07-01", "created_at": "2024-06-03T00:00:00Z"})),
                row(json!({"amount": 55, "status": "paid", "due_date": "2024-06-01", "created_at": "2024-06-04T00:00:00Z"})),
            ],
        );

        let summary = f
            .ops
            .get_financial_summary(DateRange::last_days(now(), 30))
            .await
            .unwrap();
        assert!((summary.total_revenue - 150.0).abs() < f64::EPSILON);
        assert!((summary.pending_amount - 30.0).abs() < f64::EPSILON);
        assert_eq!(summary.payment_count, 3);
        assert_eq!(summary.invoice_count, 3);
        assert_eq!(summary.overdue_invoices, 1);
        assert!((summary.outstanding_amount - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn analytics_keep_successful_namespaces() {
        let f = fixture().await;
        f.academies().seed(
            "academies",
            USERS,
            vec![row(json!({"id": "u1", "created_at": "2024-06-14T08:00:00Z"}))],
        );
        f.financial().fail_table("financial", INVOICES, "invoices offline");

        let analytics = f
            .ops
            .get_cross_app_analytics(DateRange::last_days(now(), 7))
            .await;
        let result = &analytics.namespaces;
        assert_eq!(result.data("academies").unwrap()["users"]["count"], 1);
        assert_eq!(result.data("academies").unwrap()["players"]["count"], 0);
        assert!(result.error("financial").unwrap().contains("invoices offline"));
        assert_eq!(result.data("shared").unwrap()["users"]["count"], 0);
        assert_eq!(analytics.period.end, now());
    }

    #[test]
    fn helpers() {
        assert!((amount(&row(json!({"amount": " 12.5 "}))) - 12.5).abs() < f64::EPSILON);
        assert!(amount(&row(json!({"amount": null}))).abs() < f64::EPSILON);
        assert_eq!(
            due_date(&row(json!({"due_date": "2024-06-01T23:00:00Z"}))),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert!(due_date(&row(json!({"due_date": "soon"}))).is_none());
        assert!((round_cents(0.1 + 0.2) - 0.3).abs() < f64::EPSILON);
    }
}
