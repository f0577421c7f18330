//! User-facing notification sink.
//!
//! Administrative operations report their outcome through a [`Notifier`].
//! Delivery is cosmetic: a notifier must never fail the operation it reports.

use parking_lot::Mutex;

/// Outcome sink for administrative operations.
pub trait Notifier: Send + Sync {
    fn success(&self, title: &str, detail: &str);
    fn failure(&self, title: &str, detail: &str);
}

/// Writes notifications to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, title: &str, detail: &str) {
        tracing::info!(title, detail, "notification");
    }

    fn failure(&self, title: &str, detail: &str) {
        tracing::warn!(title, detail, "notification");
    }
}

/// A delivered notification, as captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub success: bool,
    pub title: String,
    pub detail: String,
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().clone()
    }

    fn push(&self, success: bool, title: &str, detail: &str) {
        self.delivered.lock().push(Notification {
            success,
            title: title.to_string(),
            detail: detail.to_string(),
        });
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, title: &str, detail: &str) {
        self.push(true, title, detail);
    }

    fn failure(&self, title: &str, detail: &str) {
        self.push(false, title, detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.success("Saved", "connection fin");
        notifier.failure("Delete failed", "connection x not found");
        let delivered = notifier.delivered();
        assert_eq!(delivered.len(), 2);
        assert!(delivered[0].success);
        assert!(!delivered[1].success);
        assert_eq!(delivered[1].title, "Delete failed");
    }

    #[test]
    fn tracing_notifier_does_not_panic_without_subscriber() {
        TracingNotifier.success("Saved", "ok");
        TracingNotifier.failure("Failed", "boom");
    }
}
