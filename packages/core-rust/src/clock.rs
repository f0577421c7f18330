//! Wall-clock abstraction for timestamps on connections, queued operations,
//! and audit entries.
//!
//! All engine components take time from a [`Clock`] so tests can pin it with
//! [`FixedClock`] instead of racing the system clock.

use chrono::{DateTime, SecondsFormat, Utc};

/// Abstraction over the system clock for dependency injection.
///
/// The default implementation ([`SystemClock`]) delegates to `Utc::now()`.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Formats a timestamp the way backends store it: RFC 3339, millisecond
/// precision, `Z` suffix.
///
/// A single fixed format keeps lexicographic and chronological order equal,
/// which range filters rely on.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
