use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate};

use crate::error::AnalysisError;

pub type AppInstant = Instant;

pub struct TimeUtils;

impl TimeUtils {
    pub const MS_IN_S: i64 = 1000;
    pub const MS_IN_MIN: i64 = Self::MS_IN_S * 60;
    pub const MS_IN_H: i64 = Self::MS_IN_MIN * 60;
    pub const MS_IN_D: i64 = Self::MS_IN_H * 24;
    pub const STANDARD_TIME_FORMAT: &str = "%Y-%m-%d";
}

/// Calendar date (UTC) of an epoch-millisecond timestamp.
pub fn epoch_ms_to_date(epoch_ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(epoch_ms).map(|dt| dt.date_naive())
}

pub fn epoch_ms_to_date_string(epoch_ms: i64) -> String {
    // Used for display purposes
    match epoch_ms_to_date(epoch_ms) {
        Some(date) => date.format(TimeUtils::STANDARD_TIME_FORMAT).to_string(),
        None => "invalid-date".to_string(),
    }
}

/// A wall-clock budget that long-running fits poll from inside their iteration loops.
///
/// Async cancellation cannot interrupt a blocking numerical loop, so every EM / optimiser
/// iteration calls [`Deadline::check`] and bails out with [`AnalysisError::Timeout`].
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    expires: Option<Instant>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires: started.checked_add(budget),
        }
    }

    /// A deadline that never fires. Used by direct (non-engine) callers and tests.
    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            expires: None,
        }
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires
    }

    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|at| Instant::now() >= at)
    }

    pub fn check(&self) -> Result<(), AnalysisError> {
        if self.is_expired() {
            Err(AnalysisError::Timeout {
                millis: self.started.elapsed().as_millis() as u64,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_deadline_never_expires() {
        let deadline = Deadline::unbounded();
        assert!(!deadline.is_expired());
        assert!(deadline.check().is_ok());
    }

    #[test]
    fn zero_budget_expires_immediately() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(matches!(deadline.check(), Err(AnalysisError::Timeout { .. })));
    }

    #[test]
    fn date_string_uses_utc_calendar_day() {
        // 2024-01-02T00:00:00Z
        assert_eq!(epoch_ms_to_date_string(1_704_153_600_000), "2024-01-02");
    }
}
