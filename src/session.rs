//! Mining session records and accrual arithmetic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// The full session table, keyed by entity id.
pub type SessionTable = BTreeMap<String, MiningSession>;

/// A single timed mining session for one entity.
///
/// Everything except `accrued_estimate` is fixed at creation. The estimate is
/// a cache: the authoritative amount is always [`MiningSession::accrued_at`],
/// which depends only on the current time and the immutable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiningSession {
    pub entity_id: String,
    pub start_time: OffsetDateTime,
    pub total_duration_secs: u64,
    pub end_time: OffsetDateTime,
    /// Reward units per hour, bonus included.
    pub effective_rate: f64,
    pub is_active: bool,
    pub accrued_estimate: f64,
}

impl MiningSession {
    pub fn new(
        entity_id: impl Into<String>,
        start_time: OffsetDateTime,
        total_duration: Duration,
        effective_rate: f64,
    ) -> Self {
        // Saturates at the last whole second before the largest representable instant
        let headroom = (PrimitiveDateTime::MAX.assume_utc() - start_time).whole_seconds();
        let total_duration_secs = total_duration.whole_seconds().clamp(0, headroom.max(0));
        Self {
            entity_id: entity_id.into(),
            start_time,
            total_duration_secs: total_duration_secs as u64,
            end_time: start_time + Duration::seconds(total_duration_secs),
            effective_rate,
            is_active: true,
            accrued_estimate: 0.0,
        }
    }

    /// Whether the record still satisfies the invariants fixed at creation:
    /// `end_time` derived from `start_time` and the duration, and a finite,
    /// non-negative rate.
    pub fn is_consistent(&self) -> bool {
        let derived_end = i64::try_from(self.total_duration_secs)
            .ok()
            .and_then(|secs| self.start_time.checked_add(Duration::seconds(secs)));

        derived_end == Some(self.end_time)
            && self.effective_rate.is_finite()
            && self.effective_rate >= 0.0
            && self.accrued_estimate.is_finite()
    }

    /// Seconds of mining credited at `now`, clamped to `[0, total_duration]`.
    pub fn elapsed_secs(&self, now: OffsetDateTime) -> f64 {
        let elapsed = (now - self.start_time).as_seconds_f64();
        elapsed.clamp(0.0, self.total_duration_secs as f64)
    }

    /// Reward earned at `now`.
    pub fn accrued_at(&self, now: OffsetDateTime) -> f64 {
        self.elapsed_secs(now) * self.effective_rate / SECONDS_PER_HOUR
    }

    /// Seconds left until the deadline, never negative.
    pub fn time_remaining_secs(&self, now: OffsetDateTime) -> f64 {
        (self.end_time - now).as_seconds_f64().max(0.0)
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.end_time
    }

    /// Refreshes the cached estimate without ever lowering it.
    pub fn refresh_estimate(&mut self, now: OffsetDateTime) -> f64 {
        self.accrued_estimate = self.accrued_estimate.max(self.accrued_at(now));
        self.accrued_estimate
    }

    pub fn status(&self, now: OffsetDateTime) -> SessionStatus {
        SessionStatus {
            is_active: self.is_active && !self.is_expired(now),
            time_remaining_secs: self.time_remaining_secs(now),
            accrued_estimate: self.accrued_estimate,
        }
    }
}

/// Snapshot returned by status queries.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    pub is_active: bool,
    /// Fractional seconds; rounding is left to the display layer.
    pub time_remaining_secs: f64,
    pub accrued_estimate: f64,
}

impl SessionStatus {
    /// Status of an entity with no session.
    pub fn idle() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn session() -> MiningSession {
        MiningSession::new("main", datetime!(2024-01-01 00:00 UTC), Duration::hours(8), 1200.0)
    }

    #[test]
    fn end_time_is_derived_from_duration() {
        let session = session();
        assert_eq!(session.total_duration_secs, 28_800);
        assert_eq!(session.end_time, datetime!(2024-01-01 08:00 UTC));
    }

    #[test]
    fn accrual_is_prorated_and_clamped() {
        let session = session();
        let start = session.start_time;

        assert_eq!(session.accrued_at(start - Duration::minutes(5)), 0.0);
        assert!((session.accrued_at(start + Duration::minutes(30)) - 600.0).abs() < 1e-9);
        assert!((session.accrued_at(start + Duration::hours(8)) - 9600.0).abs() < 1e-9);
        assert!((session.accrued_at(start + Duration::days(3)) - 9600.0).abs() < 1e-9);
    }

    #[test]
    fn time_remaining_keeps_fractions_and_floors_at_zero() {
        let session = session();
        let now = session.end_time - Duration::milliseconds(1500);

        assert!((session.time_remaining_secs(now) - 1.5).abs() < 1e-9);
        assert_eq!(session.time_remaining_secs(session.end_time + Duration::hours(1)), 0.0);
    }

    #[test]
    fn estimate_never_decreases() {
        let mut session = session();
        let start = session.start_time;

        session.refresh_estimate(start + Duration::hours(2));
        // clock stepped backwards
        let estimate = session.refresh_estimate(start + Duration::hours(1));

        assert!((estimate - 2400.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_duration_saturates_instead_of_overflowing() {
        let session = MiningSession::new(
            "main",
            datetime!(2024-01-01 00:00 UTC),
            Duration::MAX,
            1000.0,
        );

        assert_eq!(session.end_time.year(), 9999);
        assert!(session.end_time <= PrimitiveDateTime::MAX.assume_utc());
        assert!(session.is_consistent());
    }

    #[test]
    fn tampered_records_are_inconsistent() {
        let mut shifted = session();
        shifted.end_time += Duration::hours(1);
        assert!(!shifted.is_consistent());

        let mut broken_rate = session();
        broken_rate.effective_rate = f64::NAN;
        assert!(!broken_rate.is_consistent());

        assert!(session().is_consistent());
    }

    #[test]
    fn status_reports_expired_session_as_inactive() {
        let session = session();
        let status = session.status(session.end_time);

        assert!(!status.is_active);
        assert_eq!(status.time_remaining_secs, 0.0);
    }
}
