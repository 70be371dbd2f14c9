// src/health/evaluator.rs
use super::check::FailurePolicy;
use super::state::CheckState;
use super::status::AvailabilityStatus;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Verdict for `state` right now. Elapsed times come from the monotonic
/// clock when the state carries monotonic readings.
pub fn evaluate(state: &CheckState, policy: &FailurePolicy) -> AvailabilityStatus {
    let now = Utc::now();
    let mono_now = Instant::now();
    decide(state, policy, |wall, mono| match mono {
        Some(at) => mono_now.saturating_duration_since(at),
        None => elapsed(wall, now),
    })
}

/// Verdict for `state` as seen at wall-clock time `now`.
///
/// A failing check is `down` only once it has failed at least
/// `max_contiguous_fails` times in a row AND has been in error for
/// `max_time_in_error`, measured both from its first attempt and from its
/// last success. A check that never succeeded still gets the grace period
/// counted from its first attempt.
pub fn evaluate_at(
    state: &CheckState,
    policy: &FailurePolicy,
    now: DateTime<Utc>,
) -> AvailabilityStatus {
    decide(state, policy, |wall, _| elapsed(wall, now))
}

fn decide<F>(state: &CheckState, policy: &FailurePolicy, elapsed_since: F) -> AvailabilityStatus
where
    F: Fn(DateTime<Utc>, Option<Instant>) -> Duration,
{
    if state.last_checked_at.is_none() {
        return AvailabilityStatus::Unknown;
    }
    if state.result.is_none() {
        return AvailabilityStatus::Up;
    }

    let exceeded = |wall: Option<DateTime<Utc>>, mono: Option<Instant>| match wall {
        Some(at) => elapsed_since(at, mono) >= policy.max_time_in_error,
        None => true,
    };

    let time_threshold_crossed = exceeded(state.first_check_started_at, state.marks.first_started)
        && exceeded(state.last_success_at, state.marks.success);
    let fail_threshold_crossed = state.contiguous_fails >= policy.max_contiguous_fails;

    if time_threshold_crossed && fail_threshold_crossed {
        AvailabilityStatus::Down
    } else {
        AvailabilityStatus::Up
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
