// src/health/state.rs
use super::error::CheckError;
use super::status::{self, AvailabilityStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::time::Instant;

/// Accumulated state of one check. Owned by the state store; everything else
/// works on copies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckState {
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Set by the first invocation and never reset.
    pub first_check_started_at: Option<DateTime<Utc>>,
    pub contiguous_fails: u32,
    /// `None` when the last invocation succeeded.
    pub result: Option<CheckError>,
    pub status: AvailabilityStatus,
    pub(crate) marks: Marks,
}

/// Monotonic readings taken alongside the wall-clock timestamps. Elapsed-time
/// decisions use these when present, so a stepped system clock cannot freeze
/// the cache or the tolerance window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Marks {
    pub(crate) checked: Option<Instant>,
    pub(crate) success: Option<Instant>,
    pub(crate) first_started: Option<Instant>,
}

impl CheckState {
    /// Apply one probe outcome observed at `at`. The verdict is left to the caller.
    pub fn record(&mut self, outcome: Result<(), CheckError>, at: DateTime<Utc>) {
        let mono = Instant::now();
        self.mark_started(at);
        self.last_checked_at = Some(at);
        self.marks.checked = Some(mono);

        match outcome {
            Ok(()) => {
                self.contiguous_fails = 0;
                self.last_success_at = Some(at);
                self.marks.success = Some(mono);
                self.result = None;
            }
            Err(err) => {
                self.contiguous_fails = self.contiguous_fails.saturating_add(1);
                self.last_failure_at = Some(at);
                self.result = Some(err);
            }
        }
    }

    /// Stamp the first attempt. Later calls keep the original value.
    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        if self.first_check_started_at.is_none() {
            self.first_check_started_at = Some(at);
            self.marks.first_started = Some(Instant::now());
        }
    }

    pub fn is_success(&self) -> bool {
        self.last_checked_at.is_some() && self.result.is_none()
    }
}

/// Aggregated verdict plus the state of every registered check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerState {
    pub status: AvailabilityStatus,
    pub checks: BTreeMap<String, CheckState>,
}

impl CheckerState {
    pub(crate) fn new<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let checks: BTreeMap<_, _> = names
            .into_iter()
            .map(|name| (name, CheckState::default()))
            .collect();
        let mut state = Self {
            status: AvailabilityStatus::Unknown,
            checks,
        };
        state.status = state.aggregate();
        state
    }

    pub(crate) fn aggregate(&self) -> AvailabilityStatus {
        status::aggregate(self.checks.values().map(|s| s.status))
    }
}
