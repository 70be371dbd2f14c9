// src/health/result.rs
use super::state::CheckerState;
use super::status::AvailabilityStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Externally visible health of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: AvailabilityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Immutable result of `Checker::check`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Map<String, serde_json::Value>>,
    pub status: AvailabilityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, CheckResult>>,
}

impl CheckerResult {
    pub(crate) fn from_state(
        state: &CheckerState,
        details_disabled: bool,
        max_error_len: usize,
        info: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        let details = (!details_disabled && !state.checks.is_empty()).then(|| {
            state
                .checks
                .iter()
                .map(|(name, check)| {
                    let result = CheckResult {
                        status: check.status,
                        timestamp: check.last_checked_at,
                        error: check
                            .result
                            .as_ref()
                            .map(|err| truncate(&err.to_string(), max_error_len)),
                    };
                    (name.clone(), result)
                })
                .collect()
        });

        Self {
            info: info.cloned(),
            status: state.status,
            details,
        }
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
