// src/health/store.rs
use super::check::CheckDefinition;
use super::state::{CheckState, CheckerState};
use super::status::AvailabilityStatus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Called with a snapshot of the whole checker state whenever the aggregate
/// verdict changes.
pub type StatusListener = Arc<dyn Fn(&CheckerState) + Send + Sync>;

/// A freshly computed state for one check, waiting to be merged.
#[derive(Debug, Clone)]
pub struct CheckUpdate {
    pub name: String,
    pub state: CheckState,
}

/// Single point of mutation for the checker state.
///
/// Writers are serialized through one lock. Listeners are called after the
/// lock is released, with snapshots taken while it was held.
pub struct StateStore {
    state: RwLock<CheckerState>,
    checks: HashMap<String, Arc<CheckDefinition>>,
    listener: Option<StatusListener>,
}

impl StateStore {
    pub fn new(checks: &[Arc<CheckDefinition>], listener: Option<StatusListener>) -> Self {
        let state = CheckerState::new(checks.iter().map(|c| c.name().to_string()));
        let checks = checks
            .iter()
            .map(|c| (c.name().to_string(), c.clone()))
            .collect();

        Self {
            state: RwLock::new(state),
            checks,
            listener,
        }
    }

    /// Apply `updates`, then recompute the aggregate verdict.
    pub async fn merge(&self, updates: Vec<CheckUpdate>) -> CheckerState {
        let mut changed_checks = Vec::new();
        let mut aggregate_changed = None;

        let snapshot = {
            let mut state = self.state.write().await;

            for update in updates {
                let Some(slot) = state.checks.get_mut(&update.name) else {
                    continue;
                };
                let previous = std::mem::replace(slot, update.state);
                if previous.status != slot.status {
                    changed_checks.push((update.name, slot.clone()));
                }
            }

            let previous = state.status;
            state.status = state.aggregate();
            if previous != state.status {
                aggregate_changed = Some((previous, state.status));
            }

            state.clone()
        };

        for (name, check_state) in &changed_checks {
            if let Some(check) = self.checks.get(name) {
                check.notify(check_state);
            }
        }

        if let Some((from, to)) = aggregate_changed {
            info!(from = %from, to = %to, "aggregated health status changed");
            if let Some(listener) = &self.listener {
                listener(&snapshot);
            }
        }

        snapshot
    }

    pub async fn check_state(&self, name: &str) -> Option<CheckState> {
        self.state.read().await.checks.get(name).cloned()
    }

    pub async fn snapshot(&self) -> CheckerState {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> AvailabilityStatus {
        self.state.read().await.status
    }
}
