// src/health/checker.rs
use super::check::{CheckDefinition, ExecutionMode, Source};
use super::context::CheckContext;
use super::error::ConfigError;
use super::executor::execute_with_interceptors;
use super::interceptor::Interceptor;
use super::result::CheckerResult;
use super::scheduler::{ScheduledRun, Scheduler};
use super::state::{CheckState, CheckerState};
use super::store::{CheckUpdate, StateStore, StatusListener};
use crate::config::Settings;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// Registration surface of a [`Checker`]. Consumed by `build()`.
pub struct CheckerBuilder {
    checks: Vec<CheckDefinition>,
    timeout: Duration,
    cache_ttl: Duration,
    details_disabled: bool,
    max_error_message_length: usize,
    listener: Option<StatusListener>,
    interceptors: Vec<Interceptor>,
    info: serde_json::Map<String, serde_json::Value>,
}

impl Default for CheckerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckerBuilder {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            details_disabled: false,
            max_error_message_length: DEFAULT_MAX_ERROR_MESSAGE_LENGTH,
            listener: None,
            interceptors: Vec::new(),
            info: serde_json::Map::new(),
        }
    }

    /// Engine-level options taken from loaded settings. Checks are added separately.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut builder = Self::new()
            .with_timeout(settings.timeout())
            .with_cache_ttl(settings.cache_ttl())
            .with_max_error_message_length(settings.max_error_message_length);
        if settings.details_disabled {
            builder = builder.disable_details();
        }
        for (key, value) in &settings.info {
            builder = builder.with_info(key.clone(), value.clone());
        }
        builder
    }

    /// Add a check. Its execution mode decides whether it runs on demand or on a schedule.
    pub fn with_check(mut self, check: CheckDefinition) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_scheduled_check(
        self,
        interval: Duration,
        initial_delay: Duration,
        check: CheckDefinition,
    ) -> Self {
        self.with_check(check.scheduled(interval, initial_delay))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long an on-demand result is reused. Zero disables caching.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn disable_cache(self) -> Self {
        self.with_cache_ttl(Duration::ZERO)
    }

    pub fn disable_details(mut self) -> Self {
        self.details_disabled = true;
        self
    }

    pub fn with_max_error_message_length(mut self, length: usize) -> Self {
        self.max_error_message_length = length;
        self
    }

    pub fn with_status_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&CheckerState) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Global interceptors run before every check's own interceptors.
    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Checker, ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                field: "timeout",
                reason: "must be positive".to_string(),
            });
        }

        let mut names = HashSet::new();
        for check in &self.checks {
            if check.name().trim().is_empty() {
                return Err(ConfigError::EmptyCheckName);
            }
            if !names.insert(check.name().to_string()) {
                return Err(ConfigError::DuplicateCheckName(check.name().to_string()));
            }
            match (check.mode(), &check.source) {
                (ExecutionMode::Scheduled { interval, .. }, _) if interval.is_zero() => {
                    return Err(ConfigError::ZeroInterval(check.name().to_string()));
                }
                (ExecutionMode::Streaming, Source::Probe(_))
                | (ExecutionMode::OnDemand | ExecutionMode::Scheduled { .. }, Source::Stream(_)) => {
                    return Err(ConfigError::InvalidSetting {
                        field: "mode",
                        reason: format!(
                            "{} must be streaming exactly when it reports its own outcomes",
                            check.name()
                        ),
                    });
                }
                _ => {}
            }
        }

        let checks: Vec<Arc<CheckDefinition>> = self.checks.into_iter().map(Arc::new).collect();
        let (background, on_demand): (Vec<_>, Vec<_>) =
            checks.iter().cloned().partition(|c| c.runs_in_background());

        let store = Arc::new(StateStore::new(&checks, self.listener));
        let interceptors: Arc<[Interceptor]> = Arc::from(self.interceptors);
        let scheduler = Scheduler::new(background, store.clone(), interceptors.clone(), self.timeout);

        Ok(Checker {
            inner: Arc::new(Inner {
                on_demand,
                store,
                scheduler,
                interceptors,
                timeout: self.timeout,
                cache_ttl: self.cache_ttl,
                details_disabled: self.details_disabled,
                max_error_message_length: self.max_error_message_length,
                info: (!self.info.is_empty()).then_some(self.info),
                round: Mutex::new(()),
                run: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        })
    }
}

/// Aggregates the availability of all registered checks.
///
/// Cheap to clone; clones share the same state and lifecycle.
#[derive(Clone)]
pub struct Checker {
    inner: Arc<Inner>,
}

struct Inner {
    on_demand: Vec<Arc<CheckDefinition>>,
    store: Arc<StateStore>,
    scheduler: Scheduler,
    interceptors: Arc<[Interceptor]>,
    timeout: Duration,
    cache_ttl: Duration,
    details_disabled: bool,
    max_error_message_length: usize,
    info: Option<serde_json::Map<String, serde_json::Value>>,
    // Serializes on-demand rounds.
    round: Mutex<()>,
    // Held across a whole start or stop, so lifecycle changes never overlap.
    run: Mutex<Option<ScheduledRun>>,
    started: AtomicBool,
}

impl Checker {
    pub fn builder() -> CheckerBuilder {
        CheckerBuilder::new()
    }

    /// Start the scheduled and streaming checks. Has no effect if already
    /// started. Waits for a `stop()` in progress to finish first.
    pub async fn start(&self) {
        let mut run = self.inner.run.lock().await;
        if run.is_none() {
            *run = Some(self.inner.scheduler.launch());
            self.inner.started.store(true, Ordering::SeqCst);
        }
    }

    /// Stop the background checks and wait until every one of them has
    /// exited. Concurrent callers all wait for the same shutdown.
    pub async fn stop(&self) {
        let mut run = self.inner.run.lock().await;
        if let Some(active) = run.take() {
            active.shutdown().await;
            self.inner.started.store(false, Ordering::SeqCst);
        }
    }

    /// True from `start()` until a `stop()` has fully completed.
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Background units that are still alive, including ones winding down.
    pub fn running_scheduled_check_count(&self) -> usize {
        self.inner.scheduler.running()
    }

    /// Run every on-demand check whose cached result expired, then report the
    /// aggregated state. Never fails: probe failures only degrade the status.
    pub async fn check(&self, ctx: &CheckContext) -> CheckerResult {
        let ctx = ctx.with_timeout(self.inner.timeout);
        let state = self.run_on_demand_checks(&ctx).await;
        self.to_result(&state)
    }

    /// Current state without running anything.
    pub async fn state(&self) -> CheckerState {
        self.inner.store.snapshot().await
    }

    async fn run_on_demand_checks(&self, ctx: &CheckContext) -> CheckerState {
        let inner = &self.inner;
        if inner.on_demand.is_empty() {
            return inner.store.snapshot().await;
        }

        let _round = tokio::select! {
            guard = inner.round.lock() => guard,
            _ = ctx.done() => {
                warn!("deadline expired while waiting for a running health check round");
                return inner.store.snapshot().await;
            }
        };

        let now = Instant::now();
        let mut stale = Vec::new();
        for check in &inner.on_demand {
            let prior = inner.store.check_state(check.name()).await.unwrap_or_default();
            if is_cache_expired(&prior, inner.cache_ttl, now) {
                stale.push((check.clone(), prior));
            }
        }

        if stale.is_empty() {
            debug!("all on-demand health checks served from cache");
            return inner.store.snapshot().await;
        }

        let launched = stale.len();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handles: Vec<JoinHandle<()>> = stale
            .into_iter()
            .map(|(check, prior)| {
                let tx = tx.clone();
                let ctx = ctx.clone();
                let store = inner.store.clone();
                let interceptors = inner.interceptors.clone();
                tokio::spawn(async move {
                    let name = check.name().to_string();
                    let state = execute_with_interceptors(ctx, check, &interceptors, prior).await;
                    if let Err(mpsc::error::SendError(update)) = tx.send(CheckUpdate { name, state }) {
                        // The round stopped waiting for us.
                        store.merge(vec![update]).await;
                    }
                })
            })
            .collect();
        drop(tx);

        let mut updates = Vec::with_capacity(launched);
        let mut units_lost = false;
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(update) => {
                        updates.push(update);
                        if updates.len() == launched {
                            break;
                        }
                    }
                    None => {
                        units_lost = true;
                        break;
                    }
                },
                _ = ctx.done() => {
                    warn!(
                        pending = launched - updates.len(),
                        "deadline expired before all health checks reported"
                    );
                    break;
                }
            }
        }
        rx.close();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }

        if units_lost {
            // Every sender is gone, so every unit has finished.
            for handle in handles {
                if let Err(err) = handle.await {
                    if err.is_panic() {
                        std::panic::resume_unwind(err.into_panic());
                    }
                }
            }
        }

        inner.store.merge(updates).await
    }

    fn to_result(&self, state: &CheckerState) -> CheckerResult {
        CheckerResult::from_state(
            state,
            self.inner.details_disabled,
            self.inner.max_error_message_length,
            self.inner.info.as_ref(),
        )
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            info!("checker dropped while started, cancelling scheduled health checks");
            run.cancel();
        }
    }
}

fn is_cache_expired(state: &CheckState, ttl: Duration, now: Instant) -> bool {
    let Some(checked_at) = state.last_checked_at else {
        return true;
    };
    if ttl.is_zero() {
        return true;
    }
    match state.marks.checked {
        Some(mark) => now.saturating_duration_since(mark) >= ttl,
        // No monotonic reading (set by an interceptor): a timestamp in the
        // future counts as expired.
        None => (Utc::now() - checked_at).to_std().map_or(true, |age| age >= ttl),
    }
}
