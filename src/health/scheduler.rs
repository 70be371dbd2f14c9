// src/health/scheduler.rs
use super::check::{CheckDefinition, ExecutionMode};
use super::context::CheckContext;
use super::executor::{execute_with_interceptors, panic_message, receive_next, run_chain};
use super::interceptor::{Interceptor, Invocation, Next};
use super::store::{CheckUpdate, StateStore};
use futures::future::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Launches one task per scheduled or streaming check.
pub(crate) struct Scheduler {
    checks: Vec<Arc<CheckDefinition>>,
    store: Arc<StateStore>,
    interceptors: Arc<[Interceptor]>,
    timeout: Duration,
    running: Arc<AtomicUsize>,
}

/// Handle on the tasks of one `Scheduler::launch`. Every launch gets its own
/// stop signal, nothing is carried over from a previous run.
pub(crate) struct ScheduledRun {
    ctx: CheckContext,
    handles: Vec<JoinHandle<()>>,
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub(crate) fn new(
        checks: Vec<Arc<CheckDefinition>>,
        store: Arc<StateStore>,
        interceptors: Arc<[Interceptor]>,
        timeout: Duration,
    ) -> Self {
        Self {
            checks,
            store,
            interceptors,
            timeout,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Units currently alive, across runs.
    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn launch(&self) -> ScheduledRun {
        let ctx = CheckContext::new();

        let handles = self
            .checks
            .iter()
            .map(|check| {
                self.running.fetch_add(1, Ordering::SeqCst);
                let guard = RunningGuard(self.running.clone());
                let unit = run_unit(
                    check.clone(),
                    self.store.clone(),
                    self.interceptors.clone(),
                    self.timeout,
                    ctx.clone(),
                    guard,
                );
                tokio::spawn(abort_on_panic(check.name().to_string(), unit))
            })
            .collect();

        info!(count = self.checks.len(), "started scheduled health checks");

        ScheduledRun { ctx, handles }
    }
}

impl ScheduledRun {
    /// Signal every task to stop without waiting for them.
    pub(crate) fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Signal every task to stop and wait until all of them have exited.
    pub(crate) async fn shutdown(self) {
        self.ctx.cancel();

        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(%err, "scheduled health check task failed");
            }
        }

        info!("stopped scheduled health checks");
    }
}

/// A background unit has no caller to hand a panic to. A probe panic that
/// escaped containment (recovery disabled for its check) ends the process.
async fn abort_on_panic<F>(check: String, unit: F)
where
    F: Future<Output = ()>,
{
    if let Err(payload) = AssertUnwindSafe(unit).catch_unwind().await {
        error!(
            check = %check,
            panic = %panic_message(payload.as_ref()),
            "background health check panicked with recovery disabled, aborting"
        );
        std::process::abort();
    }
}

async fn run_unit(
    check: Arc<CheckDefinition>,
    store: Arc<StateStore>,
    interceptors: Arc<[Interceptor]>,
    timeout: Duration,
    ctx: CheckContext,
    _guard: RunningGuard,
) {
    match check.mode() {
        ExecutionMode::Scheduled {
            interval,
            initial_delay,
        } => {
            run_scheduled(&check, &store, &interceptors, timeout, &ctx, interval, initial_delay).await
        }
        ExecutionMode::Streaming => run_streaming(&check, &store, &interceptors, &ctx).await,
        ExecutionMode::OnDemand => {}
    }
}

async fn run_scheduled(
    check: &Arc<CheckDefinition>,
    store: &StateStore,
    interceptors: &[Interceptor],
    timeout: Duration,
    ctx: &CheckContext,
    interval: Duration,
    initial_delay: Duration,
) {
    if !initial_delay.is_zero() {
        debug!(check = %check.name(), delay = ?initial_delay, "delaying scheduled health check");
        tokio::select! {
            _ = sleep(initial_delay) => {}
            _ = ctx.done() => {
                debug!(check = %check.name(), "scheduled health check stopped during initial delay");
                return;
            }
        }
    }

    debug!(check = %check.name(), interval = ?interval, "scheduled health check running");

    loop {
        if ctx.is_done() {
            break;
        }

        let prior = store.check_state(check.name()).await.unwrap_or_default();
        let state = execute_with_interceptors(
            ctx.with_timeout(timeout),
            check.clone(),
            interceptors,
            prior,
        )
        .await;

        // A result produced while stopping is discarded.
        if ctx.is_done() {
            break;
        }

        store
            .merge(vec![CheckUpdate {
                name: check.name().to_string(),
                state,
            }])
            .await;

        tokio::select! {
            _ = sleep(interval) => {}
            _ = ctx.done() => break,
        }
    }

    debug!(check = %check.name(), "scheduled health check stopped");
}

async fn run_streaming(
    check: &Arc<CheckDefinition>,
    store: &StateStore,
    interceptors: &[Interceptor],
    ctx: &CheckContext,
) {
    debug!(check = %check.name(), "streaming health check running");

    let exhausted = Arc::new(AtomicBool::new(false));
    let terminal: Next = {
        let check = check.clone();
        let exhausted = exhausted.clone();
        Arc::new(move |invocation: Invocation| {
            let check = check.clone();
            let exhausted = exhausted.clone();
            async move {
                let prior = invocation.state.clone();
                match receive_next(&invocation.ctx, &check, invocation.state).await {
                    Some(state) => state,
                    None => {
                        exhausted.store(true, Ordering::SeqCst);
                        prior
                    }
                }
            }
            .boxed()
        })
    };

    loop {
        if ctx.is_done() {
            break;
        }

        let prior = store.check_state(check.name()).await.unwrap_or_default();
        let state = run_chain(ctx.clone(), check, interceptors, prior, terminal.clone()).await;

        if ctx.is_done() {
            break;
        }
        if exhausted.load(Ordering::SeqCst) {
            info!(check = %check.name(), "streaming health check closed by its producer");
            break;
        }

        store
            .merge(vec![CheckUpdate {
                name: check.name().to_string(),
                state,
            }])
            .await;
    }

    debug!(check = %check.name(), "streaming health check stopped");
}
