// src/health/executor.rs
use super::check::{CheckDefinition, Source};
use super::context::CheckContext;
use super::error::CheckError;
use super::evaluator::evaluate;
use super::interceptor::{chain, Interceptor, Invocation, Next};
use super::state::CheckState;
use chrono::Utc;
use futures::future::FutureExt;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Run `check` once, starting from `prior`, and return its next state.
///
/// The per-check timeout (if any) tightens `ctx`. The returned state carries
/// the new verdict; listeners are notified by the state store on merge.
pub async fn execute(ctx: CheckContext, check: Arc<CheckDefinition>, prior: CheckState) -> CheckState {
    let exec_ctx = match check.timeout() {
        Some(timeout) => ctx.with_timeout(timeout),
        None => ctx,
    };

    let mut state = prior;
    state.mark_started(Utc::now());

    let outcome = run_probe(&exec_ctx, &check).await;

    state.record(outcome, Utc::now());
    state.status = evaluate(&state, check.policy());
    state
}

/// Run `check` through the global interceptors, then its own, then the engine.
pub async fn execute_with_interceptors(
    ctx: CheckContext,
    check: Arc<CheckDefinition>,
    global: &[Interceptor],
    prior: CheckState,
) -> CheckState {
    let terminal: Next = {
        let check = check.clone();
        Arc::new(move |invocation: Invocation| {
            execute(invocation.ctx, check.clone(), invocation.state).boxed()
        })
    };
    run_chain(ctx, &check, global, prior, terminal).await
}

/// Compose global and check-local interceptors around `terminal` and run it.
pub(crate) async fn run_chain(
    ctx: CheckContext,
    check: &CheckDefinition,
    global: &[Interceptor],
    prior: CheckState,
    terminal: Next,
) -> CheckState {
    let interceptors: Vec<Interceptor> = global
        .iter()
        .chain(check.interceptors.iter())
        .cloned()
        .collect();

    let invocation = Invocation {
        ctx,
        check_name: Arc::from(check.name()),
        state: prior,
    };
    chain(&interceptors, terminal)(invocation).await
}

/// Wait for the next outcome pushed to a streaming check and fold it into
/// `prior`. `None` when `ctx` finishes first or the producer is gone.
pub(crate) async fn receive_next(
    ctx: &CheckContext,
    check: &CheckDefinition,
    prior: CheckState,
) -> Option<CheckState> {
    let Source::Stream(outcomes) = &check.source else {
        return None;
    };

    let mut outcomes = tokio::select! {
        guard = outcomes.lock() => guard,
        _ = ctx.done() => return None,
    };

    let mut state = prior;
    state.mark_started(Utc::now());

    let outcome = tokio::select! {
        next = outcomes.recv() => next?,
        _ = ctx.done() => return None,
    };

    state.record(outcome.map_err(CheckError::from), Utc::now());
    state.status = evaluate(&state, check.policy());
    Some(state)
}

/// Race the probe against `ctx`.
///
/// The probe runs as its own task so a hanging probe cannot block the caller.
/// When `ctx` finishes first the probe is abandoned: its context is cancelled
/// and its eventual result is dropped.
async fn run_probe(ctx: &CheckContext, check: &CheckDefinition) -> Result<(), CheckError> {
    let probe_ctx = ctx.child();
    let _cancel_probe = probe_ctx.cancel_on_drop();

    let probe = match &check.source {
        Source::Probe(probe) => probe.clone(),
        Source::Stream(_) => {
            return Err(CheckError::Failed(format!(
                "{} reports its own outcomes and cannot be polled",
                check.name()
            )))
        }
    };
    let mut handle = tokio::spawn(async move { probe.check(probe_ctx).await });

    tokio::select! {
        joined = &mut handle => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CheckError::from(err)),
            Err(join_err) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                if check.panic_recovery_disabled {
                    error!(check = %check.name(), "health check panicked, recovery disabled");
                    std::panic::resume_unwind(payload);
                }
                let message = panic_message(payload.as_ref());
                warn!(check = %check.name(), panic = %message, "recovered from health check panic");
                Err(CheckError::Panicked(message))
            }
            Err(join_err) => Err(CheckError::Failed(join_err.to_string())),
        },
        _ = ctx.done() => {
            debug!(check = %check.name(), "health check timed out, abandoning probe");
            Err(CheckError::TimedOut)
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(err) = payload.downcast_ref::<anyhow::Error>() {
        err.to_string()
    } else {
        "health check panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::check::{probe_fn, FailurePolicy};
    use crate::health::status::AvailabilityStatus;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    fn check<F, Fut>(f: F) -> Arc<CheckDefinition>
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Arc::new(CheckDefinition::new("check", probe_fn(f)))
    }

    #[tokio::test]
    async fn test_success() {
        let ck = check(|_| async { Ok(()) });
        let state = execute(CheckContext::new(), ck, CheckState::default()).await;

        assert!(state.result.is_none());
        assert_eq!(state.status, AvailabilityStatus::Up);
        assert!(state.last_success_at.is_some());
        assert!(state.first_check_started_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_keeps_timestamps() {
        let ck = check(|_| async { Err(anyhow::anyhow!("ohi")) });
        let earlier = Utc::now() - chrono::Duration::minutes(5);
        let prior = CheckState {
            first_check_started_at: Some(earlier),
            last_checked_at: Some(earlier),
            last_success_at: Some(earlier),
            ..Default::default()
        };

        let state = execute(CheckContext::new(), ck, prior).await;

        assert!(state.last_checked_at.unwrap() > earlier);
        assert_eq!(state.last_success_at, Some(earlier));
        assert_eq!(state.first_check_started_at, Some(earlier));
        assert_eq!(state.contiguous_fails, 1);
        assert_eq!(state.result, Some(CheckError::Failed("ohi".into())));
        assert_eq!(state.status, AvailabilityStatus::Down);
    }

    #[tokio::test]
    async fn test_timeout_abandons_probe() {
        let observed_cancel = Arc::new(AtomicBool::new(false));
        let flag = observed_cancel.clone();
        let ck = Arc::new(
            CheckDefinition::new(
                "slow",
                probe_fn(move |ctx: CheckContext| {
                    let flag = flag.clone();
                    async move {
                        ctx.done().await;
                        flag.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .with_timeout(Duration::from_millis(10)),
        );

        let state = execute(CheckContext::new(), ck, CheckState::default()).await;

        assert_eq!(state.result, Some(CheckError::TimedOut));
        assert_eq!(state.result.as_ref().unwrap().to_string(), "check timed out");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(observed_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_hanging_probe_does_not_block() {
        let ck = check(|_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        let ctx = CheckContext::new().with_timeout(Duration::from_millis(20));

        let state = tokio::time::timeout(
            Duration::from_secs(2),
            execute(ctx, ck, CheckState::default()),
        )
        .await
        .expect("execution must be bounded by the context");

        assert!(state.result.unwrap().is_timeout());
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let ck = check(|_| async { panic!("boom") });
        let state = execute(CheckContext::new(), ck, CheckState::default()).await;

        assert_eq!(state.result, Some(CheckError::Panicked("boom".into())));
        assert_eq!(state.result.as_ref().unwrap().to_string(), "boom");
        assert_eq!(state.status, AvailabilityStatus::Down);
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn test_panic_propagates_when_recovery_disabled() {
        let ck = Arc::new(
            CheckDefinition::new("check", probe_fn(|_| async { panic!("boom") }))
                .disable_panic_recovery(),
        );
        execute(CheckContext::new(), ck, CheckState::default()).await;
    }

    #[tokio::test]
    async fn test_tolerated_failure_stays_up() {
        let ck = Arc::new(
            CheckDefinition::new("check", probe_fn(|_| async { Err(anyhow::anyhow!("down")) }))
                .with_policy(FailurePolicy::new(3, Duration::ZERO)),
        );
        let mut state = CheckState::default();
        for expected in [AvailabilityStatus::Up, AvailabilityStatus::Up, AvailabilityStatus::Down] {
            state = execute(CheckContext::new(), ck.clone(), state).await;
            assert_eq!(state.status, expected);
        }
    }

    #[tokio::test]
    async fn test_interceptors_run_global_then_local() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let tag = |label: &'static str| -> Interceptor {
            let order = order.clone();
            Arc::new(move |next: Next| -> Next {
                let order = order.clone();
                Arc::new(move |invocation: Invocation| {
                    order.lock().unwrap().push(label);
                    next(invocation)
                })
            })
        };
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let ck = Arc::new(
            CheckDefinition::new(
                "check",
                probe_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                }),
            )
            .with_interceptor(tag("local")),
        );

        execute_with_interceptors(
            CheckContext::new(),
            ck,
            &[tag("global-1"), tag("global-2")],
            CheckState::default(),
        )
        .await;

        assert_eq!(*order.lock().unwrap(), vec!["global-1", "global-2", "local"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
