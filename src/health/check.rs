// src/health/check.rs
use super::context::CheckContext;
use super::interceptor::Interceptor;
use super::state::CheckState;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Determines the availability of one component.
///
/// `Ok(())` means available. Implementations should return promptly once
/// `ctx.done()` resolves; a probe that ignores it is abandoned, not killed.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, ctx: CheckContext) -> anyhow::Result<()>;
}

/// Adapts an async closure into a [`Probe`].
pub struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn check(&self, ctx: CheckContext) -> anyhow::Result<()> {
        (self.0)(ctx).await
    }
}

pub fn probe_fn<F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnProbe(f)
}

/// Called with the check name and its new state whenever the verdict changes.
pub type CheckStatusListener = Arc<dyn Fn(&str, &CheckState) + Send + Sync>;

/// How much probe failure is absorbed before a check is reported `down`.
///
/// Both thresholds must be crossed. The zero policy reports `down` on the
/// first failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePolicy {
    pub max_contiguous_fails: u32,
    pub max_time_in_error: Duration,
}

impl FailurePolicy {
    pub fn new(max_contiguous_fails: u32, max_time_in_error: Duration) -> Self {
        Self {
            max_contiguous_fails,
            max_time_in_error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Executed by `Checker::check` when the cached result has expired.
    OnDemand,
    /// Executed on a fixed schedule, independent of requests.
    Scheduled {
        interval: Duration,
        initial_delay: Duration,
    },
    /// Outcomes are pushed by the check itself through a channel.
    Streaming,
}

/// Sending half handed to the producer of a streaming check.
pub type OutcomeSender = mpsc::Sender<anyhow::Result<()>>;

/// Where a check's outcomes come from.
#[derive(Clone)]
pub(crate) enum Source {
    Probe(Arc<dyn Probe>),
    // Shared so a restarted engine resumes on the same channel.
    Stream(Arc<Mutex<mpsc::Receiver<anyhow::Result<()>>>>),
}

/// Immutable definition of a registered check.
#[derive(Clone)]
pub struct CheckDefinition {
    pub(crate) name: String,
    pub(crate) source: Source,
    pub(crate) timeout: Option<Duration>,
    pub(crate) policy: FailurePolicy,
    pub(crate) listener: Option<CheckStatusListener>,
    pub(crate) interceptors: Vec<Interceptor>,
    pub(crate) mode: ExecutionMode,
    pub(crate) panic_recovery_disabled: bool,
}

impl CheckDefinition {
    pub fn new(name: impl Into<String>, probe: impl Probe + 'static) -> Self {
        Self {
            name: name.into(),
            source: Source::Probe(Arc::new(probe)),
            timeout: None,
            policy: FailurePolicy::default(),
            listener: None,
            interceptors: Vec::new(),
            mode: ExecutionMode::OnDemand,
            panic_recovery_disabled: false,
        }
    }

    /// A check that reports its own outcomes: every `Ok(())` or `Err(..)` sent
    /// on `outcomes` is evaluated and merged as one invocation. Runs while the
    /// engine is started and ends once every sender is dropped.
    pub fn streaming(name: impl Into<String>, outcomes: mpsc::Receiver<anyhow::Result<()>>) -> Self {
        Self {
            name: name.into(),
            source: Source::Stream(Arc::new(Mutex::new(outcomes))),
            timeout: None,
            policy: FailurePolicy::default(),
            listener: None,
            interceptors: Vec::new(),
            mode: ExecutionMode::Streaming,
            panic_recovery_disabled: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_contiguous_fails(mut self, fails: u32) -> Self {
        self.policy.max_contiguous_fails = fails;
        self
    }

    pub fn with_max_time_in_error(mut self, duration: Duration) -> Self {
        self.policy.max_time_in_error = duration;
        self
    }

    pub fn with_status_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str, &CheckState) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Run on a fixed `interval` after waiting `initial_delay`.
    pub fn scheduled(mut self, interval: Duration, initial_delay: Duration) -> Self {
        self.mode = ExecutionMode::Scheduled {
            interval,
            initial_delay,
        };
        self
    }

    /// Let probe panics propagate instead of turning them into failures.
    pub fn disable_panic_recovery(mut self) -> Self {
        self.panic_recovery_disabled = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    pub fn policy(&self) -> &FailurePolicy {
        &self.policy
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Scheduled and streaming checks run in the background, not on `check()`.
    pub fn runs_in_background(&self) -> bool {
        self.mode != ExecutionMode::OnDemand
    }

    pub(crate) fn notify(&self, state: &CheckState) {
        if let Some(listener) = &self.listener {
            listener(&self.name, state);
        }
    }
}

impl fmt::Debug for CheckDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckDefinition")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .field("mode", &self.mode)
            .field("interceptors", &self.interceptors.len())
            .field("panic_recovery_disabled", &self.panic_recovery_disabled)
            .finish()
    }
}
