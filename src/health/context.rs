// src/health/context.rs
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancellable execution context handed to probes, interceptors and the engine.
///
/// A context is done once its token is cancelled or its deadline passes.
/// Children share the parent's deadline (possibly tightened) and are cancelled
/// together with the parent, never the other way round.
#[derive(Debug, Clone)]
pub struct CheckContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CheckContext {
    /// A fresh root context with no deadline.
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Child context bounded by `timeout` from now, or by the inherited
    /// deadline if that one is earlier.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Child context that keeps the current deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled or its deadline has passed.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Cancels this context when the returned guard is dropped.
    pub(crate) fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}

impl Default for CheckContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_keeps_earlier_deadline() {
        let outer = CheckContext::new().with_timeout(Duration::from_millis(50));
        let inner = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(inner.deadline(), outer.deadline());

        let tighter = outer.with_timeout(Duration::from_millis(1));
        assert!(tighter.deadline() < outer.deadline());
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_child() {
        let parent = CheckContext::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_done());
        child.done().await;
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let parent = CheckContext::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test]
    async fn test_deadline_resolves_done() {
        let ctx = CheckContext::new().with_timeout(Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(1), ctx.done())
            .await
            .expect("deadline should fire");
        assert!(ctx.is_done());
    }
}
