// src/health/interceptor.rs
use super::context::CheckContext;
use super::state::CheckState;
use super::status::AvailabilityStatus;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// One call travelling down an interceptor chain.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub ctx: CheckContext,
    pub check_name: Arc<str>,
    pub state: CheckState,
}

/// The rest of the chain. Calling it eventually runs the probe.
pub type Next = Arc<dyn Fn(Invocation) -> BoxFuture<'static, CheckState> + Send + Sync>;

/// Wraps the rest of the chain. An interceptor that never calls `next`
/// prevents the probe from running and its returned state is used as is.
pub type Interceptor = Arc<dyn Fn(Next) -> Next + Send + Sync>;

/// Compose `interceptors` around `terminal`, first element outermost.
pub fn chain(interceptors: &[Interceptor], terminal: Next) -> Next {
    interceptors
        .iter()
        .rev()
        .fold(terminal, |next, interceptor| interceptor(next))
}

/// Logs every probe execution with its duration, verdict and a correlation id.
pub fn logging_interceptor() -> Interceptor {
    Arc::new(|next: Next| -> Next {
        Arc::new(move |invocation: Invocation| {
            let next = next.clone();
            async move {
                let cid = Uuid::new_v4();
                let check = invocation.check_name.clone();
                let start = Instant::now();

                let state = next(invocation).await;

                let elapsed_ms = start.elapsed().as_millis() as u64;
                match (&state.result, state.status) {
                    (Some(err), AvailabilityStatus::Down) => warn!(
                        %cid, check = %check, elapsed_ms, status = %state.status, error = %err,
                        "health check failed"
                    ),
                    _ => info!(
                        %cid, check = %check, elapsed_ms, status = %state.status,
                        "executed health check"
                    ),
                }
                state
            }
            .boxed()
        })
    })
}
