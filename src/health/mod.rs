// src/health/mod.rs
mod check;
mod checker;
mod context;
mod error;
mod evaluator;
mod executor;
mod interceptor;
mod result;
mod scheduler;
mod state;
mod status;
mod store;

pub use check::{
    probe_fn, CheckDefinition, CheckStatusListener, ExecutionMode, FailurePolicy, FnProbe, OutcomeSender, Probe,
};
pub use checker::{
    Checker, CheckerBuilder, DEFAULT_CACHE_TTL, DEFAULT_MAX_ERROR_MESSAGE_LENGTH, DEFAULT_TIMEOUT,
};
pub use context::CheckContext;
pub use error::{CheckError, ConfigError};
pub use evaluator::{evaluate, evaluate_at};
pub use executor::{execute, execute_with_interceptors};
pub use interceptor::{chain, logging_interceptor, Interceptor, Invocation, Next};
pub use result::{CheckResult, CheckerResult};
pub use state::{CheckState, CheckerState};
pub use status::{aggregate, AvailabilityStatus};
pub use store::{CheckUpdate, StateStore, StatusListener};
