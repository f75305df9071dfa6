//! Observability utilities.

mod logging;
mod timer;

pub use logging::{env_filter, init_tracing, LogFormat, LOG_ENV};
pub use timer::SpanTimer;
