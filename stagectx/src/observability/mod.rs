//! Observability utilities.

mod logging;

pub use logging::{init_logging, stage_span, DEFAULT_LOG_FILTER};
