//! Subscriber installation and evaluation spans.

use crate::pipeline::{PipelineExecution, StageExecution};
use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "stagectx=info";

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Returns false if a global subscriber was already installed, which makes
/// repeated calls harmless.
pub fn init_logging(json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}

/// Span covering the evaluation of one stage context.
#[must_use]
pub fn stage_span(stage: &StageExecution, execution: &PipelineExecution) -> Span {
    tracing::debug_span!(
        "stage_context",
        execution_id = %execution.id(),
        application = execution.application(),
        stage = stage.ref_id(),
        stage_type = stage.stage_type(),
    )
}
