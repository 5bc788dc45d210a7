mod assemble;
mod parse;
mod pipeline;

pub use assemble::{assemble_bundle, render_bundle, BundleBudget};
pub use parse::parse_report;
pub use pipeline::{Pipeline, PipelineOutcome, PipelineRunner};

/// Version stamped into every report's meta.engine_version.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
