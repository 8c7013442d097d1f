//! Build orchestration for pkgsmith: dependency location, the per-package
//! pipeline, artifact signing, and repository publishing.

pub mod checksums;
pub mod error;
pub mod locate;
pub mod orchestrate;
pub mod publish;
pub mod sign;
pub mod srcpkg;

pub use error::EngineError;
pub use orchestrate::{run, run_with_prompt, BuildOptions, Outcome, ReportEntry, RunReport, RunState};
