//! Error types for pkgsmith-engine.

use pkgsmith_arch::Arch;

/// Errors that end a pipeline run.
///
/// Only the fatal taxonomy lives here; recoverable conditions (a dependency
/// miss, a failed install, a signing failure for one artifact) are logged
/// and recorded as degradations on the run report instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The run configuration could not be loaded or resolved.
    #[error("{0}")]
    Config(#[from] pkgsmith_config::ConfigError),

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] pkgsmith_util::error::UtilError),

    /// A recipe could not be read or queried.
    #[error("{0}")]
    Recipe(#[from] pkgsmith_recipe::RecipeError),

    /// A build-root operation failed (reset failures land here).
    #[error("{0}")]
    Chroot(#[from] pkgsmith_chroot::ChrootError),

    /// The native builder exited non-zero. Later packages in the run may
    /// depend on this one's output, so the whole run stops.
    #[error("could not build {package} for {arch}, terminating the run")]
    CompileFailed { package: String, arch: Arch },

    /// The repository-index tool exited non-zero.
    #[error("could not add packages to the {arch} repository at {path}")]
    RepoAdd { arch: Arch, path: String },
}
