//! Error types for pkgsmith-chroot.

/// Errors produced by build-root operations.
///
/// `reset` failures are fatal to the run for that architecture, since building
/// inside a contaminated or missing root produces undefined artifacts, so
/// they carry enough context for the operator message that ends the run.
#[derive(Debug, thiserror::Error)]
pub enum ChrootError {
    /// The working-copy directory could not be created.
    #[error("cannot create chroot copy at {path}: {source}")]
    CreateCopy {
        path: String,
        source: std::io::Error,
    },

    /// `mkarchroot -u` failed to refresh the pristine template.
    #[error("could not update the {arch} chroot template at {path}")]
    TemplateUpdate { arch: String, path: String },

    /// `rsync --delete` failed to mirror the template into the copy.
    #[error("could not sync a clean {arch} chroot into {path}")]
    Sync { arch: String, path: String },

    /// Installing an artifact into the root failed. Non-fatal at the
    /// orchestrator level, but still reported with context.
    #[error("could not install {artifact} into the chroot")]
    Install { artifact: String },

    /// A subprocess could not be spawned.
    #[error("{0}")]
    Util(#[from] pkgsmith_util::error::UtilError),
}
