//! Error types for pkgsmith-recipe.

/// Errors produced while reading recipes and building descriptors.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    /// The PKGBUILD could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// A required field is absent from the PKGBUILD.
    #[error("PKGBUILD at {path} has no usable `{field}` field")]
    MissingField { field: String, path: String },

    /// The dependency query (constrained PKGBUILD evaluation) failed.
    /// A malformed recipe must not silently produce an incomplete
    /// dependency list, so this aborts descriptor construction.
    #[error("dependency query failed for {path}: {stderr}")]
    DepQuery { path: String, stderr: String },

    /// A subprocess could not be spawned.
    #[error("{0}")]
    Util(#[from] pkgsmith_util::error::UtilError),
}
