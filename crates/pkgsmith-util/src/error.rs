//! Error types for pkgsmith-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A glob pattern was invalid.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    GlobPattern { pattern: String, message: String },

    /// A command failed to execute.
    #[error("cannot execute `{program}`: {source}")]
    CommandExec {
        program: String,
        source: std::io::Error,
    },

    /// Reading an answer from the operator failed.
    #[error("cannot read from stdin: {source}")]
    Prompt { source: std::io::Error },

    /// A named system user does not exist.
    #[error("no such user `{user}`")]
    NoSuchUser { user: String },

    /// Changing process uids failed.
    #[error("cannot switch uid to {uid}: {source}")]
    SetUid { uid: u32, source: nix::Error },
}
