//! Shared helpers for pkgsmith: subprocess execution, filesystem moves,
//! operator prompts, and scoped privilege changes.

pub mod error;
pub mod fs;
pub mod privilege;
pub mod process;
pub mod prompt;
