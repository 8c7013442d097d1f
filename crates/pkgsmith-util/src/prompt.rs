//! Interactive overwrite prompts.

use std::io::{self, BufRead, Write};

use crate::error::UtilError;

/// An operator's answer to an overwrite question.
///
/// The vocabulary is deliberately small: uppercase answers apply to the whole
/// batch, lowercase to the single artifact. Anything unrecognized falls back
/// to `No`; keeping an existing artifact is the safe default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteAnswer {
    /// Overwrite this artifact.
    Yes,
    /// Overwrite this and every later artifact without asking again.
    YesAll,
    /// Keep this artifact.
    No,
    /// Keep this and every later artifact without asking again.
    NoAll,
}

impl OverwriteAnswer {
    /// Parse a raw line of operator input.
    pub fn parse(input: &str) -> Self {
        match input.trim() {
            "Y" => OverwriteAnswer::YesAll,
            "y" => OverwriteAnswer::Yes,
            "N" => OverwriteAnswer::NoAll,
            _ => OverwriteAnswer::No,
        }
    }
}

/// Ask the operator whether `filename` should be overwritten, blocking on
/// stdin for an answer.
///
/// # Errors
/// Returns an error if stdin cannot be read.
pub fn ask_overwrite(filename: &str) -> Result<OverwriteAnswer, UtilError> {
    let mut stderr = io::stderr();
    let _ = write!(stderr, "{filename} already exists. Overwrite? [Y/y/N/n] ");
    let _ = stderr.flush();

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|source| UtilError::Prompt { source })?;
    Ok(OverwriteAnswer::parse(&line))
}
