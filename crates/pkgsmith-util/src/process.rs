//! Process execution helpers for pkgsmith.
//!
//! Every external tool is invoked with an explicit argument vector; working
//! directories are set on the `Command` rather than by changing the process
//! cwd, so a failed invocation can never leave the builder in the wrong
//! directory.

use std::process::Command;

use crate::error::UtilError;

/// Structured output from a command execution.
#[derive(Debug)]
pub struct CommandOutput {
    /// Standard output as a string.
    pub stdout: String,
    /// Standard error as a string.
    pub stderr: String,
    /// Whether the command exited successfully.
    pub success: bool,
    /// The exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
}

/// Execute a command and capture its output.
///
/// # Errors
/// Returns an error if the command cannot be spawned (e.g. binary not found).
/// A non-zero exit code is **not** an error; check `CommandOutput::success`
/// instead.
pub fn run_command(cmd: &mut Command) -> Result<CommandOutput, UtilError> {
    tracing::debug!(command = ?cmd, "running");
    let output = cmd.output().map_err(|source| UtilError::CommandExec {
        program: cmd.get_program().to_string_lossy().into_owned(),
        source,
    })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        exit_code: output.status.code(),
    })
}

/// Execute a command, inheriting stdout/stderr, and report only success.
///
/// Used for the long-running chroot and build tools whose output should
/// stream to the operator's terminal.
///
/// # Errors
/// Returns an error if the command cannot be spawned. A non-zero exit is
/// reported as `Ok(false)`.
pub fn run_status(cmd: &mut Command) -> Result<bool, UtilError> {
    tracing::debug!(command = ?cmd, "running");
    let status = cmd.status().map_err(|source| UtilError::CommandExec {
        program: cmd.get_program().to_string_lossy().into_owned(),
        source,
    })?;
    Ok(status.success())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn run_command_success() {
        let output = run_command(Command::new("echo").arg("hello")).unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.exit_code, Some(0));
    }

    #[test]
    fn run_command_failure() {
        let output = run_command(&mut Command::new("false")).unwrap();
        assert!(!output.success);
        assert_ne!(output.exit_code, Some(0));
    }

    #[test]
    fn run_command_missing_binary() {
        let result = run_command(&mut Command::new("nonexistent_binary_xyz_123"));
        assert!(result.is_err());
    }

    #[test]
    fn run_command_captures_stderr() {
        let output = run_command(Command::new("sh").arg("-c").arg("echo err >&2")).unwrap();
        assert!(output.stderr.contains("err"));
    }

    #[test]
    fn run_command_respects_current_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let output = run_command(Command::new("pwd").current_dir(tmp.path())).unwrap();
        assert!(output.success);
        // Compare canonicalized paths; tmpdirs may traverse symlinks on macOS.
        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        let expected = std::fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(reported, expected);
    }

    #[test]
    fn run_status_reflects_exit() {
        assert!(run_status(&mut Command::new("true")).unwrap());
        assert!(!run_status(&mut Command::new("false")).unwrap());
    }
}
