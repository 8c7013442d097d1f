//! Detached artifact signatures via gpg, produced as the configured key
//! owner so the signing key and agent socket are theirs.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use pkgsmith_recipe::filename::{is_signature, SIG_SUFFIX};
use pkgsmith_util::fs::collect_files;
use pkgsmith_util::privilege::{running_as_root, user_by_name, ReducedPrivileges};
use pkgsmith_util::process::run_command;

use crate::error::EngineError;

/// A `gpg --detach-sign` invocation for one artifact.
#[derive(Debug)]
pub struct GpgSignCommand {
    key: String,
    artifact: PathBuf,
}

impl GpgSignCommand {
    pub fn new(key: &str, artifact: &Path) -> Self {
        Self {
            key: key.to_owned(),
            artifact: artifact.to_path_buf(),
        }
    }

    /// Argument vector for the invocation.
    pub fn build_args(&self) -> Vec<String> {
        vec![
            "--detach-sign".to_owned(),
            "--use-agent".to_owned(),
            "--yes".to_owned(),
            "-u".to_owned(),
            self.key.clone(),
            self.artifact.display().to_string(),
        ]
    }

    /// The runnable command, with the agent environment of `home` applied.
    pub fn command(&self, home: &Path) -> Command {
        let mut cmd = Command::new("gpg");
        cmd.args(self.build_args());
        cmd.env("HOME", home);
        for (key, value) in agent_env(home) {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Parse a `gpg-agent.env` file: `KEY=value` lines, with or without a
/// leading `export `, comments and blanks skipped.
pub fn parse_agent_env(text: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            vars.push((key.trim().to_owned(), value.trim().to_owned()));
        }
    }
    vars
}

fn agent_env(home: &Path) -> Vec<(String, String)> {
    let env_file = home.join(".gnupg").join("gpg-agent.env");
    match std::fs::read_to_string(&env_file) {
        Ok(text) => parse_agent_env(&text),
        Err(e) => {
            warn!(file = %env_file.display(), error = %e, "no gpg-agent environment, signing without it");
            Vec::new()
        }
    }
}

/// Sign one artifact in place, producing `<artifact>.sig` next to it.
///
/// Runs gpg as `key_owner` with their home directory, since the signing
/// key lives in that user's keyring, not root's.
///
/// Returns whether a signature was produced. A gpg failure is logged and
/// reported as `false`; unsigned artifacts are still publishable. An
/// unresolvable key owner is a configuration error and fails hard.
pub fn sign_artifact(artifact: &Path, key: &str, key_owner: &str) -> Result<bool, EngineError> {
    let owner = user_by_name(key_owner)?;
    let home = owner.dir.clone();

    let guard = if running_as_root() {
        Some(ReducedPrivileges::drop_to(&owner)?)
    } else {
        None
    };

    let sign = GpgSignCommand::new(key, artifact);
    let output = run_command(&mut sign.command(&home));

    if let Some(guard) = guard {
        guard.restore()?;
    }

    match output {
        Ok(out) if out.success => {
            debug!(artifact = %artifact.display(), "signed");
            Ok(true)
        }
        Ok(out) => {
            warn!(
                artifact = %artifact.display(),
                exit_code = ?out.exit_code,
                stderr = %out.stderr.trim(),
                "gpg refused to sign"
            );
            Ok(false)
        }
        Err(e) => {
            warn!(artifact = %artifact.display(), error = %e, "could not run gpg");
            Ok(false)
        }
    }
}

/// Sign every unsigned artifact in the stage store; returns how many
/// signatures were produced.
pub fn sign_staged(stage_dir: &Path, key: &str, key_owner: &str) -> Result<usize, EngineError> {
    let mut signed = 0;
    for file in collect_files(stage_dir)? {
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_signature(name) {
            continue;
        }
        let sig = sig_path(&file);
        if sig.exists() {
            continue;
        }
        eprintln!("    Signing {name}");
        if sign_artifact(&file, key, key_owner)? {
            signed += 1;
        }
    }
    Ok(signed)
}

/// Check a detached signature with `gpg --verify`.
///
/// A missing signature, a missing gpg, or a verification failure all yield
/// `false`; callers decide whether that terminates anything.
pub fn verify_signature(artifact: &Path) -> bool {
    let sig = sig_path(artifact);
    if !sig.exists() {
        return false;
    }
    let output = run_command(Command::new("gpg").arg("--verify").arg(&sig).arg(artifact));
    match output {
        Ok(out) => out.success,
        Err(e) => {
            warn!(artifact = %artifact.display(), error = %e, "could not run gpg --verify");
            false
        }
    }
}

/// The sidecar signature path for an artifact.
pub fn sig_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(SIG_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sign_args_are_stable() {
        let cmd = GpgSignCommand::new("ABCD1234", Path::new("/stage/foo-1.0-1-any.pkg.tar.xz"));
        assert_eq!(
            cmd.build_args(),
            vec![
                "--detach-sign",
                "--use-agent",
                "--yes",
                "-u",
                "ABCD1234",
                "/stage/foo-1.0-1-any.pkg.tar.xz",
            ]
        );
    }

    #[test]
    fn agent_env_parses_exports_and_plain_lines() {
        let text = "# agent\nexport GPG_AGENT_INFO=/run/gpg/S.agent:123:1\nSSH_AUTH_SOCK=/run/ssh\n\n";
        assert_eq!(
            parse_agent_env(text),
            vec![
                (
                    "GPG_AGENT_INFO".to_owned(),
                    "/run/gpg/S.agent:123:1".to_owned()
                ),
                ("SSH_AUTH_SOCK".to_owned(), "/run/ssh".to_owned()),
            ]
        );
    }

    #[test]
    fn sig_path_appends_suffix() {
        assert_eq!(
            sig_path(Path::new("/s/a.pkg.tar.xz")),
            PathBuf::from("/s/a.pkg.tar.xz.sig")
        );
    }

    #[test]
    fn signing_resolves_the_configured_key_owner() {
        // The artifact has a perfectly valid path owner; resolution must
        // still go through the configured user name.
        let tmp = tempfile::tempdir().unwrap();
        let artifact = tmp.path().join("foo-1.0-1-any.pkg.tar.xz");
        std::fs::write(&artifact, b"data").unwrap();
        let err = sign_artifact(&artifact, "ABCD1234", "no-such-signer-account").unwrap_err();
        assert!(err.to_string().contains("no-such-signer-account"));
    }

    #[test]
    fn verify_without_signature_is_false() {
        let tmp = tempfile::tempdir().unwrap();
        let artifact = tmp.path().join("foo-1.0-1-any.pkg.tar.xz");
        std::fs::write(&artifact, b"data").unwrap();
        assert!(!verify_signature(&artifact));
    }
}
