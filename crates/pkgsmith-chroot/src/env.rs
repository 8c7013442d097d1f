//! Build-root lifecycle: create, reset, install, query, compile.
//!
//! One `BuildRoot` exists per architecture and is never shared between
//! architectures. The lifecycle is `Missing -> Created -> Synced`, and
//! `reset` is the only transition into `Synced`; installing dependencies or
//! compiling in anything but a freshly synced copy is undefined unless the
//! operator explicitly opted out of resets.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use pkgsmith_arch::Arch;
use pkgsmith_util::process::{run_command, run_status};

use crate::error::ChrootError;
use crate::invoke::{
    pacman_install_command, pacman_query_command, MakechrootpkgCommand, MkarchrootCommand,
};

/// A per-architecture isolated build root.
///
/// Layout under the base path:
/// `<base>/<arch>/root` is the pristine template, refreshed in place;
/// `<base>/<arch>/<copy_name>` is the working copy builds run in, mirrored
/// from the template on every reset.
#[derive(Debug, Clone)]
pub struct BuildRoot {
    base: PathBuf,
    arch: Arch,
    copy_name: String,
}

impl BuildRoot {
    pub fn new(base: &Path, arch: Arch, copy_prefix: &str) -> Self {
        Self {
            base: base.to_path_buf(),
            arch,
            copy_name: format!("{copy_prefix}{}", arch.copy_suffix()),
        }
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// `<base>/<arch>`, the directory `makechrootpkg -r` points at.
    pub fn arch_dir(&self) -> PathBuf {
        self.base.join(self.arch.tag())
    }

    /// `<base>/<arch>/root`, the pristine template.
    pub fn template_dir(&self) -> PathBuf {
        self.arch_dir().join("root")
    }

    /// `<base>/<arch>/<copy_name>`, the working copy.
    pub fn copy_dir(&self) -> PathBuf {
        self.arch_dir().join(&self.copy_name)
    }

    pub fn copy_name(&self) -> &str {
        &self.copy_name
    }

    /// Reset the working copy to a pristine state.
    ///
    /// Creates the copy directory on first use, refreshes the template via
    /// the bootstrap tool, then mirrors the template into the copy with a
    /// delete-extraneous sync so files present only in the copy are removed.
    ///
    /// # Errors
    /// Any failure is an error: the orchestrator must not build inside a
    /// contaminated or missing root.
    pub fn reset(&self) -> Result<(), ChrootError> {
        let copy = self.copy_dir();
        if !copy.exists() {
            eprintln!("    Creating chroot copy {}", copy.display());
            std::fs::create_dir_all(&copy).map_err(|source| ChrootError::CreateCopy {
                path: copy.display().to_string(),
                source,
            })?;
        }

        let template = self.template_dir();
        eprintln!("    Updating the {} chroot template", self.arch);
        let updated = run_status(&mut MkarchrootCommand::update(self.arch, &template).command())?;
        if !updated {
            return Err(ChrootError::TemplateUpdate {
                arch: self.arch.to_string(),
                path: template.display().to_string(),
            });
        }

        eprintln!("    Syncing {} -> {}", template.display(), copy.display());
        // Trailing slash on the source: mirror the template's contents, not
        // the directory itself.
        let synced = run_status(Command::new("rsync").args([
            "-aqWx",
            "--delete",
            &format!("{}/", template.display()),
            &copy.display().to_string(),
        ]))?;
        if !synced {
            return Err(ChrootError::Sync {
                arch: self.arch.to_string(),
                path: copy.display().to_string(),
            });
        }
        Ok(())
    }

    /// Remove leftovers from the copy's `build/` directory.
    ///
    /// Run before installing dependencies even in sloppy mode, where the
    /// full reset is skipped.
    pub fn clear_build_dir(&self) {
        let build_dir = self.copy_dir().join("build");
        if let Err(e) = pkgsmith_util::fs::remove_dir_all_if_exists(&build_dir) {
            tracing::warn!(error = %e, "could not clear the chroot build directory");
        }
    }

    /// Copy an artifact into the working copy and install it with pacman.
    ///
    /// # Errors
    /// Returns an error if the copy or the install command fails. Callers
    /// treat this as a degraded-but-continuing condition: the dependency may
    /// already be satisfied by the template.
    pub fn install_artifact(&self, artifact: &Path) -> Result<(), ChrootError> {
        let copied = pkgsmith_util::fs::copy_into(artifact, &self.copy_dir())?;
        let Some(fname) = copied.file_name().and_then(|n| n.to_str()) else {
            return Err(ChrootError::Install {
                artifact: artifact.display().to_string(),
            });
        };

        eprintln!("    Installing {fname}");
        let install = pacman_install_command(fname);
        let ok = run_status(
            &mut MkarchrootCommand::run(self.arch, &install, &self.copy_dir()).command(),
        )?;
        if !ok {
            return Err(ChrootError::Install {
                artifact: fname.to_owned(),
            });
        }
        Ok(())
    }

    /// Query the version of a package installed in the working copy.
    ///
    /// Returns `None` for any failure: non-zero pacman exit, spawn error,
    /// unparseable output. Dependency checks must never block the pipeline
    /// on a query failure.
    pub fn installed_version(&self, package: &str) -> Option<String> {
        let query = pacman_query_command(package);
        let output =
            run_command(&mut MkarchrootCommand::run(self.arch, &query, &self.copy_dir()).command());
        let output = match output {
            Ok(o) => o,
            Err(e) => {
                tracing::debug!(package, error = %e, "installed-version query failed");
                return None;
            }
        };
        if !output.success {
            tracing::debug!(package, code = ?output.exit_code, "not installed in chroot");
            return None;
        }
        parse_installed_version(&output.stdout)
    }

    /// Compile the recipe in `recipe_dir` inside the working copy.
    ///
    /// # Errors
    /// Returns an error only if the tool cannot be spawned; a compile
    /// failure is `Ok(false)` and the orchestrator decides its fatality.
    pub fn build(&self, recipe_dir: &Path) -> Result<bool, ChrootError> {
        let mut cmd = MakechrootpkgCommand::new(self.arch, &self.arch_dir(), &self.copy_name).command();
        cmd.current_dir(recipe_dir);
        Ok(run_status(&mut cmd)?)
    }
}

/// Extract the `Version : <v>` field from `pacman -Qi` key-value output.
fn parse_installed_version(stdout: &str) -> Option<String> {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    let re = VERSION_RE.get_or_init(|| Regex::new(r"(?m)^Version\s*:\s*(\S+)").unwrap());
    re.captures(stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn directory_layout() {
        let root = BuildRoot::new(Path::new("/var/chroot"), Arch::I686, "build");
        assert_eq!(root.arch_dir(), PathBuf::from("/var/chroot/i686"));
        assert_eq!(root.template_dir(), PathBuf::from("/var/chroot/i686/root"));
        assert_eq!(root.copy_dir(), PathBuf::from("/var/chroot/i686/build32"));
        assert_eq!(root.copy_name(), "build32");
    }

    #[test]
    fn copies_are_never_shared_between_architectures() {
        let base = Path::new("/var/chroot");
        let a = BuildRoot::new(base, Arch::X86_64, "build");
        let b = BuildRoot::new(base, Arch::I686, "build");
        assert_ne!(a.copy_dir(), b.copy_dir());
        assert_ne!(a.template_dir(), b.template_dir());
    }

    #[test]
    fn parses_pacman_query_output() {
        let stdout = "\
Name           : zfs\n\
Version        : 0.6.2-1\n\
Description    : Kernel module support for ZFS\n";
        assert_eq!(parse_installed_version(stdout), Some("0.6.2-1".to_owned()));
    }

    #[test]
    fn unparseable_query_output_is_none() {
        assert_eq!(parse_installed_version(""), None);
        assert_eq!(parse_installed_version("error: package not found"), None);
    }

    #[test]
    fn clear_build_dir_tolerates_missing_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let root = BuildRoot::new(tmp.path(), Arch::X86_64, "build");
        root.clear_build_dir(); // nothing to remove, must not panic
    }
}
