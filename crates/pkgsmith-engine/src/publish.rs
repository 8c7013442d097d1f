//! Publishing: copy staged artifacts into the per-architecture repository
//! tree and register them with `repo-add`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use pkgsmith_arch::{Arch, BUILD_ORDER};
use pkgsmith_recipe::filename::{
    arch_tag_from_filename, is_signature, name_from_filename, name_from_source_filename,
    SIG_SUFFIX, SOURCE_SUFFIX,
};
use pkgsmith_util::fs::{collect_files, copy_into, ensure_dir, glob_paths, remove_dir_all_if_exists};
use pkgsmith_util::process::run_command;

use crate::error::EngineError;
use crate::sign::sig_path;

/// Subdirectory of the repository tree holding source tarballs.
pub const SOURCES_DIR: &str = "sources";

/// Where each staged file is headed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PublishPlan {
    /// Binary artifacts per target architecture, in staged order. An `any`
    /// artifact appears under every architecture.
    pub per_arch: BTreeMap<Arch, Vec<PathBuf>>,
    /// Source tarballs.
    pub sources: Vec<PathBuf>,
}

/// Classify staged files into repository destinations.
///
/// Signatures are skipped here; they travel with their artifact. Files
/// with unparseable names are logged and left behind in the stage.
pub fn publish_plan(staged: &[PathBuf]) -> PublishPlan {
    let mut plan = PublishPlan::default();
    for file in staged {
        let Some(fname) = file.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_signature(fname) {
            continue;
        }
        if fname.ends_with(SOURCE_SUFFIX) {
            plan.sources.push(file.clone());
            continue;
        }
        let Some(tag) = arch_tag_from_filename(fname) else {
            warn!(file = %fname, "staged file with unrecognized name, not publishing");
            continue;
        };
        for arch in BUILD_ORDER {
            if arch.accepts_tag(tag) {
                plan.per_arch.entry(arch).or_default().push(file.clone());
            }
        }
    }
    plan
}

/// A `repo-add` invocation for one architecture's database.
#[derive(Debug)]
pub struct RepoAddCommand {
    key: String,
    db_name: String,
    files: Vec<String>,
}

impl RepoAddCommand {
    pub fn new(key: &str, db_name: &str, files: &[String]) -> Self {
        Self {
            key: key.to_owned(),
            db_name: db_name.to_owned(),
            files: files.to_vec(),
        }
    }

    /// Argument vector for the invocation; runs relative to the
    /// architecture directory.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-s".to_owned(),
            "-f".to_owned(),
            "-k".to_owned(),
            self.key.clone(),
            self.db_name.clone(),
        ];
        args.extend(self.files.iter().cloned());
        args
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new("repo-add");
        cmd.args(self.build_args());
        cmd
    }
}

/// The database filename for a repository rooted at `repo_path`.
pub fn db_name(repo_path: &Path) -> String {
    let base = repo_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo");
    format!("{base}.db.tar.xz")
}

/// Copy everything staged into the repository tree and update each
/// architecture's database.
///
/// Before an artifact is copied, older artifacts of the same package are
/// removed from its architecture directory. Re-publishing an unchanged
/// stage is idempotent. A `repo-add` failure is fatal; the repository
/// database must not drift from the published files.
pub fn publish(stage_dir: &Path, repo_path: &Path, key: &str) -> Result<(), EngineError> {
    let staged = collect_files(stage_dir)?;
    if staged.is_empty() {
        info!("nothing staged, skipping publish");
        return Ok(());
    }
    let plan = publish_plan(&staged);

    for arch in BUILD_ORDER {
        ensure_dir(&repo_path.join(arch.tag()))?;
    }
    ensure_dir(&repo_path.join(SOURCES_DIR))?;

    let sources_dir = repo_path.join(SOURCES_DIR);
    for tarball in &plan.sources {
        if let Some(name) = tarball
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(name_from_source_filename)
        {
            remove_stale(&sources_dir, name, name_from_source_filename)?;
        }
        copy_into(tarball, &sources_dir)?;
        copy_sig_if_present(tarball, &sources_dir)?;
    }

    let database = db_name(repo_path);
    for (arch, files) in &plan.per_arch {
        let arch_dir = repo_path.join(arch.tag());
        let mut published = Vec::new();
        for file in files {
            let Some(fname) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(name) = name_from_filename(fname) {
                remove_stale(&arch_dir, name, name_from_filename)?;
            }
            eprintln!("    Publishing {} for {}", fname, arch);
            copy_into(file, &arch_dir)?;
            copy_sig_if_present(file, &arch_dir)?;
            published.push(fname.to_owned());
        }
        if published.is_empty() {
            continue;
        }

        let repo_add = RepoAddCommand::new(key, &database, &published);
        let output = run_command(repo_add.command().current_dir(&arch_dir))?;
        if !output.success {
            return Err(EngineError::RepoAdd {
                arch: *arch,
                path: arch_dir.display().to_string(),
            });
        }
        info!(arch = %arch, count = published.len(), "repository database updated");
    }
    Ok(())
}

/// Remove old artifacts of exactly `name` from `dir`, sidecars included.
///
/// The wide glob also matches same-prefix siblings (`foo-*` catches
/// `foo-bar-2.0-1-...`), so every candidate filename is parsed back and
/// compared before deletion.
fn remove_stale(
    dir: &Path,
    name: &str,
    parse: for<'a> fn(&'a str) -> Option<&'a str>,
) -> Result<(), EngineError> {
    for candidate in glob_paths(&format!("{}/{}-*", dir.display(), name))? {
        let Some(fname) = candidate.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let base = fname.strip_suffix(SIG_SUFFIX).unwrap_or(fname);
        if parse(base) != Some(name) {
            continue;
        }
        if let Err(e) = std::fs::remove_file(&candidate) {
            warn!(file = %candidate.display(), error = %e, "could not remove stale artifact");
        }
    }
    Ok(())
}

fn copy_sig_if_present(artifact: &Path, dest_dir: &Path) -> Result<(), EngineError> {
    let sig = sig_path(artifact);
    if sig.exists() {
        copy_into(&sig, dest_dir)?;
    }
    Ok(())
}

/// Remove the stage store after a successful publish.
pub fn delete_stage(stage_dir: &Path) -> Result<(), EngineError> {
    eprintln!("    Clearing stage {}", stage_dir.display());
    remove_dir_all_if_exists(stage_dir)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn plan_routes_any_to_both_architectures() {
        let staged = vec![
            PathBuf::from("/s/foo-1.0-1-any.pkg.tar.xz"),
            PathBuf::from("/s/foo-1.0-1-any.pkg.tar.xz.sig"),
            PathBuf::from("/s/bar-2.0-1-x86_64.pkg.tar.xz"),
            PathBuf::from("/s/baz-0.1-2-i686.pkg.tar.xz"),
            PathBuf::from("/s/foo-1.0-1.src.tar.gz"),
        ];
        let plan = publish_plan(&staged);
        assert_eq!(
            plan.per_arch.get(&Arch::X86_64).unwrap(),
            &vec![
                PathBuf::from("/s/foo-1.0-1-any.pkg.tar.xz"),
                PathBuf::from("/s/bar-2.0-1-x86_64.pkg.tar.xz"),
            ]
        );
        assert_eq!(
            plan.per_arch.get(&Arch::I686).unwrap(),
            &vec![
                PathBuf::from("/s/foo-1.0-1-any.pkg.tar.xz"),
                PathBuf::from("/s/baz-0.1-2-i686.pkg.tar.xz"),
            ]
        );
        assert_eq!(plan.sources, vec![PathBuf::from("/s/foo-1.0-1.src.tar.gz")]);
    }

    #[test]
    fn plan_skips_unparseable_names() {
        let staged = vec![PathBuf::from("/s/README")];
        let plan = publish_plan(&staged);
        assert!(plan.per_arch.is_empty());
        assert!(plan.sources.is_empty());
    }

    #[test]
    fn repo_add_args_are_stable() {
        let cmd = RepoAddCommand::new(
            "ABCD1234",
            "extra.db.tar.xz",
            &["foo-1.0-1-any.pkg.tar.xz".to_owned()],
        );
        assert_eq!(
            cmd.build_args(),
            vec![
                "-s",
                "-f",
                "-k",
                "ABCD1234",
                "extra.db.tar.xz",
                "foo-1.0-1-any.pkg.tar.xz",
            ]
        );
    }

    #[test]
    fn db_name_follows_repo_basename() {
        assert_eq!(db_name(Path::new("/srv/repos/extra")), "extra.db.tar.xz");
    }

    #[test]
    fn stale_removal_spares_same_prefix_siblings() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let old = dir.join("foo-0.9-1-x86_64.pkg.tar.xz");
        let old_sig = dir.join("foo-0.9-1-x86_64.pkg.tar.xz.sig");
        let sibling = dir.join("foo-bar-2.0-1-x86_64.pkg.tar.xz");
        for file in [&old, &old_sig, &sibling] {
            std::fs::write(file, b"pkg").unwrap();
        }

        remove_stale(dir, "foo", name_from_filename).unwrap();

        assert!(!old.exists());
        assert!(!old_sig.exists());
        assert!(sibling.exists());
    }

    #[test]
    fn stale_source_removal_spares_siblings() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let old = dir.join("foo-0.9-1.src.tar.gz");
        let sibling = dir.join("foo-bar-2.0-1.src.tar.gz");
        for file in [&old, &sibling] {
            std::fs::write(file, b"src").unwrap();
        }

        remove_stale(dir, "foo", name_from_source_filename).unwrap();

        assert!(!old.exists());
        assert!(sibling.exists());
    }

    #[test]
    fn delete_stage_tolerates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        delete_stage(&stage).unwrap();
        std::fs::create_dir(&stage).unwrap();
        std::fs::write(stage.join("x"), b"x").unwrap();
        delete_stage(&stage).unwrap();
        assert!(!stage.exists());
    }
}
