//! Source package builds: `makepkg -cSf` in the recipe directory, with the
//! resulting `*.src.tar.gz` moved into the stage store.

use std::path::Path;
use std::process::Command;

use tracing::warn;

use pkgsmith_util::fs::{glob_paths, move_into};
use pkgsmith_util::privilege::{path_owner, running_as_root, ReducedPrivileges};
use pkgsmith_util::process::run_command;

use crate::error::EngineError;

/// Build a source tarball for the recipe and move it into `stage_dir`.
///
/// Returns `Ok(true)` when a tarball was produced and staged, `Ok(false)`
/// when makepkg failed or produced nothing. Source build failures never
/// terminate a run; binary artifacts are the deliverable.
pub fn build_source(recipe_dir: &Path, stage_dir: &Path) -> Result<bool, EngineError> {
    eprintln!("    Building source package");

    let guard = if running_as_root() {
        let owner = path_owner(recipe_dir)?;
        Some(ReducedPrivileges::drop_to(&owner)?)
    } else {
        None
    };

    let output = run_command(
        Command::new("makepkg")
            .args(["-c", "-S", "-f"])
            .current_dir(recipe_dir),
    );

    if let Some(guard) = guard {
        guard.restore()?;
    }

    match output {
        Ok(out) if out.success => {}
        Ok(out) => {
            warn!(
                recipe = %recipe_dir.display(),
                exit_code = ?out.exit_code,
                "source package build failed"
            );
            return Ok(false);
        }
        Err(e) => {
            warn!(recipe = %recipe_dir.display(), error = %e, "could not run makepkg");
            return Ok(false);
        }
    }

    let pattern = format!("{}/*.src.tar.gz", recipe_dir.display());
    let tarballs = glob_paths(&pattern)?;
    if tarballs.is_empty() {
        warn!(recipe = %recipe_dir.display(), "makepkg succeeded but produced no source tarball");
        return Ok(false);
    }
    let mut staged = 0;
    for tarball in &tarballs {
        match move_into(tarball, stage_dir) {
            Ok(_) => staged += 1,
            Err(e) => {
                warn!(tarball = %tarball.display(), error = %e, "could not stage source tarball");
            }
        }
    }
    Ok(staged > 0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn failure_to_run_makepkg_is_soft() {
        // An empty directory has no PKGBUILD, so makepkg (present or not)
        // cannot succeed; the result must be Ok(false), not an error.
        let recipe = tempfile::tempdir().unwrap();
        let stage = tempfile::tempdir().unwrap();
        let staged = build_source(recipe.path(), stage.path()).unwrap();
        assert!(!staged);
        assert!(pkgsmith_util::fs::collect_files(stage.path()).unwrap().is_empty());
    }
}
