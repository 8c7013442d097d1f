//! Checksum refresh: regenerate source checksums with `makepkg -cg` and
//! rewrite the PKGBUILD in place when they changed.

use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use pkgsmith_util::privilege::{path_owner, running_as_root, ReducedPrivileges};
use pkgsmith_util::process::run_command;

/// What the checksum refresh did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumOutcome {
    /// The PKGBUILD was rewritten with fresh checksums.
    Updated,
    /// The recorded checksums already matched.
    UpToDate,
    /// The refresh could not complete; treated as "unchanged" by the
    /// caller; the build step fails on its own if checksums are wrong.
    Failed(String),
}

/// Extract the `shaNsums=( ... )` / `mdNsums=( ... )` block from PKGBUILD
/// text. Returns `None` when the text holds no block or more than one
/// (an ambiguous recipe is left alone).
pub fn extract_sums_block(text: &str) -> Option<&str> {
    static SUMS_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    let re = SUMS_RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*(?:sha|md)\d+sums=\([^)]*\)").unwrap());

    let mut matches = re.find_iter(text);
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first.as_str())
}

/// Recompute the checksums for a recipe's sources and rewrite the PKGBUILD
/// when they differ from the recorded ones.
///
/// `makepkg -cg` runs as the recipe's owning user when the process is root;
/// any failure (tool exit, ambiguous sums block, unreadable file) yields
/// `Failed` rather than an error, because the compile step independently
/// catches genuinely wrong checksums.
pub fn refresh_checksums(recipe_dir: &Path) -> ChecksumOutcome {
    eprintln!("    Checking source checksums");

    let generated = match generate_sums(recipe_dir) {
        Ok(stdout) => stdout,
        Err(message) => return ChecksumOutcome::Failed(message),
    };
    let Some(fresh_block) = extract_sums_block(&generated) else {
        return ChecksumOutcome::Failed("no unambiguous sums block in makepkg output".to_owned());
    };

    let pkgbuild_path = recipe_dir.join("PKGBUILD");
    let current = match std::fs::read_to_string(&pkgbuild_path) {
        Ok(text) => text,
        Err(e) => return ChecksumOutcome::Failed(format!("cannot read PKGBUILD: {e}")),
    };
    let Some(recorded_block) = extract_sums_block(&current) else {
        return ChecksumOutcome::Failed("no unambiguous sums block in PKGBUILD".to_owned())
    };

    if recorded_block == fresh_block {
        return ChecksumOutcome::UpToDate;
    }

    eprintln!("    Writing updated checksums to {}", pkgbuild_path.display());
    let updated = current.replacen(recorded_block, fresh_block, 1);
    match std::fs::write(&pkgbuild_path, updated) {
        Ok(()) => ChecksumOutcome::Updated,
        Err(e) => ChecksumOutcome::Failed(format!("cannot rewrite PKGBUILD: {e}")),
    }
}

/// Run `makepkg -cg` in the recipe directory, dropping privileges to the
/// recipe owner when running as root (makepkg refuses to run as root).
fn generate_sums(recipe_dir: &Path) -> Result<String, String> {
    let guard = if running_as_root() {
        let owner = path_owner(recipe_dir).map_err(|e| e.to_string())?;
        Some(ReducedPrivileges::drop_to(&owner).map_err(|e| e.to_string())?)
    } else {
        None
    };

    let output = run_command(Command::new("makepkg").args(["-c", "-g"]).current_dir(recipe_dir));

    if let Some(guard) = guard {
        guard.restore().map_err(|e| e.to_string())?;
    }

    let output = output.map_err(|e| e.to_string())?;
    if !output.success {
        return Err(format!(
            "makepkg -cg exited with {:?}: {}",
            output.exit_code,
            output.stderr.trim()
        ));
    }
    Ok(output.stdout)
}
