//! Narrow field extraction from PKGBUILD recipes.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use pkgsmith_arch::{Arch, BUILD_ORDER};
use pkgsmith_util::process::run_command;

use crate::error::RecipeError;

/// A dependency specifier: a package name plus an optional exact-version pin.
///
/// Range constraints (`>=`, `<=`, `<`, `>`) degrade to an unconstrained
/// specifier; the local artifact stores hold at most a couple of versions
/// and range resolution is out of scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepSpec {
    pub name: String,
    pub version: Option<String>,
}

impl DepSpec {
    /// Parse a raw dependency entry such as `zlib`, `zfs=0.6.2-1`, or
    /// `linux>=3.12`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.find(['<', '>', '=']) {
            Some(idx) => {
                let name = raw.get(..idx).unwrap_or(raw).to_owned();
                let rest = raw.get(idx..).unwrap_or("");
                if let Some(pin) = rest.strip_prefix('=') {
                    // `=` alone is an exact pin; `=<`/`=>` do not occur.
                    DepSpec {
                        name,
                        version: Some(pin.to_owned()).filter(|v| !v.is_empty()),
                    }
                } else {
                    DepSpec {
                        name,
                        version: None,
                    }
                }
            }
            None => DepSpec {
                name: raw.to_owned(),
                version: None,
            },
        }
    }
}

/// Extract the `<pkgver>-<pkgrel>` version from PKGBUILD text.
///
/// # Errors
/// Returns `MissingField` if either field is absent; `path` is only used for
/// error reporting.
pub fn extract_version(pkgbuild: &str, path: &Path) -> Result<String, RecipeError> {
    static PKGVER_RE: OnceLock<Regex> = OnceLock::new();
    static PKGREL_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // patterns are compile-time constants
    let pkgver_re = PKGVER_RE.get_or_init(|| Regex::new(r"(?m)^pkgver=([A-Za-z0-9._]+)\s*$").unwrap());
    #[allow(clippy::unwrap_used)]
    let pkgrel_re = PKGREL_RE.get_or_init(|| Regex::new(r"(?m)^pkgrel=(\d+)\s*$").unwrap());

    let pkgver = pkgver_re
        .captures(pkgbuild)
        .and_then(|c| c.get(1))
        .ok_or_else(|| RecipeError::MissingField {
            field: "pkgver".to_owned(),
            path: path.display().to_string(),
        })?;
    let pkgrel = pkgrel_re
        .captures(pkgbuild)
        .and_then(|c| c.get(1))
        .ok_or_else(|| RecipeError::MissingField {
            field: "pkgrel".to_owned(),
            path: path.display().to_string(),
        })?;

    Ok(format!("{}-{}", pkgver.as_str(), pkgrel.as_str()))
}

/// Read a recipe directory's PKGBUILD and extract its version.
///
/// # Errors
/// Returns an error if the file is unreadable or a version field is missing.
pub fn read_version(recipe_dir: &Path) -> Result<String, RecipeError> {
    let path = recipe_dir.join("PKGBUILD");
    let content = std::fs::read_to_string(&path).map_err(|source| RecipeError::Read {
        path: path.display().to_string(),
        source,
    })?;
    extract_version(&content, &path)
}

/// The bash snippet that evaluates a PKGBUILD once per architecture with
/// `CARCH` exported and prints each dependency array between section
/// markers. Hard, build-time, and optional dependencies are all printed;
/// the caller flattens them because installation treats the three
/// categories identically.
const DEP_QUERY_SCRIPT: &str = r###"
for march in x86_64 i686; do
    export CARCH="$march"
    unset depends makedepends optdepends
    source ./PKGBUILD
    for category in depends makedepends optdepends; do
        echo "## ${march}-${category} ##"
        eval "entries=(\"\${${category}[@]}\")"
        for entry in "${entries[@]}"; do
            if [ -n "$entry" ]; then echo "$entry"; fi
        done
    done
done
"###;

/// Query the dependency lists for both architectures in one constrained
/// PKGBUILD evaluation.
///
/// # Errors
/// Returns `DepQuery` on a non-zero bash exit: a malformed recipe must
/// abort descriptor construction rather than yield a partial list.
pub fn query_deps(recipe_dir: &Path) -> Result<HashMap<Arch, Vec<DepSpec>>, RecipeError> {
    let output = run_command(
        Command::new("bash")
            .arg("-c")
            .arg(DEP_QUERY_SCRIPT)
            .current_dir(recipe_dir),
    )?;
    if !output.success {
        return Err(RecipeError::DepQuery {
            path: recipe_dir.display().to_string(),
            stderr: output.stderr.trim().to_owned(),
        });
    }
    tracing::debug!(recipe = %recipe_dir.display(), "dependency query output:\n{}", output.stdout);
    Ok(parse_dep_sections(&output.stdout))
}

/// Parse the marker-delimited dependency listing into per-architecture,
/// order-preserving flattened lists. Optional-dependency descriptions after
/// a colon (`foo: for bar support`) are stripped.
fn parse_dep_sections(stdout: &str) -> HashMap<Arch, Vec<DepSpec>> {
    static MARKER_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    let marker_re =
        MARKER_RE.get_or_init(|| Regex::new(r"^## (x86_64|i686)-(?:dep|makedep|optdep)ends ##$").unwrap());

    let mut deps: HashMap<Arch, Vec<DepSpec>> = BUILD_ORDER.iter().map(|a| (*a, Vec::new())).collect();
    let mut current: Option<Arch> = None;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = marker_re.captures(line) {
            current = caps.get(1).and_then(|m| m.as_str().parse().ok());
            continue;
        }
        let Some(arch) = current else { continue };
        let entry = line.split(':').next().unwrap_or(line);
        if entry.is_empty() {
            continue;
        }
        if let Some(list) = deps.get_mut(&arch) {
            list.push(DepSpec::parse(entry));
        }
    }
    deps
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    const SIMPLE_PKGBUILD: &str = r#"
# Maintainer: nobody
pkgname=demo
pkgver=1.2
pkgrel=3
arch=('x86_64' 'i686')
depends=('zlib' 'spl=0.6.2-1')
makedepends=('linux-headers')
if [ "$CARCH" = "i686" ]; then
    depends+=('libatomic')
fi
optdepends=('cron: scheduled scrubs')
sha256sums=('abcdef')
"#;

    #[test]
    fn version_round_trip() {
        let version = extract_version(SIMPLE_PKGBUILD, Path::new("PKGBUILD")).unwrap();
        assert_eq!(version, "1.2-3");
    }

    #[test]
    fn missing_pkgver_is_fatal() {
        let err = extract_version("pkgrel=1\n", Path::new("p")).unwrap_err();
        assert!(err.to_string().contains("pkgver"));
    }

    #[test]
    fn missing_pkgrel_is_fatal() {
        let err = extract_version("pkgver=1.0\n", Path::new("p")).unwrap_err();
        assert!(err.to_string().contains("pkgrel"));
    }

    #[test]
    fn commented_fields_do_not_count() {
        let text = "#pkgver=9.9\npkgver=1.0\npkgrel=2\n";
        assert_eq!(extract_version(text, Path::new("p")).unwrap(), "1.0-2");
    }

    #[test]
    fn dep_spec_parsing() {
        assert_eq!(
            DepSpec::parse("zlib"),
            DepSpec {
                name: "zlib".to_owned(),
                version: None
            }
        );
        assert_eq!(
            DepSpec::parse("spl=0.6.2-1"),
            DepSpec {
                name: "spl".to_owned(),
                version: Some("0.6.2-1".to_owned())
            }
        );
        // Range constraints degrade to unconstrained.
        assert_eq!(
            DepSpec::parse("linux>=3.12"),
            DepSpec {
                name: "linux".to_owned(),
                version: None
            }
        );
        assert_eq!(
            DepSpec::parse("glibc<2.20"),
            DepSpec {
                name: "glibc".to_owned(),
                version: None
            }
        );
    }

    #[test]
    fn parse_sections_flattens_categories_in_order() {
        let stdout = "\
## x86_64-depends ##\n\
zlib\n\
## x86_64-makedepends ##\n\
linux-headers\n\
## x86_64-optdepends ##\n\
cron\n\
## i686-depends ##\n\
zlib\n\
libatomic\n\
## i686-makedepends ##\n\
## i686-optdepends ##\n";
        let deps = parse_dep_sections(stdout);
        let x64: Vec<&str> = deps.get(&Arch::X86_64).unwrap().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(x64, ["zlib", "linux-headers", "cron"]);
        let x32: Vec<&str> = deps.get(&Arch::I686).unwrap().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(x32, ["zlib", "libatomic"]);
    }

    #[test]
    fn query_deps_evaluates_per_arch_conditionals() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("PKGBUILD"), SIMPLE_PKGBUILD).unwrap();

        let deps = query_deps(tmp.path()).unwrap();
        let x64: Vec<&str> = deps.get(&Arch::X86_64).unwrap().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(x64, ["zlib", "spl", "linux-headers", "cron"]);
        let x32: Vec<&str> = deps.get(&Arch::I686).unwrap().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(x32, ["zlib", "spl", "libatomic", "linux-headers", "cron"]);
    }

    #[test]
    fn query_script_keeps_its_marker_echo_intact() {
        // The marker line mixes `"` and `#` right next to each other, which
        // is easy to truncate when the surrounding literal uses too short a
        // raw-string guard. Pin the full script body.
        assert!(DEP_QUERY_SCRIPT.contains(r###"echo "## ${march}-${category} ##""###));
        assert!(DEP_QUERY_SCRIPT.trim_end().ends_with("done"));
    }

    #[test]
    fn query_deps_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("PKGBUILD"), "exit 7\n").unwrap();
        assert!(query_deps(tmp.path()).is_err());
    }
}
