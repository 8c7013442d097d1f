//! The artifact locator: resolve a dependency specifier against the local
//! artifact stores.

use std::path::{Path, PathBuf};

use pkgsmith_arch::Arch;
use pkgsmith_recipe::filename;

/// Locate a previously built artifact satisfying a dependency.
///
/// Searches the stage store first (freshly built artifacts take priority),
/// then the depends store of supplied artifacts. A filename matches when
/// its package name is exactly `name`, its architecture tag is the
/// requested one or `any`, and, when a pin is given, its version begins
/// with the pinned version (a pin of `0.6.2` accepts `0.6.2-1`). Signature
/// sidecars never match.
///
/// The first match in walk order wins; there is no ranking, so with several
/// candidate versions the result is simply the first one found. `None` is
/// not an error: the dependency may be satisfied by the environment's base
/// template.
pub fn locate(
    stage_dir: &Path,
    depends_dir: &Path,
    name: &str,
    version_pin: Option<&str>,
    arch: Arch,
) -> Option<PathBuf> {
    for store in [stage_dir, depends_dir] {
        let files = match pkgsmith_util::fs::collect_files(store) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(store = %store.display(), error = %e, "cannot walk artifact store");
                continue;
            }
        };
        for path in files {
            let Some(fname) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if matches_spec(fname, name, version_pin, arch) {
                tracing::debug!(dependency = name, artifact = %path.display(), "resolved");
                return Some(path);
            }
        }
    }
    None
}

fn matches_spec(fname: &str, name: &str, version_pin: Option<&str>, arch: Arch) -> bool {
    if filename::is_signature(fname) {
        return false;
    }
    if filename::name_from_filename(fname) != Some(name) {
        return false;
    }
    let Some(tag) = filename::arch_tag_from_filename(fname) else {
        return false;
    };
    if !arch.accepts_tag(tag) {
        return false;
    }
    match version_pin {
        Some(pin) => filename::version_from_filename(fname)
            .is_some_and(|version| version.starts_with(pin)),
        None => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn unconstrained_lookup_accepts_any_and_exact_tags() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        let depends = tmp.path().join("depends");
        touch(&depends, "foo-1.0-1-any.pkg.tar.xz");
        touch(&depends, "foo-2.0-1-x86_64.pkg.tar.xz");

        // x86_64: two candidates, first found wins (walk order).
        let hit = locate(&stage, &depends, "foo", None, Arch::X86_64).unwrap();
        assert_eq!(hit.file_name().unwrap(), "foo-1.0-1-any.pkg.tar.xz");

        // i686: only the architecture-independent artifact matches.
        let hit = locate(&stage, &depends, "foo", None, Arch::I686).unwrap();
        assert_eq!(hit.file_name().unwrap(), "foo-1.0-1-any.pkg.tar.xz");
    }

    #[test]
    fn stage_store_takes_priority_over_depends() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage").join("foo-2.0-1");
        let depends = tmp.path().join("depends");
        touch(&stage, "foo-2.0-1-i686.pkg.tar.xz");
        touch(&depends, "foo-1.0-1-i686.pkg.tar.xz");

        let hit = locate(
            &tmp.path().join("stage"),
            &depends,
            "foo",
            None,
            Arch::I686,
        )
        .unwrap();
        assert_eq!(hit.file_name().unwrap(), "foo-2.0-1-i686.pkg.tar.xz");
    }

    #[test]
    fn version_pin_matches_by_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        let depends = tmp.path().join("depends");
        touch(&depends, "spl-0.6.2-1-x86_64.pkg.tar.xz");

        assert!(locate(&stage, &depends, "spl", Some("0.6.2"), Arch::X86_64).is_some());
        assert!(locate(&stage, &depends, "spl", Some("0.6.3"), Arch::X86_64).is_none());
    }

    #[test]
    fn signature_sidecars_are_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        let depends = tmp.path().join("depends");
        touch(&depends, "foo-1.0-1-any.pkg.tar.xz.sig");

        assert!(locate(&stage, &depends, "foo", None, Arch::X86_64).is_none());
    }

    #[test]
    fn name_must_match_exactly() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        let depends = tmp.path().join("depends");
        touch(&depends, "foobar-1.0-1-any.pkg.tar.xz");

        assert!(locate(&stage, &depends, "foo", None, Arch::X86_64).is_none());
    }

    #[test]
    fn missing_stores_are_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(locate(
            &tmp.path().join("no-stage"),
            &tmp.path().join("no-depends"),
            "foo",
            None,
            Arch::I686,
        )
        .is_none());
    }
}
