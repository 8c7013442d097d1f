//! The artifact filename convention:
//! `<name>-<version>-<architecture>.pkg.tar.xz`, where `<version>` is
//! `<pkgver>-<pkgrel>` and `<architecture>` is `x86_64`, `i686`, or `any`.
//! A detached signature shares the filename plus a `.sig` suffix.

use std::sync::OnceLock;

use regex::Regex;

/// Extension of a binary package artifact.
pub const ARTIFACT_SUFFIX: &str = ".pkg.tar.xz";
/// Extension of an architecture-independent source package.
pub const SOURCE_SUFFIX: &str = ".src.tar.gz";
/// Suffix of a detached signature sidecar.
pub const SIG_SUFFIX: &str = ".sig";

/// Compose an artifact filename from its parts.
pub fn artifact_filename(name: &str, version: &str, arch_tag: &str) -> String {
    format!("{name}-{version}-{arch_tag}{ARTIFACT_SUFFIX}")
}

fn parts_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"^([\w.+-]+?)-([\w.]+-\d+)-(x86_64|i686|any)\.pkg\.tar\.xz$").unwrap()
    })
}

/// Extract the package name from an artifact filename, if it follows the
/// convention.
pub fn name_from_filename(filename: &str) -> Option<&str> {
    parts_re()
        .captures(filename)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Extract the `<pkgver>-<pkgrel>` version from an artifact filename.
pub fn version_from_filename(filename: &str) -> Option<&str> {
    parts_re()
        .captures(filename)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
}

/// Extract the architecture tag from an artifact filename.
pub fn arch_tag_from_filename(filename: &str) -> Option<&str> {
    parts_re()
        .captures(filename)
        .and_then(|c| c.get(3))
        .map(|m| m.as_str())
}

/// Whether a filename is a signature sidecar rather than an artifact.
pub fn is_signature(filename: &str) -> bool {
    filename.ends_with(SIG_SUFFIX)
}

/// Extract the package name from a source tarball filename
/// (`<name>-<pkgver>-<pkgrel>.src.tar.gz`).
pub fn name_from_source_filename(filename: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    let re = RE.get_or_init(|| Regex::new(r"^([\w.+-]+?)-[\w.]+-\d+\.src\.tar\.gz$").unwrap());
    re.captures(filename).and_then(|c| c.get(1)).map(|m| m.as_str())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn compose_and_split_round_trip() {
        let fname = artifact_filename("linux-tools", "1.2-3", "x86_64");
        assert_eq!(fname, "linux-tools-1.2-3-x86_64.pkg.tar.xz");
        assert_eq!(name_from_filename(&fname), Some("linux-tools"));
        assert_eq!(version_from_filename(&fname), Some("1.2-3"));
        assert_eq!(arch_tag_from_filename(&fname), Some("x86_64"));
    }

    #[test]
    fn any_tag_parses() {
        let fname = "grub-theme-2.01-4-any.pkg.tar.xz";
        assert_eq!(name_from_filename(fname), Some("grub-theme"));
        assert_eq!(version_from_filename(fname), Some("2.01-4"));
        assert_eq!(arch_tag_from_filename(fname), Some("any"));
    }

    #[test]
    fn signature_sidecar_does_not_parse_as_artifact() {
        let fname = "foo-1.0-1-i686.pkg.tar.xz.sig";
        assert!(is_signature(fname));
        assert_eq!(name_from_filename(fname), None);
    }

    #[test]
    fn source_tarball_names() {
        assert_eq!(
            name_from_source_filename("linux-tools-1.2-3.src.tar.gz"),
            Some("linux-tools")
        );
        assert_eq!(name_from_source_filename("linux-tools-1.2-3-x86_64.pkg.tar.xz"), None);
        assert_eq!(name_from_source_filename("PKGBUILD"), None);
    }

    #[test]
    fn unrelated_files_do_not_parse() {
        assert_eq!(name_from_filename("PKGBUILD"), None);
        assert_eq!(name_from_filename("foo-1.0-1.src.tar.gz"), None);
        assert_eq!(name_from_filename("foo-1.0-1-armv7h.pkg.tar.xz"), None);
    }

    proptest::proptest! {
        #[test]
        fn round_trip_arbitrary_names(
            name in "[a-z][a-z0-9+-]{0,20}[a-z0-9]",
            pkgver in "[0-9]{1,3}\\.[0-9]{1,3}",
            pkgrel in 1u32..99,
        ) {
            let version = format!("{pkgver}-{pkgrel}");
            let fname = artifact_filename(&name, &version, "i686");
            proptest::prop_assert_eq!(name_from_filename(&fname), Some(name.as_str()));
            proptest::prop_assert_eq!(version_from_filename(&fname), Some(version.as_str()));
        }
    }
}
