//! Run configuration for pkgsmith.
//!
//! A `pkgsmith.toml` lives in the repository working directory (the
//! directory holding `devsrc/` and `stage/`). The configuration is read
//! once, validated, and never mutated afterwards; all batch-mutable state
//! lives in the orchestrator's `RunState`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// The `pkgsmith.toml` run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base path holding the per-architecture chroots.
    pub chroot_path: PathBuf,
    /// Prefix for the chroot working-copy name; the architecture suffix
    /// ("32"/"64") is appended per build.
    pub chroot_copy: String,
    /// Default repository target for `pkgsmith repo`.
    pub repo_path: PathBuf,
    /// GPG key id used to sign artifacts and the repository index.
    pub signing_key: String,
    /// System user whose keyring holds the signing key. Signing runs as
    /// this user so gpg sees their home directory and agent socket.
    pub key_owner: String,
    /// Log verbosity filter (tracing env-filter syntax).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Explicit package build order. When empty, the directory listing of
    /// `devsrc/` is used instead.
    #[serde(default)]
    pub packages: Vec<String>,
    /// Packages to skip even when present in the build order.
    #[serde(default)]
    pub skip: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Config {
    /// Read and parse a `pkgsmith.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, contains invalid TOML,
    /// or a required field is empty.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The effective build order: configured packages, or the sorted
    /// directory listing of `<root>/devsrc` when none are configured, with
    /// skipped packages removed.
    ///
    /// # Errors
    /// Returns an error if the `devsrc` listing is needed but unreadable.
    pub fn build_order(&self, root: &Path) -> Result<Vec<String>, ConfigError> {
        let mut names = if self.packages.is_empty() {
            let devsrc = root.join("devsrc");
            let entries = std::fs::read_dir(&devsrc).map_err(|e| ConfigError::Read {
                path: devsrc.display().to_string(),
                source: e,
            })?;
            let mut listed: Vec<String> = entries
                .filter_map(Result::ok)
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect();
            listed.sort();
            listed
        } else {
            self.packages.clone()
        };
        names.retain(|n| !self.skip.contains(n));
        Ok(names)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("chroot_path", self.chroot_path.as_os_str().is_empty()),
            ("chroot_copy", self.chroot_copy.is_empty()),
            ("repo_path", self.repo_path.as_os_str().is_empty()),
            ("signing_key", self.signing_key.is_empty()),
            ("key_owner", self.key_owner.is_empty()),
        ] {
            if value {
                return Err(ConfigError::MissingField {
                    field: field.to_owned(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid pkgsmith.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("pkgsmith.toml is missing a value for `{field}`")]
    MissingField { field: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    const GOOD: &str = r#"
chroot_path = "/var/chroot"
chroot_copy = "build"
repo_path = "/srv/repo"
signing_key = "0xDEADBEEF"
key_owner = "builder"
packages = ["linux-tools", "zfs"]
skip = ["zfs"]
"#;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pkgsmith.toml");
        fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn parses_full_config() {
        let (_tmp, path) = write_config(GOOD);
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.chroot_path, PathBuf::from("/var/chroot"));
        assert_eq!(config.chroot_copy, "build");
        assert_eq!(config.signing_key, "0xDEADBEEF");
        assert_eq!(config.key_owner, "builder");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Config::from_path(&tmp.path().join("pkgsmith.toml")).is_err());
    }

    #[test]
    fn empty_signing_key_is_an_error() {
        let (_tmp, path) = write_config(
            "chroot_path = \"/c\"\nchroot_copy = \"b\"\nrepo_path = \"/r\"\nsigning_key = \"\"\nkey_owner = \"builder\"\n",
        );
        let err = Config::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("signing_key"));
    }

    #[test]
    fn empty_key_owner_is_an_error() {
        let (_tmp, path) = write_config(
            "chroot_path = \"/c\"\nchroot_copy = \"b\"\nrepo_path = \"/r\"\nsigning_key = \"k\"\nkey_owner = \"\"\n",
        );
        let err = Config::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("key_owner"));
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let (_tmp, path) = write_config("chroot_path = \"/c\"\n");
        assert!(Config::from_path(&path).is_err());
    }

    #[test]
    fn build_order_honors_skip_list() {
        let (tmp, path) = write_config(GOOD);
        let config = Config::from_path(&path).unwrap();
        let order = config.build_order(tmp.path()).unwrap();
        assert_eq!(order, vec!["linux-tools".to_owned()]);
    }

    #[test]
    fn build_order_defaults_to_devsrc_listing() {
        let (tmp, path) = write_config(
            "chroot_path = \"/c\"\nchroot_copy = \"b\"\nrepo_path = \"/r\"\nsigning_key = \"k\"\nkey_owner = \"builder\"\n",
        );
        let devsrc = tmp.path().join("devsrc");
        fs::create_dir_all(devsrc.join("zlib")).unwrap();
        fs::create_dir_all(devsrc.join("attr")).unwrap();
        fs::write(devsrc.join("README"), b"not a package").unwrap();

        let config = Config::from_path(&path).unwrap();
        let order = config.build_order(tmp.path()).unwrap();
        assert_eq!(order, vec!["attr".to_owned(), "zlib".to_owned()]);
    }
}
