//! Filesystem utilities for pkgsmith.

use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Expand a glob pattern into the matching paths, sorted.
///
/// Unreadable entries during expansion are skipped rather than failing the
/// whole expansion.
///
/// # Errors
/// Returns an error if the pattern itself is malformed.
pub fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>, UtilError> {
    let entries = glob::glob(pattern).map_err(|e| UtilError::GlobPattern {
        pattern: pattern.to_owned(),
        message: e.to_string(),
    })?;
    let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
    paths.sort();
    Ok(paths)
}

/// Move `src` into the directory `dest_dir`, keeping the filename.
///
/// Tries a rename first and falls back to copy-then-remove when the rename
/// fails (e.g. across filesystems; stage and devsrc commonly live on
/// different mounts than the chroot).
///
/// # Errors
/// Returns an error if `src` has no filename or both strategies fail.
pub fn move_into(src: &Path, dest_dir: &Path) -> Result<PathBuf, UtilError> {
    let Some(name) = src.file_name() else {
        return Err(UtilError::Io {
            path: src.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no filename"),
        });
    };
    ensure_dir(dest_dir)?;
    let dest = dest_dir.join(name);

    if std::fs::rename(src, &dest).is_err() {
        std::fs::copy(src, &dest).map_err(|source| UtilError::Io {
            path: dest.display().to_string(),
            source,
        })?;
        std::fs::remove_file(src).map_err(|source| UtilError::Io {
            path: src.display().to_string(),
            source,
        })?;
    }
    Ok(dest)
}

/// Copy `src` into the directory `dest_dir`, keeping the filename.
///
/// # Errors
/// Returns an error if `src` has no filename or the copy fails.
pub fn copy_into(src: &Path, dest_dir: &Path) -> Result<PathBuf, UtilError> {
    let Some(name) = src.file_name() else {
        return Err(UtilError::Io {
            path: src.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no filename"),
        });
    };
    ensure_dir(dest_dir)?;
    let dest = dest_dir.join(name);
    std::fs::copy(src, &dest).map_err(|source| UtilError::Io {
        path: dest.display().to_string(),
        source,
    })?;
    Ok(dest)
}

/// Remove every file matching a glob pattern. Missing matches are fine;
/// individual removal failures are logged and skipped.
///
/// # Errors
/// Returns an error only if the pattern is malformed.
pub fn remove_matching(pattern: &str) -> Result<usize, UtilError> {
    let mut removed = 0;
    for path in glob_paths(pattern)? {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove"),
        }
    }
    Ok(removed)
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Collect all plain files under `dir`, recursively, sorted by path.
///
/// Returns an empty list when `dir` does not exist: the dependency stores
/// are optional and an absent store simply holds nothing.
///
/// # Errors
/// Returns an error if an existing directory cannot be read.
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, UtilError> {
    let mut files = Vec::new();
    if dir.is_dir() {
        collect_files_recursive(dir, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn collect_files_recursive(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), UtilError> {
    let entries = std::fs::read_dir(dir).map_err(|source| UtilError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| UtilError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
