//! Scoped privilege changes for tool invocations that must run as a
//! non-root user (source builds, artifact signing).

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::unistd::{setresuid, Uid, User};

use crate::error::UtilError;

/// Whether the current process runs with root privileges.
pub fn running_as_root() -> bool {
    Uid::effective().is_root()
}

/// Look up a system user by name.
///
/// # Errors
/// Returns an error if the lookup fails or the user does not exist.
pub fn user_by_name(name: &str) -> Result<User, UtilError> {
    User::from_name(name)
        .map_err(|_| UtilError::NoSuchUser {
            user: name.to_owned(),
        })?
        .ok_or_else(|| UtilError::NoSuchUser {
            user: name.to_owned(),
        })
}

/// Resolve the owning user of a path.
///
/// # Errors
/// Returns an error if the path cannot be stat'd or the owning uid has no
/// passwd entry.
pub fn path_owner(path: &Path) -> Result<User, UtilError> {
    let meta = std::fs::metadata(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let uid = Uid::from_raw(meta.uid());
    User::from_uid(uid)
        .map_err(|_| UtilError::NoSuchUser {
            user: uid.to_string(),
        })?
        .ok_or_else(|| UtilError::NoSuchUser {
            user: uid.to_string(),
        })
}

/// Temporarily reduced privileges.
///
/// While the guard is alive the real and effective uids are those of the
/// target user; the saved uid stays root so the process can switch back.
/// Restoration happens in `Drop`, so every exit path, including a failed
/// signing or build subprocess, returns to root.
#[derive(Debug)]
pub struct ReducedPrivileges {
    restored: bool,
}

impl ReducedPrivileges {
    /// Drop real and effective uids to `user`, keeping root as the saved uid.
    ///
    /// # Errors
    /// Returns an error if the uid switch is refused by the kernel.
    pub fn drop_to(user: &User) -> Result<Self, UtilError> {
        let uid = user.uid;
        tracing::debug!(user = %user.name, uid = %uid, "reducing privileges");
        setresuid(uid, uid, Uid::from_raw(0)).map_err(|source| UtilError::SetUid {
            uid: uid.as_raw(),
            source,
        })?;
        Ok(Self { restored: false })
    }

    /// Restore root privileges early, reporting any failure.
    ///
    /// # Errors
    /// Returns an error if the switch back to root fails; the `Drop` impl
    /// will retry in that case.
    pub fn restore(mut self) -> Result<(), UtilError> {
        self.restored = true;
        restore_root()
    }
}

impl Drop for ReducedPrivileges {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = restore_root() {
                tracing::warn!(error = %e, "could not restore root privileges");
            }
        }
    }
}

fn restore_root() -> Result<(), UtilError> {
    let root = Uid::from_raw(0);
    setresuid(root, root, root).map_err(|source| UtilError::SetUid { uid: 0, source })
}
