//! Checks run before any credential syscall.

use crate::config::types::{EntrypointError, Result, TargetIdentity};

/// Refuse to "drop" to uid 0: the re-exec would land in the privileged branch again.
/// gid 0 is fine, the re-exec runs with a non-root euid either way.
/// Permissive mode only warns; the caller then skips the drop entirely.
pub fn validate_ids(uid: u32, gid: u32, strict_mode: bool) -> Result<()> {
    if uid == 0 {
        let msg = format!(
            "Cannot drop privileges to root UID (uid={}, gid={})",
            uid, gid
        );
        if strict_mode {
            return Err(EntrypointError::Privilege(msg));
        } else {
            log::warn!("{} (permissive mode)", msg);
        }
    }
    Ok(())
}

/// The target's names must be usable as C strings for initgroups(3).
pub fn validate_target(target: &TargetIdentity) -> Result<()> {
    if target.user.is_empty() || target.user.contains('\0') {
        return Err(EntrypointError::Privilege(format!(
            "Invalid account name for privilege drop: {:?}",
            target.user
        )));
    }
    validate_ids(target.uid, target.gid, true)
}
