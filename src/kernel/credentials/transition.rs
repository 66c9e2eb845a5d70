//! UID/GID transition to the reconciled target identity.
//!
//! CRITICAL: supplementary groups and setresgid MUST happen BEFORE setresuid;
//! once the uid is dropped the process can no longer change its groups.

use super::validation::validate_target;
use crate::config::types::{EntrypointError, Result, TargetIdentity};
use std::ffi::CString;

/// 5-step transition: validate -> initgroups -> setresgid -> setresuid -> verify.
pub fn transition_to_target(target: &TargetIdentity) -> Result<()> {
    validate_target(target)?;
    set_supplementary_groups(&target.user, target.gid)?;
    // CRITICAL: GID before UID
    set_gid(target.gid)?;
    set_uid(target.uid)?;
    verify_transition(target.uid, target.gid)?;

    log::info!("Dropped privileges to {}", target);
    Ok(())
}

/// Supplementary groups from the group database, so a pre-existing account keeps
/// the membership in the target group added during reconciliation.
fn set_supplementary_groups(user: &str, gid: u32) -> Result<()> {
    let user_c = CString::new(user).map_err(|_| {
        EntrypointError::Privilege(format!("account name {:?} contains a NUL byte", user))
    })?;

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    {
        nix::unistd::initgroups(&user_c, nix::unistd::Gid::from_raw(gid)).map_err(|e| {
            EntrypointError::Privilege(format!(
                "Failed to set supplementary groups for {}: {}",
                user, e
            ))
        })?;
        log::debug!("Supplementary groups set for {}", user);
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        let _ = (user_c, gid);
        log::warn!("initgroups is unavailable on this platform; keeping current groups");
    }

    Ok(())
}

/// MUST be called BEFORE set_uid.
fn set_gid(gid: u32) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: setresgid atomically sets real, effective and saved GIDs.
        let result =
            unsafe { libc::setresgid(gid as libc::gid_t, gid as libc::gid_t, gid as libc::gid_t) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            return Err(EntrypointError::Privilege(format!(
                "Failed to setresgid({}): {}",
                gid, err
            )));
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        nix::unistd::setgid(nix::unistd::Gid::from_raw(gid)).map_err(|e| {
            EntrypointError::Privilege(format!("Failed to setgid({}): {}", gid, e))
        })?;
    }

    log::debug!("Set GID to {}", gid);
    Ok(())
}

/// MUST be called AFTER set_gid.
fn set_uid(uid: u32) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: setresuid atomically sets real, effective and saved UIDs.
        // CRITICAL: Must be called after setresgid.
        let result =
            unsafe { libc::setresuid(uid as libc::uid_t, uid as libc::uid_t, uid as libc::uid_t) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            return Err(EntrypointError::Privilege(format!(
                "Failed to setresuid({}): {}",
                uid, err
            )));
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        nix::unistd::setuid(nix::unistd::Uid::from_raw(uid)).map_err(|e| {
            EntrypointError::Privilege(format!("Failed to setuid({}): {}", uid, e))
        })?;
    }

    log::debug!("Set UID to {}", uid);
    Ok(())
}

fn verify_transition(expected_uid: u32, expected_gid: u32) -> Result<()> {
    use nix::unistd::{getegid, geteuid, getgid, getuid};

    let real_uid = getuid().as_raw();
    let effective_uid = geteuid().as_raw();
    let real_gid = getgid().as_raw();
    let effective_gid = getegid().as_raw();

    if real_uid != expected_uid || effective_uid != expected_uid {
        return Err(EntrypointError::Privilege(format!(
            "UID verification failed: expected {}, got real={}, effective={}",
            expected_uid, real_uid, effective_uid
        )));
    }

    if real_gid != expected_gid || effective_gid != expected_gid {
        return Err(EntrypointError::Privilege(format!(
            "GID verification failed: expected {}, got real={}, effective={}",
            expected_gid, real_gid, effective_gid
        )));
    }

    log::debug!("UID/GID verification passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(uid: u32, gid: u32) -> TargetIdentity {
        TargetIdentity {
            user: "wizarruser".to_string(),
            uid,
            group: "wizarrgroup".to_string(),
            gid,
        }
    }

    #[test]
    fn transition_rejects_root_targets_before_any_syscall() {
        assert!(matches!(
            transition_to_target(&target(0, 1000)),
            Err(EntrypointError::Privilege(_))
        ));
        assert!(matches!(
            transition_to_target(&target(0, 0)),
            Err(EntrypointError::Privilege(_))
        ));
    }

    #[test]
    fn verify_accepts_current_ids() {
        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();
        // real == effective outside setuid binaries
        if nix::unistd::geteuid().as_raw() == uid && nix::unistd::getegid().as_raw() == gid {
            assert!(verify_transition(uid, gid).is_ok());
        }
        assert!(verify_transition(uid.wrapping_add(1), gid).is_err());
    }
}
