//! Environment hygiene for the privileged phase and the re-exec hand-off
//!
//! Account tooling runs with a pinned PATH so nothing earlier on the caller's
//! PATH can shadow it while we are still root. The environment passed across
//! the re-exec drops loader-injection variables and carries the target
//! account's identity variables.

use crate::config::types::{EntrypointError, Result};
use nix::unistd::{Uid, User};
use std::collections::BTreeMap;
use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// PATH used for every external tool spawned while privileged
pub const SAFE_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Shell used when the passwd entry has none
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Variables the dynamic loader honours; never forwarded across the drop
const LOADER_VARS: [&str; 8] = [
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "LD_BIND_NOW",
    "LD_DEBUG",
    "LD_PROFILE",
    "LD_USE_LOAD_BIAS",
    "LD_DYNAMIC_WEAK",
];

/// Locate an executable `program` on a colon-separated `search_path`.
pub fn find_in_path(program: &str, search_path: &str) -> Option<PathBuf> {
    search_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// passwd fields the hand-off needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEnv {
    pub name: String,
    pub home: PathBuf,
    pub shell: PathBuf,
}

impl AccountEnv {
    fn from_user(user: User) -> Self {
        let shell = if user.shell.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_SHELL)
        } else {
            user.shell
        };
        Self {
            name: user.name,
            home: user.dir,
            shell,
        }
    }

    /// passwd entry for the account `name`.
    pub fn lookup(name: &str) -> Result<Option<Self>> {
        User::from_name(name)
            .map(|user| user.map(Self::from_user))
            .map_err(|e| EntrypointError::Lookup(format!("getpwnam({}): {}", name, e)))
    }

    /// passwd entry for `uid`.
    pub fn lookup_uid(uid: u32) -> Result<Option<Self>> {
        User::from_uid(Uid::from_raw(uid))
            .map(|user| user.map(Self::from_user))
            .map_err(|e| EntrypointError::Lookup(format!("getpwuid({}): {}", uid, e)))
    }
}

/// Environment sanitization policy
#[derive(Debug, Clone)]
pub struct EnvPolicy {
    /// Remove LD_* loader variables
    pub sanitize_ld_vars: bool,
    /// Set USER, LOGNAME and HOME from the target account
    pub set_identity_vars: bool,
}

impl Default for EnvPolicy {
    fn default() -> Self {
        EnvPolicy {
            sanitize_ld_vars: true,
            set_identity_vars: true,
        }
    }
}

/// Builds the environment handed to the re-exec
pub struct EnvHygiene {
    policy: EnvPolicy,
}

impl EnvHygiene {
    pub fn new(policy: EnvPolicy) -> Self {
        EnvHygiene { policy }
    }

    /// Sanitize `vars` for a process that will run as `account`.
    pub fn handoff_environment<I>(
        &self,
        vars: I,
        account: Option<&AccountEnv>,
    ) -> BTreeMap<OsString, OsString>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut env_map: BTreeMap<OsString, OsString> = vars.into_iter().collect();

        if self.policy.sanitize_ld_vars {
            for var in LOADER_VARS {
                if env_map.remove(OsStr::new(var)).is_some() {
                    log::info!("Removed loader variable {} before privilege drop", var);
                }
            }
        }

        if self.policy.set_identity_vars {
            if let Some(account) = account {
                env_map.insert("USER".into(), account.name.clone().into());
                env_map.insert("LOGNAME".into(), account.name.clone().into());
                env_map.insert("HOME".into(), account.home.clone().into_os_string());
            }
        }

        env_map
    }

    /// `KEY=VALUE` C strings for execve, in key order.
    pub fn exec_env(env_map: &BTreeMap<OsString, OsString>) -> Result<Vec<CString>> {
        env_map
            .iter()
            .map(|(key, value)| {
                let mut entry = Vec::with_capacity(key.len() + value.len() + 1);
                entry.extend_from_slice(key.as_bytes());
                entry.push(b'=');
                entry.extend_from_slice(value.as_bytes());
                CString::new(entry).map_err(|_| {
                    EntrypointError::Config(format!(
                        "environment variable {:?} contains a NUL byte",
                        key
                    ))
                })
            })
            .collect()
    }
}
