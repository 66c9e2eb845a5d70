//! Workload hand-off once the process runs unprivileged.

use crate::config::types::{EntrypointError, Result};
use crate::utils::env_hygiene::{AccountEnv, DEFAULT_SHELL};
use std::convert::Infallible;
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// What the unprivileged branch does with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadAction {
    /// Replace the process with this command
    Exec(Vec<OsString>),
    /// PID 1 without arguments: become the account's login shell
    LoginShell(PathBuf),
    /// Not PID 1 and no arguments: nothing to run
    Nothing,
}

/// Shells that refuse interactive logins; created accounts get one of these.
const NOLOGIN_SHELLS: [&str; 2] = ["nologin", "false"];

/// The passwd shell, unless it is missing or refuses logins.
fn interactive_shell(shell: Option<PathBuf>) -> PathBuf {
    match shell {
        Some(shell)
            if !shell
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| NOLOGIN_SHELLS.contains(&name)) =>
        {
            shell
        }
        _ => PathBuf::from(DEFAULT_SHELL),
    }
}

/// Pick the workload for `command`.
pub fn choose_workload(command: &[OsString], is_pid1: bool, shell: Option<PathBuf>) -> WorkloadAction {
    if !command.is_empty() {
        WorkloadAction::Exec(command.to_vec())
    } else if is_pid1 {
        WorkloadAction::LoginShell(interactive_shell(shell))
    } else {
        WorkloadAction::Nothing
    }
}

pub(crate) fn to_cstrings<I, S>(args: I) -> Result<Vec<CString>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    args.into_iter()
        .map(|arg| {
            CString::new(arg.as_ref().as_bytes()).map_err(|_| {
                EntrypointError::Config(format!(
                    "argument {:?} contains a NUL byte",
                    arg.as_ref()
                ))
            })
        })
        .collect()
}

/// execvp the command; only returns on failure.
pub fn exec_command(command: &[OsString]) -> Result<Infallible> {
    let cargv = to_cstrings(command)?;
    let program = cargv
        .first()
        .ok_or_else(|| EntrypointError::Config("Empty command for exec".to_string()))?;

    log::info!("Executing workload: {:?}", command);
    nix::unistd::execvp(program.as_c_str(), &cargv)
        .map_err(|e| EntrypointError::Exec(format!("execvp {:?} failed: {}", command[0], e)))
}

/// Run the workload for the current (already unprivileged) identity.
///
/// Returns `Ok(())` only when there is nothing to run.
pub fn run_workload(command: &[OsString]) -> Result<()> {
    let uid = nix::unistd::getuid().as_raw();
    let gid = nix::unistd::getgid().as_raw();
    log::info!("Running as {}:{}", uid, gid);

    let is_pid1 = std::process::id() == 1;
    let shell = if command.is_empty() && is_pid1 {
        AccountEnv::lookup_uid(uid)?.map(|account| account.shell)
    } else {
        None
    };

    match choose_workload(command, is_pid1, shell) {
        WorkloadAction::Exec(argv) => match exec_command(&argv)? {},
        WorkloadAction::LoginShell(shell) => {
            log::info!("PID 1 without a command; starting shell {}", shell.display());
            match exec_command(&[shell.into_os_string()])? {}
        }
        WorkloadAction::Nothing => {
            log::info!("No command given and not PID 1; nothing to run");
            Ok(())
        }
    }
}
