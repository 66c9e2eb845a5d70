//! Privileged hand-off ordering
//!
//! The privileged sequence is FIXED and must not drift:
//! 1. reconcile the account database (lookups, at most one group/user/membership)
//! 2. recursively chown the ownership set, while still root
//! 3. initgroups, setresgid, then setresuid
//! 4. exec our own binary with the unchanged argv
//!
//! After step 4 the process re-enters `cli::run` unprivileged and takes the
//! workload branch.

use crate::accounts::AccountDatabase;
use crate::config::types::{EntrypointConfig, EntrypointError, Result, TargetIdentity};
use crate::kernel::credentials::{transition_to_target, validate_ids};
use crate::kernel::ownership::OwnershipFixer;
use crate::reconcile;
use crate::utils::env_hygiene::{AccountEnv, EnvHygiene, EnvPolicy};
use std::convert::Infallible;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::path::PathBuf;

// AccountsReconciled -> OwnershipApplied -> CredsDropped
//
// Each step consumes the prior state and returns exactly one next state on success.
// Only Handoff<CredsDropped> exposes the re-exec.

/// Type-state marker: target identity exists in the account database
pub struct AccountsReconciled;

/// Type-state marker: ownership set belongs to the target identity
pub struct OwnershipApplied;

/// Type-state marker: process runs as the target identity
pub struct CredsDropped;

/// Entrypoint hand-off with type-state tracking
pub struct Handoff<S> {
    config: EntrypointConfig,
    target: TargetIdentity,
    /// Resolved before the drop; /proc/self/exe may be unreadable afterwards
    self_exe: Option<PathBuf>,
    account: Option<AccountEnv>,
    _state: PhantomData<S>,
}

impl<S> Handoff<S> {
    pub fn target(&self) -> &TargetIdentity {
        &self.target
    }

    fn advance<N>(self) -> Handoff<N> {
        Handoff {
            config: self.config,
            target: self.target,
            self_exe: self.self_exe,
            account: self.account,
            _state: PhantomData,
        }
    }
}

impl Handoff<AccountsReconciled> {
    /// Step 1: bring the account database in line with the desired ids.
    pub fn reconcile(
        config: EntrypointConfig,
        accounts: &mut dyn AccountDatabase,
    ) -> Result<Self> {
        log::info!(
            "Wanted UID={} GID={}",
            config.desired.uid,
            config.desired.gid
        );
        let target = reconcile::reconcile(&config, accounts)?;
        log::info!("Target identity: {}", target);

        Ok(Handoff {
            config,
            target,
            self_exe: None,
            account: None,
            _state: PhantomData,
        })
    }

    /// Step 2: chown every ownership-set path, then confirm nothing was missed.
    pub fn apply_ownership(self, fixer: &dyn OwnershipFixer) -> Result<Handoff<OwnershipApplied>> {
        let (uid, gid) = (self.target.uid, self.target.gid);

        for path in &self.config.ownership_set {
            let report = fixer.chown_recursive(path, uid, gid)?;
            log::info!(
                "Ownership of {} set to {} ({} entries, {} changed)",
                path.display(),
                self.target.owner_spec(),
                report.entries,
                report.changed
            );

            let wrong = fixer.mismatched(path, uid, gid)?;
            if let Some(first) = wrong.first() {
                return Err(EntrypointError::Ownership {
                    path: first.clone(),
                    source: std::io::Error::other(format!(
                        "{} entries under {} still not owned by {}",
                        wrong.len(),
                        path.display(),
                        self.target.owner_spec()
                    )),
                });
            }
        }

        Ok(self.advance())
    }
}

impl Handoff<OwnershipApplied> {
    /// Whether the target keeps uid 0, which skips the drop and the re-exec.
    pub fn targets_root(&self) -> bool {
        self.target.uid == 0
    }

    /// Step 3: become the target identity.
    pub fn drop_credentials(mut self) -> Result<Handoff<CredsDropped>> {
        validate_ids(self.target.uid, self.target.gid, true)?;

        self.self_exe = Some(std::env::current_exe().map_err(|e| {
            EntrypointError::Exec(format!("cannot resolve own executable: {}", e))
        })?);
        self.account = AccountEnv::lookup(&self.target.user)?;

        transition_to_target(&self.target)?;
        Ok(self.advance())
    }

    /// `PUID=0` without `--deny-root`: run the workload in place.
    pub fn run_as_root(self, command: &[OsString]) -> Result<()> {
        validate_ids(self.target.uid, self.target.gid, self.config.strict_mode)?;
        log::warn!(
            "Running workload as {} without dropping privileges",
            self.target
        );
        crate::exec::workload::run_workload(command)
    }
}

impl Handoff<CredsDropped> {
    /// Step 4: replace the process image with our own binary and `argv`.
    ///
    /// Only returns on failure, and that failure is fatal: nothing may keep
    /// running in the privileged sequence once the drop happened.
    pub fn reexec(self, argv: &[OsString]) -> Result<Infallible> {
        let exe = self
            .self_exe
            .as_ref()
            .ok_or_else(|| EntrypointError::Exec("own executable not resolved".to_string()))?;

        let hygiene = EnvHygiene::new(EnvPolicy::default());
        let env_map = hygiene.handoff_environment(std::env::vars_os(), self.account.as_ref());
        let cenv = EnvHygiene::exec_env(&env_map)?;

        let exe_c = crate::exec::workload::to_cstrings([exe.as_os_str()])?
            .pop()
            .ok_or_else(|| EntrypointError::Exec("empty executable path".to_string()))?;
        let mut cargv = crate::exec::workload::to_cstrings(argv)?;
        if cargv.is_empty() {
            cargv.push(exe_c.clone());
        }

        log::info!("Re-executing {} as {}", exe.display(), self.target);
        nix::unistd::execve(exe_c.as_c_str(), &cargv, &cenv)
            .map_err(|e| EntrypointError::Exec(format!("execve {} failed: {}", exe.display(), e)))
    }
}

#[cfg(test)]
mod typestate_tests {
    use super::*;
    use crate::config::types::DesiredIdentity;
    use crate::testing::{FakeAccounts, RecordingOwnership};

    fn config(uid: u32, gid: u32) -> EntrypointConfig {
        EntrypointConfig {
            desired: DesiredIdentity::new(uid, gid),
            ..EntrypointConfig::default()
        }
    }

    #[test]
    fn test_chain_reaches_ownership_applied() {
        let mut accounts = FakeAccounts::alpine_base();
        let fixer = RecordingOwnership::new();

        let handoff = Handoff::reconcile(config(2000, 2000), &mut accounts).unwrap();
        assert_eq!(handoff.target().owner_spec(), "wizarruser:wizarrgroup");

        let handoff = handoff.apply_ownership(&fixer).unwrap();
        assert!(!handoff.targets_root());
        assert_eq!(
            fixer.calls(),
            vec![
                (PathBuf::from("/data/database"), 2000, 2000),
                (PathBuf::from("/.cache"), 2000, 2000),
                (PathBuf::from("/etc/wizarr/wizard_steps"), 2000, 2000),
            ]
        );

        // The drop itself needs root; reaching OwnershipApplied proves the ordering.
    }

    #[test]
    fn test_chown_failure_stops_the_chain() {
        let mut accounts = FakeAccounts::alpine_base();
        let fixer = RecordingOwnership::failing_on("/.cache");

        let handoff = Handoff::reconcile(config(2000, 2000), &mut accounts).unwrap();
        let err = handoff.apply_ownership(&fixer).err().unwrap();
        assert!(matches!(err, EntrypointError::Ownership { .. }));
        // the path after the failing one is never touched
        assert_eq!(fixer.calls().len(), 1);
    }

    #[test]
    fn test_reconcile_failure_stops_before_chown() {
        let mut accounts = FakeAccounts::alpine_base();
        accounts.fail_creation();
        assert!(Handoff::reconcile(config(2000, 2000), &mut accounts).is_err());
    }

    #[test]
    fn test_drop_rejects_root_target() {
        let mut accounts = FakeAccounts::alpine_base();
        let cfg = EntrypointConfig {
            strict_mode: false,
            ..config(0, 0)
        };
        let handoff = Handoff::reconcile(cfg, &mut accounts)
            .unwrap()
            .apply_ownership(&RecordingOwnership::new())
            .unwrap();
        assert!(handoff.targets_root());
        assert_eq!(handoff.target().owner_spec(), "root:root");
        assert!(matches!(
            handoff.drop_credentials(),
            Err(EntrypointError::Privilege(_))
        ));
    }

    #[test]
    fn test_gid_zero_target_still_drops() {
        let mut accounts = FakeAccounts::alpine_base();
        let handoff = Handoff::reconcile(config(1000, 0), &mut accounts)
            .unwrap()
            .apply_ownership(&RecordingOwnership::new())
            .unwrap();
        assert_eq!(handoff.target().owner_spec(), "wizarruser:root");
        assert!(!handoff.targets_root());
    }

    #[test]
    fn test_run_as_root_rejected_in_strict_mode() {
        let mut accounts = FakeAccounts::alpine_base();
        let cfg = EntrypointConfig {
            strict_mode: true,
            ..config(0, 0)
        };
        let handoff = Handoff::reconcile(cfg, &mut accounts)
            .unwrap()
            .apply_ownership(&RecordingOwnership::new())
            .unwrap();
        assert!(matches!(
            handoff.run_as_root(&[]),
            Err(EntrypointError::Privilege(_))
        ));
    }
}
