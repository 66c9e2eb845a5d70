//! UID/GID reconciliation against the account database.
//!
//! Planning is read-only ([`plan::plan`]); [`apply_plan`] performs the at most
//! one group creation, one user creation or one membership add, then re-reads
//! both ids to confirm the result.

pub mod plan;

use crate::accounts::AccountDatabase;
use crate::config::types::{EntrypointConfig, EntrypointError, Result, TargetIdentity};

pub use plan::{plan, ReconcilePlan};

/// Plan and apply in one go.
pub fn reconcile(
    config: &EntrypointConfig,
    accounts: &mut dyn AccountDatabase,
) -> Result<TargetIdentity> {
    let plan = plan(config, &*accounts)?;
    apply_plan(&plan, accounts)
}

/// Apply `plan`. Every failure is fatal except the membership add.
pub fn apply_plan(
    plan: &ReconcilePlan,
    accounts: &mut dyn AccountDatabase,
) -> Result<TargetIdentity> {
    if plan.is_noop() {
        log::info!(
            "UID {} and GID {} already exist, nothing to create",
            plan.uid,
            plan.gid
        );
    }

    if plan.create_group {
        ensure_name_free("group", &plan.group_name, plan.gid, accounts.gid_of_group(&plan.group_name)?)?;
        log::info!("Creating group '{}' (GID {})", plan.group_name, plan.gid);
        accounts.create_group(&plan.group_name, plan.gid)?;
    }

    if plan.create_user {
        ensure_name_free("user", &plan.user_name, plan.uid, accounts.uid_of_user(&plan.user_name)?)?;
        log::info!(
            "Creating user '{}' (UID {}, group '{}')",
            plan.user_name,
            plan.uid,
            plan.group_name
        );
        accounts.create_user(&plan.user_name, plan.uid, &plan.group_name)?;
    } else if plan.ensure_membership {
        // Best effort: already a member, or the tool refuses redundant membership.
        match accounts.add_user_to_group(&plan.user_name, &plan.group_name) {
            Ok(()) => log::info!(
                "Added '{}' to group '{}'",
                plan.user_name,
                plan.group_name
            ),
            Err(e) => log::warn!(
                "Could not add '{}' to group '{}' (continuing): {}",
                plan.user_name,
                plan.group_name,
                e
            ),
        }
    }

    verify(plan, &*accounts)?;
    Ok(plan.target())
}

fn ensure_name_free(kind: &str, name: &str, wanted: u32, bound: Option<u32>) -> Result<()> {
    match bound {
        Some(id) if id != wanted => Err(EntrypointError::Account(format!(
            "{} '{}' already exists with id {}, cannot bind it to id {}",
            kind, name, id, wanted
        ))),
        _ => Ok(()),
    }
}

fn verify(plan: &ReconcilePlan, accounts: &dyn AccountDatabase) -> Result<()> {
    let user = accounts.user_by_uid(plan.uid)?;
    if user.as_deref() != Some(plan.user_name.as_str()) {
        return Err(EntrypointError::Account(format!(
            "UID {} resolves to {:?} after reconciliation, expected '{}'",
            plan.uid, user, plan.user_name
        )));
    }

    let group = accounts.group_by_gid(plan.gid)?;
    if group.as_deref() != Some(plan.group_name.as_str()) {
        return Err(EntrypointError::Account(format!(
            "GID {} resolves to {:?} after reconciliation, expected '{}'",
            plan.gid, group, plan.group_name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::DesiredIdentity;
    use crate::testing::{FakeAccounts, Mutation};

    fn config(uid: u32, gid: u32) -> EntrypointConfig {
        EntrypointConfig {
            desired: DesiredIdentity::new(uid, gid),
            ..EntrypointConfig::default()
        }
    }

    #[test]
    fn fresh_ids_create_group_then_user() {
        let mut accounts = FakeAccounts::alpine_base();
        let target = reconcile(&config(2000, 2000), &mut accounts).unwrap();

        assert_eq!(target.owner_spec(), "wizarruser:wizarrgroup");
        assert_eq!(
            accounts.mutations(),
            vec![
                Mutation::CreateGroup("wizarrgroup".into(), 2000),
                Mutation::CreateUser("wizarruser".into(), 2000, "wizarrgroup".into()),
            ]
        );
        assert!(accounts.is_member("wizarruser", "wizarrgroup"));
    }

    #[test]
    fn existing_user_joins_group_without_new_user() {
        let mut accounts = FakeAccounts::alpine_base();
        accounts.insert_user("node", 1000, 1000);
        accounts.insert_group("node", 1000);

        let target = reconcile(&config(1000, 2000), &mut accounts).unwrap();
        assert_eq!(target.owner_spec(), "node:wizarrgroup");
        assert_eq!(
            accounts.mutations(),
            vec![
                Mutation::CreateGroup("wizarrgroup".into(), 2000),
                Mutation::AddMember("node".into(), "wizarrgroup".into()),
            ]
        );
        assert!(accounts.is_member("node", "wizarrgroup"));
    }

    #[test]
    fn membership_failure_does_not_abort() {
        let mut accounts = FakeAccounts::alpine_base();
        accounts.insert_user("node", 1000, 1000);
        accounts.insert_group("node", 1000);
        accounts.fail_membership();

        let target = reconcile(&config(1000, 1000), &mut accounts).unwrap();
        assert_eq!(target.owner_spec(), "node:node");
        assert!(accounts
            .mutations()
            .iter()
            .all(|m| !matches!(m, Mutation::CreateUser(..) | Mutation::CreateGroup(..))));
    }

    #[test]
    fn creation_failure_aborts() {
        let mut accounts = FakeAccounts::alpine_base();
        accounts.fail_creation();
        let err = reconcile(&config(2000, 2000), &mut accounts).unwrap_err();
        assert!(matches!(err, EntrypointError::CommandFailed { .. }));
        assert!(accounts.mutations().is_empty());
    }

    #[test]
    fn fallback_name_bound_to_other_id_is_rejected() {
        let mut accounts = FakeAccounts::alpine_base();
        // left behind by a previous run with PGID=2000
        accounts.insert_group("wizarrgroup", 2000);

        let err = reconcile(&config(3000, 3000), &mut accounts).unwrap_err();
        assert!(matches!(err, EntrypointError::Account(_)));
        assert!(accounts.mutations().is_empty());
    }

    #[test]
    fn second_run_is_idempotent() {
        let mut accounts = FakeAccounts::alpine_base();
        let first = reconcile(&config(2000, 2000), &mut accounts).unwrap();
        let after_first = accounts.mutations().len();

        let second = reconcile(&config(2000, 2000), &mut accounts).unwrap();
        assert_eq!(first, second);
        // only the tolerated membership attempt is added
        let extra: Vec<_> = accounts.mutations().into_iter().skip(after_first).collect();
        assert_eq!(
            extra,
            vec![Mutation::AddMember("wizarruser".into(), "wizarrgroup".into())]
        );
        assert_eq!(accounts.users_with_uid(2000), 1);
        assert_eq!(accounts.groups_with_gid(2000), 1);
    }

    #[test]
    fn silently_ignored_create_is_caught_by_verification() {
        let mut accounts = FakeAccounts::alpine_base();
        accounts.drop_creations();
        let err = reconcile(&config(2000, 2000), &mut accounts).unwrap_err();
        assert!(matches!(err, EntrypointError::Account(_)));
    }

    #[test]
    fn lookup_failure_aborts_before_mutation() {
        let mut accounts = FakeAccounts::alpine_base();
        accounts.fail_lookups();
        let err = reconcile(&config(2000, 2000), &mut accounts).unwrap_err();
        assert!(matches!(err, EntrypointError::Lookup(_)));
        assert!(accounts.mutations().is_empty());
    }
}
