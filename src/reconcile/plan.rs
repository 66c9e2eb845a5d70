//! Pure reconciliation planning.

use crate::accounts::AccountDatabase;
use crate::config::types::{EntrypointConfig, Result, TargetIdentity};
use serde::Serialize;
use std::path::PathBuf;

/// What reconciliation will do for one (uid, gid) pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub uid: u32,
    pub gid: u32,
    /// Existing owner of `uid`, or the fallback name
    pub user_name: String,
    /// Existing owner of `gid`, or the fallback name
    pub group_name: String,
    /// `gid` is unclaimed
    pub create_group: bool,
    /// `uid` is unclaimed
    pub create_user: bool,
    /// `uid` is claimed: add that account to the group (best effort)
    pub ensure_membership: bool,
    pub ownership_set: Vec<PathBuf>,
}

impl ReconcilePlan {
    /// Decide names and actions from the two independent lookups.
    pub fn resolve(
        config: &EntrypointConfig,
        existing_user: Option<String>,
        existing_group: Option<String>,
    ) -> Self {
        let create_user = existing_user.is_none();
        let create_group = existing_group.is_none();

        Self {
            uid: config.desired.uid,
            gid: config.desired.gid,
            user_name: existing_user.unwrap_or_else(|| config.fallback_user.clone()),
            group_name: existing_group.unwrap_or_else(|| config.fallback_group.clone()),
            create_group,
            create_user,
            ensure_membership: !create_user,
            ownership_set: config.ownership_set.clone(),
        }
    }

    /// Identity the workload runs as once the plan is applied.
    pub fn target(&self) -> TargetIdentity {
        TargetIdentity {
            user: self.user_name.clone(),
            uid: self.uid,
            group: self.group_name.clone(),
            gid: self.gid,
        }
    }

    /// No account database mutation beyond the membership attempt.
    pub fn is_noop(&self) -> bool {
        !self.create_group && !self.create_user
    }
}

/// Look up both ids and resolve the plan. Read-only.
pub fn plan(config: &EntrypointConfig, accounts: &dyn AccountDatabase) -> Result<ReconcilePlan> {
    let existing_user = accounts.user_by_uid(config.desired.uid)?;
    let existing_group = accounts.group_by_gid(config.desired.gid)?;

    match &existing_user {
        Some(name) => log::info!("UID {} already belongs to '{}'", config.desired.uid, name),
        None => log::info!("UID {} is unclaimed", config.desired.uid),
    }
    match &existing_group {
        Some(name) => log::info!("GID {} already belongs to '{}'", config.desired.gid, name),
        None => log::info!("GID {} is unclaimed", config.desired.gid),
    }

    Ok(ReconcilePlan::resolve(config, existing_user, existing_group))
}
