//! Testing infrastructure
//!
//! In-memory stand-ins for the account database and the chown step, so the
//! reconciliation and hand-off ordering can be exercised without root.

use crate::accounts::AccountDatabase;
use crate::config::types::{EntrypointError, Result};
use crate::kernel::ownership::{OwnershipFixer, OwnershipReport};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A successful account database mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    CreateGroup(String, u32),
    CreateUser(String, u32, String),
    AddMember(String, String),
}

#[derive(Clone, Debug)]
struct FakeUser {
    name: String,
    uid: u32,
    primary_gid: u32,
}

#[derive(Clone, Debug)]
struct FakeGroup {
    name: String,
    gid: u32,
    members: BTreeSet<String>,
}

/// In-memory passwd/group database
#[derive(Clone, Debug, Default)]
pub struct FakeAccounts {
    users: Vec<FakeUser>,
    groups: Vec<FakeGroup>,
    mutations: Vec<Mutation>,
    fail_lookups: bool,
    fail_creation: bool,
    fail_membership: bool,
    drop_creations: bool,
}

impl FakeAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// root and nobody, as in a minimal Alpine image.
    pub fn alpine_base() -> Self {
        let mut accounts = Self::new();
        accounts.insert_group("root", 0);
        accounts.insert_user("root", 0, 0);
        accounts.insert_group("nogroup", 65533);
        accounts.insert_user("nobody", 65534, 65533);
        accounts
    }

    pub fn insert_user(&mut self, name: &str, uid: u32, primary_gid: u32) {
        self.users.push(FakeUser {
            name: name.to_string(),
            uid,
            primary_gid,
        });
    }

    pub fn insert_group(&mut self, name: &str, gid: u32) {
        self.groups.push(FakeGroup {
            name: name.to_string(),
            gid,
            members: BTreeSet::new(),
        });
    }

    /// Every lookup fails like an unusable getent.
    pub fn fail_lookups(&mut self) {
        self.fail_lookups = true;
    }

    /// Group and user creation fail with a tool error.
    pub fn fail_creation(&mut self) {
        self.fail_creation = true;
    }

    /// Membership adds fail with a tool error.
    pub fn fail_membership(&mut self) {
        self.fail_membership = true;
    }

    /// Creation reports success but changes nothing.
    pub fn drop_creations(&mut self) {
        self.drop_creations = true;
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.clone()
    }

    /// Primary or secondary membership.
    pub fn is_member(&self, user: &str, group: &str) -> bool {
        let Some(group) = self.groups.iter().find(|g| g.name == group) else {
            return false;
        };
        group.members.contains(user)
            || self
                .users
                .iter()
                .any(|u| u.name == user && u.primary_gid == group.gid)
    }

    pub fn users_with_uid(&self, uid: u32) -> usize {
        self.users.iter().filter(|u| u.uid == uid).count()
    }

    pub fn groups_with_gid(&self, gid: u32) -> usize {
        self.groups.iter().filter(|g| g.gid == gid).count()
    }

    fn check_lookup(&self) -> Result<()> {
        if self.fail_lookups {
            return Err(EntrypointError::Lookup("getent unavailable".to_string()));
        }
        Ok(())
    }

    fn tool_failure(command: &str) -> EntrypointError {
        EntrypointError::CommandFailed {
            command: command.to_string(),
            code: Some(1),
            stderr: "simulated failure".to_string(),
        }
    }
}

impl AccountDatabase for FakeAccounts {
    fn user_by_uid(&self, uid: u32) -> Result<Option<String>> {
        self.check_lookup()?;
        Ok(self.users.iter().find(|u| u.uid == uid).map(|u| u.name.clone()))
    }

    fn group_by_gid(&self, gid: u32) -> Result<Option<String>> {
        self.check_lookup()?;
        Ok(self.groups.iter().find(|g| g.gid == gid).map(|g| g.name.clone()))
    }

    fn uid_of_user(&self, name: &str) -> Result<Option<u32>> {
        self.check_lookup()?;
        Ok(self.users.iter().find(|u| u.name == name).map(|u| u.uid))
    }

    fn gid_of_group(&self, name: &str) -> Result<Option<u32>> {
        self.check_lookup()?;
        Ok(self.groups.iter().find(|g| g.name == name).map(|g| g.gid))
    }

    fn create_group(&mut self, name: &str, gid: u32) -> Result<()> {
        if self.fail_creation {
            return Err(Self::tool_failure("addgroup"));
        }
        if self.groups.iter().any(|g| g.name == name || g.gid == gid) {
            return Err(Self::tool_failure("addgroup"));
        }
        if !self.drop_creations {
            self.insert_group(name, gid);
        }
        self.mutations.push(Mutation::CreateGroup(name.to_string(), gid));
        Ok(())
    }

    fn create_user(&mut self, name: &str, uid: u32, group: &str) -> Result<()> {
        if self.fail_creation {
            return Err(Self::tool_failure("adduser"));
        }
        if self.users.iter().any(|u| u.name == name || u.uid == uid) {
            return Err(Self::tool_failure("adduser"));
        }
        if !self.drop_creations {
            let gid = self
                .groups
                .iter()
                .find(|g| g.name == group)
                .map(|g| g.gid)
                .ok_or_else(|| Self::tool_failure("adduser"))?;
            self.insert_user(name, uid, gid);
        }
        self.mutations
            .push(Mutation::CreateUser(name.to_string(), uid, group.to_string()));
        Ok(())
    }

    fn add_user_to_group(&mut self, user: &str, group: &str) -> Result<()> {
        if self.fail_membership {
            return Err(Self::tool_failure("addgroup"));
        }
        let group_entry = self
            .groups
            .iter_mut()
            .find(|g| g.name == group)
            .ok_or_else(|| Self::tool_failure("addgroup"))?;
        group_entry.members.insert(user.to_string());
        self.mutations
            .push(Mutation::AddMember(user.to_string(), group.to_string()));
        Ok(())
    }
}

/// Records chown requests and keeps a virtual owner per path
#[derive(Debug, Default)]
pub struct RecordingOwnership {
    calls: RefCell<Vec<(PathBuf, u32, u32)>>,
    owners: RefCell<BTreeMap<PathBuf, (u32, u32)>>,
    fail_on: Option<PathBuf>,
}

impl RecordingOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the chown of `path` with EPERM.
    pub fn failing_on(path: impl Into<PathBuf>) -> Self {
        Self {
            fail_on: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, u32, u32)> {
        self.calls.borrow().clone()
    }
}

impl OwnershipFixer for RecordingOwnership {
    fn chown_recursive(&self, path: &Path, uid: u32, gid: u32) -> Result<OwnershipReport> {
        if self.fail_on.as_deref() == Some(path) {
            return Err(EntrypointError::Ownership {
                path: path.to_path_buf(),
                source: std::io::Error::from_raw_os_error(libc::EPERM),
            });
        }
        self.calls.borrow_mut().push((path.to_path_buf(), uid, gid));
        let previous = self
            .owners
            .borrow_mut()
            .insert(path.to_path_buf(), (uid, gid));
        Ok(OwnershipReport {
            entries: 1,
            changed: u64::from(previous != Some((uid, gid))),
        })
    }

    fn mismatched(&self, path: &Path, uid: u32, gid: u32) -> Result<Vec<PathBuf>> {
        match self.owners.borrow().get(path) {
            Some(&(u, g)) if u == uid && g == gid => Ok(Vec::new()),
            _ => Ok(vec![path.to_path_buf()]),
        }
    }
}
