//! Account database access
//!
//! The reconciler only ever talks to the account database through
//! [`AccountDatabase`]. [`system::SystemAccounts`] drives the container's real
//! tooling; `crate::testing::FakeAccounts` is the in-memory stand-in.

pub mod system;

use crate::config::types::Result;

pub use system::{AccountTooling, SystemAccounts};

/// Lookup and mutation of user/group records.
pub trait AccountDatabase {
    /// Name of the account owning `uid`, if any.
    fn user_by_uid(&self, uid: u32) -> Result<Option<String>>;

    /// Name of the group owning `gid`, if any.
    fn group_by_gid(&self, gid: u32) -> Result<Option<String>>;

    /// uid bound to the account `name`, if it exists.
    fn uid_of_user(&self, name: &str) -> Result<Option<u32>>;

    /// gid bound to the group `name`, if it exists.
    fn gid_of_group(&self, name: &str) -> Result<Option<u32>>;

    /// Create a system group with a fixed gid.
    fn create_group(&mut self, name: &str, gid: u32) -> Result<()>;

    /// Create a system, non-login user with a fixed uid and primary group.
    fn create_user(&mut self, name: &str, uid: u32, group: &str) -> Result<()>;

    /// Add an existing user to `group` as a secondary member.
    fn add_user_to_group(&mut self, user: &str, group: &str) -> Result<()>;
}
