//! wizarr-entrypoint: container entrypoint that runs the workload as `PUID:PGID`
//!
//! Started as root, it makes sure an account and a group exist for the
//! requested ids, hands the data volumes to them, drops privileges and
//! re-executes itself. The re-executed process finds itself unprivileged and
//! replaces itself with the workload command.
//!
//! # Architecture
//!
//! ## Configuration ([`config`])
//! - [`config::env`]: `PUID`/`PGID` parsing and command-line overrides
//! - [`config::validator`]: Fail-fast startup validation
//! - [`config::types`]: Shared types and the error enum
//!
//! ## Account Database ([`accounts`])
//! - [`accounts::AccountDatabase`]: Lookup/mutation seam
//! - [`accounts::system`]: `getent` plus shadow-utils or BusyBox tooling
//!
//! ## Reconciliation ([`reconcile`])
//! - [`reconcile::plan`]: Pure planning from the two id lookups
//! - [`reconcile::apply_plan`]: Creation, best-effort membership, verification
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::ownership`]: Recursive chown of the ownership set
//! - [`kernel::credentials`]: initgroups, setresgid, setresuid, verification
//!
//! ## Execution Control ([`exec`])
//! - [`exec::handoff`]: Type-state ordered reconcile -> chown -> drop -> re-exec
//! - [`exec::workload`]: Workload exec on the unprivileged branch
//!
//! ## Utilities ([`utils`])
//! - [`utils::env_hygiene`]: Pinned PATH for tooling, re-exec environment
//!
//! ## Testing Infrastructure ([`testing`])
//! - In-memory account database and recording chown

pub mod accounts;
pub mod cli;
pub mod config;
pub mod exec;
pub mod kernel;
pub mod reconcile;
pub mod testing;
pub mod utils;

pub use config::types::*;
