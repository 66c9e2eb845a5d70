//! UID/GID transitions for privilege dropping.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid.

mod transition;
mod validation;

pub use transition::transition_to_target;
pub use validation::{validate_ids, validate_target};

/// Whether the process runs with the root-equivalent effective uid.
pub fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}
