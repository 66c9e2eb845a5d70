//! Execution control
//!
//! Type-state ordered privileged hand-off and the unprivileged workload exec.

pub mod handoff;
pub mod workload;
