//! Utilities
//!
//! Environment hygiene for privileged tooling and the re-exec hand-off.

pub mod env_hygiene;
