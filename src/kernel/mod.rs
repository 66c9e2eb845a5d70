//! Thin wrappers around kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: ownership -> credentials (chown needs root, so it runs first)

pub mod credentials;
pub mod ownership;
