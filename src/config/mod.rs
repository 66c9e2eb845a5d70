//! Configuration
//!
//! Desired identity, ownership set, validation and the shared error type.

pub mod env;
pub mod types;
pub mod validator;
