//! Environment-driven configuration loading.
//!
//! `PUID`/`PGID` are read here instead of through clap so that an empty value
//! falls back to the default and a malformed one fails before anything else runs.

use crate::config::types::{
    DesiredIdentity, EntrypointConfig, EntrypointError, Result, DEFAULT_GID, DEFAULT_UID,
};
use crate::config::validator::validate_config;
use std::path::PathBuf;

pub const PUID_VAR: &str = "PUID";
pub const PGID_VAR: &str = "PGID";

/// Values supplied on the command line (or their clap `env` fallbacks).
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub user_name: Option<String>,
    pub group_name: Option<String>,
    pub ownership_set: Vec<PathBuf>,
    pub deny_root: bool,
}

/// Parse one numeric id variable.
///
/// Unset or empty means `default`. Anything other than plain ASCII digits is a
/// configuration error; so is `u32::MAX`, which setresuid/setresgid read as
/// "leave unchanged".
pub fn parse_id(var: &str, raw: Option<&str>, default: u32) -> Result<u32> {
    let raw = match raw {
        None => return Ok(default),
        Some(raw) if raw.is_empty() => return Ok(default),
        Some(raw) => raw,
    };

    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EntrypointError::Config(format!(
            "{}={:?} is not a non-negative integer",
            var, raw
        )));
    }

    let id: u32 = raw.parse().map_err(|_| {
        EntrypointError::Config(format!("{}={} is out of range for an id", var, raw))
    })?;

    if id == u32::MAX {
        return Err(EntrypointError::Config(format!(
            "{}={} is reserved and cannot be used as an id",
            var, id
        )));
    }

    Ok(id)
}

/// Read the desired identity through `lookup` (normally the process environment).
pub fn desired_identity_from<F>(lookup: F) -> Result<DesiredIdentity>
where
    F: Fn(&str) -> Option<String>,
{
    let uid = parse_id(PUID_VAR, lookup(PUID_VAR).as_deref(), DEFAULT_UID)?;
    let gid = parse_id(PGID_VAR, lookup(PGID_VAR).as_deref(), DEFAULT_GID)?;
    Ok(DesiredIdentity::new(uid, gid))
}

/// Lookup backed by the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
}

/// Build and validate the full config from `lookup` plus command-line overrides.
pub fn load_config_with<F>(lookup: F, overrides: ConfigOverrides) -> Result<EntrypointConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = EntrypointConfig {
        desired: desired_identity_from(lookup)?,
        strict_mode: overrides.deny_root,
        ..EntrypointConfig::default()
    };

    if let Some(user) = overrides.user_name {
        config.fallback_user = user;
    }
    if let Some(group) = overrides.group_name {
        config.fallback_group = group;
    }

    let paths: Vec<PathBuf> = overrides
        .ownership_set
        .into_iter()
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    if !paths.is_empty() {
        config.ownership_set = paths;
    }

    let report = validate_config(&config)?;
    for warning in &report.warnings {
        log::warn!("{}", warning);
    }

    Ok(config)
}
