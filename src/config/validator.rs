// Config validation
// Validate once at startup and fail fast, before the account database is touched

use crate::config::types::{EntrypointConfig, EntrypointError, Result};
use std::collections::HashSet;

/// Longest account or group name the shadow and BusyBox tools accept
const MAX_NAME_LEN: usize = 32;

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate config at startup. Any error is fatal.
pub fn validate_config(config: &EntrypointConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_names(config, &mut result);
    validate_ownership_set(config, &mut result);
    validate_target(config, &mut result);

    if !result.is_valid() {
        return Err(EntrypointError::Config(result.errors.join("; ")));
    }

    Ok(result)
}

/// Account names: lowercase letter or underscore first, then `[a-z0-9_-]`.
pub fn validate_account_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("name too long (max {})", MAX_NAME_LEN));
    }
    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        if !(first.is_ascii_lowercase() || first == '_') {
            return Err("name must start with a lowercase letter or '_'".to_string());
        }
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err("name contains invalid characters".to_string());
    }
    Ok(())
}

fn validate_names(config: &EntrypointConfig, result: &mut ValidationResult) {
    if let Err(e) = validate_account_name(&config.fallback_user) {
        result.add_error(format!("user name {:?}: {}", config.fallback_user, e));
    }
    if let Err(e) = validate_account_name(&config.fallback_group) {
        result.add_error(format!("group name {:?}: {}", config.fallback_group, e));
    }
}

fn validate_ownership_set(config: &EntrypointConfig, result: &mut ValidationResult) {
    if config.ownership_set.is_empty() {
        result.add_warning("ownership set is empty; no paths will be chowned".to_string());
    }

    let mut seen = HashSet::new();
    for path in &config.ownership_set {
        if !path.is_absolute() {
            result.add_error(format!("ownership path must be absolute: {:?}", path));
        }
        if !seen.insert(path) {
            result.add_warning(format!("ownership path listed twice: {:?}", path));
        }
    }
}

fn validate_target(config: &EntrypointConfig, result: &mut ValidationResult) {
    if !config.desired.targets_root() {
        return;
    }

    let msg = format!(
        "PUID={} keeps the workload running as root",
        config.desired.uid
    );
    if config.strict_mode {
        result.add_error(format!("{} (rejected by --deny-root)", msg));
    } else {
        result.add_warning(format!("{}; privileges will not be dropped", msg));
    }
}
