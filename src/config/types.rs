//! Core types for the entrypoint: desired identity, resolved target, config and errors
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// uid used when `PUID` is unset or empty
pub const DEFAULT_UID: u32 = 1000;
/// gid used when `PGID` is unset or empty
pub const DEFAULT_GID: u32 = 1000;

/// Account name used when no account owns the desired uid
pub const FALLBACK_USER: &str = "wizarruser";
/// Group name used when no group owns the desired gid
pub const FALLBACK_GROUP: &str = "wizarrgroup";

/// Paths whose ownership must follow the resolved identity in the reference image:
/// the database volume, the cache directory and the default wizard steps.
pub const DEFAULT_OWNERSHIP_SET: [&str; 3] = [
    "/data/database",
    "/.cache",
    "/etc/wizarr/wizard_steps",
];

/// Numeric identity requested through `PUID`/`PGID`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DesiredIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl DesiredIdentity {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// True when the workload would keep uid 0. A gid of 0 alone still drops.
    pub fn targets_root(&self) -> bool {
        self.uid == 0
    }
}

impl Default for DesiredIdentity {
    fn default() -> Self {
        Self {
            uid: DEFAULT_UID,
            gid: DEFAULT_GID,
        }
    }
}

/// Account and group the workload ends up running as
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TargetIdentity {
    pub user: String,
    pub uid: u32,
    pub group: String,
    pub gid: u32,
}

impl TargetIdentity {
    /// `user:group` form used by chown-style tooling and log lines.
    pub fn owner_spec(&self) -> String {
        format!("{}:{}", self.user, self.group)
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}):{}({})",
            self.user, self.uid, self.group, self.gid
        )
    }
}

/// Entrypoint configuration, read once at process start
#[derive(Clone, Debug)]
pub struct EntrypointConfig {
    /// uid/gid the workload must run as
    pub desired: DesiredIdentity,
    /// Name for a newly created user
    pub fallback_user: String,
    /// Name for a newly created group
    pub fallback_group: String,
    /// Paths chowned recursively before the privilege drop
    pub ownership_set: Vec<PathBuf>,
    /// Strict mode: reject `PUID=0` instead of running the workload as root in place
    pub strict_mode: bool,
}

impl Default for EntrypointConfig {
    fn default() -> Self {
        Self {
            desired: DesiredIdentity::default(),
            fallback_user: FALLBACK_USER.to_string(),
            fallback_group: FALLBACK_GROUP.to_string(),
            ownership_set: DEFAULT_OWNERSHIP_SET.iter().map(PathBuf::from).collect(),
            strict_mode: false,
        }
    }
}

/// Custom error types for the entrypoint
#[derive(Error, Debug)]
pub enum EntrypointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Account lookup error: {0}")]
    Lookup(String),

    #[error("Account database error: {0}")]
    Account(String),

    #[error("{command} failed (exit {}): {stderr}", describe_exit(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to change ownership of {path}: {source}")]
    Ownership {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("Exec error: {0}")]
    Exec(String),
}

impl EntrypointError {
    /// Process exit status for this failure.
    ///
    /// A failing account tool hands its own status through; configuration
    /// problems use 2 like a usage error; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Result type alias for entrypoint operations
pub type Result<T> = std::result::Result<T, EntrypointError>;
