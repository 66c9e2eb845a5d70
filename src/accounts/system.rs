//! Account database backed by the container's own tooling.
//!
//! Lookups go through `getent`, mutations through either shadow-utils
//! (`groupadd`/`useradd`/`usermod`) or BusyBox (`addgroup`/`adduser`), picked
//! once by what exists on the pinned PATH.

use super::AccountDatabase;
use crate::config::types::{EntrypointError, Result};
use crate::utils::env_hygiene::{find_in_path, SAFE_PATH};
use std::process::{Command, Output};

const GETENT: &str = "getent";

/// getent's "key not found" status
const GETENT_NOT_FOUND: i32 = 2;

/// Which family of account tools the image ships
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountTooling {
    /// groupadd / useradd / usermod
    Shadow,
    /// addgroup / adduser (Alpine, BusyBox)
    Busybox,
}

impl AccountTooling {
    /// Prefer shadow-utils when `useradd` is present, BusyBox otherwise.
    pub fn detect() -> Self {
        if find_in_path("useradd", SAFE_PATH).is_some() {
            AccountTooling::Shadow
        } else {
            AccountTooling::Busybox
        }
    }

    pub fn create_group_command(self, name: &str, gid: u32) -> (&'static str, Vec<String>) {
        let gid = gid.to_string();
        match self {
            Self::Shadow => (
                "groupadd",
                vec!["--system".into(), "--gid".into(), gid, name.into()],
            ),
            Self::Busybox => ("addgroup", vec!["-S".into(), "-g".into(), gid, name.into()]),
        }
    }

    pub fn create_user_command(
        self,
        name: &str,
        uid: u32,
        group: &str,
    ) -> (&'static str, Vec<String>) {
        let uid = uid.to_string();
        match self {
            Self::Shadow => (
                "useradd",
                vec![
                    "--system".into(),
                    "--no-create-home".into(),
                    "--shell".into(),
                    "/sbin/nologin".into(),
                    "--uid".into(),
                    uid,
                    "--gid".into(),
                    group.into(),
                    name.into(),
                ],
            ),
            Self::Busybox => (
                "adduser",
                vec![
                    "-S".into(),
                    "-D".into(),
                    "-H".into(),
                    "-G".into(),
                    group.into(),
                    "-u".into(),
                    uid,
                    name.into(),
                ],
            ),
        }
    }

    pub fn add_membership_command(self, user: &str, group: &str) -> (&'static str, Vec<String>) {
        match self {
            Self::Shadow => (
                "usermod",
                vec!["-a".into(), "-G".into(), group.into(), user.into()],
            ),
            Self::Busybox => ("addgroup", vec![user.into(), group.into()]),
        }
    }
}

/// Name and numeric id from the first line of a passwd/group entry.
pub fn parse_entry(stdout: &str) -> Option<(String, u32)> {
    let line = stdout.lines().next()?;
    let mut fields = line.split(':');
    let name = fields.next().filter(|n| !n.is_empty())?;
    let id = fields.nth(1)?.trim().parse().ok()?;
    Some((name.to_string(), id))
}

/// Map a finished `getent` run to found / not found / failure.
pub fn interpret_lookup(
    database: &str,
    key: &str,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<Option<(String, u32)>> {
    match code {
        Some(0) => parse_entry(stdout).map(Some).ok_or_else(|| {
            EntrypointError::Lookup(format!(
                "getent {} {}: unparseable entry {:?}",
                database,
                key,
                stdout.trim()
            ))
        }),
        Some(GETENT_NOT_FOUND) => Ok(None),
        _ => Err(EntrypointError::Lookup(format!(
            "getent {} {} failed (exit {}): {}",
            database,
            key,
            code.map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            stderr.trim()
        ))),
    }
}

/// The container's real account database
pub struct SystemAccounts {
    tooling: AccountTooling,
    getent: String,
}

impl SystemAccounts {
    pub fn new(tooling: AccountTooling) -> Self {
        Self {
            tooling,
            getent: GETENT.to_string(),
        }
    }

    /// Detect the tooling flavour from the pinned PATH.
    pub fn detect() -> Self {
        let tooling = AccountTooling::detect();
        log::debug!("Using {:?} account tooling", tooling);
        Self::new(tooling)
    }

    /// Use a different lookup binary (tests, unusual images).
    pub fn with_getent(mut self, getent: impl Into<String>) -> Self {
        self.getent = getent.into();
        self
    }

    fn spawn(program: &str, args: &[String]) -> Result<Output> {
        Command::new(program)
            .args(args)
            .env("PATH", SAFE_PATH)
            .output()
            .map_err(|e| {
                EntrypointError::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to execute {}: {}", program, e),
                ))
            })
    }

    fn lookup(&self, database: &str, key: &str) -> Result<Option<(String, u32)>> {
        let args = [database.to_string(), key.to_string()];
        let output = Self::spawn(&self.getent, &args).map_err(|e| {
            EntrypointError::Lookup(format!("getent {} {}: {}", database, key, e))
        })?;
        interpret_lookup(
            database,
            key,
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    fn run_tool(&self, (program, args): (&'static str, Vec<String>)) -> Result<()> {
        log::debug!("Running {} {}", program, args.join(" "));
        let output = Self::spawn(program, &args)?;
        if !output.status.success() {
            return Err(EntrypointError::CommandFailed {
                command: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl AccountDatabase for SystemAccounts {
    fn user_by_uid(&self, uid: u32) -> Result<Option<String>> {
        Ok(self.lookup("passwd", &uid.to_string())?.map(|(name, _)| name))
    }

    fn group_by_gid(&self, gid: u32) -> Result<Option<String>> {
        Ok(self.lookup("group", &gid.to_string())?.map(|(name, _)| name))
    }

    fn uid_of_user(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.lookup("passwd", name)?.map(|(_, uid)| uid))
    }

    fn gid_of_group(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.lookup("group", name)?.map(|(_, gid)| gid))
    }

    fn create_group(&mut self, name: &str, gid: u32) -> Result<()> {
        self.run_tool(self.tooling.create_group_command(name, gid))
    }

    fn create_user(&mut self, name: &str, uid: u32, group: &str) -> Result<()> {
        self.run_tool(self.tooling.create_user_command(name, uid, group))
    }

    fn add_user_to_group(&mut self, user: &str, group: &str) -> Result<()> {
        self.run_tool(self.tooling.add_membership_command(user, group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_passwd_and_group_entries() {
        assert_eq!(
            parse_entry("wizarruser:x:2000:2000::/home/wizarruser:/sbin/nologin\n"),
            Some(("wizarruser".to_string(), 2000))
        );
        assert_eq!(
            parse_entry("wizarrgroup:x:2000:wizarruser,media\n"),
            Some(("wizarrgroup".to_string(), 2000))
        );
        assert_eq!(parse_entry(""), None);
        assert_eq!(parse_entry(":x:1:"), None);
        assert_eq!(parse_entry("broken"), None);
    }

    #[test]
    fn getent_not_found_is_not_an_error() {
        let found = interpret_lookup("passwd", "2000", Some(2), "", "").unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn getent_hit_is_parsed() {
        let found =
            interpret_lookup("group", "100", Some(0), "users:x:100:\n", "").unwrap();
        assert_eq!(found, Some(("users".to_string(), 100)));
    }

    #[test]
    fn other_getent_failures_are_fatal() {
        for code in [Some(1), Some(3), Some(127), None] {
            let err = interpret_lookup("passwd", "1000", code, "", "boom").unwrap_err();
            assert!(matches!(err, EntrypointError::Lookup(_)));
        }
        let err = interpret_lookup("passwd", "1000", Some(0), "garbage", "").unwrap_err();
        assert!(matches!(err, EntrypointError::Lookup(_)));
    }

    #[test]
    fn missing_getent_binary_is_a_lookup_error() {
        let accounts =
            SystemAccounts::new(AccountTooling::Busybox).with_getent("/nonexistent/getent");
        let err = accounts.user_by_uid(1000).unwrap_err();
        assert!(matches!(err, EntrypointError::Lookup(_)));
    }

    #[test]
    fn busybox_commands_match_alpine_flags() {
        let tooling = AccountTooling::Busybox;
        assert_eq!(
            tooling.create_group_command("wizarrgroup", 2000),
            ("addgroup", vec!["-S".to_string(), "-g".into(), "2000".into(), "wizarrgroup".into()])
        );
        let (program, args) = tooling.create_user_command("wizarruser", 2000, "wizarrgroup");
        assert_eq!(program, "adduser");
        assert_eq!(
            args,
            vec!["-S", "-D", "-H", "-G", "wizarrgroup", "-u", "2000", "wizarruser"]
        );
        assert_eq!(
            tooling.add_membership_command("media", "wizarrgroup"),
            ("addgroup", vec!["media".to_string(), "wizarrgroup".into()])
        );
    }

    #[test]
    fn shadow_commands_use_long_flags() {
        let tooling = AccountTooling::Shadow;
        let (program, args) = tooling.create_group_command("wizarrgroup", 2000);
        assert_eq!(program, "groupadd");
        assert_eq!(args, vec!["--system", "--gid", "2000", "wizarrgroup"]);

        let (program, args) = tooling.create_user_command("wizarruser", 2000, "wizarrgroup");
        assert_eq!(program, "useradd");
        assert!(args.windows(2).any(|w| w == ["--uid", "2000"]));
        assert!(args.windows(2).any(|w| w == ["--gid", "wizarrgroup"]));
        assert_eq!(args.last().map(String::as_str), Some("wizarruser"));

        assert_eq!(
            tooling.add_membership_command("media", "wizarrgroup"),
            ("usermod", vec!["-a".to_string(), "-G".into(), "wizarrgroup".into(), "media".into()])
        );
    }
}
