use crate::accounts::{AccountDatabase, SystemAccounts};
use crate::config::env::{load_config_with, process_env, ConfigOverrides};
use crate::config::types::EntrypointConfig;
use crate::exec::handoff::Handoff;
use crate::exec::workload::run_workload;
use crate::kernel::credentials::is_privileged;
use crate::kernel::ownership::{OwnershipFixer, RecursiveChown};
use crate::reconcile;
use anyhow::{Context, Result};
use clap::Parser;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Name for the user created when no account owns PUID
    #[arg(long, env = "WIZARR_USER", value_name = "NAME")]
    user_name: Option<String>,
    /// Name for the group created when no group owns PGID
    #[arg(long, env = "WIZARR_GROUP", value_name = "NAME")]
    group_name: Option<String>,
    /// Path to chown recursively before dropping privileges (repeatable; replaces the default set)
    #[arg(
        long = "chown",
        value_name = "PATH",
        env = "WIZARR_CHOWN_PATHS",
        value_delimiter = ':'
    )]
    chown_paths: Vec<PathBuf>,
    /// Reject PUID=0 instead of running the workload as root
    #[arg(long)]
    deny_root: bool,
    /// Print the reconciliation plan as JSON and exit without changing anything
    #[arg(long)]
    plan: bool,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Workload command and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<OsString>,
}

/// Which branch of the entrypoint runs
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Lookups only, print the plan
    Plan,
    /// Root: reconcile, chown, drop, re-exec
    Privileged,
    /// Already dropped (or started unprivileged): run the workload
    Workload,
}

impl Phase {
    pub fn select(privileged: bool, plan_only: bool) -> Self {
        if plan_only {
            Phase::Plan
        } else if privileged {
            Phase::Privileged
        } else {
            Phase::Workload
        }
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            writeln!(buf, "[entrypoint] {:<5} {}", record.level(), record.args())
        })
        .init();
}

fn print_plan(config: &EntrypointConfig, accounts: &dyn AccountDatabase) -> Result<()> {
    let plan = reconcile::plan(config, accounts).context("looking up PUID/PGID")?;
    let json = serde_json::to_string_pretty(&plan)?;
    println!("{}", json);
    Ok(())
}

fn run_privileged(
    config: EntrypointConfig,
    command: &[OsString],
    accounts: &mut dyn AccountDatabase,
    fixer: &dyn OwnershipFixer,
) -> Result<()> {
    let handoff = Handoff::reconcile(config, accounts)
        .context("reconciling PUID/PGID with the account database")?
        .apply_ownership(fixer)
        .context("fixing ownership of the data directories")?;

    if handoff.targets_root() {
        return handoff.run_as_root(command).context("running workload");
    }

    // Forward argv untouched; the re-exec parses the same options again.
    let argv: Vec<OsString> = std::env::args_os().collect();
    match handoff
        .drop_credentials()
        .context("dropping privileges")?
        .reexec(&argv)
        .context("re-executing as the target identity")?
    {}
}

/// Load the config through `env` and run `phase` against the given account
/// database and chown implementation.
///
/// The config is parsed on every branch: malformed PUID/PGID abort before
/// `accounts` or `fixer` are touched.
pub fn execute<F>(
    env: F,
    overrides: ConfigOverrides,
    phase: Phase,
    command: &[OsString],
    accounts: &mut dyn AccountDatabase,
    fixer: &dyn OwnershipFixer,
) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let config = load_config_with(env, overrides).context("loading configuration")?;

    match phase {
        Phase::Plan => print_plan(&config, accounts),
        Phase::Privileged => run_privileged(config, command, accounts, fixer),
        Phase::Workload => run_workload(command).context("running workload"),
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    log::info!("Starting wizarr-entrypoint {}", env!("CARGO_PKG_VERSION"));

    let overrides = ConfigOverrides {
        user_name: cli.user_name,
        group_name: cli.group_name,
        ownership_set: cli.chown_paths,
        deny_root: cli.deny_root,
    };
    let phase = Phase::select(is_privileged(), cli.plan);

    execute(
        process_env,
        overrides,
        phase,
        &cli.command,
        &mut SystemAccounts::detect(),
        &RecursiveChown,
    )
}

/// Exit status for an error returned by [`run`].
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<crate::config::types::EntrypointError>()
        .map(|e| e.exit_code())
        .unwrap_or(1)
}
