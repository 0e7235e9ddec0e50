#![warn(clippy::pedantic)]

//! # bootstrap
//!
//! Self-updating bootstrap launcher. Resolves the configured branch to an
//! immutable version (a commit, or a release tag as-is), makes sure the
//! matching launcher build is extracted under
//! `<home>/launcher/versions/<version>/`, and runs it with every argument
//! this process received.
//!
//! Launcher options all start with `--launcher-` and must come before the
//! forwarded arguments; everything from the first other argument on,
//! including `--help` and `--version`, belongs to the downstream launcher.
//!
//! ```bash
//! bootstrap status
//! BRANCH=21.06.03 bootstrap version
//! bootstrap --launcher-branch feature/x --launcher-debug setup --nodes 3
//! ```

mod config;
mod errors;
mod launch;
mod release;

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use config::{Settings, Verbosity, parse_debug_flag};
use errors::LauncherError;

/// Legacy switch for verbose output.
const DEBUG_ENV: &str = "DEBUG";

/// Self-updating bootstrap launcher.
#[derive(Parser, Debug)]
#[command(
    name = "bootstrap",
    about = "Runs the launcher build of a branch, downloading it first if needed",
    disable_help_flag = true,
    disable_version_flag = true,
    after_help = "\
ENVIRONMENT VARIABLES:
    BRANCH              Branch or release tag to run (default: master)
    NETWORK             Network to run (default: mainnet)
    BOOTSTRAP_HOME      Home directory (default: per-OS application directory)
    BOOTSTRAP_TIMEOUT   API request timeout in seconds (default: 30)
    DEBUG               Verbose output when true, on or 1
    RUST_LOG            Overrides the log filter"
)]
struct Cli {
    /// Branch or release tag to run.
    #[arg(long = "launcher-branch", env = "BRANCH", default_value = "master")]
    branch: String,

    /// Network to run.
    #[arg(long = "launcher-network", env = "NETWORK", default_value = "mainnet")]
    network: String,

    /// Home directory holding the cache, config file and network folders.
    #[arg(long = "launcher-home", env = "BOOTSTRAP_HOME")]
    home: Option<PathBuf>,

    /// Print progress and full error chains.
    #[arg(long = "launcher-debug", action = ArgAction::SetTrue)]
    debug: bool,

    /// API request timeout in seconds; downloads get ten times as long.
    #[arg(long = "launcher-timeout", env = "BOOTSTRAP_TIMEOUT")]
    timeout: Option<u64>,

    /// Print this help.
    #[arg(long = "launcher-help", action = ArgAction::Help)]
    help: Option<bool>,

    /// Arguments forwarded to the downstream launcher.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<OsString>,
}

impl Cli {
    fn settings(&self, debug_env: Option<&str>) -> Settings {
        let verbose = self.debug || debug_env.is_some_and(parse_debug_flag);
        Settings {
            branch: self.branch.clone(),
            network: self.network.clone(),
            home: self.home.clone(),
            verbosity: if verbose {
                Verbosity::Verbose
            } else {
                Verbosity::Quiet
            },
            timeout_secs: self.timeout,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let debug_env = std::env::var(DEBUG_ENV).ok();
    let settings = cli.settings(debug_env.as_deref());

    init_tracing(settings.verbosity);

    if let Err(e) = launch::run(&settings, &cli.args).await {
        let exit_code = handle_error(&e, settings.verbosity);
        std::process::exit(exit_code);
    }
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Handles an error and returns the appropriate exit code.
///
/// For `ProcessExitCode` errors, returns the embedded exit code without
/// printing anything (the downstream launcher already reported). Other errors
/// are printed on one line, or with the full cause chain when verbose, and
/// exit with 1.
fn handle_error(e: &anyhow::Error, verbosity: Verbosity) -> i32 {
    if let Some(LauncherError::ProcessExitCode { code }) = errors::classify(e) {
        return *code;
    }
    if verbosity.is_verbose() {
        eprintln!("Error: {e:?}");
    } else {
        eprintln!("Error: {e:#}");
    }
    1
}
