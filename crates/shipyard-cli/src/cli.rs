use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "shipyard",
    about = "Deployment worker: merges, branch creation, and hard migrations",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Values that take precedence over the configuration file.
#[derive(Args, Default)]
pub struct Overrides {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Instance number of this worker process.
    #[arg(long, global = true)]
    pub instance: Option<u32>,

    /// Comma-separated branches this worker may merge into.
    #[arg(long, global = true)]
    pub allowed_branches: Option<String>,

    /// Comma-separated branches this worker must not merge into.
    #[arg(long, global = true)]
    pub disallowed_branches: Option<String>,

    /// Skip pushes.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Resolve migration scripts from the local source checkout.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Name of the migration worker.
    #[arg(long, global = true)]
    pub worker_name: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Consume tasks as JSON lines from stdin until end of input
    Worker(WorkerArgs),
    /// Merge one branch into another across all tracked repositories
    Merge(MergeArgs),
    /// Create a branch on every tracked repository
    CreateBranch(CreateBranchArgs),
    /// Run one hard migration
    Migrate(MigrateArgs),
    /// Check branches against the allow and deny lists
    CheckBranch(CheckBranchArgs),
    /// Render a merge transcript as a conflict report
    ParseMergeOutput(ParseMergeOutputArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum RoleArg {
    Merge,
    Migration,
}

#[derive(Args)]
pub struct WorkerArgs {
    #[arg(long, value_enum)]
    pub role: RoleArg,
}

#[derive(Args)]
pub struct MergeArgs {
    #[arg(long)]
    pub source: String,
    #[arg(long)]
    pub target: String,
    #[arg(long, default_value = "manual")]
    pub feature_id: String,
    #[arg(long = "type", default_value = "")]
    pub merge_type: String,
}

#[derive(Args)]
pub struct CreateBranchArgs {
    #[arg(long)]
    pub source: String,
    #[arg(long)]
    pub branch: String,
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct MigrateArgs {
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub version: String,
    #[arg(long)]
    pub migration: String,
}

#[derive(Args)]
pub struct CheckBranchArgs {
    #[arg(required = true)]
    pub branches: Vec<String>,
}

#[derive(Args)]
pub struct ParseMergeOutputArgs {
    /// Transcript file; stdin when omitted.
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_worker_with_overrides() {
        let cli = Cli::parse_from([
            "shipyard",
            "worker",
            "--role",
            "merge",
            "--instance",
            "2",
            "--allowed-branches",
            "master,develop",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.overrides.instance, Some(2));
        assert_eq!(cli.overrides.allowed_branches.as_deref(), Some("master,develop"));
        match cli.command {
            Command::Worker(args) => assert_eq!(args.role, RoleArg::Merge),
            _ => panic!("expected worker"),
        }
    }
}
