use std::fs;
use std::io::{self, BufReader, Read};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use shipyard_exec::{CommandRunner, SystemRunner};
use shipyard_merge::{parse_merge_output, MergeConflictResolver};
use shipyard_queue::{InMemoryQueue, JsonLinesQueue, Reply};
use shipyard_types::{CreateBranchTask, MergeTask, MergeTaskResult, MigrationStatus, MigrationTask};
use shipyard_worker::{
    parse_list, MergeHandler, MigrationHandler, Role, TaskHandler, TaskWorkerLoop, WorkerConfig,
};
use tracing::info;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.overrides)?;
    let format = cli.format;
    match cli.command {
        Command::Worker(args) => cmd_worker(&config, args),
        Command::Merge(args) => cmd_merge(&config, args, format),
        Command::CreateBranch(args) => cmd_create_branch(&config, args),
        Command::Migrate(args) => cmd_migrate(&config, args, format),
        Command::CheckBranch(args) => cmd_check_branch(&config, args, format),
        Command::ParseMergeOutput(args) => cmd_parse_merge_output(args),
    }
}

/// Configuration file, then command-line overrides, then validation.
fn load_config(overrides: &Overrides) -> anyhow::Result<WorkerConfig> {
    let mut config = match &overrides.config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    if let Some(instance) = overrides.instance {
        config.instance = instance;
    }
    if let Some(list) = &overrides.allowed_branches {
        config.allowed_branches = parse_list(list);
    }
    if let Some(list) = &overrides.disallowed_branches {
        config.disallowed_branches = parse_list(list);
    }
    if let Some(name) = &overrides.worker_name {
        config.migration.worker_name = name.clone();
    }
    config.dry_run |= overrides.dry_run;
    config.debug |= overrides.debug;
    config.validate()?;
    Ok(config)
}

fn runner() -> Arc<dyn CommandRunner> {
    Arc::new(SystemRunner::new())
}

fn resolver(config: &WorkerConfig) -> anyhow::Result<MergeConflictResolver> {
    let resolver =
        MergeConflictResolver::new(runner(), config.catalog(), config.resolver_settings())
            .context("cannot prepare merge resolver")?;
    Ok(resolver)
}

fn migration_handler(config: &WorkerConfig) -> MigrationHandler {
    MigrationHandler::new(
        runner(),
        config.script_locator(),
        config.migration_settings(),
    )
}

fn cmd_worker(config: &WorkerConfig, args: WorkerArgs) -> anyhow::Result<()> {
    let (role, handler): (Role, Arc<dyn TaskHandler>) = match args.role {
        RoleArg::Merge => (
            Role::Merge,
            Arc::new(MergeHandler::new(resolver(config)?, config.branch_filter())),
        ),
        RoleArg::Migration => (Role::Migration, Arc::new(migration_handler(config))),
    };
    info!(
        ?role,
        instance = config.instance,
        worker = %config.migration.worker_name,
        dry_run = config.dry_run,
        "starting worker"
    );

    let queue = Arc::new(JsonLinesQueue::new(
        BufReader::new(io::stdin()),
        io::stdout(),
    ));
    let stats = TaskWorkerLoop::new(queue).register(handler).run()?;

    eprintln!(
        "{} {} received, {} accepted, {} retried, {} failed",
        "✓".green().bold(),
        stats.received,
        stats.accepted,
        stats.retried,
        stats.failed
    );
    Ok(())
}

fn cmd_merge(config: &WorkerConfig, args: MergeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let task = MergeTask {
        feature_id: args.feature_id,
        source_branch: args.source,
        target_branch: args.target,
        merge_type: args.merge_type,
    };
    if !config.branch_filter().is_allowed(&task.target_branch) {
        anyhow::bail!("merging into {} is not allowed", task.target_branch);
    }
    let result = resolver(config)?.resolve(&task)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_merge_result(&result),
    }
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_merge_result(result: &MergeTaskResult) {
    if result.success {
        println!(
            "{} Merged {} into {}",
            "✓".green().bold(),
            result.source_branch.yellow(),
            result.target_branch.yellow()
        );
        return;
    }
    println!(
        "{} Merge of {} into {} failed",
        "✗".red().bold(),
        result.source_branch.yellow(),
        result.target_branch.yellow()
    );
    for error in &result.errors {
        println!("{error}");
    }
}

fn cmd_create_branch(config: &WorkerConfig, args: CreateBranchArgs) -> anyhow::Result<()> {
    let task = CreateBranchTask {
        source: args.source,
        branch: args.branch,
        force: args.force,
    };
    resolver(config)?.create_branch(&task)?;
    println!(
        "{} Created {} from {}",
        "✓".green().bold(),
        task.branch.yellow(),
        task.source.yellow()
    );
    Ok(())
}

fn cmd_migrate(config: &WorkerConfig, args: MigrateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let task = MigrationTask {
        project: args.project,
        version: args.version,
        migration: args.migration,
        worker: None,
    };
    let queue = InMemoryQueue::new();
    migration_handler(config).run(&task, &queue);

    let mut last = None;
    for reply in queue.replies() {
        if let Reply::Status(update) = &reply {
            last = Some(update.status);
        }
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&reply)?),
            OutputFormat::Text => print_reply(&reply),
        }
    }
    if last != Some(MigrationStatus::Done) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_reply(reply: &Reply) {
    match reply {
        Reply::Status(update) => {
            let status = match update.status {
                MigrationStatus::Done => update.status.as_str().green().bold(),
                MigrationStatus::Failed => update.status.as_str().red().bold(),
                _ => update.status.as_str().cyan(),
            };
            println!("{} {}", update.migration.bold(), status);
            if let Some(text) = &update.text {
                println!("{}", text.dimmed());
            }
        }
        Reply::LogChunk(chunk) => print!("{}", chunk.text),
        Reply::MergeResult(result) => print_merge_result(result),
    }
}

fn cmd_check_branch(
    config: &WorkerConfig,
    args: CheckBranchArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let filter = config.branch_filter();
    match format {
        OutputFormat::Json => {
            let verdicts: serde_json::Map<String, serde_json::Value> = args
                .branches
                .iter()
                .map(|branch| (branch.clone(), filter.is_allowed(branch).into()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&verdicts)?);
        }
        OutputFormat::Text => {
            for branch in &args.branches {
                if filter.is_allowed(branch) {
                    println!("{} {} allowed", "✓".green(), branch.yellow());
                } else {
                    println!("{} {} rejected", "✗".red(), branch.yellow());
                }
            }
        }
    }
    Ok(())
}

fn cmd_parse_merge_output(args: ParseMergeOutputArgs) -> anyhow::Result<()> {
    let transcript = match &args.path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };
    let report = parse_merge_output(&transcript);
    if report.is_empty() {
        println!("{} No conflicts.", "✓".green());
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

