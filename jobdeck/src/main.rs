//! jobdeck - run AI jobs across many projects and review the results
//!
//! Uses XDG Base Directory specification for file locations:
//! - Inbox: $XDG_DATA_HOME/jobdeck/inbox.db (~/.local/share/jobdeck/inbox.db)
//! - Logs: $XDG_STATE_HOME/jobdeck/jobdeck.log (~/.local/state/jobdeck/jobdeck.log)
//! - Config: $XDG_CONFIG_HOME/jobdeck/config.toml (~/.config/jobdeck/config.toml)

mod display;
mod run;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use jobdeck_core::{Config, Database, Inbox, JobResult, PreCheck, SkipIf};

use crate::display::{inbox_row, result_details};
use crate::run::RunRequestArgs;

#[derive(Parser)]
#[command(name = "jobdeck")]
#[command(about = "Run AI jobs across many projects and review the results")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a saved job or an ad-hoc prompt
    Run(RunArgs),
    /// Run every job whose trigger is on-login
    RunOnLogin,
    /// List saved jobs
    Jobs,
    /// List results, newest first
    Inbox {
        /// Show at most this many results
        #[arg(short, long)]
        limit: Option<usize>,
        /// Only unread results
        #[arg(short, long)]
        unread: bool,
    },
    /// Show one result with every project's transcript (ID prefix accepted)
    Show {
        id: String,
        /// Print the stored result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a result read (ID prefix accepted)
    Read { id: String },
    /// Mark every result read
    ReadAll,
    /// Delete a result (ID prefix accepted)
    Delete { id: String },
    /// Show unread counters and file locations
    Status,
}

#[derive(Args)]
struct RunArgs {
    /// Saved job ID from config.toml
    #[arg(long, conflicts_with_all = ["prompt", "projects", "name", "pre_check", "max_parallel"])]
    job: Option<String>,

    /// Prompt for an ad-hoc run
    #[arg(long, required_unless_present = "job")]
    prompt: Option<String>,

    /// Target project path (repeat for several)
    #[arg(short = 'p', long = "project", value_name = "PATH")]
    projects: Vec<String>,

    /// Display name for an ad-hoc run
    #[arg(long)]
    name: Option<String>,

    /// Command the server runs in each project before the prompt
    #[arg(long, requires = "skip_if")]
    pre_check: Option<String>,

    /// Skip a project when pre-check output is `empty` or `non-empty`
    #[arg(long, requires = "pre_check")]
    skip_if: Option<SkipIf>,

    /// Projects the server may run at once
    #[arg(long)]
    max_parallel: Option<u32>,

    /// Print the request instead of sending it
    #[arg(long)]
    dry_run: bool,
}

impl From<RunArgs> for RunRequestArgs {
    fn from(args: RunArgs) -> Self {
        let pre_check = match (args.pre_check, args.skip_if) {
            (Some(command), Some(skip_if)) => Some(PreCheck { command, skip_if }),
            _ => None,
        };
        Self {
            job: args.job,
            prompt: args.prompt,
            projects: args.projects,
            name: args.name,
            pre_check,
            max_parallel: args.max_parallel,
            dry_run: args.dry_run,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        jobdeck_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("jobdeck starting");

    let db_path = Config::database_path();
    let open_inbox = || -> Result<Inbox> {
        tracing::info!(path = %db_path.display(), "Opening inbox");
        let db = Database::open(&db_path).context("failed to open database")?;
        Inbox::new(db).context("failed to run database migrations")
    };

    match cli.command {
        Command::Run(args) => run::run_command(&config, Arc::new(open_inbox()?), args.into()),
        Command::RunOnLogin => run::run_on_login_command(&config, Arc::new(open_inbox()?)),
        Command::Jobs => list_jobs(&config),
        Command::Inbox { limit, unread } => list_inbox(&open_inbox()?, limit, unread),
        Command::Show { id, json } => {
            let result = resolve_result(&open_inbox()?, &id)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result).context("failed to encode result")?
                );
            } else {
                print!("{}", result_details(&result));
            }
            Ok(())
        }
        Command::Read { id } => {
            let inbox = open_inbox()?;
            let result = resolve_result(&inbox, &id)?;
            inbox.mark_read(result.id())?;
            println!("Marked {} read", result.id());
            Ok(())
        }
        Command::ReadAll => {
            let changed = open_inbox()?.mark_all_read()?;
            println!("Marked {} result(s) read", changed);
            Ok(())
        }
        Command::Delete { id } => {
            let inbox = open_inbox()?;
            let result = resolve_result(&inbox, &id)?;
            inbox.delete_result(result.id())?;
            println!("Deleted {}", result.id());
            Ok(())
        }
        Command::Status => {
            let counts = open_inbox()?.counts();
            println!("Unread:       {}", counts.unread);
            println!("Needs review: {}", counts.needs_human);
            println!("Server:       {}", config.server.run_url());
            println!("Config:       {}", Config::config_path().display());
            println!("Inbox:        {}", db_path.display());
            println!(
                "Logs:         {}",
                jobdeck_core::logging::log_file_path().display()
            );
            Ok(())
        }
    }
}

fn list_jobs(config: &Config) -> Result<()> {
    if config.jobs.is_empty() {
        println!("No saved jobs in {}", Config::config_path().display());
        return Ok(());
    }

    for job in &config.jobs {
        println!(
            "{}  {}  [{}, {}, {} project(s), max {} at once]",
            job.id,
            job.name,
            job.trigger.as_str(),
            job.backend.as_str(),
            job.project_paths.len(),
            job.max_parallel
        );
        if let Some(pre_check) = &job.pre_check {
            println!(
                "    pre-check: {} (skip if {})",
                pre_check.command,
                pre_check.skip_if.as_str()
            );
        }
    }
    Ok(())
}

fn list_inbox(inbox: &Inbox, limit: Option<usize>, unread_only: bool) -> Result<()> {
    let results: Vec<JobResult> = if unread_only {
        inbox
            .list_results(None)?
            .into_iter()
            .filter(|r| !r.is_read)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    } else {
        inbox.list_results(limit)?
    };

    if results.is_empty() {
        println!("Inbox is empty");
        return Ok(());
    }

    for result in &results {
        println!("{}", inbox_row(result));
    }

    let counts = inbox.counts();
    println!(
        "\n{} unread, {} need review",
        counts.unread, counts.needs_human
    );
    Ok(())
}

/// Find a result by full ID or unique prefix.
fn resolve_result(inbox: &Inbox, id: &str) -> Result<JobResult> {
    if let Ok(result) = inbox.get_result(id) {
        return Ok(result);
    }

    let mut matches: Vec<JobResult> = inbox
        .list_results(None)?
        .into_iter()
        .filter(|r| r.id().starts_with(id))
        .collect();

    match matches.len() {
        0 => bail!("No result found matching '{}'", id),
        1 => Ok(matches.remove(0)),
        n => bail!("'{}' matches {} results; use a longer prefix", id, n),
    }
}
