//! `jobdeck run` and `jobdeck run-on-login`
//!
//! Starts a run, draws one spinner line per project from the run's progress
//! channel, and forwards Ctrl+C to the run as a cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use jobdeck_core::format::format_duration;
use jobdeck_core::{
    AdhocRun, Config, HttpTransport, Inbox, PreCheck, ResultSink, RunCoordinator,
    RunOutcome, RunParams, RunReport, RunSnapshot,
};
use tokio_util::sync::CancellationToken;

use crate::display::{project_badge, project_label};

/// How one invocation of `run` was specified on the command line.
pub struct RunRequestArgs {
    pub job: Option<String>,
    pub prompt: Option<String>,
    pub projects: Vec<String>,
    pub name: Option<String>,
    pub pre_check: Option<PreCheck>,
    pub max_parallel: Option<u32>,
    pub dry_run: bool,
}

/// Turn command line arguments into run parameters.
pub fn build_params(config: &Config, args: &RunRequestArgs) -> Result<RunParams> {
    if let Some(job_id) = &args.job {
        let job = config
            .job(job_id)
            .with_context(|| format!("no saved job {:?} in {}", job_id, Config::config_path().display()))?;
        return Ok(RunParams::Saved(job.clone()));
    }

    let Some(prompt) = &args.prompt else {
        bail!("either --job or --prompt is required");
    };
    Ok(RunParams::Adhoc(AdhocRun {
        name: args.name.clone(),
        prompt: prompt.clone(),
        project_paths: args.projects.clone(),
        pre_check: args.pre_check.clone(),
        max_parallel: Some(
            args.max_parallel
                .unwrap_or(config.runner.default_max_parallel),
        ),
    }))
}

/// `jobdeck run`
pub fn run_command(config: &Config, inbox: Arc<Inbox>, args: RunRequestArgs) -> Result<()> {
    let params = build_params(config, &args)?;
    params.validate().context("invalid run")?;

    if args.dry_run {
        let transport = HttpTransport::new(&config.server).context("invalid server config")?;
        println!("POST {}", transport.run_url());
        println!(
            "{}",
            serde_json::to_string_pretty(&params.request()).context("failed to encode request")?
        );
        println!("\nDry run - no request sent");
        return Ok(());
    }

    let runtime = build_runtime()?;
    let interrupt = install_interrupt_handler()?;

    runtime.block_on(async {
        let report = execute(config, inbox, params, &interrupt).await?;
        finish_report(&report)
    })
}

/// `jobdeck run-on-login`: every `on-login` job in turn.
pub fn run_on_login_command(config: &Config, inbox: Arc<Inbox>) -> Result<()> {
    let jobs: Vec<_> = config.on_login_jobs().cloned().collect();
    if jobs.is_empty() {
        println!("No on-login jobs configured");
        return Ok(());
    }

    let runtime = build_runtime()?;
    let interrupt = install_interrupt_handler()?;

    runtime.block_on(async {
        let mut failures = 0usize;
        for job in jobs {
            if interrupt.is_cancelled() {
                println!("Interrupted; skipping remaining jobs");
                break;
            }
            println!("==> {}", job.name);
            let report = execute(config, Arc::clone(&inbox), RunParams::Saved(job), &interrupt).await?;
            if let Err(e) = finish_report(&report) {
                eprintln!("{:#}", e);
                failures += 1;
            }
            println!();
        }

        if failures > 0 {
            bail!("{} on-login job(s) failed", failures);
        }
        Ok(())
    })
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn install_interrupt_handler() -> Result<CancellationToken> {
    let interrupt = CancellationToken::new();
    let token = interrupt.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling run...");
        token.cancel();
    })
    .context("failed to set Ctrl+C handler")?;
    Ok(interrupt)
}

/// Start one run and draw its progress until it is recorded.
async fn execute(
    config: &Config,
    inbox: Arc<Inbox>,
    params: RunParams,
    interrupt: &CancellationToken,
) -> Result<RunReport> {
    let transport = Arc::new(HttpTransport::new(&config.server).context("invalid server config")?);
    let sink: Arc<dyn ResultSink> = inbox;
    let coordinator = RunCoordinator::new(transport, sink);

    let handle = coordinator.start_run(params).context("failed to start run")?;
    tracing::info!(run_id = %handle.run_id(), "Run started from CLI");

    let mut progress = handle.progress();
    let view = ProgressView::new(
        &progress.borrow_and_update(),
        Duration::from_millis(config.runner.progress_refresh_ms),
    );

    loop {
        tokio::select! {
            _ = interrupt.cancelled(), if !handle.is_cancelled() => {
                handle.cancel();
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = progress.borrow_and_update().clone();
                view.update(&snapshot);
                if snapshot.finished {
                    break;
                }
            }
        }
    }
    view.finish();

    handle.wait().await.context("run did not finish cleanly")
}

/// Print the outcome; a failed run becomes an error exit.
fn finish_report(report: &RunReport) -> Result<()> {
    let record = &report.record;
    let summary = jobdeck_core::summarize(&record.projects);

    println!(
        "{} {}: {} in {}",
        crate::display::result_badge(record.status),
        record.job_name,
        record.status,
        format_duration(record.completed_at - record.started_at)
    );
    println!("  {}", summary);
    for project in &record.projects {
        if let Some(error) = &project.error {
            println!("  {} {}: {}", project_badge(project.status, false), project.name, error);
        }
    }
    println!("Saved to inbox as {}", record.id);

    match &report.outcome {
        RunOutcome::Completed { .. } => Ok(()),
        RunOutcome::Cancelled => {
            println!("Run cancelled; partial result recorded");
            Ok(())
        }
        RunOutcome::Failed(message) => bail!("run failed: {}", message),
    }
}

/// One spinner per project, in run order.
struct ProgressView {
    bars: HashMap<String, ProgressBar>,
}

impl ProgressView {
    fn new(snapshot: &RunSnapshot, tick: Duration) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ");
        let width = snapshot
            .projects
            .iter()
            .map(|p| p.name.chars().count())
            .max()
            .unwrap_or(0);

        let mut bars = HashMap::new();
        for project in &snapshot.projects {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(style.clone());
            bar.set_prefix(format!("{:width$}", project.name, width = width));
            bar.set_message(project.status.to_string());
            bar.enable_steady_tick(tick);
            bars.insert(project.path.clone(), bar);
        }

        let view = Self { bars };
        view.update(snapshot);
        view
    }

    fn update(&self, snapshot: &RunSnapshot) {
        for project in &snapshot.projects {
            let Some(bar) = self.bars.get(&project.path) else {
                continue;
            };
            if bar.is_finished() {
                continue;
            }

            let mut message = project_label(project.status, project.needs_human);
            if let Some(error) = &project.error {
                message.push_str(&format!(": {}", error));
            } else if !project.tail.is_empty() {
                message.push_str(&format!("  {}", project.tail));
            }

            if project.status.is_terminal() || snapshot.finished {
                bar.finish_with_message(format!(
                    "{} {}",
                    project_badge(project.status, project.needs_human),
                    message
                ));
            } else {
                bar.set_message(message);
            }
        }
    }

    fn finish(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.finish();
            }
        }
    }
}
