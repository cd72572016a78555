//! `forkwatch check`: one tick, in-process, without a daemon.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use forkwatch_core::{registry, SourceLocator};
use forkwatch_daemon::{init_tracing, ProjectSummary, TickSummary, TickTrigger};
use forkwatch_sync::freshness::format_age;
use forkwatch_sync::{run_tick, GitMirror, GithubCommitSource, ProjectOutcome, TickOptions};

use super::WatchArgs;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub watch: WatchArgs,

    /// Report which projects would be mirrored without mirroring them.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the tick summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        init_tracing(false);

        let locator = SourceLocator::parse(&self.watch.repo_list)
            .context("invalid --repo-list")?;
        let projects = registry::load(&locator)
            .with_context(|| format!("failed to load project list from {locator}"))?;

        let credential = self.watch.credential();
        let source = GithubCommitSource::new(self.watch.api_url.clone(), credential.clone());
        let mirror = GitMirror::new(self.watch.git_host.clone(), credential);
        let options = TickOptions {
            window: self.watch.interval(),
            dry_run: self.dry_run,
        };

        let report = run_tick(&projects, Utc::now(), &source, &mirror, &options);
        let summary = TickSummary::from_report(report, TickTrigger::Once);

        if self.json {
            let value = serde_json::to_value(&summary).context("failed to encode tick summary")?;
            super::print_json(&value)?;
        } else {
            print_table(&summary, self.dry_run);
        }

        if summary.failed > 0 {
            bail!(
                "{} of {} projects failed",
                summary.failed,
                summary.projects.len()
            );
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct TickTableRow {
    #[tabled(rename = "upstream")]
    upstream: String,
    #[tabled(rename = "downstream")]
    downstream: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_table(summary: &TickSummary, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}forkwatch v{} | {} projects | {} mirrored | {} up to date | {} failed",
        env!("CARGO_PKG_VERSION"),
        summary.projects.len(),
        summary.mirrored,
        summary.up_to_date,
        summary.failed,
    );

    if summary.projects.is_empty() {
        println!("No projects in the list.");
        return;
    }

    let rows: Vec<TickTableRow> = summary.projects.iter().map(row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn row(project: &ProjectSummary) -> TickTableRow {
    let (status, detail) = match &project.outcome {
        ProjectOutcome::Mirrored { head } => ("mirrored".green().to_string(), head.clone()),
        ProjectOutcome::WouldMirror => ("would mirror".cyan().to_string(), String::new()),
        ProjectOutcome::UpToDate { age_secs } => (
            "up to date".bright_black().to_string(),
            format!("last commit {} ago", format_age(*age_secs)),
        ),
        ProjectOutcome::FetchFailed { error } => ("fetch failed".red().to_string(), error.clone()),
        ProjectOutcome::MirrorFailed { error } => {
            ("mirror failed".red().bold().to_string(), error.clone())
        }
    };

    TickTableRow {
        upstream: project.project.upstream.to_string(),
        downstream: project.project.downstream.to_string(),
        branch: project.project.branch.to_string(),
        status,
        detail,
    }
}
