//! `forkwatch validate`: load a project list and print it.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use forkwatch_core::{registry, SourceLocator};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Project list: an http(s) URL or a local file path.
    #[arg(env = "FORKWATCH_REPO_LIST")]
    pub locator: String,

    /// Print the parsed list as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "upstream")]
    upstream: String,
    #[tabled(rename = "downstream")]
    downstream: String,
    #[tabled(rename = "branch")]
    branch: String,
}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let locator = SourceLocator::parse(&self.locator).context("invalid locator")?;
        let projects = registry::load(&locator)
            .with_context(|| format!("project list at {locator} is invalid"))?;

        if self.json {
            let value = serde_json::to_value(&projects).context("failed to encode project list")?;
            return super::print_json(&value);
        }

        println!("{locator}: {} projects OK", projects.len());
        if projects.is_empty() {
            return Ok(());
        }
        let rows: Vec<ProjectRow> = projects
            .iter()
            .map(|p| ProjectRow {
                upstream: p.upstream.to_string(),
                downstream: p.downstream.to_string(),
                branch: p.branch.to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
