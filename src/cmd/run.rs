//! Run lifecycle commands: kickoff, execute, decide, fail and sweep.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use vetter::config::VetterConfig;

use super::super::Cli;
use super::status::print_outcome;
use super::{open_service, print_json};

/// Parse `--input`: inline JSON, or `@path` to read JSON from a file.
fn parse_input(project_dir: &Path, input: Option<&str>) -> Result<serde_json::Value> {
    let Some(raw) = input else {
        return Ok(serde_json::Value::Null);
    };
    let text = match raw.strip_prefix('@') {
        Some(path) => {
            let path = project_dir.join(path);
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read input file {}", path.display()))?
        }
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("Kickoff input is not valid JSON")
}

pub async fn cmd_kickoff(
    cli: &Cli,
    project_dir: &Path,
    config: VetterConfig,
    project: &str,
    user: &str,
    input: Option<&str>,
    no_run: bool,
) -> Result<()> {
    let input = parse_input(project_dir, input)?;
    let service = open_service(project_dir, config)?;
    let run_id = service.kickoff(project, user, input).await?;

    if no_run {
        if cli.json {
            return print_json(&serde_json::json!({"run_id": run_id}));
        }
        println!("Run {} created", run_id);
        println!("Execute it with: vetter execute {}", run_id);
        return Ok(());
    }

    let outcome = service.execute(&run_id).await?;
    if cli.json {
        return print_json(&serde_json::json!({"run_id": run_id, "execution": outcome}));
    }
    print_outcome(&run_id, &outcome);
    Ok(())
}

pub async fn cmd_execute(
    cli: &Cli,
    project_dir: &Path,
    config: VetterConfig,
    run_id: &str,
) -> Result<()> {
    let service = open_service(project_dir, config)?;
    let outcome = service.execute(run_id).await?;
    if cli.json {
        return print_json(&serde_json::json!({"run_id": run_id, "execution": outcome}));
    }
    print_outcome(run_id, &outcome);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_decide(
    cli: &Cli,
    project_dir: &Path,
    config: VetterConfig,
    run_id: &str,
    checkpoint: &str,
    decision: &str,
    notes: Option<String>,
    decided_by: Option<String>,
) -> Result<()> {
    let service = open_service(project_dir, config)?;
    let result = service
        .submit_decision_and_wait(run_id, checkpoint, decision, notes, decided_by)
        .await?;

    if cli.json {
        return print_json(&result);
    }
    println!(
        "Decision {} at {}: {}",
        style(&result.decision.decision).bold(),
        checkpoint,
        result.decision.transition.describe()
    );
    match &result.execution {
        Some(outcome) => print_outcome(run_id, outcome),
        None => println!("Run {} is {}", run_id, result.decision.status),
    }
    Ok(())
}

pub async fn cmd_fail(
    cli: &Cli,
    project_dir: &Path,
    config: VetterConfig,
    run_id: &str,
    reason: &str,
) -> Result<()> {
    let service = open_service(project_dir, config)?;
    let outcome = service.fail_run(run_id, reason).await?;
    if cli.json {
        return print_json(&outcome);
    }
    print_outcome(run_id, &outcome);
    Ok(())
}

pub async fn cmd_sweep(cli: &Cli, project_dir: &Path, config: VetterConfig) -> Result<()> {
    let service = open_service(project_dir, config)?;
    let expired = service.sweep().await?;
    if cli.json {
        return print_json(&serde_json::json!({"expired": expired}));
    }
    println!("Expired {} stale approval request(s)", expired);
    Ok(())
}
