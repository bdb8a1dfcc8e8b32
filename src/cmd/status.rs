//! Run inspection commands.

use anyhow::Result;
use console::style;
use std::path::Path;

use vetter::config::VetterConfig;
use vetter::models::{HitlRequest, RunState, RunStatus};
use vetter::orchestrator::ExecutionOutcome;
use vetter::routing;
use vetter::service::StatusView;

use super::super::Cli;
use super::{open_service, print_json};

pub async fn cmd_status(
    cli: &Cli,
    project_dir: &Path,
    config: VetterConfig,
    run_id: Option<&str>,
    limit: usize,
) -> Result<()> {
    let service = open_service(project_dir, config)?;

    match run_id {
        Some(id) => {
            let view = service.status(id).await?;
            if cli.json {
                return print_json(&view);
            }
            print_status(&view);
        }
        None => {
            let runs = service.list(limit).await?;
            if cli.json {
                return print_json(&runs);
            }
            print_run_table(&runs);
        }
    }
    Ok(())
}

pub fn cmd_checkpoints(cli: &Cli) -> Result<()> {
    if cli.json {
        let list: Vec<_> = routing::checkpoints()
            .iter()
            .map(|cp| {
                serde_json::json!({
                    "name": cp.name,
                    "phase": cp.phase,
                    "options": cp.decision_options(),
                })
            })
            .collect();
        return print_json(&list);
    }

    println!();
    for cp in routing::checkpoints() {
        println!("{} ({})", style(cp.name).bold(), cp.phase);
        for option in cp.options {
            println!("  {:<18} {}", option.value, option.description);
        }
        println!();
    }
    Ok(())
}

fn styled_status(status: RunStatus) -> console::StyledObject<&'static str> {
    let s = style(status.as_str());
    match status {
        RunStatus::Completed => s.green(),
        RunStatus::Failed => s.red(),
        RunStatus::AwaitingApproval => s.yellow(),
        RunStatus::Running => s.cyan(),
        RunStatus::Pending => s.dim(),
    }
}

fn print_run_table(runs: &[RunState]) {
    println!();
    if runs.is_empty() {
        println!("No runs yet. Start one with 'vetter kickoff'.");
        println!();
        return;
    }
    println!(
        "{:<38} {:<14} {:<20} {:<20} Updated",
        "Run", "Phase", "Status", "Project"
    );
    println!(
        "{:<38} {:<14} {:<20} {:<20} -------",
        "-".repeat(36),
        "------------",
        "------------------",
        "------------------"
    );
    for run in runs {
        println!(
            "{:<38} {:<14} {:<20} {:<20} {}",
            run.id,
            run.phase.as_str(),
            styled_status(run.status),
            run.project_ref,
            run.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
}

fn print_status(view: &StatusView) {
    let run = &view.run;
    println!();
    println!("Run:      {}", style(&run.id).bold());
    println!("Project:  {} (user {})", run.project_ref, run.user_ref);
    println!("Phase:    {}", run.phase);
    println!("Status:   {}", styled_status(run.status));
    if let Some(signal) = &run.last_signal {
        println!("Signal:   {}", signal);
    }
    if let Some(failure) = &run.failure {
        println!(
            "Failure:  {} ({})",
            failure.message,
            style(failure.kind.as_str()).red()
        );
    }
    println!();

    println!("Evidence:");
    for line in run.evidence_summary().lines() {
        println!("  {}", line);
    }

    if !run.pivot_history.is_empty() {
        println!();
        println!("Pivots:");
        for pivot in &run.pivot_history {
            println!(
                "  {} {} -> {} at {} ({})",
                pivot.pivot_type,
                pivot.from_phase,
                pivot.to_phase,
                pivot.checkpoint,
                pivot.timestamp.format("%Y-%m-%d %H:%M")
            );
        }
    }

    if let Some(request) = &view.pending_approval {
        println!();
        print_pending(run, request);
    }

    if !view.progress.is_empty() {
        println!();
        println!("Recent progress:");
        for event in &view.progress {
            println!(
                "  {} {:<13} {:<10} {}",
                event.created_at.format("%H:%M:%S"),
                event.phase.as_str(),
                event.status.as_str(),
                style(event.summary.as_deref().unwrap_or("")).dim()
            );
        }
    }
    println!();
}

fn print_pending(run: &RunState, request: &HitlRequest) {
    println!(
        "{} {}",
        style("Awaiting approval:").yellow().bold(),
        request.checkpoint_name
    );
    println!("  {}", request.context.rationale);
    println!("  Route: {}", request.context.route);
    println!("  Expires: {}", request.expires_at.format("%Y-%m-%d %H:%M UTC"));
    for option in &request.options {
        let marker = if option.value == request.recommended_option {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };
        println!("  {} {:<18} {}", marker, option.value, option.description);
    }
    println!(
        "  Decide with: vetter decide {} {} <option>",
        run.id, request.checkpoint_name
    );
}

pub(super) fn print_outcome(run_id: &str, outcome: &ExecutionOutcome) {
    match outcome {
        ExecutionOutcome::AwaitingApproval { checkpoint, .. } => {
            println!(
                "Run {} is {} at {}",
                run_id,
                style("awaiting approval").yellow(),
                checkpoint
            );
            println!("Inspect with: vetter status {}", run_id);
        }
        ExecutionOutcome::Completed => {
            println!("Run {} {}", run_id, style("completed").green().bold());
        }
        ExecutionOutcome::Failed { kind, reason } => {
            println!(
                "Run {} {} ({}): {}",
                run_id,
                style("failed").red().bold(),
                kind,
                reason
            );
        }
    }
}
