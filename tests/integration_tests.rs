//! Integration tests for the vetter CLI
//!
//! These drive the binary end to end against a shell stage script.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a vetter Command rooted at a project directory
fn vetter(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("vetter");
    cmd.current_dir(dir.path())
        .env_remove("VETTER_STAGE_CMD")
        .env_remove("VETTER_DB_PATH")
        .env_remove("VETTER_WEBHOOK_URL")
        .env_remove("RUST_LOG");
    cmd
}

const STAGE_SCRIPT: &str = r#"#!/bin/sh
cat > /dev/null
case "$VETTER_PHASE" in
  discovery)
    echo '{"evidence": {"phase": "discovery", "segments": ["clinics"], "value_proposition": "fewer no-shows", "fit_score": 0.9}}' ;;
  desirability)
    echo '{"evidence": {"phase": "desirability", "impressions": 1000, "clicks": 200, "signups": 120, "spend_usd": 250}}' ;;
  feasibility)
    echo '{"evidence": {"phase": "feasibility", "components": [{"name": "scheduler", "status": "feasible"}], "monthly_cost_usd": 400}}' ;;
  viability)
    echo '{"evidence": {"phase": "viability", "ltv_usd": 900, "cac_usd": 100, "tam_usd": 50000000}}' ;;
esac
"#;

/// Project with a stage script and an optional extra config section.
fn project_with_stage(extra_config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("stage.sh"), STAGE_SCRIPT).unwrap();
    fs::create_dir_all(dir.path().join(".vetter")).unwrap();
    let config = format!(
        "[stage]\ncommand = \"sh\"\nargs = [\"stage.sh\"]\n\n{}",
        extra_config
    );
    fs::write(dir.path().join(".vetter/vetter.toml"), config).unwrap();
    dir
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn kickoff(dir: &TempDir) -> serde_json::Value {
    json_stdout(vetter(dir).args(["--json", "kickoff", "--project", "clinic-app", "--user", "founder"]))
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_vetter_help() {
        let dir = TempDir::new().unwrap();
        vetter(&dir).arg("--help").assert().success();
    }

    #[test]
    fn test_vetter_version() {
        let dir = TempDir::new().unwrap();
        vetter(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_config() {
        let dir = TempDir::new().unwrap();
        vetter(&dir)
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized"));
        let content = fs::read_to_string(dir.path().join(".vetter/vetter.toml")).unwrap();
        assert!(content.contains("[routing]"));

        vetter(&dir)
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Already initialized"));
    }

    #[test]
    fn test_checkpoints_lists_all_gates() {
        let dir = TempDir::new().unwrap();
        vetter(&dir)
            .arg("checkpoints")
            .assert()
            .success()
            .stdout(predicate::str::contains("approve_discovery_output"))
            .stdout(predicate::str::contains("approve_viability_pivot"))
            .stdout(predicate::str::contains("override_proceed"));
    }

    #[test]
    fn test_status_without_runs() {
        let dir = TempDir::new().unwrap();
        vetter(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No runs yet"));
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_validate_warns_without_stage() {
        let dir = TempDir::new().unwrap();
        vetter(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("stage.command is not set"));
    }

    #[test]
    fn test_config_show_reflects_file() {
        let dir = project_with_stage("[server]\nport = 4242\n");
        vetter(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 4242"));
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = project_with_stage("");
        vetter(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".vetter")).unwrap();
        fs::write(dir.path().join(".vetter/vetter.toml"), "[stage\n").unwrap();
        vetter(&dir).arg("status").assert().failure();
    }
}

// =============================================================================
// Run Lifecycle Tests
// =============================================================================

mod runs {
    use super::*;

    #[test]
    fn test_kickoff_parks_at_discovery_gate() {
        let dir = project_with_stage("");
        let out = kickoff(&dir);
        assert_eq!(out["execution"]["outcome"], "awaiting_approval");
        assert_eq!(out["execution"]["checkpoint"], "approve_discovery_output");

        let run_id = out["run_id"].as_str().unwrap();
        let view = json_stdout(vetter(&dir).args(["--json", "status", run_id]));
        assert_eq!(view["run"]["status"], "awaiting_approval");
        assert_eq!(view["pending_approval"]["recommended_option"], "approved");
        assert_eq!(view["run"]["last_signal"]["signal"], "FIT_CONFIRMED");
    }

    #[test]
    fn test_decide_advances_to_next_gate() {
        let dir = project_with_stage("");
        let out = kickoff(&dir);
        let run_id = out["run_id"].as_str().unwrap();

        let result = json_stdout(vetter(&dir).args([
            "--json",
            "decide",
            run_id,
            "approve_discovery_output",
            "approved",
            "--by",
            "reviewer",
        ]));
        assert_eq!(result["decision"]["outcome"], "advance");
        assert_eq!(result["decision"]["next_phase"], "desirability");
        assert_eq!(
            result["execution"]["checkpoint"],
            "approve_desirability_gate"
        );
    }

    #[test]
    fn test_decision_is_single_use() {
        let dir = project_with_stage("");
        let out = kickoff(&dir);
        let run_id = out["run_id"].as_str().unwrap();

        vetter(&dir)
            .args(["decide", run_id, "approve_discovery_output", "reject"])
            .assert()
            .success()
            .stdout(predicate::str::contains("failed"));

        vetter(&dir)
            .args(["decide", run_id, "approve_discovery_output", "approved"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already"));
    }

    #[test]
    fn test_invalid_decision_is_rejected_and_run_stays_parked() {
        let dir = project_with_stage("");
        let out = kickoff(&dir);
        let run_id = out["run_id"].as_str().unwrap();

        vetter(&dir)
            .args(["decide", run_id, "approve_discovery_output", "price_pivot"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not valid"));

        let view = json_stdout(vetter(&dir).args(["--json", "status", run_id]));
        assert_eq!(view["run"]["status"], "awaiting_approval");
    }

    #[test]
    fn test_ungated_run_completes_in_one_kickoff() {
        let dir = project_with_stage(
            "[routing]\nungated_checkpoints = [\"approve_discovery_output\", \"approve_desirability_gate\", \"approve_feasibility_gate\", \"approve_viability_gate\"]\n",
        );
        let out = kickoff(&dir);
        assert_eq!(out["execution"]["outcome"], "completed");

        let run_id = out["run_id"].as_str().unwrap();
        let view = json_stdout(vetter(&dir).args(["--json", "status", run_id]));
        assert_eq!(view["run"]["status"], "completed");
        assert_eq!(view["run"]["phase"], "viability");
        assert!(view.get("pending_approval").is_none());
        assert_eq!(view["progress"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn test_no_run_then_execute() {
        let dir = project_with_stage("");
        let out = json_stdout(vetter(&dir).args([
            "--json",
            "kickoff",
            "--project",
            "p",
            "--user",
            "u",
            "--input",
            r#"{"idea": "clinic scheduling"}"#,
            "--no-run",
        ]));
        let run_id = out["run_id"].as_str().unwrap();

        let view = json_stdout(vetter(&dir).args(["--json", "status", run_id]));
        assert_eq!(view["run"]["status"], "pending");
        assert_eq!(view["run"]["input"]["idea"], "clinic scheduling");

        vetter(&dir)
            .args(["execute", run_id])
            .assert()
            .success()
            .stdout(predicate::str::contains("awaiting approval"));
    }

    #[test]
    fn test_missing_stage_command_fails_run() {
        let dir = TempDir::new().unwrap();
        let out = kickoff(&dir);
        assert_eq!(out["execution"]["outcome"], "failed");
        assert_eq!(out["execution"]["kind"], "stage_failed");
    }

    #[test]
    fn test_fail_command_marks_run_failed() {
        let dir = project_with_stage("");
        let out = kickoff(&dir);
        let run_id = out["run_id"].as_str().unwrap();

        vetter(&dir)
            .args(["fail", run_id, "--reason", "founder withdrew"])
            .assert()
            .success()
            .stdout(predicate::str::contains("founder withdrew"));

        let view = json_stdout(vetter(&dir).args(["--json", "status", run_id]));
        assert_eq!(view["run"]["failure"]["kind"], "operator");
        assert!(view.get("pending_approval").is_none());

        vetter(&dir)
            .args(["fail", run_id, "--reason", "again"])
            .assert()
            .failure();
    }

    #[test]
    fn test_unknown_run_is_an_error() {
        let dir = project_with_stage("");
        vetter(&dir)
            .args(["status", "no-such-run"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn test_sweep_reports_nothing_expired() {
        let dir = project_with_stage("");
        kickoff(&dir);
        vetter(&dir)
            .arg("sweep")
            .assert()
            .success()
            .stdout(predicate::str::contains("Expired 0"));
    }

    #[test]
    fn test_status_lists_runs() {
        let dir = project_with_stage("");
        let out = kickoff(&dir);
        let run_id = out["run_id"].as_str().unwrap();
        vetter(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains(run_id))
            .stdout(predicate::str::contains("clinic-app"));
    }
}
