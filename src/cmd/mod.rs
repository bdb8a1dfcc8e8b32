//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                              |
//! |-----------|-----------------------------------------------|
//! | `project` | `Init`                                        |
//! | `run`     | `Kickoff`, `Execute`, `Decide`, `Fail`, `Sweep` |
//! | `status`  | `Status`, `Checkpoints`                       |
//! | `serve`   | `Serve`                                       |
//! | `config`  | `Config`                                      |

pub mod config;
pub mod project;
pub mod run;
pub mod serve;
pub mod status;

pub use config::cmd_config;
pub use project::cmd_init;
pub use run::{cmd_decide, cmd_execute, cmd_fail, cmd_kickoff, cmd_sweep};
pub use serve::cmd_serve;
pub use status::{cmd_checkpoints, cmd_status};

use anyhow::{Context, Result};
use std::path::Path;

use vetter::config::VetterConfig;
use vetter::service::ValidationService;

fn open_service(project_dir: &Path, config: VetterConfig) -> Result<ValidationService> {
    ValidationService::open(config, project_dir).context("Failed to open validation service")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
