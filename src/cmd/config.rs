//! Configuration view and validation commands: `vetter config`.

use anyhow::Result;
use std::path::Path;

use vetter::config::{CONFIG_FILE, VetterConfig, vetter_dir};

use super::super::ConfigCommands;

pub fn cmd_config(
    project_dir: &Path,
    effective: &VetterConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let dir = vetter_dir(project_dir);
    let config_path = dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Vetter Configuration");
            println!("====================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!("Run 'vetter config init' to create one.");
            }
            println!("Database:    {}", effective.db_path(project_dir).display());
            println!();
            println!("Effective values (with env overrides):");
            println!();
            print!("{}", effective.to_toml_string()?);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = effective.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            std::fs::create_dir_all(&dir)?;
            VetterConfig::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [signals] evidence thresholds");
            println!("  - [routing] pivot and iteration ceilings, ungated checkpoints");
            println!("  - [stage] the command that runs each phase");
            println!();
        }
    }

    Ok(())
}
