//! Project setup: `vetter init`.

use anyhow::{Context, Result};
use std::path::Path;

use vetter::config::{CONFIG_FILE, VetterConfig, vetter_dir};

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let dir = vetter_dir(project_dir);
    let config_path = dir.join(CONFIG_FILE);

    if config_path.exists() {
        println!("Already initialized: {}", config_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    VetterConfig::default().save(&config_path)?;

    println!();
    println!(
        "{} {}",
        console::style("Initialized").green().bold(),
        config_path.display()
    );
    println!();
    println!("Next steps:");
    println!("  - set [stage].command to the program that runs each phase");
    println!("  - optionally set [notify].webhook_url for approval notifications");
    println!("  - start a run with 'vetter kickoff --project <ref> --user <ref>'");
    println!();
    Ok(())
}
