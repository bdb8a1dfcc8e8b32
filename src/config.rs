//! Layered configuration for Vetter.
//!
//! Settings are read from `.vetter/vetter.toml` in the project directory,
//! laid over an optional user-level `vetter/vetter.toml` in the platform
//! config directory, then overridden by environment variables and finally by
//! CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [signals]
//! min_problem_resonance = 0.30
//! max_zombie_ratio = 0.70
//! profitable_ltv_cac = 3.0
//! breakeven_ltv_cac = 1.0
//! min_tam_usd = 1000000.0
//! min_fit_score = 0.70
//!
//! [routing]
//! max_pivots_per_checkpoint = 2
//! max_total_pivots = 5
//! max_iterations_per_phase = 4
//! ungated_checkpoints = ["approve_feasibility_gate"]
//!
//! [hitl]
//! ttl_days = 7
//! sweep_interval_secs = 3600
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 500
//! max_delay_ms = 30000
//!
//! [stage]
//! command = "./bin/validation-stage"
//! args = ["--json"]
//! timeout_secs = 1800
//!
//! [notify]
//! webhook_url = "https://hooks.example.com/vetter"
//!
//! [storage]
//! db_path = ".vetter/vetter.db"
//!
//! [server]
//! port = 3150
//!
//! [logging]
//! json = false
//! dir = ".vetter/logs"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Directory holding project-local state and configuration.
pub const VETTER_DIR: &str = ".vetter";
/// Configuration file name inside [`VETTER_DIR`].
pub const CONFIG_FILE: &str = "vetter.toml";

pub fn vetter_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(VETTER_DIR)
}

/// Thresholds used by the signal evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalThresholds {
    /// Resonance below this is `NO_INTEREST`.
    pub min_problem_resonance: f64,
    /// Zombie ratio at or above this is `MILD_INTEREST`.
    pub max_zombie_ratio: f64,
    /// LTV:CAC at or above this is `PROFITABLE`.
    pub profitable_ltv_cac: f64,
    /// LTV:CAC below this is `UNDERWATER`.
    pub breakeven_ltv_cac: f64,
    /// Markets smaller than this are reported as small.
    pub min_tam_usd: f64,
    /// Discovery fit score needed for `FIT_CONFIRMED`.
    pub min_fit_score: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            min_problem_resonance: 0.30,
            max_zombie_ratio: 0.70,
            profitable_ltv_cac: 3.0,
            breakeven_ltv_cac: 1.0,
            min_tam_usd: 1_000_000.0,
            min_fit_score: 0.70,
        }
    }
}

/// Loopback ceilings and gate overrides for the routing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub max_pivots_per_checkpoint: usize,
    pub max_total_pivots: usize,
    pub max_iterations_per_phase: u32,
    /// Advance/complete checkpoints that proceed without a human.
    pub ungated_checkpoints: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_pivots_per_checkpoint: 2,
            max_total_pivots: 5,
            max_iterations_per_phase: 4,
            ungated_checkpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitlConfig {
    /// Pending requests older than this are expired by the sweep.
    pub ttl_days: u32,
    /// How often the server runs the expiry sweep.
    pub sweep_interval_secs: u64,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            sweep_interval_secs: 3600,
        }
    }
}

impl HitlConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.ttl_days))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Executable invoked once per phase execution.
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Per-attempt execution budget.
    pub timeout_secs: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: 1800,
        }
    }
}

impl StageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Relative paths resolve against the project directory.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(VETTER_DIR).join("vetter.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Permissive CORS for local front-end development.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3150,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    /// When set, logs are also written to a daily rolling file here.
    pub dir: Option<PathBuf>,
}

/// Full configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VetterConfig {
    pub signals: SignalThresholds,
    pub routing: RoutingConfig,
    pub hitl: HitlConfig,
    pub retry: RetryConfig,
    pub stage: StageConfig,
    pub notify: NotifyConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl VetterConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse vetter.toml")
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Load the layered configuration for `project_dir`: user file, project
    /// file, then environment.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut merged = toml::Table::new();

        if let Some(user_file) = user_config_path()
            && user_file.exists()
        {
            merge_tables(&mut merged, read_table(&user_file)?);
        }

        let project_file = vetter_dir(project_dir).join(CONFIG_FILE);
        if project_file.exists() {
            merge_tables(&mut merged, read_table(&project_file)?);
        }

        let mut config: VetterConfig = toml::Value::Table(merged)
            .try_into()
            .context("Invalid configuration")?;
        config.apply_env();
        Ok(config)
    }

    /// Apply `VETTER_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("VETTER_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("VETTER_WEBHOOK_URL") {
            self.notify.webhook_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(cmd) = std::env::var("VETTER_STAGE_CMD") {
            self.stage.command = Some(cmd).filter(|c| !c.is_empty());
        }
        if let Ok(port) = std::env::var("VETTER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
    }

    /// Database path resolved against the project directory.
    pub fn db_path(&self, project_dir: &Path) -> PathBuf {
        if self.storage.db_path.is_absolute() {
            self.storage.db_path.clone()
        } else {
            project_dir.join(&self.storage.db_path)
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let s = &self.signals;

        for (name, value) in [
            ("signals.min_problem_resonance", s.min_problem_resonance),
            ("signals.max_zombie_ratio", s.max_zombie_ratio),
            ("signals.min_fit_score", s.min_fit_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                warnings.push(format!("{} = {} is outside 0.0..=1.0", name, value));
            }
        }
        if s.breakeven_ltv_cac > s.profitable_ltv_cac {
            warnings.push(format!(
                "signals.breakeven_ltv_cac ({}) exceeds signals.profitable_ltv_cac ({}); MARGINAL can never occur",
                s.breakeven_ltv_cac, s.profitable_ltv_cac
            ));
        }
        if self.routing.max_pivots_per_checkpoint == 0 || self.routing.max_total_pivots == 0 {
            warnings.push("routing pivot ceilings of 0 kill every pivot".to_string());
        }
        if self.routing.max_iterations_per_phase == 0 {
            warnings.push("routing.max_iterations_per_phase = 0 kills every loopback".to_string());
        }
        for checkpoint in &self.routing.ungated_checkpoints {
            match crate::routing::checkpoint(checkpoint) {
                None => warnings.push(format!(
                    "routing.ungated_checkpoints: unknown checkpoint '{}'",
                    checkpoint
                )),
                Some(spec) if spec.is_pivot_gate() => warnings.push(format!(
                    "routing.ungated_checkpoints: '{}' is a pivot gate and always requires approval",
                    checkpoint
                )),
                Some(_) => {}
            }
        }
        if self.hitl.ttl_days == 0 {
            warnings.push("hitl.ttl_days = 0 expires requests immediately".to_string());
        }
        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts = 0; stages will still run once".to_string());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            warnings.push(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            ));
        }
        if self.stage.command.is_none() {
            warnings.push(
                "stage.command is not set; runs cannot execute (set it or VETTER_STAGE_CMD)"
                    .to_string(),
            );
        }
        if let Some(url) = &self.notify.webhook_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            warnings.push(format!("notify.webhook_url '{}' is not an http(s) URL", url));
        }

        warnings
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vetter").join(CONFIG_FILE))
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    content
        .parse::<toml::Table>()
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Recursively lay `overlay` over `base`; overlay scalars and arrays win.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
