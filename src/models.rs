//! Shared domain types: run state, phase evidence, approval requests and
//! progress events.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::Phase;
use crate::signals::Signal;

// ── Run state ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    AwaitingApproval,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "awaiting_approval" => Ok(Self::AwaitingApproval),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

/// Kind of pivot recorded when a run loops back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PivotType {
    /// Target a different customer segment.
    Segment,
    /// Keep the segment, change the value proposition.
    Value,
    /// Reduce scope to what is technically achievable.
    Feature,
    /// Retest willingness to pay.
    Price,
    /// Rework the cost structure.
    Cost,
}

impl PivotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Segment => "segment",
            Self::Value => "value",
            Self::Feature => "feature",
            Self::Price => "price",
            Self::Cost => "cost",
        }
    }
}

impl fmt::Display for PivotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed loopback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PivotRecord {
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub pivot_type: PivotType,
    /// Checkpoint whose decision triggered the pivot.
    pub checkpoint: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The stage failed fatally or exhausted its retries.
    StageFailed,
    /// Routing or a human decision terminated the run.
    Killed,
    /// An operator failed the run by hand.
    Operator,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageFailed => "stage_failed",
            Self::Killed => "killed",
            Self::Operator => "operator",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Gate chosen by routing, persisted before the approval request exists.
///
/// A run found `running` with a gate marker already has its stage output
/// saved; re-invocation only has to re-issue the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingGate {
    pub checkpoint: String,
    pub phase: Phase,
    pub recommended: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Full durable state of one validation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub id: String,
    pub project_ref: String,
    pub user_ref: String,
    /// Opaque kickoff payload handed to every stage.
    #[serde(default)]
    pub input: serde_json::Value,
    pub phase: Phase,
    pub status: RunStatus,
    #[serde(default)]
    pub evidence: BTreeMap<Phase, Evidence>,
    #[serde(default)]
    pub pivot_history: Vec<PivotRecord>,
    #[serde(default)]
    pub iteration_counts: BTreeMap<Phase, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_signal: Option<Signal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<PendingGate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(project_ref: &str, user_ref: &str, input: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_ref: project_ref.to_string(),
            user_ref: user_ref.to_string(),
            input,
            phase: Phase::first(),
            status: RunStatus::Pending,
            evidence: BTreeMap::new(),
            pivot_history: Vec::new(),
            iteration_counts: BTreeMap::new(),
            last_signal: None,
            gate: None,
            failure: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Store the output of a phase. Re-runs of the same phase overwrite.
    pub fn record_evidence(&mut self, evidence: Evidence) {
        self.evidence.insert(evidence.phase(), evidence);
    }

    pub fn iterations(&self, phase: Phase) -> u32 {
        self.iteration_counts.get(&phase).copied().unwrap_or(0)
    }

    pub fn bump_iteration(&mut self, phase: Phase) -> u32 {
        let count = self.iteration_counts.entry(phase).or_insert(0);
        *count += 1;
        *count
    }

    /// Number of executed pivots that came out of `checkpoint`.
    pub fn pivots_from(&self, checkpoint: &str) -> usize {
        self.pivot_history
            .iter()
            .filter(|p| p.checkpoint == checkpoint)
            .count()
    }

    pub fn complete(&mut self) {
        let now = Utc::now();
        self.status = RunStatus::Completed;
        self.gate = None;
        self.failure = None;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        let now = Utc::now();
        self.status = RunStatus::Failed;
        self.gate = None;
        self.failure = Some(RunFailure {
            kind,
            message: message.into(),
        });
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// One line per phase with evidence, in phase order.
    pub fn evidence_summary(&self) -> String {
        if self.evidence.is_empty() {
            return "no evidence yet".to_string();
        }
        self.evidence
            .values()
            .map(|e| format!("{}: {}", e.phase(), e.summary()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Evidence ──────────────────────────────────────────────────────────

/// Result of one phase, one variant per phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Evidence {
    Discovery(DiscoveryEvidence),
    Desirability(DesirabilityEvidence),
    Feasibility(FeasibilityEvidence),
    Viability(ViabilityEvidence),
}

impl Evidence {
    pub fn phase(&self) -> Phase {
        match self {
            Evidence::Discovery(_) => Phase::Discovery,
            Evidence::Desirability(_) => Phase::Desirability,
            Evidence::Feasibility(_) => Phase::Feasibility,
            Evidence::Viability(_) => Phase::Viability,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Evidence::Discovery(d) => format!(
                "{} segment{}, fit score {:.2}",
                d.segments.len(),
                if d.segments.len() == 1 { "" } else { "s" },
                d.fit_score
            ),
            Evidence::Desirability(d) => format!(
                "{} impressions, {} clicks, {} signups",
                d.impressions, d.clicks, d.signups
            ),
            Evidence::Feasibility(f) => {
                let constrained = f
                    .components
                    .iter()
                    .filter(|c| c.status == ComponentStatus::Constrained)
                    .count();
                let impossible = f
                    .components
                    .iter()
                    .filter(|c| c.status == ComponentStatus::Impossible)
                    .count();
                format!(
                    "{} components ({} constrained, {} impossible)",
                    f.components.len(),
                    constrained,
                    impossible
                )
            }
            Evidence::Viability(v) => format!(
                "LTV ${:.0}, CAC ${:.0}, TAM ${:.0}",
                v.ltv_usd, v.cac_usd, v.tam_usd
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryEvidence {
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(default)]
    pub value_proposition: String,
    /// Problem/solution fit, 0.0 to 1.0.
    #[serde(default)]
    pub fit_score: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DesirabilityEvidence {
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub signups: u64,
    #[serde(default)]
    pub spend_usd: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Feasible,
    Constrained,
    Impossible,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentAssessment {
    pub name: String,
    pub status: ComponentStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeasibilityEvidence {
    #[serde(default)]
    pub components: Vec<ComponentAssessment>,
    #[serde(default)]
    pub monthly_cost_usd: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ViabilityEvidence {
    #[serde(default)]
    pub ltv_usd: f64,
    #[serde(default)]
    pub cac_usd: f64,
    #[serde(default)]
    pub tam_usd: f64,
}

// ── Approval requests ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HitlStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl HitlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for HitlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HitlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid approval status: {}", s)),
        }
    }
}

/// One choice offered to the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionOption {
    pub value: String,
    pub label: String,
    pub description: String,
}

/// Payload shown to the reviewer alongside the options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HitlContext {
    pub evidence_summary: String,
    pub signal: Signal,
    pub rationale: String,
    #[serde(default)]
    pub measures: BTreeMap<String, f64>,
    pub route: String,
    pub recommended_option: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HitlRequest {
    pub id: String,
    pub run_id: String,
    pub checkpoint_name: String,
    pub phase: Phase,
    pub context: HitlContext,
    pub options: Vec<DecisionOption>,
    pub recommended_option: String,
    pub status: HitlStatus,
    pub decision: Option<String>,
    pub decision_notes: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl HitlRequest {
    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|o| o.value == value)
    }
}

/// Fields needed to open a new approval request.
#[derive(Debug, Clone)]
pub struct NewHitlRequest {
    pub run_id: String,
    pub checkpoint_name: String,
    pub phase: Phase,
    pub context: HitlContext,
    pub options: Vec<DecisionOption>,
    pub recommended_option: String,
}

// ── Progress events ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Started,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for ProgressStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid progress status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub id: i64,
    pub run_id: String,
    pub phase: Phase,
    pub stage: String,
    pub status: ProgressStatus,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProgressEvent {
    pub run_id: String,
    pub phase: Phase,
    pub stage: String,
    pub status: ProgressStatus,
    pub summary: Option<String>,
}
