//! Phase definitions for a validation run.
//!
//! A run moves through four ordered phases. Progression is monotonic except
//! for explicit pivots, which send the run back to an earlier phase.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One stage of the gated pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Market discovery: customer segments and value proposition.
    Discovery,
    /// Experiment execution: ad/landing-page tests measuring demand.
    Desirability,
    /// Technical feasibility of the core features.
    Feasibility,
    /// Unit economics and market size.
    Viability,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Discovery,
        Phase::Desirability,
        Phase::Feasibility,
        Phase::Viability,
    ];

    pub fn first() -> Self {
        Phase::Discovery
    }

    /// Ordinal, 1-based.
    pub fn number(self) -> u8 {
        match self {
            Phase::Discovery => 1,
            Phase::Desirability => 2,
            Phase::Feasibility => 3,
            Phase::Viability => 4,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Phase::ALL.into_iter().find(|p| p.number() == number)
    }

    /// The phase after this one, or `None` for the last phase.
    pub fn next(self) -> Option<Self> {
        Phase::from_number(self.number() + 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::Desirability => "desirability",
            Phase::Feasibility => "feasibility",
            Phase::Viability => "viability",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Phase::Discovery => "Market discovery",
            Phase::Desirability => "Experiment execution",
            Phase::Feasibility => "Feasibility assessment",
            Phase::Viability => "Unit economics",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<u8>() {
            return Phase::from_number(n)
                .ok_or_else(|| anyhow::anyhow!("Phase number {} out of range 1..=4", n));
        }
        match s.to_lowercase().as_str() {
            "discovery" => Ok(Phase::Discovery),
            "desirability" => Ok(Phase::Desirability),
            "feasibility" => Ok(Phase::Feasibility),
            "viability" => Ok(Phase::Viability),
            _ => anyhow::bail!(
                "Invalid phase '{}'. Valid values: discovery, desirability, feasibility, viability",
                s
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordinals_are_one_based_and_ordered() {
        let numbers: Vec<u8> = Phase::ALL.iter().map(|p| p.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(Phase::Discovery < Phase::Viability);
    }

    #[test]
    fn test_next_stops_after_viability() {
        assert_eq!(Phase::Discovery.next(), Some(Phase::Desirability));
        assert_eq!(Phase::Feasibility.next(), Some(Phase::Viability));
        assert_eq!(Phase::Viability.next(), None);
    }

    #[test]
    fn test_parse_by_name_or_number() {
        assert_eq!("Feasibility".parse::<Phase>().unwrap(), Phase::Feasibility);
        assert_eq!("2".parse::<Phase>().unwrap(), Phase::Desirability);
        assert!("9".parse::<Phase>().is_err());
        assert!("launch".parse::<Phase>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Phase::Viability).unwrap();
        assert_eq!(json, "\"viability\"");
        let back: Phase = serde_json::from_str("\"discovery\"").unwrap();
        assert_eq!(back, Phase::Discovery);
    }
}
