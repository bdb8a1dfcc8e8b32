//! Pure evaluation of phase evidence into signals.
//!
//! No I/O and no ambient state: thresholds come from the injected
//! [`SignalThresholds`]. Missing, zero or non-finite inputs always classify
//! as the lowest-confidence signal for the phase.

use crate::config::SignalThresholds;
use crate::models::{
    ComponentStatus, DesirabilityEvidence, DiscoveryEvidence, Evidence, FeasibilityEvidence,
    ViabilityEvidence,
};

use super::types::{
    Assessment, DesirabilitySignal, FeasibilitySignal, FitSignal, Signal, ViabilitySignal,
};

/// `(clicks + signups) / impressions`, or 0 without impressions.
pub fn problem_resonance(impressions: u64, clicks: u64, signups: u64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    (clicks as f64 + signups as f64) / impressions as f64
}

/// Share of clicks that never converted, or 0 without clicks.
pub fn zombie_ratio(clicks: u64, signups: u64) -> f64 {
    if clicks == 0 {
        return 0.0;
    }
    clicks.saturating_sub(signups) as f64 / clicks as f64
}

/// `ltv / cac`, or 0 when either side is unusable.
pub fn ltv_cac_ratio(ltv: f64, cac: f64) -> f64 {
    if !ltv.is_finite() || !cac.is_finite() || cac <= 0.0 || ltv <= 0.0 {
        return 0.0;
    }
    ltv / cac
}

#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    thresholds: SignalThresholds,
}

impl SignalEvaluator {
    pub fn new(thresholds: SignalThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SignalThresholds {
        &self.thresholds
    }

    pub fn evaluate(&self, evidence: &Evidence) -> Assessment {
        match evidence {
            Evidence::Discovery(d) => self.evaluate_discovery(d),
            Evidence::Desirability(d) => self.evaluate_desirability(d),
            Evidence::Feasibility(f) => self.evaluate_feasibility(f),
            Evidence::Viability(v) => self.evaluate_viability(v),
        }
    }

    pub fn evaluate_discovery(&self, evidence: &DiscoveryEvidence) -> Assessment {
        let score = if evidence.fit_score.is_finite() {
            evidence.fit_score
        } else {
            0.0
        };
        let (signal, rationale) = if evidence.segments.is_empty() {
            (FitSignal::FitUnconfirmed, "no customer segment identified".to_string())
        } else if score >= self.thresholds.min_fit_score {
            (
                FitSignal::FitConfirmed,
                format!("fit score {:.2} meets {:.2}", score, self.thresholds.min_fit_score),
            )
        } else {
            (
                FitSignal::FitUnconfirmed,
                format!("fit score {:.2} below {:.2}", score, self.thresholds.min_fit_score),
            )
        };
        Assessment::new(Signal::Discovery(signal), rationale)
            .with_measure("fit_score", score)
            .with_measure("segments", evidence.segments.len() as f64)
    }

    pub fn evaluate_desirability(&self, evidence: &DesirabilityEvidence) -> Assessment {
        let resonance = problem_resonance(evidence.impressions, evidence.clicks, evidence.signups);
        let zombies = zombie_ratio(evidence.clicks, evidence.signups);
        let t = &self.thresholds;

        let (signal, rationale) = if resonance < t.min_problem_resonance {
            (
                DesirabilitySignal::NoInterest,
                format!(
                    "problem resonance {:.3} below {:.2}",
                    resonance, t.min_problem_resonance
                ),
            )
        } else if zombies >= t.max_zombie_ratio {
            (
                DesirabilitySignal::MildInterest,
                format!(
                    "zombie ratio {:.3} at or above {:.2}",
                    zombies, t.max_zombie_ratio
                ),
            )
        } else {
            (
                DesirabilitySignal::StrongCommitment,
                format!(
                    "problem resonance {:.3} with zombie ratio {:.3}",
                    resonance, zombies
                ),
            )
        };

        Assessment::new(Signal::Desirability(signal), rationale)
            .with_measure("problem_resonance", resonance)
            .with_measure("zombie_ratio", zombies)
    }

    pub fn evaluate_feasibility(&self, evidence: &FeasibilityEvidence) -> Assessment {
        let count = |status: ComponentStatus| {
            evidence
                .components
                .iter()
                .filter(|c| c.status == status)
                .count()
        };
        let impossible = count(ComponentStatus::Impossible);
        let constrained = count(ComponentStatus::Constrained);

        let (signal, rationale) = if evidence.components.is_empty() {
            (
                FeasibilitySignal::RedImpossible,
                "no components assessed".to_string(),
            )
        } else if impossible > 0 {
            (
                FeasibilitySignal::RedImpossible,
                format!("{} core component(s) impossible", impossible),
            )
        } else if constrained > 0 {
            (
                FeasibilitySignal::OrangeConstrained,
                format!("{} component(s) constrained", constrained),
            )
        } else {
            (
                FeasibilitySignal::Green,
                "all components feasible".to_string(),
            )
        };

        Assessment::new(Signal::Feasibility(signal), rationale)
            .with_measure("components", evidence.components.len() as f64)
            .with_measure("constrained_components", constrained as f64)
            .with_measure("impossible_components", impossible as f64)
    }

    pub fn evaluate_viability(&self, evidence: &ViabilityEvidence) -> Assessment {
        let ratio = ltv_cac_ratio(evidence.ltv_usd, evidence.cac_usd);
        let tam = if evidence.tam_usd.is_finite() {
            evidence.tam_usd.max(0.0)
        } else {
            0.0
        };
        let t = &self.thresholds;

        let (signal, rationale) = if ratio >= t.profitable_ltv_cac {
            (
                ViabilitySignal::Profitable,
                format!("LTV:CAC {:.2} meets {:.1}", ratio, t.profitable_ltv_cac),
            )
        } else if ratio >= t.breakeven_ltv_cac {
            let why = if tam < t.min_tam_usd {
                format!(
                    "LTV:CAC {:.2} in a small market (TAM ${:.0} < ${:.0})",
                    ratio, tam, t.min_tam_usd
                )
            } else {
                format!("LTV:CAC {:.2} below {:.1}", ratio, t.profitable_ltv_cac)
            };
            (ViabilitySignal::Marginal, why)
        } else {
            (
                ViabilitySignal::Underwater,
                format!("LTV:CAC {:.2} below {:.1}", ratio, t.breakeven_ltv_cac),
            )
        };

        Assessment::new(Signal::Viability(signal), rationale)
            .with_measure("ltv_cac_ratio", ratio)
            .with_measure("tam_usd", tam)
    }
}

impl Default for SignalEvaluator {
    fn default() -> Self {
        Self::new(SignalThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ComponentAssessment;

    fn desirability(impressions: u64, clicks: u64, signups: u64) -> Assessment {
        SignalEvaluator::default().evaluate_desirability(&DesirabilityEvidence {
            impressions,
            clicks,
            signups,
            spend_usd: 0.0,
        })
    }

    fn viability(ltv: f64, cac: f64, tam: f64) -> Signal {
        SignalEvaluator::default()
            .evaluate_viability(&ViabilityEvidence {
                ltv_usd: ltv,
                cac_usd: cac,
                tam_usd: tam,
            })
            .signal
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_huge_counts_do_not_overflow() {
        let resonance = problem_resonance(u64::MAX, u64::MAX, u64::MAX);
        assert!(resonance.is_finite());
        assert!(approx(resonance, 2.0));

        let assessment = desirability(1, u64::MAX, u64::MAX);
        assert_eq!(
            assessment.signal,
            Signal::Desirability(DesirabilitySignal::StrongCommitment)
        );
    }

    #[test]
    fn test_zero_impressions_never_strong() {
        for (clicks, signups) in [(0, 0), (10, 5), (1000, 1000)] {
            let a = desirability(0, clicks, signups);
            assert_eq!(a.measure("problem_resonance"), Some(0.0));
            assert_ne!(
                a.signal,
                Signal::Desirability(DesirabilitySignal::StrongCommitment)
            );
        }
    }

    #[test]
    fn test_low_resonance_is_no_interest() {
        let a = desirability(10_000, 450, 150);
        assert!(approx(a.measure("problem_resonance").unwrap(), 0.06));
        assert!(approx(a.measure("zombie_ratio").unwrap(), 0.667));
        assert_eq!(a.signal, Signal::Desirability(DesirabilitySignal::NoInterest));
    }

    #[test]
    fn test_high_zombie_ratio_is_mild_interest() {
        let a = desirability(1000, 350, 20);
        assert!(approx(a.measure("problem_resonance").unwrap(), 0.37));
        assert!(approx(a.measure("zombie_ratio").unwrap(), 0.943));
        assert_eq!(
            a.signal,
            Signal::Desirability(DesirabilitySignal::MildInterest)
        );
    }

    #[test]
    fn test_converting_audience_is_strong_commitment() {
        let a = desirability(1000, 400, 300);
        assert!(approx(a.measure("problem_resonance").unwrap(), 0.70));
        assert!(approx(a.measure("zombie_ratio").unwrap(), 0.25));
        assert_eq!(
            a.signal,
            Signal::Desirability(DesirabilitySignal::StrongCommitment)
        );
    }

    #[test]
    fn test_zombie_ratio_floors_at_zero() {
        assert_eq!(zombie_ratio(10, 50), 0.0);
        assert_eq!(zombie_ratio(0, 50), 0.0);
    }

    #[test]
    fn test_viability_classification() {
        assert_eq!(
            viability(430.0, 100.0, 500_000_000.0),
            Signal::Viability(ViabilitySignal::Profitable)
        );
        assert_eq!(
            viability(150.0, 100.0, 200_000.0),
            Signal::Viability(ViabilitySignal::Marginal)
        );
        assert_eq!(
            viability(80.0, 100.0, 10_000_000_000.0),
            Signal::Viability(ViabilitySignal::Underwater)
        );
        assert_eq!(
            viability(80.0, 100.0, 0.0),
            Signal::Viability(ViabilitySignal::Underwater)
        );
    }

    #[test]
    fn test_viability_empty_input_is_underwater() {
        assert_eq!(
            viability(0.0, 0.0, 0.0),
            Signal::Viability(ViabilitySignal::Underwater)
        );
        assert_eq!(
            viability(500.0, 0.0, 1e9),
            Signal::Viability(ViabilitySignal::Underwater)
        );
        assert_eq!(
            viability(f64::NAN, 10.0, 1e9),
            Signal::Viability(ViabilitySignal::Underwater)
        );
    }

    #[test]
    fn test_marginal_rationale_mentions_small_market() {
        let a = SignalEvaluator::default().evaluate_viability(&ViabilityEvidence {
            ltv_usd: 150.0,
            cac_usd: 100.0,
            tam_usd: 200_000.0,
        });
        assert!(a.rationale.contains("small market"));
    }

    #[test]
    fn test_feasibility_classification() {
        let eval = SignalEvaluator::default();
        let component = |name: &str, status| ComponentAssessment {
            name: name.into(),
            status,
        };

        let green = FeasibilityEvidence {
            components: vec![component("api", ComponentStatus::Feasible)],
            monthly_cost_usd: 200.0,
        };
        let orange = FeasibilityEvidence {
            components: vec![
                component("api", ComponentStatus::Feasible),
                component("realtime", ComponentStatus::Constrained),
            ],
            monthly_cost_usd: 200.0,
        };
        let red = FeasibilityEvidence {
            components: vec![
                component("realtime", ComponentStatus::Constrained),
                component("teleport", ComponentStatus::Impossible),
            ],
            monthly_cost_usd: 0.0,
        };

        assert_eq!(
            eval.evaluate_feasibility(&green).signal,
            Signal::Feasibility(FeasibilitySignal::Green)
        );
        assert_eq!(
            eval.evaluate_feasibility(&orange).signal,
            Signal::Feasibility(FeasibilitySignal::OrangeConstrained)
        );
        assert_eq!(
            eval.evaluate_feasibility(&red).signal,
            Signal::Feasibility(FeasibilitySignal::RedImpossible)
        );
        assert_eq!(
            eval.evaluate_feasibility(&FeasibilityEvidence::default()).signal,
            Signal::Feasibility(FeasibilitySignal::RedImpossible)
        );
    }

    #[test]
    fn test_discovery_requires_segment_and_score() {
        let eval = SignalEvaluator::default();
        let confirmed = DiscoveryEvidence {
            segments: vec!["indie devs".into()],
            value_proposition: "ship faster".into(),
            fit_score: 0.8,
        };
        let no_segments = DiscoveryEvidence {
            fit_score: 0.95,
            ..Default::default()
        };
        assert_eq!(
            eval.evaluate_discovery(&confirmed).signal,
            Signal::Discovery(FitSignal::FitConfirmed)
        );
        assert_eq!(
            eval.evaluate_discovery(&no_segments).signal,
            Signal::Discovery(FitSignal::FitUnconfirmed)
        );
    }

    #[test]
    fn test_injected_thresholds_are_honored() {
        let strict = SignalEvaluator::new(SignalThresholds {
            min_problem_resonance: 0.80,
            ..SignalThresholds::default()
        });
        let a = strict.evaluate_desirability(&DesirabilityEvidence {
            impressions: 1000,
            clicks: 400,
            signups: 300,
            spend_usd: 0.0,
        });
        assert_eq!(a.signal, Signal::Desirability(DesirabilitySignal::NoInterest));
    }
}
