use crate::model::{Ceiling, Run, Scoring};
use std::fmt;

/// A scoring criterion. Implementations are pure: they read the scenario's
/// scoring block and the measured run, and return zero or more assessments
/// (zero when the scenario does not ask for this criterion).
pub trait Metric: Send + Sync {
    fn name(&self) -> &'static str;
    fn assess(&self, scoring: &Scoring, run: &Run) -> Vec<Assessment>;
}

/// Points earned against one hard criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub criterion: String,
    pub weight: f64,
    pub earned: f64,
    pub passed: bool,
    pub failure: Option<Failure>,
}

impl Assessment {
    pub fn pass(criterion: impl Into<String>, weight: f64) -> Self {
        Self {
            criterion: criterion.into(),
            weight,
            earned: weight,
            passed: true,
            failure: None,
        }
    }

    pub fn fail(criterion: impl Into<String>, weight: f64, earned: f64, failure: Failure) -> Self {
        Self {
            criterion: criterion.into(),
            weight,
            earned: earned.clamp(0.0, weight),
            passed: false,
            failure: Some(failure),
        }
    }
}

/// Why a hard criterion did not hold. Rendered into reports and into the
/// remediation prompt, so the wording is aimed at both operators and the
/// assistant.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    CeilingExceeded {
        ceiling: Ceiling,
        actual: f64,
        limit: f64,
    },
    DelegationMissing,
    SkillNotInvoked {
        name: String,
    },
    RegressionExceeded {
        name: String,
        occurrences: u32,
        max_allowed: u32,
    },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::CeilingExceeded {
                ceiling,
                actual,
                limit,
            } => write!(
                f,
                "{} exceeded: actual {} vs limit {}",
                ceiling.label(),
                trim_float(*actual),
                trim_float(*limit)
            ),
            Failure::DelegationMissing => {
                write!(f, "no sub-task delegation observed, but the scenario requires it")
            }
            Failure::SkillNotInvoked { name } => {
                write!(f, "required skill '{}' was never invoked", name)
            }
            Failure::RegressionExceeded {
                name,
                occurrences,
                max_allowed,
            } => write!(
                f,
                "regression '{}' occurred {} time(s), at most {} allowed",
                name, occurrences, max_allowed
            ),
        }
    }
}

fn trim_float(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.1}", v)
    }
}

/// Aggregate of every assessment for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scorecard {
    pub assessments: Vec<Assessment>,
}

impl Scorecard {
    pub fn new(assessments: Vec<Assessment>) -> Self {
        Self { assessments }
    }

    pub fn max_points(&self) -> f64 {
        self.assessments.iter().map(|a| a.weight).sum()
    }

    pub fn earned_points(&self) -> f64 {
        self.assessments.iter().map(|a| a.earned).sum()
    }

    /// Earned over possible points; 1.0 when nothing is scored.
    pub fn score(&self) -> f64 {
        let max = self.max_points();
        if max <= 0.0 {
            return 1.0;
        }
        (self.earned_points() / max).clamp(0.0, 1.0)
    }

    pub fn passed(&self) -> bool {
        self.assessments.iter().all(|a| a.passed)
    }

    pub fn failures(&self) -> Vec<&Failure> {
        self.assessments
            .iter()
            .filter_map(|a| a.failure.as_ref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scorecard_is_vacuous_pass() {
        let card = Scorecard::default();
        assert_eq!(card.score(), 1.0);
        assert!(card.passed());
        assert!(card.failures().is_empty());
    }

    #[test]
    fn partial_credit() {
        let card = Scorecard::new(vec![
            Assessment::pass("a", 10.0),
            Assessment::fail("b", 10.0, 5.0, Failure::DelegationMissing),
        ]);
        assert_eq!(card.score(), 0.75);
        assert!(!card.passed());
        assert_eq!(card.failures(), vec![&Failure::DelegationMissing]);
    }

    #[test]
    fn failure_wording() {
        let f = Failure::CeilingExceeded {
            ceiling: Ceiling::Turns,
            actual: 40.0,
            limit: 20.0,
        };
        assert_eq!(f.to_string(), "assistant turns exceeded: actual 40 vs limit 20");
        let f = Failure::CeilingExceeded {
            ceiling: Ceiling::Duration,
            actual: 12.34,
            limit: 10.0,
        };
        assert_eq!(
            f.to_string(),
            "duration (minutes) exceeded: actual 12.3 vs limit 10"
        );
    }
}
