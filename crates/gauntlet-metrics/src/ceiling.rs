use gauntlet_core::metrics_api::{Assessment, Failure, Metric};
use gauntlet_core::model::{Ceiling, Run, Scoring};

/// One numeric ceiling. Within the limit earns the full weight; over it
/// earns `weight * limit / actual`, which shrinks with the overage but
/// never reaches zero.
pub struct CeilingMetric {
    ceiling: Ceiling,
    weight: f64,
}

impl CeilingMetric {
    pub fn new(ceiling: Ceiling) -> Self {
        let weight = match ceiling {
            Ceiling::Duration => crate::DURATION_WEIGHT,
            Ceiling::Turns => crate::TURNS_WEIGHT,
            Ceiling::DeployAttempts => crate::DEPLOY_ATTEMPTS_WEIGHT,
            Ceiling::InfraEdits => crate::INFRA_EDITS_WEIGHT,
        };
        Self { ceiling, weight }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

pub fn points(weight: f64, limit: f64, actual: f64) -> f64 {
    if actual <= limit {
        weight
    } else {
        weight * limit / actual
    }
}

impl Metric for CeilingMetric {
    fn name(&self) -> &'static str {
        match self.ceiling {
            Ceiling::Duration => "duration",
            Ceiling::Turns => "turns",
            Ceiling::DeployAttempts => "deploy_attempts",
            Ceiling::InfraEdits => "infra_edits",
        }
    }

    fn assess(&self, scoring: &Scoring, run: &Run) -> Vec<Assessment> {
        let Some(limit) = self.ceiling.limit(scoring) else {
            return Vec::new(); // not scored
        };
        let actual = self.ceiling.actual(run);
        let earned = points(self.weight, limit, actual);
        if actual <= limit {
            vec![Assessment::pass(self.name(), self.weight)]
        } else {
            vec![Assessment::fail(
                self.name(),
                self.weight,
                earned,
                Failure::CeilingExceeded {
                    ceiling: self.ceiling,
                    actual,
                    limit,
                },
            )]
        }
    }
}
