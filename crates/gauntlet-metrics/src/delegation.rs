use gauntlet_core::metrics_api::{Assessment, Failure, Metric};
use gauntlet_core::model::{Run, Scoring};

/// All-or-nothing, and only when the scenario requires delegation.
pub struct DelegationMetric;

impl Metric for DelegationMetric {
    fn name(&self) -> &'static str {
        "delegation"
    }

    fn assess(&self, scoring: &Scoring, run: &Run) -> Vec<Assessment> {
        if !scoring.must_delegate {
            return Vec::new();
        }
        if run.delegated {
            vec![Assessment::pass(self.name(), crate::DELEGATION_WEIGHT)]
        } else {
            vec![Assessment::fail(
                self.name(),
                crate::DELEGATION_WEIGHT,
                0.0,
                Failure::DelegationMissing,
            )]
        }
    }
}
