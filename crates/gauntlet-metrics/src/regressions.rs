use gauntlet_core::metrics_api::{Assessment, Failure, Metric};
use gauntlet_core::model::{Run, Scoring};

pub struct RegressionMetric;

impl Metric for RegressionMetric {
    fn name(&self) -> &'static str {
        "regressions"
    }

    fn assess(&self, scoring: &Scoring, run: &Run) -> Vec<Assessment> {
        scoring
            .regressions
            .iter()
            .map(|check| {
                let criterion = format!("regression:{}", check.name);
                // a run measured without this check saw no occurrences
                let occurrences = run
                    .regressions
                    .get(&check.name)
                    .map(|o| o.occurrences)
                    .unwrap_or(0);
                if occurrences <= check.max_occurrences {
                    Assessment::pass(criterion, crate::REGRESSION_WEIGHT)
                } else {
                    tracing::debug!(regression = %check.name, occurrences, "regression over allowance");
                    Assessment::fail(
                        criterion,
                        crate::REGRESSION_WEIGHT,
                        0.0,
                        Failure::RegressionExceeded {
                            name: check.name.clone(),
                            occurrences,
                            max_allowed: check.max_occurrences,
                        },
                    )
                }
            })
            .collect()
    }
}
