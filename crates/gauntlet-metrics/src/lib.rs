use std::sync::Arc;

use gauntlet_core::metrics_api::Metric;
use gauntlet_core::model::Ceiling;

pub mod ceiling;
mod delegation;
mod regressions;
mod skills;

pub use ceiling::CeilingMetric;
pub use delegation::DelegationMetric;
pub use regressions::RegressionMetric;
pub use skills::SkillMetric;

pub const DURATION_WEIGHT: f64 = 25.0;
pub const TURNS_WEIGHT: f64 = 20.0;
pub const DEPLOY_ATTEMPTS_WEIGHT: f64 = 20.0;
pub const INFRA_EDITS_WEIGHT: f64 = 10.0;
pub const DELEGATION_WEIGHT: f64 = 10.0;
pub const SKILL_WEIGHT: f64 = 5.0;
pub const REGRESSION_WEIGHT: f64 = 5.0;

pub fn default_metrics() -> Vec<Arc<dyn Metric>> {
    let mut metrics: Vec<Arc<dyn Metric>> = Ceiling::ALL
        .iter()
        .map(|c| Arc::new(CeilingMetric::new(*c)) as Arc<dyn Metric>)
        .collect();
    metrics.push(Arc::new(DelegationMetric));
    metrics.push(Arc::new(SkillMetric));
    metrics.push(Arc::new(RegressionMetric));
    metrics
}

/// A scorer carrying every default metric.
pub fn default_scorer() -> gauntlet_core::analysis::Scorer {
    gauntlet_core::analysis::Scorer::new(default_metrics())
}
