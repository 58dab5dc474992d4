use gauntlet_core::metrics_api::{Assessment, Failure, Metric};
use gauntlet_core::model::{Run, Scoring};

pub struct SkillMetric;

impl Metric for SkillMetric {
    fn name(&self) -> &'static str {
        "skills"
    }

    fn assess(&self, scoring: &Scoring, run: &Run) -> Vec<Assessment> {
        scoring
            .must_invoke_skills
            .iter()
            .map(|skill| {
                let criterion = format!("skill:{}", skill);
                if run.skills.get(skill).copied().unwrap_or(false) {
                    Assessment::pass(criterion, crate::SKILL_WEIGHT)
                } else {
                    Assessment::fail(
                        criterion,
                        crate::SKILL_WEIGHT,
                        0.0,
                        Failure::SkillNotInvoked {
                            name: skill.clone(),
                        },
                    )
                }
            })
            .collect()
    }
}
