//! Turning a transcript into a scored [`Run`].

use crate::fingerprint::scenario_fingerprint;
use crate::metrics_api::{Metric, Scorecard};
use crate::model::{RegressionOutcome, Run, Scenario, Scoring};
use crate::trace::session::DELEGATION_TOOL;
use crate::trace::SessionEvents;
use anyhow::Context;
use std::sync::Arc;

pub mod extract;

/// A tool call counted when its name equals `tool` and its raw arguments
/// match `args` (a regex; empty matches everything).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPattern {
    pub tool: String,
    pub args: String,
}

impl ToolPattern {
    pub fn new(tool: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            args: args.into(),
        }
    }
}

/// Which tool calls count as deploy attempts, infra edits and delegation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurePatterns {
    pub deploy: Vec<ToolPattern>,
    pub infra_edit: Vec<ToolPattern>,
    pub delegation_tool: String,
}

impl Default for MeasurePatterns {
    fn default() -> Self {
        Self {
            deploy: vec![
                ToolPattern::new("powershell", "azd up"),
                ToolPattern::new("bash", "azd up"),
            ],
            infra_edit: vec![
                ToolPattern::new("edit", r"\.bicep"),
                ToolPattern::new("create", r"\.bicep"),
            ],
            delegation_tool: DELEGATION_TOOL.to_string(),
        }
    }
}

fn count_all(events: &SessionEvents, patterns: &[ToolPattern]) -> anyhow::Result<u32> {
    let mut total = 0usize;
    for p in patterns {
        total += events
            .count_tool_calls_matching(&p.tool, &p.args)
            .with_context(|| format!("invalid argument pattern for tool '{}'", p.tool))?;
    }
    Ok(total as u32)
}

/// Computes every measured field of a run. `score` and `passed` are left
/// for [`Scorer::score`].
pub fn measure(
    events: &SessionEvents,
    scenario: &Scenario,
    patterns: &MeasurePatterns,
    git_commit: Option<String>,
) -> anyhow::Result<Run> {
    let mut run = Run::new(&scenario.name, events.session_id());
    if let Some(t) = events.first_timestamp() {
        run.started_at = t;
    }
    run.git_commit = git_commit;
    run.duration_sec = events.duration().as_secs_f64();
    run.total_turns = events.turn_count() as u32;
    run.azd_up_attempts = count_all(events, &patterns.deploy)?;
    run.bicep_edits = count_all(events, &patterns.infra_edit)?;
    run.delegated = events.has_tool_call(&patterns.delegation_tool);
    // no structured deploy-success event exists; any attempt is the proxy
    run.deployed = run.azd_up_attempts > 0;

    let invoked = events.capabilities_invoked();
    for skill in &scenario.scoring.must_invoke_skills {
        run.skills
            .insert(skill.clone(), invoked.contains(&skill.as_str()));
    }

    for check in &scenario.scoring.regressions {
        let n = events
            .count_regression_matches(&check.pattern)
            .with_context(|| format!("invalid pattern for regression '{}'", check.name))?;
        run.regressions.insert(
            check.name.clone(),
            RegressionOutcome::new(n as u32, check.max_occurrences),
        );
    }

    run.scenario_fingerprint = Some(scenario_fingerprint(scenario)?);
    Ok(run)
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub run: Run,
    pub scorecard: Scorecard,
}

/// Measures transcripts and scores them with a fixed set of metrics.
/// Holds no state between calls.
#[derive(Clone)]
pub struct Scorer {
    metrics: Vec<Arc<dyn Metric>>,
    patterns: MeasurePatterns,
}

impl Scorer {
    pub fn new(metrics: Vec<Arc<dyn Metric>>) -> Self {
        Self {
            metrics,
            patterns: MeasurePatterns::default(),
        }
    }

    pub fn with_patterns(mut self, patterns: MeasurePatterns) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn patterns(&self) -> &MeasurePatterns {
        &self.patterns
    }

    pub fn analyze(
        &self,
        events: &SessionEvents,
        scenario: &Scenario,
        git_commit: Option<String>,
    ) -> anyhow::Result<Analysis> {
        let mut run = measure(events, scenario, &self.patterns, git_commit)?;
        let scorecard = self.score(&scenario.scoring, &mut run);
        tracing::debug!(
            scenario = %scenario.name,
            session_id = %run.session_id,
            score = run.score,
            passed = run.passed,
            "analyzed run"
        );
        Ok(Analysis { run, scorecard })
    }

    /// Applies every metric to an already-measured run and writes the
    /// resulting `score` and `passed` back onto it.
    pub fn score(&self, scoring: &Scoring, run: &mut Run) -> Scorecard {
        let assessments = self
            .metrics
            .iter()
            .flat_map(|m| m.assess(scoring, run))
            .collect();
        let card = Scorecard::new(assessments);
        run.score = card.score();
        run.passed = card.passed();
        card
    }
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorer")
            .field(
                "metrics",
                &self.metrics.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("patterns", &self.patterns)
            .finish()
    }
}
