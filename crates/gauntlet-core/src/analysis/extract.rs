//! Synthesising a scenario from a transcript that has none.
//!
//! Observed values become ceilings with headroom, so the extracted
//! scenario tolerates normal run-to-run variance instead of demanding an
//! exact replay. The multipliers and floors apply uniformly to every kind
//! of scenario.

use super::{count_all, MeasurePatterns};
use crate::model::{Prompt, RegressionCheck, Scenario, Scoring};
use crate::trace::SessionEvents;
use anyhow::bail;
use std::time::Duration;

pub const DURATION_HEADROOM: f64 = 1.5;
pub const TURNS_HEADROOM: f64 = 1.3;
pub const DEPLOY_HEADROOM: f64 = 1.5;
pub const INFRA_EDIT_HEADROOM: f64 = 1.5;

pub const DURATION_FLOOR_MINUTES: u32 = 5;
pub const TURNS_FLOOR: u32 = 10;
pub const DEPLOY_FLOOR: u32 = 3;
pub const INFRA_EDIT_FLOOR: u32 = 4;

pub const MIN_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const NAME_MAX_WORDS: usize = 6;
const NAME_MAX_LEN: usize = 50;

fn with_headroom(observed: f64, factor: f64, floor: u32) -> u32 {
    ((observed * factor).ceil() as u32).max(floor)
}

/// Failure signatures every extracted scenario starts with.
pub fn starter_regressions() -> Vec<RegressionCheck> {
    vec![
        RegressionCheck::new("deployment-failed", "deployment failed", 2),
        RegressionCheck::new("quota-exceeded", "quota.*exceeded", 0),
        RegressionCheck::new(
            "permission-denied",
            "(authorization|permission) (failed|denied)",
            1,
        ),
        RegressionCheck::new("bicep-build-error", r"error BCP\d+", 2),
    ]
}

/// Scenario name derived from the first prompt: a slug of its first few
/// words, or a session-based fallback when the prompt has no usable text.
pub fn scenario_name(first_prompt: Option<&str>, session_id: &str) -> String {
    let words: Vec<&str> = first_prompt
        .unwrap_or_default()
        .split_whitespace()
        .take(NAME_MAX_WORDS)
        .collect();
    let mut name = slug::slugify(words.join(" "));
    if name.len() > NAME_MAX_LEN {
        name.truncate(NAME_MAX_LEN);
        name = name.trim_end_matches('-').to_string();
    }
    if name.is_empty() {
        let short: String = session_id.chars().take(8).collect();
        name = format!("extracted-{}", slug::slugify(short));
    }
    name
}

pub fn extract(events: &SessionEvents, patterns: &MeasurePatterns) -> anyhow::Result<Scenario> {
    let user_messages = events.user_messages();
    if user_messages.is_empty() {
        bail!(
            "session '{}' has no user messages to turn into prompts",
            events.session_id()
        );
    }
    let prompts: Vec<Prompt> = user_messages.iter().map(|m| Prompt::new(*m)).collect();

    let minutes = events.duration().as_secs_f64() / 60.0;
    let deploys = count_all(events, &patterns.deploy)?;
    let infra = count_all(events, &patterns.infra_edit)?;

    let mut skills: Vec<String> = Vec::new();
    for s in events.capabilities_invoked() {
        if !skills.iter().any(|k| k == s) {
            skills.push(s.to_string());
        }
    }

    let scoring = Scoring {
        max_duration_minutes: with_headroom(minutes, DURATION_HEADROOM, DURATION_FLOOR_MINUTES),
        max_turns: with_headroom(events.turn_count() as f64, TURNS_HEADROOM, TURNS_FLOOR),
        max_azd_up_attempts: with_headroom(deploys as f64, DEPLOY_HEADROOM, DEPLOY_FLOOR),
        max_bicep_edits: with_headroom(infra as f64, INFRA_EDIT_HEADROOM, INFRA_EDIT_FLOOR),
        must_delegate: user_messages.len() > 1,
        must_invoke_skills: skills,
        regressions: starter_regressions(),
    };

    let timeout =
        Duration::from_secs(u64::from(scoring.max_duration_minutes) * 60 * 2).max(MIN_TIMEOUT);

    let mut scenario = Scenario::new(
        scenario_name(user_messages.first().copied(), events.session_id()),
        prompts,
    );
    scenario.description = format!("Extracted from session {}", events.session_id());
    scenario.timeout = timeout;
    scenario.scoring = scoring;

    tracing::info!(
        scenario = %scenario.name,
        session_id = events.session_id(),
        prompts = scenario.prompts.len(),
        "extracted scenario"
    );
    Ok(scenario)
}
