use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A reusable evaluation task: prompts delivered in one session plus the
/// criteria the resulting transcript is scored against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_timeout", with = "crate::config::duration")]
    pub timeout: Duration,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub scoring: Scoring,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verify: Vec<VerifyStep>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, prompts: Vec<Prompt>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            timeout: DEFAULT_TIMEOUT,
            prompts,
            scoring: Scoring::default(),
            tags: Vec::new(),
            verify: Vec::new(),
        }
    }
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success_criteria: Vec<String>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success_criteria: Vec::new(),
        }
    }
}

/// Pass/fail criteria. A zero ceiling means the metric is not scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scoring {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_duration_minutes: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_turns: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_azd_up_attempts: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_bicep_edits: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub must_delegate: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_invoke_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regressions: Vec<RegressionCheck>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A known failure signature: a case-insensitive regex over assistant
/// messages that may match at most `max_occurrences` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionCheck {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub max_occurrences: u32,
}

impl RegressionCheck {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, max_occurrences: u32) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            max_occurrences,
        }
    }
}

/// The four numeric ceilings, in scoring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ceiling {
    Duration,
    Turns,
    DeployAttempts,
    InfraEdits,
}

impl Ceiling {
    pub const ALL: [Ceiling; 4] = [
        Ceiling::Duration,
        Ceiling::Turns,
        Ceiling::DeployAttempts,
        Ceiling::InfraEdits,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Ceiling::Duration => "duration (minutes)",
            Ceiling::Turns => "assistant turns",
            Ceiling::DeployAttempts => "azd up attempts",
            Ceiling::InfraEdits => "bicep edits",
        }
    }

    /// The configured ceiling, or `None` when the scenario leaves it unset.
    pub fn limit(&self, scoring: &Scoring) -> Option<f64> {
        let v = match self {
            Ceiling::Duration => scoring.max_duration_minutes,
            Ceiling::Turns => scoring.max_turns,
            Ceiling::DeployAttempts => scoring.max_azd_up_attempts,
            Ceiling::InfraEdits => scoring.max_bicep_edits,
        };
        (v > 0).then_some(v as f64)
    }

    pub fn actual(&self, run: &Run) -> f64 {
        match self {
            Ceiling::Duration => run.duration_sec / 60.0,
            Ceiling::Turns => run.total_turns as f64,
            Ceiling::DeployAttempts => run.azd_up_attempts as f64,
            Ceiling::InfraEdits => run.bicep_edits as f64,
        }
    }
}

/// One browser-level assertion replayed by the verification runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub action: VerifyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// URL or path for `navigate`, text for `type`, file name for `screenshot`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyAction {
    Navigate,
    Click,
    Type,
    Wait,
    AssertVisible,
    AssertNotEmpty,
    Screenshot,
}

/// One scored execution of a scenario against one session transcript.
///
/// Runs are append-only: a correction is a new row, never an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub scenario: String,
    pub session_id: String,
    #[serde(default)]
    pub git_commit: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_sec: f64,
    pub total_turns: u32,
    pub azd_up_attempts: u32,
    pub bicep_edits: u32,
    pub delegated: bool,
    pub deployed: bool,
    pub score: f64,
    pub passed: bool,
    #[serde(default)]
    pub skills: BTreeMap<String, bool>,
    #[serde(default)]
    pub regressions: BTreeMap<String, RegressionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_fingerprint: Option<String>,
}

impl Run {
    pub fn new(scenario: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            session_id: session_id.into(),
            started_at: Utc::now(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionOutcome {
    pub occurrences: u32,
    pub max_allowed: u32,
    pub passed: bool,
}

impl RegressionOutcome {
    pub fn new(occurrences: u32, max_allowed: u32) -> Self {
        Self {
            occurrences,
            max_allowed,
            passed: occurrences <= max_allowed,
        }
    }
}
