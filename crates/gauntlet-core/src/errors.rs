use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("scenario {} has no prompts", .path.display())]
    NoPrompts { path: PathBuf },

    #[error("scenario '{scenario}': regression '{name}' has an invalid pattern: {source}")]
    InvalidRegex {
        scenario: String,
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid timeout '{0}' (expected e.g. 45m, 1h30m, 90s)")]
    InvalidTimeout(String),

    #[error("failed to write scenario {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize scenario: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("scenario '{name}' not found in {}{}", .dir.display(), did_you_mean(.suggestion))]
    NotFound {
        name: String,
        dir: PathBuf,
        suggestion: Option<String>,
    },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{}'?)", s))
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("no transcript for session '{session_id}' at {}", .path.display())]
    NotFound { session_id: String, path: PathBuf },

    #[error("failed to read transcript {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
