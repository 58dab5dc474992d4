use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_STUCK_AFTER: Duration = Duration::from_secs(120);
pub const DEFAULT_PROMPT_IDLE: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Process-wide harness settings, read from `GAUNTLET_*` environment
/// variables. CLI flags override individual fields.
#[derive(Clone, Debug)]
pub struct HarnessSettings {
    pub db_path: PathBuf,
    pub session_dir: PathBuf,
    pub scenario_dir: PathBuf,
    pub assistant: PathBuf,
    pub build_command: Option<String>,
    pub test_command: Option<String>,
    pub fix_timeout: Duration,
    pub stuck_after: Duration,
    pub prompt_idle: Duration,
    pub max_iterations: u32,
    pub log_level: String,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".gauntlet/results.db"),
            session_dir: default_session_dir(),
            scenario_dir: PathBuf::from("scenarios"),
            assistant: PathBuf::from("copilot"),
            build_command: None,
            test_command: None,
            fix_timeout: DEFAULT_FIX_TIMEOUT,
            stuck_after: DEFAULT_STUCK_AFTER,
            prompt_idle: DEFAULT_PROMPT_IDLE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            log_level: "info".to_string(),
        }
    }
}

impl HarnessSettings {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("GAUNTLET_DB") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("GAUNTLET_SESSION_DIR") {
            cfg.session_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("GAUNTLET_SCENARIO_DIR") {
            cfg.scenario_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("GAUNTLET_ASSISTANT") {
            cfg.assistant = PathBuf::from(v);
        }
        if let Ok(v) = env::var("GAUNTLET_BUILD_CMD") {
            cfg.build_command = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("GAUNTLET_TEST_CMD") {
            cfg.test_command = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(d) = env_secs("GAUNTLET_FIX_TIMEOUT_SECS") {
            cfg.fix_timeout = d;
        }
        if let Some(d) = env_secs("GAUNTLET_STUCK_SECS") {
            cfg.stuck_after = d;
        }
        if let Some(d) = env_secs("GAUNTLET_PROMPT_IDLE_SECS") {
            cfg.prompt_idle = d;
        }
        if let Ok(v) = env::var("GAUNTLET_MAX_ITERS") {
            if let Ok(n) = v.parse() {
                cfg.max_iterations = n;
            }
        }
        if let Ok(v) = env::var("GAUNTLET_LOG") {
            cfg.log_level = v;
        }
        cfg
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn default_session_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".copilot")
        .join("session-state")
}
