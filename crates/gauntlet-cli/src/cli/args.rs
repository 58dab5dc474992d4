use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gauntlet",
    version,
    about = "Scenario evaluation and self-improvement loop for coding assistants"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Overrides for `GAUNTLET_*` harness settings.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Results database
    #[arg(long, global = true, env = "GAUNTLET_DB")]
    pub db: Option<PathBuf>,

    /// Directory holding `<session-id>/events.jsonl` transcripts
    #[arg(long, global = true, env = "GAUNTLET_SESSION_DIR")]
    pub session_dir: Option<PathBuf>,

    /// Directory scenarios are looked up in by name
    #[arg(long, global = true, env = "GAUNTLET_SCENARIO_DIR")]
    pub scenario_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample scenario file
    Init(InitArgs),
    /// Run a scenario once, then score and store the session
    Run(RunArgs),
    /// Score an existing session transcript against a scenario
    Analyze(AnalyzeArgs),
    /// Derive a scenario from an existing session transcript
    Extract(ExtractArgs),
    /// Run, analyze, fix and rebuild until the scenario passes
    Improve(ImproveArgs),
    /// Inspect, export or import stored runs
    Runs(RunsArgs),
    /// Regenerate the dashboard data document
    Dashboard(DashboardArgs),
    /// Write a JUnit report of the latest run per scenario
    Junit(JunitArgs),
    /// Replay a scenario's browser checks against the deployed app
    Verify(VerifyArgs),
    /// Summary of the results database
    Stats(StatsArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "scenarios/sample.yaml")]
    pub path: PathBuf,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct AssistantArgs {
    /// Assistant executable
    #[arg(long, env = "GAUNTLET_ASSISTANT")]
    pub assistant: Option<PathBuf>,

    /// Working directory the assistant is started in
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Repository whose HEAD is recorded on each run
    #[arg(long)]
    pub git_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Scenario name (looked up in the scenario dir) or path to a scenario file
    pub scenario: String,

    #[command(flatten)]
    pub assistant: AssistantArgs,

    /// Seconds of silence before the next prompt is sent
    #[arg(long, env = "GAUNTLET_PROMPT_IDLE_SECS")]
    pub prompt_idle_secs: Option<u64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    pub scenario: String,

    /// Session id under the session dir
    #[arg(long)]
    pub session: String,

    /// Score only; do not record the run
    #[arg(long)]
    pub no_store: bool,

    #[arg(long)]
    pub git_dir: Option<PathBuf>,

    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long)]
    pub session: String,

    /// Scenario file to write; defaults to `<scenario-dir>/<name>.yaml`
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ImproveArgs {
    pub scenario: String,

    #[command(flatten)]
    pub assistant: AssistantArgs,

    #[arg(long, env = "GAUNTLET_MAX_ITERS")]
    pub max_iters: Option<u32>,

    #[arg(long, env = "GAUNTLET_FIX_TIMEOUT_SECS")]
    pub fix_timeout_secs: Option<u64>,

    /// Seconds without fix-step output before it is considered stuck
    #[arg(long, env = "GAUNTLET_STUCK_SECS")]
    pub stuck_secs: Option<u64>,

    #[arg(long, env = "GAUNTLET_PROMPT_IDLE_SECS")]
    pub prompt_idle_secs: Option<u64>,

    /// Command that rebuilds the assistant after a fix
    #[arg(long, env = "GAUNTLET_BUILD_CMD")]
    pub build_cmd: Option<String>,

    /// Command that tests the rebuilt assistant
    #[arg(long, env = "GAUNTLET_TEST_CMD")]
    pub test_cmd: Option<String>,

    /// Path the assistant may edit while fixing itself (repeatable)
    #[arg(long = "editable")]
    pub editable: Vec<String>,

    /// Path the assistant must not touch (repeatable)
    #[arg(long = "vendored")]
    pub vendored: Vec<String>,

    /// Command the assistant is told to run before finishing a fix
    #[arg(long)]
    pub verify_cmd: Option<String>,

    #[arg(long, default_value = ".gauntlet/dashboard.json")]
    pub dashboard: PathBuf,
}

#[derive(Parser, Clone)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub cmd: RunsSub,
}

#[derive(Subcommand, Clone)]
pub enum RunsSub {
    /// List stored runs, oldest first
    List(RunsListArgs),
    /// Write every stored run to a JSON file
    Export(RunsExportArgs),
    /// Add runs from an exported JSON file, skipping ones already stored
    Import(RunsImportArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunsListArgs {
    #[arg(long)]
    pub scenario: Option<String>,

    /// Only the newest N runs
    #[arg(long)]
    pub last: Option<u32>,

    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunsExportArgs {
    #[arg(long, default_value = "gauntlet-runs.json")]
    pub out: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunsImportArgs {
    pub file: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DashboardArgs {
    #[arg(long, default_value = ".gauntlet/dashboard.json")]
    pub out: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct JunitArgs {
    #[arg(long, default_value = "junit.xml")]
    pub out: PathBuf,

    #[arg(long, default_value = "gauntlet")]
    pub suite: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct VerifyArgs {
    pub scenario: String,

    /// Project whose `.azure/` environment holds the deployed endpoint
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Use this endpoint instead of discovering one
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Where the generated browser script is written and run
    #[arg(long, default_value = ".gauntlet/verify")]
    pub work_dir: PathBuf,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatsArgs {
    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}
