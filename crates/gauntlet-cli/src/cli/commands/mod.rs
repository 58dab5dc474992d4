use super::args::*;
use gauntlet_core::config::resolve_scenario;
use gauntlet_core::config::settings::HarnessSettings;
use gauntlet_core::engine::ProcessAssistant;
use gauntlet_core::model::Scenario;
use gauntlet_core::storage::Store;
use gauntlet_core::trace::TranscriptLocator;
use std::time::Duration;

pub mod analyze;
pub mod improve;
pub mod init;
pub mod report;
pub mod run;
pub mod runs;
pub mod stats;
pub mod verify;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const SCENARIO_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli, mut settings: HarnessSettings) -> anyhow::Result<i32> {
    apply_overrides(&mut settings, &cli.global);
    tracing::debug!(settings = ?settings, "harness settings");

    match cli.cmd {
        Command::Init(args) => init::run(args),
        Command::Run(args) => run::run(args, &settings).await,
        Command::Analyze(args) => analyze::cmd_analyze(args, &settings),
        Command::Extract(args) => analyze::cmd_extract(args, &settings),
        Command::Improve(args) => improve::run(args, &settings).await,
        Command::Runs(args) => match args.cmd {
            RunsSub::List(a) => runs::cmd_list(a, &settings),
            RunsSub::Export(a) => runs::cmd_export(a, &settings),
            RunsSub::Import(a) => runs::cmd_import(a, &settings),
        },
        Command::Dashboard(args) => report::cmd_dashboard(args, &settings),
        Command::Junit(args) => report::cmd_junit(args, &settings),
        Command::Verify(args) => verify::run(args, &settings).await,
        Command::Stats(args) => stats::run(args, &settings),
    }
}

fn apply_overrides(settings: &mut HarnessSettings, global: &GlobalArgs) {
    if let Some(p) = &global.db {
        settings.db_path = p.clone();
    }
    if let Some(p) = &global.session_dir {
        settings.session_dir = p.clone();
    }
    if let Some(p) = &global.scenario_dir {
        settings.scenario_dir = p.clone();
    }
}

pub(crate) fn scenario(name_or_path: &str, settings: &HarnessSettings) -> anyhow::Result<Scenario> {
    Ok(resolve_scenario(name_or_path, &settings.scenario_dir)?)
}

pub(crate) fn open_store(settings: &HarnessSettings) -> anyhow::Result<Store> {
    Store::open(&settings.db_path)
}

pub(crate) fn locator(settings: &HarnessSettings) -> TranscriptLocator {
    TranscriptLocator::new(&settings.session_dir)
}

pub(crate) fn process_assistant(
    args: &AssistantArgs,
    settings: &HarnessSettings,
    prompt_idle_secs: Option<u64>,
    stuck_secs: Option<u64>,
) -> ProcessAssistant {
    let binary = args
        .assistant
        .clone()
        .unwrap_or_else(|| settings.assistant.clone());
    let mut assistant = ProcessAssistant::new(binary, locator(settings))
        .prompt_idle(
            prompt_idle_secs
                .map(Duration::from_secs)
                .unwrap_or(settings.prompt_idle),
        )
        .stuck_after(
            stuck_secs
                .map(Duration::from_secs)
                .unwrap_or(settings.stuck_after),
        );
    if let Some(dir) = &args.workdir {
        assistant = assistant.workdir(dir);
    }
    assistant
}

pub(crate) fn ensure_format(format: &str) -> anyhow::Result<()> {
    match format {
        "text" | "json" => Ok(()),
        other => anyhow::bail!("unknown format '{}' (expected text or json)", other),
    }
}
