use super::exit_codes;
use crate::cli::args::RunArgs;
use gauntlet_core::config::settings::HarnessSettings;
use gauntlet_core::engine::Assistant;
use gauntlet_core::report::console;

pub async fn run(args: RunArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    let scenario = super::scenario(&args.scenario, settings)?;
    let store = super::open_store(settings)?;
    let assistant =
        super::process_assistant(&args.assistant, settings, args.prompt_idle_secs, None);

    let handle = assistant.run_scenario(&scenario).await?;
    let analysis = super::analyze::score_session(
        &scenario,
        &handle.session_id,
        settings,
        Some(&store),
        args.assistant.git_dir.as_deref(),
    )?;
    eprintln!(
        "{}",
        console::iteration_report(1, &analysis.run, &analysis.scorecard)
    );

    Ok(if analysis.run.passed {
        exit_codes::OK
    } else {
        exit_codes::SCENARIO_FAILED
    })
}
