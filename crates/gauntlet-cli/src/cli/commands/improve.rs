use super::exit_codes;
use crate::cli::args::ImproveArgs;
use gauntlet_core::config::settings::HarnessSettings;
use gauntlet_core::engine::{CommandRebuilder, Controller, LoopConfig};
use gauntlet_metrics::default_scorer;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: ImproveArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    let scenario = super::scenario(&args.scenario, settings)?;
    let store = super::open_store(settings)?;

    let build = args.build_cmd.as_deref().or(settings.build_command.as_deref());
    let test = args.test_cmd.as_deref().or(settings.test_command.as_deref());
    let mut rebuilder = CommandRebuilder::from_commands(build, test)?;
    if let Some(dir) = &args.assistant.workdir {
        rebuilder = rebuilder.workdir(dir);
    }
    if rebuilder.is_noop() {
        tracing::warn!("no build or test command set; fixes are re-run without rebuilding");
    }

    let assistant =
        super::process_assistant(&args.assistant, settings, args.prompt_idle_secs, args.stuck_secs);

    let config = LoopConfig {
        max_iterations: args.max_iters.unwrap_or(settings.max_iterations),
        fix_timeout: args
            .fix_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(settings.fix_timeout),
        editable_paths: args.editable,
        vendored_paths: args.vendored,
        verify_command: args.verify_cmd,
        dashboard_path: Some(args.dashboard),
        git_dir: args.assistant.git_dir.clone(),
    };

    let controller = Controller::new(
        Arc::new(assistant),
        Arc::new(rebuilder),
        default_scorer(),
        store,
        super::locator(settings),
        config,
    );

    match controller.run(&scenario).await {
        Ok(outcome) if outcome.passed() => Ok(exit_codes::OK),
        Ok(_) => Ok(exit_codes::SCENARIO_FAILED),
        Err(e) => {
            eprintln!(
                "error: {} ({} iteration(s) completed and stored)",
                e,
                e.completed.len()
            );
            Ok(exit_codes::CONFIG_ERROR)
        }
    }
}
