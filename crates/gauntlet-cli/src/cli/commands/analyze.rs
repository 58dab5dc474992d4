use super::exit_codes;
use crate::cli::args::{AnalyzeArgs, ExtractArgs};
use gauntlet_core::analysis::{extract::extract, Analysis};
use gauntlet_core::config::{save_scenario, settings::HarnessSettings};
use gauntlet_core::model::Scenario;
use gauntlet_core::provenance::git_commit;
use gauntlet_core::report::console;
use gauntlet_core::storage::Store;
use gauntlet_metrics::default_scorer;
use std::path::Path;

/// Scores `session_id` against `scenario` and, when a store is given,
/// records the run.
pub(crate) fn score_session(
    scenario: &Scenario,
    session_id: &str,
    settings: &HarnessSettings,
    store: Option<&Store>,
    git_dir: Option<&Path>,
) -> anyhow::Result<Analysis> {
    let events = super::locator(settings).load(session_id)?;
    let commit = git_dir.and_then(git_commit);
    let mut analysis = default_scorer().analyze(&events, scenario, commit)?;
    if let Some(store) = store {
        analysis.run.id = Some(store.insert_run(&analysis.run)?);
    }
    Ok(analysis)
}

pub fn cmd_analyze(args: AnalyzeArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    super::ensure_format(&args.format)?;
    let scenario = super::scenario(&args.scenario, settings)?;
    let store = if args.no_store {
        None
    } else {
        Some(super::open_store(settings)?)
    };

    let analysis = score_session(
        &scenario,
        &args.session,
        settings,
        store.as_ref(),
        args.git_dir.as_deref(),
    )?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&analysis.run)?);
    } else {
        eprintln!(
            "{}",
            console::iteration_report(1, &analysis.run, &analysis.scorecard)
        );
    }

    Ok(if analysis.run.passed {
        exit_codes::OK
    } else {
        exit_codes::SCENARIO_FAILED
    })
}

pub fn cmd_extract(args: ExtractArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    let events = super::locator(settings).load(&args.session)?;
    let scenario = extract(&events, default_scorer().patterns())?;

    let out = args
        .out
        .unwrap_or_else(|| settings.scenario_dir.join(format!("{}.yaml", scenario.name)));
    if out.exists() && !args.force {
        eprintln!(
            "config error: {} already exists (use --force to overwrite)",
            out.display()
        );
        return Ok(exit_codes::CONFIG_ERROR);
    }

    save_scenario(&scenario, &out)?;
    eprintln!(
        "extracted scenario '{}' ({} prompt(s)) to {}",
        scenario.name,
        scenario.prompts.len(),
        out.display()
    );
    Ok(exit_codes::OK)
}
