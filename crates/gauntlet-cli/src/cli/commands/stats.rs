use super::exit_codes;
use crate::cli::args::StatsArgs;
use gauntlet_core::config::settings::HarnessSettings;

pub fn run(args: StatsArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    super::ensure_format(&args.format)?;
    let store = super::open_store(settings)?;
    let stats = store.stats_best_effort()?;

    if args.format == "json" {
        let v = serde_json::json!({
            "db": settings.db_path.display().to_string(),
            "runs": stats.runs,
            "scenarios": stats.scenarios,
            "lastRunId": stats.last_run_id,
            "lastRunAt": stats.last_run_at,
            "schemaVersion": stats.version,
        });
        println!("{}", serde_json::to_string_pretty(&v)?);
    } else {
        let show = |v: Option<String>| v.unwrap_or_else(|| "-".into());
        println!("db:          {}", settings.db_path.display());
        println!("runs:        {}", show(stats.runs.map(|n| n.to_string())));
        println!("scenarios:   {}", show(stats.scenarios.map(|n| n.to_string())));
        println!(
            "last run:    {}",
            show(
                stats
                    .last_run_id
                    .map(|id| format!("#{} at {}", id, stats.last_run_at.clone().unwrap_or_default()))
            )
        );
        println!("schema:      v{}", show(stats.version));
    }
    Ok(exit_codes::OK)
}
