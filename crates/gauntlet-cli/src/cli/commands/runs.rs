use super::exit_codes;
use crate::cli::args::{RunsExportArgs, RunsImportArgs, RunsListArgs};
use gauntlet_core::config::settings::HarnessSettings;
use gauntlet_core::report::console;

pub fn cmd_list(args: RunsListArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    super::ensure_format(&args.format)?;
    let store = super::open_store(settings)?;

    if args.format == "json" {
        let runs = store.list_runs_with_details(args.scenario.as_deref(), args.last)?;
        println!("{}", serde_json::to_string_pretty(&runs)?);
    } else {
        let runs = store.list_runs(args.scenario.as_deref(), args.last)?;
        print!("{}", console::runs_table(&runs));
    }
    Ok(exit_codes::OK)
}

pub fn cmd_export(args: RunsExportArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    let store = super::open_store(settings)?;
    let n = store.export_json(&args.out)?;
    eprintln!("exported {} run(s) to {}", n, args.out.display());
    Ok(exit_codes::OK)
}

pub fn cmd_import(args: RunsImportArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    let store = super::open_store(settings)?;
    let n = store.import_json(&args.file)?;
    eprintln!("imported {} new run(s) from {}", n, args.file.display());
    Ok(exit_codes::OK)
}
