use super::exit_codes;
use crate::cli::args::{DashboardArgs, JunitArgs};
use gauntlet_core::config::settings::HarnessSettings;
use gauntlet_core::report::{dashboard::write_dashboard, junit::write_junit};

pub fn cmd_dashboard(args: DashboardArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    let store = super::open_store(settings)?;
    let d = write_dashboard(&store, &args.out)?;
    eprintln!(
        "wrote dashboard for {} scenario(s), {} run(s): {}",
        d.scenarios.len(),
        d.total_runs,
        args.out.display()
    );
    Ok(exit_codes::OK)
}

pub fn cmd_junit(args: JunitArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    let store = super::open_store(settings)?;
    let runs = store.list_runs_with_details(None, None)?;
    write_junit(&args.suite, &runs, &args.out)?;
    eprintln!("wrote file: {}", args.out.display());
    Ok(exit_codes::OK)
}
