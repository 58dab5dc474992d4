use super::exit_codes;
use crate::cli::args::InitArgs;
use gauntlet_core::config::write_sample_scenario;

pub fn run(args: InitArgs) -> anyhow::Result<i32> {
    if args.path.exists() {
        eprintln!("note: {} already exists", args.path.display());
        return Ok(exit_codes::OK);
    }
    write_sample_scenario(&args.path)?;
    eprintln!("created {}", args.path.display());
    Ok(exit_codes::OK)
}
