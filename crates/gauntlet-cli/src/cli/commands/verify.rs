use super::exit_codes;
use crate::cli::args::VerifyArgs;
use gauntlet_core::config::settings::HarnessSettings;
use gauntlet_core::verify::Verifier;
use std::time::Duration;

pub async fn run(args: VerifyArgs, settings: &HarnessSettings) -> anyhow::Result<i32> {
    super::ensure_format(&args.format)?;
    let scenario = super::scenario(&args.scenario, settings)?;

    let mut verifier = Verifier::new(&args.project_dir, &args.work_dir);
    if let Some(secs) = args.timeout_secs {
        verifier = verifier.timeout(Duration::from_secs(secs));
    }
    let report = verifier.verify(&scenario, args.endpoint).await?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!(
            "Verify {} against {}",
            report.scenario,
            report.endpoint.as_deref().unwrap_or("<no endpoint>")
        );
        for s in &report.steps {
            if s.passed {
                eprintln!("  ✓ {}", s.name);
            } else {
                eprintln!(
                    "  ✗ {}: {}",
                    s.name,
                    s.message.as_deref().unwrap_or("failed")
                );
            }
        }
        if report.steps.is_empty() {
            eprintln!("  (no verify steps)");
        }
    }

    Ok(if report.passed() {
        exit_codes::OK
    } else {
        exit_codes::SCENARIO_FAILED
    })
}
