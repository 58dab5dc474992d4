use crate::engine::improve::LoopOutcome;
use crate::metrics_api::Scorecard;
use crate::model::Run;
use std::fmt::Write;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Human-readable result of one loop iteration.
pub fn iteration_report(iteration: u32, run: &Run, card: &Scorecard) -> String {
    let mut out = String::new();
    let icon = if run.passed { "✅" } else { "❌" };
    let _ = writeln!(
        out,
        "{} Iteration {}: {}  score {:.2}  ({})",
        icon,
        iteration,
        run.scenario,
        run.score,
        if run.passed { "PASS" } else { "FAIL" }
    );
    let _ = writeln!(out, "    Session:     {}", run.session_id);
    let _ = writeln!(
        out,
        "    Duration:    {:.1} min   Turns: {}   azd up: {}   Bicep edits: {}",
        run.duration_sec / 60.0,
        run.total_turns,
        run.azd_up_attempts,
        run.bicep_edits
    );
    let _ = writeln!(
        out,
        "    Delegated:   {}   Deployed: {}",
        yes_no(run.delegated),
        yes_no(run.deployed)
    );
    for a in &card.assessments {
        let mark = if a.passed { "✓" } else { "✗" };
        let _ = writeln!(
            out,
            "      {} {:<32} {:>5.1}/{:<5.1}",
            mark, a.criterion, a.earned, a.weight
        );
    }
    for f in card.failures() {
        let _ = writeln!(out, "      → {}", f);
    }
    out.trim_end().to_string()
}

pub fn loop_summary(scenario: &str, outcome: &LoopOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", RULE);
    let _ = writeln!(
        out,
        "Scenario {}: {} after {} iteration(s), best score {:.2}",
        scenario,
        outcome.state.to_string().to_uppercase(),
        outcome.results.len(),
        outcome.best_score
    );
    for r in &outcome.results {
        let _ = writeln!(
            out,
            "  #{:<3} {:<40} {:.2}  {}",
            r.iteration,
            r.session_id,
            r.run.score,
            if r.run.passed { "PASS" } else { "FAIL" }
        );
    }
    out.trim_end().to_string()
}

/// Table of stored runs, oldest first.
pub fn runs_table(runs: &[Run]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5}  {:<24} {:<28} {:<20} {:>6} {:>6}",
        "ID", "SCENARIO", "SESSION", "STARTED", "SCORE", "RESULT"
    );
    for r in runs {
        let _ = writeln!(
            out,
            "{:>5}  {:<24} {:<28} {:<20} {:>6.2} {:>6}",
            r.id.map(|i| i.to_string()).unwrap_or_default(),
            truncate(&r.scenario, 24),
            truncate(&r.session_id, 28),
            r.started_at.format("%Y-%m-%d %H:%M:%S"),
            r.score,
            if r.passed { "pass" } else { "fail" }
        );
    }
    if runs.is_empty() {
        out.push_str("(no runs)\n");
    }
    out
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics_api::{Assessment, Failure};

    #[test]
    fn iteration_report_lists_failures() {
        let mut run = Run::new("todo", "sess-1");
        run.score = 0.5;
        let card = Scorecard::new(vec![
            Assessment::pass("turns", 20.0),
            Assessment::fail("delegation", 10.0, 0.0, Failure::DelegationMissing),
        ]);
        let text = iteration_report(2, &run, &card);
        assert!(text.starts_with("❌ Iteration 2: todo  score 0.50  (FAIL)"));
        assert!(text.contains("✗ delegation"));
        assert!(text.contains("→ no sub-task delegation observed"));
    }

    #[test]
    fn table_truncates_long_names() {
        let run = Run::new("a-very-long-scenario-name-that-keeps-going", "s");
        let table = runs_table(&[run]);
        assert!(table.contains("a-very-long-scenario-na…"));
        assert!(runs_table(&[]).contains("(no runs)"));
    }
}
