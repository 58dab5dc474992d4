use crate::model::Run;
use std::collections::BTreeMap;
use std::path::Path;

/// One `<testcase>` per scenario, taken from its latest run.
pub fn write_junit(suite: &str, runs: &[Run], out: &Path) -> anyhow::Result<()> {
    let mut latest: BTreeMap<&str, &Run> = BTreeMap::new();
    for r in runs {
        // runs arrive oldest first, so later entries win
        latest.insert(r.scenario.as_str(), r);
    }
    let failures = latest.values().filter(|r| !r.passed).count();

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuite name="{}" tests="{}" failures="{}">"#,
        escape(suite),
        latest.len(),
        failures
    ));
    xml.push('\n');

    for (name, r) in &latest {
        xml.push_str(&format!(
            r#"  <testcase name="{}" classname="{}" time="{:.1}">"#,
            escape(name),
            escape(suite),
            r.duration_sec
        ));
        if !r.passed {
            xml.push_str(&format!(
                r#"<failure message="{}"/>"#,
                escape(&failure_message(r))
            ));
        }
        xml.push_str(&format!(
            "<system-out>session {} score {:.2}</system-out>",
            escape(&r.session_id),
            r.score
        ));
        xml.push_str("</testcase>\n");
    }

    xml.push_str("</testsuite>\n");
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, xml)?;
    Ok(())
}

fn failure_message(r: &Run) -> String {
    let mut parts = vec![format!("score {:.2}", r.score)];
    for (skill, invoked) in &r.skills {
        if !invoked {
            parts.push(format!("skill '{}' not invoked", skill));
        }
    }
    for (name, o) in &r.regressions {
        if !o.passed {
            parts.push(format!(
                "regression '{}' {}/{}",
                name, o.occurrences, o.max_allowed
            ));
        }
    }
    parts.join("; ")
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
