//! Data behind the trend dashboard. Rendering is someone else's job; this
//! only produces the JSON document.

use crate::model::Run;
use crate::storage::Store;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    pub total_runs: usize,
    pub scenarios: Vec<ScenarioTrend>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioTrend {
    pub name: String,
    pub runs: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub best_score: f64,
    pub latest_score: f64,
    pub latest_passed: bool,
    pub trend: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub run_id: Option<i64>,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub score: f64,
    pub passed: bool,
    pub duration_sec: f64,
    pub total_turns: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    /// Set on the first run scored against a changed scenario definition.
    pub definition_changed: bool,
}

pub fn build_dashboard(runs: &[Run]) -> Dashboard {
    let mut by_scenario: BTreeMap<&str, Vec<&Run>> = BTreeMap::new();
    for r in runs {
        by_scenario.entry(r.scenario.as_str()).or_default().push(r);
    }

    let scenarios = by_scenario
        .into_iter()
        .filter_map(|(name, series)| {
            let latest = *series.last()?;
            let passed = series.iter().filter(|r| r.passed).count();
            let mut prev_fp: Option<&str> = None;
            let trend = series
                .iter()
                .map(|r| {
                    let fp = r.scenario_fingerprint.as_deref();
                    let changed = matches!((prev_fp, fp), (Some(a), Some(b)) if a != b);
                    if fp.is_some() {
                        prev_fp = fp;
                    }
                    TrendPoint {
                        run_id: r.id,
                        session_id: r.session_id.clone(),
                        started_at: r.started_at,
                        score: r.score,
                        passed: r.passed,
                        duration_sec: r.duration_sec,
                        total_turns: r.total_turns,
                        git_commit: r.git_commit.clone(),
                        definition_changed: changed,
                    }
                })
                .collect();
            Some(ScenarioTrend {
                name: name.to_string(),
                runs: series.len(),
                passed,
                pass_rate: passed as f64 / series.len() as f64,
                best_score: series.iter().map(|r| r.score).fold(0.0, f64::max),
                latest_score: latest.score,
                latest_passed: latest.passed,
                trend,
            })
        })
        .collect();

    Dashboard {
        generated_at: Utc::now(),
        total_runs: runs.len(),
        scenarios,
    }
}

/// Regenerates the dashboard document at `out` from every stored run.
pub fn write_dashboard(store: &Store, out: &Path) -> anyhow::Result<Dashboard> {
    let runs = store.list_runs(None, None)?;
    let dashboard = build_dashboard(&runs);
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, serde_json::to_string_pretty(&dashboard)?)?;
    tracing::debug!(path = %out.display(), scenarios = dashboard.scenarios.len(), "dashboard written");
    Ok(dashboard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scenario: &str, score: f64, passed: bool, fp: &str) -> Run {
        let mut r = Run::new(scenario, format!("{}-{}", scenario, score));
        r.score = score;
        r.passed = passed;
        r.scenario_fingerprint = Some(fp.to_string());
        r
    }

    #[test]
    fn per_scenario_series() {
        let runs = vec![
            run("a", 0.4, false, "f1"),
            run("b", 1.0, true, "g1"),
            run("a", 0.9, false, "f1"),
            run("a", 0.7, true, "f2"),
        ];
        let d = build_dashboard(&runs);
        assert_eq!(d.total_runs, 4);
        assert_eq!(d.scenarios.len(), 2);

        let a = &d.scenarios[0];
        assert_eq!(a.name, "a");
        assert_eq!(a.runs, 3);
        assert_eq!(a.passed, 1);
        assert!((a.pass_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(a.best_score, 0.9);
        assert_eq!(a.latest_score, 0.7);
        assert!(a.latest_passed);
        let changed: Vec<bool> = a.trend.iter().map(|p| p.definition_changed).collect();
        assert_eq!(changed, vec![false, false, true]);
    }

    #[test]
    fn written_from_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::memory().unwrap();
        store.insert_run(&run("a", 0.5, false, "f")).unwrap();
        let path = tmp.path().join("out/dashboard.json");
        write_dashboard(&store, &path).unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["totalRuns"], 1);
        assert_eq!(v["scenarios"][0]["name"], "a");
        assert_eq!(v["scenarios"][0]["trend"][0]["score"], 0.5);
    }
}
