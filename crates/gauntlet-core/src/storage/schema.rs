/// Version stamped into `PRAGMA user_version` after migrations run.
pub const SCHEMA_VERSION: i64 = 2;

pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  scenario TEXT NOT NULL,
  session_id TEXT NOT NULL,
  git_commit TEXT,
  started_at TEXT NOT NULL,
  duration_sec REAL NOT NULL,
  total_turns INTEGER NOT NULL,
  azd_up_attempts INTEGER NOT NULL,
  bicep_edits INTEGER NOT NULL,
  delegated INTEGER NOT NULL,
  deployed INTEGER NOT NULL,
  score REAL NOT NULL,
  passed INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS run_skills (
  run_id INTEGER NOT NULL REFERENCES runs(id),
  skill TEXT NOT NULL,
  invoked INTEGER NOT NULL,
  PRIMARY KEY (run_id, skill)
);

CREATE TABLE IF NOT EXISTS run_regressions (
  run_id INTEGER NOT NULL REFERENCES runs(id),
  name TEXT NOT NULL,
  occurrences INTEGER NOT NULL,
  max_allowed INTEGER NOT NULL,
  passed INTEGER NOT NULL,
  PRIMARY KEY (run_id, name)
);

CREATE INDEX IF NOT EXISTS idx_runs_scenario_started ON runs(scenario, started_at);
"#;
