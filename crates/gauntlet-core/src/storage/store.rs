use crate::model::{RegressionOutcome, Run};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RUN_COLUMNS: &str = "id, scenario, session_id, git_commit, started_at, duration_sec, \
     total_turns, azd_up_attempts, bicep_edits, delegated, deployed, score, passed, \
     scenario_fingerprint";

/// Append-only run history.
///
/// One writer at a time; file-backed stores run in WAL mode so other
/// connections can read while a write transaction is open.
#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub runs: Option<u64>,
    pub scenarios: Option<u64>,
    pub last_run_id: Option<i64>,
    pub last_run_at: Option<String>,
    pub version: Option<String>,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and brings its
    /// schema up to date.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;
        tracing::debug!(db = %path.display(), journal_mode = %mode, "opened results store");

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        migrate_v2(&conn)?;
        conn.execute_batch(&format!(
            "PRAGMA user_version = {}",
            crate::storage::schema::SCHEMA_VERSION
        ))?;
        Ok(())
    }

    /// Inserts the run with its skill and regression rows in one
    /// transaction and returns the new run id. `run.id` is ignored.
    pub fn insert_run(&self, run: &Run) -> anyhow::Result<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let id = insert_run_tx(&tx, run)?;
        tx.commit()?;
        tracing::debug!(
            event = "run_inserted",
            run_id = id,
            scenario = %run.scenario,
            session_id = %run.session_id,
            "stored run"
        );
        Ok(id)
    }

    /// The newest `limit` runs (all when `None`), returned oldest first.
    /// `scenario` of `None` or `""` lists every scenario. Skill and
    /// regression maps are left empty; see [`Store::list_runs_with_details`].
    pub fn list_runs(&self, scenario: Option<&str>, limit: Option<u32>) -> anyhow::Result<Vec<Run>> {
        let conn = self.conn.lock().unwrap();
        select_runs(&conn, scenario, limit)
    }

    pub fn list_runs_with_details(
        &self,
        scenario: Option<&str>,
        limit: Option<u32>,
    ) -> anyhow::Result<Vec<Run>> {
        let conn = self.conn.lock().unwrap();
        let mut runs = select_runs(&conn, scenario, limit)?;
        load_details(&conn, &mut runs)?;
        Ok(runs)
    }

    pub fn get_run(&self, id: i64) -> anyhow::Result<Option<Run>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        let run = conn.query_row(&sql, params![id], row_to_run).optional()?;
        match run {
            Some(r) => {
                let mut runs = vec![r];
                load_details(&conn, &mut runs)?;
                Ok(runs.pop())
            }
            None => Ok(None),
        }
    }

    pub fn count_runs(&self, scenario: Option<&str>) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let n = conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE ?1 IS NULL OR scenario = ?1",
            params![scenario.filter(|s| !s.is_empty())],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// Writes every run, fully denormalised, as one pretty-printed JSON array.
    pub fn export_json(&self, path: &Path) -> anyhow::Result<usize> {
        let runs = self.list_runs_with_details(None, None)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &runs)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(event = "export", runs = runs.len(), path = %path.display(), "exported runs");
        Ok(runs.len())
    }

    /// Imports an exported document and returns how many runs were added.
    /// Runs whose (scenario, session id, start time) already exist are
    /// skipped, so re-importing the same document is a no-op.
    pub fn import_json(&self, path: &Path) -> anyhow::Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let runs: Vec<Run> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a run export", path.display()))?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut imported = 0;
        for run in &runs {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM runs
                 WHERE scenario = ?1 AND session_id = ?2 AND started_at = ?3)",
                params![run.scenario, run.session_id, format_ts(&run.started_at)],
                |r| r.get(0),
            )?;
            if exists {
                continue;
            }
            insert_run_tx(&tx, run)?;
            imported += 1;
        }
        tx.commit()?;

        tracing::info!(
            event = "import",
            imported,
            skipped = runs.len() - imported,
            path = %path.display(),
            "imported runs"
        );
        Ok(imported)
    }

    pub fn stats_best_effort(&self) -> anyhow::Result<StoreStats> {
        let conn = self.conn.lock().unwrap();

        let count = |sql: &str| -> Option<u64> {
            conn.query_row(sql, [], |r| r.get::<_, i64>(0).map(|x| x as u64))
                .ok()
        };
        let runs = count("SELECT COUNT(*) FROM runs");
        let scenarios = count("SELECT COUNT(DISTINCT scenario) FROM runs");

        let last: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, started_at FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .ok();
        let (last_run_id, last_run_at) = match last {
            Some((id, at)) => (Some(id), Some(at)),
            None => (None, None),
        };

        let version: Option<String> = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .ok()
            .map(|v: i64| v.to_string());

        Ok(StoreStats {
            runs,
            scenarios,
            last_run_id,
            last_run_at,
            version,
        })
    }
}

fn insert_run_tx(tx: &Transaction, run: &Run) -> anyhow::Result<i64> {
    tx.execute(
        "INSERT INTO runs (
            scenario, session_id, git_commit, started_at, duration_sec, total_turns,
            azd_up_attempts, bicep_edits, delegated, deployed, score, passed,
            scenario_fingerprint
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            run.scenario,
            run.session_id,
            run.git_commit,
            format_ts(&run.started_at),
            run.duration_sec,
            run.total_turns,
            run.azd_up_attempts,
            run.bicep_edits,
            run.delegated,
            run.deployed,
            run.score,
            run.passed,
            run.scenario_fingerprint,
        ],
    )?;
    let id = tx.last_insert_rowid();

    for (skill, invoked) in &run.skills {
        tx.execute(
            "INSERT INTO run_skills (run_id, skill, invoked) VALUES (?1, ?2, ?3)",
            params![id, skill, invoked],
        )?;
    }
    for (name, r) in &run.regressions {
        tx.execute(
            "INSERT INTO run_regressions (run_id, name, occurrences, max_allowed, passed)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, r.occurrences, r.max_allowed, r.passed],
        )?;
    }
    Ok(id)
}

fn select_runs(
    conn: &Connection,
    scenario: Option<&str>,
    limit: Option<u32>,
) -> anyhow::Result<Vec<Run>> {
    let sql = format!(
        "SELECT * FROM (
             SELECT {cols} FROM runs
             WHERE ?1 IS NULL OR scenario = ?1
             ORDER BY started_at DESC, id DESC
             LIMIT ?2
         ) ORDER BY started_at ASC, id ASC",
        cols = RUN_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    // sqlite reads a negative LIMIT as unbounded
    let limit: i64 = limit.map(i64::from).unwrap_or(-1);
    let rows = stmt.query_map(
        params![scenario.filter(|s| !s.is_empty()), limit],
        row_to_run,
    )?;

    let mut runs = Vec::new();
    for r in rows {
        runs.push(r?);
    }
    Ok(runs)
}

fn load_details(conn: &Connection, runs: &mut [Run]) -> anyhow::Result<()> {
    let index: HashMap<i64, usize> = runs
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.id.map(|id| (id, i)))
        .collect();

    let mut skills = conn.prepare("SELECT skill, invoked FROM run_skills WHERE run_id = ?1")?;
    let mut regressions = conn.prepare(
        "SELECT name, occurrences, max_allowed, passed FROM run_regressions WHERE run_id = ?1",
    )?;

    for (id, i) in index {
        let run = &mut runs[i];
        let rows = skills.query_map(params![id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, bool>(1)?))
        })?;
        for row in rows {
            let (skill, invoked) = row?;
            run.skills.insert(skill, invoked);
        }

        let rows = regressions.query_map(params![id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                RegressionOutcome {
                    occurrences: r.get(1)?,
                    max_allowed: r.get(2)?,
                    passed: r.get(3)?,
                },
            ))
        })?;
        for row in rows {
            let (name, outcome) = row?;
            run.regressions.insert(name, outcome);
        }
    }
    Ok(())
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
    let started_at: String = row.get(4)?;
    Ok(Run {
        id: Some(row.get(0)?),
        scenario: row.get(1)?,
        session_id: row.get(2)?,
        git_commit: row.get(3)?,
        started_at: parse_ts(&started_at).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        duration_sec: row.get(5)?,
        total_turns: row.get(6)?,
        azd_up_attempts: row.get(7)?,
        bicep_edits: row.get(8)?,
        delegated: row.get(9)?,
        deployed: row.get(10)?,
        score: row.get(11)?,
        passed: row.get(12)?,
        skills: Default::default(),
        regressions: Default::default(),
        scenario_fingerprint: row.get(13)?,
    })
}

// fixed-width UTC so TEXT ordering is chronological
fn format_ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

/// v2: runs carry the fingerprint of the scenario definition they were
/// scored against.
fn migrate_v2(conn: &Connection) -> anyhow::Result<()> {
    let cols = get_columns(conn, "runs")?;
    add_column_if_missing(conn, &cols, "runs", "scenario_fingerprint", "TEXT")?;
    Ok(())
}

fn get_columns(
    conn: &Connection,
    table: &str,
) -> anyhow::Result<std::collections::HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = std::collections::HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

fn add_column_if_missing(
    conn: &Connection,
    cols: &std::collections::HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> anyhow::Result<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run(scenario: &str, session: &str, minute: u32) -> Run {
        let mut r = Run::new(scenario, session);
        r.started_at = Utc.with_ymd_and_hms(2025, 3, 1, 9, minute, 0).unwrap();
        r.score = 0.5;
        r
    }

    #[test]
    fn ids_increase_and_list_is_oldest_first() {
        let store = Store::memory().unwrap();
        let a = store.insert_run(&run("s", "1", 10)).unwrap();
        let b = store.insert_run(&run("s", "2", 5)).unwrap();
        let c = store.insert_run(&run("s", "3", 20)).unwrap();
        assert!(a < b && b < c);

        let all = store.list_runs(Some("s"), None).unwrap();
        let sessions: Vec<_> = all.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(sessions, vec!["2", "1", "3"]);

        // newest two, still ascending
        let last_two = store.list_runs(Some("s"), Some(2)).unwrap();
        let sessions: Vec<_> = last_two.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(sessions, vec!["1", "3"]);
    }

    #[test]
    fn filter_by_scenario() {
        let store = Store::memory().unwrap();
        store.insert_run(&run("a", "1", 1)).unwrap();
        store.insert_run(&run("b", "2", 2)).unwrap();
        assert_eq!(store.list_runs(Some("a"), None).unwrap().len(), 1);
        assert_eq!(store.list_runs(Some(""), None).unwrap().len(), 2);
        assert_eq!(store.list_runs(None, None).unwrap().len(), 2);
        assert_eq!(store.count_runs(Some("b")).unwrap(), 1);
        assert!(store.list_runs(Some("zzz"), None).unwrap().is_empty());
    }

    #[test]
    fn details_are_joined() {
        let store = Store::memory().unwrap();
        let mut r = run("s", "1", 1);
        r.skills.insert("avm-bicep-rules".into(), true);
        r.skills.insert("azure-deploy".into(), false);
        r.regressions
            .insert("quota".into(), RegressionOutcome::new(3, 1));
        r.scenario_fingerprint = Some("abc".into());
        let id = store.insert_run(&r).unwrap();

        let plain = &store.list_runs(None, None).unwrap()[0];
        assert!(plain.skills.is_empty());

        let full = store.get_run(id).unwrap().unwrap();
        assert_eq!(full.skills, r.skills);
        assert_eq!(full.regressions, r.regressions);
        assert_eq!(full.scenario_fingerprint.as_deref(), Some("abc"));
        assert_eq!(full.started_at, r.started_at);
        assert_eq!(full.id, Some(id));
    }

    #[test]
    fn stats_on_empty_store() {
        let store = Store::memory().unwrap();
        let s = store.stats_best_effort().unwrap();
        assert_eq!(s.runs, Some(0));
        assert_eq!(s.last_run_id, None);
        assert_eq!(s.version.as_deref(), Some("2"));
    }
}
