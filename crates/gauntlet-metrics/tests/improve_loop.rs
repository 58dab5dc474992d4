use async_trait::async_trait;
use gauntlet_core::engine::{
    Assistant, Controller, FixOutcome, LoopConfig, LoopState, Rebuilder, SessionHandle, Stage,
};
use gauntlet_core::model::{Prompt, Scenario};
use gauntlet_core::storage::Store;
use gauntlet_core::trace::TranscriptLocator;
use gauntlet_metrics::default_scorer;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Writes one synthetic transcript per run. Delegates only once it has
/// been asked to fix itself `delegate_after_fixes` times.
struct ScriptedAssistant {
    root: PathBuf,
    runs: AtomicU32,
    fixes: AtomicU32,
    delegate_after_fixes: Option<u32>,
    fail_run: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAssistant {
    fn new(root: PathBuf, delegate_after_fixes: Option<u32>) -> Self {
        Self {
            root,
            runs: AtomicU32::new(0),
            fixes: AtomicU32::new(0),
            delegate_after_fixes,
            fail_run: false,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    async fn run_scenario(&self, scenario: &Scenario) -> anyhow::Result<SessionHandle> {
        if self.fail_run {
            anyhow::bail!("assistant exited with exit status: 1");
        }
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("sess-{}", n);
        let delegate = self
            .delegate_after_fixes
            .is_some_and(|k| self.fixes.load(Ordering::SeqCst) >= k);

        let mut lines = vec![
            format!(
                r#"{{"type":"user.message","data":{{"content":{}}},"id":"1","timestamp":"2025-06-01T10:0{}:00Z"}}"#,
                serde_json::to_string(&scenario.prompts[0].text)?,
                n
            ),
            format!(
                r#"{{"type":"assistant.turn_start","data":{{}},"id":"2","timestamp":"2025-06-01T10:0{}:05Z"}}"#,
                n
            ),
        ];
        if delegate {
            lines.push(format!(
                r#"{{"type":"tool.execution_start","data":{{"toolName":"task","arguments":{{}}}},"id":"3","timestamp":"2025-06-01T10:0{}:10Z"}}"#,
                n
            ));
        }
        let dir = self.root.join(&session_id);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("events.jsonl"), lines.join("\n"))?;
        Ok(SessionHandle { session_id })
    }

    async fn fix(&self, prompt: &str, _timeout: Duration) -> anyhow::Result<FixOutcome> {
        self.fixes.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(FixOutcome::Completed)
    }
}

struct CountingRebuilder {
    calls: AtomicU32,
    fail: bool,
}

impl CountingRebuilder {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail,
        }
    }
}

#[async_trait]
impl Rebuilder for CountingRebuilder {
    async fn rebuild(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("build command `npm run build` failed (exit status: 2)");
        }
        Ok(())
    }
}

fn scenario() -> Scenario {
    let mut s = Scenario::new("delegating-deploy", vec![Prompt::new("deploy the app")]);
    s.scoring.must_delegate = true;
    s.scoring.max_turns = 10;
    s
}

struct Fixture {
    _tmp: tempfile::TempDir,
    sessions: PathBuf,
    store: Store,
    dashboard: PathBuf,
}

fn fixture() -> anyhow::Result<Fixture> {
    let tmp = tempfile::tempdir()?;
    let sessions = tmp.path().join("sessions");
    std::fs::create_dir_all(&sessions)?;
    let store = Store::open(&tmp.path().join("results.db"))?;
    let dashboard = tmp.path().join("report/dashboard.json");
    Ok(Fixture {
        _tmp: tmp,
        sessions,
        store,
        dashboard,
    })
}

fn controller(
    fx: &Fixture,
    assistant: Arc<dyn Assistant>,
    rebuilder: Arc<dyn Rebuilder>,
    max_iterations: u32,
) -> Controller {
    Controller::new(
        assistant,
        rebuilder,
        default_scorer(),
        fx.store.clone(),
        TranscriptLocator::new(&fx.sessions),
        LoopConfig {
            max_iterations,
            dashboard_path: Some(fx.dashboard.clone()),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn never_passing_scenario_exhausts_iterations() -> anyhow::Result<()> {
    let fx = fixture()?;
    let assistant = Arc::new(ScriptedAssistant::new(fx.sessions.clone(), None));
    let rebuilder = Arc::new(CountingRebuilder::new(false));

    let outcome = controller(&fx, assistant.clone(), rebuilder.clone(), 3)
        .run(&scenario())
        .await?;

    assert_eq!(outcome.state, LoopState::Exhausted);
    assert_eq!(outcome.results.len(), 3);
    let iterations: Vec<u32> = outcome.results.iter().map(|r| r.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3]);
    assert_eq!(fx.store.count_runs(Some("delegating-deploy"))?, 3);

    // no fix or rebuild after the last iteration
    assert_eq!(assistant.fixes.load(Ordering::SeqCst), 2);
    assert_eq!(rebuilder.calls.load(Ordering::SeqCst), 2);

    let prompts = assistant.prompts.lock().unwrap();
    assert!(prompts[0].contains("no sub-task delegation observed"));

    // delegation (10 of 30 points) is the only failure
    assert!((outcome.best_score - 20.0 / 30.0).abs() < 1e-9);
    assert!(fx.dashboard.is_file());
    Ok(())
}

#[tokio::test]
async fn passes_once_fix_lands() -> anyhow::Result<()> {
    let fx = fixture()?;
    let assistant = Arc::new(ScriptedAssistant::new(fx.sessions.clone(), Some(1)));
    let rebuilder = Arc::new(CountingRebuilder::new(false));

    let outcome = controller(&fx, assistant.clone(), rebuilder, 5)
        .run(&scenario())
        .await?;

    assert!(outcome.passed());
    assert_eq!(outcome.results.len(), 2);
    assert!(!outcome.results[0].run.passed);
    assert!(outcome.results[1].run.passed);
    assert_eq!(outcome.best_score, 1.0);
    assert_eq!(outcome.results[1].session_id, "sess-2");
    assert!(outcome.results[1].report.contains("PASS"));

    let stored = fx.store.list_runs(Some("delegating-deploy"), None)?;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].id, outcome.results[1].run.id);
    Ok(())
}

#[tokio::test]
async fn rebuild_failure_is_fatal_and_keeps_history() -> anyhow::Result<()> {
    let fx = fixture()?;
    let assistant = Arc::new(ScriptedAssistant::new(fx.sessions.clone(), None));
    let rebuilder = Arc::new(CountingRebuilder::new(true));

    let err = controller(&fx, assistant, rebuilder, 3)
        .run(&scenario())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Rebuild);
    assert_eq!(err.iteration, 1);
    assert_eq!(err.completed.len(), 1);
    assert!(err.to_string().starts_with("rebuild stage failed"));
    assert_eq!(fx.store.count_runs(None)?, 1);
    Ok(())
}

#[tokio::test]
async fn runner_failure_aborts_before_anything_is_stored() -> anyhow::Result<()> {
    let fx = fixture()?;
    let mut assistant = ScriptedAssistant::new(fx.sessions.clone(), None);
    assistant.fail_run = true;

    let err = controller(
        &fx,
        Arc::new(assistant),
        Arc::new(CountingRebuilder::new(false)),
        3,
    )
    .run(&scenario())
    .await
    .unwrap_err();

    assert_eq!(err.stage, Stage::Run);
    assert!(err.completed.is_empty());
    assert_eq!(fx.store.count_runs(None)?, 0);
    Ok(())
}

#[tokio::test]
async fn missing_transcript_fails_analysis() -> anyhow::Result<()> {
    struct Ghost;

    #[async_trait]
    impl Assistant for Ghost {
        async fn run_scenario(&self, _scenario: &Scenario) -> anyhow::Result<SessionHandle> {
            Ok(SessionHandle {
                session_id: "never-written".into(),
            })
        }
        async fn fix(&self, _prompt: &str, _timeout: Duration) -> anyhow::Result<FixOutcome> {
            Ok(FixOutcome::Exited(Some(0)))
        }
    }

    let fx = fixture()?;
    let err = controller(&fx, Arc::new(Ghost), Arc::new(CountingRebuilder::new(false)), 2)
        .run(&scenario())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Analyze);
    assert!(err.to_string().contains("never-written"));
    Ok(())
}
