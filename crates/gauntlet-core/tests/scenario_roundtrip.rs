use gauntlet_core::config::{
    find_scenario, load_scenario, load_scenario_dir, resolve_scenario, save_scenario,
    write_sample_scenario,
};
use gauntlet_core::errors::ScenarioError;
use gauntlet_core::fingerprint::scenario_fingerprint;
use gauntlet_core::model::{Prompt, RegressionCheck, Scenario, VerifyAction, VerifyStep};
use std::time::Duration;

fn full_scenario() -> Scenario {
    let mut s = Scenario::new(
        "todo-app",
        vec![
            Prompt {
                text: "Build a todo app and deploy it.".into(),
                success_criteria: vec!["reachable over https".into()],
            },
            Prompt::new("Add a health endpoint."),
        ],
    );
    s.description = "two-step build and deploy".into();
    s.timeout = Duration::from_secs(90 * 60);
    s.tags = vec!["containerapps".into()];
    s.scoring.max_duration_minutes = 40;
    s.scoring.max_turns = 30;
    s.scoring.max_azd_up_attempts = 2;
    s.scoring.max_bicep_edits = 5;
    s.scoring.must_delegate = true;
    s.scoring.must_invoke_skills = vec!["avm-bicep-rules".into()];
    s.scoring.regressions = vec![
        RegressionCheck::new("deployment-failed", "deployment failed", 2),
        RegressionCheck::new("bicep-build-error", r"error BCP\d+", 0),
    ];
    s.verify = vec![
        VerifyStep {
            name: Some("home".into()),
            action: VerifyAction::Navigate,
            selector: None,
            value: Some("/".into()),
            timeout_ms: Some(10_000),
        },
        VerifyStep {
            name: None,
            action: VerifyAction::AssertNotEmpty,
            selector: Some("ul.todos li".into()),
            value: None,
            timeout_ms: None,
        },
    ];
    s
}

#[test]
fn save_then_load_is_lossless() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("nested/todo-app.yaml");
    let original = full_scenario();

    save_scenario(&original, &path)?;
    let loaded = load_scenario(&path)?;

    assert_eq!(loaded, original);
    assert_eq!(scenario_fingerprint(&loaded)?, scenario_fingerprint(&original)?);

    let text = std::fs::read_to_string(&path)?;
    assert!(text.contains("timeout: 1h30m"));
    assert!(text.contains("maxAzdUpAttempts: 2"));
    Ok(())
}

#[test]
fn sample_scenario_loads() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("scenarios/sample.yaml");
    write_sample_scenario(&path)?;

    let s = load_scenario(&path)?;
    assert_eq!(s.name, "todo-app-containerapps");
    assert_eq!(s.prompts.len(), 2);
    assert_eq!(s.timeout, Duration::from_secs(45 * 60));
    assert!(s.scoring.must_delegate);
    assert_eq!(s.verify.len(), 2);
    assert_eq!(s.verify[1].action, VerifyAction::AssertVisible);
    Ok(())
}

#[test]
fn directory_lookup_by_name_and_path() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path();
    save_scenario(&full_scenario(), &dir.join("todo.yaml"))?;
    save_scenario(
        &Scenario::new("api-only", vec![Prompt::new("build an api")]),
        &dir.join("api.yml"),
    )?;
    std::fs::write(dir.join("notes.txt"), "not a scenario")?;

    let all = load_scenario_dir(dir)?;
    let names: Vec<&str> = all.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["api-only", "todo-app"]);

    assert_eq!(find_scenario(dir, "todo-app")?.name, "todo-app");
    let by_path = dir.join("api.yml");
    assert_eq!(
        resolve_scenario(by_path.to_str().unwrap(), dir)?.name,
        "api-only"
    );

    match find_scenario(dir, "todo-ap") {
        Err(e @ ScenarioError::NotFound { .. }) => {
            assert!(e.to_string().contains("did you mean 'todo-app'?"));
        }
        other => panic!("expected NotFound, got {:?}", other.map(|s| s.name)),
    }
    Ok(())
}

#[test]
fn malformed_scenarios_are_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;

    let no_prompts = tmp.path().join("empty.yaml");
    std::fs::write(&no_prompts, "name: empty\nprompts: []\n")?;
    assert!(matches!(
        load_scenario(&no_prompts),
        Err(ScenarioError::NoPrompts { .. })
    ));

    let bad_regex = tmp.path().join("regex.yaml");
    std::fs::write(
        &bad_regex,
        "name: r\nprompts: [{text: go}]\nscoring:\n  regressions:\n    - {name: broken, pattern: \"(unclosed\", maxOccurrences: 0}\n",
    )?;
    assert!(matches!(
        load_scenario(&bad_regex),
        Err(ScenarioError::InvalidRegex { .. })
    ));

    let bad_timeout = tmp.path().join("timeout.yaml");
    std::fs::write(&bad_timeout, "name: t\ntimeout: soon\nprompts: [{text: go}]\n")?;
    assert!(matches!(
        load_scenario(&bad_timeout),
        Err(ScenarioError::Parse { .. })
    ));

    for (file, timeout) in [
        ("huge-minutes.yaml", "400000000000000000"),
        ("huge-hours.yaml", "\"9999999999999999999h\""),
    ] {
        let path = tmp.path().join(file);
        std::fs::write(&path, format!("name: t\ntimeout: {}\nprompts: [{{text: go}}]\n", timeout))?;
        assert!(
            matches!(load_scenario(&path), Err(ScenarioError::Parse { .. })),
            "{} should be rejected",
            timeout
        );
    }
    Ok(())
}

#[test]
fn sub_second_timeout_is_lossless() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("quick.yaml");
    let mut original = full_scenario();
    original.timeout = Duration::from_millis(1500);

    save_scenario(&original, &path)?;
    assert_eq!(load_scenario(&path)?, original);
    assert!(std::fs::read_to_string(&path)?.contains("timeout: 1s500ms"));
    Ok(())
}
