use crate::errors::ScenarioError;
use crate::model::Scenario;
use regex::RegexBuilder;
use std::path::{Path, PathBuf};

pub mod duration;
pub mod settings;

pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_scenario(&raw, path)
}

/// Parses scenario YAML. `origin` is only used for error messages.
pub fn parse_scenario(raw: &str, origin: &Path) -> Result<Scenario, ScenarioError> {
    let mut ignored_keys = Vec::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    // unknown keys are tolerated for forward compatibility
    let mut scenario: Scenario = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.push(path.to_string());
    })
    .map_err(|source| ScenarioError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;

    if !ignored_keys.is_empty() {
        tracing::debug!(
            file = %origin.display(),
            keys = ?ignored_keys,
            "ignored unknown scenario fields"
        );
    }

    validate(&mut scenario, origin)?;
    Ok(scenario)
}

fn validate(scenario: &mut Scenario, origin: &Path) -> Result<(), ScenarioError> {
    if scenario.prompts.is_empty() {
        return Err(ScenarioError::NoPrompts {
            path: origin.to_path_buf(),
        });
    }

    for check in &scenario.scoring.regressions {
        RegexBuilder::new(&check.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| ScenarioError::InvalidRegex {
                scenario: scenario.name.clone(),
                name: check.name.clone(),
                source,
            })?;
    }

    // required skills are a set; a duplicate must not be scored twice
    let mut seen = std::collections::HashSet::new();
    scenario
        .scoring
        .must_invoke_skills
        .retain(|s| seen.insert(s.clone()));

    Ok(())
}

pub fn to_yaml(scenario: &Scenario) -> Result<String, ScenarioError> {
    serde_yaml::to_string(scenario).map_err(ScenarioError::Serialize)
}

pub fn save_scenario(scenario: &Scenario, path: &Path) -> Result<(), ScenarioError> {
    let yaml = to_yaml(scenario)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ScenarioError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, yaml).map_err(|source| ScenarioError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads every `*.yaml` / `*.yml` scenario in `dir`, sorted by name.
pub fn load_scenario_dir(dir: &Path) -> Result<Vec<Scenario>, ScenarioError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ScenarioError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut scenarios = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| ScenarioError::Read {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if is_scenario_file(&path) {
            scenarios.push(load_scenario(&path)?);
        }
    }

    scenarios.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(scenarios)
}

fn is_scenario_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Resolves a scenario by name within `dir`.
pub fn find_scenario(dir: &Path, name: &str) -> Result<Scenario, ScenarioError> {
    let scenarios = load_scenario_dir(dir)?;
    if let Some(s) = scenarios.iter().find(|s| s.name == name) {
        return Ok(s.clone());
    }

    let suggestion = scenarios
        .iter()
        .map(|s| (strsim::normalized_levenshtein(name, &s.name), &s.name))
        .filter(|(sim, _)| *sim >= 0.5)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, n)| n.clone());

    Err(ScenarioError::NotFound {
        name: name.to_string(),
        dir: dir.to_path_buf(),
        suggestion,
    })
}

/// Accepts either a path to a scenario file or a scenario name under `dir`.
pub fn resolve_scenario(name_or_path: &str, dir: &Path) -> Result<Scenario, ScenarioError> {
    let as_path = PathBuf::from(name_or_path);
    if as_path.is_file() {
        load_scenario(&as_path)
    } else {
        find_scenario(dir, name_or_path)
    }
}

pub fn write_sample_scenario(path: &Path) -> Result<(), ScenarioError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ScenarioError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(
        path,
        r#"name: todo-app-containerapps
description: Build and deploy a todo app to Azure Container Apps
timeout: 45m
prompts:
  - text: "Build a todo app with a React frontend and a Python API, then deploy it to Azure Container Apps."
    successCriteria:
      - "app is reachable over https"
  - text: "Add a health check endpoint and redeploy."
scoring:
  maxDurationMinutes: 30
  maxTurns: 40
  maxAzdUpAttempts: 3
  maxBicepEdits: 6
  mustDelegate: true
  mustInvokeSkills:
    - avm-bicep-rules
  regressions:
    - name: deployment-failed
      pattern: "deployment failed"
      maxOccurrences: 2
verify:
  - name: home page loads
    action: navigate
    value: /
  - action: assert_visible
    selector: "h1"
"#,
    )
    .map_err(|source| ScenarioError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Prompt, RegressionCheck};

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = r#"
name: demo
owner: someone-else
prompts:
  - text: hi
    color: blue
scoring:
  maxTurns: 5
  futureKnob: true
"#;
        let s = parse_scenario(raw, Path::new("demo.yaml")).unwrap();
        assert_eq!(s.name, "demo");
        assert_eq!(s.scoring.max_turns, 5);
        assert_eq!(s.prompts, vec![Prompt::new("hi")]);
    }

    #[test]
    fn zero_prompts_is_rejected() {
        let err = parse_scenario("name: empty\nprompts: []\n", Path::new("e.yaml")).unwrap_err();
        assert!(matches!(err, ScenarioError::NoPrompts { .. }));

        let err = parse_scenario("name: missing\n", Path::new("m.yaml")).unwrap_err();
        assert!(matches!(err, ScenarioError::NoPrompts { .. }));
    }

    #[test]
    fn bad_regression_pattern_is_rejected() {
        let mut s = Scenario::new("r", vec![Prompt::new("go")]);
        s.scoring.regressions = vec![RegressionCheck::new("broken", "(unclosed", 0)];
        let yaml = to_yaml(&s).unwrap();
        let err = parse_scenario(&yaml, Path::new("r.yaml")).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn duplicate_skills_collapse() {
        let raw = "name: d\nprompts: [{text: x}]\nscoring:\n  mustInvokeSkills: [a, b, a]\n";
        let s = parse_scenario(raw, Path::new("d.yaml")).unwrap();
        assert_eq!(s.scoring.must_invoke_skills, vec!["a", "b"]);
    }

    #[test]
    fn timeout_accepts_minutes_and_strings() {
        let s = parse_scenario("name: t\ntimeout: 20\nprompts: [{text: x}]\n", Path::new("t.yaml"))
            .unwrap();
        assert_eq!(s.timeout.as_secs(), 1200);
        let s = parse_scenario(
            "name: t\ntimeout: 1h5m\nprompts: [{text: x}]\n",
            Path::new("t.yaml"),
        )
        .unwrap();
        assert_eq!(s.timeout.as_secs(), 3900);
    }
}
