//! Finding the deployed endpoint from the project's persisted environment.
//!
//! The deploy tool keeps `.azure/config.json` (naming the default
//! environment) and one `.azure/<env>/.env` file of `KEY=value` lines per
//! environment.

use std::collections::BTreeMap;
use std::path::Path;

/// Variable names checked in order; the first non-empty one wins.
pub const ENDPOINT_VARS: &[&str] = &[
    "SERVICE_WEB_URI",
    "SERVICE_WEB_ENDPOINT_URL",
    "WEB_URI",
    "SERVICE_FRONTEND_URI",
    "SERVICE_API_URI",
    "APP_URL",
    "WEBSITE_URL",
];

/// Parses `KEY=value` lines, tolerating `export`, comments and quotes.
pub fn parse_env(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        vars.insert(key.trim().to_string(), value.to_string());
    }
    vars
}

pub fn endpoint_from_vars(vars: &BTreeMap<String, String>) -> Option<String> {
    ENDPOINT_VARS
        .iter()
        .filter_map(|k| vars.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(|v| v.trim_end_matches('/').to_string())
}

fn default_environment(azure_dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(azure_dir.join("config.json")).ok()?;
    let v: serde_json::Value = serde_json::from_str(&raw).ok()?;
    v.get("defaultEnvironment")?.as_str().map(str::to_string)
}

/// Endpoint of the default environment of the project at `project_dir`.
/// Falls back to scanning every environment when no default is recorded.
pub fn discover_endpoint(project_dir: &Path) -> Option<String> {
    let azure_dir = project_dir.join(".azure");

    if let Some(env) = default_environment(&azure_dir) {
        let found = std::fs::read_to_string(azure_dir.join(&env).join(".env"))
            .ok()
            .and_then(|t| endpoint_from_vars(&parse_env(&t)));
        if found.is_some() {
            tracing::debug!(environment = %env, "endpoint found in default environment");
            return found;
        }
    }

    let mut envs: Vec<_> = std::fs::read_dir(&azure_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path().join(".env"))
        .filter(|p| p.is_file())
        .collect();
    envs.sort();
    envs.iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .find_map(|t| endpoint_from_vars(&parse_env(&t)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_lines() {
        let vars = parse_env(
            "# comment\nexport AZURE_ENV_NAME=dev\nSERVICE_WEB_URI=\"https://web.example.net/\"\nEMPTY=\nbroken line\n",
        );
        assert_eq!(vars["AZURE_ENV_NAME"], "dev");
        assert_eq!(vars["SERVICE_WEB_URI"], "https://web.example.net/");
        assert_eq!(vars["EMPTY"], "");
        assert!(!vars.contains_key("broken line"));
    }

    #[test]
    fn preference_order() {
        let vars = parse_env("APP_URL=https://b\nSERVICE_WEB_URI=\nWEB_URI=https://a/\n");
        assert_eq!(endpoint_from_vars(&vars).as_deref(), Some("https://a"));
        assert_eq!(endpoint_from_vars(&parse_env("OTHER=x")), None);
    }

    #[test]
    fn discovers_default_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let azure = tmp.path().join(".azure");
        std::fs::create_dir_all(azure.join("dev")).unwrap();
        std::fs::create_dir_all(azure.join("prod")).unwrap();
        std::fs::write(azure.join("config.json"), r#"{"version":1,"defaultEnvironment":"prod"}"#).unwrap();
        std::fs::write(azure.join("dev/.env"), "WEB_URI=https://dev.example.net\n").unwrap();
        std::fs::write(azure.join("prod/.env"), "WEB_URI=https://prod.example.net\n").unwrap();

        assert_eq!(
            discover_endpoint(tmp.path()).as_deref(),
            Some("https://prod.example.net")
        );
    }

    #[test]
    fn nothing_to_discover() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(discover_endpoint(tmp.path()), None);
    }
}
