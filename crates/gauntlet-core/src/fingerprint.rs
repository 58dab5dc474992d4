use crate::model::Scenario;
use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Fingerprint of a scenario definition, stored on every run so trend
/// views can tell when the criteria changed underneath a series.
///
/// Hashes the canonical YAML form, so cosmetic edits to the source file
/// (comments, key order, unknown keys) do not change it.
pub fn scenario_fingerprint(scenario: &Scenario) -> anyhow::Result<String> {
    let canonical = serde_yaml::to_string(scenario)?;
    Ok(sha256_hex(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_scenario;
    use std::path::Path;

    #[test]
    fn cosmetic_edits_keep_fingerprint() {
        let a = parse_scenario(
            "name: f\nprompts: [{text: go}]\nscoring: {maxTurns: 3}\n",
            Path::new("a.yaml"),
        )
        .unwrap();
        let b = parse_scenario(
            "# comment\nscoring:\n  maxTurns: 3\nname: f\nextra: 1\nprompts:\n  - text: go\n",
            Path::new("b.yaml"),
        )
        .unwrap();
        assert_eq!(
            scenario_fingerprint(&a).unwrap(),
            scenario_fingerprint(&b).unwrap()
        );
    }

    #[test]
    fn criteria_change_moves_fingerprint() {
        let mut s = Scenario::new("f", vec![crate::model::Prompt::new("go")]);
        let before = scenario_fingerprint(&s).unwrap();
        s.scoring.max_turns = 10;
        assert_ne!(before, scenario_fingerprint(&s).unwrap());
    }
}
