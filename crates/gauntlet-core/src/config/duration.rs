//! Duration strings for scenario timeouts: `45m`, `1h30m`, `90s`, `1s500ms`.
//!
//! A bare integer is read as minutes. Values are written back in canonical
//! `XhYmZsNms` form with zero components omitted; anything finer than a
//! millisecond is written as `ns`.

use crate::errors::ScenarioError;
use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn parse(raw: &str) -> Result<Duration, ScenarioError> {
    let invalid = || ScenarioError::InvalidTimeout(raw.to_string());
    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if let Ok(minutes) = s.parse::<u64>() {
        return from_minutes(minutes).ok_or_else(invalid);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let (number, tail) = rest.split_at(digits);
        let letters = tail.len() - tail.trim_start_matches(|c: char| c.is_ascii_alphabetic()).len();
        let (unit, tail) = tail.split_at(letters);
        // "1h30" has a trailing number without a unit
        if number.is_empty() || unit.is_empty() {
            return Err(invalid());
        }
        let n: u64 = number.parse().map_err(|_| invalid())?;
        let part = match unit {
            "h" => n.checked_mul(3600).map(Duration::from_secs),
            "m" => from_minutes(n),
            "s" => Some(Duration::from_secs(n)),
            "ms" => Some(Duration::from_millis(n)),
            "ns" => Some(Duration::from_nanos(n)),
            _ => return Err(invalid()),
        };
        total = part
            .and_then(|p| total.checked_add(p))
            .ok_or_else(invalid)?;
        rest = tail;
    }
    Ok(total)
}

fn from_minutes(minutes: u64) -> Option<Duration> {
    minutes.checked_mul(60).map(Duration::from_secs)
}

pub fn format(d: Duration) -> String {
    if d.is_zero() {
        return "0s".into();
    }
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let (ms, ns) = (d.subsec_millis(), d.subsec_nanos() % 1_000_000);
    let mut out = String::new();
    for (n, unit) in [(h, "h"), (m, "m"), (s, "s"), (u64::from(ms), "ms"), (u64::from(ns), "ns")] {
        if n > 0 {
            out.push_str(&format!("{}{}", n, unit));
        }
    }
    out
}

pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Minutes(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Minutes(m) => from_minutes(m)
            .ok_or_else(|| D::Error::custom(ScenarioError::InvalidTimeout(m.to_string()))),
        Raw::Text(s) => parse(&s).map_err(D::Error::custom),
    }
}
