//! Playwright script generation and result parsing.

use crate::model::{VerifyAction, VerifyStep};
use anyhow::bail;
use std::collections::HashMap;
use std::fmt::Write;

pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

/// Step names as reported: explicit names, else `step-N` (1-based).
pub fn step_names(steps: &[VerifyStep]) -> Vec<String> {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| match s.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("step-{}", i + 1),
        })
        .collect()
}

// JSON string literals are valid JavaScript string literals
fn js(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn require<'a>(field: &'a Option<String>, what: &str, name: &str) -> anyhow::Result<&'a str> {
    match field.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => bail!("verify step '{}' needs a {}", name, what),
    }
}

fn step_body(step: &VerifyStep, name: &str) -> anyhow::Result<String> {
    let timeout = step.timeout_ms.unwrap_or(DEFAULT_STEP_TIMEOUT_MS);
    let body = match step.action {
        VerifyAction::Navigate => format!(
            "await page.goto(new URL({}, BASE_URL).toString(), {{ timeout: {} }});",
            js(step.value.as_deref().unwrap_or("/")),
            timeout
        ),
        VerifyAction::Click => format!(
            "await page.click({}, {{ timeout: {} }});",
            js(require(&step.selector, "selector", name)?),
            timeout
        ),
        VerifyAction::Type => format!(
            "await page.fill({}, {}, {{ timeout: {} }});",
            js(require(&step.selector, "selector", name)?),
            js(step.value.as_deref().unwrap_or_default()),
            timeout
        ),
        VerifyAction::Wait => match step.selector.as_deref() {
            Some(sel) => format!(
                "await page.waitForSelector({}, {{ timeout: {} }});",
                js(sel),
                timeout
            ),
            None => format!(
                "await page.waitForTimeout({});",
                step.value
                    .as_deref()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1_000)
            ),
        },
        VerifyAction::AssertVisible => format!(
            "await expect(page.locator({}).first()).toBeVisible({{ timeout: {} }});",
            js(require(&step.selector, "selector", name)?),
            timeout
        ),
        VerifyAction::AssertNotEmpty => format!(
            "const text = await page.locator({}).first().innerText({{ timeout: {} }});\n    expect(text.trim().length).toBeGreaterThan(0);",
            js(require(&step.selector, "selector", name)?),
            timeout
        ),
        VerifyAction::Screenshot => format!(
            "await page.screenshot({{ path: {}, fullPage: true }});",
            js(&step
                .value
                .clone()
                .unwrap_or_else(|| format!("{}.png", name)))
        ),
    };
    Ok(body)
}

/// A serial Playwright suite with one test per step, sharing one page.
pub fn generate_script(suite: &str, base_url: &str, steps: &[VerifyStep]) -> anyhow::Result<String> {
    let names = step_names(steps);
    let mut s = String::new();
    let _ = writeln!(s, "const {{ test, expect }} = require('@playwright/test');");
    let _ = writeln!(s, "const BASE_URL = process.env.BASE_URL || {};", js(base_url));
    let _ = writeln!(s);
    let _ = writeln!(s, "test.describe.serial({}, () => {{", js(suite));
    let _ = writeln!(s, "  let page;");
    let _ = writeln!(s, "  test.beforeAll(async ({{ browser }}) => {{ page = await browser.newPage(); }});");
    let _ = writeln!(s, "  test.afterAll(async () => {{ await page.close(); }});");
    for (step, name) in steps.iter().zip(&names) {
        let _ = writeln!(s);
        let _ = writeln!(s, "  test({}, async () => {{", js(name));
        let _ = writeln!(s, "    {}", step_body(step, name)?);
        let _ = writeln!(s, "  }});");
    }
    let _ = writeln!(s, "}});");
    Ok(s)
}

const PASS_MARKS: &[char] = &['✓', '✔'];
const FAIL_MARKS: &[char] = &['✘', '✗', '×'];

/// Maps list-reporter output back onto step names (`true` = passed).
/// Steps never mentioned in the output are absent from the map.
pub fn parse_results(output: &str, names: &[String]) -> HashMap<String, bool> {
    let mut results = HashMap::new();
    for line in output.lines() {
        let trimmed = line.trim_start();
        let Some(mark) = trimmed.chars().next() else {
            continue;
        };
        let passed = if PASS_MARKS.contains(&mark) {
            true
        } else if FAIL_MARKS.contains(&mark) {
            false
        } else {
            continue;
        };

        // "✓  1 [chromium] › verify.spec.js:7:3 › suite › step name (1.2s)"
        let title = trimmed.rsplit(" › ").next().unwrap_or(trimmed);
        let title = strip_duration(title.trim());
        if let Some(name) = names.iter().find(|n| n.as_str() == title) {
            // a retry that passes overrides an earlier failure
            let entry = results.entry(name.clone()).or_insert(passed);
            *entry = *entry || passed;
        }
    }
    results
}

fn strip_duration(title: &str) -> &str {
    match title.rfind(" (") {
        Some(i) if title.ends_with(')') => title[..i].trim_end(),
        _ => title,
    }
}
