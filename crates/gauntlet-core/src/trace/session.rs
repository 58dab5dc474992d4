use super::schema::{Event, EventData};
use crate::errors::TranscriptError;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;

/// Tool name the assistant uses to hand work to a sub-agent.
pub const DELEGATION_TOOL: &str = "task";

/// All parseable events of one session, in file order.
///
/// Every query is a pure function over the loaded events.
#[derive(Debug, Clone, Default)]
pub struct SessionEvents {
    session_id: String,
    events: Vec<Event>,
    skipped_lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolCall<'a> {
    pub name: &'a str,
    pub arguments: &'a serde_json::Value,
}

impl ToolCall<'_> {
    /// Arguments as matched by argument patterns: string arguments as-is,
    /// anything else as compact JSON.
    pub fn raw_arguments(&self) -> String {
        match self.arguments {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            v => v.to_string(),
        }
    }
}

impl SessionEvents {
    pub fn new(session_id: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            session_id: session_id.into(),
            events,
            skipped_lines: 0,
        }
    }

    pub fn from_path(session_id: &str, path: &Path) -> Result<Self, TranscriptError> {
        let file = std::fs::File::open(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                TranscriptError::NotFound {
                    session_id: session_id.to_string(),
                    path: path.to_path_buf(),
                }
            } else {
                TranscriptError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_reader(session_id, std::io::BufReader::new(file)).map_err(|source| {
            TranscriptError::Io {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Reads one record per line. Lines that do not parse (including a
    /// torn last line from a killed process) are counted and skipped.
    pub fn from_reader<R: BufRead>(session_id: &str, mut reader: R) -> std::io::Result<Self> {
        let mut events = Vec::new();
        let mut skipped = 0usize;
        let mut buf = Vec::new();
        let mut line_no = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match Event::parse(line) {
                Ok(e) => events.push(e),
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(session_id, line = line_no, error = %e, "skipping malformed transcript line");
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(
                session_id,
                skipped,
                parsed = events.len(),
                "transcript contained malformed lines"
            );
        }

        Ok(Self {
            session_id: session_id.to_string(),
            events,
            skipped_lines: skipped,
        })
    }

    pub fn parse_str(session_id: &str, text: &str) -> Self {
        // reading from a byte slice cannot fail
        Self::from_reader(session_id, text.as_bytes()).unwrap_or_default()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    pub fn user_messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::UserMessage(m) => Some(m.content.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn assistant_messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::AssistantMessage(m) => Some(m.content.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn turn_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.data, EventData::AssistantTurnStart))
            .count()
    }

    pub fn tool_calls(&self) -> Vec<ToolCall<'_>> {
        self.events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::ToolExecutionStart(t) => Some(ToolCall {
                    name: t.tool_name.as_str(),
                    arguments: &t.arguments,
                }),
                _ => None,
            })
            .collect()
    }

    /// Counts calls to exactly `tool_name` whose raw arguments match
    /// `arg_pattern`. An empty pattern matches every call to the tool.
    pub fn count_tool_calls_matching(
        &self,
        tool_name: &str,
        arg_pattern: &str,
    ) -> Result<usize, regex::Error> {
        let re = if arg_pattern.is_empty() {
            None
        } else {
            Some(Regex::new(arg_pattern)?)
        };
        Ok(self
            .tool_calls()
            .into_iter()
            .filter(|c| c.name == tool_name)
            .filter(|c| re.as_ref().map_or(true, |re| re.is_match(&c.raw_arguments())))
            .count())
    }

    pub fn capabilities_invoked(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::SkillInvoked(s) => Some(s.name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_call(&self, tool_name: &str) -> bool {
        self.tool_calls().iter().any(|c| c.name == tool_name)
    }

    pub fn has_delegation(&self) -> bool {
        self.has_tool_call(DELEGATION_TOOL)
    }

    /// Number of assistant messages matching `pattern`, case-insensitively.
    pub fn count_regression_matches(&self, pattern: &str) -> Result<usize, regex::Error> {
        let re = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(self
            .assistant_messages()
            .into_iter()
            .filter(|m| re.is_match(m))
            .count())
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.first().map(|e| e.timestamp)
    }

    /// Last event timestamp minus first. Zero with fewer than two events,
    /// and zero when clock skew puts the last event before the first.
    pub fn duration(&self) -> Duration {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) if self.events.len() >= 2 => (last.timestamp
                - first.timestamp)
                .to_std()
                .unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    pub fn task_completed(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.data, EventData::TaskComplete(_)))
    }
}
