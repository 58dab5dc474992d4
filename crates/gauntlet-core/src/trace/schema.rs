//! Typed transcript records.
//!
//! Each line of a session's `events.jsonl` is one record:
//! `{"type": ..., "data": {...}, "id": ..., "timestamp": ..., "parentId": ...}`.
//! The shape of `data` depends on `type`; unrecognised types are kept as
//! [`EventData::Unknown`] so newer assistant builds do not break parsing.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

pub mod kinds {
    pub const SESSION_START: &str = "session.start";
    pub const USER_MESSAGE: &str = "user.message";
    pub const ASSISTANT_TURN_START: &str = "assistant.turn_start";
    pub const ASSISTANT_MESSAGE: &str = "assistant.message";
    pub const TOOL_EXECUTION_START: &str = "tool.execution_start";
    pub const SKILL_INVOKED: &str = "skill.invoked";
    pub const TASK_COMPLETE: &str = "session.task_complete";
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub parent_id: Option<String>,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    SessionStart(SessionStart),
    UserMessage(Message),
    AssistantTurnStart,
    AssistantMessage(Message),
    ToolExecutionStart(ToolExecution),
    SkillInvoked(SkillInvocation),
    TaskComplete(TaskComplete),
    Unknown { kind: String, data: Value },
}

impl EventData {
    pub fn kind(&self) -> &str {
        match self {
            EventData::SessionStart(_) => kinds::SESSION_START,
            EventData::UserMessage(_) => kinds::USER_MESSAGE,
            EventData::AssistantTurnStart => kinds::ASSISTANT_TURN_START,
            EventData::AssistantMessage(_) => kinds::ASSISTANT_MESSAGE,
            EventData::ToolExecutionStart(_) => kinds::TOOL_EXECUTION_START,
            EventData::SkillInvoked(_) => kinds::SKILL_INVOKED,
            EventData::TaskComplete(_) => kinds::TASK_COMPLETE,
            EventData::Unknown { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SkillInvocation {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskComplete {
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    id: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    parent_id: Option<String>,
}

impl Event {
    /// Parses one transcript line. A known `type` whose `data` does not fit
    /// its payload shape is an error, same as broken JSON.
    pub fn parse(line: &str) -> Result<Event, serde_json::Error> {
        let raw: RawEvent = serde_json::from_str(line)?;
        let data = match raw.kind.as_str() {
            kinds::SESSION_START => EventData::SessionStart(payload(raw.data)?),
            kinds::USER_MESSAGE => EventData::UserMessage(serde_json::from_value(raw.data)?),
            kinds::ASSISTANT_TURN_START => EventData::AssistantTurnStart,
            kinds::ASSISTANT_MESSAGE => {
                EventData::AssistantMessage(serde_json::from_value(raw.data)?)
            }
            kinds::TOOL_EXECUTION_START => {
                EventData::ToolExecutionStart(serde_json::from_value(raw.data)?)
            }
            kinds::SKILL_INVOKED => EventData::SkillInvoked(serde_json::from_value(raw.data)?),
            kinds::TASK_COMPLETE => EventData::TaskComplete(payload(raw.data)?),
            _ => EventData::Unknown {
                kind: raw.kind,
                data: raw.data,
            },
        };
        Ok(Event {
            id: raw.id,
            timestamp: raw.timestamp,
            parent_id: raw.parent_id,
            data,
        })
    }
}

// payloads whose fields are all optional may arrive with `data` omitted
fn payload<T: Default + serde::de::DeserializeOwned>(v: Value) -> Result<T, serde_json::Error> {
    if v.is_null() {
        Ok(T::default())
    } else {
        serde_json::from_value(v)
    }
}
