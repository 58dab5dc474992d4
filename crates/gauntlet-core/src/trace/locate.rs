use super::session::SessionEvents;
use crate::errors::TranscriptError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const EVENTS_FILE: &str = "events.jsonl";

/// Maps session ids to their on-disk event logs: `<root>/<session_id>/events.jsonl`.
#[derive(Debug, Clone)]
pub struct TranscriptLocator {
    root: PathBuf,
}

impl TranscriptLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id).join(EVENTS_FILE)
    }

    pub fn load(&self, session_id: &str) -> Result<SessionEvents, TranscriptError> {
        let path = self.path_for(session_id);
        let events = SessionEvents::from_path(session_id, &path)?;
        tracing::debug!(
            session_id,
            events = events.len(),
            skipped = events.skipped_lines(),
            "loaded transcript"
        );
        Ok(events)
    }

    /// Records every session's event log as it is now, so sessions created
    /// or written afterwards can be told apart.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            seen: self.stamps().collect(),
        }
    }

    /// Newest session that is absent from `before` or whose event log has
    /// changed since it was taken.
    ///
    /// Used when the assistant does not report its session id: a process
    /// started right after the snapshot owns whatever session appeared.
    /// Log mtimes lag `SystemTime::now()`, so this never compares against a
    /// start time.
    pub fn latest_since(&self, before: &SessionSnapshot) -> Option<String> {
        self.stamps()
            .filter(|(id, stamp)| before.seen.get(id) != Some(stamp))
            .map(|(id, stamp)| (stamp.modified, id))
            .max()
            .map(|(_, id)| id)
    }

    fn stamps(&self) -> impl Iterator<Item = (String, LogStamp)> {
        std::fs::read_dir(&self.root)
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let id = e.file_name().to_str()?.to_string();
                let meta = std::fs::metadata(e.path().join(EVENTS_FILE)).ok()?;
                let stamp = LogStamp {
                    modified: meta.modified().ok()?,
                    len: meta.len(),
                };
                Some((id, stamp))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LogStamp {
    modified: SystemTime,
    len: u64,
}

/// Event-log stamps of every session present when it was taken.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    seen: HashMap<String, LogStamp>,
}

impl SessionSnapshot {
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_session(root: &Path, id: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(EVENTS_FILE),
            r#"{"type":"assistant.turn_start","data":{},"id":"1","timestamp":"2025-01-01T10:00:00Z"}
"#,
        )
        .unwrap();
    }

    #[test]
    fn missing_session_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = TranscriptLocator::new(tmp.path());
        let err = locator.load("nope").unwrap_err();
        assert!(matches!(err, TranscriptError::NotFound { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn loads_by_id() {
        let tmp = tempfile::tempdir().unwrap();
        write_session(tmp.path(), "abc");
        let events = TranscriptLocator::new(tmp.path()).load("abc").unwrap();
        assert_eq!(events.session_id(), "abc");
        assert_eq!(events.turn_count(), 1);
    }

    #[test]
    fn latest_since_ignores_sessions_in_the_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = TranscriptLocator::new(tmp.path());
        write_session(tmp.path(), "old");

        let before = locator.snapshot();
        assert_eq!(before.len(), 1);
        assert_eq!(locator.latest_since(&before), None);
        assert_eq!(
            locator.latest_since(&SessionSnapshot::default()).as_deref(),
            Some("old")
        );
    }

    #[test]
    fn session_written_right_after_the_snapshot_is_found() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = TranscriptLocator::new(tmp.path());
        write_session(tmp.path(), "old");

        let before = locator.snapshot();
        write_session(tmp.path(), "new");
        assert_eq!(locator.latest_since(&before).as_deref(), Some("new"));
    }

    #[test]
    fn appended_session_counts_as_changed() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = TranscriptLocator::new(tmp.path());
        write_session(tmp.path(), "resumed");

        let before = locator.snapshot();
        let path = locator.path_for("resumed");
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str(
            r#"{"type":"session.task_complete","data":{},"id":"2","timestamp":"2025-01-01T10:01:00Z"}
"#,
        );
        std::fs::write(&path, text).unwrap();
        assert_eq!(locator.latest_since(&before).as_deref(), Some("resumed"));
    }

    #[test]
    fn latest_since_on_missing_root() {
        let locator = TranscriptLocator::new("/definitely/not/here");
        assert!(locator.snapshot().is_empty());
        assert_eq!(locator.latest_since(&SessionSnapshot::default()), None);
    }
}
