use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only writer for the session's `events.jsonl`.
///
/// Every event carries `type`, `job_id` and `ts`; the caller's payload is
/// merged last and may override those defaults. One compact JSON object per
/// line. Cheap to clone and share across the batch runner and the CLI.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    job_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, job_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                job_id: job_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn job_id(&self) -> &str {
        &self.inner.job_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "job_id".to_string(),
            Value::String(self.inner.job_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        event.extend(payload);

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        writeln!(file, "{line}")?;

        Ok(Value::Object(event))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    #[test]
    fn emit_writes_one_json_object_per_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "job_ab12cd34");

        let mut payload = EventPayload::new();
        payload.insert("total".to_string(), json!(3));
        let first = writer.emit("batch_started", payload)?;
        writer.emit("batch_completed", EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: Value = serde_json::from_str(lines[0])?;
        assert_eq!(parsed, first);
        assert_eq!(parsed["type"], json!("batch_started"));
        assert_eq!(parsed["job_id"], json!("job_ab12cd34"));
        assert_eq!(parsed["total"], json!(3));
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or(""))?;

        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(second["type"], json!("batch_completed"));
        Ok(())
    }

    #[test]
    fn caller_payload_wins_over_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "job_1");

        let mut payload = EventPayload::new();
        payload.insert("job_id".to_string(), json!("job_override"));
        let emitted = writer.emit("batch_started", payload)?;

        assert_eq!(emitted["job_id"], json!("job_override"));
        Ok(())
    }

    #[test]
    fn creates_parent_directories() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("runs").join("a").join("events.jsonl");
        let writer = EventWriter::new(&path, "job_1");
        writer.emit("batch_started", EventPayload::new())?;
        assert!(path.exists());
        Ok(())
    }
}
