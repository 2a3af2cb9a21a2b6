use moa_core::SCHEMA_VERSION;
use moa_engine::EventRecord;
use moa_engine::Snapshot;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

/// Frames delivered to subscribers. All per-run traffic is EVENT and
/// SNAPSHOT; HELLO greets a new subscriber and ERROR reports a failed
/// runner.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frame {
    Hello {
        schema_version: String,
        server_time_ms: u64,
        run_id: Option<String>,
    },
    Snapshot(Snapshot),
    Event(EventRecord),
    Error {
        schema_version: String,
        message: String,
        details: Value,
    },
}

impl Frame {
    pub fn hello(run_id: Option<String>) -> Self {
        Self::Hello {
            schema_version: SCHEMA_VERSION.to_string(),
            server_time_ms: server_time_ms(),
            run_id,
        }
    }
    pub fn snapshot(snapshot: Snapshot) -> Self {
        Self::Snapshot(snapshot)
    }
    pub fn event(event: EventRecord) -> Self {
        Self::Event(event)
    }
    pub fn error(message: impl Into<String>, details: Value) -> Self {
        Self::Error {
            schema_version: SCHEMA_VERSION.to_string(),
            message: message.into(),
            details,
        }
    }
    pub fn to_json(&self) -> Value {
        json!(self)
    }
}

fn server_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_frame_shape() {
        let frame = Frame::hello(Some("run-1".into())).to_json();
        assert_eq!(frame["type"], "HELLO");
        assert_eq!(frame["payload"]["run_id"], "run-1");
        assert_eq!(frame["payload"]["schema_version"], "v1");
        assert!(frame["payload"]["server_time_ms"].is_u64());
    }

    #[test]
    fn error_frame_carries_details() {
        let frame = Frame::error("runner failed", json!({"cause": "boom"})).to_json();
        assert_eq!(frame["type"], "ERROR");
        assert_eq!(frame["payload"]["message"], "runner failed");
        assert_eq!(frame["payload"]["details"]["cause"], "boom");
    }
}
