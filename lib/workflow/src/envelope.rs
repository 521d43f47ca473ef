//! Versioned envelope for data sent to observers.
//!
//! Every event leaving the process is wrapped as `{ "version", "payload" }`
//! so clients can detect a format they do not understand.

use serde::{Deserialize, Serialize};

/// The current envelope version.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned wrapper around a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload at the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serializes the envelope to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<T: for<'de> Deserialize<'de>> Envelope<T> {
    /// Parses an envelope from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not an envelope of `T`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionEvent, RunStatus};
    use chrono::Utc;
    use weaver_core::{WorkflowId, WorkflowRunId};

    #[test]
    fn wraps_events_with_version() {
        let event = ExecutionEvent::RunStatusChanged {
            run_id: WorkflowRunId::new(),
            workflow_id: WorkflowId::new(),
            seq: 0,
            status: RunStatus::Running,
            error: None,
            timestamp: Utc::now(),
        };
        let text = Envelope::new(event.clone()).to_json().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["version"], CURRENT_VERSION);
        assert_eq!(value["payload"]["type"], "run_status_changed");

        let parsed: Envelope<ExecutionEvent> = Envelope::from_json(&text).expect("parse");
        assert!(parsed.is_current_version());
        assert_eq!(parsed.into_payload(), event);
    }
}
