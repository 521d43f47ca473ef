//! Strongly-typed identifiers.
//!
//! Workflows, runs and observer subscriptions are identified by ULIDs, which
//! sort by creation time. Node ids are different: they are authored by the
//! user as part of a graph and live in the workflow crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Generates a ULID newtype that displays as `<prefix>_<ulid>`.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a freshly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// The prefix used when displaying this ID.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Accept both the prefixed display form and a bare ULID.
                let ulid_str = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }
    };
}

define_id!(
    /// Identifies a stored workflow (its metadata and graph).
    WorkflowId,
    "wf"
);

define_id!(
    /// Identifies one execution attempt of a workflow.
    WorkflowRunId,
    "run"
);

define_id!(
    /// Identifies one observer subscription in the event fanout.
    SubscriptionId,
    "sub"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_prefix() {
        assert!(WorkflowId::new().to_string().starts_with("wf_"));
        assert!(WorkflowRunId::new().to_string().starts_with("run_"));
        assert!(SubscriptionId::new().to_string().starts_with("sub_"));
    }

    #[test]
    fn parse_with_and_without_prefix() {
        let id = WorkflowRunId::new();
        let parsed: WorkflowRunId = id.to_string().parse().expect("prefixed");
        assert_eq!(id, parsed);

        let bare: WorkflowRunId = id.as_ulid().to_string().parse().expect("bare");
        assert_eq!(id, bare);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "wf_nope".parse::<WorkflowId>().unwrap_err();
        assert_eq!(err.id_type, "WorkflowId");
    }

    #[test]
    fn ids_order_by_creation() {
        let first = WorkflowRunId::from_ulid(Ulid::from_parts(1, 0));
        let second = WorkflowRunId::from_ulid(Ulid::from_parts(2, 0));
        assert!(first < second);
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let id = WorkflowId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
        let parsed: WorkflowId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
