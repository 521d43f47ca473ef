//! Workflow node types and configurations.
//!
//! Every node carries a tagged configuration. The outer tag (`kind`) selects
//! trigger, action or logic; the inner tag (`type`) selects the subtype and
//! its payload. The engine matches on these exhaustively when it dispatches a
//! node.
//!
//! Fields default to empty values when absent so that a partially authored
//! node still loads. Required fields left empty are reported by the
//! validator as dangling configuration.

use crate::condition::Predicate;
use crate::context::TransformOp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a node, unique within one graph.
///
/// Node ids are authored alongside the graph (the editor assigns them), so
/// they are plain strings rather than generated ULIDs. Their ordering is what
/// breaks ties when the planner has several ready nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The kind of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point that starts a run. Never has inbound edges.
    Trigger,
    /// Performs an external effect through a connector.
    Action,
    /// In-process decision, transformation or delay.
    Logic,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trigger => write!(f, "trigger"),
            Self::Action => write!(f, "action"),
            Self::Logic => write!(f, "logic"),
        }
    }
}

/// Configuration for trigger nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerNodeConfig {
    /// Cron-style scheduled trigger.
    Schedule {
        /// Cron expression, e.g. `0 9 * * 1` for Mondays at 9am.
        #[serde(default)]
        cron: String,
    },
    /// Inbound HTTP webhook.
    Webhook {
        #[serde(default = "default_webhook_method")]
        method: String,
        #[serde(default)]
        path: String,
    },
    /// Fires when files matching `pattern` change under `path`.
    FileWatch {
        #[serde(default)]
        path: String,
        #[serde(default = "default_watch_pattern")]
        pattern: String,
    },
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

fn default_watch_pattern() -> String {
    "*.*".to_string()
}

/// What a file operation node does to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperationKind {
    #[default]
    Read,
    Write,
    Append,
    Delete,
}

impl fmt::Display for FileOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Append => write!(f, "append"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Configuration for action nodes.
///
/// String fields may contain `{{path}}` placeholders which connectors
/// resolve against the run context before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionNodeConfig {
    SendEmail {
        #[serde(default)]
        to: String,
        #[serde(default)]
        subject: String,
        #[serde(default)]
        body: String,
    },
    DatabaseQuery {
        #[serde(default)]
        query: String,
        /// Positional parameters bound as `$1`, `$2`, ...
        #[serde(default)]
        parameters: Vec<JsonValue>,
    },
    FileOperation {
        #[serde(default)]
        operation: FileOperationKind,
        #[serde(default)]
        path: String,
        /// Contents for `write` and `append`.
        #[serde(default)]
        contents: Option<String>,
    },
    HttpRequest {
        #[serde(default = "default_http_method")]
        method: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<JsonValue>,
    },
}

fn default_http_method() -> String {
    "GET".to_string()
}

/// The action subtypes, used to key the connector registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSubtype {
    SendEmail,
    DatabaseQuery,
    FileOperation,
    HttpRequest,
}

impl fmt::Display for ActionSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        NodeSubtype::from(*self).fmt(f)
    }
}

impl ActionNodeConfig {
    #[must_use]
    pub fn subtype(&self) -> ActionSubtype {
        match self {
            Self::SendEmail { .. } => ActionSubtype::SendEmail,
            Self::DatabaseQuery { .. } => ActionSubtype::DatabaseQuery,
            Self::FileOperation { .. } => ActionSubtype::FileOperation,
            Self::HttpRequest { .. } => ActionSubtype::HttpRequest,
        }
    }
}

/// Configuration for logic nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogicNodeConfig {
    /// Chooses between the `true` and `false` successor sets.
    Condition {
        #[serde(default)]
        predicate: Option<Predicate>,
    },
    /// Derives a value and stores it in the run context under `output`.
    Transform {
        #[serde(default)]
        output: String,
        #[serde(default)]
        transform: Option<TransformOp>,
    },
    /// Suspends the run for `duration_ms`.
    Delay {
        #[serde(default = "default_delay_ms")]
        duration_ms: u64,
    },
}

fn default_delay_ms() -> u64 {
    1000
}

/// Typed node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    Trigger(TriggerNodeConfig),
    Action(ActionNodeConfig),
    Logic(LogicNodeConfig),
}

/// Flat list of every node subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSubtype {
    Schedule,
    Webhook,
    FileWatch,
    SendEmail,
    DatabaseQuery,
    FileOperation,
    HttpRequest,
    Condition,
    Transform,
    Delay,
}

impl fmt::Display for NodeSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schedule => "schedule",
            Self::Webhook => "webhook",
            Self::FileWatch => "file_watch",
            Self::SendEmail => "send_email",
            Self::DatabaseQuery => "database_query",
            Self::FileOperation => "file_operation",
            Self::HttpRequest => "http_request",
            Self::Condition => "condition",
            Self::Transform => "transform",
            Self::Delay => "delay",
        };
        f.write_str(name)
    }
}

impl From<ActionSubtype> for NodeSubtype {
    fn from(subtype: ActionSubtype) -> Self {
        match subtype {
            ActionSubtype::SendEmail => Self::SendEmail,
            ActionSubtype::DatabaseQuery => Self::DatabaseQuery,
            ActionSubtype::FileOperation => Self::FileOperation,
            ActionSubtype::HttpRequest => Self::HttpRequest,
        }
    }
}

impl NodeConfig {
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Trigger(_) => NodeKind::Trigger,
            Self::Action(_) => NodeKind::Action,
            Self::Logic(_) => NodeKind::Logic,
        }
    }

    #[must_use]
    pub fn subtype(&self) -> NodeSubtype {
        match self {
            Self::Trigger(TriggerNodeConfig::Schedule { .. }) => NodeSubtype::Schedule,
            Self::Trigger(TriggerNodeConfig::Webhook { .. }) => NodeSubtype::Webhook,
            Self::Trigger(TriggerNodeConfig::FileWatch { .. }) => NodeSubtype::FileWatch,
            Self::Action(action) => action.subtype().into(),
            Self::Logic(LogicNodeConfig::Condition { .. }) => NodeSubtype::Condition,
            Self::Logic(LogicNodeConfig::Transform { .. }) => NodeSubtype::Transform,
            Self::Logic(LogicNodeConfig::Delay { .. }) => NodeSubtype::Delay,
        }
    }

    /// Returns the names of required fields that are empty or absent.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let mut require = |name: &'static str, present: bool| {
            if !present {
                missing.push(name);
            }
        };

        match self {
            Self::Trigger(TriggerNodeConfig::Schedule { cron }) => {
                require("cron", !cron.trim().is_empty());
            }
            Self::Trigger(TriggerNodeConfig::Webhook { path, .. }) => {
                require("path", !path.trim().is_empty());
            }
            Self::Trigger(TriggerNodeConfig::FileWatch { path, .. }) => {
                require("path", !path.trim().is_empty());
            }
            Self::Action(ActionNodeConfig::SendEmail { to, .. }) => {
                require("to", !to.trim().is_empty());
            }
            Self::Action(ActionNodeConfig::DatabaseQuery { query, .. }) => {
                require("query", !query.trim().is_empty());
            }
            Self::Action(ActionNodeConfig::FileOperation {
                operation,
                path,
                contents,
            }) => {
                require("path", !path.trim().is_empty());
                if matches!(operation, FileOperationKind::Write | FileOperationKind::Append) {
                    require("contents", contents.is_some());
                }
            }
            Self::Action(ActionNodeConfig::HttpRequest { url, .. }) => {
                require("url", !url.trim().is_empty());
            }
            Self::Logic(LogicNodeConfig::Condition { predicate }) => {
                require("predicate", predicate.is_some());
            }
            Self::Logic(LogicNodeConfig::Transform { output, transform }) => {
                require("output", !output.trim().is_empty());
                require("transform", transform.is_some());
            }
            Self::Logic(LogicNodeConfig::Delay { .. }) => {}
        }

        missing
    }

    /// Returns true for logic nodes that pick a branch at run time.
    #[must_use]
    pub fn is_condition(&self) -> bool {
        matches!(self, Self::Logic(LogicNodeConfig::Condition { .. }))
    }
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Human-readable label shown in the editor.
    #[serde(default)]
    pub label: String,
    pub config: NodeConfig,
}

impl Node {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            config,
        }
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }

    #[must_use]
    pub fn subtype(&self) -> NodeSubtype {
        self.config.subtype()
    }

    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.kind() == NodeKind::Trigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_nested_tags() {
        let node: Node = serde_json::from_value(json!({
            "id": "fetch",
            "label": "Fetch orders",
            "config": { "kind": "action", "type": "http_request", "url": "https://x" }
        }))
        .expect("deserialize");

        assert_eq!(node.kind(), NodeKind::Action);
        assert_eq!(node.subtype(), NodeSubtype::HttpRequest);
        match node.config {
            NodeConfig::Action(ActionNodeConfig::HttpRequest { method, headers, .. }) => {
                assert_eq!(method, "GET");
                assert!(headers.is_empty());
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn defaults_fill_absent_fields() {
        let node: Node = serde_json::from_value(json!({
            "id": "wait",
            "config": { "kind": "logic", "type": "delay" }
        }))
        .expect("deserialize");

        assert_eq!(
            node.config,
            NodeConfig::Logic(LogicNodeConfig::Delay { duration_ms: 1000 })
        );
        assert!(node.label.is_empty());
    }

    #[test]
    fn missing_fields_reports_empty_required_values() {
        let config = NodeConfig::Action(ActionNodeConfig::HttpRequest {
            method: "GET".to_string(),
            url: "  ".to_string(),
            headers: BTreeMap::new(),
            body: None,
        });
        assert_eq!(config.missing_fields(), vec!["url"]);

        let config = NodeConfig::Logic(LogicNodeConfig::Transform {
            output: String::new(),
            transform: None,
        });
        assert_eq!(config.missing_fields(), vec!["output", "transform"]);

        let config = NodeConfig::Action(ActionNodeConfig::FileOperation {
            operation: FileOperationKind::Write,
            path: "out.txt".to_string(),
            contents: None,
        });
        assert_eq!(config.missing_fields(), vec!["contents"]);
    }

    #[test]
    fn complete_configs_have_no_missing_fields() {
        let config = NodeConfig::Trigger(TriggerNodeConfig::Schedule {
            cron: "0 9 * * 1".to_string(),
        });
        assert!(config.missing_fields().is_empty());
        assert!(
            NodeConfig::Logic(LogicNodeConfig::Delay { duration_ms: 5 })
                .missing_fields()
                .is_empty()
        );
    }

    #[test]
    fn subtype_display_matches_wire_name() {
        assert_eq!(NodeSubtype::FileWatch.to_string(), "file_watch");
        assert_eq!(ActionSubtype::SendEmail.to_string(), "send_email");
        assert_eq!(
            serde_json::to_value(ActionSubtype::HttpRequest).expect("serialize"),
            json!("http_request")
        );
    }

    #[test]
    fn node_ids_order_lexically() {
        let mut ids = vec![NodeId::from("b"), NodeId::from("a"), NodeId::from("c")];
        ids.sort();
        assert_eq!(ids, vec![NodeId::from("a"), NodeId::from("b"), NodeId::from("c")]);
    }
}
