//! Per-run context that logic nodes read from and write to.
//!
//! The context is a JSON object. The run input sits under `input`, each
//! executed node's output sits under its node id, and transform nodes also
//! publish their result under their configured output key. Values are
//! addressed with dot paths such as `fetch.status` or `input.items.0.sku`.

use crate::error::EvaluationError;
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Key under which the run input is stored.
pub const INPUT_KEY: &str = "input";

/// The accumulated data of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunContext {
    values: Map<String, JsonValue>,
}

impl RunContext {
    /// Creates a context seeded with the run input.
    #[must_use]
    pub fn new(input: JsonValue) -> Self {
        let mut values = Map::new();
        values.insert(INPUT_KEY.to_string(), input);
        Self { values }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        self.values.insert(key.into(), value);
    }

    /// Records a node's output under its id.
    pub fn record_output(&mut self, node_id: &NodeId, output: JsonValue) {
        self.insert(node_id.as_str(), output);
    }

    /// Resolves a dot path. Numeric segments index into arrays.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                JsonValue::Object(map) => map.get(segment)?,
                JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Replaces every `{{ path }}` placeholder with the value at that path.
    ///
    /// Strings are inserted verbatim, other values as compact JSON and
    /// unresolved paths as the empty string. An unterminated `{{` is kept.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };
            match self.get(after[..end].trim()) {
                Some(JsonValue::String(s)) => out.push_str(s),
                Some(JsonValue::Null) | None => {}
                Some(other) => out.push_str(&other.to_string()),
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        out
    }

    /// Renders every string inside `value`, keeping its structure.
    #[must_use]
    pub fn render_json(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => JsonValue::String(self.render(s)),
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|v| self.render_json(v)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Returns the whole context as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.values.clone())
    }
}

/// The computation performed by a transform node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformOp {
    /// Copies the value at `path`. Fails if the path does not resolve.
    Select { path: String },
    /// Emits a constant.
    Literal { value: JsonValue },
    /// Renders a `{{ path }}` template into a string.
    Format { template: String },
    /// Builds an object whose fields are copied from context paths.
    /// Unresolved paths become `null`.
    Object { fields: BTreeMap<String, String> },
}

impl TransformOp {
    /// Computes the transform's value against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` when a `select` path does not resolve.
    pub fn apply(&self, ctx: &RunContext) -> Result<JsonValue, EvaluationError> {
        match self {
            Self::Select { path } => {
                ctx.get(path)
                    .cloned()
                    .ok_or_else(|| EvaluationError::PathNotFound {
                        path: path.clone(),
                    })
            }
            Self::Literal { value } => Ok(value.clone()),
            Self::Format { template } => Ok(JsonValue::String(ctx.render(template))),
            Self::Object { fields } => {
                let object = fields
                    .iter()
                    .map(|(name, path)| {
                        (name.clone(), ctx.get(path).cloned().unwrap_or(JsonValue::Null))
                    })
                    .collect();
                Ok(JsonValue::Object(object))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RunContext {
        let mut ctx = RunContext::new(json!({ "customer": "ada", "items": [{ "sku": "A1" }] }));
        ctx.record_output(&NodeId::from("fetch"), json!({ "status": 200, "ok": true }));
        ctx
    }

    #[test]
    fn get_walks_objects_and_arrays() {
        let ctx = context();
        assert_eq!(ctx.get("input.customer"), Some(&json!("ada")));
        assert_eq!(ctx.get("input.items.0.sku"), Some(&json!("A1")));
        assert_eq!(ctx.get("fetch.status"), Some(&json!(200)));
        assert_eq!(ctx.get("fetch.status.deeper"), None);
        assert_eq!(ctx.get("input.items.9"), None);
        assert_eq!(ctx.get(""), None);
    }

    #[test]
    fn render_substitutes_placeholders() {
        let ctx = context();
        assert_eq!(
            ctx.render("Hello {{ input.customer }}, status {{fetch.status}}{{missing}}!"),
            "Hello ada, status 200!"
        );
        assert_eq!(ctx.render("open {{ brace"), "open {{ brace");
    }

    #[test]
    fn render_json_only_touches_strings() {
        let ctx = context();
        let rendered = ctx.render_json(&json!({
            "to": "{{ input.customer }}",
            "tags": ["{{fetch.status}}", 7],
            "urgent": false
        }));
        assert_eq!(
            rendered,
            json!({ "to": "ada", "tags": ["200", 7], "urgent": false })
        );
    }

    #[test]
    fn transform_ops() {
        let ctx = context();
        let select = TransformOp::Select {
            path: "input.items.0".to_string(),
        };
        assert_eq!(select.apply(&ctx).expect("select"), json!({ "sku": "A1" }));

        let format = TransformOp::Format {
            template: "{{input.customer}}:{{fetch.ok}}".to_string(),
        };
        assert_eq!(format.apply(&ctx).expect("format"), json!("ada:true"));

        let object = TransformOp::Object {
            fields: BTreeMap::from([
                ("who".to_string(), "input.customer".to_string()),
                ("gone".to_string(), "nope".to_string()),
            ]),
        };
        assert_eq!(
            object.apply(&ctx).expect("object"),
            json!({ "who": "ada", "gone": null })
        );
    }

    #[test]
    fn select_missing_path_fails() {
        let err = TransformOp::Select {
            path: "fetch.body".to_string(),
        }
        .apply(&context())
        .unwrap_err();
        assert_eq!(
            err,
            EvaluationError::PathNotFound {
                path: "fetch.body".to_string()
            }
        );
    }
}
