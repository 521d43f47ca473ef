//! Workflow optimization suggestions.

use crate::backend::{ChatMessage, CompletionRequest, LlmBackend};
use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use weaver_core::Result;
use weaver_workflow::Workflow;

const SYSTEM_PROMPT: &str = "You are an expert workflow optimization assistant. Analyze workflows \
and provide specific, actionable suggestions for improvements.";

const NO_RATIONALE: &str = "No rationale provided";

/// The area a suggestion is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Performance,
    Reliability,
    Security,
    Design,
}

impl SuggestionKind {
    fn parse(text: &str) -> Option<Self> {
        let word: String = text
            .chars()
            .filter(char::is_ascii_alphabetic)
            .collect::<String>()
            .to_ascii_lowercase();
        match word.as_str() {
            "performance" => Some(Self::Performance),
            "reliability" => Some(Self::Reliability),
            "security" => Some(Self::Security),
            "design" => Some(Self::Design),
            _ => None,
        }
    }
}

/// One piece of advice about a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub suggestion: String,
    pub rationale: String,
}

impl Suggestion {
    fn new(kind: SuggestionKind, suggestion: &str, rationale: &str) -> Self {
        Self {
            kind,
            suggestion: suggestion.to_string(),
            rationale: rationale.to_string(),
        }
    }
}

/// Suggestions returned whenever the model cannot be used.
#[must_use]
pub fn fallback_suggestions() -> Vec<Suggestion> {
    vec![
        Suggestion::new(
            SuggestionKind::Performance,
            "Consider adding parallel execution for independent tasks",
            "Independent tasks can be executed simultaneously to reduce overall workflow execution time.",
        ),
        Suggestion::new(
            SuggestionKind::Reliability,
            "Add error handling and retry mechanisms",
            "Implement proper error handling and retries to make the workflow more resilient to temporary failures.",
        ),
        Suggestion::new(
            SuggestionKind::Security,
            "Review data access permissions",
            "Ensure each node only has access to the data it needs to operate.",
        ),
        Suggestion::new(
            SuggestionKind::Design,
            "Optimize workflow structure",
            "Consider grouping related tasks and minimizing dependencies between nodes.",
        ),
    ]
}

/// Parses a model reply into suggestions.
///
/// Blocks are separated by blank lines and read as
/// `<type>: <suggestion> Rationale: <rationale>`. Blocks without a known type
/// or without suggestion text are dropped.
#[must_use]
pub fn parse_suggestions(text: &str) -> Vec<Suggestion> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .filter_map(|block| {
            let (kind, rest) = block.split_once(':')?;
            let kind = SuggestionKind::parse(kind)?;
            let (suggestion, rationale) = match rest.split_once("Rationale:") {
                Some((suggestion, rationale)) => (suggestion.trim(), rationale.trim()),
                None => (rest.trim(), ""),
            };
            if suggestion.is_empty() {
                return None;
            }
            let rationale = if rationale.is_empty() {
                NO_RATIONALE
            } else {
                rationale
            };
            Some(Suggestion::new(kind, suggestion, rationale))
        })
        .collect()
}

fn build_prompt(workflow: &Workflow) -> String {
    let definition = serde_json::to_string_pretty(&workflow.graph).unwrap_or_default();
    let description = workflow.metadata.description.as_deref().unwrap_or("");
    format!(
        "Analyze this workflow and provide optimization suggestions:\n\n\
         Workflow Name: {name}\n\
         Description: {description}\n\
         Definition: {definition}\n\n\
         Provide specific suggestions for improving this workflow in terms of:\n\
         1. Performance optimization\n\
         2. Reliability improvements\n\
         3. Security considerations\n\
         4. Design patterns and best practices\n\n\
         Format each suggestion as its own paragraph: the type \
         (performance/reliability/security/design), a colon, the suggestion \
         itself, then 'Rationale:' and a brief rationale.",
        name = workflow.name(),
    )
}

/// Produces advisory suggestions for workflows.
#[derive(Clone)]
pub struct Advisor {
    backend: Option<Arc<dyn LlmBackend>>,
    timeout: Duration,
}

impl Advisor {
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            timeout,
        }
    }

    /// An advisor that always answers with the fallback list.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            backend: None,
            timeout: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Suggestions for `workflow`, falling back to the fixed list on any
    /// failure.
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id))]
    pub async fn suggest(&self, workflow: &Workflow) -> Vec<Suggestion> {
        match self.try_suggest(workflow).await {
            Ok(suggestions) => suggestions,
            Err(report) => {
                warn!(error = %report, "using fallback suggestions");
                fallback_suggestions()
            }
        }
    }

    /// Asks the backend, without the fallback.
    ///
    /// # Errors
    ///
    /// Returns an `LlmError` report if no backend is configured, the call
    /// fails or times out, or the reply contains no usable suggestion.
    pub async fn try_suggest(&self, workflow: &Workflow) -> Result<Vec<Suggestion>, LlmError> {
        let backend = self.backend.as_ref().ok_or(LlmError::NotConfigured)?;
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(workflow)),
        ]);

        let after_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let text = tokio::time::timeout(self.timeout, backend.complete(&request))
            .await
            .map_err(|_| LlmError::Timeout { after_ms })??;

        let suggestions = parse_suggestions(&text);
        if suggestions.is_empty() {
            return Err(LlmError::EmptyResponse.into());
        }
        debug!(count = suggestions.len(), model = backend.model(), "parsed suggestions");
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use weaver_workflow::WorkflowGraph;

    struct StaticBackend {
        reply: std::result::Result<String, LlmError>,
        delay: Duration,
    }

    impl StaticBackend {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
            })
        }

        fn failing(error: LlmError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(error),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl LlmBackend for StaticBackend {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> std::result::Result<String, LlmError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone()
        }

        fn model(&self) -> &str {
            "static"
        }
    }

    fn workflow() -> Workflow {
        Workflow::new("Nightly export", WorkflowGraph::new())
    }

    #[test]
    fn parses_blocks_with_and_without_rationale() {
        let text = "Performance: Cache the lookup Rationale: It is called per item.\n\n\
                    **Security**: Rotate the API key\n\n\
                    Nonsense without a colon\n\n\
                    Weather: sunny Rationale: not a kind";
        let suggestions = parse_suggestions(text);
        assert_eq!(
            suggestions,
            vec![
                Suggestion::new(
                    SuggestionKind::Performance,
                    "Cache the lookup",
                    "It is called per item."
                ),
                Suggestion::new(SuggestionKind::Security, "Rotate the API key", NO_RATIONALE),
            ]
        );
    }

    #[test]
    fn suggestion_serializes_type_field() {
        let value = serde_json::to_value(&fallback_suggestions()[0]).expect("serialize");
        assert_eq!(value["type"], "performance");
        assert!(value["rationale"].as_str().is_some_and(|r| !r.is_empty()));
    }

    #[test]
    fn prompt_includes_workflow_name() {
        let prompt = build_prompt(&workflow());
        assert!(prompt.contains("Workflow Name: Nightly export"));
        assert!(prompt.contains("Definition:"));
    }

    #[tokio::test]
    async fn uses_model_reply_when_usable() {
        let advisor = Advisor::new(
            StaticBackend::replying("Design: Split the workflow Rationale: It does two jobs."),
            Duration::from_secs(1),
        );
        let suggestions = advisor.suggest(&workflow()).await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, SuggestionKind::Design);
    }

    #[tokio::test]
    async fn falls_back_when_disabled_failing_or_empty() {
        let fallback = fallback_suggestions();

        assert!(!Advisor::disabled().is_enabled());
        assert_eq!(Advisor::disabled().suggest(&workflow()).await, fallback);

        let failing = Advisor::new(
            StaticBackend::failing(LlmError::RateLimited {
                retry_after_secs: None,
            }),
            Duration::from_secs(1),
        );
        assert_eq!(failing.suggest(&workflow()).await, fallback);

        let unparsable = Advisor::new(StaticBackend::replying("I have no idea."), Duration::from_secs(1));
        let report = unparsable.try_suggest(&workflow()).await.err().expect("empty");
        assert_eq!(report.current_context(), &LlmError::EmptyResponse);
        assert_eq!(unparsable.suggest(&workflow()).await, fallback);
    }

    #[tokio::test]
    async fn slow_backend_times_out_to_fallback() {
        let slow = Arc::new(StaticBackend {
            reply: Ok("Design: Fine Rationale: ok".to_string()),
            delay: Duration::from_millis(500),
        });
        let advisor = Advisor::new(slow, Duration::from_millis(20));
        let report = advisor.try_suggest(&workflow()).await.err().expect("timeout");
        assert_eq!(report.current_context(), &LlmError::Timeout { after_ms: 20 });
        assert_eq!(advisor.suggest(&workflow()).await, fallback_suggestions());
    }
}
