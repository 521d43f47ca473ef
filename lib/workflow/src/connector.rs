//! Action connectors and the registry the engine dispatches through.
//!
//! The engine knows nothing about email, HTTP, databases or files. It looks
//! up the connector registered for an action's subtype and hands it the
//! node's configuration plus the run context. Concrete connectors live in
//! the integration crate.

use crate::context::RunContext;
use crate::error::ConnectorError;
use crate::node::{ActionNodeConfig, ActionSubtype};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Executes one kind of action node.
#[async_trait]
pub trait ActionConnector: Send + Sync {
    /// Performs the action and returns its output.
    async fn execute(
        &self,
        config: &ActionNodeConfig,
        ctx: &RunContext,
    ) -> Result<JsonValue, ConnectorError>;
}

/// Maps action subtypes to connectors.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<ActionSubtype, Arc<dyn ActionConnector>>,
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connector` for `subtype`, replacing any previous one.
    pub fn register(&mut self, subtype: ActionSubtype, connector: Arc<dyn ActionConnector>) {
        self.connectors.insert(subtype, connector);
    }

    #[must_use]
    pub fn with(mut self, subtype: ActionSubtype, connector: Arc<dyn ActionConnector>) -> Self {
        self.register(subtype, connector);
        self
    }

    #[must_use]
    pub fn get(&self, subtype: ActionSubtype) -> Option<Arc<dyn ActionConnector>> {
        self.connectors.get(&subtype).cloned()
    }

    /// Registered subtypes, in no particular order.
    pub fn subtypes(&self) -> impl Iterator<Item = ActionSubtype> + '_ {
        self.connectors.keys().copied()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("subtypes", &self.connectors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A connector that succeeds or fails with a fixed result.
///
/// Counts its calls and can be slowed down to exercise timeouts.
pub struct MockConnector {
    /// If set, every call fails with this error.
    pub fail_with: Option<ConnectorError>,
    /// The output returned on success.
    pub output: JsonValue,
    /// How long each call sleeps before answering.
    pub delay: Duration,
    calls: AtomicUsize,
}

impl MockConnector {
    #[must_use]
    pub fn succeeding(output: JsonValue) -> Self {
        Self {
            fail_with: None,
            output,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing(error: ConnectorError) -> Self {
        Self {
            fail_with: Some(error),
            output: JsonValue::Null,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of times `execute` has been called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionConnector for MockConnector {
    async fn execute(
        &self,
        _config: &ActionNodeConfig,
        _ctx: &RunContext,
    ) -> Result<JsonValue, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(self.output.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email() -> ActionNodeConfig {
        ActionNodeConfig::SendEmail {
            to: "ops@example.com".to_string(),
            subject: "hi".to_string(),
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_subtype() {
        let mock = Arc::new(MockConnector::succeeding(json!({ "sent": true })));
        let registry = ConnectorRegistry::new().with(ActionSubtype::SendEmail, mock.clone());

        let connector = registry.get(ActionSubtype::SendEmail).expect("registered");
        let output = connector
            .execute(&email(), &RunContext::default())
            .await
            .expect("execute");
        assert_eq!(output, json!({ "sent": true }));
        assert_eq!(mock.calls(), 1);
        assert!(registry.get(ActionSubtype::HttpRequest).is_none());
    }

    #[tokio::test]
    async fn failing_mock_returns_its_error() {
        let mock = MockConnector::failing(ConnectorError::ConnectionFailed {
            reason: "refused".to_string(),
        });
        let err = mock
            .execute(&email(), &RunContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("refused"));
    }
}
