//! HTTP request connector.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Value as JsonValue, json};
use tracing::debug;
use weaver_workflow::{ActionConnector, ActionNodeConfig, ConnectorError, RunContext};

/// Sends `http_request` actions.
///
/// The URL, header values and string leaves of the body are rendered
/// against the run context first. A non-2xx answer fails the node.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn parse_method(method: &str) -> Result<Method, ConnectorError> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
        ConnectorError::InvalidConfig {
            reason: format!("invalid HTTP method: {method}"),
        }
    })
}

#[async_trait]
impl ActionConnector for HttpConnector {
    async fn execute(
        &self,
        config: &ActionNodeConfig,
        ctx: &RunContext,
    ) -> Result<JsonValue, ConnectorError> {
        let ActionNodeConfig::HttpRequest {
            method,
            url,
            headers,
            body,
        } = config
        else {
            return Err(ConnectorError::Unsupported {
                subtype: config.subtype(),
            });
        };

        let method = parse_method(method)?;
        let url = ctx.render(url);
        debug!(%method, %url, "sending http request");

        let mut request = self.client.request(method, &url);
        for (name, value) in headers {
            request = request.header(name.as_str(), ctx.render(value));
        }
        if let Some(body) = body {
            request = request.json(&ctx.render_json(body));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConnectorError::ConnectionFailed {
                reason: e.to_string(),
            })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ConnectorError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(ConnectorError::RequestFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        let body = serde_json::from_str(&text).unwrap_or(JsonValue::String(text));
        Ok(json!({ "status": status.as_u16(), "body": body }))
    }
}
