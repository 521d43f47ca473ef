//! JSON API handlers.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::info;
use weaver_ai::Suggestion;
use weaver_core::{WorkflowId, WorkflowRunId};
use weaver_workflow::{
    ExecutionPlan, NodeId, ValidationError, Workflow, WorkflowGraph, WorkflowRun, WorkflowSummary,
    check, plan, validate,
};

type ApiResult<T> = Result<T, ApiError>;

/// Body for creating or replacing a workflow.
#[derive(Debug, Deserialize)]
pub struct WorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub graph: WorkflowGraph,
}

/// Body for starting a run.
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub input: JsonValue,
    /// Fire only this trigger.
    #[serde(default)]
    pub trigger: Option<NodeId>,
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    /// False if any error is blocking.
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

/// A started run and the validation warnings it started with.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub run: WorkflowRun,
    pub warnings: Vec<ValidationError>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub workflow_id: WorkflowId,
    pub suggestions: Vec<Suggestion>,
}

fn parse_workflow_id(raw: &str) -> ApiResult<WorkflowId> {
    Ok(raw.parse()?)
}

fn parse_run_id(raw: &str) -> ApiResult<WorkflowRunId> {
    Ok(raw.parse()?)
}

fn bad_request(message: &str) -> ApiError {
    ApiError::BadRequest {
        message: message.to_string(),
    }
}

async fn load_workflow(state: &AppState, raw_id: &str) -> ApiResult<Workflow> {
    let workflow_id = parse_workflow_id(raw_id)?;
    Ok(state.store.get_workflow(workflow_id).await?)
}

pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_workflows(State(state): State<Arc<AppState>>) -> Json<Vec<WorkflowSummary>> {
    Json(state.store.list_workflows().await)
}

pub async fn create_workflow(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WorkflowRequest>,
) -> ApiResult<(StatusCode, Json<Workflow>)> {
    if request.name.trim().is_empty() {
        return Err(bad_request("workflow name is required"));
    }
    let mut workflow = Workflow::new(request.name, request.graph);
    workflow.metadata.description = request.description;
    if let Some(is_active) = request.is_active {
        workflow.metadata.is_active = is_active;
    }
    state.store.save_workflow(workflow.clone()).await;
    info!(workflow_id = %workflow.id, nodes = workflow.graph.node_count(), "workflow created");
    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Workflow>> {
    Ok(Json(load_workflow(&state, &id).await?))
}

pub async fn update_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<WorkflowRequest>,
) -> ApiResult<Json<Workflow>> {
    if request.name.trim().is_empty() {
        return Err(bad_request("workflow name is required"));
    }
    let mut workflow = load_workflow(&state, &id).await?;
    workflow.metadata.name = request.name;
    workflow.metadata.description = request.description;
    if let Some(is_active) = request.is_active {
        workflow.metadata.is_active = is_active;
    }
    workflow.replace_graph(request.graph);
    state.store.save_workflow(workflow.clone()).await;
    info!(workflow_id = %workflow.id, "workflow updated");
    Ok(Json(workflow))
}

pub async fn validate_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ValidationReport>> {
    let workflow = load_workflow(&state, &id).await?;
    let errors = check(&workflow.graph);
    Ok(Json(ValidationReport {
        valid: !errors.iter().any(ValidationError::is_blocking),
        errors,
    }))
}

pub async fn plan_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExecutionPlan>> {
    let workflow = load_workflow(&state, &id).await?;
    let validated = validate(&workflow.graph).map_err(|errors| ApiError::Validation { errors })?;
    let execution_plan = plan(&validated).map_err(|report| ApiError::Internal {
        details: report.to_string(),
    })?;
    Ok(Json(execution_plan))
}

pub async fn execute_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> ApiResult<(StatusCode, Json<ExecuteResponse>)> {
    let workflow_id = parse_workflow_id(&id)?;
    let handle = state
        .orchestrator
        .start_run(workflow_id, request.input, request.trigger)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ExecuteResponse {
            run: handle.run,
            warnings: handle.warnings,
        }),
    ))
}

pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<WorkflowRun>>> {
    let workflow_id = parse_workflow_id(&id)?;
    Ok(Json(state.orchestrator.list_runs(workflow_id).await?))
}

pub async fn suggestions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuggestionsResponse>> {
    let workflow = load_workflow(&state, &id).await?;
    let suggestions = state.advisor.suggest(&workflow).await;
    Ok(Json(SuggestionsResponse {
        workflow_id: workflow.id,
        suggestions,
    }))
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowRun>> {
    let run_id = parse_run_id(&id)?;
    Ok(Json(state.orchestrator.get_run(run_id).await?))
}

pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let run_id = parse_run_id(&id)?;
    state.orchestrator.cancel(run_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": run_id, "cancelling": true })),
    ))
}

#[cfg(test)]
mod tests {
    use crate::app;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value as JsonValue, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use weaver_ai::Advisor;
    use weaver_workflow::{
        ActionSubtype, ConnectorRegistry, EngineConfig, EventFanout, InMemoryRunStore,
        MockConnector, Orchestrator,
    };

    fn state() -> Arc<AppState> {
        let store = Arc::new(InMemoryRunStore::new());
        let connectors = ConnectorRegistry::new().with(
            ActionSubtype::HttpRequest,
            Arc::new(MockConnector::succeeding(json!({ "status": 200 }))),
        );
        let orchestrator = Orchestrator::new(
            store.clone(),
            connectors,
            EventFanout::new(),
            EngineConfig::default(),
        );
        Arc::new(AppState::new(store, orchestrator, Advisor::disabled()))
    }

    async fn call(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        body: Option<JsonValue>,
    ) -> (StatusCode, JsonValue) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app(state.clone())
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
        (status, value)
    }

    fn schedule_then_http() -> JsonValue {
        json!({
            "name": "Morning ping",
            "graph": {
                "nodes": [
                    { "id": "cron", "label": "Every morning",
                      "config": { "kind": "trigger", "type": "schedule", "cron": "0 9 * * *" } },
                    { "id": "ping", "label": "Ping",
                      "config": { "kind": "action", "type": "http_request", "url": "https://x" } }
                ],
                "edges": [ { "source": "cron", "target": "ping" } ]
            }
        })
    }

    async fn create(state: &Arc<AppState>, body: JsonValue) -> String {
        let (status, workflow) = call(state, Method::POST, "/api/workflows", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        workflow["id"].as_str().expect("id").to_string()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = call(&state(), Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_fetch_update_and_list_workflows() {
        let state = state();
        let id = create(&state, schedule_then_http()).await;

        let (status, workflow) =
            call(&state, Method::GET, &format!("/api/workflows/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(workflow["metadata"]["name"], "Morning ping");
        assert_eq!(workflow["graph"]["nodes"].as_array().map(Vec::len), Some(2));

        let (status, updated) = call(
            &state,
            Method::PUT,
            &format!("/api/workflows/{id}"),
            Some(json!({ "name": "Renamed", "is_active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["metadata"]["name"], "Renamed");
        assert_eq!(updated["metadata"]["is_active"], false);

        let (status, list) = call(&state, Method::GET, "/api/workflows", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["name"], "Renamed");
        assert_eq!(list[0]["node_count"], 0);
    }

    #[tokio::test]
    async fn bad_and_unknown_ids() {
        let state = state();
        let (status, _) = call(&state, Method::GET, "/api/workflows/not-an-id", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = weaver_core::WorkflowId::new();
        let (status, _) =
            call(&state, Method::GET, &format!("/api/workflows/{unknown}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let run = weaver_core::WorkflowRunId::new();
        let (status, _) = call(&state, Method::GET, &format!("/api/runs/{run}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) =
            call(&state, Method::POST, &format!("/api/runs/{run}/cancel"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn invalid_graph_is_reported_and_not_run() {
        let state = state();
        let id = create(&state, json!({ "name": "Empty" })).await;

        let (status, report) = call(
            &state,
            Method::POST,
            &format!("/api/workflows/{id}/validate"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["valid"], false);
        assert_eq!(report["errors"][0]["kind"], "no_trigger");

        let (status, body) = call(
            &state,
            Method::POST,
            &format!("/api/workflows/{id}/execute"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0]["kind"], "no_trigger");

        let (_, runs) = call(&state, Method::GET, &format!("/api/workflows/{id}/runs"), None).await;
        assert_eq!(runs, json!([]));
    }

    #[tokio::test]
    async fn plan_lists_nodes_in_order() {
        let state = state();
        let id = create(&state, schedule_then_http()).await;
        let (status, plan) =
            call(&state, Method::GET, &format!("/api/workflows/{id}/plan"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(plan["order"], json!(["cron", "ping"]));
    }

    #[tokio::test]
    async fn execute_runs_to_completion() {
        let state = state();
        let id = create(&state, schedule_then_http()).await;

        let (status, started) = call(
            &state,
            Method::POST,
            &format!("/api/workflows/{id}/execute"),
            Some(json!({ "input": { "who": "ops" } })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(started["warnings"], json!([]));
        let run_id = started["run"]["id"].as_str().expect("run id").to_string();

        let mut snapshot = JsonValue::Null;
        for _ in 0..100 {
            let (_, body) = call(&state, Method::GET, &format!("/api/runs/{run_id}"), None).await;
            snapshot = body;
            if snapshot["status"] == "succeeded" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(snapshot["status"], "succeeded");
        assert_eq!(snapshot["steps"][0]["node_id"], "cron");
        assert_eq!(snapshot["steps"][1]["node_id"], "ping");

        let (_, runs) = call(&state, Method::GET, &format!("/api/workflows/{id}/runs"), None).await;
        assert_eq!(runs.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn execute_returns_dangling_config_warnings() {
        let state = state();
        let mut body = schedule_then_http();
        body["graph"]["nodes"][1]["config"]["url"] = json!("");
        let id = create(&state, body).await;

        let (status, started) = call(
            &state,
            Method::POST,
            &format!("/api/workflows/{id}/execute"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(started["run"]["status"], "pending");
        assert_eq!(started["warnings"][0]["kind"], "dangling_config");
        assert_eq!(started["warnings"][0]["node_id"], "ping");
        assert_eq!(started["warnings"][0]["missing_fields"], json!(["url"]));
    }

    #[tokio::test]
    async fn unknown_trigger_is_a_bad_request() {
        let state = state();
        let id = create(&state, schedule_then_http()).await;
        let (status, _) = call(
            &state,
            Method::POST,
            &format!("/api/workflows/{id}/execute"),
            Some(json!({ "trigger": "ping" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn suggestions_fall_back_without_backend() {
        let state = state();
        let id = create(&state, schedule_then_http()).await;
        let (status, body) = call(
            &state,
            Method::GET,
            &format!("/api/workflows/{id}/suggestions"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let kinds: Vec<&str> = body["suggestions"]
            .as_array()
            .expect("suggestions")
            .iter()
            .filter_map(|s| s["type"].as_str())
            .collect();
        assert_eq!(kinds, ["performance", "reliability", "security", "design"]);
    }
}
