//! Observer WebSocket.
//!
//! Each connection owns one [`ObserverSession`]. Client frames are JSON
//! [`ClientMessage`]s; everything sent back is an [`Envelope`] holding
//! either an [`ExecutionEvent`] or a [`ServerMessage`].

use crate::state::AppState;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use weaver_workflow::{
    ClientMessage, Envelope, ExecutionEvent, ObserverSession, Orchestrator, WorkflowRun,
};

/// Control replies to client messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current state of a run, sent right after subscribing to it.
    ///
    /// Queued events with `seq <= last_seq` are already reflected in `run`.
    RunSnapshot {
        run: WorkflowRun,
        last_seq: Option<u64>,
    },
    Pong,
    Error { message: String },
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn to_frame<T: Serialize>(payload: T) -> Option<Message> {
    match Envelope::new(payload).to_json() {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!(error = %e, "failed to serialize observer frame");
            None
        }
    }
}

/// The reply owed to a client message, if any.
///
/// The session has already registered a subscription by the time this
/// runs, so a snapshot taken here cannot miss a later event.
pub async fn reply_to(orchestrator: &Orchestrator, message: &ClientMessage) -> Option<ServerMessage> {
    match message {
        ClientMessage::Subscribe { run_id } => Some(match orchestrator.get_run(*run_id).await {
            Ok(run) => ServerMessage::RunSnapshot {
                last_seq: run.last_seq(),
                run,
            },
            Err(report) => ServerMessage::Error {
                message: report.to_string(),
            },
        }),
        ClientMessage::Ping => Some(ServerMessage::Pong),
        ClientMessage::Unsubscribe { .. }
        | ClientMessage::SubscribeAll
        | ClientMessage::UnsubscribeAll => None,
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut events) = ObserverSession::open(state.orchestrator.fanout().clone());
    debug!("observer connected");

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                let Some(frame) = to_frame::<&ExecutionEvent>(&event) else { continue };
                if sender.send(frame).await.is_err() {
                    break;
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Some(message) = session.handle_text(text.as_str()) else { continue };
                        let Some(reply) = reply_to(&state.orchestrator, &message).await else {
                            continue;
                        };
                        let Some(frame) = to_frame(reply) else { continue };
                        if sender.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "observer read error");
                        break;
                    }
                }
            }
        }
    }

    debug!("observer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weaver_core::WorkflowRunId;
    use weaver_workflow::{
        ConnectorRegistry, EngineConfig, EventFanout, InMemoryRunStore, RunStore, Workflow,
        WorkflowGraph,
    };

    fn orchestrator(store: Arc<InMemoryRunStore>) -> Orchestrator {
        Orchestrator::new(
            store,
            ConnectorRegistry::new(),
            EventFanout::new(),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn subscribe_replies_with_snapshot() {
        let store = Arc::new(InMemoryRunStore::new());
        let workflow = Workflow::new("w", WorkflowGraph::new());
        let workflow_id = workflow.id;
        store.save_workflow(workflow).await;
        let run = store.create_run(workflow_id, json!({})).await.expect("run");

        let reply = reply_to(
            &orchestrator(store),
            &ClientMessage::Subscribe { run_id: run.id },
        )
        .await;
        assert_eq!(
            reply,
            Some(ServerMessage::RunSnapshot {
                run,
                last_seq: None,
            })
        );
    }

    #[tokio::test]
    async fn snapshot_watermark_matches_published_events() {
        let store = Arc::new(InMemoryRunStore::new());
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "nodes": [
                { "id": "t", "config": { "kind": "trigger", "type": "schedule", "cron": "* * * * *" } },
                { "id": "wait", "config": { "kind": "logic", "type": "delay", "duration_ms": 1 } }
            ],
            "edges": [ { "source": "t", "target": "wait" } ]
        }))
        .expect("graph");
        let workflow = Workflow::new("w", graph);
        let workflow_id = workflow.id;
        store.save_workflow(workflow).await;
        let orchestrator = orchestrator(store);
        let mut events = orchestrator
            .fanout()
            .subscribe(weaver_workflow::SubscriptionScope::AllRuns);

        let handle = orchestrator
            .start_run(workflow_id, json!(null), None)
            .await
            .expect("start");
        let run_id = handle.run_id();
        handle.wait().await;

        let mut last = None;
        while let Some(event) = events.try_recv() {
            last = Some(event.seq());
        }
        let Some(ServerMessage::RunSnapshot { last_seq, .. }) =
            reply_to(&orchestrator, &ClientMessage::Subscribe { run_id }).await
        else {
            panic!("expected a snapshot");
        };
        assert_eq!(last_seq, Some(3));
        assert_eq!(last_seq, last);
    }

    #[tokio::test]
    async fn unknown_run_and_ping() {
        let orchestrator = orchestrator(Arc::new(InMemoryRunStore::new()));
        let reply = reply_to(
            &orchestrator,
            &ClientMessage::Subscribe {
                run_id: WorkflowRunId::new(),
            },
        )
        .await;
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));
        assert_eq!(
            reply_to(&orchestrator, &ClientMessage::Ping).await,
            Some(ServerMessage::Pong)
        );
        assert_eq!(reply_to(&orchestrator, &ClientMessage::SubscribeAll).await, None);
    }

    #[test]
    fn frames_are_enveloped() {
        let Some(Message::Text(text)) = to_frame(ServerMessage::Pong) else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).expect("json");
        assert_eq!(value, json!({ "version": 1, "payload": { "type": "pong" } }));
    }
}
