//! Delivers run events to live observers.
//!
//! [`EventFanout`] is an explicit registry: it is created with the service,
//! handed to whoever needs it, and torn down with [`EventFanout::shutdown`].
//! Each subscriber owns an unbounded queue, so nothing is dropped while a
//! subscription is alive and a run's events arrive in the order the run
//! published them. Nothing survives a disconnect; a reconnecting observer
//! reloads the run snapshot from the store and resumes from there.
//!
//! [`ObserverSession`] is the per-connection side. It parses client control
//! messages, keeps track of what the connection is subscribed to, and drops
//! malformed input with a warning.

use crate::execution::ExecutionEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use weaver_core::{SubscriptionId, WorkflowRunId};

/// Which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SubscriptionScope {
    Run { run_id: WorkflowRunId },
    AllRuns,
}

impl SubscriptionScope {
    fn matches(&self, event: &ExecutionEvent) -> bool {
        match self {
            Self::Run { run_id } => *run_id == event.run_id(),
            Self::AllRuns => true,
        }
    }
}

struct Subscriber {
    scope: SubscriptionScope,
    sender: mpsc::UnboundedSender<ExecutionEvent>,
}

#[derive(Default)]
struct FanoutInner {
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    closed: AtomicBool,
}

/// Registry of live subscriptions. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct EventFanout {
    inner: Arc<FanoutInner>,
}

/// A subscription with its own queue.
pub struct Subscription {
    pub id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<ExecutionEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once unsubscribed or after
    /// the fanout shuts down and the queue is drained.
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        self.receiver.recv().await
    }

    /// Returns a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ExecutionEvent> {
        self.receiver.try_recv().ok()
    }
}

impl EventFanout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes with a fresh queue.
    pub fn subscribe(&self, scope: SubscriptionScope) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.subscribe_with(scope, sender);
        Subscription { id, receiver }
    }

    /// Subscribes, delivering into an existing queue.
    ///
    /// Several subscriptions may share one sender; a connection uses this to
    /// merge all its subscriptions into one stream. After shutdown the
    /// sender is dropped immediately.
    pub fn subscribe_with(
        &self,
        scope: SubscriptionScope,
        sender: mpsc::UnboundedSender<ExecutionEvent>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        let mut subscribers = self.write();
        // Checked under the lock so a racing shutdown cannot miss the insert.
        if self.is_shut_down() {
            return id;
        }
        subscribers.insert(id, Subscriber { scope, sender });
        drop(subscribers);
        debug!(subscription_id = %id, ?scope, "observer subscribed");
        id
    }

    /// Removes a subscription. Returns false if it did not exist.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.write().remove(&id).is_some();
        if removed {
            debug!(subscription_id = %id, "observer unsubscribed");
        }
        removed
    }

    /// Delivers `event` to every matching subscriber and returns how many
    /// received it. Subscribers whose queue is gone are pruned.
    pub fn publish(&self, event: &ExecutionEvent) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();
        {
            let subscribers = self.read();
            for (id, subscriber) in subscribers.iter() {
                if !subscriber.scope.matches(event) {
                    continue;
                }
                if subscriber.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    gone.push(*id);
                }
            }
        }

        if !gone.is_empty() {
            let mut subscribers = self.write();
            for id in gone {
                subscribers.remove(&id);
            }
        }
        delivered
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    /// Drops every subscription and refuses new ones.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let dropped = {
            let mut subscribers = self.write();
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        debug!(dropped, "event fanout shut down");
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Control messages a client sends over its observer channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { run_id: WorkflowRunId },
    Unsubscribe { run_id: WorkflowRunId },
    SubscribeAll,
    UnsubscribeAll,
    Ping,
}

/// Merged event stream of one observer connection.
pub struct SessionEvents {
    receiver: mpsc::UnboundedReceiver<ExecutionEvent>,
}

impl SessionEvents {
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        self.receiver.recv().await
    }
}

/// One observer connection's subscriptions.
///
/// Dropping the session removes all of its subscriptions.
pub struct ObserverSession {
    fanout: EventFanout,
    sender: mpsc::UnboundedSender<ExecutionEvent>,
    subscriptions: HashMap<SubscriptionScope, SubscriptionId>,
}

impl ObserverSession {
    /// Opens a session and returns it with its event stream.
    #[must_use]
    pub fn open(fanout: EventFanout) -> (Self, SessionEvents) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let session = Self {
            fanout,
            sender,
            subscriptions: HashMap::new(),
        };
        (session, SessionEvents { receiver })
    }

    /// Parses and applies one inbound text frame.
    ///
    /// Returns the applied message so the caller can follow up (send a run
    /// snapshot, answer a ping). Malformed frames are logged and dropped.
    pub fn handle_text(&mut self, text: &str) -> Option<ClientMessage> {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => {
                self.apply(&message);
                Some(message)
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed observer message");
                None
            }
        }
    }

    pub fn apply(&mut self, message: &ClientMessage) {
        match message {
            ClientMessage::Subscribe { run_id } => {
                self.add(SubscriptionScope::Run { run_id: *run_id });
            }
            ClientMessage::Unsubscribe { run_id } => {
                self.remove(SubscriptionScope::Run { run_id: *run_id });
            }
            ClientMessage::SubscribeAll => self.add(SubscriptionScope::AllRuns),
            ClientMessage::UnsubscribeAll => self.remove(SubscriptionScope::AllRuns),
            ClientMessage::Ping => {}
        }
    }

    #[must_use]
    pub fn is_subscribed(&self, scope: SubscriptionScope) -> bool {
        self.subscriptions.contains_key(&scope)
    }

    fn add(&mut self, scope: SubscriptionScope) {
        if self.subscriptions.contains_key(&scope) {
            return;
        }
        let id = self.fanout.subscribe_with(scope, self.sender.clone());
        self.subscriptions.insert(scope, id);
    }

    fn remove(&mut self, scope: SubscriptionScope) {
        if let Some(id) = self.subscriptions.remove(&scope) {
            self.fanout.unsubscribe(id);
        }
    }
}

impl Drop for ObserverSession {
    fn drop(&mut self) {
        for (_, id) in self.subscriptions.drain() {
            self.fanout.unsubscribe(id);
        }
    }
}
