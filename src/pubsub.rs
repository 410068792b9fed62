//! Topic fan-out of inbound frames.
//!
//! Topics are lowercased event names plus [`ANY_MESSAGE_TOPIC`], which sees
//! every frame. Each route is an unbounded queue whose write end the bus
//! holds; the read end belongs to whoever subscribed. Publishing never
//! waits on a consumer, and frames reach a given sink in publish order.
//! A route whose every [`EventSink`] handle was dropped is removed on the
//! next publish that touches it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use futures_util::stream::{self, Stream};
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::{constants::ANY_MESSAGE_TOPIC, message::AmiMessage};

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<AmiMessage>>>;

struct Route {
    id: u64,
    tx: mpsc::UnboundedSender<AmiMessage>,
    rx: Weak<Mutex<mpsc::UnboundedReceiver<AmiMessage>>>,
    exclusive: bool,
}

#[derive(Default)]
struct BusState {
    routes: HashMap<String, Vec<Route>>,
    next_id: u64,
    disabled: bool,
}

/// Multi-topic publish/subscribe bus.
#[derive(Default)]
pub struct PubSub {
    state: RwLock<BusState>,
}

impl PubSub {
    /// Create an enabled, empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink for one topic.
    ///
    /// A topic has at most one such sink: subscribing again while a handle
    /// is alive returns a handle to the same queue. `None` once destroyed.
    pub fn subscribe(&self, topic: &str) -> Option<EventSink> {
        let topic = topic.to_ascii_lowercase();
        let mut state = self
            .state
            .write();
        if state.disabled {
            return None;
        }

        if let Some(existing) = state
            .routes
            .get(&topic)
            .and_then(|routes| {
                routes
                    .iter()
                    .filter(|r| r.exclusive)
                    .find_map(|r| r.rx.upgrade())
            })
        {
            return Some(EventSink { rx: existing });
        }

        let (route, sink) = new_route(&mut state, true);
        let routes = state
            .routes
            .entry(topic)
            .or_default();
        routes.retain(|r| !(r.exclusive && r.tx.is_closed()));
        routes.push(route);
        Some(sink)
    }

    /// One fresh sink fed by every named topic.
    ///
    /// A frame matching several of the topics is delivered once.
    pub fn subscribe_many<I, S>(&self, topics: I) -> Option<EventSink>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self
            .state
            .write();
        if state.disabled {
            return None;
        }

        let (route, sink) = new_route(&mut state, false);
        let topics: HashSet<String> = topics
            .into_iter()
            .map(|t| {
                t.as_ref()
                    .to_ascii_lowercase()
            })
            .collect();
        for topic in topics {
            state
                .routes
                .entry(topic)
                .or_default()
                .push(Route {
                    id: route.id,
                    tx: route
                        .tx
                        .clone(),
                    rx: route
                        .rx
                        .clone(),
                    exclusive: false,
                });
        }
        Some(sink)
    }

    /// Deliver `message` to the any-message topic and to its event topic.
    ///
    /// Returns `false` once the bus is destroyed.
    pub fn publish(&self, message: &AmiMessage) -> bool {
        let topic = message.topic();
        let mut dead = Vec::new();
        {
            let state = self
                .state
                .read();
            if state.disabled {
                return false;
            }

            let mut delivered = HashSet::new();
            let topics = std::iter::once(ANY_MESSAGE_TOPIC).chain(topic.as_deref());
            for t in topics {
                let Some(routes) = state
                    .routes
                    .get(t)
                else {
                    continue;
                };
                for route in routes {
                    if !delivered.insert(route.id) {
                        continue;
                    }
                    if route
                        .tx
                        .send(message.clone())
                        .is_err()
                    {
                        dead.push(route.id);
                    }
                }
            }
            trace!(
                "[PUBSUB] {} delivered to {} sink(s)",
                topic
                    .as_deref()
                    .unwrap_or(ANY_MESSAGE_TOPIC),
                delivered.len() - dead.len()
            );
        }

        if !dead.is_empty() {
            let mut state = self
                .state
                .write();
            for routes in state
                .routes
                .values_mut()
            {
                routes.retain(|r| !dead.contains(&r.id));
            }
            state
                .routes
                .retain(|_, routes| !routes.is_empty());
            debug!("[PUBSUB] removed {} abandoned sink(s)", dead.len());
        }
        true
    }

    /// Close every sink and disable the bus. Idempotent.
    pub fn destroy(&self) {
        let mut state = self
            .state
            .write();
        if !state.disabled {
            state.disabled = true;
            state
                .routes
                .clear();
            debug!("[PUBSUB] destroyed");
        }
    }

    /// `true` after [`destroy`](Self::destroy).
    pub fn is_destroyed(&self) -> bool {
        self.state
            .read()
            .disabled
    }

    /// Number of topics with at least one route.
    pub fn topic_count(&self) -> usize {
        self.state
            .read()
            .routes
            .len()
    }
}

fn new_route(state: &mut BusState, exclusive: bool) -> (Route, EventSink) {
    let (tx, rx) = mpsc::unbounded_channel();
    let rx: SharedReceiver = Arc::new(Mutex::new(rx));
    let id = state.next_id;
    state.next_id += 1;
    let route = Route {
        id,
        tx,
        rx: Arc::downgrade(&rx),
        exclusive,
    };
    (route, EventSink { rx })
}

/// Receive side of a subscription.
///
/// Clones share one queue; each frame is taken by exactly one of them.
/// `recv` yields `None` once the bus is destroyed and the queue drained.
#[derive(Clone)]
pub struct EventSink {
    rx: SharedReceiver,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("handles", &Arc::strong_count(&self.rx))
            .finish()
    }
}

impl EventSink {
    /// Wait for the next frame.
    pub async fn recv(&self) -> Option<AmiMessage> {
        self.rx
            .lock()
            .await
            .recv()
            .await
    }

    /// Take a queued frame without waiting.
    ///
    /// `None` means nothing is queued, or another clone is parked in
    /// [`recv`](Self::recv) and holds the receiver.
    pub fn try_recv(&self) -> Option<AmiMessage> {
        self.rx
            .try_lock()
            .ok()?
            .try_recv()
            .ok()
    }

    /// Adapt into a [`Stream`] of frames.
    pub fn into_stream(self) -> impl Stream<Item = AmiMessage> + Send + 'static {
        stream::unfold(self, |sink| async move {
            let message = sink
                .recv()
                .await?;
            Some((message, sink))
        })
    }
}
