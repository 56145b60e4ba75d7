//! A named-topic publish/subscribe dispatcher, the sole communication
//! channel between the engine's components and their external collaborators.
//!
//! Dispatch is synchronous and reentrant-safe: `publish` clones a snapshot
//! of the topic's listener list before iterating, so a handler that
//! subscribes or unsubscribes during the same publish never causes a sibling
//! listener to be skipped or invoked twice in that call. A panicking handler
//! is caught, logged, and does not prevent remaining listeners from running.
//!
//! The bus moves from `Active` to a terminal `Destroyed` state via
//! [`EventBus::destroy`]; afterwards `subscribe` returns a no-op handle and
//! `publish` reports no listeners. None of the operations here ever panic
//! out to the caller.

use slotmap::SlotMap;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use tracing::{error, warn};

use crate::common::{lock_or_recover, SubscriptionId};
use crate::events::{topic, BusMessage};

/// A shared, immutable handler. Handlers always receive the originating
/// topic as their first argument, which is what makes the wildcard topic
/// useful for tracing and diagnostics.
pub type Handler = Arc<dyn Fn(&str, &BusMessage) + Send + Sync + 'static>;

struct TopicListeners {
    handlers: SlotMap<SubscriptionId, Handler>,
    /// Re-armed when the listener count drops back under the soft cap, so
    /// the leak warning fires once per upward crossing.
    cap_warned: bool,
}

impl TopicListeners {
    fn new() -> Self {
        Self {
            handlers: SlotMap::with_key(),
            cap_warned: false,
        }
    }
}

struct BusState {
    topics: HashMap<String, TopicListeners>,
    max_listeners: usize,
    destroyed: bool,
}

/// The engine's event bus. Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    /// Creates a bus with the given soft cap on listeners per topic.
    pub fn new(max_listeners: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                topics: HashMap::new(),
                max_listeners,
                destroyed: false,
            })),
        }
    }

    /// Attaches a handler to a topic and returns its [`Subscription`] handle.
    ///
    /// An empty topic name, or a bus that has been destroyed, yields a
    /// logged warning and a no-op handle, never an error to the caller.
    pub fn subscribe(
        &self,
        topic_name: &str,
        handler: impl Fn(&str, &BusMessage) + Send + Sync + 'static,
    ) -> Subscription {
        let mut state = lock_or_recover(&self.state);
        if state.destroyed {
            warn!("Cannot subscribe to '{}': bus is destroyed.", topic_name);
            return Subscription::noop();
        }
        if topic_name.is_empty() {
            warn!("Topic name must be a non-empty string; subscription ignored.");
            return Subscription::noop();
        }
        let max_listeners = state.max_listeners;
        let entry = state
            .topics
            .entry(topic_name.to_string())
            .or_insert_with(TopicListeners::new);
        let id = entry.handlers.insert(Arc::new(handler));
        let count = entry.handlers.len();
        if count > max_listeners && !entry.cap_warned {
            warn!(
                "Possible listener leak: {} listeners for '{}' (soft cap is {}).",
                count, topic_name, max_listeners
            );
            entry.cap_warned = true;
        }
        Subscription {
            bus: Arc::downgrade(&self.state),
            topic: topic_name.to_string(),
            id: Some(id),
        }
    }

    /// Synchronously delivers a message to every listener of `topic_name`,
    /// then to every wildcard listener. Returns whether anyone was listening.
    pub fn publish(&self, topic_name: &str, message: &BusMessage) -> bool {
        // Snapshot under the lock, dispatch outside it. A handler is free to
        // subscribe, unsubscribe, or publish again without deadlocking, and
        // registry mutations cannot affect this dispatch pass.
        let (direct, wildcard) = {
            let state = lock_or_recover(&self.state);
            if state.destroyed {
                return false;
            }
            let direct: Vec<Handler> = state
                .topics
                .get(topic_name)
                .map(|t| t.handlers.values().cloned().collect())
                .unwrap_or_default();
            let wildcard: Vec<Handler> = if topic_name != topic::WILDCARD {
                state
                    .topics
                    .get(topic::WILDCARD)
                    .map(|t| t.handlers.values().cloned().collect())
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            (direct, wildcard)
        };

        let has_listeners = !direct.is_empty() || !wildcard.is_empty();
        for handler in direct.iter().chain(wildcard.iter()) {
            if catch_unwind(AssertUnwindSafe(|| handler(topic_name, message))).is_err() {
                error!(
                    "A listener for '{}' panicked during dispatch; continuing with remaining listeners.",
                    topic_name
                );
            }
        }
        has_listeners
    }

    /// Clears one topic's listeners, or every topic when `topic_name` is
    /// `None`.
    pub fn unsubscribe_all(&self, topic_name: Option<&str>) {
        let mut state = lock_or_recover(&self.state);
        match topic_name {
            Some(name) => {
                state.topics.remove(name);
            }
            None => state.topics.clear(),
        }
    }

    /// Number of listeners currently attached to a topic.
    pub fn listener_count(&self, topic_name: &str) -> usize {
        let state = lock_or_recover(&self.state);
        state
            .topics
            .get(topic_name)
            .map(|t| t.handlers.len())
            .unwrap_or(0)
    }

    /// Names of all topics that currently have at least one listener.
    pub fn topic_names(&self) -> Vec<String> {
        let state = lock_or_recover(&self.state);
        state.topics.keys().cloned().collect()
    }

    /// Moves the bus to its terminal state. Idempotent. All listeners are
    /// dropped; subsequent `subscribe` and `publish` calls become no-ops.
    pub fn destroy(&self) {
        let mut state = lock_or_recover(&self.state);
        if state.destroyed {
            return;
        }
        state.topics.clear();
        state.destroyed = true;
    }

    /// Whether [`EventBus::destroy`] has been called.
    pub fn is_destroyed(&self) -> bool {
        lock_or_recover(&self.state).destroyed
    }
}

/// A handle to one live subscription. Removal is explicit and idempotent:
/// calling [`Subscription::unsubscribe`] twice, from inside a handler, or
/// after the bus has been destroyed is always safe.
pub struct Subscription {
    bus: Weak<Mutex<BusState>>,
    topic: String,
    id: Option<SubscriptionId>,
}

impl Subscription {
    fn noop() -> Self {
        Self {
            bus: Weak::new(),
            topic: String::new(),
            id: None,
        }
    }

    /// Detaches the handler from its topic. Safe to call any number of
    /// times; a stale or no-op handle simply does nothing.
    pub fn unsubscribe(&self) {
        let Some(id) = self.id else { return };
        let Some(state) = self.bus.upgrade() else { return };
        let mut state = lock_or_recover(&state);
        if state.destroyed {
            return;
        }
        let max_listeners = state.max_listeners;
        let remove_topic = match state.topics.get_mut(&self.topic) {
            Some(entry) => {
                entry.handlers.remove(id);
                if entry.handlers.len() <= max_listeners {
                    entry.cap_warned = false;
                }
                entry.handlers.is_empty()
            }
            None => false,
        };
        if remove_topic {
            state.topics.remove(&self.topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_message() -> BusMessage {
        BusMessage::Setting(crate::events::SettingChange::AudioEnabled(true))
    }

    #[test]
    fn publish_reports_whether_anyone_listened() {
        let bus = EventBus::new(10);
        assert!(!bus.publish("quiet", &counting_message()));
        let _sub = bus.subscribe("quiet", |_, _| {});
        assert!(bus.publish("quiet", &counting_message()));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = EventBus::new(10);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = hits.clone();
        let sub = bus.subscribe("t", move |_, _| {
            hits_in.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        sub.unsubscribe();
        bus.publish("t", &counting_message());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reentrant_unsubscribe_never_skips_a_sibling() {
        let bus = EventBus::new(10);
        let first_hits = Arc::new(AtomicUsize::new(0));
        let second_hits = Arc::new(AtomicUsize::new(0));

        // The first listener removes itself mid-dispatch; the second must
        // still run exactly once in the same publish call.
        let self_handle: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let handle_in = self_handle.clone();
        let first_in = first_hits.clone();
        let sub = bus.subscribe("t", move |_, _| {
            first_in.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = handle_in.lock().expect("handle lock").as_ref() {
                sub.unsubscribe();
            }
        });
        *self_handle.lock().expect("handle lock") = Some(sub);

        let second_in = second_hits.clone();
        let _second = bus.subscribe("t", move |_, _| {
            second_in.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish("t", &counting_message());
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);

        // The self-removed listener is gone on the next publish.
        bus.publish("t", &counting_message());
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn a_panicking_listener_does_not_stop_dispatch() {
        let bus = EventBus::new(10);
        let survivor_hits = Arc::new(AtomicUsize::new(0));
        let _bad = bus.subscribe("t", |_, _| panic!("listener blew up"));
        let survivor_in = survivor_hits.clone();
        let _good = bus.subscribe("t", move |_, _| {
            survivor_in.fetch_add(1, Ordering::SeqCst);
        });
        assert!(bus.publish("t", &counting_message()));
        assert_eq!(survivor_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wildcard_listener_sees_every_topic() {
        let bus = EventBus::new(10);
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        let _sub = bus.subscribe(topic::WILDCARD, move |topic_name, _| {
            seen_in.lock().expect("seen lock").push(topic_name.to_string());
        });
        bus.publish("alpha", &counting_message());
        bus.publish("beta", &counting_message());
        assert_eq!(*seen.lock().expect("seen lock"), vec!["alpha", "beta"]);
    }

    #[test]
    fn empty_topic_subscription_is_a_logged_noop() {
        let bus = EventBus::new(10);
        let sub = bus.subscribe("", |_, _| {});
        sub.unsubscribe();
        assert_eq!(bus.topic_names().len(), 0);
    }

    #[test]
    fn destroyed_bus_refuses_quietly() {
        let bus = EventBus::new(10);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = hits.clone();
        let sub = bus.subscribe("t", move |_, _| {
            hits_in.fetch_add(1, Ordering::SeqCst);
        });
        bus.destroy();
        assert!(bus.is_destroyed());
        assert!(!bus.publish("t", &counting_message()));
        let late = bus.subscribe("t", |_, _| {});
        late.unsubscribe();
        sub.unsubscribe();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        // destroy is idempotent
        bus.destroy();
    }

    #[test]
    fn unsubscribe_all_clears_one_or_every_topic() {
        let bus = EventBus::new(10);
        let _a = bus.subscribe("a", |_, _| {});
        let _b = bus.subscribe("b", |_, _| {});
        bus.unsubscribe_all(Some("a"));
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.listener_count("b"), 1);
        bus.unsubscribe_all(None);
        assert_eq!(bus.listener_count("b"), 0);
    }

    #[test]
    fn soft_cap_is_diagnostic_only() {
        let bus = EventBus::new(2);
        let subs: Vec<Subscription> = (0..5).map(|_| bus.subscribe("busy", |_, _| {})).collect();
        assert_eq!(bus.listener_count("busy"), 5);
        for sub in &subs {
            sub.unsubscribe();
        }
        assert_eq!(bus.listener_count("busy"), 0);
    }
}
