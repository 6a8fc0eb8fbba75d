// ── Event bus ──
//
// Page-lifetime publish/subscribe channel. Subscriber lists are stored
// copy-on-write per topic: `publish` clones the `Arc` of the current list and
// iterates that snapshot with no lock held, so handlers may subscribe,
// unsubscribe or publish re-entrantly. Subscriptions added during a publish
// land in a new list and are not seen by that publish.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::{any::Any, fmt};

use dashmap::DashMap;
use serde_json::{Value, json};
use tracing::{debug, error, trace, warn};

use crate::dom::{CustomEvent, Document, DomEvent, EVENT_PREFIX, Listener, ListenerId, ListenerTarget};
use crate::error::{DashboardError, HandlerResult};
use crate::topic::{Payload, PayloadKind, Topic, expected_kind};

/// A subscribed callback. Keep the `Arc` to unsubscribe by reference.
pub type Handler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Where a delivered event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Published through [`EventBus::publish`].
    Local,
    /// Re-published from an inbound `dashboard:*` document event.
    Bridge,
}

/// What handlers receive.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: Topic,
    pub payload: Payload,
    pub origin: Origin,
}

#[derive(Clone)]
struct Entry {
    id: u64,
    handler: Handler,
    once: bool,
    active: Arc<AtomicBool>,
}

struct BusInner {
    topics: DashMap<Topic, Arc<Vec<Entry>>>,
    next_id: AtomicU64,
    bridge: Mutex<Option<(Arc<dyn Document>, ListenerId)>>,
}

impl BusInner {
    fn bridge(&self) -> MutexGuard<'_, Option<(Arc<dyn Document>, ListenerId)>> {
        self.bridge.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_entries(&self, topic: &Topic, matches: impl Fn(&Entry) -> bool) -> bool {
        let mut removed = false;
        if let Some(mut slot) = self.topics.get_mut(topic) {
            let list = Arc::make_mut(&mut *slot);
            list.retain(|entry| {
                if matches(entry) {
                    entry.active.store(false, Ordering::SeqCst);
                    removed = true;
                    false
                } else {
                    true
                }
            });
        }
        self.topics.remove_if(topic, |_, list| list.is_empty());
        removed
    }
}

/// Token returned by [`EventBus::subscribe`]. Removes exactly one registration.
///
/// Dropping the token does not unsubscribe; owners dispose explicitly.
pub struct Subscription {
    topic: Topic,
    id: u64,
    active: Arc<AtomicBool>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Remove the registration. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.bus.upgrade() {
            inner.remove_entries(&self.topic, |entry| entry.id == self.id);
            trace!(topic = %self.topic, id = self.id, "unsubscribed");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Synchronous, in-order publish/subscribe with document bridging.
///
/// Cheap to clone; clones share the same subscriber table.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.inner.topics.len())
            .field("bridged", &self.inner.bridge().is_some())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: DashMap::new(),
                next_id: AtomicU64::new(1),
                bridge: Mutex::new(None),
            }),
        }
    }

    // ── Subscribing ─────────────────────────────────────────────────

    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Result<Subscription, DashboardError>
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_handler(topic, Arc::new(handler))
    }

    /// Subscribe a handler the caller keeps a reference to, for later
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe_handler(
        &self,
        topic: &str,
        handler: Handler,
    ) -> Result<Subscription, DashboardError> {
        let topic = Topic::new(topic)?;
        Ok(self.insert(topic, handler, false))
    }

    /// Subscribe for a single delivery. The registration is removed before
    /// the handler runs.
    pub fn subscribe_once<F>(&self, topic: &str, handler: F) -> Result<Subscription, DashboardError>
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let topic = Topic::new(topic)?;
        Ok(self.insert(topic, Arc::new(handler), true))
    }

    /// Remove every registration of `handler` on `topic` (pointer identity).
    pub fn unsubscribe(&self, topic: &str, handler: &Handler) -> bool {
        let Ok(topic) = Topic::new(topic) else {
            return false;
        };
        self.inner
            .remove_entries(&topic, |entry| Arc::ptr_eq(&entry.handler, handler))
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        Topic::new(topic)
            .ok()
            .and_then(|topic| self.inner.topics.get(&topic).map(|list| list.len()))
            .unwrap_or(0)
    }

    fn insert(&self, topic: Topic, handler: Handler, once: bool) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        {
            let mut slot = self.inner.topics.entry(topic.clone()).or_default();
            Arc::make_mut(&mut *slot).push(Entry {
                id,
                handler,
                once,
                active: Arc::clone(&active),
            });
        }
        trace!(topic = %topic, id, once, "subscribed");
        Subscription {
            topic,
            id,
            active,
            bus: Arc::downgrade(&self.inner),
        }
    }

    // ── Publishing ──────────────────────────────────────────────────

    /// Deliver `payload` to every current subscriber of `topic`, in
    /// subscription order, then mirror it onto the attached document.
    ///
    /// Returns the number of handlers invoked. Handler failures are logged
    /// and never returned.
    pub fn publish(&self, topic: &str, payload: Payload) -> Result<usize, DashboardError> {
        let topic = Topic::new(topic)?;
        if let Some(expected) = expected_kind(topic.as_str()) {
            let actual = payload.kind();
            if actual != expected && actual != PayloadKind::Json {
                warn!(topic = %topic, %expected, %actual, "payload does not match topic table");
            }
        }

        let event = Event {
            topic,
            payload,
            origin: Origin::Local,
        };
        let delivered = self.deliver(&event);
        self.dispatch_to_document(&event);
        Ok(delivered)
    }

    fn deliver(&self, event: &Event) -> usize {
        let snapshot = self
            .inner
            .topics
            .get(&event.topic)
            .map(|list| Arc::clone(&*list));
        let Some(snapshot) = snapshot else {
            trace!(topic = %event.topic, "no subscribers");
            return 0;
        };

        let mut delivered = 0;
        for entry in snapshot.iter() {
            if entry.once {
                if !entry.active.swap(false, Ordering::SeqCst) {
                    continue;
                }
                self.inner.remove_entries(&event.topic, |e| e.id == entry.id);
            } else if !entry.active.load(Ordering::SeqCst) {
                continue;
            }

            delivered += 1;
            let guard = HandlerScope::enter();
            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.handler)(event)));
            drop(guard);
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(topic = %event.topic, error = %err, "event handler failed");
                }
                Err(panic) => {
                    error!(
                        topic = %event.topic,
                        panic = panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        delivered
    }

    // ── Document bridge ─────────────────────────────────────────────

    /// Mirror publishes onto `document` and re-publish inbound
    /// `dashboard:*` events that did not come from this bus.
    pub fn attach_document(&self, document: Arc<dyn Document>) {
        let weak = Arc::downgrade(&self.inner);
        let listener: Listener = Arc::new(move |event: &DomEvent| {
            let DomEvent::Custom(custom) = event else {
                return;
            };
            if custom.from_bus {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                EventBus { inner }.receive_from_document(custom);
            }
        });
        let id = document.add_listener(
            ListenerTarget::Custom {
                prefix: EVENT_PREFIX.to_owned(),
            },
            listener,
        );

        let previous = self.inner.bridge().replace((document, id));
        if let Some((old_document, old_id)) = previous {
            old_document.remove_listener(old_id);
        }
        debug!("event bus bridged to document");
    }

    pub fn detach_document(&self) {
        let previous = self.inner.bridge().take();
        if let Some((document, id)) = previous {
            document.remove_listener(id);
        }
    }

    fn dispatch_to_document(&self, event: &Event) {
        let document = self
            .inner
            .bridge()
            .as_ref()
            .map(|(document, _)| Arc::clone(document));
        let Some(document) = document else {
            return;
        };
        document.dispatch(&DomEvent::Custom(CustomEvent {
            name: format!("{EVENT_PREFIX}{}", event.topic),
            detail: json!({
                "type": event.topic.as_str(),
                "data": event.payload.to_json(),
            }),
            bubbles: true,
            from_bus: true,
        }));
    }

    fn receive_from_document(&self, custom: &CustomEvent) {
        let Some(name) = custom.name.strip_prefix(EVENT_PREFIX) else {
            return;
        };
        let Ok(topic) = Topic::new(name) else {
            debug!(event = %custom.name, "ignoring bridged event with empty topic");
            return;
        };
        let data = custom.detail.get("data").cloned().unwrap_or(Value::Null);
        let payload = Payload::from_json(topic.as_str(), data);
        debug!(topic = %topic, "re-publishing inbound document event");
        self.deliver(&Event {
            topic,
            payload,
            origin: Origin::Bridge,
        });
    }

    /// Drop every subscription and the document bridge.
    pub fn dispose(&self) {
        self.detach_document();
        for list in &self.inner.topics {
            for entry in list.iter() {
                entry.active.store(false, Ordering::SeqCst);
            }
        }
        self.inner.topics.clear();
        debug!("event bus disposed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

// ── Handler scope ───────────────────────────────────────────────────

thread_local! {
    static HANDLER_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Whether the current thread is running a bus handler.
///
/// A panic hook runs before the bus catches the unwind; hosts check this to
/// tell a contained handler panic from one that will end the process.
#[must_use]
pub fn in_handler() -> bool {
    HANDLER_DEPTH.with(|depth| depth.get() > 0)
}

/// Marks the thread as inside a handler until dropped. Nests for
/// re-entrant publishes.
struct HandlerScope;

impl HandlerScope {
    fn enter() -> Self {
        HANDLER_DEPTH.with(|depth| depth.set(depth.get().saturating_add(1)));
        Self
    }
}

impl Drop for HandlerScope {
    fn drop(&mut self) {
        HANDLER_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::dom::{BODY, MemoryDocument};
    use crate::topic::MODAL_OPEN;
    use pretty_assertions::assert_eq;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for = Arc::clone(&log);
        let make = move |name: &'static str| -> Handler {
            let log = Arc::clone(&log_for);
            Arc::new(move |event: &Event| {
                log.lock()
                    .unwrap()
                    .push(format!("{name}:{:?}", event.payload));
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn handlers_run_in_subscription_order_once_each() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        for name in ["h1", "h2", "h3"] {
            bus.subscribe_handler("profile:save:success", make(name))
                .unwrap();
        }

        let delivered = bus
            .publish("profile:save:success", Payload::Data(json!(1)))
            .unwrap();

        assert_eq!(delivered, 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "h1:Data(Number(1))",
                "h2:Data(Number(1))",
                "h3:Data(Number(1))"
            ]
        );
    }

    #[test]
    fn unsubscribe_token_is_idempotent() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = bus
            .subscribe("ping", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        bus.publish("ping", Payload::Empty).unwrap();
        sub.unsubscribe();
        sub.unsubscribe();
        bus.publish("ping", Payload::Empty).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count("ping"), 0);
    }

    #[test]
    fn unsubscribe_by_handler_reference() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let keep = make("keep");
        let drop_me = make("drop");
        bus.subscribe_handler("ping", Arc::clone(&keep)).unwrap();
        bus.subscribe_handler("ping", Arc::clone(&drop_me)).unwrap();

        assert!(bus.unsubscribe("ping", &drop_me));
        assert!(!bus.unsubscribe("ping", &drop_me));
        bus.publish("ping", Payload::Empty).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["keep:Empty"]);
    }

    #[test]
    fn failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.subscribe_handler("ping", make("h1")).unwrap();
        bus.subscribe("ping", |_| Err("boom".into())).unwrap();
        bus.subscribe("ping", |_| panic!("handler exploded")).unwrap();
        bus.subscribe_handler("ping", make("h3")).unwrap();

        let delivered = bus.publish("ping", Payload::Empty).unwrap();

        assert_eq!(delivered, 4);
        assert_eq!(*log.lock().unwrap(), vec!["h1:Empty", "h3:Empty"]);
    }

    #[test]
    fn handler_scope_covers_handlers_and_survives_panics() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let outer = Arc::clone(&seen);
        let nested = bus.clone();
        bus.subscribe("outer", move |_| {
            outer.lock().unwrap().push(in_handler());
            nested.publish("inner", Payload::Empty)?;
            // Still inside after the nested publish returns.
            outer.lock().unwrap().push(in_handler());
            Ok(())
        })
        .unwrap();
        let inner = Arc::clone(&seen);
        bus.subscribe("inner", move |_| {
            inner.lock().unwrap().push(in_handler());
            Ok(())
        })
        .unwrap();
        bus.subscribe("inner", |_| panic!("contained")).unwrap();

        assert!(!in_handler());
        bus.publish("outer", Payload::Empty).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![true, true, true]);
        assert!(!in_handler());
    }

    #[test]
    fn once_handler_is_removed_before_it_runs() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let reentrant = bus.clone();
        bus.subscribe_once("ping", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Publishing the same topic from inside must not re-invoke us.
            reentrant.publish("ping", Payload::Empty)?;
            Ok(())
        })
        .unwrap();

        bus.publish("ping", Payload::Empty).unwrap();
        bus.publish("ping", Payload::Empty).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("ping"), 0);
    }

    #[test]
    fn handlers_added_during_publish_wait_for_the_next_one() {
        let bus = EventBus::new();
        let late_hits = Arc::new(AtomicUsize::new(0));
        let (inner_bus, counter) = (bus.clone(), Arc::clone(&late_hits));
        bus.subscribe_once("ping", move |_| {
            let counter = Arc::clone(&counter);
            inner_bus.subscribe("ping", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

        assert_eq!(bus.publish("ping", Payload::Empty).unwrap(), 1);
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.publish("ping", Payload::Empty).unwrap(), 1);
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_removed_during_publish_are_skipped() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let victim = make("victim");
        let (inner_bus, victim_ref) = (bus.clone(), Arc::clone(&victim));
        bus.subscribe("ping", move |_| {
            inner_bus.unsubscribe("ping", &victim_ref);
            Ok(())
        })
        .unwrap();
        bus.subscribe_handler("ping", victim).unwrap();

        assert_eq!(bus.publish("ping", Payload::Empty).unwrap(), 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_topics_are_rejected() {
        let bus = EventBus::new();
        assert!(matches!(
            bus.subscribe("", |_| Ok(())),
            Err(DashboardError::EmptyTopic)
        ));
        assert!(matches!(
            bus.publish(" ", Payload::Empty),
            Err(DashboardError::EmptyTopic)
        ));
    }

    #[test]
    fn publishes_are_mirrored_onto_the_document() {
        let doc = Arc::new(MemoryDocument::new());
        let bus = EventBus::new();
        bus.attach_document(doc.clone());

        bus.publish(MODAL_OPEN, Payload::modal("workout-form-modal"))
            .unwrap();

        let events = doc.dispatched_events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name, "dashboard:modal:open");
        assert!(event.bubbles);
        assert!(event.from_bus);
        assert_eq!(
            event.detail,
            json!({ "type": "modal:open", "data": { "id": "workout-form-modal" } })
        );
    }

    #[test]
    fn inbound_document_events_are_republished_without_feedback() {
        let doc = Arc::new(MemoryDocument::new());
        let bus = EventBus::new();
        bus.attach_document(doc.clone());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        bus.subscribe(MODAL_OPEN, move |event| {
            sink.lock().unwrap().push((event.payload.clone(), event.origin));
            Ok(())
        })
        .unwrap();

        doc.dispatch(&DomEvent::Custom(CustomEvent::external(
            "dashboard:modal:open",
            json!({ "type": "modal:open", "data": { "id": "profile-modal" } }),
        )));

        assert_eq!(
            *received.lock().unwrap(),
            vec![(Payload::modal("profile-modal"), Origin::Bridge)]
        );
        // Only the inbound event itself was dispatched; nothing echoed back.
        assert_eq!(doc.dispatched_events().len(), 1);

        // The bus's own dispatches are not re-published.
        bus.publish(MODAL_OPEN, Payload::modal("again")).unwrap();
        assert_eq!(received.lock().unwrap().len(), 2);
    }

    #[test]
    fn dispose_clears_subscriptions_and_bridge() {
        let doc = Arc::new(MemoryDocument::new());
        let bus = EventBus::new();
        bus.attach_document(doc.clone());
        let sub = bus.subscribe("ping", |_| Ok(())).unwrap();
        assert_eq!(doc.listener_count(), 1);

        bus.dispose();

        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count("ping"), 0);
        assert_eq!(doc.listener_count(), 0);
        assert_eq!(bus.publish("ping", Payload::Empty).unwrap(), 0);
        assert!(doc.contains(BODY));
    }
}
