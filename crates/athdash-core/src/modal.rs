//! Single-active-modal state machine.
//!
//! ```text
//!            open(id)                next frame
//!   Closed ───────────▶ Opening ─────────────────▶ Open
//!     ▲                    │                         │
//!     │ after_close        │ close / Escape / backdrop│
//!     └────── Closing ◀────┴─────────────────────────┘
//! ```
//!
//! The manager is the only writer of the body scroll-lock class and of focus
//! while a modal is up. It never holds its own lock while publishing or while
//! touching the document, so handlers of the lifecycle topics may call back
//! into it. Re-entrant calls that would interleave two transitions are
//! rejected with a warning.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use indexmap::IndexMap;
use strum::Display;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Subscription};
use crate::dom::{
    ACTIVE_CLASS, BODY, CLOSE_ATTR, Document, DomEvent, Element, HOTKEY_ATTR, KEY_ESCAPE, Listener,
    ListenerId, ListenerTarget, SCROLL_LOCK_CLASS, TRIGGER_ATTR, Tag,
};
use crate::topic::{
    MODAL_AFTER_CLOSE, MODAL_AFTER_OPEN, MODAL_BEFORE_CLOSE, MODAL_BEFORE_OPEN, MODAL_CLOSE,
    MODAL_OPEN, Payload,
};

/// Class carried by every modal root.
pub const MODAL_CLASS: &str = "dashboard-modal";
/// Attribute on a modal button naming the topic it publishes.
pub const PUBLISH_ATTR: &str = "data-modal-publish";
/// Set on trigger elements once a click listener is wired.
const BOUND_ATTR: &str = "data-modal-bound";

/// Renders modal content into the element with the given id.
pub type ContentRenderer = Arc<dyn Fn(&dyn Document, &str) + Send + Sync>;

// ── Modal description ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum ModalState {
    #[default]
    Closed,
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ModalSize {
    Small,
    #[default]
    Medium,
    Large,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Close,
    /// Publish the topic with `Payload::Modal { id }` of the owning modal.
    Publish(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalButton {
    pub label: String,
    pub action: ButtonAction,
    pub hotkey: Option<char>,
}

impl ModalButton {
    pub fn close(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Close,
            hotkey: None,
        }
    }

    pub fn publish(label: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Publish(topic.into()),
            hotkey: None,
        }
    }

    #[must_use]
    pub fn hotkey(mut self, key: char) -> Self {
        self.hotkey = Some(key);
        self
    }
}

/// Everything needed to render and drive one modal.
#[derive(Clone)]
pub struct ModalSpec {
    pub id: String,
    pub title: String,
    pub size: ModalSize,
    pub buttons: Vec<ModalButton>,
    pub close_on_escape: bool,
    pub close_on_backdrop: bool,
    /// Feature whose unmount destroys this modal. `None` survives navigation.
    pub owner: Option<String>,
    pub content: Option<ContentRenderer>,
}

impl ModalSpec {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            size: ModalSize::default(),
            buttons: Vec::new(),
            close_on_escape: true,
            close_on_backdrop: true,
            owner: None,
            content: None,
        }
    }

    #[must_use]
    pub fn size(mut self, size: ModalSize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn button(mut self, button: ModalButton) -> Self {
        self.buttons.push(button);
        self
    }

    #[must_use]
    pub fn close_on_escape(mut self, enabled: bool) -> Self {
        self.close_on_escape = enabled;
        self
    }

    #[must_use]
    pub fn close_on_backdrop(mut self, enabled: bool) -> Self {
        self.close_on_backdrop = enabled;
        self
    }

    #[must_use]
    pub fn owned_by(mut self, feature: impl Into<String>) -> Self {
        self.owner = Some(feature.into());
        self
    }

    #[must_use]
    pub fn content<F>(mut self, render: F) -> Self
    where
        F: Fn(&dyn Document, &str) + Send + Sync + 'static,
    {
        self.content = Some(Arc::new(render));
        self
    }

    pub fn content_id(&self) -> String {
        content_id(&self.id)
    }
}

impl fmt::Debug for ModalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModalSpec")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("size", &self.size)
            .field("buttons", &self.buttons)
            .field("close_on_escape", &self.close_on_escape)
            .field("close_on_backdrop", &self.close_on_backdrop)
            .field("owner", &self.owner)
            .field("content", &self.content.is_some())
            .finish()
    }
}

pub fn content_id(modal: &str) -> String {
    format!("{modal}-content")
}

// ── Manager ─────────────────────────────────────────────────────────

struct Registered {
    spec: ModalSpec,
    listener: ListenerId,
}

#[derive(Default)]
struct ManagerState {
    modals: IndexMap<String, Registered>,
    active: Option<String>,
    state: ModalState,
    previous_focus: Option<String>,
    /// Bumped on every open and close; pending focus frames compare against it.
    generation: u64,
    subscriptions: Vec<Subscription>,
    key_listener: Option<ListenerId>,
    triggers: Vec<(String, ListenerId)>,
}

struct ManagerInner {
    bus: EventBus,
    document: Arc<dyn Document>,
    host: String,
    state: Mutex<ManagerState>,
}

/// Owns every registered modal and the single active one.
///
/// Cheap to clone; listeners hold weak references, so dropping the last
/// clone detaches nothing by itself. Call [`dispose`](Self::dispose).
#[derive(Clone)]
pub struct ModalManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ModalManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ModalManager")
            .field("host", &self.inner.host)
            .field("modals", &state.modals.keys().collect::<Vec<_>>())
            .field("active", &state.active)
            .field("state", &state.state)
            .finish()
    }
}

impl ModalManager {
    /// Create a manager that renders modals into the `host` element.
    pub fn new(bus: EventBus, document: Arc<dyn Document>, host: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                bus,
                document,
                host: host.into(),
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn weak(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    fn from_weak(weak: &Weak<ManagerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn document(&self) -> &dyn Document {
        self.inner.document.as_ref()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Subscribe to `modal:open` / `modal:close`, install the Escape listener
    /// and wire every trigger already in the document. Calling it again is a
    /// no-op.
    pub fn init(&self) {
        if self.lock().key_listener.is_some() {
            return;
        }

        let mut subscriptions = Vec::with_capacity(2);
        let weak = self.weak();
        let open = self.inner.bus.subscribe(MODAL_OPEN, move |event| {
            let Some(manager) = Self::from_weak(&weak) else {
                return Ok(());
            };
            let Some(id) = event.payload.modal_id() else {
                return Err(format!("{MODAL_OPEN} without a modal id").into());
            };
            manager.open(id);
            Ok(())
        });
        let weak = self.weak();
        let close = self.inner.bus.subscribe(MODAL_CLOSE, move |event| {
            if let Some(manager) = Self::from_weak(&weak) {
                manager.close(event.payload.modal_id());
            }
            Ok(())
        });
        // Both topics are non-empty constants.
        subscriptions.extend(open.ok());
        subscriptions.extend(close.ok());

        let weak = self.weak();
        let on_key: Listener = Arc::new(move |event: &DomEvent| {
            let DomEvent::KeyDown { key } = event else {
                return;
            };
            if key != KEY_ESCAPE {
                return;
            }
            if let Some(manager) = Self::from_weak(&weak) {
                manager.escape();
            }
        });
        let key_listener = self.document().add_listener(ListenerTarget::KeyDown, on_key);

        {
            let mut state = self.lock();
            state.subscriptions = subscriptions;
            state.key_listener = Some(key_listener);
        }
        let wired = self.scan_triggers(None);
        info!(host = %self.inner.host, triggers = wired, "modal manager initialized");
    }

    /// Force-close the active modal, destroy every modal and detach every
    /// listener. The body is left without the scroll-lock class.
    pub fn dispose(&self) {
        self.close(None);

        let (subscriptions, key_listener, triggers, ids) = {
            let mut state = self.lock();
            (
                std::mem::take(&mut state.subscriptions),
                state.key_listener.take(),
                std::mem::take(&mut state.triggers),
                state.modals.keys().cloned().collect::<Vec<_>>(),
            )
        };
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        let document = self.document();
        if let Some(listener) = key_listener {
            document.remove_listener(listener);
        }
        for (_, listener) in triggers {
            document.remove_listener(listener);
        }
        for id in ids {
            self.destroy(&id);
        }

        {
            let mut state = self.lock();
            state.active = None;
            state.state = ModalState::Closed;
            state.previous_focus = None;
            state.generation += 1;
        }
        document.remove_class(BODY, SCROLL_LOCK_CLASS);
        debug!("modal manager disposed");
    }

    // ── Registration ────────────────────────────────────────────────

    /// Render the modal into the host node. Duplicate ids are ignored.
    pub fn register(&self, spec: ModalSpec) -> bool {
        if self.lock().modals.contains_key(&spec.id) {
            warn!(modal = %spec.id, "duplicate modal registration ignored");
            return false;
        }
        let document = self.document();
        if !document.contains(&self.inner.host) {
            warn!(modal = %spec.id, host = %self.inner.host, "modal host missing, registration ignored");
            return false;
        }
        if !render_modal(document, &self.inner.host, &spec) {
            warn!(modal = %spec.id, "modal markup collides with an existing element");
            return false;
        }

        let weak = self.weak();
        let modal_id = spec.id.clone();
        let on_click: Listener = Arc::new(move |event: &DomEvent| {
            let DomEvent::Click { target } = event else {
                return;
            };
            if let Some(manager) = Self::from_weak(&weak) {
                manager.modal_clicked(&modal_id, target);
            }
        });
        let listener = document.add_listener(
            ListenerTarget::Click {
                element: spec.id.clone(),
            },
            on_click,
        );

        debug!(modal = %spec.id, owner = ?spec.owner, "modal registered");
        self.lock()
            .modals
            .insert(spec.id.clone(), Registered { spec, listener });
        true
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.lock().modals.contains_key(id)
    }

    pub fn registered(&self) -> Vec<String> {
        self.lock().modals.keys().cloned().collect()
    }

    pub fn spec(&self, id: &str) -> Option<ModalSpec> {
        self.lock().modals.get(id).map(|entry| entry.spec.clone())
    }

    /// Close (if active) and destroy one modal.
    pub fn destroy(&self, id: &str) -> bool {
        if self.is_open(id) {
            self.close(Some(id));
        }
        let Some(entry) = self.lock().modals.shift_remove(id) else {
            return false;
        };
        let document = self.document();
        document.remove_listener(entry.listener);
        document.remove_element(id);
        debug!(modal = id, "modal destroyed");
        true
    }

    /// Implicit close and destruction of every modal owned by `feature`.
    pub fn release_owned(&self, feature: &str) -> usize {
        let owned: Vec<String> = self
            .lock()
            .modals
            .values()
            .filter(|entry| entry.spec.owner.as_deref() == Some(feature))
            .map(|entry| entry.spec.id.clone())
            .collect();
        let released = owned.iter().filter(|id| self.destroy(id)).count();
        if released > 0 {
            debug!(feature, released, "released feature modals");
        }
        released
    }

    // ── Triggers ────────────────────────────────────────────────────

    /// Open `modal_id` whenever `element` is clicked. Wiring the same element
    /// twice is a no-op; wiring it to another modal replaces the old listener.
    /// The modal does not have to exist yet.
    pub fn register_trigger(&self, element: &str, modal_id: &str) -> bool {
        let document = self.document();
        if !document.contains(element) {
            warn!(element, modal = modal_id, "trigger element not found");
            return false;
        }
        match document.attribute(element, BOUND_ATTR) {
            Some(bound) if bound == modal_id => return false,
            Some(bound) => {
                let replaced = self.unbind_trigger(element);
                debug!(element, from = %bound, to = modal_id, replaced, "trigger re-pointed");
            }
            None => {}
        }

        let weak = self.weak();
        let target = modal_id.to_owned();
        let on_click: Listener = Arc::new(move |_: &DomEvent| {
            if let Some(manager) = Self::from_weak(&weak) {
                manager.open(&target);
            }
        });
        let listener = document.add_listener(
            ListenerTarget::Click {
                element: element.to_owned(),
            },
            on_click,
        );
        document.set_attribute(element, BOUND_ATTR, modal_id);

        let mut state = self.lock();
        state
            .triggers
            .retain(|(element, _)| document.contains(element));
        state.triggers.push((element.to_owned(), listener));
        true
    }

    fn unbind_trigger(&self, element: &str) -> usize {
        let stale: Vec<ListenerId> = {
            let mut state = self.lock();
            let mut stale = Vec::new();
            state.triggers.retain(|(bound, listener)| {
                if bound == element {
                    stale.push(*listener);
                    false
                } else {
                    true
                }
            });
            stale
        };
        let document = self.document();
        stale
            .iter()
            .filter(|listener| document.remove_listener(**listener))
            .count()
    }

    /// Wire every `data-modal-trigger` element, optionally only inside
    /// `within`. Returns the number of newly wired triggers.
    pub fn scan_triggers(&self, within: Option<&str>) -> usize {
        self.document()
            .query_attribute(TRIGGER_ATTR, within)
            .into_iter()
            .filter(|(element, modal)| self.register_trigger(element, modal))
            .count()
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn is_open(&self, id: &str) -> bool {
        self.lock().active.as_deref() == Some(id)
    }

    pub fn state(&self) -> ModalState {
        self.lock().state
    }

    pub fn active(&self) -> Option<String> {
        self.lock().active.clone()
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Open a registered modal, closing any other one first.
    ///
    /// Returns `false` for unknown ids, for the already-active modal, and
    /// while a close is in progress.
    pub fn open(&self, id: &str) -> bool {
        let current = {
            let state = self.lock();
            if !state.modals.contains_key(id) {
                warn!(modal = id, "cannot open unregistered modal");
                return false;
            }
            match (state.state, state.active.as_deref()) {
                (ModalState::Closing, _) => {
                    warn!(modal = id, "open ignored while a modal is closing");
                    return false;
                }
                (_, Some(active)) if active == id => {
                    debug!(modal = id, "modal already active");
                    return false;
                }
                (_, active) => active.map(str::to_owned),
            }
        };

        if let Some(current) = current {
            debug!(from = %current, to = id, "closing active modal before opening another");
            self.close(Some(&current));
        }

        let (generation, spec) = {
            let mut state = self.lock();
            if state.state != ModalState::Closed {
                warn!(modal = id, "open abandoned: another modal became active");
                return false;
            }
            let Some(entry) = state.modals.get(id) else {
                return false;
            };
            let spec = entry.spec.clone();
            state.generation += 1;
            state.active = Some(id.to_owned());
            state.state = ModalState::Opening;
            (state.generation, spec)
        };

        self.emit(MODAL_BEFORE_OPEN, id);
        if !self.is_current(generation, id) {
            debug!(modal = id, "open superseded during before_open");
            return false;
        }

        let document = self.document();
        if let Some(render) = &spec.content {
            let content = spec.content_id();
            document.clear_children(&content);
            render(document, &content);
        }
        document.add_class(id, ACTIVE_CLASS);
        document.add_class(BODY, SCROLL_LOCK_CLASS);
        let focused = document
            .active_element()
            .filter(|element| !self.is_inside(element, id));
        self.lock().previous_focus = focused;

        let weak = self.weak();
        let modal = id.to_owned();
        document.request_animation_frame(Box::new(move || {
            if let Some(manager) = Self::from_weak(&weak) {
                manager.finish_open(generation, &modal);
            }
        }));
        info!(modal = id, "modal opening");
        true
    }

    fn finish_open(&self, generation: u64, id: &str) {
        if !self.is_current(generation, id) {
            debug!(modal = id, "stale focus frame dropped");
            return;
        }
        let focused = self.document().focus_first_within(id);
        {
            let mut state = self.lock();
            if state.generation != generation || state.state != ModalState::Opening {
                return;
            }
            state.state = ModalState::Open;
        }
        debug!(modal = id, focus = ?focused, "modal open");
        self.emit(MODAL_AFTER_OPEN, id);
    }

    /// Close the active modal. With `Some(id)`, only if that modal is the
    /// active one.
    pub fn close(&self, id: Option<&str>) -> bool {
        let target = {
            let mut state = self.lock();
            let Some(active) = state.active.clone() else {
                return false;
            };
            if id.is_some_and(|id| id != active) {
                debug!(modal = ?id, active = %active, "close ignored: not the active modal");
                return false;
            }
            if state.state == ModalState::Closing {
                return false;
            }
            state.state = ModalState::Closing;
            state.generation += 1;
            active
        };

        self.emit(MODAL_BEFORE_CLOSE, &target);

        let document = self.document();
        document.remove_class(&target, ACTIVE_CLASS);
        document.remove_class(BODY, SCROLL_LOCK_CLASS);
        let previous = self.lock().previous_focus.take();
        let restored = previous.is_some_and(|element| document.focus(&element));
        if !restored
            && document
                .active_element()
                .is_some_and(|element| self.is_inside(&element, &target))
        {
            document.blur();
        }

        {
            let mut state = self.lock();
            state.state = ModalState::Closed;
            state.active = None;
        }
        info!(modal = %target, "modal closed");
        self.emit(MODAL_AFTER_CLOSE, &target);
        true
    }

    fn escape(&self) {
        let target = {
            let state = self.lock();
            if !matches!(state.state, ModalState::Opening | ModalState::Open) {
                return;
            }
            let Some(active) = state.active.as_deref() else {
                return;
            };
            let closes = state
                .modals
                .get(active)
                .is_some_and(|entry| entry.spec.close_on_escape);
            if !closes {
                debug!(modal = active, "escape ignored: modal opted out");
                return;
            }
            active.to_owned()
        };
        self.close(Some(&target));
    }

    fn modal_clicked(&self, modal: &str, target: &str) {
        let close_on_backdrop = {
            let state = self.lock();
            if state.active.as_deref() != Some(modal)
                || !matches!(state.state, ModalState::Opening | ModalState::Open)
            {
                return;
            }
            state
                .modals
                .get(modal)
                .is_some_and(|entry| entry.spec.close_on_backdrop)
        };

        let document = self.document();
        if target == modal {
            if close_on_backdrop {
                self.close(Some(modal));
            } else {
                debug!(modal, "backdrop click ignored: modal opted out");
            }
        } else if document.attribute(target, CLOSE_ATTR).is_some() {
            self.close(Some(modal));
        } else if let Some(topic) = document.attribute(target, PUBLISH_ATTR) {
            if let Err(err) = self.inner.bus.publish(&topic, Payload::modal(modal)) {
                warn!(modal, error = %err, "modal button publish failed");
            }
        }
    }

    fn emit(&self, topic: &str, id: &str) {
        if let Err(err) = self.inner.bus.publish(topic, Payload::modal(id)) {
            warn!(topic, modal = id, error = %err, "lifecycle publish failed");
        }
    }

    fn is_current(&self, generation: u64, id: &str) -> bool {
        let state = self.lock();
        state.generation == generation && state.active.as_deref() == Some(id)
    }

    fn is_inside(&self, element: &str, modal: &str) -> bool {
        self.document().is_within(element, modal)
    }
}

fn render_modal(document: &dyn Document, host: &str, spec: &ModalSpec) -> bool {
    let id = spec.id.as_str();
    let dialog = format!("{id}-dialog");
    let footer = format!("{id}-footer");
    let root = Element::new(id, Tag::Div)
        .class(MODAL_CLASS)
        .class(format!("modal-{}", spec.size))
        .attr("role", "dialog")
        .attr("aria-labelledby", format!("{id}-title"));
    if !document.append_child(host, root) {
        return false;
    }

    document.append_child(id, Element::new(&dialog, Tag::Div).class("modal-dialog"));
    document.append_child(
        &dialog,
        Element::new(format!("{id}-title"), Tag::Heading).text(&spec.title),
    );
    document.append_child(
        &dialog,
        Element::new(format!("{id}-close"), Tag::Button)
            .text("×")
            .class("modal-close")
            .attr(CLOSE_ATTR, "")
            .attr("aria-label", "Close"),
    );
    document.append_child(
        &dialog,
        Element::new(spec.content_id(), Tag::Section).class("modal-content"),
    );
    document.append_child(&dialog, Element::new(&footer, Tag::Div).class("modal-footer"));
    for (index, button) in spec.buttons.iter().enumerate() {
        let mut element =
            Element::new(format!("{id}-button-{index}"), Tag::Button).text(&button.label);
        element = match &button.action {
            ButtonAction::Close => element.attr(CLOSE_ATTR, ""),
            ButtonAction::Publish(topic) => element.attr(PUBLISH_ATTR, topic),
        };
        if let Some(key) = button.hotkey {
            element = element.attr(HOTKEY_ATTR, key.to_string());
        }
        document.append_child(&footer, element);
    }
    true
}
