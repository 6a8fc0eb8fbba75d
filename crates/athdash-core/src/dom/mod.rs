//! Document seam: the narrow slice of a DOM the composition layer touches.
//!
//! The bus, modal manager, router and shell never talk to a concrete page.
//! They go through [`Document`]: element insertion and removal, classes,
//! attributes, focus, listeners, event dispatch, and animation frames.
//! [`MemoryDocument`] is the headless implementation used by tests and by
//! the terminal host.

mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use strum::Display;

pub use memory::MemoryDocument;

// ── Markup contract ─────────────────────────────────────────────────

/// Id of the root element every document starts with.
pub const BODY: &str = "body";
/// Prefix of every custom event the bus bridges to and from the document.
pub const EVENT_PREFIX: &str = "dashboard:";
/// Class a modal root carries while it is open.
pub const ACTIVE_CLASS: &str = "is-active";
/// Class on `body` that blocks background scrolling while a modal is open.
pub const SCROLL_LOCK_CLASS: &str = "modal-open";
/// Attribute naming the modal a trigger element opens.
pub const TRIGGER_ATTR: &str = "data-modal-trigger";
/// Attribute marking an element inside a modal that closes it when clicked.
pub const CLOSE_ATTR: &str = "data-modal-close";
/// Single-character keyboard shortcut a host may offer for a button.
pub const HOTKEY_ATTR: &str = "data-hotkey";
/// `KeyboardEvent.key` value for the Escape key.
pub const KEY_ESCAPE: &str = "Escape";

pub type ListenerId = u64;
pub type Listener = Arc<dyn Fn(&DomEvent) + Send + Sync>;
pub type FrameCallback = Box<dyn FnOnce() + Send>;

// ── Elements ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Tag {
    Div,
    Header,
    Nav,
    Aside,
    Main,
    Section,
    Heading,
    Paragraph,
    List,
    Item,
    Button,
    Span,
}

/// A detached element description, inserted with [`Document::append_child`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub id: String,
    pub tag: Tag,
    pub text: Option<String>,
    pub classes: BTreeSet<String>,
    pub attributes: BTreeMap<String, String>,
    pub focusable: bool,
}

impl Element {
    pub fn new(id: impl Into<String>, tag: Tag) -> Self {
        Self {
            id: id.into(),
            tag,
            text: None,
            classes: BTreeSet::new(),
            attributes: BTreeMap::new(),
            focusable: tag == Tag::Button,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.insert(class.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn focusable(mut self, focusable: bool) -> Self {
        self.focusable = focusable;
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// A `CustomEvent` as the bus bridge sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomEvent {
    pub name: String,
    /// `{ "type": <topic>, "data": <payload> }` for bridged events.
    pub detail: Value,
    pub bubbles: bool,
    /// Set on events the bus dispatched itself, so its own bridge listener
    /// can ignore them.
    pub from_bus: bool,
}

impl CustomEvent {
    /// An event coming from outside the bus (server markup, other scripts).
    pub fn external(name: impl Into<String>, detail: Value) -> Self {
        Self {
            name: name.into(),
            detail,
            bubbles: true,
            from_bus: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent {
    Custom(CustomEvent),
    /// A click, delivered to listeners on the target and every ancestor.
    Click { target: String },
    KeyDown { key: String },
}

/// What a listener is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerTarget {
    /// Document-level custom events whose name starts with `prefix`.
    Custom { prefix: String },
    /// Clicks on `element` or any of its descendants.
    Click { element: String },
    /// Key presses anywhere in the document.
    KeyDown,
}

// ── Document ────────────────────────────────────────────────────────

/// Everything the composition layer needs from a page.
///
/// Implementations must not hold internal locks while invoking listeners or
/// frame callbacks: listeners routinely call back into the document.
pub trait Document: Send + Sync {
    /// Append `element` as the last child of `parent`. Returns `false` if the
    /// parent is missing or the id is already taken.
    fn append_child(&self, parent: &str, element: Element) -> bool;

    /// Remove an element and its subtree, dropping listeners attached to it.
    fn remove_element(&self, id: &str) -> bool;

    /// Remove every child of `id`, keeping `id` itself.
    fn clear_children(&self, id: &str);

    fn contains(&self, id: &str) -> bool;

    /// Snapshot of one element.
    fn element(&self, id: &str) -> Option<Element>;

    /// Child ids in document order.
    fn children(&self, id: &str) -> Vec<String>;

    fn add_class(&self, id: &str, class: &str) -> bool;
    fn remove_class(&self, id: &str, class: &str) -> bool;
    fn has_class(&self, id: &str, class: &str) -> bool;

    fn set_attribute(&self, id: &str, name: &str, value: &str) -> bool;
    fn attribute(&self, id: &str, name: &str) -> Option<String>;
    fn set_text(&self, id: &str, text: &str) -> bool;

    /// `(element id, attribute value)` for every element carrying `name`,
    /// in document order, optionally restricted to the subtree of `within`.
    fn query_attribute(&self, name: &str, within: Option<&str>) -> Vec<(String, String)>;

    /// Focus a focusable element. Returns `false` if it cannot take focus.
    fn focus(&self, id: &str) -> bool;
    fn blur(&self);
    fn active_element(&self) -> Option<String>;

    /// Focus the first focusable element inside `id`, in document order.
    fn focus_first_within(&self, id: &str) -> Option<String>;

    /// Whether `id` is `ancestor` or one of its descendants.
    fn is_within(&self, id: &str, ancestor: &str) -> bool;

    fn add_listener(&self, target: ListenerTarget, listener: Listener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId) -> bool;
    fn dispatch(&self, event: &DomEvent);

    /// Run `callback` once the next frame is painted.
    fn request_animation_frame(&self, callback: FrameCallback);
}
