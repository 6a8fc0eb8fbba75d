// ── Headless document ──
//
// An element tree behind one mutex. Listener and frame callbacks are
// cloned out of the lock before they run, so they are free to mutate the
// document or dispatch further events.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::{trace, warn};

use super::{
    BODY, CustomEvent, Document, DomEvent, Element, FrameCallback, Listener, ListenerId,
    ListenerTarget, Tag,
};

struct Node {
    element: Element,
    parent: Option<String>,
    children: Vec<String>,
}

struct State {
    nodes: HashMap<String, Node>,
    focused: Option<String>,
    listeners: IndexMap<ListenerId, (ListenerTarget, Listener)>,
    next_listener: ListenerId,
    frames: VecDeque<FrameCallback>,
    dispatched: Vec<CustomEvent>,
}

impl State {
    /// Ids of `id` and all its descendants, preorder.
    fn subtree(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![id.to_owned()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().cloned());
                out.push(current);
            }
        }
        out
    }

    /// `id` followed by its ancestors up to the root.
    fn ancestry(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(id).map(|_| id.to_owned());
        while let Some(node_id) = current {
            current = self.nodes.get(&node_id).and_then(|n| n.parent.clone());
            chain.push(node_id);
        }
        chain
    }

    fn detach(&mut self, id: &str) {
        let removed = self.subtree(id);
        if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent.clone()) {
            if let Some(parent) = self.nodes.get_mut(&parent) {
                parent.children.retain(|c| c != id);
            }
        }
        for node in &removed {
            self.nodes.remove(node);
        }
        if self
            .focused
            .as_ref()
            .is_some_and(|f| removed.iter().any(|r| r == f))
        {
            self.focused = None;
        }
        self.listeners.retain(|_, (target, _)| match target {
            ListenerTarget::Click { element } => !removed.contains(element),
            _ => true,
        });
    }
}

/// In-memory [`Document`] with a `body` root element.
pub struct MemoryDocument {
    state: Mutex<State>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            BODY.to_owned(),
            Node {
                element: Element::new(BODY, Tag::Div),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            state: Mutex::new(State {
                nodes,
                focused: None,
                listeners: IndexMap::new(),
                next_listener: 1,
                frames: VecDeque::new(),
                dispatched: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every animation-frame callback queued so far. Callbacks queued
    /// while flushing wait for the next flush. Returns how many ran.
    pub fn flush_frames(&self) -> usize {
        let frames: Vec<FrameCallback> = self.state().frames.drain(..).collect();
        let count = frames.len();
        for frame in frames {
            frame();
        }
        count
    }

    pub fn pending_frames(&self) -> usize {
        self.state().frames.len()
    }

    /// Custom events dispatched on this document, oldest first.
    pub fn dispatched_events(&self) -> Vec<CustomEvent> {
        self.state().dispatched.clone()
    }

    pub fn clear_dispatched(&self) {
        self.state().dispatched.clear();
    }

    /// Simulate a click on `id`.
    pub fn click(&self, id: &str) {
        self.dispatch(&DomEvent::Click { target: id.to_owned() });
    }

    /// Simulate a key press.
    pub fn key_down(&self, key: &str) {
        self.dispatch(&DomEvent::KeyDown { key: key.to_owned() });
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    /// Preorder walk of `id`'s subtree as `(depth, element)`; `id` itself is
    /// depth 0. Hosts render from this.
    pub fn outline(&self, id: &str) -> Vec<(usize, Element)> {
        let state = self.state();
        let mut out = Vec::new();
        let mut stack = vec![(id.to_owned(), 0usize)];
        while let Some((current, depth)) = stack.pop() {
            if let Some(node) = state.nodes.get(&current) {
                stack.extend(node.children.iter().rev().map(|c| (c.clone(), depth + 1)));
                out.push((depth, node.element.clone()));
            }
        }
        out
    }

    fn matching_listeners(&self, event: &DomEvent) -> Vec<Listener> {
        let mut state = self.state();
        match event {
            DomEvent::Custom(custom) => {
                state.dispatched.push(custom.clone());
                state
                    .listeners
                    .values()
                    .filter(|(target, _)| {
                        matches!(target, ListenerTarget::Custom { prefix } if custom.name.starts_with(prefix.as_str()))
                    })
                    .map(|(_, l)| Listener::clone(l))
                    .collect()
            }
            DomEvent::Click { target } => {
                // Innermost listeners first, like bubbling.
                let chain = state.ancestry(target);
                chain
                    .iter()
                    .flat_map(|node| {
                        state.listeners.values().filter_map(move |(t, l)| match t {
                            ListenerTarget::Click { element } if element == node => {
                                Some(Listener::clone(l))
                            }
                            _ => None,
                        })
                    })
                    .collect()
            }
            DomEvent::KeyDown { .. } => state
                .listeners
                .values()
                .filter(|(target, _)| *target == ListenerTarget::KeyDown)
                .map(|(_, l)| Listener::clone(l))
                .collect(),
        }
    }
}

impl Document for MemoryDocument {
    fn append_child(&self, parent: &str, element: Element) -> bool {
        let mut state = self.state();
        if state.nodes.contains_key(&element.id) {
            warn!(id = %element.id, "duplicate element id, not inserted");
            return false;
        }
        let Some(parent_node) = state.nodes.get_mut(parent) else {
            warn!(parent, id = %element.id, "parent element missing, not inserted");
            return false;
        };
        parent_node.children.push(element.id.clone());
        let id = element.id.clone();
        state.nodes.insert(
            id,
            Node {
                element,
                parent: Some(parent.to_owned()),
                children: Vec::new(),
            },
        );
        true
    }

    fn remove_element(&self, id: &str) -> bool {
        if id == BODY {
            return false;
        }
        let mut state = self.state();
        if !state.nodes.contains_key(id) {
            return false;
        }
        state.detach(id);
        true
    }

    fn clear_children(&self, id: &str) {
        let mut state = self.state();
        let children = state
            .nodes
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            state.detach(&child);
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.state().nodes.contains_key(id)
    }

    fn element(&self, id: &str) -> Option<Element> {
        self.state().nodes.get(id).map(|n| n.element.clone())
    }

    fn children(&self, id: &str) -> Vec<String> {
        self.state()
            .nodes
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn add_class(&self, id: &str, class: &str) -> bool {
        self.state()
            .nodes
            .get_mut(id)
            .is_some_and(|n| n.element.classes.insert(class.to_owned()))
    }

    fn remove_class(&self, id: &str, class: &str) -> bool {
        self.state()
            .nodes
            .get_mut(id)
            .is_some_and(|n| n.element.classes.remove(class))
    }

    fn has_class(&self, id: &str, class: &str) -> bool {
        self.state()
            .nodes
            .get(id)
            .is_some_and(|n| n.element.has_class(class))
    }

    fn set_attribute(&self, id: &str, name: &str, value: &str) -> bool {
        let mut state = self.state();
        let Some(node) = state.nodes.get_mut(id) else {
            return false;
        };
        node.element
            .attributes
            .insert(name.to_owned(), value.to_owned());
        true
    }

    fn attribute(&self, id: &str, name: &str) -> Option<String> {
        self.state()
            .nodes
            .get(id)
            .and_then(|n| n.element.attribute(name).map(str::to_owned))
    }

    fn set_text(&self, id: &str, text: &str) -> bool {
        let mut state = self.state();
        let Some(node) = state.nodes.get_mut(id) else {
            return false;
        };
        node.element.text = Some(text.to_owned());
        true
    }

    fn query_attribute(&self, name: &str, within: Option<&str>) -> Vec<(String, String)> {
        let state = self.state();
        state
            .subtree(within.unwrap_or(BODY))
            .into_iter()
            .filter_map(|id| {
                let value = state.nodes.get(&id)?.element.attribute(name)?.to_owned();
                Some((id, value))
            })
            .collect()
    }

    fn focus(&self, id: &str) -> bool {
        let mut state = self.state();
        if !state.nodes.get(id).is_some_and(|n| n.element.focusable) {
            return false;
        }
        state.focused = Some(id.to_owned());
        true
    }

    fn blur(&self) {
        self.state().focused = None;
    }

    fn active_element(&self) -> Option<String> {
        self.state().focused.clone()
    }

    fn focus_first_within(&self, id: &str) -> Option<String> {
        let mut state = self.state();
        let target = state
            .subtree(id)
            .into_iter()
            .find(|n| state.nodes.get(n).is_some_and(|node| node.element.focusable))?;
        state.focused = Some(target.clone());
        Some(target)
    }

    fn is_within(&self, id: &str, ancestor: &str) -> bool {
        self.state()
            .ancestry(id)
            .iter()
            .any(|node| node == ancestor)
    }

    fn add_listener(&self, target: ListenerTarget, listener: Listener) -> ListenerId {
        let mut state = self.state();
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(id, (target, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.state().listeners.shift_remove(&id).is_some()
    }

    fn dispatch(&self, event: &DomEvent) {
        let listeners = self.matching_listeners(event);
        trace!(?event, listeners = listeners.len(), "dispatching document event");
        for listener in listeners {
            listener(event);
        }
    }

    fn request_animation_frame(&self, callback: FrameCallback) {
        self.state().frames.push_back(callback);
    }
}
