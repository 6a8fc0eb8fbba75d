//! Feature component contract.
//!
//! A feature is created fresh from its descriptor's factory on every mount
//! and receives a [`MountContext`]: the shared bus, modal manager and
//! document, the content region it renders into, and a disposal tracker.
//! Anything registered through the context is torn down by the router on
//! unmount, so features never unsubscribe by hand.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::boundary::{RequestKind, RequestQueue};
use crate::bus::{Event, EventBus};
use crate::dom::{Document, Listener, ListenerId, ListenerTarget};
use crate::error::{DashboardError, FeatureError, HandlerResult};
use crate::modal::{ModalManager, ModalSpec};
use crate::registry::UserContext;
use crate::router::{Disposables, GenerationGuard};
use crate::topic::{FeatureAction, Payload, feature_topic};

/// A mountable dashboard feature.
pub trait Feature: Send {
    /// Render into `ctx.root()` and register subscriptions and modals.
    fn mount(&mut self, ctx: &mut MountContext) -> Result<(), FeatureError>;

    /// Called before the router disposes everything tracked by the context.
    fn unmount(&mut self) {}
}

/// Per-mount handle passed to [`Feature::mount`].
pub struct MountContext {
    feature: String,
    root: String,
    bus: EventBus,
    modals: ModalManager,
    document: Arc<dyn Document>,
    user: UserContext,
    props: Value,
    guard: GenerationGuard,
    requests: RequestQueue,
    disposables: Disposables,
}

impl MountContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        feature: String,
        root: String,
        bus: EventBus,
        modals: ModalManager,
        document: Arc<dyn Document>,
        user: UserContext,
        props: Value,
        guard: GenerationGuard,
        requests: RequestQueue,
    ) -> Self {
        Self {
            feature,
            root,
            bus,
            modals,
            document,
            user,
            props,
            guard,
            requests,
            disposables: Disposables::default(),
        }
    }

    pub fn feature_id(&self) -> &str {
        &self.feature
    }

    /// Id of the content region this feature renders into.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn modals(&self) -> &ModalManager {
        &self.modals
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    pub fn props(&self) -> &Value {
        &self.props
    }

    /// Guard for this mount; stale once the feature is unmounted.
    pub fn guard(&self) -> &GenerationGuard {
        &self.guard
    }

    // ── Tracked registrations ───────────────────────────────────────

    /// Subscribe for the lifetime of this mount.
    pub fn subscribe<F>(&mut self, topic: &str, handler: F) -> Result<(), DashboardError>
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let subscription = self.bus.subscribe(topic, handler)?;
        self.disposables.track_subscription(subscription);
        Ok(())
    }

    /// Subscribe to one of this feature's own topics, e.g. `profile:load:success`.
    pub fn on<F>(&mut self, action: FeatureAction, handler: F) -> Result<(), DashboardError>
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let topic = feature_topic(&self.feature, action);
        self.subscribe(&topic, handler)
    }

    /// Attach a document listener for the lifetime of this mount.
    pub fn listen(&mut self, target: ListenerTarget, listener: Listener) -> ListenerId {
        let id = self.document.add_listener(target, listener);
        self.disposables.track_listener(id);
        id
    }

    /// Register a modal owned by this feature; it is destroyed on unmount.
    pub fn register_modal(&mut self, spec: ModalSpec) -> bool {
        self.modals.register(spec.owned_by(self.feature.clone()))
    }

    pub fn publish(&self, topic: &str, payload: Payload) {
        if let Err(err) = self.bus.publish(topic, payload) {
            warn!(feature = %self.feature, error = %err, "feature publish failed");
        }
    }

    // ── Data boundary ───────────────────────────────────────────────

    /// Fetch this feature's payload. The result arrives as
    /// `<feature>:load:success` or `<feature>:load:error`.
    pub fn request_load(&self) {
        self.requests
            .submit(self.guard.clone(), &self.feature, RequestKind::Load, None);
    }

    /// Save a payload. The result arrives as `<feature>:save:success` or
    /// `<feature>:save:error`.
    pub fn request_save(&self, payload: Value) {
        self.requests.submit(
            self.guard.clone(),
            &self.feature,
            RequestKind::Save,
            Some(payload),
        );
    }

    /// A cloneable handle for issuing requests from handlers.
    pub fn requester(&self) -> Requester {
        Requester {
            feature: self.feature.clone(),
            guard: self.guard.clone(),
            requests: self.requests.clone(),
        }
    }

    pub(crate) fn dispose(&mut self) -> usize {
        self.disposables.dispose(self.document.as_ref())
    }
}

/// Issues data-boundary requests on behalf of one mounted feature.
#[derive(Clone)]
pub struct Requester {
    feature: String,
    guard: GenerationGuard,
    requests: RequestQueue,
}

impl Requester {
    pub fn load(&self) {
        self.requests
            .submit(self.guard.clone(), &self.feature, RequestKind::Load, None);
    }

    pub fn save(&self, payload: Value) {
        self.requests.submit(
            self.guard.clone(),
            &self.feature,
            RequestKind::Save,
            Some(payload),
        );
    }
}
