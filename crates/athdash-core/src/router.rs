//! Feature router and mount point.
//!
//! Owns the only piece of navigation state, the id of the mounted feature.
//! Every mount bumps a [`Generation`]; anything deferred (a focus frame, a
//! data-boundary completion) carries a [`GenerationGuard`] and checks it
//! before touching the page.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::boundary::RequestQueue;
use crate::bus::{EventBus, Subscription};
use crate::dom::{Document, ListenerId};
use crate::error::DashboardError;
use crate::feature::{Feature, MountContext};
use crate::modal::ModalManager;
use crate::registry::{FeatureDescriptor, FeatureRegistry};
use crate::topic::{FEATURE_MOUNTED, FEATURE_UNMOUNTED, NAVIGATION_CHANGE, Payload};

/// Feature mounted when the request names nothing usable.
pub const DEFAULT_FEATURE: &str = "overview";
/// Query parameter selecting the feature on load.
pub const ROUTE_PARAM: &str = "dashboard_feature";

/// Extract `dashboard_feature` from a query string (`?` optional).
pub fn route_param_from_query(query: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == ROUTE_PARAM)
        .map(|(_, value)| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// `?dashboard_feature=<id>`, percent-encoded.
pub fn query_for(feature: &str) -> String {
    let encoded = form_urlencoded::Serializer::new(String::new())
        .append_pair(ROUTE_PARAM, feature)
        .finish();
    format!("?{encoded}")
}

// ── Generation counter ──────────────────────────────────────────────

/// Monotonic mount counter shared by the router and its guards.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Invalidate every outstanding guard and return the new value.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn guard(&self) -> GenerationGuard {
        GenerationGuard {
            counter: Arc::clone(&self.0),
            value: self.current(),
        }
    }
}

/// Snapshot of a [`Generation`] taken when work was scheduled.
#[derive(Debug, Clone)]
pub struct GenerationGuard {
    counter: Arc<AtomicU64>,
    value: u64,
}

impl GenerationGuard {
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.value
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

// ── Disposal tracking ───────────────────────────────────────────────

/// Subscriptions and listeners registered during one mount.
#[derive(Debug, Default)]
pub struct Disposables {
    subscriptions: Vec<Subscription>,
    listeners: Vec<ListenerId>,
}

impl Disposables {
    pub fn track_subscription(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn track_listener(&mut self, listener: ListenerId) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len() + self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release everything tracked so far. Returns how many items were released.
    pub fn dispose(&mut self, document: &dyn Document) -> usize {
        let released = self.len();
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        for listener in self.listeners.drain(..) {
            document.remove_listener(listener);
        }
        released
    }
}

// ── Router ──────────────────────────────────────────────────────────

struct Mounted {
    descriptor: FeatureDescriptor,
    feature: Box<dyn Feature>,
    context: MountContext,
}

#[derive(Default)]
struct RouterState {
    current: Option<Mounted>,
    navigating: bool,
}

struct RouterInner {
    registry: Arc<FeatureRegistry>,
    bus: EventBus,
    modals: ModalManager,
    document: Arc<dyn Document>,
    content: String,
    requests: RequestQueue,
    default_feature: String,
    generation: Generation,
    state: Mutex<RouterState>,
}

/// Mounts one feature at a time into the content region.
#[derive(Clone)]
pub struct FeatureRouter {
    inner: Arc<RouterInner>,
}

impl fmt::Debug for FeatureRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRouter")
            .field("content", &self.inner.content)
            .field("current", &self.current_feature_id())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl FeatureRouter {
    pub fn new(
        registry: Arc<FeatureRegistry>,
        bus: EventBus,
        modals: ModalManager,
        document: Arc<dyn Document>,
        content: impl Into<String>,
        requests: RequestQueue,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                registry,
                bus,
                modals,
                document,
                content: content.into(),
                requests,
                default_feature: DEFAULT_FEATURE.to_owned(),
                generation: Generation::default(),
                state: Mutex::new(RouterState::default()),
            }),
        }
    }

    /// Use a different fallback feature than [`DEFAULT_FEATURE`].
    ///
    /// Only meaningful before the router is shared.
    #[must_use]
    pub fn with_default_feature(self, feature: impl Into<String>) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.default_feature = feature.into();
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                warn!("router already shared, default feature unchanged");
                Self { inner }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &Arc<FeatureRegistry> {
        &self.inner.registry
    }

    pub fn default_feature(&self) -> &str {
        &self.inner.default_feature
    }

    pub fn current_feature_id(&self) -> Option<String> {
        self.lock()
            .current
            .as_ref()
            .map(|mounted| mounted.descriptor.id().to_owned())
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.current()
    }

    /// Guard for the currently mounted feature.
    pub fn guard(&self) -> GenerationGuard {
        self.inner.generation.guard()
    }

    pub fn is_navigating(&self) -> bool {
        self.lock().navigating
    }

    // ── Resolution ──────────────────────────────────────────────────

    /// The requested feature if it is registered and accessible, else the
    /// default feature, else the first accessible one.
    pub fn resolve_current_feature(&self, param: Option<&str>) -> Option<FeatureDescriptor> {
        let registry = &self.inner.registry;
        let requested = param.map(str::trim).filter(|id| !id.is_empty());

        if let Some(id) = requested {
            if let Ok(descriptor) = registry.require(id) {
                return Some(descriptor.clone());
            }
            warn!(
                feature = id,
                fallback = %self.inner.default_feature,
                "requested feature unavailable, falling back"
            );
        }

        if let Ok(descriptor) = registry.require(&self.inner.default_feature) {
            return Some(descriptor.clone());
        }

        let first = registry.accessible().next().cloned();
        match &first {
            Some(descriptor) => debug!(
                feature = descriptor.id(),
                "default feature unavailable, using first accessible"
            ),
            None => warn!("no accessible feature registered"),
        }
        first
    }

    // ── Mounting ────────────────────────────────────────────────────

    /// Mount `descriptor`, unmounting whatever is mounted first.
    ///
    /// Returns `Ok(false)` when the same feature is already mounted.
    pub fn mount(&self, descriptor: &FeatureDescriptor) -> Result<bool, DashboardError> {
        {
            let mut state = self.lock();
            if state.navigating {
                warn!(feature = descriptor.id(), "mount ignored: navigation in progress");
                return Err(DashboardError::NavigationInProgress {
                    to: descriptor.id().to_owned(),
                });
            }
            if is_mounted(&state, descriptor.id()) {
                debug!(feature = descriptor.id(), "feature already mounted");
                return Ok(false);
            }
            state.navigating = true;
        }

        let result = self.swap_to(descriptor);
        self.lock().navigating = false;
        result.map(|()| true)
    }

    /// Navigate to a registered, accessible feature.
    ///
    /// Publishes `navigation:change` before the unmount/mount pair. Unknown or
    /// inaccessible ids leave the current feature mounted.
    pub fn navigate(&self, id: &str) -> Result<bool, DashboardError> {
        let descriptor = match self.inner.registry.require(id) {
            Ok(descriptor) => descriptor.clone(),
            Err(err) => {
                warn!(feature = id, "navigation to unavailable feature ignored");
                return Err(err);
            }
        };

        let from = {
            let mut state = self.lock();
            if state.navigating {
                warn!(feature = id, "re-entrant navigation rejected");
                return Err(DashboardError::NavigationInProgress { to: id.to_owned() });
            }
            if is_mounted(&state, id) {
                return Ok(false);
            }
            state.navigating = true;
            state
                .current
                .as_ref()
                .map(|mounted| mounted.descriptor.id().to_owned())
        };

        info!(from = ?from, to = id, "navigating");
        if let Err(err) = self.inner.bus.publish(
            NAVIGATION_CHANGE,
            Payload::Navigation {
                from,
                to: id.to_owned(),
            },
        ) {
            warn!(error = %err, "navigation event not published");
        }

        let result = self.swap_to(&descriptor);
        self.lock().navigating = false;
        result.map(|()| true)
    }

    /// Unmount the current feature, if any.
    pub fn unmount(&self) -> bool {
        let previous = self.lock().current.take();
        match previous {
            Some(mounted) => {
                self.teardown(mounted);
                true
            }
            None => false,
        }
    }

    fn swap_to(&self, descriptor: &FeatureDescriptor) -> Result<(), DashboardError> {
        let previous = self.lock().current.take();
        if let Some(mounted) = previous {
            self.teardown(mounted);
        }

        let inner = &self.inner;
        let id = descriptor.id();
        inner.generation.bump();
        let mut context = MountContext::new(
            id.to_owned(),
            inner.content.clone(),
            inner.bus.clone(),
            inner.modals.clone(),
            Arc::clone(&inner.document),
            inner.registry.user().clone(),
            descriptor.props_value().clone(),
            inner.generation.guard(),
            inner.requests.clone(),
        );
        let mut feature = descriptor.create();

        if let Err(err) = feature.mount(&mut context) {
            warn!(feature = id, error = %err, "feature mount failed");
            context.dispose();
            inner.modals.release_owned(id);
            inner.document.clear_children(&inner.content);
            inner.generation.bump();
            return Err(DashboardError::MountFailed {
                id: id.to_owned(),
                reason: err.to_string(),
            });
        }

        let triggers = inner.modals.scan_triggers(Some(&inner.content));
        self.lock().current = Some(Mounted {
            descriptor: descriptor.clone(),
            feature,
            context,
        });
        info!(feature = id, generation = self.generation(), triggers, "feature mounted");

        if let Err(err) = inner.bus.publish(
            FEATURE_MOUNTED,
            Payload::Feature { id: id.to_owned() },
        ) {
            warn!(error = %err, "mount event not published");
        }
        Ok(())
    }

    fn teardown(&self, mounted: Mounted) {
        let Mounted {
            descriptor,
            mut feature,
            mut context,
        } = mounted;
        let inner = &self.inner;
        let id = descriptor.id();

        feature.unmount();
        let released = context.dispose();
        let modals = inner.modals.release_owned(id);
        inner.document.clear_children(&inner.content);
        inner.generation.bump();
        debug!(feature = id, released, modals, "feature unmounted");

        if let Err(err) = inner.bus.publish(
            FEATURE_UNMOUNTED,
            Payload::Feature { id: id.to_owned() },
        ) {
            warn!(error = %err, "unmount event not published");
        }
    }
}

fn is_mounted(state: &RouterState, id: &str) -> bool {
    state
        .current
        .as_ref()
        .is_some_and(|mounted| mounted.descriptor.id() == id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::dom::{BODY, Element, MemoryDocument, Tag};
    use crate::error::FeatureError;
    use crate::modal::ModalSpec;
    use crate::registry::tests::inert;
    use crate::registry::{ADMIN_ROLE, RegistryBuilder, UserContext};
    use pretty_assertions::assert_eq;

    const CONTENT: &str = "content";

    /// Counts `ping` deliveries through a tracked subscription.
    struct Counting {
        hits: Arc<AtomicUsize>,
    }

    impl Feature for Counting {
        fn mount(&mut self, ctx: &mut MountContext) -> Result<(), FeatureError> {
            let hits = Arc::clone(&self.hits);
            ctx.subscribe("ping", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .map_err(|err| FeatureError::new(err.to_string()))?;
            ctx.document().append_child(
                ctx.root(),
                Element::new("counting-body", Tag::Paragraph).text("counting"),
            );
            ctx.register_modal(ModalSpec::new("counting-modal", "Counting"));
            Ok(())
        }
    }

    struct Failing;

    impl Feature for Failing {
        fn mount(&mut self, ctx: &mut MountContext) -> Result<(), FeatureError> {
            ctx.subscribe("ping", |_| Ok(()))
                .map_err(|err| FeatureError::new(err.to_string()))?;
            Err(FeatureError::new("template missing"))
        }
    }

    struct Fixture {
        doc: Arc<MemoryDocument>,
        bus: EventBus,
        modals: ModalManager,
        router: FeatureRouter,
        hits: Arc<AtomicUsize>,
    }

    fn fixture_with(role: &str, extra: Vec<FeatureDescriptor>) -> Fixture {
        let doc = Arc::new(MemoryDocument::new());
        doc.append_child(BODY, Element::new(CONTENT, Tag::Main));
        doc.append_child(BODY, Element::new("modal-host", Tag::Div));
        let bus = EventBus::new();
        let modals = ModalManager::new(bus.clone(), doc.clone(), "modal-host");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let mut builder = RegistryBuilder::new(UserContext::new(1, "Alex", role));
        builder.register(inert("overview"));
        builder.register(FeatureDescriptor::new("counting", "Counting", move |_| {
            Box::new(Counting {
                hits: Arc::clone(&counter),
            })
        }));
        builder.register(FeatureDescriptor::new("failing", "Failing", |_| Box::new(Failing)));
        for descriptor in extra {
            builder.register(descriptor);
        }

        let (requests, _rx) = RequestQueue::new(None);
        let router = FeatureRouter::new(
            Arc::new(builder.build()),
            bus.clone(),
            modals.clone(),
            doc.clone(),
            CONTENT,
            requests,
        );
        Fixture {
            doc,
            bus,
            modals,
            router,
            hits,
        }
    }

    fn fixture() -> Fixture {
        fixture_with("subscriber", Vec::new())
    }

    fn resolved(f: &Fixture, param: Option<&str>) -> Option<String> {
        f.router
            .resolve_current_feature(param)
            .map(|d| d.id().to_owned())
    }

    #[test]
    fn route_param_is_read_from_the_query() {
        assert_eq!(
            route_param_from_query("?page=athlete&dashboard_feature=profile"),
            Some("profile".to_owned())
        );
        assert_eq!(
            route_param_from_query("dashboard_feature=workout%2Dtracker"),
            Some("workout-tracker".to_owned())
        );
        assert_eq!(route_param_from_query("?dashboard_feature="), None);
        assert_eq!(route_param_from_query(""), None);
        assert_eq!(query_for("training persona"), "?dashboard_feature=training+persona");
    }

    #[test]
    fn resolution_falls_back_to_overview() {
        let f = fixture();
        assert_eq!(resolved(&f, None).as_deref(), Some("overview"));
        assert_eq!(resolved(&f, Some("nonexistent")).as_deref(), Some("overview"));
        assert_eq!(resolved(&f, Some("  ")).as_deref(), Some("overview"));
        assert_eq!(resolved(&f, Some("counting")).as_deref(), Some("counting"));
    }

    #[test]
    fn inaccessible_request_falls_back_but_admin_gets_through() {
        let locked = || vec![inert("coaching").permissions(["trainer"])];
        let subscriber = fixture_with("subscriber", locked());
        let admin = fixture_with(ADMIN_ROLE, locked());

        assert_eq!(
            resolved(&subscriber, Some("coaching")).as_deref(),
            Some("overview")
        );
        assert_eq!(resolved(&admin, Some("coaching")).as_deref(), Some("coaching"));
    }

    #[test]
    fn resolution_uses_first_accessible_without_overview() {
        let doc = Arc::new(MemoryDocument::new());
        let bus = EventBus::new();
        let modals = ModalManager::new(bus.clone(), doc.clone(), "modal-host");
        let registry = RegistryBuilder::new(UserContext::default())
            .with(inert("admin-only").permissions([ADMIN_ROLE]))
            .with(inert("profile"))
            .build();
        let (requests, _rx) = RequestQueue::new(None);
        let router = FeatureRouter::new(Arc::new(registry), bus, modals, doc, CONTENT, requests);

        assert_eq!(
            router
                .resolve_current_feature(Some("missing"))
                .map(|d| d.id().to_owned()),
            Some("profile".to_owned())
        );

        let empty = RegistryBuilder::new(UserContext::default()).build();
        let router = router_for(empty);
        assert!(router.resolve_current_feature(None).is_none());
    }

    fn router_for(registry: FeatureRegistry) -> FeatureRouter {
        let doc = Arc::new(MemoryDocument::new());
        let bus = EventBus::new();
        let modals = ModalManager::new(bus.clone(), doc.clone(), "modal-host");
        let (requests, _rx) = RequestQueue::new(None);
        FeatureRouter::new(Arc::new(registry), bus, modals, doc, CONTENT, requests)
    }

    #[test]
    fn custom_default_feature() {
        let registry = RegistryBuilder::new(UserContext::default())
            .with(inert("overview"))
            .with(inert("profile"))
            .build();
        let router = router_for(registry).with_default_feature("profile");
        assert_eq!(
            router.resolve_current_feature(None).map(|d| d.id().to_owned()),
            Some("profile".to_owned())
        );
    }

    #[test]
    fn mounting_twice_keeps_one_set_of_subscriptions() {
        let f = fixture();
        let counting = f.router.registry().get_by_id("counting").unwrap().clone();

        assert!(f.router.mount(&counting).unwrap());
        assert!(!f.router.mount(&counting).unwrap());
        f.bus.publish("ping", Payload::Empty).unwrap();

        assert_eq!(f.hits.load(Ordering::SeqCst), 1);
        assert_eq!(f.bus.subscriber_count("ping"), 1);
    }

    #[test]
    fn navigation_unmounts_before_mounting() {
        let f = fixture();
        let log = Arc::new(Mutex::new(Vec::new()));
        for topic in [NAVIGATION_CHANGE, FEATURE_UNMOUNTED, FEATURE_MOUNTED] {
            let log = Arc::clone(&log);
            f.bus
                .subscribe(topic, move |event| {
                    log.lock().unwrap().push(format!("{}", event.topic));
                    Ok(())
                })
                .unwrap();
        }

        f.router.navigate("counting").unwrap();
        assert!(f.doc.contains("counting-body"));
        assert!(f.modals.is_registered("counting-modal"));
        let generation = f.router.generation();

        assert!(f.router.navigate("overview").unwrap());

        assert!(!f.doc.contains("counting-body"));
        assert!(!f.modals.is_registered("counting-modal"));
        assert_eq!(f.bus.subscriber_count("ping"), 0);
        assert!(f.router.generation() > generation);
        assert_eq!(f.router.current_feature_id().as_deref(), Some("overview"));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "navigation:change",
                "feature:mounted",
                "navigation:change",
                "feature:unmounted",
                "feature:mounted",
            ]
        );
    }

    #[test]
    fn navigating_to_unavailable_feature_keeps_current() {
        let f = fixture_with("subscriber", vec![inert("coaching").permissions(["trainer"])]);
        f.router.navigate("overview").unwrap();

        assert!(matches!(
            f.router.navigate("nope"),
            Err(DashboardError::UnknownFeature { .. })
        ));
        assert!(f.router.navigate("coaching").is_err());
        assert_eq!(f.router.current_feature_id().as_deref(), Some("overview"));
        assert!(!f.router.navigate("overview").unwrap());
    }

    #[test]
    fn failed_mount_cleans_up_after_itself() {
        let f = fixture();
        f.router.navigate("overview").unwrap();

        let err = f.router.navigate("failing").unwrap_err();

        assert!(matches!(err, DashboardError::MountFailed { ref id, .. } if id == "failing"));
        assert_eq!(f.router.current_feature_id(), None);
        assert_eq!(f.bus.subscriber_count("ping"), 0);
        assert!(!f.router.is_navigating());
    }

    #[test]
    fn reentrant_navigation_is_rejected() {
        let f = fixture();
        let router = f.router.clone();
        let outcome = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&outcome);
        f.bus
            .subscribe(NAVIGATION_CHANGE, move |_| {
                *sink.lock().unwrap() = Some(router.navigate("overview").is_err());
                Ok(())
            })
            .unwrap();

        f.router.navigate("counting").unwrap();

        assert_eq!(*outcome.lock().unwrap(), Some(true));
        assert_eq!(f.router.current_feature_id().as_deref(), Some("counting"));
    }

    #[test]
    fn unmount_invalidates_guards() {
        let f = fixture();
        f.router.navigate("counting").unwrap();
        let guard = f.router.guard();
        assert!(guard.is_current());

        assert!(f.router.unmount());
        assert!(!guard.is_current());
        assert!(!f.router.unmount());
        assert!(f.doc.children(CONTENT).is_empty());
    }

    #[test]
    fn disposables_release_everything() {
        let doc = MemoryDocument::new();
        let bus = EventBus::new();
        let mut disposables = Disposables::default();
        disposables.track_subscription(bus.subscribe("a", |_| Ok(())).unwrap());
        disposables.track_listener(doc.add_listener(
            crate::dom::ListenerTarget::KeyDown,
            Arc::new(|_: &crate::dom::DomEvent| {}),
        ));

        assert_eq!(disposables.dispose(&doc), 2);
        assert!(disposables.is_empty());
        assert_eq!(bus.subscriber_count("a"), 0);
        assert_eq!(doc.listener_count(), 0);
    }
}
