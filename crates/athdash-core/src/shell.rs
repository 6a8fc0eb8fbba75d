//! Dashboard shell.
//!
//! Owns the page-lifetime collaborators (bus, modal manager, router, request
//! queue) and the fixed layout:
//!
//! ```text
//! body
//! ├── dashboard
//! │   ├── dashboard-header   brand, user, top nav
//! │   ├── dashboard-sidebar  feature nav
//! │   └── dashboard-content  router mount target
//! └── modal-host             modal roots, outside feature markup
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::boundary::{Completion, DataBoundary, RequestQueue};
use crate::bus::{EventBus, Subscription};
use crate::dom::{ACTIVE_CLASS, BODY, Document, DomEvent, Element, Listener, ListenerId, ListenerTarget, Tag};
use crate::error::DashboardError;
use crate::modal::ModalManager;
use crate::registry::FeatureRegistry;
use crate::router::{DEFAULT_FEATURE, FeatureRouter, query_for};
use crate::topic::{FEATURE_MOUNTED, Payload};

pub const LAYOUT_ID: &str = "dashboard";
pub const HEADER_ID: &str = "dashboard-header";
pub const BRAND_ID: &str = "dashboard-brand";
pub const USER_ID: &str = "dashboard-user";
pub const TOPNAV_ID: &str = "dashboard-topnav";
pub const SIDEBAR_ID: &str = "dashboard-sidebar";
pub const NAV_ID: &str = "dashboard-nav";
pub const CONTENT_ID: &str = "dashboard-content";
pub const MODAL_HOST_ID: &str = "modal-host";
pub const PLACEHOLDER_ID: &str = "dashboard-placeholder";
/// Attribute on any element inside the layout that navigates when clicked.
pub const FEATURE_ATTR: &str = "data-feature";

/// Sidebar nav element id for a feature.
pub fn nav_item_id(feature: &str) -> String {
    format!("nav-{feature}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOptions {
    pub brand: String,
    pub default_feature: String,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            brand: "Athlete Dashboard".to_owned(),
            default_feature: DEFAULT_FEATURE.to_owned(),
        }
    }
}

pub struct DashboardShell {
    document: Arc<dyn Document>,
    bus: EventBus,
    modals: ModalManager,
    registry: Arc<FeatureRegistry>,
    router: FeatureRouter,
    requests: RequestQueue,
    completions: mpsc::UnboundedReceiver<Completion>,
    options: ShellOptions,
    listeners: Vec<ListenerId>,
    subscriptions: Vec<Subscription>,
    initialized: bool,
}

impl fmt::Debug for DashboardShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardShell")
            .field("options", &self.options)
            .field("router", &self.router)
            .field("modals", &self.modals)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl DashboardShell {
    pub fn new(
        document: Arc<dyn Document>,
        registry: FeatureRegistry,
        boundary: Option<Arc<dyn DataBoundary>>,
        options: ShellOptions,
    ) -> Self {
        let bus = EventBus::new();
        let modals = ModalManager::new(bus.clone(), Arc::clone(&document), MODAL_HOST_ID);
        let registry = Arc::new(registry);
        let (requests, completions) = RequestQueue::new(boundary);
        let router = FeatureRouter::new(
            Arc::clone(&registry),
            bus.clone(),
            modals.clone(),
            Arc::clone(&document),
            CONTENT_ID,
            requests.clone(),
        )
        .with_default_feature(options.default_feature.clone());

        Self {
            document,
            bus,
            modals,
            registry,
            router,
            requests,
            completions,
            options,
            listeners: Vec::new(),
            subscriptions: Vec::new(),
            initialized: false,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn modals(&self) -> &ModalManager {
        &self.modals
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn router(&self) -> &FeatureRouter {
        &self.router
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    pub fn options(&self) -> &ShellOptions {
        &self.options
    }

    pub fn has_boundary(&self) -> bool {
        self.requests.has_boundary()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Build the layout, start the bus bridge and modal manager, then mount
    /// the feature named by `route_param` (or the fallback).
    pub fn init(&mut self, route_param: Option<&str>) -> Result<(), DashboardError> {
        if self.initialized {
            return Ok(());
        }
        self.render_layout()?;
        self.bus.attach_document(Arc::clone(&self.document));
        self.modals.init();
        self.wire_navigation();
        self.initialized = true;

        match self.router.resolve_current_feature(route_param) {
            Some(descriptor) => {
                if let Err(err) = self.router.mount(&descriptor) {
                    warn!(feature = descriptor.id(), error = %err, "initial mount failed");
                    recover(
                        &self.router,
                        self.document.as_ref(),
                        descriptor.id(),
                        &err.to_string(),
                    );
                }
            }
            None => render_placeholder(
                self.document.as_ref(),
                "No dashboard features are available for your account.",
            ),
        }
        info!(
            features = self.registry.len(),
            current = ?self.router.current_feature_id(),
            "dashboard shell initialized"
        );
        Ok(())
    }

    /// Unmount, dispose the modal manager and bus, and remove the layout.
    pub fn dispose(&mut self) {
        if !self.initialized {
            return;
        }
        self.router.unmount();
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        for listener in self.listeners.drain(..) {
            self.document.remove_listener(listener);
        }
        self.modals.dispose();
        self.bus.dispose();
        self.document.remove_element(MODAL_HOST_ID);
        self.document.remove_element(LAYOUT_ID);
        self.initialized = false;
        info!("dashboard shell disposed");
    }

    // ── Navigation ──────────────────────────────────────────────────

    pub fn current_feature_id(&self) -> Option<String> {
        self.router.current_feature_id()
    }

    /// Navigate to `id`. Failures are logged; the content region is never
    /// left blank.
    pub fn navigate(&self, id: &str) -> bool {
        navigate_or_placeholder(&self.router, self.document.as_ref(), id)
    }

    /// `?dashboard_feature=<id>` for the mounted feature.
    pub fn location_query(&self) -> Option<String> {
        self.current_feature_id().map(|id| query_for(&id))
    }

    // ── Data boundary ───────────────────────────────────────────────

    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.completions.recv().await
    }

    /// Hand the completion receiver to a host that multiplexes it with its
    /// own input. Afterwards `next_completion` and `pump_completions` see a
    /// closed channel; the host passes what it receives to `deliver`.
    pub fn take_completions(&mut self) -> mpsc::UnboundedReceiver<Completion> {
        let (_closed, replacement) = mpsc::unbounded_channel();
        std::mem::replace(&mut self.completions, replacement)
    }

    /// Deliver every completion that is already waiting. Returns how many
    /// were published.
    pub fn pump_completions(&mut self) -> usize {
        let mut published = 0;
        while let Ok(completion) = self.completions.try_recv() {
            if self.deliver(completion) {
                published += 1;
            }
        }
        published
    }

    /// Publish a completion as `<feature>:<kind>:success|error` unless the
    /// feature that requested it has been unmounted since.
    pub fn deliver(&self, completion: Completion) -> bool {
        if !completion.is_current() {
            debug!(
                feature = %completion.feature,
                kind = %completion.kind,
                "stale completion dropped"
            );
            return false;
        }
        let topic = completion.topic();
        match self.bus.publish(&topic, completion.payload()) {
            Ok(delivered) => {
                debug!(topic = %topic, delivered, "completion published");
                true
            }
            Err(err) => {
                warn!(topic = %topic, error = %err, "completion not published");
                false
            }
        }
    }

    // ── Layout ──────────────────────────────────────────────────────

    fn render_layout(&self) -> Result<(), DashboardError> {
        let doc = self.document.as_ref();
        if !doc.append_child(BODY, Element::new(LAYOUT_ID, Tag::Div).class("dashboard")) {
            return Err(DashboardError::MissingElement {
                id: BODY.to_owned(),
            });
        }

        let user = self.registry.user();
        doc.append_child(LAYOUT_ID, Element::new(HEADER_ID, Tag::Header));
        doc.append_child(
            HEADER_ID,
            Element::new(BRAND_ID, Tag::Heading).text(&self.options.brand),
        );
        doc.append_child(
            HEADER_ID,
            Element::new(USER_ID, Tag::Span).text(format!("{} ({})", user.display_name, user.role)),
        );
        doc.append_child(HEADER_ID, Element::new(TOPNAV_ID, Tag::Nav));
        doc.append_child(LAYOUT_ID, Element::new(SIDEBAR_ID, Tag::Aside));
        doc.append_child(SIDEBAR_ID, Element::new(NAV_ID, Tag::List));
        doc.append_child(LAYOUT_ID, Element::new(CONTENT_ID, Tag::Main));
        doc.append_child(BODY, Element::new(MODAL_HOST_ID, Tag::Div));

        for descriptor in self.registry.accessible() {
            let id = descriptor.id();
            let label = match descriptor.icon_name() {
                Some(icon) => format!("{icon} {}", descriptor.title()),
                None => descriptor.title().to_owned(),
            };
            doc.append_child(
                TOPNAV_ID,
                Element::new(format!("topnav-{id}"), Tag::Button)
                    .text(descriptor.title())
                    .attr(FEATURE_ATTR, id),
            );
            doc.append_child(
                NAV_ID,
                Element::new(nav_item_id(id), Tag::Button)
                    .class("nav-item")
                    .text(label)
                    .attr(FEATURE_ATTR, id)
                    .attr("href", descriptor.route_path()),
            );
        }
        Ok(())
    }

    fn wire_navigation(&mut self) {
        let router = self.router.clone();
        let document = Arc::clone(&self.document);
        let on_click: Listener = Arc::new(move |event: &DomEvent| {
            let DomEvent::Click { target } = event else {
                return;
            };
            if let Some(feature) = document.attribute(target, FEATURE_ATTR) {
                navigate_or_placeholder(&router, document.as_ref(), &feature);
            }
        });
        self.listeners.push(self.document.add_listener(
            ListenerTarget::Click {
                element: LAYOUT_ID.to_owned(),
            },
            on_click,
        ));

        let document = Arc::clone(&self.document);
        match self.bus.subscribe(FEATURE_MOUNTED, move |event| {
            if let Payload::Feature { id } = &event.payload {
                highlight(document.as_ref(), Some(id));
            }
            Ok(())
        }) {
            Ok(subscription) => self.subscriptions.push(subscription),
            Err(err) => warn!(error = %err, "nav highlighting disabled"),
        }
    }
}

fn navigate_or_placeholder(router: &FeatureRouter, document: &dyn Document, id: &str) -> bool {
    match router.navigate(id) {
        Ok(changed) => changed,
        Err(err) => {
            warn!(feature = id, error = %err, "navigation failed");
            if router.current_feature_id().is_none() {
                recover(router, document, id, &err.to_string());
            }
            false
        }
    }
}

/// Nothing is mounted after `failed` would not mount. Mount the fallback
/// feature, or show `message` with no nav entry active.
fn recover(router: &FeatureRouter, document: &dyn Document, failed: &str, message: &str) {
    let fallback = router
        .resolve_current_feature(None)
        .filter(|descriptor| descriptor.id() != failed);
    if let Some(fallback) = fallback {
        match router.mount(&fallback) {
            Ok(_) => {
                info!(failed, fallback = fallback.id(), "mounted fallback feature");
                return;
            }
            Err(err) => warn!(feature = fallback.id(), error = %err, "fallback mount failed"),
        }
    }
    highlight(document, None);
    render_placeholder(document, message);
}

/// Mark nav entries for `feature` active and every other one inactive.
fn highlight(document: &dyn Document, feature: Option<&str>) {
    for (element, target) in document.query_attribute(FEATURE_ATTR, Some(HEADER_ID))
        .into_iter()
        .chain(document.query_attribute(FEATURE_ATTR, Some(SIDEBAR_ID)))
    {
        if feature == Some(target.as_str()) {
            document.add_class(&element, ACTIVE_CLASS);
            document.set_attribute(&element, "aria-current", "page");
        } else {
            document.remove_class(&element, ACTIVE_CLASS);
            document.set_attribute(&element, "aria-current", "false");
        }
    }
}

fn render_placeholder(document: &dyn Document, message: &str) {
    document.clear_children(CONTENT_ID);
    document.append_child(
        CONTENT_ID,
        Element::new(PLACEHOLDER_ID, Tag::Paragraph)
            .class("dashboard-placeholder")
            .text(message),
    );
}
