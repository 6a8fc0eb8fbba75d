// ── Feature registry ──
//
// Built once per page load: `RegistryBuilder` collects descriptors in
// registration order, `build()` freezes them. Descriptors are immutable;
// accessibility is derived from the user every time it is asked for.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DashboardError;
use crate::feature::Feature;
use crate::router::query_for;

/// Role that passes every permission check.
pub const ADMIN_ROLE: &str = "administrator";

// ── User ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub id: u64,
    pub display_name: String,
    pub role: String,
}

impl UserContext {
    pub fn new(id: u64, display_name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

// ── Descriptor ──────────────────────────────────────────────────────

pub type EnablementPredicate = Arc<dyn Fn(&UserContext) -> bool + Send + Sync>;

/// Builds a fresh feature instance from the descriptor's props.
pub type FeatureFactory = Arc<dyn Fn(&Value) -> Box<dyn Feature> + Send + Sync>;

#[derive(Clone)]
pub enum Enablement {
    Static(bool),
    Predicate(EnablementPredicate),
}

impl Enablement {
    pub fn evaluate(&self, user: &UserContext) -> bool {
        match self {
            Self::Static(enabled) => *enabled,
            Self::Predicate(predicate) => predicate(user),
        }
    }
}

impl fmt::Debug for Enablement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(enabled) => f.debug_tuple("Static").field(enabled).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Immutable description of one dashboard feature.
#[derive(Clone)]
pub struct FeatureDescriptor {
    id: String,
    title: String,
    icon: Option<String>,
    route: String,
    enablement: Enablement,
    permissions: BTreeSet<String>,
    factory: FeatureFactory,
    props: Value,
}

impl FeatureDescriptor {
    pub fn new<F>(id: impl Into<String>, title: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> Box<dyn Feature> + Send + Sync + 'static,
    {
        let id = id.into();
        Self {
            route: query_for(&id),
            id,
            title: title.into(),
            icon: None,
            enablement: Enablement::Static(true),
            permissions: BTreeSet::new(),
            factory: Arc::new(factory),
            props: Value::Null,
        }
    }

    #[must_use]
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    #[must_use]
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enablement = Enablement::Static(enabled);
        self
    }

    #[must_use]
    pub fn enabled_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&UserContext) -> bool + Send + Sync + 'static,
    {
        self.enablement = Enablement::Predicate(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn permissions<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = roles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon_name(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn route_path(&self) -> &str {
        &self.route
    }

    pub fn permission_set(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn props_value(&self) -> &Value {
        &self.props
    }

    pub fn is_enabled(&self, user: &UserContext) -> bool {
        self.enablement.evaluate(user)
    }

    /// `enabled && (public || role listed || administrator)`.
    ///
    /// Administrators bypass the permission list on purpose: they are the
    /// site's superusers. They still cannot reach a disabled feature.
    pub fn is_accessible(&self, user: &UserContext) -> bool {
        self.is_enabled(user)
            && (self.permissions.is_empty()
                || self.permissions.contains(&user.role)
                || user.is_admin())
    }

    /// Instantiate the feature component with this descriptor's props.
    pub fn create(&self) -> Box<dyn Feature> {
        (self.factory)(&self.props)
    }
}

impl fmt::Debug for FeatureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDescriptor")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("icon", &self.icon)
            .field("route", &self.route)
            .field("enablement", &self.enablement)
            .field("permissions", &self.permissions)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// Collects descriptors before the registry is frozen.
#[derive(Debug)]
pub struct RegistryBuilder {
    user: UserContext,
    features: IndexMap<String, FeatureDescriptor>,
}

impl RegistryBuilder {
    pub fn new(user: UserContext) -> Self {
        Self {
            user,
            features: IndexMap::new(),
        }
    }

    /// Add a descriptor. A duplicate id is logged and ignored.
    pub fn register(&mut self, descriptor: FeatureDescriptor) -> bool {
        if self.features.contains_key(descriptor.id()) {
            warn!(feature = descriptor.id(), "duplicate feature registration ignored");
            return false;
        }
        debug!(feature = descriptor.id(), "feature registered");
        self.features.insert(descriptor.id.clone(), descriptor);
        true
    }

    #[must_use]
    pub fn with(mut self, descriptor: FeatureDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn build(self) -> FeatureRegistry {
        FeatureRegistry {
            user: self.user,
            features: self.features,
        }
    }
}

/// A descriptor annotated for one user.
#[derive(Debug, Clone, Copy)]
pub struct FeatureEntry<'a> {
    pub descriptor: &'a FeatureDescriptor,
    pub is_accessible: bool,
}

/// Frozen, ordered set of feature descriptors for the current user.
#[derive(Debug)]
pub struct FeatureRegistry {
    user: UserContext,
    features: IndexMap<String, FeatureDescriptor>,
}

impl FeatureRegistry {
    pub fn builder(user: UserContext) -> RegistryBuilder {
        RegistryBuilder::new(user)
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    /// Every descriptor in registration order.
    pub fn get_all(&self) -> Vec<FeatureEntry<'_>> {
        self.features
            .values()
            .map(|descriptor| FeatureEntry {
                descriptor,
                is_accessible: descriptor.is_accessible(&self.user),
            })
            .collect()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&FeatureDescriptor> {
        self.features.get(id)
    }

    /// Like [`get_by_id`](Self::get_by_id) but an error when missing or not
    /// accessible to the current user.
    pub fn require(&self, id: &str) -> Result<&FeatureDescriptor, DashboardError> {
        self.features
            .get(id)
            .filter(|descriptor| descriptor.is_accessible(&self.user))
            .ok_or_else(|| DashboardError::UnknownFeature { id: id.to_owned() })
    }

    pub fn is_accessible(&self, id: &str) -> bool {
        self.features
            .get(id)
            .is_some_and(|descriptor| descriptor.is_accessible(&self.user))
    }

    pub fn accessible(&self) -> impl Iterator<Item = &FeatureDescriptor> {
        self.features
            .values()
            .filter(|descriptor| descriptor.is_accessible(&self.user))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FeatureError;
    use crate::feature::MountContext;
    use pretty_assertions::assert_eq;

    pub(crate) struct Inert;

    impl Feature for Inert {
        fn mount(&mut self, _ctx: &mut MountContext) -> Result<(), FeatureError> {
            Ok(())
        }
    }

    pub(crate) fn inert(id: &str) -> FeatureDescriptor {
        FeatureDescriptor::new(id, id, |_| Box::new(Inert))
    }

    fn user(role: &str) -> UserContext {
        UserContext::new(7, "Sam", role)
    }

    #[test]
    fn keeps_registration_order_and_ignores_duplicates() {
        let mut builder = RegistryBuilder::new(user("subscriber"));
        assert!(builder.register(inert("overview")));
        assert!(builder.register(inert("profile")));
        assert!(!builder.register(inert("overview").icon("dup")));
        let registry = builder.build();

        let ids: Vec<_> = registry
            .get_all()
            .iter()
            .map(|entry| entry.descriptor.id().to_owned())
            .collect();
        assert_eq!(ids, vec!["overview", "profile"]);
        assert_eq!(registry.get_by_id("overview").unwrap().icon_name(), None);
    }

    #[test]
    fn administrator_bypasses_permissions() {
        let trainers_only = || inert("coaching").permissions(["trainer"]);

        let admin = RegistryBuilder::new(user(ADMIN_ROLE))
            .with(trainers_only())
            .build();
        let subscriber = RegistryBuilder::new(user("subscriber"))
            .with(trainers_only())
            .build();
        let trainer = RegistryBuilder::new(user("trainer"))
            .with(trainers_only())
            .build();

        assert!(admin.is_accessible("coaching"));
        assert!(!subscriber.is_accessible("coaching"));
        assert!(trainer.is_accessible("coaching"));
        assert!(!subscriber.get_all()[0].is_accessible);
    }

    #[test]
    fn disabled_features_stay_closed_to_everyone() {
        let registry = RegistryBuilder::new(user(ADMIN_ROLE))
            .with(inert("messaging").enabled(false))
            .with(inert("beta").enabled_when(|user| user.id == 7))
            .build();

        assert!(!registry.is_accessible("messaging"));
        assert!(registry.is_accessible("beta"));
        assert!(matches!(
            registry.require("messaging"),
            Err(DashboardError::UnknownFeature { .. })
        ));
        assert!(registry.require("beta").is_ok());
        assert_eq!(
            registry.accessible().map(FeatureDescriptor::id).collect::<Vec<_>>(),
            vec!["beta"]
        );
    }

    #[test]
    fn default_route_uses_the_query_parameter() {
        let descriptor = inert("workout-tracker");
        assert_eq!(
            descriptor.route_path(),
            "?dashboard_feature=workout-tracker"
        );
    }

    #[test]
    fn factory_receives_props() {
        let seen = Arc::new(std::sync::Mutex::new(Value::Null));
        let sink = Arc::clone(&seen);
        let descriptor = FeatureDescriptor::new("overview", "Overview", move |props| {
            *sink.lock().unwrap() = props.clone();
            Box::new(Inert)
        })
        .props(serde_json::json!({ "limit": 5 }));

        let _feature = descriptor.create();

        assert_eq!(*seen.lock().unwrap(), serde_json::json!({ "limit": 5 }));
    }
}
