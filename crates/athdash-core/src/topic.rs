//! Topics, payloads, and the central topic → payload table.
//!
//! Topics stay free-form strings (`domain:action`, `domain:feature:action`),
//! but every well-known topic has exactly one payload shape, recorded in
//! [`expected_kind`]. Publishers and subscribers both go through that table
//! instead of agreeing on ad-hoc JSON objects.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use strum::{Display, IntoStaticStr};

use crate::error::DashboardError;

// ── Well-known topics ───────────────────────────────────────────────

pub const MODAL_OPEN: &str = "modal:open";
pub const MODAL_CLOSE: &str = "modal:close";
pub const MODAL_BEFORE_OPEN: &str = "modal:before_open";
pub const MODAL_AFTER_OPEN: &str = "modal:after_open";
pub const MODAL_BEFORE_CLOSE: &str = "modal:before_close";
pub const MODAL_AFTER_CLOSE: &str = "modal:after_close";
pub const NAVIGATION_CHANGE: &str = "navigation:change";
pub const FEATURE_MOUNTED: &str = "feature:mounted";
pub const FEATURE_UNMOUNTED: &str = "feature:unmounted";

const EXACT_TOPICS: &[(&str, PayloadKind)] = &[
    (MODAL_OPEN, PayloadKind::Modal),
    (MODAL_CLOSE, PayloadKind::ModalClose),
    (MODAL_BEFORE_OPEN, PayloadKind::Modal),
    (MODAL_AFTER_OPEN, PayloadKind::Modal),
    (MODAL_BEFORE_CLOSE, PayloadKind::Modal),
    (MODAL_AFTER_CLOSE, PayloadKind::Modal),
    (NAVIGATION_CHANGE, PayloadKind::Navigation),
    (FEATURE_MOUNTED, PayloadKind::Feature),
    (FEATURE_UNMOUNTED, PayloadKind::Feature),
];

/// Per-feature topics, published as `<feature><suffix>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum FeatureAction {
    #[strum(serialize = ":load:success")]
    LoadSuccess,
    #[strum(serialize = ":load:error")]
    LoadError,
    #[strum(serialize = ":save:request")]
    SaveRequest,
    #[strum(serialize = ":save:success")]
    SaveSuccess,
    #[strum(serialize = ":save:error")]
    SaveError,
}

impl FeatureAction {
    pub const ALL: [FeatureAction; 5] = [
        Self::LoadSuccess,
        Self::LoadError,
        Self::SaveRequest,
        Self::SaveSuccess,
        Self::SaveError,
    ];

    pub fn suffix(self) -> &'static str {
        self.into()
    }

    fn payload_kind(self) -> PayloadKind {
        match self {
            Self::LoadSuccess | Self::SaveSuccess => PayloadKind::Data,
            Self::LoadError | Self::SaveError => PayloadKind::Error,
            Self::SaveRequest => PayloadKind::Modal,
        }
    }
}

/// Build the topic string for a per-feature action, e.g. `profile:save:success`.
pub fn feature_topic(feature: &str, action: FeatureAction) -> String {
    format!("{feature}{}", action.suffix())
}

/// Look up the payload shape a topic is documented to carry.
pub fn expected_kind(topic: &str) -> Option<PayloadKind> {
    if let Some((_, kind)) = EXACT_TOPICS.iter().find(|(name, _)| *name == topic) {
        return Some(*kind);
    }
    FeatureAction::ALL
        .iter()
        .find(|action| {
            topic
                .strip_suffix(action.suffix())
                .is_some_and(|feature| !feature.is_empty())
        })
        .map(|action| action.payload_kind())
}

// ── Topic ───────────────────────────────────────────────────────────

/// A validated, non-empty topic name. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(Arc<str>);

impl Topic {
    pub fn new(name: impl AsRef<str>) -> Result<Self, DashboardError> {
        let name = name.as_ref();
        if name.trim().is_empty() {
            return Err(DashboardError::EmptyTopic);
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Payload ─────────────────────────────────────────────────────────

/// Discriminant of [`Payload`], used by the topic table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PayloadKind {
    Empty,
    Modal,
    ModalClose,
    Navigation,
    Feature,
    Data,
    Error,
    Json,
}

/// Everything that can travel over the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    /// A modal lifecycle event or request naming one modal.
    Modal { id: String },
    /// Close request; `None` closes whichever modal is active.
    ModalClose { id: Option<String> },
    Navigation { from: Option<String>, to: String },
    Feature { id: String },
    /// Successful data-boundary response body.
    Data(Value),
    Error { message: String },
    /// Untyped payload from an inbound DOM event on an unlisted topic.
    Json(Value),
}

#[derive(Deserialize)]
struct IdBody {
    id: String,
}

#[derive(Deserialize)]
struct OptionalIdBody {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct NavigationBody {
    #[serde(default)]
    from: Option<String>,
    to: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl Payload {
    pub fn modal(id: impl Into<String>) -> Self {
        Self::Modal { id: id.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Empty => PayloadKind::Empty,
            Self::Modal { .. } => PayloadKind::Modal,
            Self::ModalClose { .. } => PayloadKind::ModalClose,
            Self::Navigation { .. } => PayloadKind::Navigation,
            Self::Feature { .. } => PayloadKind::Feature,
            Self::Data(_) => PayloadKind::Data,
            Self::Error { .. } => PayloadKind::Error,
            Self::Json(_) => PayloadKind::Json,
        }
    }

    /// The modal id carried by `Modal` / `ModalClose` payloads.
    pub fn modal_id(&self) -> Option<&str> {
        match self {
            Self::Modal { id } => Some(id),
            Self::ModalClose { id } => id.as_deref(),
            _ => None,
        }
    }

    /// JSON form used as `detail.data` on bridged DOM events.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Modal { id } | Self::Feature { id } => json!({ "id": id }),
            Self::ModalClose { id } => json!({ "id": id }),
            Self::Navigation { from, to } => json!({ "from": from, "to": to }),
            Self::Data(value) | Self::Json(value) => value.clone(),
            Self::Error { message } => json!({ "message": message }),
        }
    }

    /// Rebuild a payload from bridged JSON, shaped by the topic table.
    ///
    /// Anything that does not fit the documented shape is kept as `Json`.
    pub fn from_json(topic: &str, value: Value) -> Self {
        let Some(kind) = expected_kind(topic) else {
            return if value.is_null() {
                Self::Empty
            } else {
                Self::Json(value)
            };
        };

        let typed = match kind {
            PayloadKind::Modal => serde_json::from_value::<IdBody>(value.clone())
                .ok()
                .map(|b| Self::Modal { id: b.id }),
            PayloadKind::ModalClose if value.is_null() => Some(Self::ModalClose { id: None }),
            PayloadKind::ModalClose => serde_json::from_value::<OptionalIdBody>(value.clone())
                .ok()
                .map(|b| Self::ModalClose { id: b.id }),
            PayloadKind::Navigation => serde_json::from_value::<NavigationBody>(value.clone())
                .ok()
                .map(|b| Self::Navigation {
                    from: b.from,
                    to: b.to,
                }),
            PayloadKind::Feature => serde_json::from_value::<IdBody>(value.clone())
                .ok()
                .map(|b| Self::Feature { id: b.id }),
            PayloadKind::Error => serde_json::from_value::<ErrorBody>(value.clone())
                .ok()
                .map(|b| Self::Error { message: b.message }),
            PayloadKind::Data => Some(Self::Data(value.clone())),
            PayloadKind::Empty | PayloadKind::Json => None,
        };

        typed.unwrap_or(Self::Json(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_topic_is_rejected() {
        assert!(matches!(Topic::new(""), Err(DashboardError::EmptyTopic)));
        assert!(matches!(Topic::new("   "), Err(DashboardError::EmptyTopic)));
        assert_eq!(Topic::new("modal:open").unwrap().as_str(), "modal:open");
    }

    #[test]
    fn table_covers_exact_and_feature_topics() {
        assert_eq!(expected_kind(MODAL_OPEN), Some(PayloadKind::Modal));
        assert_eq!(expected_kind(MODAL_CLOSE), Some(PayloadKind::ModalClose));
        assert_eq!(expected_kind("profile:save:success"), Some(PayloadKind::Data));
        assert_eq!(
            expected_kind("workout-tracker:load:error"),
            Some(PayloadKind::Error)
        );
        assert_eq!(expected_kind(":save:success"), None);
        assert_eq!(expected_kind("custom:thing"), None);
    }

    #[test]
    fn feature_topic_formats_suffix() {
        assert_eq!(
            feature_topic("profile", FeatureAction::SaveError),
            "profile:save:error"
        );
    }

    #[test]
    fn bridged_json_is_shaped_by_topic() {
        assert_eq!(
            Payload::from_json(MODAL_OPEN, json!({ "id": "workout-form-modal" })),
            Payload::modal("workout-form-modal")
        );
        assert_eq!(
            Payload::from_json(MODAL_CLOSE, Value::Null),
            Payload::ModalClose { id: None }
        );
        assert_eq!(
            Payload::from_json("profile:save:error", json!({ "message": "nope" })),
            Payload::error("nope")
        );
        // Wrong shape for a known topic stays untyped.
        assert_eq!(
            Payload::from_json(MODAL_OPEN, json!({ "modal": 3 })),
            Payload::Json(json!({ "modal": 3 }))
        );
        assert_eq!(Payload::from_json("custom:ping", Value::Null), Payload::Empty);
    }

    #[test]
    fn to_json_matches_documented_shapes() {
        assert_eq!(Payload::modal("m").to_json(), json!({ "id": "m" }));
        assert_eq!(
            Payload::Navigation {
                from: None,
                to: "profile".into()
            }
            .to_json(),
            json!({ "from": null, "to": "profile" })
        );
        assert_eq!(Payload::Empty.to_json(), Value::Null);
    }
}
