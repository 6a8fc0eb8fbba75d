//! Dashboard features mounted by the terminal host.
//!
//! Each feature renders into the content region through the document seam,
//! talks to the data boundary through its `MountContext`, and owns whatever
//! modals it registers. None of them reference each other.

pub mod overview;
pub mod profile;
pub mod training_persona;
pub mod workout_tracker;

use std::sync::Arc;

use athdash_core::registry::FeatureFactory;
use athdash_core::{Document, Element, Feature, Payload, Tag};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Component names accepted in the `component` field of `[[features]]`.
pub const COMPONENTS: [&str; 4] = [
    overview::COMPONENT,
    profile::COMPONENT,
    workout_tracker::COMPONENT,
    training_persona::COMPONENT,
];

/// Look up the factory for a component name.
pub fn component(name: &str) -> Option<FeatureFactory> {
    let factory: FeatureFactory = match name {
        overview::COMPONENT => Arc::new(|props: &Value| -> Box<dyn Feature> {
            Box::new(overview::Overview::new(props))
        }),
        profile::COMPONENT => Arc::new(|_: &Value| -> Box<dyn Feature> {
            Box::new(profile::Profile::default())
        }),
        workout_tracker::COMPONENT => Arc::new(|props: &Value| -> Box<dyn Feature> {
            Box::new(workout_tracker::WorkoutTracker::new(props))
        }),
        training_persona::COMPONENT => Arc::new(|_: &Value| -> Box<dyn Feature> {
            Box::new(training_persona::TrainingPersonaFeature::default())
        }),
        _ => return None,
    };
    Some(factory)
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Decode a `Payload::Data` body; anything else or a shape mismatch is `None`.
fn decode<T: DeserializeOwned>(payload: &Payload) -> Option<T> {
    match payload {
        Payload::Data(data) => serde_json::from_value(data.clone()).ok(),
        _ => None,
    }
}

fn error_message(payload: &Payload) -> String {
    match payload {
        Payload::Error { message } => message.clone(),
        other => format!("unexpected {} payload", other.kind()),
    }
}

/// Replace the items of a list element.
fn render_items(document: &dyn Document, list: &str, items: impl IntoIterator<Item = (String, String)>) {
    document.clear_children(list);
    for (id, text) in items {
        document.append_child(list, Element::new(id, Tag::Item).text(text));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Arc;

    use athdash_core::{
        DashboardShell, FeatureDescriptor, MemoryDocument, RegistryBuilder, ShellOptions,
        UserContext,
    };

    use super::*;

    /// A shell with all four features and no data boundary.
    pub(crate) fn offline_shell() -> (Arc<MemoryDocument>, DashboardShell) {
        let mut builder = RegistryBuilder::new(UserContext::new(5, "Sam", "subscriber"));
        for (id, title) in [
            ("overview", "Overview"),
            ("profile", "Profile"),
            ("workout-tracker", "Workout Tracker"),
            ("training-persona", "Training Persona"),
        ] {
            let factory = component(id).unwrap();
            builder.register(FeatureDescriptor::new(id, title, move |props| factory(props)));
        }
        let doc = Arc::new(MemoryDocument::new());
        let shell = DashboardShell::new(
            doc.clone(),
            builder.build(),
            None,
            ShellOptions::default(),
        );
        (doc, shell)
    }

    pub(crate) fn text(doc: &MemoryDocument, id: &str) -> String {
        doc.element(id).and_then(|e| e.text).unwrap_or_default()
    }

    #[test]
    fn every_component_has_a_factory() {
        for name in COMPONENTS {
            assert!(component(name).is_some(), "{name}");
        }
        assert!(component("leaderboard").is_none());
    }

    #[test]
    fn offline_load_errors_reach_each_feature() {
        let (doc, mut shell) = offline_shell();
        shell.init(None).unwrap();
        shell.pump_completions();
        assert!(text(&doc, "overview-week").contains("no data boundary configured"));

        for id in ["profile", "workout-tracker", "training-persona"] {
            assert!(shell.navigate(id));
            assert_eq!(shell.pump_completions(), 1, "{id}");
        }
        assert!(text(&doc, "persona-status").contains("no data boundary configured"));
    }
}
