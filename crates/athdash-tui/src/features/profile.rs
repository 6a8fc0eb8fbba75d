// Profile: member details, body composition, unit preference.

use std::sync::{Arc, Mutex, PoisonError};

use athdash_api::models::{ProfileData, UnitSystem};
use athdash_core::dom::{DomEvent, HOTKEY_ATTR, ListenerTarget};
use athdash_core::{Document, Element, Feature, FeatureAction, FeatureError, MountContext, Tag};
use tracing::warn;

use super::{decode, error_message};

pub const COMPONENT: &str = "profile";

const NAME: &str = "profile-name";
const EMAIL: &str = "profile-email";
const BODY_STATS: &str = "profile-body";
const UNITS: &str = "profile-units";
const TOGGLE_UNITS: &str = "profile-toggle-units";
const STATUS: &str = "profile-status";

#[derive(Default)]
pub struct Profile {
    current: Arc<Mutex<Option<ProfileData>>>,
}

fn show(document: &dyn Document, profile: &ProfileData) {
    let name = profile.display_name();
    document.set_text(NAME, if name.is_empty() { "(no name set)" } else { &name });
    document.set_text(EMAIL, &profile.email);

    let measure = |value: Option<f64>, unit: &str| {
        value.map_or_else(|| "-".to_owned(), |v| format!("{v:.1} {unit}"))
    };
    document.set_text(
        BODY_STATS,
        &format!(
            "Height {} · Weight {} · Body fat {}",
            measure(profile.height_cm, "cm"),
            measure(profile.weight_kg, "kg"),
            measure(profile.body_fat_pct, "%"),
        ),
    );
    let units = match profile.units {
        UnitSystem::Metric => "metric",
        UnitSystem::Imperial => "imperial",
    };
    document.set_text(UNITS, &format!("Preferred units: {units}"));
}

impl Feature for Profile {
    fn mount(&mut self, ctx: &mut MountContext) -> Result<(), FeatureError> {
        let doc = Arc::clone(ctx.document());
        let root = ctx.root().to_owned();

        doc.append_child(&root, Element::new("profile-heading", Tag::Heading).text("Profile"));
        doc.append_child(&root, Element::new(NAME, Tag::Paragraph).text("Loading…"));
        doc.append_child(&root, Element::new(EMAIL, Tag::Paragraph));
        doc.append_child(&root, Element::new(BODY_STATS, Tag::Paragraph));
        doc.append_child(&root, Element::new(UNITS, Tag::Paragraph));
        doc.append_child(
            &root,
            Element::new(TOGGLE_UNITS, Tag::Button)
                .text("Switch units")
                .attr(HOTKEY_ATTR, "u"),
        );
        doc.append_child(&root, Element::new(STATUS, Tag::Paragraph));

        // Load and save both answer with the stored profile.
        for action in [FeatureAction::LoadSuccess, FeatureAction::SaveSuccess] {
            let view = Arc::clone(&doc);
            let current = Arc::clone(&self.current);
            ctx.on(action, move |event| {
                let profile: ProfileData = decode(&event.payload).unwrap_or_default();
                show(view.as_ref(), &profile);
                if action == FeatureAction::SaveSuccess {
                    view.set_text(STATUS, "Profile saved");
                }
                *current.lock().unwrap_or_else(PoisonError::into_inner) = Some(profile);
                Ok(())
            })
            .map_err(|err| FeatureError::new(err.to_string()))?;
        }

        for (action, prefix) in [
            (FeatureAction::LoadError, "Could not load profile"),
            (FeatureAction::SaveError, "Could not save profile"),
        ] {
            let view = Arc::clone(&doc);
            ctx.on(action, move |event| {
                view.set_text(STATUS, &format!("{prefix}: {}", error_message(&event.payload)));
                Ok(())
            })
            .map_err(|err| FeatureError::new(err.to_string()))?;
        }

        let requester = ctx.requester();
        let view = Arc::clone(&doc);
        let current = Arc::clone(&self.current);
        ctx.listen(
            ListenerTarget::Click {
                element: TOGGLE_UNITS.to_owned(),
            },
            Arc::new(move |_: &DomEvent| {
                let updated = {
                    let mut current = current.lock().unwrap_or_else(PoisonError::into_inner);
                    let Some(profile) = current.as_mut() else {
                        view.set_text(STATUS, "Profile not loaded yet");
                        return;
                    };
                    profile.units = match profile.units {
                        UnitSystem::Metric => UnitSystem::Imperial,
                        UnitSystem::Imperial => UnitSystem::Metric,
                    };
                    profile.clone()
                };
                show(view.as_ref(), &updated);
                match serde_json::to_value(&updated) {
                    Ok(payload) => {
                        view.set_text(STATUS, "Saving…");
                        requester.save(payload);
                    }
                    Err(err) => warn!(error = %err, "profile could not be encoded"),
                }
            }),
        );

        ctx.request_load();
        Ok(())
    }

    fn unmount(&mut self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
