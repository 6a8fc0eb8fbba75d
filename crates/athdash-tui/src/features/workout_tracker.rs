// Workout tracker: recent sessions plus a quick-log modal.
//
// The modal offers preset sessions; Save publishes
// `workout-tracker:save:request`, which this feature answers by posting the
// entry through the data boundary and closing the modal.

use std::sync::{Arc, Mutex, PoisonError};

use athdash_api::models::{Intensity, WorkoutEntry, WorkoutLog};
use athdash_core::dom::{DomEvent, HOTKEY_ATTR, ListenerTarget, TRIGGER_ATTR};
use athdash_core::modal::content_id;
use athdash_core::topic::feature_topic;
use athdash_core::{
    Element, Feature, FeatureAction, FeatureError, ModalButton, ModalSize, ModalSpec,
    MountContext, Tag,
};
use serde_json::Value;
use tracing::{debug, warn};

use super::{decode, error_message, render_items};

pub const COMPONENT: &str = "workout-tracker";
pub const WORKOUT_MODAL: &str = "workout-form-modal";

const SUMMARY: &str = "workout-summary";
const LIST: &str = "workout-list";
const TRIGGER: &str = "log-workout";
const STATUS: &str = "workout-status";
const DRAFT: &str = "workout-form-draft";
const PRESET_ATTR: &str = "data-preset";
const DEFAULT_PAGE_SIZE: usize = 5;

/// Quick-log sessions offered in the modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Preset {
    key: char,
    workout_type: &'static str,
    label: &'static str,
    minutes: u32,
    intensity: Intensity,
}

const PRESETS: [Preset; 3] = [
    Preset {
        key: 'r',
        workout_type: "run",
        label: "Run",
        minutes: 30,
        intensity: Intensity::Moderate,
    },
    Preset {
        key: 'b',
        workout_type: "cycling",
        label: "Ride",
        minutes: 45,
        intensity: Intensity::Moderate,
    },
    Preset {
        key: 'g',
        workout_type: "strength",
        label: "Strength",
        minutes: 40,
        intensity: Intensity::High,
    },
];

impl Preset {
    fn element_id(self) -> String {
        format!("workout-preset-{}", self.workout_type)
    }

    fn describe(self) -> String {
        format!("{} · {} min", self.label, self.minutes)
    }

    fn entry(self) -> WorkoutEntry {
        WorkoutEntry {
            id: None,
            date: chrono::Local::now().date_naive(),
            workout_type: self.workout_type.to_owned(),
            duration_minutes: self.minutes,
            intensity: self.intensity,
            exercises: Vec::new(),
            notes: None,
        }
    }
}

pub struct WorkoutTracker {
    page_size: usize,
    draft: Arc<Mutex<Option<Preset>>>,
}

impl WorkoutTracker {
    /// Props: `page_size`, how many recent sessions to list.
    pub fn new(props: &Value) -> Self {
        let page_size = props
            .get("page_size")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Self {
            page_size,
            draft: Arc::new(Mutex::new(None)),
        }
    }
}

fn summary(log: &WorkoutLog) -> String {
    let mut text = format!(
        "{} workouts logged · {} min",
        log.total.max(u32::try_from(log.workouts.len()).unwrap_or(u32::MAX)),
        log.total_minutes()
    );
    if let Some(latest) = log.latest() {
        text.push_str(&format!(" · latest {} on {}", latest.workout_type, latest.date));
    }
    text
}

impl Feature for WorkoutTracker {
    fn mount(&mut self, ctx: &mut MountContext) -> Result<(), FeatureError> {
        let doc = Arc::clone(ctx.document());
        let root = ctx.root().to_owned();

        doc.append_child(&root, Element::new("workout-heading", Tag::Heading).text("Workouts"));
        doc.append_child(&root, Element::new(SUMMARY, Tag::Paragraph).text("Loading…"));
        doc.append_child(&root, Element::new(LIST, Tag::List));
        doc.append_child(
            &root,
            Element::new(TRIGGER, Tag::Button)
                .text("Log workout")
                .attr(TRIGGER_ATTR, WORKOUT_MODAL)
                .attr(HOTKEY_ATTR, "l"),
        );
        doc.append_child(&root, Element::new(STATUS, Tag::Paragraph));

        // ── Modal ───────────────────────────────────────────────────
        let draft = Arc::clone(&self.draft);
        ctx.register_modal(
            ModalSpec::new(WORKOUT_MODAL, "Log Workout")
                .size(ModalSize::Small)
                .button(
                    ModalButton::publish("Save", feature_topic(COMPONENT, FeatureAction::SaveRequest))
                        .hotkey('s'),
                )
                .button(ModalButton::close("Cancel").hotkey('c'))
                .content(move |doc, into| {
                    let picked = *draft.lock().unwrap_or_else(PoisonError::into_inner);
                    let prompt =
                        picked.map_or_else(|| "Pick a session".to_owned(), Preset::describe);
                    doc.append_child(into, Element::new(DRAFT, Tag::Paragraph).text(prompt));
                    for preset in PRESETS {
                        doc.append_child(
                            into,
                            Element::new(preset.element_id(), Tag::Button)
                                .text(preset.describe())
                                .attr(PRESET_ATTR, preset.workout_type)
                                .attr(HOTKEY_ATTR, preset.key.to_string()),
                        );
                    }
                }),
        );

        let view = Arc::clone(&doc);
        let draft = Arc::clone(&self.draft);
        ctx.listen(
            ListenerTarget::Click {
                element: content_id(WORKOUT_MODAL),
            },
            Arc::new(move |event: &DomEvent| {
                let DomEvent::Click { target } = event else {
                    return;
                };
                let Some(kind) = view.attribute(target, PRESET_ATTR) else {
                    return;
                };
                let Some(preset) = PRESETS.into_iter().find(|p| p.workout_type == kind) else {
                    return;
                };
                *draft.lock().unwrap_or_else(PoisonError::into_inner) = Some(preset);
                view.set_text(DRAFT, &preset.describe());
            }),
        );

        // ── Save flow ───────────────────────────────────────────────
        let requester = ctx.requester();
        let modals = ctx.modals().clone();
        let view = Arc::clone(&doc);
        let draft = Arc::clone(&self.draft);
        ctx.on(FeatureAction::SaveRequest, move |_| {
            let picked = *draft.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(preset) = picked else {
                view.set_text(DRAFT, "Pick a session first");
                return Ok(());
            };
            let payload = serde_json::to_value(preset.entry())?;
            debug!(workout = preset.workout_type, "logging workout");
            requester.save(payload);
            view.set_text(STATUS, "Saving…");
            modals.close(Some(WORKOUT_MODAL));
            Ok(())
        })
        .map_err(|err| FeatureError::new(err.to_string()))?;

        let requester = ctx.requester();
        let view = Arc::clone(&doc);
        let draft = Arc::clone(&self.draft);
        ctx.on(FeatureAction::SaveSuccess, move |_| {
            *draft.lock().unwrap_or_else(PoisonError::into_inner) = None;
            view.set_text(STATUS, "Workout saved");
            requester.load();
            Ok(())
        })
        .map_err(|err| FeatureError::new(err.to_string()))?;

        // ── Load flow ───────────────────────────────────────────────
        let view = Arc::clone(&doc);
        let page_size = self.page_size;
        ctx.on(FeatureAction::LoadSuccess, move |event| {
            let Some(mut log) = decode::<WorkoutLog>(&event.payload) else {
                warn!("workout log payload did not decode");
                view.set_text(SUMMARY, "No workouts logged yet");
                return Ok(());
            };
            view.set_text(SUMMARY, &summary(&log));
            log.workouts.sort_by(|a, b| b.date.cmp(&a.date));
            render_items(
                view.as_ref(),
                LIST,
                log.workouts.iter().take(page_size).enumerate().map(|(i, w)| {
                    (
                        format!("workout-{i}"),
                        format!("{} · {} · {} min", w.date, w.workout_type, w.duration_minutes),
                    )
                }),
            );
            Ok(())
        })
        .map_err(|err| FeatureError::new(err.to_string()))?;

        for (action, prefix) in [
            (FeatureAction::LoadError, "Could not load workouts"),
            (FeatureAction::SaveError, "Could not save workout"),
        ] {
            let view = Arc::clone(&doc);
            ctx.on(action, move |event| {
                view.set_text(STATUS, &format!("{prefix}: {}", error_message(&event.payload)));
                Ok(())
            })
            .map_err(|err| FeatureError::new(err.to_string()))?;
        }

        ctx.request_load();
        Ok(())
    }

    fn unmount(&mut self) {
        *self.draft.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use athdash_core::{Document, Payload};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::features::tests::{offline_shell, text};

    #[test]
    fn quick_log_saves_and_closes_the_modal() {
        let (doc, mut shell) = offline_shell();
        shell.init(Some(COMPONENT)).unwrap();
        shell.pump_completions();

        doc.click(TRIGGER);
        doc.flush_frames();
        assert!(shell.modals().is_open(WORKOUT_MODAL));
        assert_eq!(text(&doc, DRAFT), "Pick a session");

        // Save without a pick keeps the modal open.
        doc.click("workout-form-modal-button-0");
        assert!(shell.modals().is_open(WORKOUT_MODAL));
        assert_eq!(text(&doc, DRAFT), "Pick a session first");

        doc.click("workout-preset-strength");
        assert_eq!(text(&doc, DRAFT), "Strength · 40 min");

        doc.click("workout-form-modal-button-0");
        assert!(!shell.modals().is_open(WORKOUT_MODAL));
        assert_eq!(text(&doc, STATUS), "Saving…");

        assert_eq!(shell.pump_completions(), 1);
        assert_eq!(
            text(&doc, STATUS),
            "Could not save workout: no data boundary configured"
        );
    }

    #[test]
    fn load_lists_recent_sessions_newest_first() {
        let (doc, mut shell) = offline_shell();
        shell.init(Some(COMPONENT)).unwrap();

        shell
            .bus()
            .publish(
                "workout-tracker:load:success",
                Payload::Data(json!({
                    "workouts": [
                        { "date": "2024-05-01", "type": "run", "duration_minutes": 30 },
                        { "date": "2024-05-03", "type": "swim", "duration_minutes": 50 }
                    ],
                    "total": 2
                })),
            )
            .unwrap();

        assert_eq!(
            text(&doc, SUMMARY),
            "2 workouts logged · 80 min · latest swim on 2024-05-03"
        );
        assert_eq!(doc.children(LIST), vec!["workout-0", "workout-1"]);
        assert_eq!(text(&doc, "workout-0"), "2024-05-03 · swim · 50 min");
    }

    #[test]
    fn page_size_prop_caps_the_list() {
        assert_eq!(WorkoutTracker::new(&json!({ "page_size": 2 })).page_size, 2);
        assert_eq!(WorkoutTracker::new(&Value::Null).page_size, DEFAULT_PAGE_SIZE);
    }
}
