// Training persona: experience level and goals, with a goal-progress modal.

use std::sync::{Arc, Mutex, PoisonError};

use athdash_api::models::{ExperienceLevel, GoalStatus, TrainingGoal, TrainingPersona};
use athdash_core::dom::{DomEvent, HOTKEY_ATTR, ListenerTarget, TRIGGER_ATTR};
use athdash_core::modal::content_id;
use athdash_core::topic::feature_topic;
use athdash_core::{
    Document, Element, Feature, FeatureAction, FeatureError, ModalButton, ModalSpec, MountContext,
    Tag,
};
use tracing::warn;

use super::{decode, error_message, render_items};

pub const COMPONENT: &str = "training-persona";
pub const GOALS_MODAL: &str = "persona-goals-modal";

const LEVEL: &str = "persona-level";
const GOAL_LIST: &str = "persona-goals";
const TRIGGER: &str = "edit-goals";
const STATUS: &str = "persona-status";
const GOAL_ATTR: &str = "data-goal";
/// Progress added per click in the modal.
const PROGRESS_STEP: u8 = 10;

#[derive(Default)]
pub struct TrainingPersonaFeature {
    persona: Arc<Mutex<Option<TrainingPersona>>>,
}

fn level_label(level: ExperienceLevel) -> &'static str {
    match level {
        ExperienceLevel::Beginner => "Beginner",
        ExperienceLevel::Intermediate => "Intermediate",
        ExperienceLevel::Advanced => "Advanced",
    }
}

fn goal_label(goal: &TrainingGoal) -> String {
    let status = match goal.status {
        GoalStatus::Active => "",
        GoalStatus::Completed => " ✓",
        GoalStatus::Abandoned => " (abandoned)",
    };
    format!("{} · {}%{status}", goal.title, goal.progress)
}

fn goal_button_id(index: usize) -> String {
    format!("persona-goal-{index}")
}

fn show(document: &dyn Document, persona: &TrainingPersona) {
    document.set_text(LEVEL, &format!("Level: {}", level_label(persona.level)));
    render_items(
        document,
        GOAL_LIST,
        persona
            .goals
            .iter()
            .enumerate()
            .map(|(i, goal)| (format!("persona-goal-item-{i}"), goal_label(goal))),
    );
}

/// Advance one goal; reaching 100% completes it.
fn advance(goal: &mut TrainingGoal) {
    goal.progress = goal.progress.saturating_add(PROGRESS_STEP).min(100);
    if goal.progress == 100 {
        goal.status = GoalStatus::Completed;
    }
}

impl Feature for TrainingPersonaFeature {
    fn mount(&mut self, ctx: &mut MountContext) -> Result<(), FeatureError> {
        let doc = Arc::clone(ctx.document());
        let root = ctx.root().to_owned();

        doc.append_child(
            &root,
            Element::new("persona-heading", Tag::Heading).text("Training Persona"),
        );
        doc.append_child(&root, Element::new(LEVEL, Tag::Paragraph).text("Loading…"));
        doc.append_child(&root, Element::new(GOAL_LIST, Tag::List));
        doc.append_child(
            &root,
            Element::new(TRIGGER, Tag::Button)
                .text("Update goals")
                .attr(TRIGGER_ATTR, GOALS_MODAL)
                .attr(HOTKEY_ATTR, "g"),
        );
        doc.append_child(&root, Element::new(STATUS, Tag::Paragraph));

        let persona = Arc::clone(&self.persona);
        ctx.register_modal(
            ModalSpec::new(GOALS_MODAL, "Update Goals")
                .button(
                    ModalButton::publish("Save", feature_topic(COMPONENT, FeatureAction::SaveRequest))
                        .hotkey('s'),
                )
                .button(ModalButton::close("Cancel").hotkey('c'))
                .content(move |doc, into| {
                    let persona = persona.lock().unwrap_or_else(PoisonError::into_inner);
                    let active: Vec<_> = persona
                        .iter()
                        .flat_map(|p| p.goals.iter().enumerate())
                        .filter(|(_, goal)| goal.status == GoalStatus::Active)
                        .collect();
                    if active.is_empty() {
                        doc.append_child(
                            into,
                            Element::new("persona-goals-empty", Tag::Paragraph)
                                .text("No active goals"),
                        );
                        return;
                    }
                    for (n, (index, goal)) in active.into_iter().enumerate().take(9) {
                        let mut button = Element::new(goal_button_id(index), Tag::Button)
                            .text(goal_label(goal))
                            .attr(GOAL_ATTR, index.to_string());
                        if let Some(key) = char::from_digit(u32::try_from(n + 1).unwrap_or(0), 10) {
                            button = button.attr(HOTKEY_ATTR, key.to_string());
                        }
                        doc.append_child(into, button);
                    }
                }),
        );

        let view = Arc::clone(&doc);
        let persona = Arc::clone(&self.persona);
        ctx.listen(
            ListenerTarget::Click {
                element: content_id(GOALS_MODAL),
            },
            Arc::new(move |event: &DomEvent| {
                let DomEvent::Click { target } = event else {
                    return;
                };
                let Some(index) = view
                    .attribute(target, GOAL_ATTR)
                    .and_then(|value| value.parse::<usize>().ok())
                else {
                    return;
                };
                let mut persona = persona.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(goal) = persona.as_mut().and_then(|p| p.goals.get_mut(index)) {
                    advance(goal);
                    view.set_text(target, &goal_label(goal));
                }
            }),
        );

        let requester = ctx.requester();
        let modals = ctx.modals().clone();
        let view = Arc::clone(&doc);
        let persona = Arc::clone(&self.persona);
        ctx.on(FeatureAction::SaveRequest, move |_| {
            let snapshot = persona
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            let Some(snapshot) = snapshot else {
                warn!("goal save requested before the persona loaded");
                return Ok(());
            };
            requester.save(serde_json::to_value(&snapshot)?);
            show(view.as_ref(), &snapshot);
            view.set_text(STATUS, "Saving goals…");
            modals.close(Some(GOALS_MODAL));
            Ok(())
        })
        .map_err(|err| FeatureError::new(err.to_string()))?;

        for action in [FeatureAction::LoadSuccess, FeatureAction::SaveSuccess] {
            let view = Arc::clone(&doc);
            let persona = Arc::clone(&self.persona);
            ctx.on(action, move |event| {
                let loaded: TrainingPersona = decode(&event.payload).unwrap_or_default();
                show(view.as_ref(), &loaded);
                if action == FeatureAction::SaveSuccess {
                    view.set_text(STATUS, "Goals saved");
                }
                *persona.lock().unwrap_or_else(PoisonError::into_inner) = Some(loaded);
                Ok(())
            })
            .map_err(|err| FeatureError::new(err.to_string()))?;
        }

        for (action, prefix) in [
            (FeatureAction::LoadError, "Could not load training persona"),
            (FeatureAction::SaveError, "Could not save goals"),
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
        *self.persona.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
