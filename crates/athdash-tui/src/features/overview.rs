// Overview: weekly summary, streak and goal count at a glance.

use std::sync::Arc;

use athdash_api::models::OverviewData;
use athdash_core::dom::{DomEvent, HOTKEY_ATTR, ListenerTarget};
use athdash_core::{Element, Feature, FeatureAction, FeatureError, MountContext, Tag};
use serde_json::Value;

use super::{decode, error_message};

pub const COMPONENT: &str = "overview";

const HEADING: &str = "overview-heading";
const WEEK: &str = "overview-week";
const STREAK: &str = "overview-streak";
const GOALS: &str = "overview-goals";
const REFRESH: &str = "overview-refresh";

pub struct Overview {
    greeting: String,
}

impl Overview {
    /// Props: `greeting` (default "Welcome back").
    pub fn new(props: &Value) -> Self {
        Self {
            greeting: props
                .get("greeting")
                .and_then(Value::as_str)
                .unwrap_or("Welcome back")
                .to_owned(),
        }
    }
}

fn summary_lines(data: &OverviewData) -> [(&'static str, String); 3] {
    let last = data
        .last_workout
        .map_or_else(|| "no workouts yet".to_owned(), |date| format!("last on {date}"));
    [
        (
            WEEK,
            format!(
                "{} workouts this week · {} total, {last}",
                data.workouts_this_week, data.total_workouts
            ),
        ),
        (STREAK, format!("Current streak: {} days", data.current_streak_days)),
        (GOALS, format!("Active goals: {}", data.active_goals)),
    ]
}

impl Feature for Overview {
    fn mount(&mut self, ctx: &mut MountContext) -> Result<(), FeatureError> {
        let doc = Arc::clone(ctx.document());
        let root = ctx.root().to_owned();
        let name = ctx.user().display_name.clone();

        doc.append_child(
            &root,
            Element::new(HEADING, Tag::Heading).text(format!("{}, {name}", self.greeting)),
        );
        doc.append_child(&root, Element::new(WEEK, Tag::Paragraph).text("Loading…"));
        doc.append_child(&root, Element::new(STREAK, Tag::Paragraph));
        doc.append_child(&root, Element::new(GOALS, Tag::Paragraph));
        doc.append_child(
            &root,
            Element::new(REFRESH, Tag::Button)
                .text("Refresh")
                .attr(HOTKEY_ATTR, "r"),
        );

        let view = Arc::clone(&doc);
        ctx.on(FeatureAction::LoadSuccess, move |event| {
            let data: OverviewData = decode(&event.payload).unwrap_or_default();
            for (id, text) in summary_lines(&data) {
                view.set_text(id, &text);
            }
            Ok(())
        })
        .map_err(|err| FeatureError::new(err.to_string()))?;

        let view = Arc::clone(&doc);
        ctx.on(FeatureAction::LoadError, move |event| {
            view.set_text(
                WEEK,
                &format!("Could not load your summary: {}", error_message(&event.payload)),
            );
            Ok(())
        })
        .map_err(|err| FeatureError::new(err.to_string()))?;

        let requester = ctx.requester();
        let view = Arc::clone(&doc);
        ctx.listen(
            ListenerTarget::Click {
                element: REFRESH.to_owned(),
            },
            Arc::new(move |_: &DomEvent| {
                view.set_text(WEEK, "Loading…");
                requester.load();
            }),
        );

        ctx.request_load();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use athdash_core::Payload;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::features::tests::{offline_shell, text};

    #[test]
    fn renders_summary_from_load_success() {
        let (doc, mut shell) = offline_shell();
        shell.init(None).unwrap();
        assert_eq!(text(&doc, HEADING), "Welcome back, Sam");

        shell
            .bus()
            .publish(
                "overview:load:success",
                Payload::Data(json!({
                    "workouts_this_week": 4,
                    "total_workouts": 120,
                    "current_streak_days": 9,
                    "last_workout": "2024-06-01",
                    "active_goals": 2
                })),
            )
            .unwrap();

        assert_eq!(
            text(&doc, WEEK),
            "4 workouts this week · 120 total, last on 2024-06-01"
        );
        assert_eq!(text(&doc, STREAK), "Current streak: 9 days");
        assert_eq!(text(&doc, GOALS), "Active goals: 2");
    }

    #[test]
    fn refresh_requests_a_new_load() {
        let (doc, mut shell) = offline_shell();
        shell.init(None).unwrap();
        assert_eq!(shell.pump_completions(), 1);

        doc.click(REFRESH);

        assert_eq!(text(&doc, WEEK), "Loading…");
        assert_eq!(shell.pump_completions(), 1);
        assert!(text(&doc, WEEK).starts_with("Could not load your summary"));
    }

    #[test]
    fn greeting_comes_from_props() {
        let overview = Overview::new(&json!({ "greeting": "Good morning" }));
        assert_eq!(overview.greeting, "Good morning");
    }
}
