//! Application core: event loop, action dispatch, frame rendering.
//!
//! The shell owns all dashboard state. The app only translates terminal
//! input into document clicks and key presses, pumps data-boundary
//! completions back into the shell, and paints the document each frame.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use athdash_core::dom::KEY_ESCAPE;
use athdash_core::shell::{BRAND_ID, CONTENT_ID, USER_ID};
use athdash_core::topic::{NAVIGATION_CHANGE, feature_topic};
use athdash_core::{
    DashboardError, DashboardShell, Document, FeatureAction, MemoryDocument, Payload, Subscription,
};
use color_eyre::eyre::Result;
use crossterm::event::{MouseButton, MouseEvent, MouseEventKind};
use ratatui::{
    Frame,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
};
use tracing::{debug, info};

use crate::action::{Action, Notification, NotificationLevel, map_key};
use crate::event::{Event, EventReader};
use crate::theme;
use crate::tui::TerminalSession;
use crate::view::{self, ModalView};

/// How long a status-bar notice stays up.
const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

type NoticeSlot = Arc<Mutex<Option<(Notification, Instant)>>>;

pub struct App {
    shell: DashboardShell,
    document: Arc<MemoryDocument>,
    running: bool,
    terminal_size: (u16, u16),
    notification: NoticeSlot,
    subscriptions: Vec<Subscription>,
}

impl App {
    pub fn new(shell: DashboardShell, document: Arc<MemoryDocument>) -> Self {
        Self {
            shell,
            document,
            running: true,
            terminal_size: (80, 24),
            notification: Arc::new(Mutex::new(None)),
            subscriptions: Vec::new(),
        }
    }

    /// Run the main event loop until the user quits.
    pub async fn run(&mut self, initial: Option<&str>) -> Result<()> {
        let mut session = TerminalSession::start()?;
        self.terminal_size = session.size();
        self.start(initial)?;

        let mut events = EventReader::spawn(self.shell.take_completions());
        info!("dashboard loop started");

        while self.running {
            let Some(event) = events.next().await else {
                break;
            };
            if let Event::Render = event {
                self.document.flush_frames();
                session.paint(|frame| self.render(frame))?;
            } else {
                self.handle_event(event);
            }
        }

        events.stop();
        self.stop();
        drop(session);
        info!("dashboard loop ended");
        Ok(())
    }

    /// Initialize the shell and start listening for notices.
    pub fn start(&mut self, initial: Option<&str>) -> Result<(), DashboardError> {
        self.shell.init(initial)?;
        self.subscriptions = self.watch_notifications()?;
        Ok(())
    }

    pub fn stop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        self.shell.dispose();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn notification(&self) -> Option<Notification> {
        self.notification
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(notice, _)| notice.clone())
    }

    // ── Notifications ───────────────────────────────────────────────

    fn watch_notifications(&self) -> Result<Vec<Subscription>, DashboardError> {
        let bus = self.shell.bus();
        let titles: Arc<HashMap<String, String>> = Arc::new(
            self.shell
                .registry()
                .get_all()
                .into_iter()
                .map(|entry| {
                    (
                        entry.descriptor.id().to_owned(),
                        entry.descriptor.title().to_owned(),
                    )
                })
                .collect(),
        );

        let mut subscriptions = Vec::new();

        let slot = Arc::clone(&self.notification);
        let names = Arc::clone(&titles);
        subscriptions.push(bus.subscribe(NAVIGATION_CHANGE, move |event| {
            if let Payload::Navigation { to, .. } = &event.payload {
                let title = names.get(to).map_or(to.as_str(), String::as_str);
                post(&slot, Notification::info(format!("→ {title}")));
            }
            Ok(())
        })?);

        for (id, title) in titles.iter() {
            let slot = Arc::clone(&self.notification);
            let saved = format!("{title} saved");
            subscriptions.push(bus.subscribe(
                &feature_topic(id, FeatureAction::SaveSuccess),
                move |_| {
                    post(&slot, Notification::success(saved.clone()));
                    Ok(())
                },
            )?);

            for action in [FeatureAction::LoadError, FeatureAction::SaveError] {
                let slot = Arc::clone(&self.notification);
                let title = title.clone();
                subscriptions.push(bus.subscribe(&feature_topic(id, action), move |event| {
                    let message = match &event.payload {
                        Payload::Error { message } => message.as_str(),
                        _ => "request failed",
                    };
                    post(&slot, Notification::error(format!("{title}: {message}")));
                    Ok(())
                })?);
            }
        }

        Ok(subscriptions)
    }

    fn expire_notification(&self) {
        let mut slot = self
            .notification
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|(_, posted)| posted.elapsed() >= NOTIFICATION_TTL)
        {
            *slot = None;
        }
    }

    // ── Input ───────────────────────────────────────────────────────

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => {
                if let Some(action) = map_key(key, self.shell.modals().active().is_some()) {
                    self.apply(action);
                }
            }
            Event::Mouse(mouse) => {
                if let Some(action) = self.mouse_action(mouse) {
                    self.apply(action);
                }
            }
            Event::Resize(w, h) => {
                self.terminal_size = (w, h);
            }
            Event::Completion(completion) => {
                self.shell.deliver(completion);
            }
            Event::Tick => self.expire_notification(),
            Event::Render => {}
        }
    }

    /// Process a single action against the shell and document.
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.running = false;
            }
            Action::JumpTo(index) => {
                if let Some(id) = self.accessible_ids().get(index) {
                    self.shell.navigate(id);
                }
            }
            Action::NextFeature => self.cycle(true),
            Action::PrevFeature => self.cycle(false),
            Action::Escape => self.document.key_down(KEY_ESCAPE),
            Action::Hotkey(key) => {
                let scope = self
                    .shell
                    .modals()
                    .active()
                    .unwrap_or_else(|| CONTENT_ID.to_owned());
                if let Some(target) = view::hotkey_target(&*self.document, &scope, key) {
                    debug!(key = %key, target = %target, "hotkey");
                    self.document.click(&target);
                }
            }
            Action::Click(id) => self.document.click(&id),
        }
    }

    fn accessible_ids(&self) -> Vec<String> {
        self.shell
            .registry()
            .accessible()
            .map(|descriptor| descriptor.id().to_owned())
            .collect()
    }

    fn cycle(&self, forward: bool) {
        let ids = self.accessible_ids();
        if ids.is_empty() {
            return;
        }
        let current = self
            .shell
            .current_feature_id()
            .and_then(|current| ids.iter().position(|id| *id == current));
        let next = match (current, forward) {
            (None, _) => 0,
            (Some(i), true) => (i + 1) % ids.len(),
            (Some(i), false) => (i + ids.len() - 1) % ids.len(),
        };
        if let Some(id) = ids.get(next) {
            self.shell.navigate(id);
        }
    }

    /// Left clicks only: outside an open modal is a backdrop click, a
    /// sidebar row clicks that nav item.
    fn mouse_action(&self, mouse: MouseEvent) -> Option<Action> {
        if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
            return None;
        }
        let screen = Rect::new(0, 0, self.terminal_size.0, self.terminal_size.1);

        if let Some(modal) = self.shell.modals().active() {
            let size = self
                .shell
                .modals()
                .spec(&modal)
                .map(|spec| spec.size)
                .unwrap_or_default();
            if view::contains(view::popup_area(screen, size), mouse.column, mouse.row) {
                return None;
            }
            return Some(Action::Click(modal));
        }

        let sidebar = view::areas(screen).sidebar;
        if !view::contains(sidebar, mouse.column, mouse.row) {
            return None;
        }
        let row = usize::from(mouse.row.checked_sub(sidebar.y + 1)?);
        view::nav_entries(&*self.document)
            .into_iter()
            .nth(row)
            .map(|entry| {
                debug!(feature = %entry.feature, "sidebar click");
                Action::Click(entry.element)
            })
    }

    // ── Rendering ───────────────────────────────────────────────────

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        let areas = view::areas(area);

        self.render_header(frame, areas.header);
        self.render_sidebar(frame, areas.sidebar);
        self.render_content(frame, areas.content);
        self.render_status_bar(frame, areas.status);

        if let Some(modal) = view::modal_view(&self.document, self.shell.modals()) {
            render_modal(frame, area, &modal);
        }
    }

    fn text_of(&self, id: &str) -> String {
        self.document
            .element(id)
            .and_then(|element| element.text)
            .unwrap_or_default()
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_default());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let line = Line::from(vec![
            Span::raw(" "),
            Span::styled(self.text_of(BRAND_ID), theme::brand_style()),
            Span::styled("  │  ", theme::key_hint()),
            Span::styled(self.text_of(USER_ID), theme::body_text()),
        ]);
        frame.render_widget(Paragraph::new(line), inner);
    }

    fn render_sidebar(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Features ")
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_default());

        let lines: Vec<Line> = view::nav_entries(&*self.document)
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let style = if entry.active {
                    theme::nav_active()
                } else {
                    theme::nav_inactive()
                };
                Line::from(vec![
                    Span::styled(format!(" {} ", i + 1), theme::key_hint_key()),
                    Span::styled(entry.label, style),
                ])
            })
            .collect();

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_content(&self, frame: &mut Frame, area: Rect) {
        let title = self
            .shell
            .current_feature_id()
            .and_then(|id| self.shell.registry().get_by_id(&id).map(|d| d.title().to_owned()))
            .unwrap_or_default();
        let block = Block::default()
            .title(format!(" {title} "))
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_focused());

        let paragraph = Paragraph::new(view::outline_lines(&self.document, CONTENT_ID))
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::raw(" ")];
        if !self.shell.has_boundary() {
            spans.push(Span::styled("○ offline", Style::default().fg(theme::ERROR_RED)));
            spans.push(Span::styled(" │ ", theme::key_hint()));
        }

        if let Some(notice) = self.notification() {
            let color = match notice.level {
                NotificationLevel::Info => theme::POOL_CYAN,
                NotificationLevel::Success => theme::SUCCESS_GREEN,
                NotificationLevel::Error => theme::ERROR_RED,
            };
            spans.push(Span::styled(notice.message, Style::default().fg(color)));
        } else if self.shell.modals().active().is_some() {
            spans.push(Span::styled("Esc close  [key] press button", theme::key_hint()));
        } else {
            spans.push(Span::styled(
                "1-9 jump  Tab next  [key] press button  q quit",
                theme::key_hint(),
            ));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}

fn post(slot: &NoticeSlot, notice: Notification) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some((notice, Instant::now()));
}

/// Render the active modal centered over everything else.
fn render_modal(frame: &mut Frame, area: Rect, modal: &ModalView) {
    let popup = view::popup_area(area, modal.size);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .title(format!(" {} ", modal.title))
        .title_style(theme::title_style())
        .title_bottom(modal.buttons.clone())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(theme::border_focused())
        .style(Style::default().bg(theme::BG_DARK));

    let body = Paragraph::new(modal.body.clone())
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(body, popup);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::features::tests::offline_shell;
    use crate::features::workout_tracker::WORKOUT_MODAL;

    fn started(initial: Option<&str>) -> App {
        let (doc, shell) = offline_shell();
        let mut app = App::new(shell, doc);
        app.start(initial).unwrap();
        app
    }

    #[test]
    fn number_keys_and_tab_move_between_features() {
        let mut app = started(None);
        assert_eq!(app.shell.current_feature_id().as_deref(), Some("overview"));

        app.apply(Action::JumpTo(2));
        assert_eq!(
            app.shell.current_feature_id().as_deref(),
            Some("workout-tracker")
        );

        app.apply(Action::NextFeature);
        assert_eq!(
            app.shell.current_feature_id().as_deref(),
            Some("training-persona")
        );
        app.apply(Action::NextFeature);
        assert_eq!(app.shell.current_feature_id().as_deref(), Some("overview"));
        app.apply(Action::PrevFeature);
        assert_eq!(
            app.shell.current_feature_id().as_deref(),
            Some("training-persona")
        );

        // Out of range is ignored.
        app.apply(Action::JumpTo(8));
        assert_eq!(
            app.shell.current_feature_id().as_deref(),
            Some("training-persona")
        );
    }

    #[test]
    fn hotkeys_open_and_escape_closes_a_modal() {
        let mut app = started(Some("workout-tracker"));

        app.apply(Action::Hotkey('l'));
        assert_eq!(app.shell.modals().active().as_deref(), Some(WORKOUT_MODAL));

        // Scoped to the modal while it is up.
        app.apply(Action::Hotkey('g'));
        assert_eq!(
            app.document
                .element("workout-form-draft")
                .and_then(|e| e.text)
                .as_deref(),
            Some("Strength · 40 min")
        );

        app.apply(Action::Escape);
        assert!(app.shell.modals().active().is_none());
    }

    #[test]
    fn backdrop_click_closes_and_sidebar_click_navigates() {
        let mut app = started(Some("workout-tracker"));
        app.terminal_size = (100, 40);

        let click = |column, row| MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: crossterm::event::KeyModifiers::NONE,
        };

        // Header is rows 0-2 and the sidebar border row 3, so entry 1 sits on row 5.
        let action = app.mouse_action(click(2, 5)).unwrap();
        assert_eq!(action, Action::Click("nav-profile".into()));
        app.apply(action);
        assert_eq!(app.shell.current_feature_id().as_deref(), Some("profile"));

        app.apply(Action::JumpTo(2));
        app.apply(Action::Hotkey('l'));
        assert_eq!(app.mouse_action(click(50, 20)), None);
        let action = app.mouse_action(click(0, 0)).unwrap();
        assert_eq!(action, Action::Click(WORKOUT_MODAL.into()));
        app.apply(action);
        assert!(app.shell.modals().active().is_none());
    }

    #[test]
    fn failures_and_navigation_raise_notices() {
        let mut app = started(None);
        app.apply(Action::JumpTo(1));
        assert_eq!(app.notification(), Some(Notification::info("→ Profile")));

        app.shell.pump_completions();
        let notice = app.notification().unwrap();
        assert_eq!(notice.level, NotificationLevel::Error);
        assert!(notice.message.starts_with("Profile: "), "{notice}");

        app.stop();
        assert!(!app.shell.is_initialized());
    }

    #[test]
    fn completion_events_reach_the_shell() {
        let mut app = started(None);
        let mut completions = app.shell.take_completions();
        app.apply(Action::JumpTo(1));

        while let Ok(completion) = completions.try_recv() {
            app.handle_event(Event::Completion(completion));
        }

        let notice = app.notification().unwrap();
        assert_eq!(notice.level, NotificationLevel::Error);
        assert!(notice.message.starts_with("Profile: "), "{notice}");
    }

    #[test]
    fn quit_stops_the_loop() {
        let mut app = started(None);
        assert!(app.is_running());
        app.apply(Action::Quit);
        assert!(!app.is_running());
    }
}
