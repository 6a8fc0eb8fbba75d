//! Terminal session and panic routing.
//!
//! `TerminalSession` owns raw mode and the alternate screen for as long as it
//! lives. The panic hook tells two kinds of panic apart: a feature handler
//! panicking inside the event bus is caught there and the dashboard keeps
//! drawing, so the hook only logs it; anything else is about to unwind out
//! of the app, so the hook gives the terminal back before color-eyre prints.

use std::io::{Stdout, stdout};

use color_eyre::eyre::Result;
use crossterm::{
    ExecutableCommand, cursor,
    event::{DisableMouseCapture, EnableMouseCapture},
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Frame, Terminal, backend::CrosstermBackend};
use tracing::{debug, error};

pub struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    /// Switch to raw mode and the alternate screen with mouse capture.
    pub fn start() -> Result<Self> {
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
        terminal::enable_raw_mode()?;
        let mut out = stdout();
        out.execute(EnterAlternateScreen)?;
        out.execute(EnableMouseCapture)?;
        out.execute(cursor::Hide)?;
        terminal.clear()?;
        debug!("terminal session started");
        Ok(Self { terminal })
    }

    /// (cols, rows), or 80x24 when the terminal will not say.
    pub fn size(&self) -> (u16, u16) {
        self.terminal
            .size()
            .map_or((80, 24), |size| (size.width, size.height))
    }

    pub fn paint(&mut self, render: impl FnOnce(&mut Frame)) -> Result<()> {
        self.terminal.draw(render)?;
        Ok(())
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        release_terminal();
        debug!("terminal session ended");
    }
}

/// Undo `TerminalSession::start`. Each step is attempted even if an earlier
/// one failed.
fn release_terminal() {
    let mut out = stdout();
    let _ = out.execute(cursor::Show);
    let _ = out.execute(DisableMouseCapture);
    let _ = out.execute(LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();
}

/// Where a panic on the current thread ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PanicRoute {
    /// A bus handler panicked; the bus contains it.
    Contained,
    /// The panic will unwind out of the app.
    Fatal,
}

impl PanicRoute {
    fn current() -> Self {
        if athdash_core::in_handler() {
            Self::Contained
        } else {
            Self::Fatal
        }
    }
}

/// Install color-eyre's report hook and the routing panic hook. Call before
/// `TerminalSession::start`.
pub fn install_hooks() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
        .display_env_section(false)
        .into_hooks();
    eyre_hook.install()?;

    let report = panic_hook.into_panic_hook();
    std::panic::set_hook(Box::new(move |info| match PanicRoute::current() {
        PanicRoute::Contained => {
            error!(panic = %info, "feature handler panicked; dashboard continues");
        }
        PanicRoute::Fatal => {
            release_terminal();
            report(info);
        }
    }));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use athdash_core::{EventBus, Payload};

    use super::*;

    #[test]
    fn panics_inside_bus_handlers_are_contained() {
        let bus = EventBus::new();
        let routes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&routes);
        bus.subscribe("workouts:refresh", move |_| {
            sink.lock().unwrap().push(PanicRoute::current());
            Ok(())
        })
        .unwrap();

        bus.publish("workouts:refresh", Payload::Empty).unwrap();

        assert_eq!(*routes.lock().unwrap(), vec![PanicRoute::Contained]);
        assert_eq!(PanicRoute::current(), PanicRoute::Fatal);
    }
}
