//! Host input for the dashboard loop.
//!
//! One background task merges everything the app reacts to (terminal input,
//! data-boundary completions, the notice tick and the frame pulse) into a
//! single channel. The app loop reads one stream and never races sources.

use std::io;
use std::time::Duration;

use athdash_core::Completion;
use crossterm::event::{Event as TermEvent, EventStream, KeyEvent, KeyEventKind, MouseEvent};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// Terminal was resized to (cols, rows).
    Resize(u16, u16),
    /// A data request finished; hand it to the shell.
    Completion(Completion),
    /// Notice expiry check.
    Tick,
    /// Run queued animation frames, then paint.
    Render,
}

/// How often the merged stream emits `Tick` and `Render`.
#[derive(Debug, Clone, Copy)]
pub struct Pace {
    pub tick: Duration,
    pub frame: Duration,
}

impl Default for Pace {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(250),
            frame: Duration::from_millis(33),
        }
    }
}

pub struct EventReader {
    rx: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
}

impl EventReader {
    /// Read the real terminal alongside `completions`.
    pub fn spawn(completions: mpsc::UnboundedReceiver<Completion>) -> Self {
        Self::from_sources(EventStream::new(), completions, Pace::default())
    }

    fn from_sources<S>(
        input: S,
        completions: mpsc::UnboundedReceiver<Completion>,
        pace: Pace,
    ) -> Self
    where
        S: Stream<Item = io::Result<TermEvent>> + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(merge(input, completions, pace, tx, cancel.clone()));
        Self { rx, cancel }
    }

    /// `None` once the reader has stopped.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventReader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn pulse(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Completions win ties so a frame never paints data that has already
/// arrived but not been delivered.
async fn merge<S>(
    mut input: S,
    mut completions: mpsc::UnboundedReceiver<Completion>,
    pace: Pace,
    tx: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) where
    S: Stream<Item = io::Result<TermEvent>> + Unpin,
{
    let mut tick = pulse(pace.tick);
    let mut frame = pulse(pace.frame);
    let mut input_open = true;
    let mut data_open = true;

    loop {
        let event = tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            completion = completions.recv(), if data_open => match completion {
                Some(completion) => Event::Completion(completion),
                None => {
                    debug!("completion channel closed");
                    data_open = false;
                    continue;
                }
            },

            next = input.next(), if input_open => match next {
                Some(Ok(raw)) => match translate(raw) {
                    Some(event) => event,
                    None => continue,
                },
                Some(Err(err)) => {
                    warn!(error = %err, "terminal read failed");
                    continue;
                }
                None => {
                    debug!("terminal input ended");
                    input_open = false;
                    continue;
                }
            },

            _ = frame.tick() => Event::Render,

            _ = tick.tick() => Event::Tick,
        };

        if tx.send(event).is_err() {
            break;
        }
    }
}

/// Only key presses, mouse and resize reach the app.
fn translate(raw: TermEvent) -> Option<Event> {
    match raw {
        TermEvent::Key(key) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
        TermEvent::Mouse(mouse) => Some(Event::Mouse(mouse)),
        TermEvent::Resize(cols, rows) => Some(Event::Resize(cols, rows)),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use athdash_core::boundary::RequestKind;
    use athdash_core::router::Generation;
    use crossterm::event::{KeyCode, KeyEventState, KeyModifiers};
    use pretty_assertions::assert_eq;

    use super::*;

    const IDLE: Pace = Pace {
        tick: Duration::from_secs(3600),
        frame: Duration::from_secs(3600),
    };

    fn key(code: KeyCode, kind: KeyEventKind) -> TermEvent {
        TermEvent::Key(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        })
    }

    fn label(event: &Event) -> Option<String> {
        match event {
            Event::Key(key) => Some(format!("key:{:?}", key.code)),
            Event::Resize(cols, rows) => Some(format!("resize:{cols}x{rows}")),
            Event::Completion(done) => Some(format!("done:{}", done.feature)),
            Event::Mouse(_) => Some("mouse".into()),
            Event::Tick | Event::Render => None,
        }
    }

    #[tokio::test]
    async fn terminal_input_and_completions_share_one_stream() {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        done_tx
            .send(Completion {
                guard: Generation::default().guard(),
                feature: "overview".into(),
                kind: RequestKind::Load,
                result: Ok(serde_json::json!({})),
            })
            .unwrap();
        let input = futures::stream::iter(vec![
            Ok(key(KeyCode::Char('2'), KeyEventKind::Press)),
            Ok(key(KeyCode::Char('2'), KeyEventKind::Release)),
            Ok(TermEvent::FocusGained),
            Ok(TermEvent::Resize(100, 40)),
        ]);
        let mut reader = EventReader::from_sources(input, done_rx, IDLE);

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let event = tokio::time::timeout(Duration::from_secs(1), reader.next())
                .await
                .unwrap()
                .unwrap();
            seen.extend(label(&event));
        }

        assert_eq!(seen, vec!["done:overview", "key:Char('2')", "resize:100x40"]);
    }

    #[tokio::test]
    async fn stop_ends_the_stream() {
        let (_done_tx, done_rx) = mpsc::unbounded_channel();
        let mut reader = EventReader::from_sources(futures::stream::pending(), done_rx, IDLE);
        reader.stop();

        let drained = tokio::time::timeout(Duration::from_secs(1), async {
            while reader.next().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }
}
