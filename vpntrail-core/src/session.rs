//! Session builder
//!
//! Folds a scan-ordered event list into VPN session intervals.
//!
//! ## State machine
//!
//! ```text
//!            CONNECT                      DISCONNECT
//!   Idle ───────────────► Open ─────────────────────────► Idle (emit)
//!                          │ ▲
//!                          └─┘ CONNECT (emit previous, open new)
//!
//!   Idle ── DISCONNECT ──► Idle (emit session starting at the epoch)
//!   Open ── end of events ─► emit session ending at SENTINEL_MAX
//! ```
//!
//! The builder is an owned value threaded through [`SessionBuilder::push`];
//! nothing is patched after it has been emitted.

use crate::types::{Attributes, Event, EventKind, Session, SENTINEL_MAX, SENTINEL_MIN};

/// A session whose stop has not been seen yet.
#[derive(Debug, Clone)]
struct OpenSession {
    start: i64,
    attributes: Attributes,
}

#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    open: Option<OpenSession>,
    closed: Vec<Session>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event and return the next state.
    pub fn push(mut self, event: &Event) -> Self {
        match (self.open.take(), event.kind) {
            (None, EventKind::Connect) => {
                self.open = Some(OpenSession {
                    start: event.timestamp,
                    attributes: event.attributes.clone(),
                });
            }
            (Some(open), EventKind::Connect) => {
                // Mode change without an explicit disconnect.
                self.close(open.start, event.timestamp, open.attributes);
                self.open = Some(OpenSession {
                    start: event.timestamp,
                    attributes: event.attributes.clone(),
                });
            }
            (Some(open), EventKind::Disconnect) => {
                self.close(open.start, event.timestamp, open.attributes);
            }
            (None, EventKind::Disconnect) => {
                tracing::debug!(
                    sequence_index = event.sequence_index,
                    "Disconnect without a start, session begins at the epoch"
                );
                self.close(SENTINEL_MIN, event.timestamp, event.attributes.clone());
            }
        }
        self
    }

    /// Emit the remaining open session, if any, and return all sessions.
    pub fn finish(mut self) -> Vec<Session> {
        if let Some(open) = self.open.take() {
            self.close(open.start, SENTINEL_MAX, open.attributes);
        }
        self.closed
    }

    fn close(&mut self, start: i64, stop: i64, attributes: Attributes) {
        let stop = if stop < start {
            tracing::warn!(start, stop, "Session stop precedes start, clamping to start");
            start
        } else {
            stop
        };

        let id = self.closed.len() as i64 + 1;
        self.closed.push(Session {
            id,
            start,
            stop,
            attributes,
        });
    }
}

/// Build sessions from events in scan order.
pub fn build_sessions(events: &[Event]) -> Vec<Session> {
    let sessions = events
        .iter()
        .fold(SessionBuilder::new(), SessionBuilder::push)
        .finish();

    tracing::info!(
        events = events.len(),
        sessions = sessions.len(),
        "Sessions built"
    );
    sessions
}
