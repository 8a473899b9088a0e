//! Round timers.
//!
//! The session never sleeps. When a transition needs a deadline it records a
//! [`PendingTimer`] and emits a [`TimerOp::Arm`]; leaving the phase emits a
//! [`TimerOp::Cancel`]. The room actor feeds those ops into a [`TimerSet`],
//! which owns the tokio tasks that eventually post the firing back into the
//! room's event queue.
//!
//! Every arm gets a fresh [`TimerToken`]. The session only honours a firing
//! whose token matches its pending timer, so a firing that was already queued
//! when its timer got cancelled is a no-op even if the abort came too late.

use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Dealing animation, then the first reveal.
    Deal,
    /// The police ran out of time; a suspect is picked for them.
    PoliceGuess,
    /// The result has been shown long enough; advance the room.
    NextRound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub kind: TimerKind,
    pub token: TimerToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    Arm {
        kind: TimerKind,
        token: TimerToken,
        delay: Duration,
    },
    Cancel {
        kind: TimerKind,
    },
}

/// Live timer tasks for one room, at most one per kind.
pub struct TimerSet<E> {
    handles: HashMap<TimerKind, (TimerToken, JoinHandle<()>)>,
    events: mpsc::UnboundedSender<E>,
    on_fire: fn(TimerKind, TimerToken) -> E,
}

impl<E: Send + 'static> TimerSet<E> {
    pub fn new(events: mpsc::UnboundedSender<E>, on_fire: fn(TimerKind, TimerToken) -> E) -> Self {
        Self {
            handles: HashMap::new(),
            events,
            on_fire,
        }
    }

    pub fn apply(&mut self, ops: impl IntoIterator<Item = TimerOp>) {
        for op in ops {
            match op {
                TimerOp::Arm { kind, token, delay } => self.arm(kind, token, delay),
                TimerOp::Cancel { kind } => self.cancel(kind),
            }
        }
    }

    fn arm(&mut self, kind: TimerKind, token: TimerToken, delay: Duration) {
        self.cancel(kind);

        let events = self.events.clone();
        let event = (self.on_fire)(kind, token);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if events.send(event).is_err() {
                debug!("{:?} timer fired after its room closed", kind);
            }
        });
        self.handles.insert(kind, (token, handle));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some((_, handle)) = self.handles.remove(&kind) {
            handle.abort();
        }
    }

    /// Drops bookkeeping for a timer whose firing has just been delivered.
    pub fn fired(&mut self, kind: TimerKind, token: TimerToken) {
        if matches!(self.handles.get(&kind), Some((armed, _)) if *armed == token) {
            self.handles.remove(&kind);
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.handles.drain() {
            handle.abort();
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.handles.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<E> Drop for TimerSet<E> {
    fn drop(&mut self) {
        for (_, (_, handle)) in self.handles.drain() {
            handle.abort();
        }
    }
}
