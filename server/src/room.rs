//! Room actor.
//!
//! One tokio task per room owns the [`Session`], the room's live connections
//! and its timers, and handles [`RoomEvent`]s strictly one at a time. Player
//! commands, connection changes and timer firings all arrive on the same
//! queue, so whichever of two racing events is queued first wins and the
//! other meets a guard that no longer holds.
//!
//! After every change the actor pushes one redacted view to each connection
//! before it looks at the next event.

use crate::config::ServerConfig;
use crate::directory::DirectoryHandle;
use crate::error::AdmissionError;
use crate::redact::redact;
use crate::session::{Outcome, Session};
use crate::timers::{TimerKind, TimerSet, TimerToken};
use crate::utils::now_ms;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ClientMessage, Notification, PlayerId, RoomId, RoomStatus, ServerMessage};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

/// Identifies one transport connection; a player keeps their `PlayerId`
/// across reconnects but gets a new `ConnectionId` each time.
pub type ConnectionId = u64;

pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

pub const REPLACED_MESSAGE: &str = "Signed in from another connection";

#[derive(Debug)]
pub enum RoomEvent {
    Join {
        conn_id: ConnectionId,
        player_id: PlayerId,
        name: String,
        outbound: Outbound,
        reply: oneshot::Sender<Result<(), AdmissionError>>,
    },
    Message {
        conn_id: ConnectionId,
        player_id: PlayerId,
        message: ClientMessage,
    },
    Disconnect {
        conn_id: ConnectionId,
        player_id: PlayerId,
    },
    TimerFired {
        kind: TimerKind,
        token: TimerToken,
    },
}

struct Connection {
    conn_id: ConnectionId,
    outbound: Outbound,
}

pub struct Room {
    id: RoomId,
    session: Session,
    connections: HashMap<PlayerId, Connection>,
    timers: TimerSet<RoomEvent>,
    directory: DirectoryHandle,
    last_status: Option<RoomStatus>,
    rng: StdRng,
    idle_timeout: Duration,
    refresh_interval: Duration,
}

impl Room {
    /// `events` must feed the receiver later passed to [`Room::run`]; timer
    /// firings are posted through it.
    pub fn new(
        id: RoomId,
        config: &ServerConfig,
        directory: DirectoryHandle,
        events: mpsc::UnboundedSender<RoomEvent>,
    ) -> Self {
        Self {
            id,
            session: Session::new(config.session.clone()),
            connections: HashMap::new(),
            timers: TimerSet::new(events, |kind, token| RoomEvent::TimerFired { kind, token }),
            directory,
            last_status: None,
            rng: StdRng::from_entropy(),
            idle_timeout: config.idle_room_timeout,
            refresh_interval: config.directory_refresh_interval(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Processes events until the room has sat without connections for the
    /// idle timeout. Events still queued at that point are dropped, which
    /// fails any pending join so the caller can retry on a fresh room.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<RoomEvent>) {
        info!("Room {} opened", self.id);

        let mut idle_deadline = Some(Instant::now() + self.idle_timeout);
        let mut refresh =
            interval_at(Instant::now() + self.refresh_interval, self.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let idle = sleep_until(idle_deadline.unwrap_or_else(Instant::now));

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = refresh.tick() => {
                    if let Some(status) = &self.last_status {
                        self.directory.report(status.clone());
                    }
                },
                _ = idle, if idle_deadline.is_some() => {
                    info!("Room {} has been empty for {:?}, closing", self.id, self.idle_timeout);
                    break;
                }
            }

            idle_deadline = if self.connections.is_empty() {
                idle_deadline.or_else(|| Some(Instant::now() + self.idle_timeout))
            } else {
                None
            };
        }

        events.close();
        while events.try_recv().is_ok() {}
        self.timers.cancel_all();
        self.directory.remove(&self.id);
        info!("Room {} closed", self.id);
    }

    pub fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Join {
                conn_id,
                player_id,
                name,
                outbound,
                reply,
            } => self.handle_join(conn_id, player_id, name, outbound, reply),
            RoomEvent::Message {
                conn_id,
                player_id,
                message,
            } => {
                if !self.is_current(&player_id, conn_id) {
                    debug!("Dropping message from replaced connection {}", conn_id);
                    return;
                }
                self.handle_message(player_id, message);
            }
            RoomEvent::Disconnect { conn_id, player_id } => {
                if !self.is_current(&player_id, conn_id) {
                    return;
                }
                self.connections.remove(&player_id);
                if self.session.disconnect(&player_id) {
                    self.publish();
                }
            }
            RoomEvent::TimerFired { kind, token } => {
                self.timers.fired(kind, token);
                let outcome = self
                    .session
                    .handle_timer(kind, token, now_ms(), &mut self.rng);
                self.apply(outcome);
            }
        }
    }

    fn handle_join(
        &mut self,
        conn_id: ConnectionId,
        player_id: PlayerId,
        name: String,
        outbound: Outbound,
        reply: oneshot::Sender<Result<(), AdmissionError>>,
    ) {
        if let Err(e) = self.session.join(&player_id, &name) {
            info!("Room {} refused {}: {}", self.id, player_id, e);
            let _ = reply.send(Err(e));
            return;
        }

        let connection = Connection { conn_id, outbound };
        if let Some(previous) = self.connections.insert(player_id.clone(), connection) {
            info!("Player {} replaced connection {}", player_id, previous.conn_id);
            let _ = previous.outbound.send(ServerMessage::Error {
                message: REPLACED_MESSAGE.to_string(),
            });
        }

        if reply.send(Ok(())).is_err() {
            debug!("Joiner {} left before admission completed", player_id);
        }
        self.publish();
    }

    fn handle_message(&mut self, player_id: PlayerId, message: ClientMessage) {
        match message {
            ClientMessage::Command(command) => {
                let outcome =
                    self.session
                        .handle_command(&player_id, command, now_ms(), &mut self.rng);
                self.apply(outcome);
            }
            ClientMessage::Signal { target_id, payload } => {
                self.relay_signal(player_id, &target_id, payload)
            }
            ClientMessage::Notify(notification) => self.relay_notification(player_id, notification),
            ClientMessage::Join { .. } | ClientMessage::WatchRooms => {
                debug!("Ignoring repeated handshake from {}", player_id);
            }
        }
    }

    fn apply(&mut self, outcome: Outcome) {
        self.timers.apply(outcome.timers);
        if outcome.changed {
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.broadcast_state();
        self.report_status();
    }

    fn broadcast_state(&self) {
        for (player_id, connection) in &self.connections {
            let view = redact(&self.session, player_id);
            if connection.outbound.send(ServerMessage::State(view)).is_err() {
                debug!("Connection {} for {} is closing", connection.conn_id, player_id);
            }
        }
    }

    fn report_status(&mut self) {
        let status = self.session.status(&self.id);
        if self.last_status.as_ref() != Some(&status) {
            self.directory.report(status.clone());
            self.last_status = Some(status);
        }
    }

    fn relay_signal(&self, from_id: PlayerId, target_id: &str, payload: Vec<u8>) {
        match self.connections.get(target_id) {
            Some(target) => {
                let _ = target.outbound.send(ServerMessage::Signal { from_id, payload });
            }
            None => debug!("Signal from {} to absent {} dropped", from_id, target_id),
        }
    }

    fn relay_notification(&self, from_id: PlayerId, notification: Notification) {
        let Some(from_name) = self.session.player_name(&from_id).map(str::to_string) else {
            warn!("Notification from non-member {} dropped", from_id);
            return;
        };

        let message = ServerMessage::Notification {
            from_id,
            from_name,
            notification,
        };
        for connection in self.connections.values() {
            let _ = connection.outbound.send(message.clone());
        }
    }

    fn is_current(&self, player_id: &str, conn_id: ConnectionId) -> bool {
        matches!(self.connections.get(player_id), Some(c) if c.conn_id == conn_id)
    }
}
