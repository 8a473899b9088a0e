//! Room registry.
//!
//! Maps room ids to running room actors. A room is created lazily by the
//! first join that names it and removes itself from the registry once its
//! actor exits.

use crate::config::ServerConfig;
use crate::directory::DirectoryHandle;
use crate::error::JoinError;
use crate::room::{ConnectionId, Outbound, Room, RoomEvent};
use log::{debug, info};
use shared::{ClientMessage, PlayerId, RoomId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// A join can race a room that is shutting down; it is retried on a fresh
/// room this many times.
const JOIN_ATTEMPTS: usize = 3;

/// Sending side of one room's event queue.
#[derive(Clone)]
pub struct RoomHandle {
    tx: mpsc::UnboundedSender<RoomEvent>,
}

impl RoomHandle {
    pub fn send(&self, conn_id: ConnectionId, player_id: &str, message: ClientMessage) -> bool {
        self.tx
            .send(RoomEvent::Message {
                conn_id,
                player_id: player_id.to_string(),
                message,
            })
            .is_ok()
    }

    pub fn disconnect(&self, conn_id: ConnectionId, player_id: &str) {
        let _ = self.tx.send(RoomEvent::Disconnect {
            conn_id,
            player_id: player_id.to_string(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn same_room(&self, other: &RoomHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<RoomId, RoomHandle>>>,
    config: Arc<ServerConfig>,
    directory: DirectoryHandle,
}

impl RoomRegistry {
    pub fn new(config: Arc<ServerConfig>, directory: DirectoryHandle) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            config,
            directory,
        }
    }

    /// Admits `player_id` into `room_id`, creating the room if needed.
    ///
    /// On success the room will push every future message for this
    /// connection into `outbound`.
    pub async fn join(
        &self,
        room_id: &str,
        conn_id: ConnectionId,
        player_id: PlayerId,
        name: String,
        outbound: Outbound,
    ) -> Result<RoomHandle, JoinError> {
        if room_id.trim().is_empty() || player_id.trim().is_empty() {
            return Err(JoinError::MissingIdentity);
        }

        for attempt in 1..=JOIN_ATTEMPTS {
            let handle = self.get_or_spawn(room_id).await;
            let (reply, answer) = oneshot::channel();

            let sent = handle.tx.send(RoomEvent::Join {
                conn_id,
                player_id: player_id.clone(),
                name: name.clone(),
                outbound: outbound.clone(),
                reply,
            });
            if sent.is_err() {
                debug!("Room {} closed before join attempt {}", room_id, attempt);
                self.forget(room_id, &handle).await;
                continue;
            }

            match answer.await {
                Ok(Ok(())) => return Ok(handle),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!("Room {} closed during join attempt {}", room_id, attempt);
                    self.forget(room_id, &handle).await;
                }
            }
        }

        Err(JoinError::RoomUnavailable)
    }

    async fn get_or_spawn(&self, room_id: &str) -> RoomHandle {
        let mut rooms = self.rooms.write().await;
        if let Some(handle) = rooms.get(room_id) {
            if !handle.is_closed() {
                return handle.clone();
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = RoomHandle { tx: tx.clone() };
        let room = Room::new(room_id.to_string(), &self.config, self.directory.clone(), tx);

        let registry = self.clone();
        let id = room_id.to_string();
        let own_handle = handle.clone();
        tokio::spawn(async move {
            room.run(rx).await;
            registry.forget(&id, &own_handle).await;
        });

        info!("Created room {}", room_id);
        rooms.insert(room_id.to_string(), handle.clone());
        handle
    }

    /// Removes `room_id` only if it still points at `handle`; a newer room
    /// under the same id is left alone.
    async fn forget(&self, room_id: &str, handle: &RoomHandle) {
        let mut rooms = self.rooms.write().await;
        if matches!(rooms.get(room_id), Some(current) if current.same_room(handle)) {
            rooms.remove(room_id);
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
