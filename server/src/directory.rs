//! In-process room directory.
//!
//! Rooms report a coarse [`RoomStatus`] whenever it changes (and on a slow
//! refresh interval while they live) and ask to be removed when they shut
//! down. Entries that stop being refreshed are swept after a staleness window.
//! Watchers receive the full room list after every change.
//!
//! Reporting is fire-and-forget: a room never waits on the directory.

use log::{debug, info};
use shared::{RoomId, RoomStatus, ServerMessage};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};

struct DirectoryEntry {
    status: RoomStatus,
    updated_at: Instant,
}

pub struct RoomDirectory {
    entries: HashMap<RoomId, DirectoryEntry>,
    stale_after: Duration,
}

impl RoomDirectory {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            stale_after,
        }
    }

    /// Stores or refreshes a room. Returns true if the listing changed.
    pub fn update(&mut self, status: RoomStatus, now: Instant) -> bool {
        match self.entries.get_mut(&status.room_id) {
            Some(entry) => {
                entry.updated_at = now;
                if entry.status == status {
                    return false;
                }
                entry.status = status;
                true
            }
            None => {
                self.entries.insert(
                    status.room_id.clone(),
                    DirectoryEntry {
                        status,
                        updated_at: now,
                    },
                );
                true
            }
        }
    }

    pub fn remove(&mut self, room_id: &str) -> bool {
        self.entries.remove(room_id).is_some()
    }

    /// Drops every room not refreshed within the staleness window.
    pub fn expire_stale(&mut self, now: Instant) -> Vec<RoomId> {
        let expired: Vec<RoomId> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.updated_at) > self.stale_after)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.entries.remove(id);
        }
        expired
    }

    pub fn list(&self) -> Vec<RoomStatus> {
        let mut rooms: Vec<RoomStatus> = self.entries.values().map(|e| e.status.clone()).collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum DirectoryCommand {
    Report(RoomStatus),
    Remove(RoomId),
    Watch(mpsc::UnboundedSender<ServerMessage>),
    List(oneshot::Sender<Vec<RoomStatus>>),
}

/// Cheap, cloneable access to the directory task.
#[derive(Clone)]
pub struct DirectoryHandle {
    tx: mpsc::UnboundedSender<DirectoryCommand>,
}

impl DirectoryHandle {
    pub fn report(&self, status: RoomStatus) {
        self.send(DirectoryCommand::Report(status));
    }

    pub fn remove(&self, room_id: &str) {
        self.send(DirectoryCommand::Remove(room_id.to_string()));
    }

    /// Subscribes `watcher` to room list snapshots, starting with the current one.
    pub fn watch(&self, watcher: mpsc::UnboundedSender<ServerMessage>) {
        self.send(DirectoryCommand::Watch(watcher));
    }

    pub async fn list(&self) -> Vec<RoomStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(DirectoryCommand::List(reply));
        rx.await.unwrap_or_default()
    }

    fn send(&self, command: DirectoryCommand) {
        if self.tx.send(command).is_err() {
            debug!("Room directory is gone, dropping update");
        }
    }
}

/// Spawns the directory task and returns a handle to it.
pub fn spawn_directory(stale_after: Duration, sweep_interval: Duration) -> DirectoryHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut directory = RoomDirectory::new(stale_after);
        let mut watchers: Vec<mpsc::UnboundedSender<ServerMessage>> = Vec::new();
        let mut sweep = interval(sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let changed = tokio::select! {
                command = rx.recv() => match command {
                    Some(DirectoryCommand::Report(status)) => {
                        directory.update(status, Instant::now())
                    }
                    Some(DirectoryCommand::Remove(room_id)) => directory.remove(&room_id),
                    Some(DirectoryCommand::Watch(watcher)) => {
                        if watcher.send(ServerMessage::Rooms(directory.list())).is_ok() {
                            watchers.push(watcher);
                        }
                        false
                    }
                    Some(DirectoryCommand::List(reply)) => {
                        let _ = reply.send(directory.list());
                        false
                    }
                    None => break,
                },
                _ = sweep.tick() => {
                    let expired = directory.expire_stale(Instant::now());
                    for room_id in &expired {
                        info!("Room {} went stale, dropping it from the directory", room_id);
                    }
                    !expired.is_empty()
                }
            };

            if changed {
                let snapshot = ServerMessage::Rooms(directory.list());
                watchers.retain(|watcher| watcher.send(snapshot.clone()).is_ok());
            }
        }
    });

    DirectoryHandle { tx }
}
