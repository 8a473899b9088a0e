//! Server network layer: TCP listener and per-connection tasks.
//!
//! Every frame on the wire is a big-endian `u32` length followed by a bincode
//! payload (see [`shared::codec`]). The first frame a client sends decides
//! what the connection is:
//!
//! - `Join` admits the connection into a room. From then on a reader task
//!   forwards decoded frames to the room, and the connection task writes
//!   whatever the room pushes back.
//! - `WatchRooms` subscribes the connection to room directory snapshots.
//!
//! Anything else as a first frame closes the connection.

use crate::config::ServerConfig;
use crate::directory::{spawn_directory, DirectoryHandle};
use crate::room::ConnectionId;
use crate::rooms::{RoomHandle, RoomRegistry};
use log::{debug, error, info, warn};
use shared::{
    decode, read_frame, sanitize_name, write_frame, ClientMessage, ProtocolError, ServerMessage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Main server accepting connections and handing them to rooms
pub struct Server {
    listener: TcpListener,
    registry: RoomRegistry,
    directory: DirectoryHandle,
    next_conn_id: ConnectionId,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let directory =
            spawn_directory(config.directory_stale_after, config.directory_sweep_interval);
        let registry = RoomRegistry::new(Arc::new(config), directory.clone());

        Ok(Server {
            listener,
            registry,
            directory,
            next_conn_id: 0,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(mut self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    self.next_conn_id += 1;
                    let conn_id = self.next_conn_id;
                    let registry = self.registry.clone();
                    let directory = self.directory.clone();

                    tokio::spawn(async move {
                        let result = handle_connection(stream, conn_id, registry, directory).await;
                        if let Err(e) = result {
                            debug!("Connection {} from {} ended: {}", conn_id, addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    conn_id: ConnectionId,
    registry: RoomRegistry,
    directory: DirectoryHandle,
) -> Result<(), ProtocolError> {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let first = match read_frame(&mut reader).await? {
        Some(frame) => frame,
        None => return Ok(()),
    };

    match decode::<ClientMessage>(&first) {
        Ok(ClientMessage::Join {
            room_id,
            player_id,
            name,
        }) => {
            let name = sanitize_name(&name);
            serve_player(reader, writer, conn_id, registry, room_id, player_id, name).await
        }
        Ok(ClientMessage::WatchRooms) => serve_watcher(reader, writer, directory).await,
        Ok(other) => {
            warn!("Connection {} opened with {:?}, closing", conn_id, other);
            writer.shutdown().await?;
            Ok(())
        }
        Err(e) => {
            warn!("Connection {} sent a malformed handshake: {}", conn_id, e);
            writer.shutdown().await?;
            Ok(())
        }
    }
}

async fn serve_player(
    reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    conn_id: ConnectionId,
    registry: RoomRegistry,
    room_id: String,
    player_id: String,
    name: String,
) -> Result<(), ProtocolError> {
    let (outbound, mut inbound) = mpsc::unbounded_channel();

    let room = match registry
        .join(&room_id, conn_id, player_id.clone(), name, outbound)
        .await
    {
        Ok(room) => room,
        Err(e) => {
            let refusal = ServerMessage::Error {
                message: e.to_string(),
            };
            write_frame(&mut writer, &refusal).await?;
            writer.shutdown().await?;
            return Ok(());
        }
    };
    info!("Connection {} is {} in room {}", conn_id, player_id, room_id);

    let mut reader_task = tokio::spawn(forward_frames(
        reader,
        room.clone(),
        conn_id,
        player_id.clone(),
    ));

    let result = loop {
        tokio::select! {
            message = inbound.recv() => match message {
                Some(message) => {
                    let closing = matches!(message, ServerMessage::Error { .. });
                    if let Err(e) = write_frame(&mut writer, &message).await {
                        break Err(e);
                    }
                    if closing {
                        break Ok(());
                    }
                }
                None => break Ok(()),
            },
            _ = &mut reader_task => break Ok(()),
        }
    };

    reader_task.abort();
    room.disconnect(conn_id, &player_id);
    let _ = writer.shutdown().await;
    info!("Connection {} for {} closed", conn_id, player_id);
    result
}

/// Reads frames until the peer goes away and hands each decoded message to
/// the room. Frames that do not decode are dropped.
async fn forward_frames(
    mut reader: OwnedReadHalf,
    room: RoomHandle,
    conn_id: ConnectionId,
    player_id: String,
) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                debug!("Read from {} failed: {}", player_id, e);
                break;
            }
        };

        match decode::<ClientMessage>(&frame) {
            Ok(message) => {
                if !room.send(conn_id, &player_id, message) {
                    break;
                }
            }
            Err(e) => debug!("Dropping malformed frame from {}: {}", player_id, e),
        }
    }
}

async fn serve_watcher(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    directory: DirectoryHandle,
) -> Result<(), ProtocolError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    directory.watch(tx);

    // Watchers have nothing to say. Raw reads only notice them leaving, and
    // unlike a frame read they lose nothing when a snapshot wins the select.
    let mut discard = [0u8; 256];
    loop {
        tokio::select! {
            snapshot = rx.recv() => match snapshot {
                Some(snapshot) => write_frame(&mut writer, &snapshot).await?,
                None => break,
            },
            read = reader.read(&mut discard) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => debug!("Ignoring {} bytes from a room watcher", n),
            },
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}
