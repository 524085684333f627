// EmEx: Orchestrator for Emulated Multi-Operator Environments
// Copyright (C) 2023-2024 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! The framed TCP frontend: per-session receive buffers, request
//! decoding and reply writing.
//!
//! Sessions never block the event loop: every connection runs a reader
//! task feeding decoded requests into the manager's event channel and a
//! writer task draining the session's reply channel. A malformed payload
//! is logged and dropped while the connection stays up.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpListener, TcpStream,
};
use tokio::sync::mpsc;

use emex_proto::{frame, ClientMessage, ContainerStateMessage, FrameReader};

use super::manager::DaemonEvent;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Accept client sessions forever.
pub async fn accept_clients(listener: TcpListener, events: mpsc::Sender<DaemonEvent>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::error!("client accept failed: {e}");
                return;
            }
        };

        let client = next_session_id();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        if events
            .send(DaemonEvent::ClientConnected {
                client,
                addr,
                tx: reply_tx,
            })
            .await
            .is_err()
        {
            return;
        }

        let events = events.clone();
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            let writer = tokio::spawn(write_session(write_half, reply_rx));

            read_session(read_half, |request: ClientMessage| {
                DaemonEvent::ClientRequest { client, request }
            }, &events)
            .await;

            let _ = events.send(DaemonEvent::ClientClosed { client }).await;
            writer.abort();
        });
    }
}

/// Accept container agent sessions forever.
pub async fn accept_containers(listener: TcpListener, events: mpsc::Sender<DaemonEvent>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::error!("container accept failed: {e}");
                return;
            }
        };

        log::debug!("container accept from {addr}");

        let conn = next_session_id();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        if events
            .send(DaemonEvent::ContainerConnected {
                conn,
                tx: control_tx,
            })
            .await
            .is_err()
        {
            return;
        }

        let events = events.clone();
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            let writer = tokio::spawn(write_session(write_half, control_rx));

            read_session(read_half, |message: ContainerStateMessage| {
                DaemonEvent::ContainerState { conn, message }
            }, &events)
            .await;

            let _ = events.send(DaemonEvent::ContainerClosed { conn }).await;
            writer.abort();
        });
    }
}

/// Read frames until the peer closes, decoding each payload and feeding
/// the produced event into the manager.
async fn read_session<M, F>(
    mut read_half: OwnedReadHalf,
    to_event: F,
    events: &mpsc::Sender<DaemonEvent>,
) where
    M: DeserializeOwned,
    F: Fn(M) -> DaemonEvent,
{
    let mut reader = FrameReader::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };

        let payloads = match reader.push(&buf[..n]) {
            Ok(payloads) => payloads,
            Err(e) => {
                log::warn!("closing session on framing error: {e}");
                return;
            }
        };

        for payload in payloads {
            match serde_json::from_slice::<M>(&payload) {
                Ok(message) => {
                    if events.send(to_event(message)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    // a malformed payload is dropped, the session stays
                    log::warn!("Error on receiving malformed message \"{e}\"");
                }
            }
        }
    }
}

/// Drain a session's outbound channel, framing and writing each message.
async fn write_session<M: Serialize>(
    mut write_half: OwnedWriteHalf,
    mut replies: mpsc::UnboundedReceiver<M>,
) {
    while let Some(message) = replies.recv().await {
        let bytes = match frame::encode_message(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("cannot encode message: {e}");
                continue;
            }
        };
        if write_half.write_all(&bytes).await.is_err() {
            return;
        }
    }
}

/// Open a TCP connection and return its session halves (used by the
/// in-container agent to dial the daemon).
pub async fn connect(
    addr: &str,
    port: u16,
) -> std::io::Result<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = TcpStream::connect((addr, port)).await?;
    Ok(stream.into_split())
}
