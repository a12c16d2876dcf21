// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the control socket.
//!
//! Accepts connections and handles them without blocking the main
//! loop: each parsed request is forwarded through the supervisor's
//! control channel and the reply written back as one JSON line.

use crate::protocol::{ProtocolError, Request, Response};
use crate::supervisor::ControlRequest;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

pub struct Listener {
    listener: UnixListener,
    control_tx: mpsc::Sender<ControlRequest>,
}

impl Listener {
    /// Bind the control socket, replacing any stale socket file.
    pub fn bind(path: &Path, control_tx: mpsc::Sender<ControlRequest>) -> std::io::Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        Ok(Self { listener, control_tx })
    }

    /// Accept connections until the process exits.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let control_tx = self.control_tx.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, control_tx).await {
                            debug!(%err, "connection closed");
                        }
                    });
                }
                Err(err) => error!(%err, "accept error"),
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    control_tx: mpsc::Sender<ControlRequest>,
) -> Result<(), ProtocolError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(request, &control_tx).await?,
            Err(err) => Response::Error { message: format!("malformed request: {err}") },
        };
        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
    }
    Ok(())
}

/// Forward a request into the main loop and wait for its reply.
async fn dispatch(
    request: Request,
    control_tx: &mpsc::Sender<ControlRequest>,
) -> Result<Response, ProtocolError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    control_tx
        .send(ControlRequest { request, reply: reply_tx })
        .await
        .map_err(|_| ProtocolError::Disconnected)?;
    reply_rx.await.map_err(|_| ProtocolError::Disconnected)
}
