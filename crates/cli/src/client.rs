// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the daemon's control socket.

use crate::exit_error::ExitError;
use anyhow::Result;
use std::path::Path;
use tend_daemon::{Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{
    unix::{OwnedReadHalf, OwnedWriteHalf},
    UnixStream,
};
use tokio::sync::Mutex;

pub struct DaemonClient {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
}

impl DaemonClient {
    pub async fn connect(socket: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket).await.map_err(|err| {
            ExitError::new(
                1,
                format!("cannot connect to {} ({err}); is tendd running?", socket.display()),
            )
        })?;
        let (reader, writer) = stream.into_split();
        Ok(Self { reader: Mutex::new(BufReader::new(reader)), writer: Mutex::new(writer) })
    }

    /// Send one request and wait for its reply line.
    pub async fn request(&self, request: Request) -> Result<Response> {
        let mut payload = serde_json::to_string(&request)?;
        payload.push('\n');
        self.writer.lock().await.write_all(payload.as_bytes()).await?;

        let mut line = String::new();
        let read = self.reader.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Err(ExitError::new(1, "daemon closed the connection").into());
        }
        Ok(serde_json::from_str(&line)?)
    }
}
