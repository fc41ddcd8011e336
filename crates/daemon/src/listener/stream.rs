// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscribed connections: a one-way stream of job events.

use cb_wire::{write_frame, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::{AgentCtx, ConnectionError};

/// Write every job event to the connection until the client goes away.
pub(super) async fn stream_events<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &AgentCtx,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut events = ctx.events.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    write_frame(&mut writer, &Response::Event { event }, ctx.config.ipc_timeout).await?
                }
                Err(RecvError::Lagged(n)) => warn!(missed = n, "subscriber fell behind"),
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = detect_client_disconnect(&mut reader) => {
                debug!("subscriber disconnected");
                return Ok(());
            }
        }
    }
}

/// Subscribers never write after `Subscribe`, so any read completing means
/// the client closed the connection.
async fn detect_client_disconnect<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 1];
    let _ = reader.read(&mut buf).await;
}
