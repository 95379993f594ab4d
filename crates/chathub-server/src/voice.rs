//! The voice data-plane connection handler.
//!
//! Unlike the text plane there is no command set here: one handshake
//! (the claimed username, unframed) followed by a stream of
//! length-prefixed frames that are forwarded byte-for-byte to every
//! other voice socket sharing the sender's channel. The server never
//! looks past the frame header.

use std::sync::Arc;

use bytes::BytesMut;
use chathub_protocol::frame::try_extract_frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::settings::ServerSettings;
use crate::state::{ConnId, ServerState};

const READ_CHUNK: usize = 8192;

pub async fn handle_connection(
    mut stream: TcpStream,
    state: Arc<ServerState>,
    settings: Arc<ServerSettings>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to set TCP_NODELAY on voice connection: {}", e);
    }

    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());

    let mut handshake_buf = vec![0u8; settings.max_voice_handshake];
    let username = match stream.read(&mut handshake_buf).await {
        Ok(0) | Err(_) => {
            info!(peer = %peer, "voice connection closed before handshake");
            return;
        }
        Ok(n) => String::from_utf8_lossy(&handshake_buf[..n]).trim().to_string(),
    };

    info!(peer = %peer, username = %username, "voice connection established");

    let conn_id = state.next_conn_id();
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    state.add_voice(conn_id, &username, tx);

    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    'read: loop {
        match read_half.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(username = %username, "voice read error: {}", e);
                break;
            }
        }

        loop {
            match try_extract_frame(&mut buf, settings.max_voice_frame) {
                Ok(Some(frame)) => forward_frame(&state, conn_id, &frame),
                Ok(None) => break,
                Err(e) => {
                    warn!(username = %username, "oversized voice frame, closing: {}", e);
                    break 'read;
                }
            }
        }
    }

    state.remove_voice(conn_id);
    writer_handle.abort();
    info!(peer = %peer, username = %username, "voice connection closed");
}

/// Forward one already-framed voice packet to every other voice socket
/// sharing the sender's channel. Per-recipient send failures are
/// swallowed — the failing peer's own read loop will clean it up.
fn forward_frame(state: &ServerState, sender: ConnId, frame: &[u8]) {
    let Some(channel) = state.voice_channel_of(sender) else {
        return;
    };

    for (id, tx) in state.voice_senders_in_channel(&channel) {
        if id != sender {
            let _ = tx.send(frame.to_vec());
        }
    }
}
