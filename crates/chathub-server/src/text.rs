//! The text control-plane connection handler.
//!
//! Each accepted connection runs through two phases: an authentication
//! loop that only accepts `REGISTER`/`LOGIN` (see `authenticate`), then a
//! session loop that dispatches the command table once a username has
//! been established (see `handle_line`). Writes happen on a dedicated
//! task fed by an unbounded channel, so a slow reader never stalls
//! another connection's read loop or the registry lock.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use chathub_protocol::line::{cmd, evt, parse_command, render};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::channels::ChannelRegistry;
use crate::credentials::CredentialStore;
use crate::state::{ConnId, ServerState};

/// How long a freshly accepted connection may sit in the auth phase
/// before it's dropped for never sending a line.
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 4096;

pub async fn handle_connection(
    mut stream: TcpStream,
    state: Arc<ServerState>,
    credentials: Arc<CredentialStore>,
    channels: Arc<ChannelRegistry>,
) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    info!(peer = %peer, "new text connection");

    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let username = match tokio::time::timeout(
        AUTH_TIMEOUT,
        authenticate(&mut stream, &mut buf, &credentials, &state),
    )
    .await
    {
        Ok(Some(name)) => name,
        Ok(None) => {
            info!(peer = %peer, "connection closed during auth phase");
            return;
        }
        Err(_) => {
            warn!(peer = %peer, "auth phase timed out");
            return;
        }
    };

    let conn_id = state.next_conn_id();
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_handle = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let mut data = line.into_bytes();
            data.push(b'\n');
            if write_half.write_all(&data).await.is_err() {
                break;
            }
        }
    });

    state.add_text(conn_id, &username, tx.clone());
    info!(peer = %peer, username = %username, "session started");

    broadcast_except(
        &state,
        conn_id,
        &render(evt::SYSTEM, &format!("{username} присоединился!")),
    );
    send_userlist(&state);
    let _ = tx.send(render(evt::CHANNEL_LIST, &channels.list().join(",")));

    'session: loop {
        match read_half.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(username = %username, "text read error: {}", e);
                break;
            }
        }

        loop {
            let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line_bytes = buf.split_to(pos + 1);
            let line = match std::str::from_utf8(&line_bytes[..line_bytes.len() - 1]) {
                Ok(s) => s.trim(),
                Err(_) => {
                    warn!(username = %username, "invalid utf-8 on text connection");
                    break 'session;
                }
            };
            if line.is_empty() {
                continue;
            }
            handle_line(line, conn_id, &username, &tx, &state, &channels);
        }
    }

    let old_channel = state.remove_text(conn_id).and_then(|(_, ch)| ch);
    writer_handle.abort();

    broadcast_all(&state, &render(evt::SYSTEM, &format!("{username} покинул чат")));
    send_userlist(&state);
    if let Some(channel) = old_channel {
        send_channel_users(&state, &channel);
    }
    info!(peer = %peer, username = %username, "session ended");
}

/// Drive the auth-phase state machine. Returns the logged-in username on
/// success, or `None` if the connection closed or errored first.
async fn authenticate(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    credentials: &CredentialStore,
    state: &ServerState,
) -> Option<String> {
    loop {
        match stream.read_buf(buf).await {
            Ok(0) => return None,
            Ok(_) => {}
            Err(_) => return None,
        }

        loop {
            let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line_bytes = buf.split_to(pos + 1);
            let line = std::str::from_utf8(&line_bytes[..line_bytes.len() - 1]).ok()?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (command, payload) = parse_command(line);
            match command {
                cmd::REGISTER => {
                    let Some((name, password)) = payload.split_once(':') else {
                        write_line(stream, &render(evt::REG_FAIL, "Неверный формат")).await.ok()?;
                        continue;
                    };
                    match credentials.register(name, password) {
                        Ok(()) => write_line(stream, evt::REG_OK).await.ok()?,
                        Err(e) => {
                            write_line(stream, &render(evt::REG_FAIL, e.reason())).await.ok()?
                        }
                    }
                }
                cmd::LOGIN => {
                    let Some((name, password)) = payload.split_once(':') else {
                        write_line(stream, &render(evt::AUTH_FAIL, "Неверный формат")).await.ok()?;
                        continue;
                    };
                    if state.username_online(name) {
                        write_line(stream, &render(evt::AUTH_FAIL, "Уже в сети")).await.ok()?;
                        continue;
                    }
                    match credentials.verify(name, password) {
                        Ok(()) => {
                            write_line(stream, evt::AUTH_OK).await.ok()?;
                            return Some(name.to_string());
                        }
                        Err(e) => {
                            write_line(stream, &render(evt::AUTH_FAIL, e.reason())).await.ok()?
                        }
                    }
                }
                _ => {
                    write_line(stream, &render(evt::AUTH_FAIL, "Сначала войдите")).await.ok()?;
                }
            }
        }
    }
}

/// Dispatch one session-phase command line.
fn handle_line(
    line: &str,
    conn_id: ConnId,
    username: &str,
    tx: &mpsc::UnboundedSender<String>,
    state: &ServerState,
    channels: &ChannelRegistry,
) {
    let (command, payload) = parse_command(line);
    match command {
        cmd::MSG => {
            if let Some(channel) = state.channel_of(conn_id) {
                broadcast_channel(
                    state,
                    &channel,
                    &render(evt::MSG, &format!("{username}:{payload}")),
                    Some(conn_id),
                );
            }
        }
        cmd::TYPING => {
            if let Some(channel) = state.channel_of(conn_id) {
                broadcast_channel(state, &channel, &render(evt::TYPING, username), Some(conn_id));
            }
        }
        cmd::PING => {
            let _ = tx.send(evt::PONG.to_string());
        }
        cmd::CREATE_CHANNEL => match channels.create(payload) {
            Ok(()) => {
                broadcast_all(state, &render(evt::CHANNEL_CREATED, payload));
                broadcast_all(state, &render(evt::CHANNEL_LIST, &channels.list().join(",")));
            }
            Err(e) => {
                let _ = tx.send(render(evt::CHANNEL_DELETE_FAIL, e.reason()));
            }
        },
        cmd::DELETE_CHANNEL => match channels.delete(payload) {
            Ok(()) => {
                state.clear_channel(payload);
                broadcast_all(state, &render(evt::CHANNEL_DELETED, payload));
                broadcast_all(state, &render(evt::CHANNEL_LIST, &channels.list().join(",")));
            }
            Err(e) => {
                let _ = tx.send(render(evt::CHANNEL_DELETE_FAIL, e.reason()));
            }
        },
        cmd::JOIN_CHANNEL => {
            if !channels.exists(payload) {
                let _ = tx.send(render(evt::SYSTEM, "Канал не найден"));
                return;
            }

            if let Some(old) = state.channel_of(conn_id) {
                state.set_channel(conn_id, None);
                broadcast_all(
                    state,
                    &render(evt::USER_LEFT_CHANNEL, &format!("{username}:{old}")),
                );
                send_channel_users(state, &old);
            }

            state.set_channel(conn_id, Some(payload.to_string()));
            broadcast_all(
                state,
                &render(evt::USER_JOINED_CHANNEL, &format!("{username}:{payload}")),
            );
            send_channel_users(state, payload);
        }
        cmd::LEAVE_CHANNEL => {
            if let Some(old) = state.channel_of(conn_id) {
                state.set_channel(conn_id, None);
                broadcast_all(
                    state,
                    &render(evt::USER_LEFT_CHANNEL, &format!("{username}:{old}")),
                );
                send_channel_users(state, &old);
            }
        }
        _ => {
            let _ = tx.send(render(evt::SYSTEM, "Неизвестная команда"));
        }
    }
}

async fn write_line(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    let mut data = line.as_bytes().to_vec();
    data.push(b'\n');
    stream.write_all(&data).await
}

fn broadcast_all(state: &ServerState, line: &str) {
    for (_, tx) in state.all_text_senders() {
        let _ = tx.send(line.to_string());
    }
}

fn broadcast_except(state: &ServerState, exclude: ConnId, line: &str) {
    for (id, tx) in state.all_text_senders() {
        if id != exclude {
            let _ = tx.send(line.to_string());
        }
    }
}

fn broadcast_channel(state: &ServerState, channel: &str, line: &str, exclude: Option<ConnId>) {
    for (id, tx) in state.text_senders_in_channel(channel) {
        if Some(id) != exclude {
            let _ = tx.send(line.to_string());
        }
    }
}

fn send_userlist(state: &ServerState) {
    broadcast_all(state, &render(evt::USERLIST, &state.all_usernames().join(",")));
}

fn send_channel_users(state: &ServerState, channel: &str) {
    let users = state.users_in_channel(channel).join(",");
    broadcast_all(state, &render(evt::CHANNEL_USERS, &format!("{channel}:{users}")));
}
