//! The live, in-memory connection registry.
//!
//! This is the one place that knows how a username, a text socket, a
//! voice socket and a channel relate to each other right now. Every
//! mutation goes through a method here; nothing outside this module
//! reaches into a connection record directly. No method here performs
//! I/O — callers snapshot sender handles and do the actual write after
//! the call returns.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Opaque handle for one accepted connection, assigned at accept time.
/// Carries no meaning beyond identity and map-key ordering.
pub type ConnId = u64;

struct TextConn {
    username: Option<String>,
    channel: Option<String>,
    tx: mpsc::UnboundedSender<String>,
}

struct VoiceConn {
    username: Option<String>,
    /// Cached copy of the paired text connection's channel. Kept in sync
    /// by `set_channel`; never written directly by the voice handler.
    channel: Option<String>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// All live text and voice connections, keyed by connection id.
pub struct ServerState {
    next_conn_id: AtomicU64,
    text: DashMap<ConnId, TextConn>,
    voice: DashMap<ConnId, VoiceConn>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            next_conn_id: AtomicU64::new(1),
            text: DashMap::new(),
            voice: DashMap::new(),
        }
    }

    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a newly authenticated text connection. Starts with no
    /// channel.
    pub fn add_text(&self, id: ConnId, username: &str, tx: mpsc::UnboundedSender<String>) {
        self.text.insert(
            id,
            TextConn {
                username: Some(username.to_string()),
                channel: None,
                tx,
            },
        );
    }

    /// Remove a text connection, returning its username and last channel
    /// (if any) so the caller can run the disconnect broadcast.
    pub fn remove_text(&self, id: ConnId) -> Option<(String, Option<String>)> {
        let (_, conn) = self.text.remove(&id)?;
        Some((conn.username.unwrap_or_default(), conn.channel))
    }

    /// Set a text connection's channel (`None` to leave), cascading the
    /// change to the voice connection sharing the same username, if any.
    pub fn set_channel(&self, id: ConnId, channel: Option<String>) {
        let username = match self.text.get_mut(&id) {
            Some(mut entry) => {
                entry.channel = channel.clone();
                entry.username.clone()
            }
            None => return,
        };

        let Some(name) = username else { return };
        for mut voice in self.voice.iter_mut() {
            if voice.username.as_deref() == Some(name.as_str()) {
                voice.channel = channel.clone();
            }
        }
    }

    /// Register a voice connection under its handshake-declared username.
    /// If a text connection for that username already has a channel, the
    /// voice connection inherits it immediately.
    pub fn add_voice(&self, id: ConnId, username: &str, tx: mpsc::UnboundedSender<Vec<u8>>) {
        let channel = self.channel_of_username(username);
        self.voice.insert(
            id,
            VoiceConn {
                username: Some(username.to_string()),
                channel,
                tx,
            },
        );
    }

    pub fn remove_voice(&self, id: ConnId) {
        self.voice.remove(&id);
    }

    pub fn voice_channel_of(&self, id: ConnId) -> Option<String> {
        self.voice.get(&id).and_then(|e| e.channel.clone())
    }

    pub fn username_online(&self, name: &str) -> bool {
        self.text.iter().any(|e| e.username.as_deref() == Some(name))
    }

    pub fn username_of(&self, id: ConnId) -> Option<String> {
        self.text.get(&id).and_then(|e| e.username.clone())
    }

    pub fn channel_of(&self, id: ConnId) -> Option<String> {
        self.text.get(&id).and_then(|e| e.channel.clone())
    }

    fn channel_of_username(&self, name: &str) -> Option<String> {
        self.text
            .iter()
            .find(|e| e.username.as_deref() == Some(name))
            .and_then(|e| e.channel.clone())
    }

    pub fn users_in_channel(&self, channel: &str) -> Vec<String> {
        self.text
            .iter()
            .filter(|e| e.channel.as_deref() == Some(channel))
            .filter_map(|e| e.username.clone())
            .collect()
    }

    /// Senders for every text connection currently in `channel`, paired
    /// with their connection id so a caller can exclude the sender.
    pub fn text_senders_in_channel(&self, channel: &str) -> Vec<(ConnId, mpsc::UnboundedSender<String>)> {
        self.text
            .iter()
            .filter(|e| e.channel.as_deref() == Some(channel))
            .map(|e| (*e.key(), e.tx.clone()))
            .collect()
    }

    pub fn voice_senders_in_channel(
        &self,
        channel: &str,
    ) -> Vec<(ConnId, mpsc::UnboundedSender<Vec<u8>>)> {
        self.voice
            .iter()
            .filter(|e| e.channel.as_deref() == Some(channel))
            .map(|e| (*e.key(), e.tx.clone()))
            .collect()
    }

    pub fn all_usernames(&self) -> Vec<String> {
        self.text.iter().filter_map(|e| e.username.clone()).collect()
    }

    pub fn all_text_senders(&self) -> Vec<(ConnId, mpsc::UnboundedSender<String>)> {
        self.text.iter().map(|e| (*e.key(), e.tx.clone())).collect()
    }

    /// Move every text (and paired voice) connection out of `channel`.
    /// Used when the channel itself is deleted.
    pub fn clear_channel(&self, channel: &str) {
        let mut affected = Vec::new();
        for mut entry in self.text.iter_mut() {
            if entry.channel.as_deref() == Some(channel) {
                entry.channel = None;
                if let Some(name) = &entry.username {
                    affected.push(name.clone());
                }
            }
        }
        if affected.is_empty() {
            return;
        }
        for mut voice in self.voice.iter_mut() {
            if let Some(name) = &voice.username {
                if affected.contains(name) {
                    voice.channel = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_tx() -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    fn voice_tx() -> (
        mpsc::UnboundedSender<Vec<u8>>,
        mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn conn_ids_are_distinct_and_increasing() {
        let state = ServerState::new();
        let a = state.next_conn_id();
        let b = state.next_conn_id();
        let c = state.next_conn_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn add_and_remove_text_roundtrip() {
        let state = ServerState::new();
        let id = state.next_conn_id();
        let (tx, _rx) = text_tx();
        state.add_text(id, "alice", tx);

        assert!(state.username_online("alice"));
        assert_eq!(state.username_of(id), Some("alice".to_string()));
        assert_eq!(state.channel_of(id), None);

        let (name, channel) = state.remove_text(id).unwrap();
        assert_eq!(name, "alice");
        assert_eq!(channel, None);
        assert!(!state.username_online("alice"));
    }

    #[test]
    fn set_channel_updates_membership() {
        let state = ServerState::new();
        let id = state.next_conn_id();
        let (tx, _rx) = text_tx();
        state.add_text(id, "alice", tx);

        state.set_channel(id, Some("General".to_string()));
        assert_eq!(state.channel_of(id), Some("General".to_string()));
        assert_eq!(state.users_in_channel("General"), vec!["alice".to_string()]);

        state.set_channel(id, None);
        assert_eq!(state.channel_of(id), None);
        assert!(state.users_in_channel("General").is_empty());
    }

    #[test]
    fn set_channel_cascades_to_paired_voice_connection() {
        let state = ServerState::new();
        let text_id = state.next_conn_id();
        let (text_tx_handle, _rx1) = text_tx();
        state.add_text(text_id, "bob", text_tx_handle);

        let voice_id = state.next_conn_id();
        let (voice_tx_handle, _rx2) = voice_tx();
        state.add_voice(voice_id, "bob", voice_tx_handle);

        state.set_channel(text_id, Some("Dev".to_string()));
        let ids: Vec<ConnId> = state
            .voice_senders_in_channel("Dev")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![voice_id]);
    }

    #[test]
    fn voice_before_text_inherits_nothing_until_channel_set() {
        let state = ServerState::new();
        let voice_id = state.next_conn_id();
        let (voice_tx_handle, _rx) = voice_tx();
        state.add_voice(voice_id, "carol", voice_tx_handle);

        assert!(state.voice_senders_in_channel("General").is_empty());
    }

    #[test]
    fn voice_after_text_inherits_existing_channel() {
        let state = ServerState::new();
        let text_id = state.next_conn_id();
        let (text_tx_handle, _rx1) = text_tx();
        state.add_text(text_id, "dave", text_tx_handle);
        state.set_channel(text_id, Some("General".to_string()));

        let voice_id = state.next_conn_id();
        let (voice_tx_handle, _rx2) = voice_tx();
        state.add_voice(voice_id, "dave", voice_tx_handle);

        let ids: Vec<ConnId> = state
            .voice_senders_in_channel("General")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![voice_id]);
    }

    #[test]
    fn clear_channel_moves_every_member_to_null() {
        let state = ServerState::new();

        let alice = state.next_conn_id();
        let (tx1, _r1) = text_tx();
        state.add_text(alice, "alice", tx1);
        state.set_channel(alice, Some("Dev".to_string()));

        let bob = state.next_conn_id();
        let (tx2, _r2) = text_tx();
        state.add_text(bob, "bob", tx2);
        state.set_channel(bob, Some("Dev".to_string()));

        let bob_voice = state.next_conn_id();
        let (vtx, _vr) = voice_tx();
        state.add_voice(bob_voice, "bob", vtx);

        state.clear_channel("Dev");

        assert_eq!(state.channel_of(alice), None);
        assert_eq!(state.channel_of(bob), None);
        assert!(state.voice_senders_in_channel("Dev").is_empty());
    }

    #[test]
    fn text_senders_in_channel_excludes_other_channels() {
        let state = ServerState::new();

        let alice = state.next_conn_id();
        let (tx1, _r1) = text_tx();
        state.add_text(alice, "alice", tx1);
        state.set_channel(alice, Some("General".to_string()));

        let carol = state.next_conn_id();
        let (tx2, _r2) = text_tx();
        state.add_text(carol, "carol", tx2);
        state.set_channel(carol, Some("Dev".to_string()));

        let ids: Vec<ConnId> = state
            .text_senders_in_channel("General")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![alice]);
    }

    #[test]
    fn all_usernames_reflects_registered_text_connections() {
        let state = ServerState::new();
        let a = state.next_conn_id();
        let (tx1, _r1) = text_tx();
        state.add_text(a, "alice", tx1);
        let b = state.next_conn_id();
        let (tx2, _r2) = text_tx();
        state.add_text(b, "bob", tx2);

        let mut names = state.all_usernames();
        names.sort();
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn voice_channel_of_tracks_cascaded_channel() {
        let state = ServerState::new();
        let text_id = state.next_conn_id();
        let (text_tx_handle, _r1) = text_tx();
        state.add_text(text_id, "frank", text_tx_handle);

        let voice_id = state.next_conn_id();
        let (voice_tx_handle, _r2) = voice_tx();
        state.add_voice(voice_id, "frank", voice_tx_handle);
        assert_eq!(state.voice_channel_of(voice_id), None);

        state.set_channel(text_id, Some("General".to_string()));
        assert_eq!(state.voice_channel_of(voice_id), Some("General".to_string()));
    }

    #[test]
    fn remove_voice_is_idempotent() {
        let state = ServerState::new();
        let id = state.next_conn_id();
        let (tx, _rx) = voice_tx();
        state.add_voice(id, "eve", tx);
        state.remove_voice(id);
        state.remove_voice(id);
        assert!(state.voice_senders_in_channel("General").is_empty());
    }
}
