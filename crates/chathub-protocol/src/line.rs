//! The line-delimited text control protocol.
//!
//! Every message is one LF-terminated UTF-8 line. A line splits on its
//! *first* `:` into a command and a payload; the payload is not escaped
//! and may itself contain colons (e.g. `MSG:alice:hi:there`), which is
//! why handlers that need a second field split the payload themselves.

/// Client → server commands.
pub mod cmd {
    pub const REGISTER: &str = "REGISTER";
    pub const LOGIN: &str = "LOGIN";
    pub const MSG: &str = "MSG";
    pub const TYPING: &str = "TYPING";
    pub const PING: &str = "PING";
    pub const CREATE_CHANNEL: &str = "CREATE_CHANNEL";
    pub const DELETE_CHANNEL: &str = "DELETE_CHANNEL";
    pub const JOIN_CHANNEL: &str = "JOIN_CHANNEL";
    pub const LEAVE_CHANNEL: &str = "LEAVE_CHANNEL";
}

/// Server → client responses and events.
pub mod evt {
    pub const REG_OK: &str = "REG_OK";
    pub const REG_FAIL: &str = "REG_FAIL";
    pub const AUTH_OK: &str = "AUTH_OK";
    pub const AUTH_FAIL: &str = "AUTH_FAIL";
    pub const MSG: &str = "MSG";
    pub const TYPING: &str = "TYPING";
    pub const PONG: &str = "PONG";
    pub const USERLIST: &str = "USERLIST";
    pub const CHANNEL_LIST: &str = "CHANNEL_LIST";
    pub const CHANNEL_USERS: &str = "CHANNEL_USERS";
    pub const CHANNEL_CREATED: &str = "CHANNEL_CREATED";
    pub const CHANNEL_DELETED: &str = "CHANNEL_DELETED";
    pub const CHANNEL_DELETE_FAIL: &str = "CHANNEL_DELETE_FAIL";
    pub const USER_JOINED_CHANNEL: &str = "USER_JOINED_CHANNEL";
    pub const USER_LEFT_CHANNEL: &str = "USER_LEFT_CHANNEL";
    pub const SYSTEM: &str = "SYSTEM";
}

/// Split one trimmed line into `(command, payload)`.
///
/// `payload` is empty if the line has no `:`. No validation of either
/// half is performed here — that is the caller's job.
pub fn parse_command(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((cmd, payload)) => (cmd, payload),
        None => (line, ""),
    }
}

/// Render a command/event name and payload into a wire line (without the
/// trailing `\n` — callers append that when writing to the socket).
pub fn render(command: &str, payload: &str) -> String {
    if payload.is_empty() {
        command.to_string()
    } else {
        format!("{command}:{payload}")
    }
}
