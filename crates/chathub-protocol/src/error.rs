use thiserror::Error;

/// Errors raised while framing or parsing protocol data.
///
/// These never reach a client verbatim — the text handler renders the
/// short, client-facing reason strings the protocol defines; this type
/// exists so internal call sites can match on a cause instead of
/// re-parsing a string.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("voice frame too large: {0} bytes (max {1})")]
    FrameTooLarge(u32, u32),

    #[error("voice frame truncated: expected at least {expected} bytes, got {got}")]
    FrameTruncated { expected: usize, got: usize },

    #[error("voice frame nickname is not valid UTF-8")]
    InvalidNickname,

    #[error("unknown codec id: 0x{0:02x}")]
    UnknownCodec(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
