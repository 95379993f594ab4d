//! The voice data-plane frame format.
//!
//! ```text
//! offset  size  field
//! 0       4     total_payload_length  (big-endian u32, excludes this header)
//! 4       2     nickname_length       (big-endian u16)
//! 6       N     nickname              (UTF-8)
//! 6+N     1     codec_id              (0x00 raw PCM, 0x01 Opus)
//! 7+N     2     audio_length          (big-endian u16)
//! 9+N     M     audio_payload         (opaque)
//! ```
//!
//! The server only ever needs the length header to know how many bytes
//! to read and forward; it never parses past that. The nickname/codec
//! parsing in this module exists for clients and for tests.

use bytes::BytesMut;

use crate::error::ProtocolError;

/// Largest accepted `total_payload_length`. A frame announcing a larger
/// value is rejected before the server reads another byte of it.
pub const MAX_PAYLOAD_LEN: u32 = 65_536;

/// Known codec identifiers. Any other byte is still forwarded
/// byte-for-byte by the server — the codec id is opaque to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodecId {
    RawPcm = 0x00,
    Opus = 0x01,
}

impl CodecId {
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x00 => Ok(Self::RawPcm),
            0x01 => Ok(Self::Opus),
            other => Err(ProtocolError::UnknownCodec(other)),
        }
    }
}

/// Build a complete wire frame (length header included) from its parts.
pub fn encode_frame(nickname: &str, codec_id: u8, audio: &[u8]) -> Vec<u8> {
    let nick_bytes = nickname.as_bytes();
    let total_payload_len = 2 + nick_bytes.len() + 1 + 2 + audio.len();

    let mut buf = Vec::with_capacity(4 + total_payload_len);
    buf.extend_from_slice(&(total_payload_len as u32).to_be_bytes());
    buf.extend_from_slice(&(nick_bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(nick_bytes);
    buf.push(codec_id);
    buf.extend_from_slice(&(audio.len() as u16).to_be_bytes());
    buf.extend_from_slice(audio);
    buf
}

/// Parse a complete wire frame (length header included) into its parts.
pub fn decode_frame(data: &[u8]) -> Result<(String, u8, Vec<u8>), ProtocolError> {
    if data.len() < 6 {
        return Err(ProtocolError::FrameTruncated {
            expected: 6,
            got: data.len(),
        });
    }

    let total_payload_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < 4 + total_payload_len {
        return Err(ProtocolError::FrameTruncated {
            expected: 4 + total_payload_len,
            got: data.len(),
        });
    }

    let nick_len = u16::from_be_bytes([data[4], data[5]]) as usize;
    let nick_start = 6;
    let nick_end = nick_start + nick_len;
    if data.len() < nick_end + 3 {
        return Err(ProtocolError::FrameTruncated {
            expected: nick_end + 3,
            got: data.len(),
        });
    }

    let nickname = std::str::from_utf8(&data[nick_start..nick_end])
        .map_err(|_| ProtocolError::InvalidNickname)?
        .to_string();

    let codec_id = data[nick_end];
    let audio_len_start = nick_end + 1;
    let audio_len =
        u16::from_be_bytes([data[audio_len_start], data[audio_len_start + 1]]) as usize;
    let audio_start = audio_len_start + 2;
    let audio_end = audio_start + audio_len;

    if data.len() < audio_end {
        return Err(ProtocolError::FrameTruncated {
            expected: audio_end,
            got: data.len(),
        });
    }

    Ok((nickname, codec_id, data[audio_start..audio_end].to_vec()))
}

/// Attempt to extract one complete length-prefixed voice frame (header
/// included) from a byte buffer accumulated off the wire.
///
/// `max_payload_len` is the caller's configured ceiling on
/// `total_payload_length` (see [`MAX_PAYLOAD_LEN`] for the protocol
/// default); it is not a compile-time constant so that a deployment can
/// tighten or loosen it via runtime settings.
///
/// Returns `Ok(Some(frame))` if a full frame is present — the buffer is
/// advanced past it — `Ok(None)` if more bytes are needed, or `Err` if
/// the declared length exceeds `max_payload_len`.
pub fn try_extract_frame(
    buf: &mut BytesMut,
    max_payload_len: u32,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    let total_payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if total_payload_len > max_payload_len {
        return Err(ProtocolError::FrameTooLarge(total_payload_len, max_payload_len));
    }

    let frame_len = 4 + total_payload_len as usize;
    if buf.len() < frame_len {
        return Ok(None);
    }

    Ok(Some(buf.split_to(frame_len).to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_frame() {
        let audio = vec![1u8, 2, 3, 4, 5];
        let encoded = encode_frame("alice", CodecId::Opus as u8, &audio);
        let (nick, codec, decoded_audio) = decode_frame(&encoded).unwrap();
        assert_eq!(nick, "alice");
        assert_eq!(codec, CodecId::Opus as u8);
        assert_eq!(decoded_audio, audio);
    }

    #[test]
    fn roundtrip_empty_audio() {
        let encoded = encode_frame("bob", CodecId::RawPcm as u8, &[]);
        let (nick, codec, audio) = decode_frame(&encoded).unwrap();
        assert_eq!(nick, "bob");
        assert_eq!(codec, CodecId::RawPcm as u8);
        assert!(audio.is_empty());
    }

    #[test]
    fn roundtrip_max_sizes() {
        let nickname: String = "n".repeat(65_535);
        let audio = vec![0xAB; 65_529];
        let encoded = encode_frame(&nickname, 0x01, &audio);
        let (nick, codec, decoded_audio) = decode_frame(&encoded).unwrap();
        assert_eq!(nick.len(), 65_535);
        assert_eq!(codec, 0x01);
        assert_eq!(decoded_audio.len(), 65_529);
    }

    #[test]
    fn unknown_codec_byte_is_preserved_not_rejected() {
        let encoded = encode_frame("carol", 0x42, &[9, 9]);
        let (_, codec, _) = decode_frame(&encoded).unwrap();
        assert_eq!(codec, 0x42);
    }

    #[test]
    fn codec_id_from_byte() {
        assert_eq!(CodecId::from_byte(0x00).unwrap(), CodecId::RawPcm);
        assert_eq!(CodecId::from_byte(0x01).unwrap(), CodecId::Opus);
        assert!(CodecId::from_byte(0xFF).is_err());
    }

    #[test]
    fn extract_needs_more_data() {
        let encoded = encode_frame("dave", 0x00, &[1, 2, 3]);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encoded[..5]);
        assert!(try_extract_frame(&mut buf, MAX_PAYLOAD_LEN).unwrap().is_none());

        buf.extend_from_slice(&encoded[5..]);
        let frame = try_extract_frame(&mut buf, MAX_PAYLOAD_LEN).unwrap().unwrap();
        assert_eq!(frame, encoded);
        assert!(buf.is_empty());
    }

    #[test]
    fn extract_rejects_oversized_declared_length() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&(MAX_PAYLOAD_LEN + 1).to_be_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        let result = try_extract_frame(&mut buf, MAX_PAYLOAD_LEN);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge(_, _))));
    }

    #[test]
    fn extract_accepts_boundary_length() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&MAX_PAYLOAD_LEN.to_be_bytes());
        buf.extend_from_slice(&vec![0u8; MAX_PAYLOAD_LEN as usize]);
        let frame = try_extract_frame(&mut buf, MAX_PAYLOAD_LEN).unwrap().unwrap();
        assert_eq!(frame.len(), 4 + MAX_PAYLOAD_LEN as usize);
    }

    #[test]
    fn extract_honors_custom_max_payload_len() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&1_000u32.to_be_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        let result = try_extract_frame(&mut buf, 512);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge(1_000, 512))));
    }

    #[test]
    fn extract_multiple_frames_back_to_back() {
        let f1 = encode_frame("a", 0x00, &[1]);
        let f2 = encode_frame("b", 0x01, &[2, 2]);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&f1);
        buf.extend_from_slice(&f2);

        let out1 = try_extract_frame(&mut buf, MAX_PAYLOAD_LEN).unwrap().unwrap();
        let out2 = try_extract_frame(&mut buf, MAX_PAYLOAD_LEN).unwrap().unwrap();
        assert_eq!(out1, f1);
        assert_eq!(out2, f2);
        assert!(buf.is_empty());
    }
}
