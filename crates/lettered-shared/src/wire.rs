//! Wire format shared by the transport client and server.
//!
//! Each connection carries exactly one frame: a big-endian `u16` header
//! length, the serialized header record, then the raw body bytes. The
//! header names the event being invoked; the body is opaque at this layer
//! and only interpreted by the typed handler behind the event registry.
//! Records are JSON so that fields can be added without breaking older
//! peers; unknown fields are ignored on decode.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

pub const EVENT_PING: &str = "PING";
pub const EVENT_FRIEND_INVITE: &str = "FRIEND_INVITE";

const MAX_HEADER_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct FrameHeader {
    event: String,
}

/// Serialize one request/response frame.
pub fn encode_frame(event: &str, body: &[u8]) -> Result<Vec<u8>, FrameError> {
    let header = serde_json::to_vec(&FrameHeader {
        event: event.to_string(),
    })?;
    if header.len() > MAX_HEADER_LEN {
        return Err(FrameError::HeaderTooLong(header.len()));
    }

    let mut frame = Vec::with_capacity(2 + header.len() + body.len());
    frame.extend_from_slice(&(header.len() as u16).to_be_bytes());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Split a received frame into its event name and body bytes.
///
/// The body is returned unvalidated; whether it deserializes into the
/// event's request type is the typed handler's concern.
pub fn decode_frame(bytes: &[u8]) -> Result<(String, &[u8]), FrameError> {
    if bytes.len() < 2 {
        return Err(FrameError::ShortHeader);
    }
    let hdr_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    if bytes.len() < 2 + hdr_len {
        return Err(FrameError::ShortHeader);
    }

    let header: FrameHeader = serde_json::from_slice(&bytes[2..2 + hdr_len])?;
    Ok((header.event, &bytes[2 + hdr_len..]))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PingRequest {
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PingResponse {
    pub message: String,
}

/// Body of a `FRIEND_INVITE` request. The hostname tells the receiving
/// peer how to reach the sender later; the alias is the sender's display
/// name, stored if the friendship closes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FriendInviteRequest {
    pub hostname: String,
    pub alias: String,
}

/// Body of a `FRIEND_INVITE` response. `accepted` is true when the
/// receiver was already a friend or had itself invited the sender.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FriendInviteResponse {
    pub accepted: bool,
    pub alias: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let body = br#"{"hostname":"example.com:1926","alias":"Al"}"#;
        let frame = encode_frame(EVENT_FRIEND_INVITE, body).unwrap();

        let (event, decoded_body) = decode_frame(&frame).unwrap();
        assert_eq!(event, EVENT_FRIEND_INVITE);
        assert_eq!(decoded_body, body);
    }

    #[test]
    fn frame_round_trip_empty_body() {
        let frame = encode_frame(EVENT_PING, b"").unwrap();
        let (event, body) = decode_frame(&frame).unwrap();
        assert_eq!(event, EVENT_PING);
        assert!(body.is_empty());
    }

    #[test]
    fn rejects_truncated_prefix() {
        assert!(matches!(decode_frame(&[]), Err(FrameError::ShortHeader)));
        assert!(matches!(decode_frame(&[0x00]), Err(FrameError::ShortHeader)));
    }

    #[test]
    fn rejects_header_longer_than_frame() {
        // Declares a 300-byte header but carries only 4 bytes after the
        // prefix.
        let mut frame = vec![0x01, 0x2c];
        frame.extend_from_slice(b"abcd");
        assert!(matches!(
            decode_frame(&frame),
            Err(FrameError::ShortHeader)
        ));
    }

    #[test]
    fn rejects_garbage_header() {
        let mut frame = vec![0x00, 0x04];
        frame.extend_from_slice(b"\xff\xfe\x00\x01body");
        assert!(matches!(decode_frame(&frame), Err(FrameError::Malformed(_))));
    }

    #[test]
    fn decode_never_panics_on_arbitrary_input() {
        // A cheap deterministic byte-mangler standing in for a fuzzer.
        let mut state = 0x2545f491u32;
        for len in 0..128usize {
            let mut input = Vec::with_capacity(len);
            for _ in 0..len {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                input.push((state >> 16) as u8);
            }
            let _ = decode_frame(&input);
        }
    }

    #[test]
    fn header_tolerates_unknown_fields() {
        let header = br#"{"event":"PING","nonce":"abc123"}"#;
        let mut frame = (header.len() as u16).to_be_bytes().to_vec();
        frame.extend_from_slice(header);
        frame.extend_from_slice(b"payload");

        let (event, body) = decode_frame(&frame).unwrap();
        assert_eq!(event, EVENT_PING);
        assert_eq!(body, b"payload");
    }

    #[test]
    fn invite_response_defaults_when_fields_missing() {
        let res: FriendInviteResponse = serde_json::from_slice(b"{}").unwrap();
        assert!(!res.accepted);
        assert!(res.alias.is_empty());
    }
}
