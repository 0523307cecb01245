//! Wire payload decoding
//!
//! The message body is a JSON object with two integer fields, `brightness` and
//! `color`. Missing or unknown fields are tolerated; out-of-range values are
//! clamped into `0..=100` rather than rejected.

use super::payload::CommandPayload;
use serde::Deserialize;
use thiserror::Error;

/// Malformed message body
#[derive(Debug, Error)]
#[error("Failed to decode command payload: {source}")]
pub struct DecodeError {
    #[from]
    source: serde_json::Error,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WirePayload {
    brightness: i64,
    color: i64,
}

/// Decode a raw message body into a clamped command (pure function)
pub fn decode(raw: &[u8]) -> Result<CommandPayload, DecodeError> {
    let wire: WirePayload = serde_json::from_slice(raw)?;
    Ok(CommandPayload::new(wire.brightness, wire.color))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_payload() {
        let payload = decode(br#"{"brightness":60,"color":40}"#).unwrap();
        assert_eq!(payload.brightness().value(), 60);
        assert_eq!(payload.color().value(), 40);
    }

    #[test]
    fn test_decode_empty_object_defaults_to_zero() {
        let payload = decode(b"{}").unwrap();
        assert_eq!(payload, CommandPayload::new(0, 0));
    }

    #[test]
    fn test_decode_missing_field() {
        let payload = decode(br#"{"brightness":75}"#).unwrap();
        assert_eq!(payload.brightness().value(), 75);
        assert_eq!(payload.color().value(), 0);
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let payload = decode(br#"{"brightness":10,"lux":12000,"color":5}"#).unwrap();
        assert_eq!(payload, CommandPayload::new(10, 5));
    }

    #[test]
    fn test_decode_clamps_out_of_range() {
        let payload = decode(br#"{"brightness":-5,"color":150}"#).unwrap();
        assert_eq!(payload.brightness().value(), 0);
        assert_eq!(payload.color().value(), 100);
    }

    #[test]
    fn test_decode_malformed_input() {
        for raw in [
            &b"{not json"[..],
            &b""[..],
            &b"[1,2]"[..],
            &br#"{"brightness":"bright"}"#[..],
            &[0xff, 0xfe][..],
        ] {
            let result = decode(raw);
            assert!(result.is_err(), "expected decode error for {raw:?}");
        }
    }

    #[test]
    fn test_decode_error_message() {
        let err = decode(b"{").unwrap_err();
        assert!(err.to_string().starts_with("Failed to decode command payload"));
    }
}
