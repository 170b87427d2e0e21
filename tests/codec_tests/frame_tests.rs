//! Tests for record framing
//!
//! These tests verify:
//! - Frame layout and body offsets
//! - Signature checks (prefix, mismatch)
//! - Incremental decoding (incomplete headers, truncated bodies)
//! - Session-end marker handling
//! - Logger name sanitizing

use harnesslog::codec::{
    check_signature, decode_frame, decode_logger_names, encode_frame, encode_logger_name,
    sanitize_logger_name, Decoded, DecodedFrame, MAX_LOGGER_NAME_LEN, SESSION_END, SIGNATURE,
};
use harnesslog::model::level;
use harnesslog::LogError;

// =============================================================================
// Helper Functions
// =============================================================================

fn decode_one(buf: &[u8]) -> DecodedFrame {
    match decode_frame(buf).unwrap() {
        Decoded::Frame(frame) => frame,
        other => panic!("expected a frame, got {:?}", other),
    }
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encode_layout() {
    let frame = encode_frame("app.Net", level::INFO, 42, "hello");

    assert_eq!(&frame.bytes[..], b"app.Net\n800\n42\n5\nhello\n");
    assert_eq!(frame.body_offset, 17);
    assert_eq!(frame.body_len, 5);
}

#[test]
fn test_encode_empty_message() {
    let frame = encode_frame("a", level::FINE, 0, "");

    assert_eq!(&frame.bytes[..], b"a\n500\n0\n0\n\n");
    assert_eq!(frame.body_len, 0);
}

#[test]
fn test_encode_multiline_message_keeps_newlines() {
    let frame = encode_frame("a", level::SEVERE, 1, "line one\nline two");
    let decoded = decode_one(&frame.bytes);

    let body = &frame.bytes[decoded.body_start..decoded.body_end];
    assert_eq!(body, b"line one\nline two");
    assert_eq!(decoded.consumed, frame.bytes.len());
}

#[test]
fn test_encode_sanitizes_logger_name() {
    let frame = encode_frame("bad\nname\r\0x", level::INFO, 1, "m");
    let decoded = decode_one(&frame.bytes);

    assert_eq!(decoded.logger_name, "bad name  x");
}

#[test]
fn test_sanitize_borrows_clean_names() {
    assert!(matches!(
        sanitize_logger_name("org.example.Clean"),
        std::borrow::Cow::Borrowed(_)
    ));
    assert_eq!(sanitize_logger_name("a\nb"), "a b");
}

#[test]
fn test_long_logger_name_agrees_with_index() {
    // 'é' is two bytes, so the limit falls in the middle of one
    let name = format!("x{}", "é".repeat(40_000));
    let sanitized = sanitize_logger_name(&name);
    assert_eq!(sanitized.len(), MAX_LOGGER_NAME_LEN);

    let frame = encode_frame(&name, level::INFO, 1, "m");
    let decoded = decode_one(&frame.bytes);
    let indexed = decode_logger_names(&encode_logger_name(&name));

    assert_eq!(decoded.logger_name, sanitized);
    assert_eq!(indexed, vec![decoded.logger_name]);
}

// =============================================================================
// Decoding Tests
// =============================================================================

#[test]
fn test_decode_offsets_match_encoding() {
    let frame = encode_frame("org.example.Tiles", level::WARNING, 1_700_000_000_123, "tile missing");
    let decoded = decode_one(&frame.bytes);

    assert_eq!(decoded.logger_name, "org.example.Tiles");
    assert_eq!(decoded.severity, level::WARNING);
    assert_eq!(decoded.timestamp_millis, 1_700_000_000_123);
    assert_eq!(decoded.body_start as u64, frame.body_offset);
    assert_eq!((decoded.body_end - decoded.body_start) as u64, frame.body_len);
    assert_eq!(frame.bytes[decoded.body_end], b'\n');
    assert_eq!(decoded.consumed, frame.bytes.len());
}

#[test]
fn test_decode_consecutive_frames() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&encode_frame("a", level::INFO, 1, "first").bytes);
    buf.extend_from_slice(&encode_frame("b", level::SEVERE, 2, "second").bytes);

    let first = decode_one(&buf);
    let second = decode_one(&buf[first.consumed..]);

    assert_eq!(&buf[first.body_start..first.body_end], b"first");
    assert_eq!(second.logger_name, "b");
    assert_eq!(
        &buf[first.consumed + second.body_start..first.consumed + second.body_end],
        b"second"
    );
    assert_eq!(first.consumed + second.consumed, buf.len());
}

#[test]
fn test_decode_incomplete_header() {
    let frame = encode_frame("a", level::INFO, 1, "message");
    // Cut inside the length line
    let cut = frame.bytes.iter().rposition(|&b| b == b'7').unwrap();

    assert_eq!(decode_frame(&frame.bytes[..cut]).unwrap(), Decoded::Incomplete);
    assert_eq!(decode_frame(b"").unwrap(), Decoded::Incomplete);
    assert_eq!(decode_frame(b"logger").unwrap(), Decoded::Incomplete);
}

#[test]
fn test_decode_truncated_body_is_format_error() {
    let frame = encode_frame("a", level::INFO, 1, "message");
    let truncated = &frame.bytes[..frame.bytes.len() - 3];

    assert!(matches!(decode_frame(truncated), Err(LogError::Format(_))));
}

#[test]
fn test_decode_missing_terminator_is_format_error() {
    let frame = encode_frame("a", level::INFO, 1, "message");
    let mut bytes = frame.bytes.to_vec();
    let last = bytes.len() - 1;
    bytes[last] = b'X';

    assert!(matches!(decode_frame(&bytes), Err(LogError::Format(_))));
}

#[test]
fn test_decode_non_numeric_field_is_format_error() {
    assert!(matches!(
        decode_frame(b"a\nloud\n1\n1\nx\n"),
        Err(LogError::Format(_))
    ));
    assert!(matches!(
        decode_frame(b"a\n800\nyesterday\n1\nx\n"),
        Err(LogError::Format(_))
    ));
    assert!(matches!(
        decode_frame(b"a\n800\n1\n-1\nx\n"),
        Err(LogError::Format(_))
    ));
}

#[test]
fn test_decode_accepts_crlf_header_lines() {
    let frame = decode_one(b"a\r\n800\r\n7\r\n2\r\nhi\n");

    assert_eq!(frame.logger_name, "a");
    assert_eq!(frame.timestamp_millis, 7);
    assert_eq!(frame.body_end - frame.body_start, 2);
}

// =============================================================================
// Session End Marker Tests
// =============================================================================

#[test]
fn test_decode_session_end_marker() {
    assert_eq!(
        decode_frame(SESSION_END).unwrap(),
        Decoded::SessionEnd { consumed: SESSION_END.len() }
    );
}

#[test]
fn test_frames_after_marker_decode() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&encode_frame("a", level::INFO, 1, "before").bytes);
    buf.extend_from_slice(SESSION_END);
    buf.extend_from_slice(&encode_frame("a", level::INFO, 2, "after").bytes);

    let mut pos = 0;
    let mut messages = Vec::new();
    while pos < buf.len() {
        match decode_frame(&buf[pos..]).unwrap() {
            Decoded::Frame(frame) => {
                messages.push(buf[pos + frame.body_start..pos + frame.body_end].to_vec());
                pos += frame.consumed;
            }
            Decoded::SessionEnd { consumed } => pos += consumed,
            Decoded::Incomplete => panic!("unexpected incomplete frame at {}", pos),
        }
    }

    assert_eq!(messages, vec![b"before".to_vec(), b"after".to_vec()]);
}

// =============================================================================
// Signature Tests
// =============================================================================

#[test]
fn test_signature_ok() {
    let mut buf = SIGNATURE.to_vec();
    buf.extend_from_slice(b"trailing data");

    assert_eq!(check_signature(&buf).unwrap(), SIGNATURE.len());
}

#[test]
fn test_signature_prefix_is_not_ready() {
    assert!(matches!(check_signature(b""), Err(LogError::NotReady)));
    assert!(matches!(
        check_signature(&SIGNATURE[..4]),
        Err(LogError::NotReady)
    ));
}

#[test]
fn test_signature_mismatch_is_format_error() {
    assert!(matches!(
        check_signature(b"NOT A HARNESS LOG\n"),
        Err(LogError::Format(_))
    ));
    assert!(matches!(check_signature(b"XY"), Err(LogError::Format(_))));
}
