//! Record framing
//!
//! Encodes one record into its line-oriented frame and decodes frames back out
//! of a byte window, tracking exact body offsets.

use std::borrow::Cow;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{LogError, Result};

use super::{NEWLINE, SESSION_END, SIGNATURE};

/// A fully encoded record, ready for a single write
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Bytes,
    /// Offset of the first message byte, relative to the frame start
    pub body_offset: u64,
    /// Message length in bytes
    pub body_len: u64,
}

/// A record decoded from a byte window. Offsets are relative to the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub logger_name: String,
    pub severity: i32,
    pub timestamp_millis: i64,
    pub body_start: usize,
    pub body_end: usize,
    /// Bytes consumed including the trailing terminator
    pub consumed: usize,
}

/// Outcome of decoding at the start of a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Header lines are not complete yet; retry once more bytes arrive
    Incomplete,
    /// A session-end marker; skip `consumed` bytes
    SessionEnd { consumed: usize },
    Frame(DecodedFrame),
}

// =============================================================================
// Encoding
// =============================================================================

/// Longest logger name, in bytes, that the logger index can hold
pub const MAX_LOGGER_NAME_LEN: usize = u16::MAX as usize;

/// Replace characters that would break the line framing of a logger name,
/// and cut names longer than `MAX_LOGGER_NAME_LEN` at a char boundary.
pub fn sanitize_logger_name(name: &str) -> Cow<'_, str> {
    let name = truncate_logger_name(name);
    if name.contains(['\n', '\r', '\0']) {
        Cow::Owned(name.replace(['\n', '\r', '\0'], " "))
    } else {
        Cow::Borrowed(name)
    }
}

pub(crate) fn truncate_logger_name(name: &str) -> &str {
    let mut end = name.len().min(MAX_LOGGER_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Encode one record frame
pub fn encode_frame(logger_name: &str, severity: i32, timestamp_millis: i64, message: &str) -> EncodedFrame {
    let logger_name = sanitize_logger_name(logger_name);
    let body = message.as_bytes();

    let header = format!(
        "{}\n{}\n{}\n{}\n",
        logger_name,
        severity,
        timestamp_millis,
        body.len()
    );

    let mut buf = BytesMut::with_capacity(header.len() + body.len() + 1);
    buf.put_slice(header.as_bytes());
    buf.put_slice(body);
    buf.put_u8(NEWLINE);

    EncodedFrame {
        bytes: buf.freeze(),
        body_offset: header.len() as u64,
        body_len: body.len() as u64,
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Verify the signature line at the start of `buf`.
///
/// Returns the signature length on success. A window that is empty or holds
/// only a prefix of the signature is `NotReady`; anything else is a format error.
pub fn check_signature(buf: &[u8]) -> Result<usize> {
    if buf.len() < SIGNATURE.len() {
        if SIGNATURE.starts_with(buf) {
            return Err(LogError::NotReady);
        }
        return Err(LogError::Format(format!(
            "bad signature: {:?}",
            String::from_utf8_lossy(buf)
        )));
    }

    if &buf[..SIGNATURE.len()] != SIGNATURE {
        let end = buf.iter().position(|&b| b == NEWLINE).unwrap_or(buf.len()).min(64);
        return Err(LogError::Format(format!(
            "bad signature: {:?}",
            String::from_utf8_lossy(&buf[..end])
        )));
    }

    Ok(SIGNATURE.len())
}

/// Decode the record (or marker) at the start of `buf`.
pub fn decode_frame(buf: &[u8]) -> Result<Decoded> {
    let Some((logger_line, mut pos)) = next_line(buf, 0) else {
        return Ok(Decoded::Incomplete);
    };

    if pos == SESSION_END.len() && &buf[..pos] == SESSION_END {
        return Ok(Decoded::SessionEnd { consumed: pos });
    }

    let mut fields: [&[u8]; 3] = [&[], &[], &[]];
    for field in fields.iter_mut() {
        let Some((line, next)) = next_line(buf, pos) else {
            return Ok(Decoded::Incomplete);
        };
        *field = line;
        pos = next;
    }

    let severity: i32 = parse_field(fields[0], "severity")?;
    let timestamp_millis: i64 = parse_field(fields[1], "timestamp")?;
    let body_len: usize = parse_field(fields[2], "message length")?;

    let body_start = pos;
    let body_end = body_start
        .checked_add(body_len)
        .ok_or_else(|| LogError::Format(format!("message length overflow: {}", body_len)))?;

    if buf.len() <= body_end {
        return Err(LogError::Format(format!(
            "truncated record body: expected {} bytes, found {}",
            body_len + 1,
            buf.len() - body_start
        )));
    }

    if buf[body_end] != NEWLINE {
        return Err(LogError::Format(format!(
            "missing record terminator at body offset {}",
            body_end
        )));
    }

    Ok(Decoded::Frame(DecodedFrame {
        logger_name: String::from_utf8_lossy(logger_line).into_owned(),
        severity,
        timestamp_millis,
        body_start,
        body_end,
        consumed: body_end + 1,
    }))
}

/// Line starting at `start`, without its terminator (and a trailing `\r`),
/// plus the position after the terminator.
fn next_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let len = buf[start..].iter().position(|&b| b == NEWLINE)?;
    let mut line = &buf[start..start + len];
    if let Some(stripped) = line.strip_suffix(b"\r") {
        line = stripped;
    }
    Some((line, start + len + 1))
}

fn parse_field<T: FromStr>(line: &[u8], what: &str) -> Result<T> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            LogError::Format(format!(
                "invalid {} field: {:?}",
                what,
                String::from_utf8_lossy(line)
            ))
        })
}
