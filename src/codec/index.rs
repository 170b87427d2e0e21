//! Index codecs
//!
//! Record index entries go through bincode with big-endian fixed-width
//! integers, which yields exactly the 32-byte layout documented in the module
//! root. Logger names use a u16 length prefix.

use bincode::Options;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{LogError, Result};
use crate::model::LogRecord;

use super::frame::truncate_logger_name;
use super::RECORD_INDEX_ENTRY_SIZE;

fn index_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

/// Encode one record index entry
pub fn encode_index_entry(record: &LogRecord) -> Result<Vec<u8>> {
    let bytes = index_options().serialize(record)?;
    if bytes.len() != RECORD_INDEX_ENTRY_SIZE {
        return Err(LogError::Serialization(format!(
            "index entry encoded to {} bytes, expected {}",
            bytes.len(),
            RECORD_INDEX_ENTRY_SIZE
        )));
    }
    Ok(bytes)
}

/// Decode every complete entry in `buf`. A trailing partial entry is ignored.
pub fn decode_index_entries(buf: &[u8]) -> Result<Vec<LogRecord>> {
    buf.chunks_exact(RECORD_INDEX_ENTRY_SIZE)
        .map(|chunk| index_options().deserialize(chunk).map_err(LogError::from))
        .collect()
}

/// Encode one logger name. Names over `u16::MAX` bytes are cut at a char boundary.
pub fn encode_logger_name(name: &str) -> Bytes {
    let name = truncate_logger_name(name).as_bytes();

    let mut buf = BytesMut::with_capacity(2 + name.len());
    buf.put_u16(name.len() as u16);
    buf.put_slice(name);
    buf.freeze()
}

/// Decode every complete logger name in `buf`. A trailing partial name is ignored.
pub fn decode_logger_names(mut buf: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    while buf.remaining() >= 2 {
        let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        if buf.remaining() < 2 + len {
            break;
        }
        buf.advance(2);
        names.push(String::from_utf8_lossy(&buf[..len]).into_owned());
        buf.advance(len);
    }
    names
}
