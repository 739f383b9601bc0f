//! On-disk framing for the change-state snapshot.
//!
//! File layout:
//! ```text
//! [magic: 4 bytes "STCS"][version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```
//! JSON keeps the snapshot inspectable; the checksum catches torn or edited files.

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Magic bytes identifying a statuscast state file.
pub const MAGIC: [u8; 4] = *b"STCS";

// A state of ~50 departed ids plus a feed's worth of live ids is a few KiB.
const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Encode `value` into a complete state file image.
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("serialization failed: {e}")))?;
    let len = u32::try_from(data.len())
        .map_err(|_| IoError::new(ErrorKind::InvalidData, "state too large to encode"))?;

    let mut out = Vec::with_capacity(MAGIC.len() + 1 + 4 + data.len() + 4);
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Decode a state file image, verifying magic, version and checksum.
///
/// # Errors
/// `ErrorKind::InvalidData` on any framing, checksum or JSON mismatch;
/// `ErrorKind::UnexpectedEof` on truncation.
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}"),
        ));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != FORMAT_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("unsupported state format version: {} (expected {FORMAT_VERSION})", version[0]),
        ));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("state payload size {len} exceeds maximum {MAX_PAYLOAD_SIZE}"),
        ));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = checksum(&data);
    if stored != computed {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("CRC mismatch: stored={stored:08x}, computed={computed:08x} (state corrupted)"),
        ));
    }

    serde_json::from_slice(&data)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("deserialization failed: {e}")))
}

/// Write an already-encoded image.
pub fn write_image(writer: &mut impl Write, image: &[u8]) -> IoResult<()> {
    writer.write_all(image)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::state::ChangeState;

    #[test]
    fn test_state_image_decodes() {
        let mut state = ChangeState::new();
        state.seen_ids.insert("incident-1".to_string());
        let image = encode(&state).unwrap();
        assert_eq!(&image[..4], &MAGIC);

        let decoded: ChangeState = decode(&mut Cursor::new(image)).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_detects_corruption() {
        let mut image = encode(&"some state".to_string()).unwrap();
        // Flip a byte inside the JSON payload.
        image[12] ^= 0xFF;

        let err = decode::<String>(&mut Cursor::new(image)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let err = decode::<String>(&mut Cursor::new(b"{\"seen_ids\": []}".to_vec())).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let mut bad = MAGIC.to_vec();
        bad.push(FORMAT_VERSION);
        bad.extend_from_slice(&(200_000_000u32).to_le_bytes());

        let err = decode::<String>(&mut Cursor::new(bad)).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_truncated_image() {
        let image = encode(&"state".to_string()).unwrap();
        let err = decode::<String>(&mut Cursor::new(image[..image.len() - 2].to_vec())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }
}
