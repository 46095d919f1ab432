//! Snapshot framing.
//!
//! A snapshot is the encoded state of a document wrapped in a small
//! envelope so damaged bytes are detected before they are applied:
//!
//! ```text
//! | magic (4) | version (2) | payload_len (4) | payload... | crc32 (4) |
//! ```
//!
//! The checksum covers everything before it. The same envelope is used for
//! the persisted replica and for checkpoint blobs.

use crate::error::{CoreError, CoreResult};

/// Magic bytes for snapshots.
const SNAPSHOT_MAGIC: [u8; 4] = *b"FSNP";
/// Current snapshot format version.
const SNAPSHOT_VERSION: u16 = 1;
/// Header size (magic + version + payload_len).
const HEADER_SIZE: usize = 4 + 2 + 4;
/// Footer size (checksum).
const FOOTER_SIZE: usize = 4;

/// Wraps an encoded document state in a checksummed envelope.
///
/// # Errors
///
/// Returns [`CoreError::InvalidFormat`] if the payload does not fit the
/// 4-byte length field.
pub fn encode_snapshot(payload: &[u8]) -> CoreResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_format("snapshot payload too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + FOOTER_SIZE);
    data.extend_from_slice(&SNAPSHOT_MAGIC);
    data.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Verifies the envelope and returns the payload.
///
/// # Errors
///
/// Returns [`CoreError::InvalidFormat`] for a wrong magic or version and
/// [`CoreError::Corruption`] for a length or checksum mismatch.
pub fn decode_snapshot(data: &[u8]) -> CoreResult<&[u8]> {
    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(CoreError::corruption(format!(
            "snapshot too small: {} bytes",
            data.len()
        )));
    }

    if data[0..4] != SNAPSHOT_MAGIC {
        return Err(CoreError::invalid_format("invalid snapshot magic"));
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != SNAPSHOT_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported snapshot version: {version}"
        )));
    }

    let len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
    if HEADER_SIZE + len + FOOTER_SIZE != data.len() {
        return Err(CoreError::corruption(format!(
            "snapshot length mismatch: header says {len}, have {}",
            data.len() - HEADER_SIZE - FOOTER_SIZE
        )));
    }

    let checksum_offset = data.len() - FOOTER_SIZE;
    let stored = u32::from_le_bytes([
        data[checksum_offset],
        data[checksum_offset + 1],
        data[checksum_offset + 2],
        data[checksum_offset + 3],
    ]);
    let computed = compute_crc32(&data[..checksum_offset]);
    if stored != computed {
        return Err(CoreError::corruption(format!(
            "snapshot checksum mismatch: expected {stored:08x}, got {computed:08x}"
        )));
    }

    Ok(&data[HEADER_SIZE..checksum_offset])
}

/// Returns true if `data` is a well-formed snapshot.
pub fn is_valid_snapshot(data: &[u8]) -> bool {
    decode_snapshot(data).is_ok()
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // CRC32 (IEEE polynomial)
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
