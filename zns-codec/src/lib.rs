//! Record-set wire codec (§4.2): `serialize`/`deserialize` and
//! `block_expiration`, the two operations that turn a `RecordSet` into the
//! bytes carried inside a `SignedBlock::encrypted_payload` and back.

use std::time::SystemTime;
use thiserror::Error;
use zns_core::record::{Record, RecordSet};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("record declared data_len would overrun the input")]
    TruncatedRecord,
    #[error("trailing bytes remained after decoding the expected record count")]
    TrailingBytes,
}

/// `serialize(records) -> bytes`: each record as
/// `{expiration:u64, data_len:u32, type:u32, flags:u32, data:bytes}`,
/// big-endian, no padding (§4.2).
pub fn serialize(records: &RecordSet) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        out.extend_from_slice(&record.expiration.to_be_bytes());
        out.extend_from_slice(&(record.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&record.record_type.to_be_bytes());
        out.extend_from_slice(&(record.flags as u32).to_be_bytes());
        out.extend_from_slice(&record.data);
    }
    out
}

/// `deserialize(bytes, expected_count) -> Result<records>` (§4.2).
pub fn deserialize(bytes: &[u8], expected_count: usize) -> Result<RecordSet, CodecError> {
    let mut records = Vec::with_capacity(expected_count);
    let mut cursor = 0usize;

    for _ in 0..expected_count {
        const HEADER_LEN: usize = 8 + 4 + 4 + 4;
        if cursor + HEADER_LEN > bytes.len() {
            return Err(CodecError::TruncatedRecord);
        }
        let expiration = u64::from_be_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let data_len = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        let record_type = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let flags = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        if cursor + data_len > bytes.len() {
            return Err(CodecError::TruncatedRecord);
        }
        let data = bytes[cursor..cursor + data_len].to_vec();
        cursor += data_len;

        records.push(Record {
            record_type,
            flags: flags as u16,
            expiration,
            data,
        });
    }

    if cursor != bytes.len() {
        return Err(CodecError::TrailingBytes);
    }

    Ok(records)
}

/// `block_expiration(records) -> time`: the minimum of each record's
/// resolved absolute expiration, relative expirations resolved against
/// `now` (§4.2).
pub fn block_expiration(records: &RecordSet, now: SystemTime) -> u64 {
    records
        .iter()
        .map(|r| r.resolved_expiration(now))
        .min()
        .unwrap_or(0)
}
