use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Record type assignments per §6.
pub const RECORD_TYPE_A: u32 = 1;
pub const RECORD_TYPE_AAAA: u32 = 28;
pub const RECORD_TYPE_DELEGATION: u32 = 65536;
pub const RECORD_TYPE_LEGACY_HOSTNAME: u32 = 65537;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    A,
    Aaaa,
    Delegation,
    LegacyHostname,
    Opaque(u32),
}

impl RecordType {
    pub fn as_u32(self) -> u32 {
        match self {
            RecordType::A => RECORD_TYPE_A,
            RecordType::Aaaa => RECORD_TYPE_AAAA,
            RecordType::Delegation => RECORD_TYPE_DELEGATION,
            RecordType::LegacyHostname => RECORD_TYPE_LEGACY_HOSTNAME,
            RecordType::Opaque(v) => v,
        }
    }

    pub fn from_u32(v: u32) -> Self {
        match v {
            RECORD_TYPE_A => RecordType::A,
            RECORD_TYPE_AAAA => RecordType::Aaaa,
            RECORD_TYPE_DELEGATION => RecordType::Delegation,
            RECORD_TYPE_LEGACY_HOSTNAME => RecordType::LegacyHostname,
            other => RecordType::Opaque(other),
        }
    }
}

/// `flags` encodes two orthogonal axes (§3): relative-vs-absolute
/// expiration, and authoritative. Only two bits are defined so far; a small
/// wrapper over a raw `u16` keeps this extensible without pulling in a
/// bitflags crate for two constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u16);

impl RecordFlags {
    pub const RELATIVE_EXPIRATION: RecordFlags = RecordFlags(0b0000_0001);
    pub const AUTHORITATIVE: RecordFlags = RecordFlags(0b0000_0010);

    pub const fn empty() -> Self {
        RecordFlags(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u16) -> Self {
        RecordFlags(bits & 0b0000_0011)
    }

    pub const fn contains(self, other: RecordFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RecordFlags {
    type Output = RecordFlags;
    fn bitor(self, rhs: RecordFlags) -> RecordFlags {
        RecordFlags(self.0 | rhs.0)
    }
}

/// `{record_type, flags, expiration, data}` per §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: u32,
    pub flags: u16,
    /// Microseconds since the epoch, absolute, or a duration if
    /// `RELATIVE_EXPIRATION` is set — resolved against publication time by
    /// `block_expiration` (C2).
    pub expiration: u64,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(record_type: RecordType, flags: RecordFlags, expiration: u64, data: Vec<u8>) -> Self {
        Record {
            record_type: record_type.as_u32(),
            flags: flags.bits(),
            expiration,
            data,
        }
    }

    pub fn kind(&self) -> RecordType {
        RecordType::from_u32(self.record_type)
    }

    pub fn flags(&self) -> RecordFlags {
        RecordFlags::from_bits_truncate(self.flags)
    }

    pub fn is_authoritative(&self) -> bool {
        self.flags().contains(RecordFlags::AUTHORITATIVE)
    }

    /// Resolve this record's expiration to an absolute microseconds-since-epoch
    /// value, given the "current" time at the call (§4.2 `block_expiration`).
    pub fn resolved_expiration(&self, now: SystemTime) -> u64 {
        if self.flags().contains(RecordFlags::RELATIVE_EXPIRATION) {
            let now_us = now
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_micros() as u64;
            now_us.saturating_add(self.expiration)
        } else {
            self.expiration
        }
    }

    pub fn legacy_hostname(&self) -> Option<String> {
        if self.kind() == RecordType::LegacyHostname {
            String::from_utf8(self.data.clone()).ok()
        } else {
            None
        }
    }

    pub fn delegation_pubkey(&self) -> Option<[u8; 32]> {
        if self.kind() == RecordType::Delegation && self.data.len() == 32 {
            let mut out = [0u8; 32];
            out.copy_from_slice(&self.data);
            Some(out)
        } else {
            None
        }
    }
}

/// The ordered sequence of records stored under one (zone, label) pair (§3).
pub type RecordSet = Vec<Record>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_round_trips_through_u32() {
        for t in [RecordType::A, RecordType::Aaaa, RecordType::Delegation, RecordType::LegacyHostname, RecordType::Opaque(9999)] {
            assert_eq!(RecordType::from_u32(t.as_u32()), t);
        }
    }

    #[test]
    fn absolute_expiration_is_returned_unchanged() {
        let r = Record::new(RecordType::A, RecordFlags::AUTHORITATIVE, 1_000_000, vec![1, 2, 3, 4]);
        assert_eq!(r.resolved_expiration(UNIX_EPOCH), 1_000_000);
    }

    #[test]
    fn relative_expiration_is_added_to_now() {
        let r = Record::new(RecordType::A, RecordFlags::RELATIVE_EXPIRATION, 5_000_000, vec![1, 2, 3, 4]);
        let now = UNIX_EPOCH + Duration::from_secs(10);
        assert_eq!(r.resolved_expiration(now), 10_000_000 + 5_000_000);
    }

    #[test]
    fn legacy_hostname_extracts_utf8_string() {
        let r = Record::new(
            RecordType::LegacyHostname,
            RecordFlags::AUTHORITATIVE,
            0,
            b"www.example.com".to_vec(),
        );
        assert_eq!(r.legacy_hostname().as_deref(), Some("www.example.com"));
    }

    #[test]
    fn non_legacy_hostname_record_has_no_legacy_hostname() {
        let r = Record::new(RecordType::A, RecordFlags::empty(), 0, vec![1, 2, 3, 4]);
        assert_eq!(r.legacy_hostname(), None);
    }

    #[test]
    fn delegation_pubkey_requires_exactly_32_bytes() {
        let r = Record::new(RecordType::Delegation, RecordFlags::empty(), 0, vec![7u8; 32]);
        assert_eq!(r.delegation_pubkey(), Some([7u8; 32]));

        let short = Record::new(RecordType::Delegation, RecordFlags::empty(), 0, vec![7u8; 16]);
        assert_eq!(short.delegation_pubkey(), None);
    }
}
