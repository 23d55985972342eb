use serde::{Deserialize, Serialize};

/// The publishable representation of a record-set (§3, wire format §6):
/// `{derived_pub, signature, expiration, encrypted_payload}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub derived_pub: [u8; 32],
    pub signature: [u8; 64],
    /// Microseconds since the epoch.
    pub expiration: u64,
    pub encrypted_payload: Vec<u8>,
}

impl SignedBlock {
    /// The bytes a signature is computed over: `(expiration, encrypted_payload)`.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.encrypted_payload.len());
        buf.extend_from_slice(&self.expiration.to_be_bytes());
        buf.extend_from_slice(&self.encrypted_payload);
        buf
    }

    /// Wire-encode per §6: `derived_pub(32) || signature(64) || expiration(8) || payload`.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 64 + 8 + self.encrypted_payload.len());
        buf.extend_from_slice(&self.derived_pub);
        buf.extend_from_slice(&self.signature);
        buf.extend_from_slice(&self.expiration.to_be_bytes());
        buf.extend_from_slice(&self.encrypted_payload);
        buf
    }

    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 32 + 64 + 8 {
            return None;
        }
        let mut derived_pub = [0u8; 32];
        derived_pub.copy_from_slice(&bytes[0..32]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[32..96]);
        let mut expiration_bytes = [0u8; 8];
        expiration_bytes.copy_from_slice(&bytes[96..104]);
        let expiration = u64::from_be_bytes(expiration_bytes);
        let encrypted_payload = bytes[104..].to_vec();
        Some(SignedBlock {
            derived_pub,
            signature,
            expiration,
            encrypted_payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trips() {
        let b = SignedBlock {
            derived_pub: [1u8; 32],
            signature: [2u8; 64],
            expiration: 123_456_789,
            encrypted_payload: vec![9, 8, 7],
        };
        let wire = b.to_wire();
        assert_eq!(wire.len(), 32 + 64 + 8 + 3);
        let back = SignedBlock::from_wire(&wire).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn from_wire_rejects_truncated_header() {
        assert!(SignedBlock::from_wire(&[0u8; 10]).is_none());
    }

    #[test]
    fn signed_bytes_is_expiration_then_payload() {
        let b = SignedBlock {
            derived_pub: [0u8; 32],
            signature: [0u8; 64],
            expiration: 7,
            encrypted_payload: vec![1, 2, 3],
        };
        let signed = b.signed_bytes();
        assert_eq!(&signed[0..8], &7u64.to_be_bytes());
        assert_eq!(&signed[8..], &[1, 2, 3]);
    }
}
