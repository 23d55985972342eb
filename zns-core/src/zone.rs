use serde::{Deserialize, Serialize};

/// A zone identifier: the public key of the keypair rooting a portion of the
/// name graph (§3). Ristretto255-encoded, 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZonePub(pub [u8; 32]);

impl ZonePub {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(ZonePub(out))
    }
}

impl std::fmt::Display for ZonePub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let pk = ZonePub([9u8; 32]);
        let hex = pk.to_hex();
        assert_eq!(ZonePub::from_hex(&hex), Some(pk));
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert_eq!(ZonePub::from_hex("abcd"), None);
    }
}
