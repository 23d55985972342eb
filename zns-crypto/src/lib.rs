//! Elliptic-curve primitives backing the naming system's zones and signed
//! blocks: deterministic key derivation, Schnorr signatures, a label-keyed
//! KDF, and an AEAD cipher for record-set payloads.
//!
//! Curve: Ristretto255. It gives a clean prime-order group, so the
//! derivation law `derive_public(public_of(sk), label) == public_of(derive_private(sk, label))`
//! holds directly from scalar multiplication being a ring homomorphism —
//! no cofactor bookkeeping, unlike a raw Edwards point.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoFailure {
    #[error("malformed secret key")]
    MalformedSecretKey,
    #[error("malformed public key")]
    MalformedPublicKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("decryption failed")]
    DecryptionFailed,
}

/// A zone's secret scalar. Zeroized on drop.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<Scalar>);

impl SecretKey {
    /// Build a secret key from 32 little-endian bytes, reducing mod the
    /// group order so any 32-byte input is accepted (never panics).
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        SecretKey(Zeroizing::new(Scalar::from_bytes_mod_order(*bytes)))
    }

    pub fn generate(rng: &mut impl rand_core::RngCore) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        SecretKey::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public_of(&self) -> PublicKey {
        PublicKey((*self.0 * RISTRETTO_BASEPOINT_POINT).compress())
    }
}

/// A zone identifier / derived delegation key: a compressed Ristretto point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(CompressedRistretto);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoFailure> {
        let compressed = CompressedRistretto(*bytes);
        compressed
            .decompress()
            .ok_or(CryptoFailure::MalformedPublicKey)?;
        Ok(PublicKey(compressed))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    fn point(&self) -> RistrettoPoint {
        // Constructed only via `from_bytes`, which already validated
        // decompression succeeds, so this cannot fail.
        self.0.decompress().expect("validated at construction")
    }
}

/// `H(pk || label) mod L`, the scalar tweak shared by `derive_public` and
/// `derive_private`.
fn derivation_scalar(pk_bytes: &[u8; 32], label: &str) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(pk_bytes);
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// `derive_public(pk, label) -> pk'` (§4.1).
pub fn derive_public(pk: &PublicKey, label: &str) -> PublicKey {
    let h = derivation_scalar(&pk.to_bytes(), label);
    PublicKey((h * pk.point()).compress())
}

/// `derive_private(sk, label) -> sk'` (§4.1). Satisfies
/// `derive_public(public_of(sk), label) == public_of(derive_private(sk, label))`.
pub fn derive_private(sk: &SecretKey, label: &str) -> SecretKey {
    let pk_bytes = sk.public_of().to_bytes();
    let h = derivation_scalar(&pk_bytes, label);
    SecretKey(Zeroizing::new(h * *sk.0))
}

/// Deterministic Schnorr signature: `R || s`, 64 bytes total (§6).
pub fn sign(sk: &SecretKey, msg: &[u8]) -> [u8; 64] {
    let pk = sk.public_of();
    let nonce_scalar = {
        let mut hasher = Sha512::new();
        hasher.update(sk.to_bytes());
        hasher.update(msg);
        let digest = hasher.finalize();
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&digest);
        Scalar::from_bytes_mod_order_wide(&wide)
    };
    let r_point = (nonce_scalar * RISTRETTO_BASEPOINT_POINT).compress();
    let challenge = {
        let mut hasher = Sha512::new();
        hasher.update(r_point.to_bytes());
        hasher.update(pk.to_bytes());
        hasher.update(msg);
        let digest = hasher.finalize();
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&digest);
        Scalar::from_bytes_mod_order_wide(&wide)
    };
    let s = nonce_scalar + challenge * *sk.0;

    let mut out = [0u8; 64];
    out[..32].copy_from_slice(r_point.as_bytes());
    out[32..].copy_from_slice(s.as_bytes());
    out
}

/// `verify(pk, msg, sig) -> bool`. Never panics on arbitrary input (§4.1/§8).
pub fn verify(pk: &PublicKey, msg: &[u8], sig: &[u8; 64]) -> bool {
    let r_compressed = CompressedRistretto(sig[..32].try_into().expect("32 bytes"));
    let r_point = match r_compressed.decompress() {
        Some(p) => p,
        None => return false,
    };
    let s_bytes: [u8; 32] = sig[32..].try_into().expect("32 bytes");
    let s = match Option::<Scalar>::from(Scalar::from_canonical_bytes(s_bytes)) {
        Some(s) => s,
        None => return false,
    };

    let challenge = {
        let mut hasher = Sha512::new();
        hasher.update(r_compressed.to_bytes());
        hasher.update(pk.to_bytes());
        hasher.update(msg);
        let digest = hasher.finalize();
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&digest);
        Scalar::from_bytes_mod_order_wide(&wide)
    };

    let lhs = s * RISTRETTO_BASEPOINT_POINT;
    let rhs = r_point + challenge * pk.point();
    lhs == rhs
}

/// `kdf(pk, label) -> (enc_key, iv)`: HKDF-SHA256 over `pk || label`,
/// producing a 32-byte ChaCha20-Poly1305 key and a 12-byte nonce.
pub fn kdf(pk: &PublicKey, label: &str) -> ([u8; 32], [u8; 12]) {
    let hk = Hkdf::<Sha256>::new(None, &[pk.to_bytes().as_slice(), label.as_bytes()].concat());
    let mut okm = [0u8; 44];
    hk.expand(b"zns-record-set", &mut okm)
        .expect("44 is a valid HKDF-SHA256 output length");
    let mut enc_key = [0u8; 32];
    let mut iv = [0u8; 12];
    enc_key.copy_from_slice(&okm[..32]);
    iv.copy_from_slice(&okm[32..]);
    (enc_key, iv)
}

pub fn symmetric_encrypt(enc_key: &[u8; 32], iv: &[u8; 12], plaintext: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(enc_key));
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .expect("encryption under a fixed-size key/nonce cannot fail")
}

pub fn symmetric_decrypt(
    enc_key: &[u8; 32],
    iv: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoFailure> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(enc_key));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoFailure::DecryptionFailed)
}

/// `hash(bytes) -> 32-byte digest`: SHA-512 truncated to 32 bytes, used both
/// as the general-purpose hash and, applied to `derived_pub`, as the block
/// lookup query (§6).
pub fn hash(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha512::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn random_secret() -> SecretKey {
        SecretKey::generate(&mut OsRng)
    }

    #[test]
    fn derive_public_matches_public_of_derive_private() {
        let sk = random_secret();
        let pk = sk.public_of();
        let label = "example";
        let derived_pub = derive_public(&pk, label);
        let derived_sk = derive_private(&sk, label);
        assert_eq!(derived_pub, derived_sk.public_of());
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let sk = random_secret();
        let pk = sk.public_of();
        let msg = b"expiration||encrypted_payload";
        let sig = sign(&sk, msg);
        assert!(verify(&pk, msg, &sig));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let sk = random_secret();
        let pk = sk.public_of();
        let sig = sign(&sk, b"original");
        assert!(!verify(&pk, b"tampered", &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let sk = random_secret();
        let other = random_secret().public_of();
        let msg = b"hello";
        let sig = sign(&sk, msg);
        assert!(!verify(&other, msg, &sig));
    }

    #[test]
    fn verify_never_panics_on_garbage_signature() {
        let pk = random_secret().public_of();
        let garbage = [0xFFu8; 64];
        assert!(!verify(&pk, b"msg", &garbage));
        let zero = [0u8; 64];
        // all-zero R is the identity point under Ristretto decompression
        // rules for some encodings; either way this must not panic.
        let _ = verify(&pk, b"msg", &zero);
    }

    #[test]
    fn public_key_from_bytes_rejects_invalid_encoding() {
        // Not every 32-byte string is a valid Ristretto encoding.
        let invalid = [0xFFu8; 32];
        assert!(matches!(
            PublicKey::from_bytes(&invalid),
            Err(CryptoFailure::MalformedPublicKey)
        ));
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let sk = random_secret();
        let pk = sk.public_of();
        let (key, iv) = kdf(&pk, "label");
        let plaintext = b"a record set serialized as bytes";
        let ciphertext = symmetric_encrypt(&key, &iv, plaintext);
        let decrypted = symmetric_decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_fails_closed_on_tampered_ciphertext() {
        let sk = random_secret();
        let pk = sk.public_of();
        let (key, iv) = kdf(&pk, "label");
        let mut ciphertext = symmetric_encrypt(&key, &iv, b"payload");
        *ciphertext.last_mut().unwrap() ^= 0xFF;
        assert_eq!(
            symmetric_decrypt(&key, &iv, &ciphertext),
            Err(CryptoFailure::DecryptionFailed)
        );
    }

    #[test]
    fn kdf_is_deterministic_in_pk_and_label() {
        let sk = random_secret();
        let pk = sk.public_of();
        assert_eq!(kdf(&pk, "a"), kdf(&pk, "a"));
        assert_ne!(kdf(&pk, "a"), kdf(&pk, "b"));
    }

    #[test]
    fn hash_is_32_bytes_and_deterministic() {
        assert_eq!(hash(b"x").len(), 32);
        assert_eq!(hash(b"x"), hash(b"x"));
        assert_ne!(hash(b"x"), hash(b"y"));
    }
}
