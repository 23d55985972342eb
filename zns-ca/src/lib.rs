//! Root CA loading and leaf-certificate minting (§4.6). Holds the root CA
//! cert and key loaded from disk at startup; `mint_for(hostname)` is
//! stateless across calls — caching minted leaves is the HTTPS server
//! pool's job (C8), not this crate's.

use rand::RngCore;
use rcgen::{CertificateParams, DnType, Issuer, KeyPair};
use std::path::Path;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Error)]
pub enum CaError {
    #[error("failed to read authority file: {0}")]
    Io(#[from] std::io::Error),
    #[error("authority PEM is malformed: {0}")]
    Malformed(String),
}

/// A minted leaf cert/key pair, PEM-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCert {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Loaded at startup from the `--authority` PEM file (§6), which contains
/// both the root CA certificate and its private key.
pub struct CaMint {
    issuer_key: KeyPair,
    issuer_params: CertificateParams,
    leaf_validity_days: i64,
}

impl CaMint {
    pub fn load(authority_path: &Path, leaf_validity_days: u32) -> Result<Self, CaError> {
        let pem = std::fs::read_to_string(authority_path)?;
        Self::from_pem(&pem, leaf_validity_days)
    }

    pub fn from_pem(pem: &str, leaf_validity_days: u32) -> Result<Self, CaError> {
        let issuer_key =
            KeyPair::from_pem(pem).map_err(|e| CaError::Malformed(e.to_string()))?;
        let issuer_params = CertificateParams::from_ca_cert_pem(pem)
            .map_err(|e| CaError::Malformed(e.to_string()))?;
        Ok(CaMint {
            issuer_key,
            issuer_params,
            leaf_validity_days: leaf_validity_days as i64,
        })
    }

    /// `mint_for(hostname) -> (cert_pem, key_pem)` (§4.6): CN = `hostname`,
    /// one SAN entry equal to `hostname`, validity of `leaf_validity_days`
    /// (default one year), a random 32-bit serial, signed by the root CA.
    pub fn mint_for(&self, hostname: &str) -> Result<LeafCert, CaError> {
        let mut params = CertificateParams::new(vec![hostname.to_string()])
            .map_err(|e| CaError::Malformed(e.to_string()))?;
        params
            .distinguished_name
            .push(DnType::CommonName, hostname);
        params.not_before = OffsetDateTime::now_utc();
        params.not_after = params.not_before + Duration::days(self.leaf_validity_days);

        let mut serial_bytes = [0u8; 4];
        rand::rngs::OsRng.fill_bytes(&mut serial_bytes);
        params.serial_number = Some(rcgen::SerialNumber::from_slice(&serial_bytes));

        let leaf_key = KeyPair::generate().map_err(|e| CaError::Malformed(e.to_string()))?;
        let issuer = Issuer::new(self.issuer_params.clone(), &self.issuer_key);
        let leaf_cert = params
            .signed_by(&leaf_key, &issuer)
            .map_err(|e| CaError::Malformed(e.to_string()))?;

        Ok(LeafCert {
            cert_pem: leaf_cert.pem(),
            key_pem: leaf_key.serialize_pem(),
        })
    }
}
