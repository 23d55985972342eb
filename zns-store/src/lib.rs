pub mod file_store;
pub mod memory_store;

use std::time::SystemTime;
use zns_core::label::Label;
use zns_core::record::RecordSet;
use zns_core::zone::ZonePub;
use zns_core::{SignedBlock, ZnsError};
use zns_crypto::{PublicKey, SecretKey};

pub use file_store::FileStore;
pub use memory_store::MemoryStore;

/// The record-store interface (§4.3). A backend is pluggable; this crate
/// ships in-memory and disk-file implementations. A relational backend is
/// named in the interface but left unbuilt — selecting one is an operational
/// concern, not core (see DESIGN.md).
pub trait RecordStore: Send + Sync {
    /// Overwrites any previously-cached block for the same `derived_pub`.
    fn cache_block(&self, block: SignedBlock) -> Result<(), ZnsError>;

    fn lookup_block(&self, query: &[u8; 32]) -> Result<Option<SignedBlock>, ZnsError>;

    /// Replaces the authoritative record-set at `(zone, label)`; an empty
    /// `records` deletes it. Atomic w.r.t. concurrent lookups on the same
    /// `(zone, label)`, and re-signs + re-caches the block for the new set.
    fn store_records(
        &self,
        zone_sk: &SecretKey,
        label: &Label,
        records: RecordSet,
        now: SystemTime,
    ) -> Result<(), ZnsError>;

    /// Returns the `offset`-th entry under a stable-for-the-iteration but
    /// otherwise unspecified ordering. `zone == None` iterates all zones.
    fn iterate_records(
        &self,
        zone: Option<ZonePub>,
        offset: usize,
    ) -> Result<Option<(ZonePub, Label, RecordSet)>, ZnsError>;

    /// Reverse lookup: find a delegation record in `zone_sk`'s zone whose
    /// payload equals `target_pub`.
    fn zone_to_name(
        &self,
        zone_sk: &SecretKey,
        target_pub: &PublicKey,
    ) -> Result<Option<Label>, ZnsError>;
}

/// Build the signed block for `(pk, label, records)` as of `now`, per §3's
/// "the block is cached after signing for re-publication and re-service".
pub(crate) fn sign_record_set(
    zone_sk: &SecretKey,
    label: &Label,
    records: &RecordSet,
    now: SystemTime,
) -> SignedBlock {
    let pk = zone_sk.public_of();
    let derived_sk = zns_crypto::derive_private(zone_sk, label.as_str());
    let derived_pub = derived_sk.public_of();
    let (enc_key, iv) = zns_crypto::kdf(&pk, label.as_str());
    let payload = zns_codec::serialize(records);
    let encrypted_payload = zns_crypto::symmetric_encrypt(&enc_key, &iv, &payload);
    let expiration = zns_codec::block_expiration(records, now);

    let mut signed_bytes = Vec::with_capacity(8 + encrypted_payload.len());
    signed_bytes.extend_from_slice(&expiration.to_be_bytes());
    signed_bytes.extend_from_slice(&encrypted_payload);
    let signature = zns_crypto::sign(&derived_sk, &signed_bytes);

    SignedBlock {
        derived_pub: derived_pub.to_bytes(),
        signature,
        expiration,
        encrypted_payload,
    }
}

pub(crate) fn block_query(derived_pub: &[u8; 32]) -> [u8; 32] {
    zns_crypto::hash(derived_pub)
}
