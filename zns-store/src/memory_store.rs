use crate::{block_query, sign_record_set, RecordStore};
use dashmap::DashMap;
use std::time::SystemTime;
use zns_core::label::Label;
use zns_core::record::RecordSet;
use zns_core::zone::ZonePub;
use zns_core::{SignedBlock, ZnsError};
use zns_crypto::{PublicKey, SecretKey};

/// `DashMap`-backed record store (§4.3), the default backend.
#[derive(Default)]
pub struct MemoryStore {
    zones: DashMap<ZonePub, DashMap<Label, RecordSet>>,
    blocks: DashMap<[u8; 32], SignedBlock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn cache_block(&self, block: SignedBlock) -> Result<(), ZnsError> {
        let query = block_query(&block.derived_pub);
        self.blocks.insert(query, block);
        Ok(())
    }

    fn lookup_block(&self, query: &[u8; 32]) -> Result<Option<SignedBlock>, ZnsError> {
        Ok(self.blocks.get(query).map(|b| b.clone()))
    }

    fn store_records(
        &self,
        zone_sk: &SecretKey,
        label: &Label,
        records: RecordSet,
        now: SystemTime,
    ) -> Result<(), ZnsError> {
        let zone_pub = ZonePub(zone_sk.public_of().to_bytes());
        let labels = self.zones.entry(zone_pub).or_default();

        if records.is_empty() {
            labels.remove(label);
        } else {
            let block = sign_record_set(zone_sk, label, &records, now);
            labels.insert(label.clone(), records);
            self.cache_block(block)?;
        }
        Ok(())
    }

    fn iterate_records(
        &self,
        zone: Option<ZonePub>,
        offset: usize,
    ) -> Result<Option<(ZonePub, Label, RecordSet)>, ZnsError> {
        let mut seen = 0usize;
        for zone_entry in self.zones.iter() {
            if let Some(wanted) = zone {
                if *zone_entry.key() != wanted {
                    continue;
                }
            }
            for label_entry in zone_entry.value().iter() {
                if seen == offset {
                    return Ok(Some((
                        *zone_entry.key(),
                        label_entry.key().clone(),
                        label_entry.value().clone(),
                    )));
                }
                seen += 1;
            }
        }
        Ok(None)
    }

    fn zone_to_name(
        &self,
        zone_sk: &SecretKey,
        target_pub: &PublicKey,
    ) -> Result<Option<Label>, ZnsError> {
        let zone_pub = ZonePub(zone_sk.public_of().to_bytes());
        let Some(labels) = self.zones.get(&zone_pub) else {
            return Ok(None);
        };
        for entry in labels.iter() {
            for record in entry.value() {
                if record.delegation_pubkey() == Some(target_pub.to_bytes()) {
                    return Ok(Some(entry.key().clone()));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use zns_core::record::{Record, RecordFlags, RecordType};

    fn zone() -> SecretKey {
        SecretKey::generate(&mut OsRng)
    }

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn store_then_lookup_block_verifies_and_decrypts() {
        let store = MemoryStore::new();
        let sk = zone();
        let label = Label::new("example").unwrap();
        let records = vec![Record::new(
            RecordType::A,
            RecordFlags::AUTHORITATIVE,
            now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_micros() as u64
                + 1_000_000,
            vec![93, 184, 216, 34],
        )];

        store.store_records(&sk, &label, records.clone(), now()).unwrap();

        let pk = sk.public_of();
        let derived_pub = zns_crypto::derive_public(&pk, label.as_str());
        let query = zns_crypto::hash(&derived_pub.to_bytes());
        let block = store.lookup_block(&query).unwrap().expect("block must be cached");

        assert!(zns_crypto::verify(&derived_pub, &block.signed_bytes(), &block.signature));

        let (enc_key, iv) = zns_crypto::kdf(&pk, label.as_str());
        let payload = zns_crypto::symmetric_decrypt(&enc_key, &iv, &block.encrypted_payload).unwrap();
        let decoded = zns_codec::deserialize(&payload, records.len()).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn empty_store_records_deletes_and_evicts_cached_block() {
        let store = MemoryStore::new();
        let sk = zone();
        let label = Label::new("foo").unwrap();
        let records = vec![Record::new(RecordType::A, RecordFlags::AUTHORITATIVE, 10_000, vec![10, 0, 0, 1])];

        store.store_records(&sk, &label, records, now()).unwrap();
        store.store_records(&sk, &label, vec![], now()).unwrap();

        let pk = sk.public_of();
        let derived_pub = zns_crypto::derive_public(&pk, label.as_str());
        let query = zns_crypto::hash(&derived_pub.to_bytes());
        assert_eq!(store.lookup_block(&query).unwrap(), None);
    }

    #[test]
    fn repeated_identical_store_records_is_idempotent() {
        let store = MemoryStore::new();
        let sk = zone();
        let label = Label::new("idempotent").unwrap();
        let records = vec![Record::new(RecordType::A, RecordFlags::AUTHORITATIVE, 10_000, vec![1, 2, 3, 4])];

        store.store_records(&sk, &label, records.clone(), now()).unwrap();
        store.store_records(&sk, &label, records, now()).unwrap();

        assert_eq!(store.iterate_records(None, 1).unwrap(), None);
    }

    #[test]
    fn zone_to_name_finds_delegation_record() {
        let store = MemoryStore::new();
        let sk = zone();
        let sub_pk = zone().public_of();
        let label = Label::new("sub").unwrap();
        let records = vec![Record::new(
            RecordType::Delegation,
            RecordFlags::AUTHORITATIVE,
            10_000,
            sub_pk.to_bytes().to_vec(),
        )];

        store.store_records(&sk, &label, records, now()).unwrap();

        assert_eq!(store.zone_to_name(&sk, &sub_pk).unwrap(), Some(label));
    }

    #[test]
    fn iterate_records_returns_none_past_the_end() {
        let store = MemoryStore::new();
        assert_eq!(store.iterate_records(None, 0).unwrap(), None);
    }
}
