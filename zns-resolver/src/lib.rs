pub mod dht;

use std::collections::HashSet;
use std::time::{Duration, SystemTime};
use zns_core::label::split_name_rightmost_first;
use zns_core::record::{RecordSet, RecordType};
use zns_core::zone::ZonePub;
use zns_core::ZnsError;
use zns_crypto::PublicKey;
use zns_store::RecordStore;

pub use dht::{DhtClient, LoopbackDht};

/// The outcome of a full name resolution (§4.4): the leaf record-set plus,
/// if seen along the way, the legacy-hostname attribute used by the proxy
/// to send a correct `Host:` header upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub records: RecordSet,
    pub legacy_hostname: Option<String>,
}

impl ResolveOutcome {
    /// First address record, preferring IPv4 unless configured otherwise
    /// (§4.4 "ties ... prefer IPv4 ... first one returned wins").
    pub fn preferred_address(&self, prefer_ipv4: bool) -> Option<&[u8]> {
        let order: [RecordType; 2] = if prefer_ipv4 {
            [RecordType::A, RecordType::Aaaa]
        } else {
            [RecordType::Aaaa, RecordType::A]
        };
        for kind in order {
            if let Some(r) = self.records.iter().find(|r| r.kind() == kind) {
                return Some(&r.data);
            }
        }
        None
    }
}

/// Resolve `name` starting from `root`, per the algorithm in §4.4.
pub async fn resolve(
    store: &dyn RecordStore,
    dht: &dyn DhtClient,
    root: ZonePub,
    name: &str,
    budget: Duration,
    dht_fetch_timeout: Duration,
) -> Result<ResolveOutcome, ZnsError> {
    tokio::time::timeout(
        budget,
        resolve_inner(store, dht, root, name, dht_fetch_timeout),
    )
    .await
    .map_err(|_| ZnsError::ResolutionTimeout(budget))?
}

async fn resolve_inner(
    store: &dyn RecordStore,
    dht: &dyn DhtClient,
    root: ZonePub,
    name: &str,
    dht_fetch_timeout: Duration,
) -> Result<ResolveOutcome, ZnsError> {
    // `split_name_rightmost_first` already orders rightmost-first; reverse
    // so `labels.pop()` below consumes the rightmost (outermost) label
    // first, per §4.4 step 1-3.
    let mut labels = split_name_rightmost_first(name)
        .map_err(|e| ZnsError::ProtocolError(e.to_string()))?;
    labels.reverse();
    let mut visited: HashSet<ZonePub> = HashSet::new();
    let mut current_zone = root;
    let mut legacy_hostname: Option<String> = None;

    loop {
        if !visited.insert(current_zone) {
            return Err(ZnsError::ResolutionCycle(current_zone.to_hex()));
        }

        let Some(label) = labels.pop() else {
            return Err(ZnsError::ResolutionNoRecord(name.to_string()));
        };

        let records = fetch_label(store, dht, current_zone, label.as_str(), dht_fetch_timeout)
            .await?
            .ok_or_else(|| ZnsError::ResolutionNoRecord(name.to_string()))?;

        if legacy_hostname.is_none() {
            legacy_hostname = records.iter().find_map(|r| r.legacy_hostname());
        }

        let delegation = records.iter().find_map(|r| r.delegation_pubkey());
        if let Some(next_pub_bytes) = delegation {
            current_zone = ZonePub(next_pub_bytes);
            continue;
        }

        if labels.is_empty() {
            return Ok(ResolveOutcome {
                records,
                legacy_hostname,
            });
        }

        // Terminal records found but labels remain un-consumed: there is no
        // delegation to follow further, so the name cannot be resolved.
        return Err(ZnsError::ResolutionNoRecord(name.to_string()));
    }
}

/// Consult the local store first; on miss, fetch from the DHT, verify,
/// decrypt, cache, and return as if it had always been local (§4.4 step 5).
async fn fetch_label(
    store: &dyn RecordStore,
    dht: &dyn DhtClient,
    zone: ZonePub,
    label: &str,
    dht_fetch_timeout: Duration,
) -> Result<Option<RecordSet>, ZnsError> {
    let zone_pub = PublicKey::from_bytes(&zone.0)
        .map_err(|e| ZnsError::CryptoFailure(e.to_string()))?;
    let derived_pub = zns_crypto::derive_public(&zone_pub, label);
    let query = zns_crypto::hash(&derived_pub.to_bytes());

    let mut block = store.lookup_block(&query)?;

    if block.is_none() {
        block = match tokio::time::timeout(dht_fetch_timeout, dht.get(query)).await {
            Ok(Ok(Some(fetched))) => {
                store.cache_block(fetched.clone())?;
                Some(fetched)
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "dht fetch failed");
                None
            }
            Err(_) => None,
        };
    }

    let Some(block) = block else {
        return Ok(None);
    };

    if !zns_crypto::verify(&derived_pub, &block.signed_bytes(), &block.signature) {
        tracing::error!(label, "signed block failed verification, discarding");
        return Ok(None);
    }

    let (enc_key, iv) = zns_crypto::kdf(&zone_pub, label);
    let plaintext = zns_crypto::symmetric_decrypt(&enc_key, &iv, &block.encrypted_payload)
        .map_err(|e| ZnsError::CryptoFailure(e.to_string()))?;

    // The record count isn't carried on the wire; decode until the buffer
    // is exhausted by growing the expected count, since `deserialize`
    // requires an expected count up front but the codec's own framing
    // (data_len per record) makes the true count recoverable by scanning.
    let records = decode_all(&plaintext)?;
    Ok(Some(records))
}

fn decode_all(bytes: &[u8]) -> Result<RecordSet, ZnsError> {
    let mut count = 0usize;
    loop {
        match zns_codec::deserialize(bytes, count) {
            Ok(records) => return Ok(records),
            Err(zns_codec::CodecError::TrailingBytes) => count += 1,
            Err(e) => return Err(ZnsError::ProtocolError(e.to_string())),
        }
        if count > bytes.len() {
            return Err(ZnsError::ProtocolError("record count could not be recovered".into()));
        }
    }
}
