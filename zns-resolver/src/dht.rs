use async_trait::async_trait;
use dashmap::DashMap;
use zns_core::SignedBlock;

/// The DHT collaborator interface (§6): `get`/`put`, both asynchronous. The
/// resolver only consumes `get`. A real networked transport is out of scope
/// for this core (§1) and would sit behind this trait.
#[async_trait]
pub trait DhtClient: Send + Sync {
    async fn get(&self, query: [u8; 32]) -> Result<Option<SignedBlock>, DhtError>;
    async fn put(&self, block: SignedBlock) -> Result<(), DhtError>;
}

#[derive(Debug, thiserror::Error)]
#[error("dht error: {0}")]
pub struct DhtError(pub String);

/// In-memory stand-in for the DHT, used by tests and by single-node
/// deployments with no networked transport configured.
#[derive(Default)]
pub struct LoopbackDht {
    blocks: DashMap<[u8; 32], SignedBlock>,
}

impl LoopbackDht {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DhtClient for LoopbackDht {
    async fn get(&self, query: [u8; 32]) -> Result<Option<SignedBlock>, DhtError> {
        Ok(self.blocks.get(&query).map(|b| b.clone()))
    }

    async fn put(&self, block: SignedBlock) -> Result<(), DhtError> {
        let query = zns_crypto::hash(&block.derived_pub);
        self.blocks.insert(query, block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dht = LoopbackDht::new();
        let block = SignedBlock {
            derived_pub: [1u8; 32],
            signature: [2u8; 64],
            expiration: 1,
            encrypted_payload: vec![9],
        };
        let query = zns_crypto::hash(&block.derived_pub);
        dht.put(block.clone()).await.unwrap();
        assert_eq!(dht.get(query).await.unwrap(), Some(block));
    }

    #[tokio::test]
    async fn get_on_empty_store_returns_none() {
        let dht = LoopbackDht::new();
        assert_eq!(dht.get([0u8; 32]).await.unwrap(), None);
    }
}
