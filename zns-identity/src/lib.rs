//! Ego-name → zone-keypair registry (§4.5). The proxy uses this exclusively
//! to obtain its *root* and *shorten* zones at startup; it never mutates
//! identities itself.

use dashmap::DashMap;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::watch;
use zns_crypto::SecretKey;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("ego name already in use: {0}")]
    NameInUse(String),
    #[error("no such ego: {0}")]
    NoSuchEgo(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The public view of one registered ego, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgoEntry {
    pub name: String,
    pub public: [u8; 32],
}

#[derive(Serialize, Deserialize)]
struct KeyFile {
    name: String,
    secret_key: [u8; 32],
}

/// Maps ego-name to zone keypair; each keypair is persisted in its own
/// file under `key_dir`, named by the hex short-hash of its public key
/// (§6 "Persisted state"), written under an exclusive advisory lock using
/// an atomic tmp-then-rename.
pub struct IdentityRegistry {
    key_dir: PathBuf,
    egos: DashMap<String, SecretKey>,
    watch_tx: watch::Sender<Vec<EgoEntry>>,
}

fn short_hash_hex(public: &[u8; 32]) -> String {
    let digest = zns_crypto::hash(public);
    hex::encode(&digest[..8])
}

impl IdentityRegistry {
    /// Load every key file under `key_dir`. A file whose stored key's
    /// derived public key doesn't match its filename is logged as an
    /// error and skipped — left on disk untouched, not "fixed".
    pub fn load(key_dir: impl Into<PathBuf>) -> Result<Self, IdentityError> {
        let key_dir = key_dir.into();
        let egos = DashMap::new();

        if key_dir.exists() {
            for entry in std::fs::read_dir(&key_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Ok(data) = std::fs::read_to_string(&path) else {
                    continue;
                };
                let key_file: KeyFile = match serde_json::from_str(&data) {
                    Ok(k) => k,
                    Err(e) => {
                        tracing::error!(error = %e, path = %path.display(), "malformed identity key file, skipping");
                        continue;
                    }
                };
                let sk = SecretKey::from_bytes(&key_file.secret_key);
                let expected_stem = short_hash_hex(&sk.public_of().to_bytes());
                let actual_stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                if actual_stem != expected_stem {
                    tracing::error!(
                        path = %path.display(),
                        expected = expected_stem,
                        "identity key file name does not match its derived public key, leaving untouched"
                    );
                    continue;
                }
                egos.insert(key_file.name, sk);
            }
        }

        let (watch_tx, _) = watch::channel(Vec::new());
        let registry = IdentityRegistry {
            key_dir,
            egos,
            watch_tx,
        };
        registry.notify();
        Ok(registry)
    }

    fn notify(&self) {
        let snapshot: Vec<EgoEntry> = self
            .egos
            .iter()
            .map(|e| EgoEntry {
                name: e.key().clone(),
                public: e.value().public_of().to_bytes(),
            })
            .collect();
        let _ = self.watch_tx.send(snapshot);
    }

    fn file_path(&self, public: &[u8; 32]) -> PathBuf {
        self.key_dir.join(format!("{}.json", short_hash_hex(public)))
    }

    fn write_key_file(&self, name: &str, sk: &SecretKey) -> Result<(), IdentityError> {
        std::fs::create_dir_all(&self.key_dir)?;
        let path = self.file_path(&sk.public_of().to_bytes());
        let tmp = path.with_extension("json.tmp");

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&tmp)?;
        lock_file.lock_exclusive()?;

        let json = serde_json::to_string_pretty(&KeyFile {
            name: name.to_string(),
            secret_key: sk.to_bytes(),
        })?;
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;
        FileExt::unlock(&lock_file)?;
        Ok(())
    }

    pub fn create(&self, name: &str, rng: &mut impl rand_core::RngCore) -> Result<EgoEntry, IdentityError> {
        if self.egos.contains_key(name) {
            return Err(IdentityError::NameInUse(name.to_string()));
        }
        let sk = SecretKey::generate(rng);
        self.write_key_file(name, &sk)?;
        let entry = EgoEntry {
            name: name.to_string(),
            public: sk.public_of().to_bytes(),
        };
        self.egos.insert(name.to_string(), sk);
        self.notify();
        Ok(entry)
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<(), IdentityError> {
        if !self.egos.contains_key(old) {
            return Err(IdentityError::NoSuchEgo(old.to_string()));
        }
        if self.egos.contains_key(new) {
            return Err(IdentityError::NameInUse(new.to_string()));
        }
        let (_, sk) = self.egos.remove(old).expect("checked above");
        self.write_key_file(new, &sk)?;
        self.egos.insert(new.to_string(), sk);
        self.notify();
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), IdentityError> {
        let Some((_, sk)) = self.egos.remove(name) else {
            return Err(IdentityError::NoSuchEgo(name.to_string()));
        };
        let path = self.file_path(&sk.public_of().to_bytes());
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.notify();
        Ok(())
    }

    pub fn secret_of(&self, name: &str) -> Option<SecretKey> {
        self.egos.get(name).map(|e| e.value().clone())
    }

    /// Subscribers receive the current set immediately, then every
    /// subsequent full-set update (§4.5/§6 "one event per ego on initial
    /// sync then deltas" — deltas are the new full set; consumers diff
    /// against their previous observation).
    pub fn subscribe(&self) -> watch::Receiver<Vec<EgoEntry>> {
        self.watch_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use tempfile::tempdir;

    #[test]
    fn create_then_load_recovers_the_same_key() {
        let dir = tempdir().unwrap();
        let public;
        {
            let registry = IdentityRegistry::load(dir.path()).unwrap();
            let entry = registry.create("root", &mut OsRng).unwrap();
            public = entry.public;
        }

        let registry2 = IdentityRegistry::load(dir.path()).unwrap();
        let sk = registry2.secret_of("root").unwrap();
        assert_eq!(sk.public_of().to_bytes(), public);
    }

    #[test]
    fn create_with_duplicate_name_fails() {
        let dir = tempdir().unwrap();
        let registry = IdentityRegistry::load(dir.path()).unwrap();
        registry.create("root", &mut OsRng).unwrap();
        assert!(matches!(
            registry.create("root", &mut OsRng),
            Err(IdentityError::NameInUse(_))
        ));
    }

    #[test]
    fn rename_nonexistent_fails() {
        let dir = tempdir().unwrap();
        let registry = IdentityRegistry::load(dir.path()).unwrap();
        assert!(matches!(
            registry.rename("ghost", "new"),
            Err(IdentityError::NoSuchEgo(_))
        ));
    }

    #[test]
    fn rename_onto_existing_name_fails() {
        let dir = tempdir().unwrap();
        let registry = IdentityRegistry::load(dir.path()).unwrap();
        registry.create("a", &mut OsRng).unwrap();
        registry.create("b", &mut OsRng).unwrap();
        assert!(matches!(
            registry.rename("a", "b"),
            Err(IdentityError::NameInUse(_))
        ));
    }

    #[test]
    fn mismatched_key_file_is_skipped_and_left_untouched() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        let bogus = KeyFile {
            name: "bogus".to_string(),
            secret_key: [7u8; 32],
        };
        let path = dir.path().join("deadbeefdeadbeef.json");
        std::fs::write(&path, serde_json::to_string(&bogus).unwrap()).unwrap();

        let registry = IdentityRegistry::load(dir.path()).unwrap();
        assert!(registry.secret_of("bogus").is_none());
        assert!(path.exists(), "file must be left untouched, not deleted");
    }

    #[tokio::test]
    async fn subscriber_observes_current_set_immediately() {
        let dir = tempdir().unwrap();
        let registry = IdentityRegistry::load(dir.path()).unwrap();
        registry.create("root", &mut OsRng).unwrap();

        let rx = registry.subscribe();
        assert_eq!(rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn subscriber_sees_subsequent_updates() {
        let dir = tempdir().unwrap();
        let registry = IdentityRegistry::load(dir.path()).unwrap();
        let mut rx = registry.subscribe();

        registry.create("root", &mut OsRng).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
