//! HTTPS listener pool (C8, §4.8): one TLS-terminating listener per
//! connected-to hostname, hostnames keyed by a `DashMap`, leaves minted
//! on demand via `zns-ca` and torn down after an idle period. One shared
//! plaintext-HTTP listener is created at startup and never destroyed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_rustls::TlsAcceptor;

use zns_ca::CaMint;
use zns_core::ZnsError;

const IDLE_TEARDOWN: Duration = Duration::from_secs(300);

struct ListenerEntry {
    acceptor: TlsAcceptor,
    last_used: std::time::Instant,
}

/// Hostname-keyed pool of TLS acceptors. `lookup_or_create` mints a fresh
/// leaf cert the first time a hostname is seen and reuses it until the
/// idle timeout elapses (checked lazily, not via a background task, to
/// keep the single-reactor-thread model intact).
pub struct HttpsListenerPool {
    ca: Arc<CaMint>,
    entries: DashMap<String, Arc<Mutex<ListenerEntry>>>,
}

impl HttpsListenerPool {
    pub fn new(ca: Arc<CaMint>) -> Self {
        HttpsListenerPool { ca, entries: DashMap::new() }
    }

    /// Returns a `TlsAcceptor` for `hostname`, minting and caching a new
    /// leaf certificate if none is cached or the cached one has expired
    /// from idleness.
    pub async fn lookup_or_create(&self, hostname: &str) -> Result<TlsAcceptor, ZnsError> {
        if let Some(entry) = self.entries.get(hostname) {
            let mut guard = entry.value().lock().await;
            if guard.last_used.elapsed() < IDLE_TEARDOWN {
                guard.last_used = std::time::Instant::now();
                return Ok(guard.acceptor.clone());
            }
        }

        let leaf = self
            .ca
            .mint_for(hostname)
            .map_err(|e| ZnsError::ConfigError(e.to_string()))?;
        let acceptor = build_acceptor(&leaf.cert_pem, &leaf.key_pem)?;

        self.entries.insert(
            hostname.to_string(),
            Arc::new(Mutex::new(ListenerEntry {
                acceptor: acceptor.clone(),
                last_used: std::time::Instant::now(),
            })),
        );

        Ok(acceptor)
    }

    /// Removes cache entries that have been idle past the teardown
    /// threshold. Called opportunistically on accept, not on a timer,
    /// so the reactor never wakes up for bookkeeping alone.
    pub async fn evict_idle(&self) {
        let mut stale = Vec::new();
        for entry in self.entries.iter() {
            let guard = entry.value().lock().await;
            if guard.last_used.elapsed() >= IDLE_TEARDOWN {
                stale.push(entry.key().clone());
            }
        }
        for hostname in stale {
            self.entries.remove(&hostname);
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

fn build_acceptor(cert_pem: &str, key_pem: &str) -> Result<TlsAcceptor, ZnsError> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<Result<_, _>>()
        .map_err(|e| ZnsError::ConfigError(format!("malformed leaf certificate: {e}")))?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .map_err(|e| ZnsError::ConfigError(format!("malformed leaf key: {e}")))?
        .ok_or_else(|| ZnsError::ConfigError("no private key found in minted PEM".to_string()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, PrivateKeyDer::from(key))
        .map_err(|e| ZnsError::ConfigError(format!("failed to build TLS server config: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// The single shared plaintext listener (§4.8: "one plaintext listener,
/// created at startup, never destroyed").
pub async fn bind_plaintext(addr: SocketAddr) -> Result<TcpListener, ZnsError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ZnsError::ConfigError(format!("failed to bind plaintext listener on {addr}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn root_ca() -> CaMint {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "zns test root");
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        let pem = format!("{}\n{}", cert.pem(), key.serialize_pem());
        CaMint::from_pem(&pem, 365).unwrap()
    }

    #[tokio::test]
    async fn lookup_or_create_mints_and_caches_an_acceptor() {
        let pool = HttpsListenerPool::new(Arc::new(root_ca()));
        pool.lookup_or_create("example.zkey").await.unwrap();
        assert_eq!(pool.entry_count(), 1);
        pool.lookup_or_create("example.zkey").await.unwrap();
        assert_eq!(pool.entry_count(), 1);
    }

    #[tokio::test]
    async fn distinct_hostnames_get_distinct_entries() {
        let pool = HttpsListenerPool::new(Arc::new(root_ca()));
        pool.lookup_or_create("a.zkey").await.unwrap();
        pool.lookup_or_create("b.zkey").await.unwrap();
        assert_eq!(pool.entry_count(), 2);
    }
}
