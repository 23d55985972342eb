use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration, loaded from an optional YAML file merged with
/// `ZNS_`-prefixed environment overrides (double-underscore separated for
/// nested keys).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZnsConfig {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub ca: CaConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// SOCKS5 listener address (§6 default port 7777).
    #[serde(default = "default_socks5_addr")]
    pub socks5_addr: SocketAddr,

    /// Managed suffixes (§4.7/glossary): a human-readable one and a
    /// key-based one, matched case-insensitively on a label boundary.
    #[serde(default = "default_managed_suffixes")]
    pub managed_suffixes: Vec<String>,

    /// SOCKS5 handshake → HTTPS handover timeout, milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// HTTPS listener idle timeout, milliseconds.
    #[serde(default = "default_listener_idle_ms")]
    pub listener_idle_ms: u64,

    /// Upstream connect timeout, milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upstream total transfer timeout, milliseconds.
    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,

    /// Bridge ring buffer size, bytes.
    #[serde(default = "default_ring_buffer_size")]
    pub ring_buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Per-request resolution budget, milliseconds (§4.4 step 6, default 30s).
    #[serde(default = "default_resolution_budget_ms")]
    pub resolution_budget_ms: u64,

    /// Per-fetch DHT timeout, milliseconds.
    #[serde(default = "default_dht_fetch_timeout_ms")]
    pub dht_fetch_timeout_ms: u64,

    /// Prefer IPv4 over IPv6 when both are present (§4.4).
    #[serde(default = "default_true")]
    pub prefer_ipv4: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// Directory for the `file` backend's per-zone JSON files.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,

    /// Maximum time a cached block is kept regardless of its own
    /// expiration (§3 "lesser of its expiration and a system-wide maximum").
    #[serde(default = "default_max_cache_ms")]
    pub max_cache_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Directory holding one file per ego, named by the hex short-hash of
    /// its public key (§6 "Persisted state").
    #[serde(default = "default_identity_dir")]
    pub key_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaConfig {
    /// PEM file containing both the root CA cert and its private key
    /// (§6 `--authority`).
    #[serde(default = "default_authority_path")]
    pub authority_path: PathBuf,

    /// Leaf certificate validity, days (§4.6, one year).
    #[serde(default = "default_leaf_validity_days")]
    pub leaf_validity_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,

    #[serde(default = "default_true")]
    pub access_log: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            socks5_addr: default_socks5_addr(),
            managed_suffixes: default_managed_suffixes(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            listener_idle_ms: default_listener_idle_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            transfer_timeout_ms: default_transfer_timeout_ms(),
            ring_buffer_size: default_ring_buffer_size(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            resolution_budget_ms: default_resolution_budget_ms(),
            dht_fetch_timeout_ms: default_dht_fetch_timeout_ms(),
            prefer_ipv4: default_true(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: default_store_backend(),
            dir: default_store_dir(),
            max_cache_ms: default_max_cache_ms(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            key_dir: default_identity_dir(),
        }
    }
}

impl Default for CaConfig {
    fn default() -> Self {
        CaConfig {
            authority_path: default_authority_path(),
            leaf_validity_days: default_leaf_validity_days(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            log_level: default_log_level(),
            json_logs: false,
            access_log: true,
        }
    }
}

fn default_socks5_addr() -> SocketAddr {
    "127.0.0.1:7777".parse().unwrap()
}
fn default_managed_suffixes() -> Vec<String> {
    vec!["zkey".to_string(), "gns".to_string()]
}
fn default_handshake_timeout_ms() -> u64 {
    15_000
}
fn default_listener_idle_ms() -> u64 {
    5 * 60 * 1000
}
fn default_connect_timeout_ms() -> u64 {
    10 * 60 * 1000
}
fn default_transfer_timeout_ms() -> u64 {
    10 * 60 * 1000
}
fn default_ring_buffer_size() -> usize {
    16 * 1024
}
fn default_resolution_budget_ms() -> u64 {
    30_000
}
fn default_dht_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}
fn default_store_dir() -> PathBuf {
    PathBuf::from("./data/zones")
}
fn default_max_cache_ms() -> u64 {
    24 * 60 * 60 * 1000
}
fn default_identity_dir() -> PathBuf {
    PathBuf::from("./data/identities")
}
fn default_authority_path() -> PathBuf {
    PathBuf::from("./authority.pem")
}
fn default_leaf_validity_days() -> u32 {
    365
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ZnsConfig {
    fn default() -> Self {
        ZnsConfig {
            proxy: ProxyConfig::default(),
            resolver: ResolverConfig::default(),
            store: StoreConfig::default(),
            identity: IdentityConfig::default(),
            ca: CaConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ZnsConfig {
    /// Merge an optional YAML config file with `ZNS_`-prefixed env vars
    /// (nested keys separated by `__`), matching `AndoConfig::load`.
    pub fn load(config_path: Option<&std::path::Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(ZnsConfig::default()));
        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Yaml::file(path));
            }
        }
        figment = figment.merge(Env::prefixed("ZNS_").split("__"));
        figment.extract()
    }
}
