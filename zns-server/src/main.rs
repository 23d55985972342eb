// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  zns — decentralized naming proxy
//
//  Architecture: one reactor thread, cooperative async tasks
//  Front end:    SOCKS5 on --port (default 7777)
//  Data plane:   per-hostname HTTPS listener pool, minted off --authority
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use zns_core::zone::ZonePub;
use zns_core::ZnsConfig;
use zns_identity::IdentityRegistry;
use zns_proxy::https_pool::HttpsListenerPool;
use zns_proxy::ProxyServer;
use zns_resolver::dht::LoopbackDht;
use zns_store::{FileStore, MemoryStore, RecordStore};

#[derive(Parser, Debug)]
#[command(name = "zns", version, about = "Decentralized name resolution and naming-aware intercepting proxy")]
struct Cli {
    /// SOCKS5 listen port (§6).
    #[arg(long)]
    port: Option<u16>,

    /// PEM file containing both the root CA certificate and its private key (§6).
    #[arg(long)]
    authority: Option<PathBuf>,

    /// Path to a YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level, overridden by `RUST_LOG` if set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Name of the ego whose zone is the resolver's root. Created on first
    /// run if it does not already exist.
    #[arg(long, default_value = "master")]
    ego: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "fatal error before the reactor started");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ZnsConfig::load(cli.config.as_deref())?;
    zns_observability::logger::init(&cli.log_level, config.observability.json_logs);

    if let Some(port) = cli.port {
        config.proxy.socks5_addr.set_port(port);
    }
    if let Some(authority) = cli.authority.clone() {
        config.ca.authority_path = authority;
    }
    let config = Arc::new(config);

    info!(version = env!("CARGO_PKG_VERSION"), "zns starting");

    std::fs::create_dir_all(&config.identity.key_dir)?;
    let identities = IdentityRegistry::load(config.identity.key_dir.clone())?;
    let root_sk = match identities.secret_of(&cli.ego) {
        Some(sk) => sk,
        None => {
            info!(ego = %cli.ego, "no existing ego with this name, creating one");
            let entry = identities.create(&cli.ego, &mut rand::rngs::OsRng)?;
            identities.secret_of(&entry.name).expect("just created")
        }
    };
    let root_zone = ZonePub(root_sk.public_of().to_bytes());
    info!(ego = %cli.ego, zone = %root_zone.to_hex(), "resolver root zone");

    let store: Arc<dyn RecordStore> = match config.store.backend {
        zns_core::config::StoreBackend::Memory => Arc::new(MemoryStore::new()),
        zns_core::config::StoreBackend::File => {
            std::fs::create_dir_all(&config.store.dir)?;
            Arc::new(FileStore::new(config.store.dir.clone()))
        }
    };
    let dht = Arc::new(LoopbackDht::new());

    let ca = Arc::new(zns_ca::CaMint::load(&config.ca.authority_path, config.ca.leaf_validity_days)?);
    let https_pool = Arc::new(HttpsListenerPool::new(ca));

    let server = Arc::new(ProxyServer::new(config.clone(), store, dht, https_pool, root_zone));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();

    let socks_addr = config.proxy.socks5_addr;
    local.block_on(&runtime, async move {
        let listener = tokio::net::TcpListener::bind(socks_addr).await?;
        info!(addr = %socks_addr, "SOCKS5 listener ready");
        setup_signal_handler();

        tokio::select! {
            result = server.serve(listener) => result,
            _ = wait_for_shutdown() => {
                info!("shutdown signal received, stopping");
                Ok(())
            }
        }
    })?;

    info!("zns stopped");
    Ok(())
}

static SHUTDOWN: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

async fn wait_for_shutdown() {
    while !SHUTDOWN.load(std::sync::atomic::Ordering::Relaxed) {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

fn setup_signal_handler() {
    for sig in [libc::SIGTERM, libc::SIGINT] {
        unsafe {
            libc::signal(sig, signal_handler as libc::sighandler_t);
        }
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, std::sync::atomic::Ordering::Relaxed);
}
