//! SOCKS5 front-end state machine (§4.7). One connection, one `S5R`
//! (a "SOCKS5 request" object carrying its phase and whatever bytes the
//! client/upstream have exchanged so far). Only the no-auth method and
//! the CONNECT command are supported; anything else is rejected by
//! closing the socket without writing a reply.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use zns_core::zone::ZonePub;
use zns_core::{ZnsConfig, ZnsError};
use zns_resolver::dht::DhtClient;
use zns_resolver::ResolveOutcome;
use zns_store::RecordStore;

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NO_ACCEPTABLE: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REPLY_SUCCEEDED: u8 = 0x00;
const REPLY_GENERAL_FAILURE: u8 = 0x01;
const REPLY_HOST_UNREACHABLE: u8 = 0x04;
const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Request,
    Resolving,
    DataTransfer,
    WriteThenCleanup,
    SocketWithServer,
}

/// Target requested by the client, parsed from the SOCKS5 request.
#[derive(Debug, Clone)]
pub enum Target {
    Addr(SocketAddr),
    Domain { host: String, port: u16 },
}

/// A SOCKS5 request in flight. `phase` tracks progress; `target` is set
/// once the request's address/domain has been parsed.
pub struct S5R {
    pub phase: Phase,
    pub target: Option<Target>,
}

impl S5R {
    pub fn new() -> Self {
        S5R { phase: Phase::Init, target: None }
    }
}

impl Default for S5R {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` if `host` (or a suffix label of it) matches one of the
/// configured managed suffixes, i.e. should be routed through the name
/// resolver rather than plain DNS.
pub fn is_managed(host: &str, managed_suffixes: &[String]) -> bool {
    let host = host.trim_end_matches('.');
    managed_suffixes.iter().any(|suffix| {
        host.eq_ignore_ascii_case(suffix) || host.to_ascii_lowercase().ends_with(&format!(".{}", suffix.to_ascii_lowercase()))
    })
}

/// Strips the matched managed suffix label (and its separating dot) from
/// `host`, so the resolver only ever sees labels that belong to the name
/// hierarchy rooted at the local zone. Returns `host` unchanged if no
/// suffix matches.
pub fn strip_managed_suffix(host: &str, managed_suffixes: &[String]) -> String {
    let trimmed = host.trim_end_matches('.');
    for suffix in managed_suffixes {
        if trimmed.eq_ignore_ascii_case(suffix) {
            return String::new();
        }
        let dotted = format!(".{}", suffix);
        if trimmed.to_ascii_lowercase().ends_with(&dotted.to_ascii_lowercase()) {
            return trimmed[..trimmed.len() - dotted.len()].to_string();
        }
    }
    trimmed.to_string()
}

/// Drives the greeting + request phases of the handshake. Returns the
/// parsed `Target` on success. On any protocol violation the connection
/// is closed without a reply (§8 scenario 1: a `0x04` version byte gets
/// no response at all).
pub async fn handshake(stream: &mut TcpStream, r: &mut S5R, timeout: Duration) -> Result<Target, ZnsError> {
    r.phase = Phase::Init;
    tokio::time::timeout(timeout, read_greeting(stream))
        .await
        .map_err(|_| protocol_err("handshake timed out waiting for greeting"))??;

    r.phase = Phase::Request;
    let target = tokio::time::timeout(timeout, read_request(stream))
        .await
        .map_err(|_| protocol_err("handshake timed out waiting for request"))??;

    r.target = Some(target.clone());
    Ok(target)
}

fn protocol_err(msg: &str) -> ZnsError {
    ZnsError::ProtocolError(msg.to_string())
}

async fn read_greeting(stream: &mut TcpStream) -> Result<(), ZnsError> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.map_err(|_| protocol_err("truncated greeting"))?;
    let (version, nmethods) = (header[0], header[1]);
    if version != SOCKS_VERSION {
        return Err(protocol_err("unsupported SOCKS version"));
    }

    let mut methods = vec![0u8; nmethods as usize];
    stream.read_exact(&mut methods).await.map_err(|_| protocol_err("truncated method list"))?;

    if !methods.contains(&METHOD_NO_AUTH) {
        let _ = stream.write_all(&[SOCKS_VERSION, METHOD_NO_ACCEPTABLE]).await;
        return Err(ZnsError::MethodNotSupported("no acceptable auth method".into()));
    }

    stream
        .write_all(&[SOCKS_VERSION, METHOD_NO_AUTH])
        .await
        .map_err(|_| protocol_err("failed to write method selection"))?;
    Ok(())
}

async fn read_request(stream: &mut TcpStream) -> Result<Target, ZnsError> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.map_err(|_| protocol_err("truncated request header"))?;
    let (version, cmd, _rsv, atyp) = (header[0], header[1], header[2], header[3]);

    if version != SOCKS_VERSION {
        return Err(protocol_err("unsupported SOCKS version in request"));
    }
    if cmd != CMD_CONNECT {
        write_reply(stream, REPLY_COMMAND_NOT_SUPPORTED).await.ok();
        return Err(ZnsError::MethodNotSupported("only CONNECT is supported".into()));
    }

    let target = match atyp {
        ATYP_IPV4 => {
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.map_err(|_| protocol_err("truncated IPv4 address"))?;
            let port = read_port(stream).await?;
            Target::Addr(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(buf)), port))
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 16];
            stream.read_exact(&mut buf).await.map_err(|_| protocol_err("truncated IPv6 address"))?;
            let port = read_port(stream).await?;
            Target::Addr(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(buf)), port))
        }
        ATYP_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await.map_err(|_| protocol_err("truncated domain length"))?;
            let mut domain_buf = vec![0u8; len_buf[0] as usize];
            stream.read_exact(&mut domain_buf).await.map_err(|_| protocol_err("truncated domain name"))?;
            let host = String::from_utf8(domain_buf).map_err(|_| protocol_err("domain name is not valid utf-8"))?;
            let port = read_port(stream).await?;
            Target::Domain { host, port }
        }
        _ => return Err(protocol_err("unsupported address type")),
    };

    Ok(target)
}

async fn read_port(stream: &mut TcpStream) -> Result<u16, ZnsError> {
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await.map_err(|_| protocol_err("truncated port"))?;
    Ok(u16::from_be_bytes(buf))
}

async fn write_reply(stream: &mut TcpStream, code: u8) -> Result<(), ZnsError> {
    // BND.ADDR/BND.PORT are unused for CONNECT once the byte stream starts
    // forwarding; zero them per RFC 1928.
    let reply = [SOCKS_VERSION, code, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0];
    stream.write_all(&reply).await.map_err(|_| protocol_err("failed to write SOCKS5 reply"))
}

pub async fn write_success(stream: &mut TcpStream) -> Result<(), ZnsError> {
    write_reply(stream, REPLY_SUCCEEDED).await
}

pub async fn write_failure(stream: &mut TcpStream, err: &ZnsError) -> Result<(), ZnsError> {
    write_reply(stream, err.socks5_reply_code()).await
}

/// Resolves a managed-suffix domain target via the name resolver,
/// returning the preferred address bytes and the legacy hostname (if
/// any) to present upstream as the HTTP `Host` header.
pub async fn resolve_managed_target(
    store: &dyn RecordStore,
    dht: &dyn DhtClient,
    config: &ZnsConfig,
    root: ZonePub,
    host: &str,
) -> Result<ResolveOutcome, ZnsError> {
    zns_resolver::resolve(
        store,
        dht,
        root,
        host,
        Duration::from_millis(config.resolver.resolution_budget_ms),
        Duration::from_millis(config.resolver.dht_fetch_timeout_ms),
    )
    .await
}
