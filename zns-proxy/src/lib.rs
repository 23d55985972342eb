//! The data plane (C7–C11, §4.7–§4.11): SOCKS5 front-end, HTTPS listener
//! pool, upstream client, bridge, and header rewriter, all driven from a
//! single reactor.

pub mod bridge;
pub mod https_pool;
pub mod reactor;
pub mod rewrite;
pub mod socks5;
pub mod upstream;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;

use zns_core::zone::ZonePub;
use zns_core::{ZnsConfig, ZnsError};
use zns_resolver::dht::DhtClient;
use zns_store::RecordStore;

use https_pool::HttpsListenerPool;
use socks5::{Phase, Target, S5R};

type ClientTls = TlsStream<TcpStream>;

/// Everything a single accepted SOCKS5 connection needs, bundled so the
/// per-connection task can be spawned with an owned clone of each handle.
#[derive(Clone)]
pub struct ProxyServer {
    pub config: Arc<ZnsConfig>,
    pub store: Arc<dyn RecordStore>,
    pub dht: Arc<dyn DhtClient>,
    pub https_pool: Arc<HttpsListenerPool>,
    pub root_zone: ZonePub,
}

impl ProxyServer {
    pub fn new(
        config: Arc<ZnsConfig>,
        store: Arc<dyn RecordStore>,
        dht: Arc<dyn DhtClient>,
        https_pool: Arc<HttpsListenerPool>,
        root_zone: ZonePub,
    ) -> Self {
        ProxyServer { config, store, dht, https_pool, root_zone }
    }

    /// Accepts connections on the configured SOCKS5 address forever,
    /// spawning one task per connection onto the current `LocalSet`.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), ZnsError> {
        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| ZnsError::ProtocolError(format!("accept failed: {e}")))?;
            let server = self.clone();
            tokio::task::spawn_local(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    tracing::warn!(peer = %peer, error = %e, "socks5 connection ended with an error");
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), ZnsError> {
        let mut r = S5R::new();
        let handshake_timeout = std::time::Duration::from_millis(self.config.proxy.handshake_timeout_ms);

        let target = match socks5::handshake(&mut stream, &mut r, handshake_timeout).await {
            Ok(t) => t,
            Err(_) => {
                // §8 scenario 1: a malformed greeting closes the socket
                // without writing any bytes.
                return Ok(());
            }
        };

        r.phase = Phase::Resolving;
        let host = match &target {
            Target::Domain { host, .. } => host.clone(),
            Target::Addr(addr) => addr.ip().to_string(),
        };

        if socks5::is_managed(&host, &self.config.proxy.managed_suffixes) {
            self.handle_managed(stream, &mut r, &host).await
        } else {
            self.handle_passthrough(&mut stream, &mut r, &target).await
        }
    }

    async fn handle_managed(&self, mut stream: TcpStream, r: &mut S5R, host: &str) -> Result<(), ZnsError> {
        // The resolver only ever sees labels under the local zone; the
        // managed suffix is routing information, not part of the name.
        let stripped_host = socks5::strip_managed_suffix(host, &self.config.proxy.managed_suffixes);

        let outcome = match socks5::resolve_managed_target(
            self.store.as_ref(),
            self.dht.as_ref(),
            &self.config,
            self.root_zone,
            &stripped_host,
        )
        .await
        {
            Ok(o) => o,
            Err(e) => {
                r.phase = Phase::WriteThenCleanup;
                socks5::write_failure(&mut stream, &e).await.ok();
                return Err(e);
            }
        };

        let addr = outcome
            .preferred_address(self.config.resolver.prefer_ipv4)
            .ok_or_else(|| ZnsError::ResolutionNoRecord(host.to_string()))?
            .to_vec();
        let legacy_hostname = outcome.legacy_hostname.unwrap_or_else(|| host.to_string());
        // The authority the browser actually connected to; substituted
        // back into rewritten Location/Set-Cookie headers (§4.10).
        let real_origin_authority = host.to_string();

        r.phase = Phase::SocketWithServer;
        socks5::write_success(&mut stream).await?;

        // Past this point the client speaks TLS to us (we terminate with a
        // leaf minted for the hostname it dialed) and we speak HTTP to the
        // real origin at the resolved address, bridging the two (§4.8–§4.10).
        let acceptor = self.https_pool.lookup_or_create(host).await?;
        let mut tls = acceptor
            .accept(stream)
            .await
            .map_err(|e| ZnsError::UpstreamError(format!("TLS accept failed: {e}")))?;

        r.phase = Phase::DataTransfer;
        match self
            .prepare_upstream_response(&mut tls, &addr, &legacy_hostname)
            .await
        {
            Ok((mut upstream_conn, status, reason, resp_headers, leftover_body)) => {
                stream_response(
                    &mut tls,
                    &mut upstream_conn,
                    status,
                    &reason,
                    resp_headers,
                    leftover_body,
                    &legacy_hostname,
                    &real_origin_authority,
                    self.config.proxy.ring_buffer_size,
                )
                .await
            }
            Err(e) => {
                write_error_response(&mut tls, &e).await;
                Err(e)
            }
        }
    }

    /// Reads the browser's HTTP request off `tls`, forwards it upstream
    /// (including any request body), and reads back the upstream's
    /// response head, ready to be streamed to the browser.
    #[allow(clippy::type_complexity)]
    async fn prepare_upstream_response(
        &self,
        tls: &mut ClientTls,
        addr: &[u8],
        legacy_hostname: &str,
    ) -> Result<(upstream::UpstreamConn, u16, String, Vec<(String, String)>, Vec<u8>), ZnsError> {
        let (req_head, mut req_leftover) = read_head_from_tls(tls).await?;
        let (method, path, mut req_headers) = parse_request_head(&req_head)?;

        let content_type = req_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.clone());
        let has_body = upstream::method_allows_body(&method, content_type.as_deref())?;
        rewrite::strip_accept_encoding(&mut req_headers);

        let connect_timeout = Duration::from_millis(self.config.proxy.connect_timeout_ms);
        let mut upstream_conn =
            upstream::UpstreamConn::connect(addr, 80, legacy_hostname.to_string(), connect_timeout).await?;
        upstream_conn.write_request_head(&method, &path, req_headers.clone()).await?;

        if has_body {
            let mut remaining = content_length(&req_headers)
                .unwrap_or(0)
                .saturating_sub(req_leftover.len());
            if !req_leftover.is_empty() {
                upstream_conn.write_body_chunk(&req_leftover).await?;
            }
            req_leftover.clear();
            let mut tmp = [0u8; 4096];
            while remaining > 0 {
                let want = remaining.min(tmp.len());
                let n = tls
                    .read(&mut tmp[..want])
                    .await
                    .map_err(|e| ZnsError::UpstreamError(e.to_string()))?;
                if n == 0 {
                    break;
                }
                upstream_conn.write_body_chunk(&tmp[..n]).await?;
                remaining -= n;
            }
        }

        let (resp_head, resp_leftover) = read_head_from_upstream(&mut upstream_conn).await?;
        let (status, reason, resp_headers) = parse_response_head(&resp_head)?;
        Ok((upstream_conn, status, reason, resp_headers, resp_leftover))
    }

    async fn handle_passthrough(&self, stream: &mut TcpStream, r: &mut S5R, target: &Target) -> Result<(), ZnsError> {
        let addr = match target {
            Target::Addr(a) => *a,
            Target::Domain { host, port } => {
                let resolved = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| ZnsError::UpstreamError(e.to_string()))?
                    .next()
                    .ok_or_else(|| ZnsError::ResolutionNoRecord(host.clone()))?;
                resolved
            }
        };

        let connect_timeout = std::time::Duration::from_millis(self.config.proxy.connect_timeout_ms);
        let mut upstream = match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(s)) => s,
            _ => {
                r.phase = Phase::WriteThenCleanup;
                let err = ZnsError::UpstreamError(format!("connect to {addr} failed"));
                socks5::write_failure(stream, &err).await.ok();
                return Err(err);
            }
        };

        r.phase = Phase::SocketWithServer;
        socks5::write_success(stream).await?;

        r.phase = Phase::DataTransfer;
        tokio::io::copy_bidirectional(stream, &mut upstream)
            .await
            .map_err(|e| ZnsError::UpstreamError(e.to_string()))?;
        Ok(())
    }
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// Reads from `tls` until a full HTTP head (terminated by a blank line) has
/// arrived, returning the head bytes and whatever body bytes were read
/// along with it.
async fn read_head_from_tls(tls: &mut ClientTls) -> Result<(Vec<u8>, Vec<u8>), ZnsError> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        if let Some(pos) = find_double_crlf(&buf) {
            let body = buf.split_off(pos);
            return Ok((buf, body));
        }
        let n = tls
            .read(&mut tmp)
            .await
            .map_err(|e| ZnsError::ProtocolError(e.to_string()))?;
        if n == 0 {
            return Err(ZnsError::ProtocolError("connection closed before request head completed".into()));
        }
        buf.extend_from_slice(&tmp[..n]);
    }
}

async fn read_head_from_upstream(upstream: &mut upstream::UpstreamConn) -> Result<(Vec<u8>, Vec<u8>), ZnsError> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        if let Some(pos) = find_double_crlf(&buf) {
            let body = buf.split_off(pos);
            return Ok((buf, body));
        }
        let n = upstream.read_chunk(&mut tmp).await?;
        if n == 0 {
            return Err(ZnsError::UpstreamError("upstream closed before response head completed".into()));
        }
        buf.extend_from_slice(&tmp[..n]);
    }
}

fn parse_request_head(head: &[u8]) -> Result<(String, String, Vec<(String, String)>), ZnsError> {
    let mut headers_buf = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers_buf);
    match req.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return Err(ZnsError::ProtocolError("malformed HTTP request head".into())),
    }
    let method = req
        .method
        .ok_or_else(|| ZnsError::ProtocolError("request head missing method".into()))?
        .to_string();
    let path = req
        .path
        .ok_or_else(|| ZnsError::ProtocolError("request head missing path".into()))?
        .to_string();
    let headers = req
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();
    Ok((method, path, headers))
}

fn parse_response_head(head: &[u8]) -> Result<(u16, String, Vec<(String, String)>), ZnsError> {
    let mut headers_buf = [httparse::EMPTY_HEADER; 64];
    let mut resp = httparse::Response::new(&mut headers_buf);
    match resp.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return Err(ZnsError::ProtocolError("malformed HTTP response head".into())),
    }
    let status = resp
        .code
        .ok_or_else(|| ZnsError::ProtocolError("response head missing status code".into()))?;
    let reason = resp.reason.unwrap_or("").to_string();
    let headers = resp
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();
    Ok((status, reason, headers))
}

fn content_length(headers: &[(String, String)]) -> Option<usize> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
}

async fn write_error_response(tls: &mut ClientTls, err: &ZnsError) {
    let body = err.to_string();
    let head = format!(
        "HTTP/1.1 {} Error\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        err.http_status(),
        body.len()
    );
    let _ = tls.write_all(head.as_bytes()).await;
    let _ = tls.write_all(body.as_bytes()).await;
}

/// Applies the header rewriter (§4.10) to the upstream's response head,
/// writes it to the browser, then streams the body through a `RingBuffer`
/// under the backpressure protocol until the upstream reports completion
/// and the buffer has drained.
#[allow(clippy::too_many_arguments)]
async fn stream_response(
    tls: &mut ClientTls,
    upstream_conn: &mut upstream::UpstreamConn,
    status: u16,
    reason: &str,
    resp_headers: Vec<(String, String)>,
    leftover_body: Vec<u8>,
    legacy_hostname: &str,
    real_origin_authority: &str,
    ring_buffer_size: usize,
) -> Result<(), ZnsError> {
    let resp_content_length = content_length(&resp_headers);

    let mut out_headers = Vec::with_capacity(resp_headers.len() + 1);
    for (name, value) in &resp_headers {
        if name.eq_ignore_ascii_case("set-cookie") {
            out_headers.push((
                name.clone(),
                rewrite::rewrite_set_cookie(value, legacy_hostname, real_origin_authority),
            ));
        } else if name.eq_ignore_ascii_case("location") {
            out_headers.push((
                name.clone(),
                rewrite::rewrite_location(value, legacy_hostname, real_origin_authority),
            ));
        } else {
            out_headers.push((name.clone(), value.clone()));
        }
    }
    out_headers.push((
        "Access-Control-Allow-Origin".to_string(),
        rewrite::cors_header_value("https", real_origin_authority),
    ));

    let mut head = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in &out_headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    tls.write_all(head.as_bytes())
        .await
        .map_err(|e| ZnsError::UpstreamError(e.to_string()))?;

    let mut ring = bridge::RingBuffer::new(ring_buffer_size);
    let mut pending = leftover_body;
    let mut delivered = pending.len();
    let mut upstream_done = resp_content_length.map(|cl| delivered >= cl).unwrap_or(false);

    loop {
        if !pending.is_empty() {
            let (written, _) = ring.produce(&pending);
            if written > 0 {
                pending.drain(..written);
            }
        } else if !upstream_done {
            let mut tmp = vec![0u8; ring.capacity().max(1)];
            let n = upstream_conn.read_chunk(&mut tmp).await?;
            if n == 0 {
                upstream_done = true;
            } else {
                delivered += n;
                pending = tmp[..n].to_vec();
                if let Some(cl) = resp_content_length {
                    if delivered >= cl {
                        upstream_done = true;
                    }
                }
            }
        }

        if !ring.is_empty() {
            let mut out = vec![0u8; ring.capacity()];
            let n = ring.consume(&mut out);
            tls.write_all(&out[..n])
                .await
                .map_err(|e| ZnsError::UpstreamError(e.to_string()))?;
        }

        if upstream_done && pending.is_empty() && ring.is_empty() {
            break;
        }
    }

    tls.flush().await.map_err(|e| ZnsError::UpstreamError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};
    use zns_resolver::dht::LoopbackDht;
    use zns_store::MemoryStore;

    fn root_ca_pem() -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "zns test root");
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        format!("{}\n{}", cert.pem(), key.serialize_pem())
    }

    fn test_server() -> ProxyServer {
        let config = Arc::new(ZnsConfig::default());
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let dht: Arc<dyn DhtClient> = Arc::new(LoopbackDht::new());
        let ca = Arc::new(zns_ca::CaMint::from_pem(&root_ca_pem(), 365).unwrap());
        let pool = Arc::new(HttpsListenerPool::new(ca));
        ProxyServer::new(config, store, dht, pool, ZonePub([0u8; 32]))
    }

    #[tokio::test]
    async fn passthrough_reports_a_socks5_failure_when_connect_fails() {
        let server = test_server();
        let target = Target::Addr("127.0.0.1:1".parse().unwrap());
        let (mut client, mut srv) = tokio::io::duplex(256);
        let mut r = S5R::new();

        let server_task = tokio::spawn(async move {
            let result = server.handle_passthrough(&mut srv, &mut r, &target).await;
            (result, r.phase)
        });

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 0x05);
        assert_ne!(reply[1], 0x00);

        let (result, phase) = server_task.await.unwrap();
        assert!(result.is_err());
        assert_eq!(phase, Phase::WriteThenCleanup);
    }
}
