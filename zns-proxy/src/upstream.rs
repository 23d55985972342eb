//! Upstream HTTP client (C9, §4.9): connects to the resolved address,
//! presents the legacy hostname as the `Host` header, optionally forces
//! an IP family, and never follows redirects itself — redirect handling
//! belongs to the browser, after `Location` rewriting (§4.10).

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use zns_core::ZnsError;

/// Which request methods the bridge is willing to forward a body for
/// (§4.10): `PUT`, form-urlencoded and multipart `POST` bodies are
/// streamed; `HEAD`/`GET` carry no body; anything else fails the request
/// rather than guess at semantics it doesn't implement.
pub fn method_allows_body(method: &str, content_type: Option<&str>) -> Result<bool, ZnsError> {
    match method {
        "GET" | "HEAD" => Ok(false),
        "PUT" => Ok(true),
        "POST" => match content_type {
            Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => Ok(true),
            Some(ct) if ct.starts_with("multipart/form-data") => Ok(true),
            _ => Err(ZnsError::MethodNotSupported(format!(
                "POST with content-type {:?} is not supported",
                content_type
            ))),
        },
        other => Err(ZnsError::MethodNotSupported(other.to_string())),
    }
}

/// A connection to the real origin, established using the resolved
/// address while the `Host:` header presented to it carries the legacy
/// name the origin still expects.
pub struct UpstreamConn {
    stream: TcpStream,
    pub host_header: String,
}

impl UpstreamConn {
    pub async fn connect(
        addr_bytes: &[u8],
        port: u16,
        host_header: String,
        connect_timeout: Duration,
    ) -> Result<Self, ZnsError> {
        let ip = addr_from_bytes(addr_bytes)?;
        let sock_addr = SocketAddr::new(ip, port);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(sock_addr))
            .await
            .map_err(|_| ZnsError::UpstreamError(format!("connect to {sock_addr} timed out")))?
            .map_err(|e| ZnsError::UpstreamError(format!("connect to {sock_addr} failed: {e}")))?;

        Ok(UpstreamConn { stream, host_header })
    }

    /// Writes a request line and headers, substituting `Host` with the
    /// legacy hostname regardless of what the caller passed in.
    pub async fn write_request_head(
        &mut self,
        method: &str,
        path: &str,
        mut headers: Vec<(String, String)>,
    ) -> Result<(), ZnsError> {
        headers.retain(|(name, _)| !name.eq_ignore_ascii_case("host"));
        headers.insert(0, ("Host".to_string(), self.host_header.clone()));

        let mut head = format!("{method} {path} HTTP/1.1\r\n");
        for (name, value) in &headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        self.stream
            .write_all(head.as_bytes())
            .await
            .map_err(|e| ZnsError::UpstreamError(e.to_string()))
    }

    pub async fn write_body_chunk(&mut self, chunk: &[u8]) -> Result<(), ZnsError> {
        self.stream
            .write_all(chunk)
            .await
            .map_err(|e| ZnsError::UpstreamError(e.to_string()))
    }

    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ZnsError> {
        self.stream
            .read(buf)
            .await
            .map_err(|e| ZnsError::UpstreamError(e.to_string()))
    }
}

fn addr_from_bytes(bytes: &[u8]) -> Result<IpAddr, ZnsError> {
    match bytes.len() {
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(bytes);
            Ok(IpAddr::from(octets))
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Ok(IpAddr::from(octets))
        }
        n => Err(ZnsError::UpstreamError(format!("unrecognized address length {n}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_head_carry_no_body() {
        assert_eq!(method_allows_body("GET", None).unwrap(), false);
        assert_eq!(method_allows_body("HEAD", None).unwrap(), false);
    }

    #[test]
    fn put_always_allows_a_body() {
        assert_eq!(method_allows_body("PUT", None).unwrap(), true);
    }

    #[test]
    fn post_form_urlencoded_allows_a_body() {
        assert_eq!(
            method_allows_body("POST", Some("application/x-www-form-urlencoded")).unwrap(),
            true
        );
    }

    #[test]
    fn post_multipart_allows_a_body() {
        assert_eq!(
            method_allows_body("POST", Some("multipart/form-data; boundary=x")).unwrap(),
            true
        );
    }

    #[test]
    fn post_json_is_rejected() {
        assert!(method_allows_body("POST", Some("application/json")).is_err());
    }

    #[test]
    fn delete_is_rejected() {
        assert!(method_allows_body("DELETE", None).is_err());
    }

    #[test]
    fn ipv4_address_bytes_parse() {
        let ip = addr_from_bytes(&[93, 184, 216, 34]).unwrap();
        assert_eq!(ip.to_string(), "93.184.216.34");
    }

    #[test]
    fn malformed_address_length_is_rejected() {
        assert!(addr_from_bytes(&[1, 2, 3]).is_err());
    }
}
