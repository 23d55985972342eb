use serde::{Deserialize, Serialize};

/// Structured access-log entry for one bridged HTTP exchange (§4.10).
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub timestamp: String,
    pub legacy_hostname: String,
    pub client_addr: String,
    pub method: String,
    pub path: String,
    pub response_status: u16,
    pub latency_ms: f64,
    pub upstream_addr: Option<String>,
}

impl AccessLogEntry {
    /// Emits this entry as a single structured `tracing` event at `info`,
    /// the same shape whether or not JSON-formatted logging is enabled —
    /// the subscriber's formatter decides the wire representation.
    pub fn emit(&self) {
        tracing::info!(
            legacy_hostname = %self.legacy_hostname,
            client_addr = %self.client_addr,
            method = %self.method,
            path = %self.path,
            status = self.response_status,
            latency_ms = self.latency_ms,
            upstream_addr = self.upstream_addr.as_deref().unwrap_or(""),
            "access"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_does_not_panic_without_an_upstream_addr() {
        let entry = AccessLogEntry {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            legacy_hostname: "www.example.com".to_string(),
            client_addr: "127.0.0.1:51000".to_string(),
            method: "GET".to_string(),
            path: "/".to_string(),
            response_status: 200,
            latency_ms: 12.5,
            upstream_addr: None,
        };
        entry.emit();
    }
}
