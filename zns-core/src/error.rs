use thiserror::Error;

/// Unified error taxonomy for the naming system and proxy.
#[derive(Error, Debug)]
pub enum ZnsError {
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("resolution timed out after {0:?}")]
    ResolutionTimeout(std::time::Duration),

    #[error("resolution cycle detected at zone {0}")]
    ResolutionCycle(String),

    #[error("no record found for {0}")]
    ResolutionNoRecord(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("method not supported: {0}")]
    MethodNotSupported(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ZnsError {
    /// SOCKS5 reply code per §7 (ResolutionTimeout/ResolutionCycle -> HostUnreachable,
    /// everything else resolver-related -> GeneralFailure).
    pub fn socks5_reply_code(&self) -> u8 {
        match self {
            ZnsError::ResolutionTimeout(_) => 0x04, // host unreachable
            ZnsError::ResolutionCycle(_) => 0x01,   // general failure
            ZnsError::ResolutionNoRecord(_) => 0x04,
            ZnsError::ProtocolError(_) => 0x01,
            _ => 0x01,
        }
    }

    /// HTTP status for errors surfaced through the HTTPS server pool.
    pub fn http_status(&self) -> u16 {
        match self {
            ZnsError::MethodNotSupported(_) => 501,
            ZnsError::UpstreamError(_) => 502,
            ZnsError::ConfigError(_) => 500,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_cycle_map_to_expected_socks5_codes() {
        assert_eq!(
            ZnsError::ResolutionTimeout(std::time::Duration::from_secs(30)).socks5_reply_code(),
            0x04
        );
        assert_eq!(
            ZnsError::ResolutionCycle("zoneA".into()).socks5_reply_code(),
            0x01
        );
        assert_eq!(
            ZnsError::ResolutionNoRecord("foo".into()).socks5_reply_code(),
            0x04
        );
    }

    #[test]
    fn method_not_supported_is_501() {
        assert_eq!(ZnsError::MethodNotSupported("TRACE".into()).http_status(), 501);
    }

    #[test]
    fn upstream_error_is_502() {
        assert_eq!(ZnsError::UpstreamError("connect refused".into()).http_status(), 502);
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            ZnsError::ResolutionCycle("abcd".into()).to_string(),
            "resolution cycle detected at zone abcd"
        );
    }
}
