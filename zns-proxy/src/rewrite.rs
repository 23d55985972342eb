//! Header rewriter (§4.10): `Set-Cookie`/`Location` domain rewriting, CORS
//! header injection, and `Accept-Encoding` stripping. The piece a reader
//! should treat as educational — no framework hides these mechanics.

/// Rewrite a `Set-Cookie` response header. If the cookie's `Domain`
/// attribute equals or is a suffix of `legacy_hostname`, the domain is
/// substituted with `real_origin_authority`. Otherwise the attribute is
/// invalid for this response and is dropped (remaining attributes kept),
/// with a warning.
pub fn rewrite_set_cookie(value: &str, legacy_hostname: &str, real_origin_authority: &str) -> String {
    let parts: Vec<&str> = value.split(';').collect();
    let mut out = Vec::with_capacity(parts.len());

    for part in parts {
        let trimmed = part.trim();
        if let Some(domain) = trimmed
            .strip_prefix("Domain=")
            .or_else(|| trimmed.strip_prefix("domain="))
        {
            let domain = domain.trim_start_matches('.');
            if domain.eq_ignore_ascii_case(legacy_hostname)
                || legacy_hostname
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
            {
                out.push(format!("Domain={}", real_origin_authority));
            } else {
                tracing::warn!(domain, legacy_hostname, "cookie Domain invalid for this response, dropping attribute");
                // drop this attribute, keep the rest
            }
        } else {
            out.push(part.to_string());
        }
    }

    out.join(";")
}

/// Rewrite a `Location` response header. If its authority equals
/// `scheme://legacy_hostname`, substitute `scheme://real_origin_authority`;
/// otherwise pass unchanged.
pub fn rewrite_location(value: &str, legacy_hostname: &str, real_origin_authority: &str) -> String {
    for scheme in ["https://", "http://"] {
        if let Some(rest) = value.strip_prefix(scheme) {
            if let Some(authority) = rest.strip_prefix(legacy_hostname) {
                let boundary_ok = authority.is_empty() || matches!(authority.as_bytes()[0], b'/' | b':' | b'?' | b'#');
                if boundary_ok {
                    return format!("{}{}{}", scheme, real_origin_authority, authority);
                }
            }
        }
    }
    value.to_string()
}

/// The CORS header added before the first body byte is emitted, so cross-
/// origin XHR from the legacy name is treated as same-origin by the browser.
pub fn cors_header_value(scheme: &str, legacy_hostname: &str) -> String {
    format!("{}://{}", scheme, legacy_hostname)
}

/// `Accept-Encoding` request headers are forcibly emptied before forwarding
/// upstream — the rewriter does not implement gzip decoding.
pub fn strip_accept_encoding(headers: &mut Vec<(String, String)>) {
    headers.retain(|(name, _)| !name.eq_ignore_ascii_case("accept-encoding"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_domain_matching_legacy_hostname_is_rewritten() {
        let out = rewrite_set_cookie(
            "sid=abc; Domain=example.com; Path=/",
            "www.example.com",
            "example.zkey",
        );
        assert_eq!(out, "sid=abc;Domain=example.zkey;Path=/");
    }

    #[test]
    fn set_cookie_domain_not_matching_is_dropped_but_other_attrs_kept() {
        let out = rewrite_set_cookie("sid=abc; Domain=evil.com; Path=/", "www.example.com", "example.zkey");
        assert_eq!(out, "sid=abc;Path=/");
    }

    #[test]
    fn location_rewrite_substitutes_matching_authority() {
        let out = rewrite_location(
            "https://www.example.com/next",
            "www.example.com",
            "example.zkey",
        );
        assert_eq!(out, "https://example.zkey/next");
    }

    #[test]
    fn location_rewrite_passes_through_unrelated_authority() {
        let out = rewrite_location("https://cdn.other.com/asset.js", "www.example.com", "example.zkey");
        assert_eq!(out, "https://cdn.other.com/asset.js");
    }

    #[test]
    fn location_rewrite_does_not_match_a_longer_hostname_sharing_the_prefix() {
        let out = rewrite_location(
            "https://www.example.com.evil/",
            "www.example.com",
            "example.zkey",
        );
        assert_eq!(out, "https://www.example.com.evil/");
    }

    #[test]
    fn accept_encoding_is_stripped_case_insensitively() {
        let mut headers = vec![
            ("Accept-Encoding".to_string(), "gzip".to_string()),
            ("accept-encoding".to_string(), "br".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
        ];
        strip_accept_encoding(&mut headers);
        assert_eq!(headers, vec![("Accept".to_string(), "*/*".to_string())]);
    }

    #[test]
    fn cors_header_uses_scheme_and_legacy_hostname() {
        assert_eq!(cors_header_value("https", "example.zkey"), "https://example.zkey");
    }
}
