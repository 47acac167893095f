//! Caller identity resolution.
//!
//! Derives a stable identity string from request metadata so that every
//! request from one client lands on the same rate-limit key. Resolution is
//! a pure function of the metadata and can never fail: unparseable input
//! maps to a shared sentinel bucket instead of blocking the request.

use std::net::{IpAddr, SocketAddr};

/// Sentinel identity for requests whose address cannot be parsed.
///
/// All such traffic shares one bucket and is rate-limited as a pool, which
/// trades accuracy for availability.
pub const UNKNOWN_IDENTITY: &str = "unknown_ip";

/// Connection and header metadata for one inbound request.
///
/// This is the only thing the admission core needs from the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Raw `X-Forwarded-For` header value, if present.
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` header value, if present.
    pub real_ip: Option<String>,
    /// Direct peer address, as reported by the transport. May carry a port.
    pub remote_addr: String,
}

/// Resolve the caller identity for `meta`.
///
/// Priority order, first usable value wins:
/// 1. the first comma-separated `X-Forwarded-For` entry (the client-facing
///    hop in a trusted proxy chain; trust boundaries are not re-validated
///    here),
/// 2. `X-Real-IP`,
/// 3. the direct peer address.
///
/// The selected value is normalized through strict IP parsing (both
/// address families); `host:port` peer strings are accepted too. Anything
/// else resolves to [`UNKNOWN_IDENTITY`].
pub fn resolve(meta: &RequestMeta) -> String {
    let mut candidate: Option<&str> = None;

    if let Some(forwarded) = meta.forwarded_for.as_deref() {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            candidate = Some(first);
        }
    }

    if candidate.is_none() {
        if let Some(real_ip) = meta.real_ip.as_deref() {
            let trimmed = real_ip.trim();
            if !trimmed.is_empty() {
                candidate = Some(trimmed);
            }
        }
    }

    let raw = candidate.unwrap_or_else(|| meta.remote_addr.trim());
    normalize(raw)
}

/// Normalize a raw address string to canonical textual form.
fn normalize(raw: &str) -> String {
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return ip.to_string();
    }

    // Peer addresses usually arrive as `ip:port`.
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }

    UNKNOWN_IDENTITY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(forwarded: Option<&str>, real_ip: Option<&str>, remote: &str) -> RequestMeta {
        RequestMeta {
            forwarded_for: forwarded.map(str::to_string),
            real_ip: real_ip.map(str::to_string),
            remote_addr: remote.to_string(),
        }
    }

    #[test]
    fn test_forwarded_for_takes_first_entry() {
        let meta = meta(Some("192.168.1.1, 10.0.0.1"), Some("10.0.0.2"), "127.0.0.1");
        assert_eq!(resolve(&meta), "192.168.1.1");
    }

    #[test]
    fn test_real_ip_beats_remote_addr() {
        let meta = meta(None, Some("10.0.0.2"), "127.0.0.1");
        assert_eq!(resolve(&meta), "10.0.0.2");
    }

    #[test]
    fn test_remote_addr_fallback() {
        let meta = meta(None, None, "127.0.0.1");
        assert_eq!(resolve(&meta), "127.0.0.1");
    }

    #[test]
    fn test_remote_addr_with_port() {
        let meta = meta(None, None, "203.0.113.7:49152");
        assert_eq!(resolve(&meta), "203.0.113.7");
    }

    #[test]
    fn test_blank_forwarded_for_is_skipped() {
        let meta = meta(Some("   "), Some("10.0.0.2"), "127.0.0.1");
        assert_eq!(resolve(&meta), "10.0.0.2");
    }

    #[test]
    fn test_ipv6_normalization() {
        let meta = meta(Some("2001:0db8:0000:0000:0000:0000:0000:0001"), None, "");
        assert_eq!(resolve(&meta), "2001:db8::1");
    }

    #[test]
    fn test_garbage_forwarded_for_is_sentinel() {
        // A present-but-unparseable header wins selection, then fails
        // normalization. It does not fall through to the peer address.
        let meta = meta(Some("not-an-ip"), None, "127.0.0.1");
        assert_eq!(resolve(&meta), UNKNOWN_IDENTITY);
    }

    #[test]
    fn test_nothing_usable_is_sentinel() {
        let meta = meta(None, None, "");
        assert_eq!(resolve(&meta), UNKNOWN_IDENTITY);
    }
}
