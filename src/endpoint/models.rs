//! Endpoint data models

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported proxy protocol variants, identified by URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Vless,
    Trojan,
    Shadowsocks,
    Hysteria2,
    Vmess,
}

impl Protocol {
    /// Processing and publication order for a full run
    pub const DEFAULT_ORDER: [Protocol; 5] = [
        Protocol::Hysteria2,
        Protocol::Shadowsocks,
        Protocol::Trojan,
        Protocol::Vless,
        Protocol::Vmess,
    ];

    /// The URI scheme used by descriptors of this protocol
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "ss",
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Vmess => "vmess",
        }
    }

    /// Conventional per-protocol input file name
    pub fn input_file_name(&self) -> &'static str {
        match self {
            Protocol::Vless => "Vless.txt",
            Protocol::Trojan => "Trojan.txt",
            Protocol::Shadowsocks => "ShadowSocks.txt",
            Protocol::Hysteria2 => "Hysteria2.txt",
            Protocol::Vmess => "Vmess.txt",
        }
    }

    /// Identify the protocol of a raw descriptor by its scheme prefix
    pub fn identify(raw: &str) -> Option<Protocol> {
        Protocol::DEFAULT_ORDER.iter().copied().find(|p| {
            raw.strip_prefix(p.scheme())
                .and_then(|rest| rest.strip_prefix("://"))
                .is_some_and(|payload| !payload.is_empty())
        })
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme())
    }
}

/// A single endpoint descriptor as read from an input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// The raw descriptor line, untouched
    pub raw: String,
    pub protocol: Protocol,
}

impl Endpoint {
    /// Parse one input line into an endpoint
    ///
    /// Returns `None` for blank lines and for lines whose scheme is not one
    /// of the supported protocols.
    pub fn parse(line: &str) -> Option<Endpoint> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let protocol = Protocol::identify(line)?;
        Some(Endpoint {
            raw: line.to_string(),
            protocol,
        })
    }

    /// The descriptor payload after the `scheme://` prefix
    pub fn payload(&self) -> &str {
        // identify() guaranteed the prefix at construction time
        &self.raw[self.protocol.scheme().len() + 3..]
    }
}

/// Host and port a probe will dial, derived from a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A descriptor that parsed and proved reachable within the timeout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub endpoint: Endpoint,
    pub target: ConnectionTarget,
    /// Wall-clock connect time in milliseconds
    pub latency_ms: f64,
}

/// The fastest reachable endpoints of one protocol, latency ascending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedBatch {
    pub protocol: Protocol,
    pub results: Vec<ProbeResult>,
}

impl RankedBatch {
    pub fn empty(protocol: Protocol) -> Self {
        Self {
            protocol,
            results: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// First 50 characters of a descriptor, for log diagnostics
pub(crate) fn excerpt(raw: &str) -> String {
    raw.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_known_schemes() {
        assert_eq!(Protocol::identify("vless://x@h:1"), Some(Protocol::Vless));
        assert_eq!(Protocol::identify("trojan://x@h:1"), Some(Protocol::Trojan));
        assert_eq!(Protocol::identify("ss://x@h:1"), Some(Protocol::Shadowsocks));
        assert_eq!(
            Protocol::identify("hysteria2://x@h:1"),
            Some(Protocol::Hysteria2)
        );
        assert_eq!(Protocol::identify("vmess://abcd"), Some(Protocol::Vmess));
    }

    #[test]
    fn test_identify_unknown_scheme() {
        assert_eq!(Protocol::identify("socks5://1.2.3.4:1080"), None);
        assert_eq!(Protocol::identify("not a descriptor"), None);
        assert_eq!(Protocol::identify(""), None);
    }

    #[test]
    fn test_ss_prefix_does_not_shadow_others() {
        // "ssr://" must not be mistaken for "ss://"
        assert_eq!(Protocol::identify("ssr://abcd"), None);
    }

    #[test]
    fn test_endpoint_parse() {
        let ep = Endpoint::parse("  vless://u@1.2.3.4:443#name  ").unwrap();
        assert_eq!(ep.protocol, Protocol::Vless);
        assert_eq!(ep.raw, "vless://u@1.2.3.4:443#name");
        assert_eq!(ep.payload(), "u@1.2.3.4:443#name");
    }

    #[test]
    fn test_endpoint_parse_blank_and_unknown() {
        assert!(Endpoint::parse("").is_none());
        assert!(Endpoint::parse("   ").is_none());
        assert!(Endpoint::parse("http://example.com").is_none());
    }

    #[test]
    fn test_target_display() {
        let target = ConnectionTarget {
            host: "1.2.3.4".to_string(),
            port: 443,
        };
        assert_eq!(target.to_string(), "1.2.3.4:443");
    }

    #[test]
    fn test_protocol_display_matches_scheme() {
        assert_eq!(Protocol::Shadowsocks.to_string(), "ss");
        assert_eq!(Protocol::Hysteria2.to_string(), "hysteria2");
    }
}
