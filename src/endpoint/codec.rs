//! Descriptor codec
//!
//! Two independent concerns live here:
//! - extracting the host:port a probe should dial from a raw descriptor
//! - rewriting a descriptor into a clean, redistributable form
//!
//! Keeping them separate means a reachable endpoint is never discarded just
//! because its cosmetic display-name field is malformed.

use crate::endpoint::models::{excerpt, ConnectionTarget, Endpoint, Protocol};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Matches `credential@host:port` payloads, host up to the first port colon
static AT_TARGET_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+?@(.+?):(\d+)").expect("Invalid credential target regex"));

/// Matches bare `host:port` payloads
static PLAIN_TARGET_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?):(\d+)").expect("Invalid plain target regex"));

/// Matches the base64 payload of a vmess descriptor
static VMESS_PAYLOAD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9+/=]+)").expect("Invalid vmess payload regex"));

/// A trojan link is considered complete if any of these parameters is set
static TROJAN_PARAMS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(security|type|sni)=[^&]+").expect("Invalid trojan params regex"));

/// Failures while deriving a connection target from a descriptor
///
/// These are per-descriptor diagnostics: callers drop the descriptor and log,
/// they never abort a batch over one of these.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no host:port found in descriptor")]
    NoTarget,
    #[error("empty host")]
    EmptyHost,
    #[error("port out of range: {0}")]
    InvalidPort(String),
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// Codec for parsing descriptor targets and rewriting descriptors for
/// publication
pub struct DescriptorCodec;

impl DescriptorCodec {
    /// Extract the host and port a probe should dial.
    ///
    /// For textual protocols both `scheme://credential@host:port...` and
    /// `scheme://host:port...` shapes are accepted. For vmess the payload is
    /// base64-decoded (padding tolerated missing) into a JSON object whose
    /// `add` and `port` fields supply the target.
    pub fn extract_target(endpoint: &Endpoint) -> Result<ConnectionTarget, CodecError> {
        match endpoint.protocol {
            Protocol::Vmess => Self::extract_vmess_target(endpoint.payload()),
            _ => Self::extract_textual_target(endpoint.payload()),
        }
    }

    fn extract_textual_target(payload: &str) -> Result<ConnectionTarget, CodecError> {
        let caps = AT_TARGET_REGEX
            .captures(payload)
            .or_else(|| PLAIN_TARGET_REGEX.captures(payload))
            .ok_or(CodecError::NoTarget)?;

        let host = caps[1].to_string();
        if host.is_empty() {
            return Err(CodecError::EmptyHost);
        }
        let port = Self::parse_port(&caps[2])?;
        Ok(ConnectionTarget { host, port })
    }

    fn extract_vmess_target(payload: &str) -> Result<ConnectionTarget, CodecError> {
        let obj = Self::decode_vmess_payload(payload)?;

        let host = obj
            .get("add")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("add"))?
            .to_string();
        if host.is_empty() {
            return Err(CodecError::EmptyHost);
        }

        // `port` appears as a number or a numeric string in the wild
        let port_field = obj.get("port").ok_or(CodecError::MissingField("port"))?;
        let port = match port_field {
            Value::Number(n) => Self::parse_port(&n.to_string())?,
            Value::String(s) => Self::parse_port(s)?,
            _ => return Err(CodecError::MissingField("port")),
        };

        Ok(ConnectionTarget { host, port })
    }

    fn parse_port(raw: &str) -> Result<u16, CodecError> {
        match raw.parse::<u16>() {
            Ok(0) | Err(_) => Err(CodecError::InvalidPort(raw.to_string())),
            Ok(port) => Ok(port),
        }
    }

    /// Decode a vmess base64 payload into its JSON object.
    ///
    /// Descriptors in circulation frequently drop the base64 padding, so the
    /// payload is padded with `=` up to a multiple of 4 before decoding.
    fn decode_vmess_payload(payload: &str) -> Result<Value, CodecError> {
        let caps = VMESS_PAYLOAD_REGEX
            .captures(payload)
            .ok_or(CodecError::NoTarget)?;
        let encoded = Self::with_padding(&caps[1]);
        let decoded = BASE64.decode(encoded.as_bytes())?;
        let obj: Value = serde_json::from_slice(&decoded)?;
        Ok(obj)
    }

    fn with_padding(encoded: &str) -> String {
        let mut padded = encoded.to_string();
        while padded.len() % 4 != 0 {
            padded.push('=');
        }
        padded
    }

    /// Rewrite a descriptor into its publishable form.
    ///
    /// Non-vmess descriptors get their `#fragment` display name stripped; a
    /// trojan link without any of `security=`/`type=`/`sni=` is logged as
    /// incomplete but still published. Vmess descriptors get their `ps`
    /// display-name field replaced with a synthetic `server-<n>` label; if
    /// the payload fails to decode the fragment-stripped original is
    /// published instead. Rewriting never drops a descriptor.
    pub fn rewrite_for_publication(endpoint: &Endpoint, rng: &mut impl Rng) -> String {
        match endpoint.protocol {
            Protocol::Vmess => match Self::rewrite_vmess(endpoint.payload(), rng) {
                Ok(rewritten) => rewritten,
                Err(e) => {
                    log::warn!(
                        "vmess rewrite failed ({}), publishing stripped original: {}",
                        e,
                        excerpt(&endpoint.raw)
                    );
                    Self::strip_fragment(&endpoint.raw).to_string()
                }
            },
            protocol => {
                let cleaned = Self::strip_fragment(&endpoint.raw);
                if protocol == Protocol::Trojan && !TROJAN_PARAMS_REGEX.is_match(cleaned) {
                    log::warn!("incomplete trojan link: {}", excerpt(cleaned));
                }
                cleaned.to_string()
            }
        }
    }

    fn rewrite_vmess(payload: &str, rng: &mut impl Rng) -> Result<String, CodecError> {
        let mut obj = Self::decode_vmess_payload(payload)?;
        let map = obj.as_object_mut().ok_or(CodecError::MissingField("ps"))?;
        map.insert(
            "ps".to_string(),
            Value::String(format!("server-{}", rng.gen_range(1..=1000))),
        );
        let reencoded = BASE64.encode(serde_json::to_string(&obj)?.as_bytes());
        Ok(format!("vmess://{}", reencoded))
    }

    fn strip_fragment(raw: &str) -> &str {
        raw.split('#').next().unwrap_or(raw)
    }
}
