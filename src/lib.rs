//! Proxy Rank - Endpoint Latency Tester and Ranker
//!
//! Parses proxy endpoint descriptors (vless, trojan, ss, hysteria2, vmess),
//! probes the declared host:port of each for TCP reachability under a
//! bounded worker pool, and publishes the fastest endpoints per protocol as
//! a ranked text artifact.

pub mod endpoint;

pub use endpoint::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
