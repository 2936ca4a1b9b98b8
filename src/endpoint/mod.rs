//! Endpoint module for parsing, probing, and ranking proxy descriptors
//!
//! This module provides functionality for:
//! - Parsing endpoint descriptors for several proxy protocols
//! - Probing declared host:port targets for TCP reachability and latency
//! - Ranking the fastest reachable endpoints per protocol
//! - Rewriting descriptors into a clean, publishable form

pub mod codec;
pub mod models;
pub mod prober;
pub mod publisher;
pub mod ranker;

pub use codec::{CodecError, DescriptorCodec};
pub use models::{ConnectionTarget, Endpoint, ProbeResult, Protocol, RankedBatch};
pub use prober::probe;
pub use publisher::Publisher;
pub use ranker::{BatchRanker, RankerConfig};
