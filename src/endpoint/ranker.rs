//! Probe orchestrator
//!
//! Takes one protocol's worth of raw descriptor lines, samples a bounded
//! subset, probes the sampled endpoints over a bounded worker pool, and
//! keeps the fastest results.

use crate::endpoint::codec::DescriptorCodec;
use crate::endpoint::models::{excerpt, Endpoint, ProbeResult, Protocol, RankedBatch};
use crate::endpoint::prober;
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Default maximum descriptors probed per protocol per run
const DEFAULT_SAMPLE_CAP: usize = 100;

/// Default maximum ranked results kept per protocol
const DEFAULT_SUCCESS_CAP: usize = 20;

/// Default number of concurrent in-flight probes
const DEFAULT_CONCURRENCY: usize = 20;

/// Default per-probe timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 1;

/// Configuration for the batch ranker
#[derive(Debug, Clone)]
pub struct RankerConfig {
    /// Max descriptors probed per protocol; larger batches are sampled down
    pub sample_cap: usize,
    /// Max ranked results kept per protocol
    pub success_cap: usize,
    /// Max simultaneous in-flight probes
    pub concurrency: usize,
    /// Per-probe timeout
    pub timeout: Duration,
    /// Seed for the sampling rng; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            sample_cap: DEFAULT_SAMPLE_CAP,
            success_cap: DEFAULT_SUCCESS_CAP,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            seed: None,
        }
    }
}

impl RankerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_cap(mut self, sample_cap: usize) -> Self {
        self.sample_cap = sample_cap;
        self
    }

    pub fn with_success_cap(mut self, success_cap: usize) -> Self {
        self.success_cap = success_cap;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Orchestrates sampling, probing, and ranking for one protocol batch
pub struct BatchRanker {
    config: RankerConfig,
}

impl BatchRanker {
    /// Create a ranker with default configuration
    pub fn new() -> Self {
        Self {
            config: RankerConfig::default(),
        }
    }

    /// Create a ranker with custom configuration
    pub fn with_config(config: RankerConfig) -> Self {
        Self { config }
    }

    /// Probe one protocol's descriptor lines and rank the reachable ones.
    ///
    /// Descriptors that fail to parse or yield no host:port are dropped with
    /// a log diagnostic and never dialed. Successes are accepted in
    /// completion order until `success_cap` is reached (in-flight probes
    /// drain without cancellation), then stable-sorted by latency ascending
    /// and truncated. An all-unreachable batch is empty, not an error.
    pub async fn rank(&self, protocol: Protocol, lines: &[String]) -> RankedBatch {
        let mut endpoints = Vec::new();
        for line in lines {
            match Endpoint::parse(line) {
                Some(ep) => endpoints.push(ep),
                None if line.trim().is_empty() => {}
                None => log::debug!("unrecognized descriptor scheme: {}", excerpt(line)),
            }
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let sampled = sample_endpoints(endpoints, self.config.sample_cap, &mut rng);

        let mut targets = Vec::new();
        for endpoint in sampled {
            match DescriptorCodec::extract_target(&endpoint) {
                Ok(target) => targets.push((endpoint, target)),
                Err(e) => log::debug!("dropping descriptor ({}): {}", e, excerpt(&endpoint.raw)),
            }
        }
        let probed = targets.len();

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let timeout = self.config.timeout;
        let mut completions = stream::iter(targets)
            .map(|(endpoint, target)| {
                let sem = Arc::clone(&semaphore);
                async move {
                    // Semaphore acquire only fails if the semaphore is closed,
                    // which won't happen here since we own the Arc and keep it
                    // alive until every probe has completed.
                    let _permit = sem
                        .acquire()
                        .await
                        .expect("Semaphore closed unexpectedly");
                    let latency = prober::probe(&target, timeout).await;
                    (endpoint, target, latency)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1));

        // The orchestrator is the sole consumer of completions; probe tasks
        // share nothing and just return values.
        let mut accepted: Vec<ProbeResult> = Vec::new();
        while let Some((endpoint, target, latency)) = completions.next().await {
            let Some(latency_ms) = latency else { continue };
            if accepted.len() < self.config.success_cap {
                accepted.push(ProbeResult {
                    endpoint,
                    target,
                    latency_ms,
                });
            }
        }

        accepted.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms));
        accepted.truncate(self.config.success_cap);

        log::info!(
            "{}: {} of {} probed endpoints reachable",
            protocol,
            accepted.len(),
            probed
        );
        RankedBatch {
            protocol,
            results: accepted,
        }
    }
}

impl Default for BatchRanker {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw a uniform subset of at most `cap` endpoints without replacement.
///
/// Sampled endpoints keep their original input order so latency ties later
/// resolve deterministically under the stable sort.
fn sample_endpoints(endpoints: Vec<Endpoint>, cap: usize, rng: &mut impl Rng) -> Vec<Endpoint> {
    if endpoints.len() <= cap {
        return endpoints;
    }
    let mut picked = index::sample(rng, endpoints.len(), cap).into_vec();
    picked.sort_unstable();
    let mut iter = endpoints.into_iter().enumerate();
    let mut sampled = Vec::with_capacity(cap);
    for want in picked {
        for (i, endpoint) in iter.by_ref() {
            if i == want {
                sampled.push(endpoint);
                break;
            }
        }
    }
    sampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn descriptor_lines(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("vless://user@10.0.{}.{}:443#cfg{}", i / 256, i % 256, i))
            .collect()
    }

    fn parse_all(lines: &[String]) -> Vec<Endpoint> {
        lines.iter().filter_map(|l| Endpoint::parse(l)).collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = RankerConfig::default();
        assert_eq!(config.sample_cap, DEFAULT_SAMPLE_CAP);
        assert_eq!(config.success_cap, DEFAULT_SUCCESS_CAP);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = RankerConfig::new()
            .with_sample_cap(50)
            .with_success_cap(5)
            .with_concurrency(8)
            .with_timeout(Duration::from_millis(250))
            .with_seed(42);
        assert_eq!(config.sample_cap, 50);
        assert_eq!(config.success_cap, 5);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_sample_caps_oversized_batch() {
        let endpoints = parse_all(&descriptor_lines(150));
        let mut rng = StdRng::seed_from_u64(1);
        let sampled = sample_endpoints(endpoints.clone(), 100, &mut rng);
        assert_eq!(sampled.len(), 100);
        // every sampled endpoint comes from the input
        for ep in &sampled {
            assert!(endpoints.contains(ep));
        }
    }

    #[test]
    fn test_sample_leaves_small_batch_alone() {
        let endpoints = parse_all(&descriptor_lines(30));
        let mut rng = StdRng::seed_from_u64(1);
        let sampled = sample_endpoints(endpoints.clone(), 100, &mut rng);
        assert_eq!(sampled, endpoints);
    }

    #[test]
    fn test_sample_deterministic_for_fixed_seed() {
        let endpoints = parse_all(&descriptor_lines(150));
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = sample_endpoints(endpoints.clone(), 100, &mut rng_a);
        let b = sample_endpoints(endpoints, 100, &mut rng_b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_preserves_input_order() {
        let endpoints = parse_all(&descriptor_lines(150));
        let mut rng = StdRng::seed_from_u64(9);
        let sampled = sample_endpoints(endpoints.clone(), 10, &mut rng);
        let positions: Vec<usize> = sampled
            .iter()
            .map(|ep| endpoints.iter().position(|e| e == ep).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_rank_orders_reachable_endpoints() {
        let mut listeners = Vec::new();
        let mut lines = Vec::new();
        for i in 0..3 {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            lines.push(format!("vless://u@127.0.0.1:{}#srv{}", port, i));
            listeners.push(listener);
        }

        let ranker = BatchRanker::with_config(RankerConfig::new().with_seed(1));
        let batch = ranker.rank(Protocol::Vless, &lines).await;

        assert_eq!(batch.protocol, Protocol::Vless);
        assert_eq!(batch.len(), 3);
        assert!(batch
            .results
            .windows(2)
            .all(|w| w[0].latency_ms <= w[1].latency_ms));
    }

    #[tokio::test]
    async fn test_rank_respects_success_cap() {
        let mut listeners = Vec::new();
        let mut lines = Vec::new();
        for i in 0..5 {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            lines.push(format!("trojan://pw@127.0.0.1:{}?security=tls#s{}", port, i));
            listeners.push(listener);
        }

        let config = RankerConfig::new().with_success_cap(2).with_seed(1);
        let batch = BatchRanker::with_config(config).rank(Protocol::Trojan, &lines).await;
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_rank_drops_unparseable_and_unreachable() {
        // One refused port, one malformed line, one foreign scheme
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let refused = listener.local_addr().unwrap().port();
        drop(listener);

        let lines = vec![
            format!("vless://u@127.0.0.1:{}#dead", refused),
            "vless://no-port-here".to_string(),
            "socks5://1.2.3.4:1080".to_string(),
            String::new(),
        ];
        let config = RankerConfig::new().with_timeout(Duration::from_millis(500));
        let batch = BatchRanker::with_config(config).rank(Protocol::Vless, &lines).await;
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_rank_empty_input() {
        let batch = BatchRanker::new().rank(Protocol::Vmess, &[]).await;
        assert!(batch.is_empty());
        assert_eq!(batch.protocol, Protocol::Vmess);
    }
}
