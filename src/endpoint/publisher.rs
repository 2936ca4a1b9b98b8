//! Rank aggregation and publication
//!
//! Merges per-protocol ranked batches into the final text artifact. Batches
//! stay in the caller's declared order so one fast protocol cannot crowd the
//! others out of the list; the rank index is global across the whole run.

use crate::endpoint::codec::DescriptorCodec;
use crate::endpoint::models::RankedBatch;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Icon prefixing the header and every metadata comment
const ICON: &str = "🌐";

/// Renders ranked batches into the published text
pub struct Publisher {
    rng: StdRng,
}

impl Publisher {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded variant, for deterministic vmess display-name rewrites
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Render the final artifact, or `None` when every batch is empty.
    ///
    /// Each line is the rewritten descriptor with its metadata comment
    /// appended directly, so the line stays a single valid descriptor with a
    /// trailing `#...` fragment for clients that tolerate one.
    pub fn render(&mut self, batches: &[RankedBatch], label: &str) -> Option<String> {
        if batches.iter().all(|b| b.is_empty()) {
            return None;
        }

        let mut out = String::new();
        out.push_str(&format!("#{} Updated {}\n", ICON, label));

        let mut rank = 0usize;
        for batch in batches {
            for result in &batch.results {
                rank += 1;
                let cleaned =
                    DescriptorCodec::rewrite_for_publication(&result.endpoint, &mut self.rng);
                out.push_str(&format!(
                    "{}#{}server {} | {} | {} | Ping: {:.2}ms\n",
                    cleaned, ICON, rank, result.endpoint.protocol, label, result.latency_ms
                ));
            }
        }
        Some(out)
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}
