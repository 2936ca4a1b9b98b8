//! TCP reachability probe
//!
//! A probe establishes reachability only: it dials the declared host:port
//! and measures connect time. No protocol handshake, TLS negotiation, or
//! authentication is attempted.

use crate::endpoint::models::ConnectionTarget;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

/// Dial the target once, bounded by `timeout`.
///
/// Returns the elapsed wall-clock time in milliseconds on a successful
/// connect; `None` on refusal, timeout, or name-resolution failure. The
/// connection is closed before returning on every path, and no retry is
/// attempted here.
pub async fn probe(target: &ConnectionTarget, timeout: Duration) -> Option<f64> {
    let start = Instant::now();
    let connect = TcpStream::connect((target.host.as_str(), target.port));
    match time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => {
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            drop(stream);
            Some(latency_ms)
        }
        // Refused / unresolvable, or the timeout elapsed first
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_reachable_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = ConnectionTarget {
            host: "127.0.0.1".to_string(),
            port,
        };

        let latency = probe(&target, Duration::from_secs(1)).await;
        let latency = latency.expect("loopback listener should be reachable");
        assert!(latency >= 0.0);
    }

    #[tokio::test]
    async fn test_probe_refused_target() {
        // Bind then drop to get a port with nothing listening on it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = ConnectionTarget {
            host: "127.0.0.1".to_string(),
            port,
        };
        assert!(probe(&target, Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_probe_unresolvable_host() {
        let target = ConnectionTarget {
            host: "host.invalid".to_string(),
            port: 443,
        };
        assert!(probe(&target, Duration::from_secs(1)).await.is_none());
    }
}
