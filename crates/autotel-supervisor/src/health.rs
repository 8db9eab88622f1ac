use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Readiness probe against a collector instance's health endpoint. Behind a
/// trait so tests drive the supervisor without a live collector.
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    /// One probe against the instance listening on `port`.
    async fn ready(&self, port: u16) -> bool;
}

/// HTTP GET against the collector's health endpoint on loopback.
pub struct HttpHealthProbe {
    http: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .expect("default reqwest client");
        HttpHealthProbe { http }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn ready(&self, port: u16) -> bool {
        let url = format!("http://127.0.0.1:{}/", port);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                trace!(port, error = %e, "health probe failed");
                false
            }
        }
    }
}

/// Wait for `consecutive` successful probes, `interval` apart, within
/// `deadline`. Returns false when the deadline passes first.
pub async fn wait_ready(
    probe: &dyn HealthProbe,
    port: u16,
    deadline: Duration,
    consecutive: u32,
    interval: Duration,
) -> bool {
    let give_up = Instant::now() + deadline;
    let mut streak = 0u32;
    loop {
        if probe.ready(port).await {
            streak += 1;
            if streak >= consecutive {
                return true;
            }
        } else {
            streak = 0;
        }
        if Instant::now() + interval > give_up {
            return false;
        }
        sleep(interval).await;
    }
}

/// Stub probes that simulate collector health locally. Used by tests and by
/// the discover/render one-shot commands, which never spawn a collector.
pub mod stubs {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub struct AlwaysReady;

    #[async_trait]
    impl HealthProbe for AlwaysReady {
        async fn ready(&self, _port: u16) -> bool {
            true
        }
    }

    pub struct NeverReady;

    #[async_trait]
    impl HealthProbe for NeverReady {
        async fn ready(&self, _port: u16) -> bool {
            false
        }
    }

    /// Ready only on one port; the blue-green tests use this to fail the
    /// incoming instance while keeping the active one healthy.
    pub struct PortReady(pub u16);

    #[async_trait]
    impl HealthProbe for PortReady {
        async fn ready(&self, port: u16) -> bool {
            port == self.0
        }
    }

    /// Becomes ready after N probes.
    pub struct ReadyAfter(pub AtomicU32);

    #[async_trait]
    impl HealthProbe for ReadyAfter {
        async fn ready(&self, _port: u16) -> bool {
            self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_err()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stubs::*;
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn consecutive_probes_must_all_pass() {
        let ok = wait_ready(
            &AlwaysReady,
            13133,
            Duration::from_millis(200),
            3,
            Duration::from_millis(5),
        )
        .await;
        assert!(ok);

        let ok = wait_ready(
            &NeverReady,
            13133,
            Duration::from_millis(50),
            1,
            Duration::from_millis(5),
        )
        .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn streak_resets_on_failure() {
        // Ready only after the first two probes fail; needs 2 consecutive.
        let probe = ReadyAfter(AtomicU32::new(2));
        let ok = wait_ready(
            &probe,
            13133,
            Duration::from_millis(500),
            2,
            Duration::from_millis(5),
        )
        .await;
        assert!(ok);
    }
}
