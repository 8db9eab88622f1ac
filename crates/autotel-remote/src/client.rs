use std::time::{Duration, Instant};

use autotel_domain::{BaselinePayload, ConfigManifest};
use autotel_signing::KeyRing;
use rand::Rng;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::RemoteError;

const LICENSE_HEADER: &str = "X-License-Key";

/// Back-off schedule for connection-category failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub cap: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial: Duration::from_secs(5),
            cap: Duration::from_secs(300),
            max_elapsed: Duration::from_secs(900),
        }
    }
}

/// Client for the remote configuration service. Fail-closed for integrity
/// (every received manifest must verify before it leaves this type),
/// fail-open for availability (callers keep the cached manifest when the
/// remote is unreachable).
pub struct RemoteClient {
    http: reqwest::Client,
    endpoint: String,
    license_key: String,
    key_ring: KeyRing,
    retry: RetryPolicy,
}

impl RemoteClient {
    pub fn new(
        endpoint: impl Into<String>,
        license_key: impl Into<String>,
        key_ring: KeyRing,
        fetch_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .timeout(fetch_timeout)
            .build()?;
        Ok(RemoteClient {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            license_key: license_key.into(),
            key_ring,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// POST the host baseline; the response is either a signed manifest or a
    /// no-change token (204).
    pub async fn report_baseline(
        &self,
        payload: &BaselinePayload,
    ) -> Result<Option<ConfigManifest>, RemoteError> {
        let url = format!("{}/v1/baseline", self.endpoint);
        self.with_backoff(|| async {
            let response = self
                .http
                .post(&url)
                .header(LICENSE_HEADER, &self.license_key)
                .json(payload)
                .send()
                .await?;
            self.manifest_response(response).await
        })
        .await
    }

    /// Conditional manifest fetch. 304 Not Modified maps to `None`.
    pub async fn fetch_manifest(
        &self,
        current_version: Option<&str>,
    ) -> Result<Option<ConfigManifest>, RemoteError> {
        let url = format!("{}/v1/manifest", self.endpoint);
        self.with_backoff(|| async {
            let mut request = self.http.get(&url).header(LICENSE_HEADER, &self.license_key);
            if let Some(version) = current_version {
                request = request.header(reqwest::header::IF_NONE_MATCH, version);
            }
            let response = request.send().await?;
            self.manifest_response(response).await
        })
        .await
    }

    async fn manifest_response(
        &self,
        response: reqwest::Response,
    ) -> Result<Option<ConfigManifest>, RemoteError> {
        match response.status() {
            StatusCode::OK => {
                let manifest: ConfigManifest = response
                    .json()
                    .await
                    .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
                // Verify before the manifest is visible to anyone else. A
                // failed verification discards the manifest entirely.
                self.key_ring.verify(&manifest)?;
                debug!(version = %manifest.version, "verified remote manifest");
                Ok(Some(manifest))
            }
            StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED => Ok(None),
            status if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                Err(RemoteError::Auth { status: status.as_u16() })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RemoteError::Status { status: status.as_u16(), body })
            }
        }
    }

    /// Exponential back-off with jitter around one operation. Non-retryable
    /// errors (auth, verification, 4xx) surface immediately.
    async fn with_backoff<T, F, Fut>(&self, op: F) -> Result<T, RemoteError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RemoteError>>,
    {
        let started = Instant::now();
        let mut delay = self.retry.initial;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if started.elapsed() + delay > self.retry.max_elapsed {
                        return Err(RemoteError::RetriesExhausted {
                            elapsed_secs: started.elapsed().as_secs(),
                            last: e.to_string(),
                        });
                    }
                    let jittered = jitter(delay);
                    warn!(error = %e, delay_ms = jittered.as_millis() as u64, "remote call failed, backing off");
                    tokio::time::sleep(jittered).await;
                    delay = (delay * 2).min(self.retry.cap);
                }
            }
        }
    }
}

/// Spread a delay over ±50% so a fleet of agents doesn't thunder in lockstep.
fn jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    delay.mul_f64(factor)
}
