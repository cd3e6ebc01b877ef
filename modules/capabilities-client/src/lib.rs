pub mod error;

pub use error::{CapabilitiesError, Result};

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{info, warn};

pub const USER_AGENT: &str = "github.com/dzfranklin/contourguessr";

/// Exponential backoff bounded by total elapsed time.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    /// Each delay is scaled by a random factor in `1 ± randomization_factor`.
    pub randomization_factor: f64,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
    /// Timeout applied to each individual request.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Delay schedule for one retried operation.
struct Backoff<'a> {
    policy: &'a RetryPolicy,
    current: Duration,
    started: Instant,
}

impl<'a> Backoff<'a> {
    fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            current: policy.initial_interval,
            started: Instant::now(),
        }
    }

    /// The next delay, or `None` once sleeping it would overrun the budget.
    fn next_delay(&mut self) -> Option<Duration> {
        let delay = jittered(self.current, self.policy.randomization_factor);
        self.current = self
            .current
            .mul_f64(self.policy.multiplier)
            .min(self.policy.max_interval);

        if self.started.elapsed() + delay > self.policy.max_elapsed {
            None
        } else {
            Some(delay)
        }
    }
}

fn jittered(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return interval;
    }
    let scale = rand::rng().random_range((1.0 - factor)..=(1.0 + factor));
    interval.mul_f64(scale.max(0.0))
}

pub struct CapabilitiesClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl CapabilitiesClient {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(policy.attempt_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, policy })
    }

    /// Fetch a capabilities document, retrying any failure until the
    /// policy's elapsed budget runs out.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let mut backoff = Backoff::new(&self.policy);
        let mut attempts = 0;

        loop {
            attempts += 1;
            info!(url, attempt = attempts, "Fetching capabilities");

            let err = match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        url,
                        attempt = attempts,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Capabilities fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(CapabilitiesError::Exhausted {
                        attempts,
                        last: Box::new(err),
                    })
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => format!("<error reading body: {e}>"),
            };
            return Err(CapabilitiesError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CapabilitiesError::InvalidUtf8)
    }
}
