//! Utility functions

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Exponential backoff schedule: starts at `initial`, doubles, never exceeds `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }
}

/// Retry with exponential backoff
///
/// Only errors for which [`crate::Error::is_retryable`] holds are retried.
pub async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_attempts: usize,
    initial_delay: Duration,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let mut backoff = Backoff::new(initial_delay, initial_delay * 32);

    for attempt in 1..=max_attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = jitter(backoff.next_delay());
                tracing::warn!(
                    "Attempt {}/{} failed: {}, retrying in {:?}",
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(crate::Error::Internal("Max retries exceeded".into()))
}

/// Poll `check` until it yields `Some`, sleeping per `backoff` between
/// attempts. Returns `None` once `deadline` has passed.
pub async fn poll_until<F, Fut, T>(
    mut check: F,
    mut backoff: Backoff,
    deadline: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let give_up = Instant::now() + deadline;
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        let now = Instant::now();
        if now >= give_up {
            return None;
        }
        let delay = backoff.next_delay().min(give_up - now);
        tokio::time::sleep(delay).await;
    }
}

/// Spread a delay over [delay/2, delay] to avoid synchronized retries.
fn jitter(delay: Duration) -> Duration {
    let half = delay / 2;
    let extra = rand::random::<f64>() * half.as_secs_f64();
    half + Duration::from_secs_f64(extra)
}

/// Base URL for a peer given as `host:port` or a full URL.
pub fn peer_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}
