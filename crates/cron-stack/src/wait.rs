//! Polling with exponential backoff and cancellation.
//!
//! AWS resources become usable some time after the call that creates them
//! returns. [`poll_until`] re-runs a probe with growing delays until it
//! yields a value, the timeout passes, or the caller cancels.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use backon::{BackoffBuilder, ExponentialBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delays and overall deadline for [`poll_until`]
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Delay after the first unsuccessful probe
    pub initial_delay: Duration,
    /// Cap on the delay between probes
    pub max_delay: Duration,
    /// Give up once this much time has passed
    pub timeout: Duration,
}

impl WaitConfig {
    /// 2-15s delays, as used for EC2 state transitions
    pub fn ec2_state(timeout: Duration) -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
            timeout,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Run `probe` until it returns `Ok(Some(value))`.
///
/// `Ok(None)` means "not yet" and schedules another probe after the next
/// backoff delay. An `Err` from the probe is returned immediately. Fails
/// when `config.timeout` elapses or `cancel` fires.
pub async fn poll_until<T, F, Fut>(
    config: WaitConfig,
    cancel: Option<&CancellationToken>,
    mut probe: F,
    what: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let mut delays = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0)
        .with_jitter()
        .build();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            bail!("Cancelled while waiting for {what}");
        }

        match probe().await {
            Ok(Some(value)) => {
                debug!(what, attempt, elapsed = ?started.elapsed(), "Wait finished");
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(what, attempt, error = %e, "Probe failed");
                return Err(e);
            }
        }

        let remaining = config.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            bail!(
                "Timed out waiting for {what} after {:?} ({attempt} attempts)",
                config.timeout
            );
        }
        let delay = delays.next().unwrap_or(config.max_delay).min(remaining);
        debug!(what, attempt, delay_ms = delay.as_millis() as u64, "Not ready yet");

        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => bail!("Cancelled while waiting for {what}"),
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}
