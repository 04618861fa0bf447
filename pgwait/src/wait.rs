use std::time::{Duration, Instant};

use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use common_pgping::{ping, Ping, PingKind, PingTarget};

use crate::error::WaitError;

/// Polling cadence and cutoffs for the wait loop.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    /// Pause between attempts.
    pub poll_interval: Duration,
    /// Cap on a single attempt, covering name resolution, the TCP connect,
    /// and the startup exchange. Zero leaves attempts unbounded, like the
    /// zero deadline.
    pub connect_timeout: Duration,
    /// Overall cutoff. `None` waits forever.
    pub deadline: Option<Duration>,
}

/// How long becoming ready took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub attempts: u64,
    pub waited: Duration,
}

/// Ping the target at a fixed cadence until it accepts connections.
///
/// Outcomes are logged only when they change, so a server that takes minutes
/// to come up produces a couple of lines rather than hundreds. The deadline
/// bounds when new attempts may start; an attempt already in flight still
/// gets its full connect timeout.
pub async fn wait_until_ready(
    target: &PingTarget,
    policy: &WaitPolicy,
) -> Result<Ready, WaitError> {
    let started = Instant::now();
    let mut attempts: u64 = 0;
    let mut last_kind: Option<PingKind> = None;

    loop {
        if let Some(limit) = policy.deadline {
            if started.elapsed() >= limit {
                return Err(WaitError::DeadlineExceeded {
                    waited: started.elapsed(),
                    attempts,
                });
            }
        }

        attempts += 1;
        let outcome = if policy.connect_timeout.is_zero() {
            ping(target).await?
        } else {
            match timeout(policy.connect_timeout, ping(target)).await {
                Ok(outcome) => outcome?,
                Err(_) => Ping::NoResponse {
                    reason: format!("no response within {:?}", policy.connect_timeout),
                },
            }
        };

        if outcome.accepting() {
            let waited = started.elapsed();
            info!(
                attempts,
                ?waited,
                "{} is accepting connections",
                target.endpoint()
            );
            return Ok(Ready { attempts, waited });
        }

        let kind = outcome.kind();
        if last_kind != Some(kind) {
            info!("waiting for {}: {}", target.endpoint(), kind);
            last_kind = Some(kind);
        }
        debug!(
            attempt = attempts,
            detail = outcome.detail(),
            "{} not ready",
            target.endpoint()
        );

        match policy.deadline {
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(WaitError::DeadlineExceeded {
                        waited: started.elapsed(),
                        attempts,
                    });
                }
                sleep(policy.poll_interval.min(remaining)).await;
            }
            None => sleep(policy.poll_interval).await,
        }
    }
}
