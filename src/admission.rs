//! Beam-refill admission control.
//!
//! A storage ring replenishes its beam current on a schedule ("topup");
//! during a refill the intensity is briefly unusable. An exposure that
//! straddles a refill is silently corrupted, so every sweep must pass the
//! admission gate *before* the controller is armed: the gate blocks until
//! the next refill is far enough away that the whole planned exposure, plus
//! a safety margin, fits before it.
//!
//! The [`AdmissionGate`] trait is the contract this crate consumes; the
//! machine-fed implementation lives with the accelerator interface.
//! [`PeriodicTopupGate`] is a reference provider for a fixed refill
//! schedule, used by the demo binary and the integration tests.

use crate::error::{AppResult, BeamlineError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Blocks sweep start until the planned exposure cannot be interrupted by a
/// beam refill.
///
/// May block indefinitely while the beam is down; cancellation rides on the
/// caller's abort path (dropping the future).
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Return once `[now, now + total_exposure_s + margin_s]` is clear of
    /// refill events.
    async fn await_safe_window(&self, total_exposure_s: f64, margin_s: f64) -> AppResult<()>;
}

/// Reference admission gate for a machine refilling on a fixed period.
///
/// Models the refill schedule as a cycle of `period` starting at `origin`,
/// with the refill itself occupying the first `refill_duration` of each
/// cycle.
pub struct PeriodicTopupGate {
    period: Duration,
    refill_duration: Duration,
    origin: Instant,
}

impl PeriodicTopupGate {
    /// Create a gate whose cycle starts now.
    pub fn new(period: Duration, refill_duration: Duration) -> Self {
        Self::with_phase(period, refill_duration, Duration::ZERO)
    }

    /// Create a gate already `into_cycle` deep into its refill cycle.
    /// Test hook: lets a caller place "now" just before the next refill.
    pub fn with_phase(period: Duration, refill_duration: Duration, into_cycle: Duration) -> Self {
        Self {
            period,
            refill_duration,
            origin: Instant::now() - into_cycle,
        }
    }

    fn seconds_into_cycle(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() % self.period.as_secs_f64()
    }
}

#[async_trait]
impl AdmissionGate for PeriodicTopupGate {
    async fn await_safe_window(&self, total_exposure_s: f64, margin_s: f64) -> AppResult<()> {
        let needed_s = total_exposure_s + margin_s;
        let usable_s = (self.period - self.refill_duration).as_secs_f64();
        if needed_s > usable_s {
            // Would loop forever: no gap between refills is ever long enough.
            return Err(BeamlineError::Aborted(format!(
                "exposure of {needed_s:.1}s (incl. margin) cannot fit in the \
                 {usable_s:.1}s between refills"
            )));
        }

        loop {
            let into_cycle_s = self.seconds_into_cycle();
            let refill_s = self.refill_duration.as_secs_f64();

            if into_cycle_s < refill_s {
                // Refill in progress: wait it out, then re-evaluate.
                let remaining = refill_s - into_cycle_s;
                debug!(remaining_s = remaining, "waiting for refill to finish");
                sleep(Duration::from_secs_f64(remaining)).await;
                continue;
            }

            let until_next_refill_s = self.period.as_secs_f64() - into_cycle_s;
            if needed_s <= until_next_refill_s {
                debug!(
                    needed_s,
                    until_next_refill_s, "exposure fits before next refill"
                );
                return Ok(());
            }

            info!(
                needed_s,
                until_next_refill_s, "exposure would straddle refill, holding sweep"
            );
            sleep(Duration::from_secs_f64(until_next_refill_s)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_immediately_when_window_fits() {
        let gate =
            PeriodicTopupGate::new(Duration::from_secs(600), Duration::from_secs(15));
        let started = Instant::now();
        gate.await_safe_window(10.0, 5.0).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_holds_until_refill_passes() {
        // 1s cycle with a 100ms refill; "now" sits 150ms before the next one.
        let gate = PeriodicTopupGate::with_phase(
            Duration::from_secs(1),
            Duration::from_millis(100),
            Duration::from_millis(850),
        );
        let started = Instant::now();
        gate.await_safe_window(0.2, 0.1).await.unwrap();
        // Must have waited out the remaining cycle and the refill itself.
        assert!(started.elapsed() >= Duration::from_millis(240));
    }

    #[tokio::test]
    async fn test_impossible_window_rejected() {
        let gate =
            PeriodicTopupGate::new(Duration::from_secs(600), Duration::from_secs(15));
        let result = gate.await_safe_window(600.0, 5.0).await;
        assert!(matches!(result, Err(BeamlineError::Aborted(_))));
    }
}
