use anyhow::{Context, Result};
use rand::{thread_rng, Rng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use crate::cli::config::PacingSettings;

/// Randomized delay taken before every fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    /// Uniform range in seconds; bounds are clamped to be non-negative and ordered.
    ///
    /// Fails when a bound does not fit in a `Duration` (infinite or huge values).
    pub fn new(min_secs: f64, max_secs: f64) -> Result<Self> {
        let min = bound(min_secs)?;
        let max = bound(max_secs)?;
        if min <= max {
            Ok(Self { min, max })
        } else {
            Ok(Self { min: max, max: min })
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    /// Draw a delay from the range
    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        thread_rng().gen_range(self.min..=self.max)
    }

    /// Sleep for a freshly drawn delay
    pub async fn pause(&self) {
        if self.is_disabled() {
            return;
        }

        let delay = self.next_delay();
        info!("Waiting {:.2}s before next request", delay.as_secs_f64());
        sleep(delay).await;
    }
}

fn bound(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs.max(0.0))
        .context(format!("Invalid pacing delay: {} seconds", secs))
}

impl TryFrom<&PacingSettings> for Pacing {
    type Error = anyhow::Error;

    fn try_from(settings: &PacingSettings) -> Result<Self> {
        Self::new(settings.min_secs, settings.max_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_range() {
        let pacing = Pacing::new(5.0, 15.0).unwrap();
        for _ in 0..100 {
            let delay = pacing.next_delay();
            assert!(delay >= Duration::from_secs(5));
            assert!(delay <= Duration::from_secs(15));
        }
    }

    #[test]
    fn test_swapped_and_negative_bounds() {
        assert_eq!(Pacing::new(15.0, 5.0).unwrap(), Pacing::new(5.0, 15.0).unwrap());
        assert!(Pacing::new(-1.0, 0.0).unwrap().is_disabled());
        assert_eq!(Pacing::new(0.0, 0.0).unwrap().next_delay(), Duration::ZERO);
    }

    #[test]
    fn test_unrepresentable_bounds_rejected() {
        assert!(Pacing::new(1.0, f64::INFINITY).is_err());
        assert!(Pacing::new(1e20, 2.0).is_err());

        let settings = PacingSettings { min_secs: 5.0, max_secs: f64::INFINITY };
        assert!(Pacing::try_from(&settings).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_sleeps() {
        let pacing = Pacing::new(2.0, 2.0).unwrap();
        let started = tokio::time::Instant::now();
        pacing.pause().await;
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
