//! Blocking request throttle for the geocoding provider

use crate::error::{AnalogueError, Result};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::time::Duration;

/// Enforces a minimum interval between outbound requests by sleeping the calling thread
pub struct Throttle {
    limiter: DefaultDirectRateLimiter,
    clock: DefaultClock,
    interval: Duration,
}

impl Throttle {
    /// `requests_per_second` may be fractional (0.5 = one request every two seconds)
    pub fn per_second(requests_per_second: f64) -> Result<Self> {
        if !(requests_per_second.is_finite() && requests_per_second > 0.0) {
            return Err(AnalogueError::Validation {
                message: format!("invalid request rate {}", requests_per_second),
            });
        }
        let interval = Duration::try_from_secs_f64(1.0 / requests_per_second).map_err(|e| {
            AnalogueError::Validation {
                message: format!("request rate {} is too low: {}", requests_per_second, e),
            }
        })?;
        let quota = Quota::with_period(interval).ok_or_else(|| AnalogueError::Validation {
            message: "request interval must be non-zero".to_string(),
        })?;
        Ok(Self {
            limiter: RateLimiter::direct(quota),
            clock: DefaultClock::default(),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next request may be sent; returns how long we slept
    pub fn wait(&self) -> Duration {
        let mut slept = Duration::ZERO;
        while let Err(not_until) = self.limiter.check() {
            let pause = not_until.wait_time_from(self.clock.now());
            tracing::trace!("Throttling outbound request for {:?}", pause);
            std::thread::sleep(pause);
            slept += pause;
        }
        slept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_first_request_is_immediate() {
        let throttle = Throttle::per_second(1.0).unwrap();
        assert_eq!(throttle.wait(), Duration::ZERO);
    }

    #[test]
    fn test_second_request_waits_for_interval() {
        let throttle = Throttle::per_second(10.0).unwrap();
        assert_eq!(throttle.interval(), Duration::from_millis(100));
        throttle.wait();
        let start = Instant::now();
        throttle.wait();
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        assert!(Throttle::per_second(0.0).is_err());
        assert!(Throttle::per_second(-1.0).is_err());
        assert!(Throttle::per_second(f64::NAN).is_err());
        // interval would overflow Duration
        assert!(Throttle::per_second(1e-20).is_err());
    }
}
