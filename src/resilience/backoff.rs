//! Retry window growth with jitter.

use std::time::Duration;

/// Retry window for the given Open episode (0-based).
///
/// Episode 0 gets exactly `base`; later episodes double per episode, get up
/// to 10% jitter, and never exceed `max`.
pub fn retry_window_for(episode: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let max_ms = (max.as_millis() as u64).max(base_ms);

    if episode == 0 {
        return Duration::from_millis(base_ms);
    }

    let exponential_base = 2u64.saturating_pow(episode);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        fastrand::u64(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay.saturating_add(jitter).min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_episode_is_exact() {
        let w = retry_window_for(0, Duration::from_secs(10), Duration::from_secs(300));
        assert_eq!(w, Duration::from_secs(10));
    }

    #[test]
    fn test_window_growth() {
        let w1 = retry_window_for(1, Duration::from_millis(100), Duration::from_millis(2000));
        assert!(w1.as_millis() >= 200 && w1.as_millis() < 220);

        let w2 = retry_window_for(2, Duration::from_millis(100), Duration::from_millis(2000));
        assert!(w2.as_millis() >= 400);

        let max = retry_window_for(10, Duration::from_millis(100), Duration::from_millis(1000));
        assert_eq!(max.as_millis(), 1000);
    }

    #[test]
    fn test_max_below_base() {
        let w = retry_window_for(3, Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(w, Duration::from_secs(5));
    }
}
