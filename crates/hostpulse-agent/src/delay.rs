//! Per-host posting offsets.
//!
//! Every agent posts once per base interval, but at an offset derived from
//! its host id, so a fleet started at the same moment does not hit the
//! service in the same second.

use sha1::{Digest, Sha1};
use std::time::Duration;

/// Stable offset in `[0, interval)` whole seconds for `host_id`.
///
/// The offset is the last byte of the SHA-1 digest of the id reduced modulo
/// the interval, so it never changes across restarts.
///
/// # Examples
///
/// ```
/// use hostpulse_agent::delay::delay_by_host;
/// use std::time::Duration;
///
/// let interval = Duration::from_secs(60);
/// let delay = delay_by_host("2eQGEaLxiYU", interval);
/// assert_eq!(delay, delay_by_host("2eQGEaLxiYU", interval));
/// assert!(delay < interval);
/// ```
pub fn delay_by_host(host_id: &str, interval: Duration) -> Duration {
    let interval_secs = interval.as_secs();
    if interval_secs == 0 {
        return Duration::ZERO;
    }
    let digest = Sha1::digest(host_id.as_bytes());
    let last = u64::from(digest[digest.len() - 1]);
    Duration::from_secs(last % interval_secs)
}

/// Time left until this host's offset within the current interval.
///
/// Zero when the offset has already passed in the current interval; the
/// caller then posts right away.
pub fn until_host_slot(post_delay: Duration, interval: Duration, now_unix: i64) -> Duration {
    let interval_secs = interval.as_secs() as i64;
    if interval_secs == 0 {
        return Duration::ZERO;
    }
    let elapsed = now_unix.rem_euclid(interval_secs) as u64;
    Duration::from_secs(post_delay.as_secs().saturating_sub(elapsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_digest() {
        // sha1("abc") ends with 0x9d = 157
        assert_eq!(
            delay_by_host("abc", Duration::from_secs(60)),
            Duration::from_secs(157 % 60)
        );
        assert_eq!(
            delay_by_host("abc", Duration::from_secs(200)),
            Duration::from_secs(157)
        );
    }

    #[test]
    fn stays_within_interval() {
        let interval = Duration::from_secs(60);
        for i in 0..500 {
            let id = format!("host-{i}");
            assert!(delay_by_host(&id, interval) < interval);
        }
    }

    #[test]
    fn distinct_hosts_spread_over_interval() {
        let interval = Duration::from_secs(60);
        let offsets: std::collections::HashSet<_> = (0..500)
            .map(|i| delay_by_host(&format!("host-{i}"), interval))
            .collect();
        assert!(offsets.len() > 40, "only {} distinct offsets", offsets.len());
    }

    #[test]
    fn zero_interval_yields_zero() {
        assert_eq!(delay_by_host("abc", Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn waits_until_slot_within_current_interval() {
        let interval = Duration::from_secs(60);
        let post_delay = Duration::from_secs(37);
        // 10 seconds into the minute
        assert_eq!(
            until_host_slot(post_delay, interval, 1_700_000_010 - 1_700_000_010 % 60 + 10),
            Duration::from_secs(27)
        );
        // slot already passed
        assert_eq!(
            until_host_slot(post_delay, interval, 1_700_000_000 - 1_700_000_000 % 60 + 50),
            Duration::ZERO
        );
    }
}
