use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;

/// Wall clock driven by tokio's monotonic clock.
///
/// The wall time is an anchor plus the tokio time elapsed since the anchor,
/// so a paused tokio runtime (`start_paused = true`) advances workflow time
/// together with timers.
#[derive(Debug, Clone)]
pub struct Clock {
    anchor_wall: OffsetDateTime,
    anchor: Instant,
}

impl Clock {
    pub fn system() -> Self {
        Self::starting_at(OffsetDateTime::now_utc())
    }

    pub fn starting_at(wall: OffsetDateTime) -> Self {
        Self {
            anchor_wall: wall,
            anchor: Instant::now(),
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.anchor_wall + Instant::now().saturating_duration_since(self.anchor)
    }

    /// Time left until `deadline`, zero if it has passed.
    pub fn until(&self, deadline: OffsetDateTime) -> Duration {
        Duration::try_from(deadline - self.now()).unwrap_or(Duration::ZERO)
    }

    pub async fn sleep_until(&self, deadline: OffsetDateTime) {
        let remaining = self.until(deadline);
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test(start_paused = true)]
    async fn follows_paused_tokio_time() {
        let clock = Clock::starting_at(datetime!(2025-03-01 12:00 UTC));
        tokio::time::advance(Duration::from_secs(3 * 24 * 3600)).await;
        assert_eq!(clock.now(), datetime!(2025-03-04 12:00 UTC));
    }

    #[tokio::test(start_paused = true)]
    async fn until_saturates_at_zero() {
        let clock = Clock::starting_at(datetime!(2025-03-01 12:00 UTC));
        assert_eq!(clock.until(datetime!(2025-03-01 11:00 UTC)), Duration::ZERO);
        assert_eq!(
            clock.until(datetime!(2025-03-01 12:00:30 UTC)),
            Duration::from_secs(30)
        );
    }
}
