//! Ping/pong liveness tracking.
//!
//! Both the broker's per-peer writer and the simulator's transport client
//! keep a connection alive the same way: send a ping every `interval`, and
//! declare the connection dead when a pong does not arrive within `timeout`
//! of the ping. The tracker only does the bookkeeping; the caller owns the
//! socket and decides what a dead connection means.

use tokio::time::{Duration, Instant};

/// What the caller should do at `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessCheck {
    /// Time to send a ping.
    SendPing,
    /// The outstanding ping went unanswered for too long.
    Expired,
    /// Nothing to do before [`Liveness::deadline`].
    Idle,
}

/// Ping schedule for one connection.
#[derive(Debug, Clone)]
pub struct Liveness {
    interval: Duration,
    timeout: Duration,
    next_ping: Instant,
    outstanding: Option<Instant>,
}

impl Liveness {
    /// First ping is due one `interval` after `now`.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration, now: Instant) -> Self {
        Self {
            interval,
            timeout,
            next_ping: now + interval,
            outstanding: None,
        }
    }

    /// The next instant at which [`poll`](Self::poll) has something to report.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        match self.outstanding {
            Some(sent) => (sent + self.timeout).min(self.next_ping),
            None => self.next_ping,
        }
    }

    /// Check the schedule.
    #[must_use]
    pub fn poll(&self, now: Instant) -> LivenessCheck {
        if let Some(sent) = self.outstanding {
            if now >= sent + self.timeout {
                return LivenessCheck::Expired;
            }
        }
        if now >= self.next_ping {
            LivenessCheck::SendPing
        } else {
            LivenessCheck::Idle
        }
    }

    /// Record that a ping went out at `now`.
    ///
    /// An earlier unanswered ping keeps its original send time so a peer
    /// cannot stay alive by ignoring every ping.
    pub fn ping_sent(&mut self, now: Instant) {
        self.outstanding.get_or_insert(now);
        self.next_ping = now + self.interval;
    }

    /// Record an incoming pong.
    pub fn pong_received(&mut self) {
        self.outstanding = None;
    }

    /// Whether a ping is waiting for its pong.
    #[must_use]
    pub const fn awaiting_pong(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Longest a single write may block before the peer counts as stalled.
    ///
    /// No ping can go out while a write is pending, so the write gets one
    /// full ping round.
    #[must_use]
    pub fn stall_limit(&self) -> Duration {
        self.interval + self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn idle_until_first_interval() {
        let start = Instant::now();
        let liveness = Liveness::new(10 * SECOND, 5 * SECOND, start);

        assert_eq!(liveness.poll(start), LivenessCheck::Idle);
        assert_eq!(liveness.deadline(), start + 10 * SECOND);
        assert_eq!(liveness.poll(start + 10 * SECOND), LivenessCheck::SendPing);
    }

    #[test]
    fn pong_within_timeout_keeps_connection_alive() {
        let start = Instant::now();
        let mut liveness = Liveness::new(10 * SECOND, 5 * SECOND, start);

        liveness.ping_sent(start + 10 * SECOND);
        assert!(liveness.awaiting_pong());
        assert_eq!(liveness.deadline(), start + 15 * SECOND);

        liveness.pong_received();
        assert!(!liveness.awaiting_pong());
        assert_eq!(liveness.poll(start + 16 * SECOND), LivenessCheck::Idle);
        assert_eq!(liveness.poll(start + 20 * SECOND), LivenessCheck::SendPing);
    }

    #[test]
    fn missing_pong_expires() {
        let start = Instant::now();
        let mut liveness = Liveness::new(10 * SECOND, 5 * SECOND, start);

        liveness.ping_sent(start + 10 * SECOND);
        assert_eq!(liveness.poll(start + 14 * SECOND), LivenessCheck::Idle);
        assert_eq!(liveness.poll(start + 15 * SECOND), LivenessCheck::Expired);
    }

    #[test]
    fn timeout_longer_than_interval_counts_from_first_ping() {
        let start = Instant::now();
        let mut liveness = Liveness::new(20 * SECOND, 30 * SECOND, start);

        liveness.ping_sent(start + 20 * SECOND);
        assert_eq!(liveness.poll(start + 40 * SECOND), LivenessCheck::SendPing);
        liveness.ping_sent(start + 40 * SECOND);

        assert_eq!(liveness.poll(start + 49 * SECOND), LivenessCheck::Idle);
        assert_eq!(liveness.poll(start + 50 * SECOND), LivenessCheck::Expired);
    }

    #[test]
    fn blocked_write_gets_one_ping_round() {
        let liveness = Liveness::new(10 * SECOND, 5 * SECOND, Instant::now());
        assert_eq!(liveness.stall_limit(), 15 * SECOND);
    }
}
