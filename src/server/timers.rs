//! Randomized timeouts represented as absolute deadlines, per spec's design
//! notes: the event loop computes its next wake by taking the minimum of
//! the live deadlines rather than sleeping on a relative duration.
use std::time::{Duration, Instant};

use rand::Rng;

use crate::common::{
    ELECTION_TIMEOUT_MAX_MS, ELECTION_TIMEOUT_MIN_MS, HEARTBEAT_INTERVAL_MS, LEADER_WATCHDOG_MS,
    REDIRECT_FLUSH_DEADLINE_MS,
};

fn random_election_timeout() -> Duration {
    let ms = rand::thread_rng().gen_range(ELECTION_TIMEOUT_MIN_MS..=ELECTION_TIMEOUT_MAX_MS);
    Duration::from_millis(ms)
}

/// Bookkeeping for the replica's four independent deadlines: election
/// timeout, heartbeat interval (leader only), leader progress watchdog
/// (leader only), and the deferred-redirect flush deadline.
pub struct Timers {
    pub last_heartbeat: Instant,
    election_timeout: Duration,
    pub last_consensus: Instant,
    pub redirect_flush_deadline: Instant,
}

impl Timers {
    pub fn new() -> Timers {
        let now = Instant::now();
        Timers {
            last_heartbeat: now,
            election_timeout: random_election_timeout(),
            last_consensus: now,
            redirect_flush_deadline: now + Duration::from_millis(REDIRECT_FLUSH_DEADLINE_MS),
        }
    }

    /// Called whenever we hear from the current leader, or whenever we grant
    /// a vote: both reset the election clock.
    pub fn reset_election_timeout(&mut self) {
        self.last_heartbeat = Instant::now();
        self.election_timeout = random_election_timeout();
    }

    pub fn election_timed_out(&self) -> bool {
        self.last_heartbeat.elapsed() >= self.election_timeout
    }

    pub fn heartbeat_due(&self) -> bool {
        self.last_heartbeat.elapsed() >= Duration::from_millis(HEARTBEAT_INTERVAL_MS)
    }

    pub fn note_heartbeat_sent(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn note_consensus_progress(&mut self) {
        self.last_consensus = Instant::now();
    }

    /// A leader that hasn't committed anything in 2T is presumed to have
    /// lost quorum (partitioned away) and should step down.
    pub fn leader_watchdog_expired(&self) -> bool {
        self.last_consensus.elapsed() >= Duration::from_millis(LEADER_WATCHDOG_MS)
    }

    pub fn redirect_flush_due(&self) -> bool {
        Instant::now() >= self.redirect_flush_deadline
    }

    pub fn reset_redirect_flush_deadline(&mut self) {
        self.redirect_flush_deadline =
            Instant::now() + Duration::from_millis(REDIRECT_FLUSH_DEADLINE_MS);
    }

    /// The duration until the earliest deadline that matters for the given
    /// role, used to bound the transport poll (never less than the fixed
    /// tick wait, which the caller clamps separately).
    pub fn next_wake(&self) -> Duration {
        let now = Instant::now();
        let election_deadline = self.last_heartbeat + self.election_timeout;
        let candidates = [election_deadline, self.redirect_flush_deadline];
        candidates
            .iter()
            .map(|d| d.saturating_duration_since(now))
            .min()
            .unwrap_or(Duration::from_millis(0))
    }
}

impl Default for Timers {
    fn default() -> Timers {
        Timers::new()
    }
}
