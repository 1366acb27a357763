//! Shared constants and error type for the raft server.
use std::fmt;
use std::io;

/// Base timeout unit T, in milliseconds. Election timeouts are drawn from
/// [T, 2T]; heartbeats fire every T/2; the leader progress watchdog and the
/// redirect flush deadline both use 2T.
pub const ELECTION_TIMEOUT_MIN_MS: u64 = 150;
pub const ELECTION_TIMEOUT_MAX_MS: u64 = 300;
pub const HEARTBEAT_INTERVAL_MS: u64 = 75;
pub const LEADER_WATCHDOG_MS: u64 = 300;
pub const REDIRECT_FLUSH_DEADLINE_MS: u64 = 300;

/// Redirects are flushed once the queue holds more than this many requests.
pub const REDIRECT_QUEUE_FLUSH_THRESHOLD: usize = 10;

/// Max number of log entries sent in a single AppendEntries datagram.
pub const APPEND_ENTRIES_BATCH_SIZE: usize = 50;

/// Max JSON-encoded datagram size, per spec.
pub const MAX_FRAME_SIZE: usize = 65_535;

/// How long the event loop blocks on the transport before re-checking timers.
pub const TICK_WAIT_MS: u64 = 10;

/// Distinguished identifier meaning "broadcast / unknown leader".
pub const BROADCAST_ID: &str = "FFFF";

/// True if `granted` votes from `peer_count` peers (excluding self) plus our
/// own vote form a strict majority of the full `peer_count + 1` cluster.
pub fn has_majority(granted: usize, peer_count: usize) -> bool {
    let cluster_size = peer_count + 1;
    (granted + 1) * 2 > cluster_size
}

#[derive(Debug)]
pub enum RaftError {
    /// The datagram socket could not be bound or a send/recv call failed
    /// in a way that isn't just "nothing available yet".
    Io(io::Error),
    /// A datagram did not parse as a well-formed message envelope.
    Decode(String),
}

impl fmt::Display for RaftError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RaftError::Io(e) => write!(f, "io error: {}", e),
            RaftError::Decode(s) => write!(f, "decode error: {}", s),
        }
    }
}

impl std::error::Error for RaftError {}

impl From<io::Error> for RaftError {
    fn from(e: io::Error) -> RaftError {
        RaftError::Io(e)
    }
}

impl From<serde_json::Error> for RaftError {
    fn from(e: serde_json::Error) -> RaftError {
        RaftError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RaftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_of_five_needs_three() {
        // 5-node cluster: 4 peers, need 3 total votes (self + 2 others).
        assert!(!has_majority(1, 4));
        assert!(has_majority(2, 4));
        assert!(has_majority(4, 4));
    }

    #[test]
    fn majority_of_three_needs_two() {
        assert!(!has_majority(0, 2));
        assert!(has_majority(1, 2));
    }

    #[test]
    fn majority_of_one_node_cluster() {
        // No peers at all: self alone is always a majority.
        assert!(has_majority(0, 0));
    }
}
