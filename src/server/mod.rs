//! The replicated key-value core: role state machine, election, log
//! replication/induction, commit computation, and client request handling,
//! driven by a single-threaded event loop over one UDP datagram socket.
#[path = "log.rs"]
mod raftlog;
mod client;
mod message;
mod timers;
mod transport;

pub use message::{Envelope, MessageBody};
pub use raftlog::{Entry, Log};

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, warn};

use crate::common::{self, Result, APPEND_ENTRIES_BATCH_SIZE, BROADCAST_ID, TICK_WAIT_MS};
use client::{PendingTable, RedirectQueue};
use message::WireEntry;
use timers::Timers;
use transport::Transport;

/// Each server has a unique short identifier and a socket address. These
/// mappings must be identical for every server in the cluster.
pub struct Config {
    pub me: (String, SocketAddr),
    pub peers: HashMap<String, SocketAddr>,
}

impl Config {
    pub fn new(me: (String, SocketAddr), peers: HashMap<String, SocketAddr>) -> Config {
        Config { me, peers }
    }
}

/// States that each machine can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// Leader's belief about a single follower's replication progress.
/// `Unknown` (never contacted this term) must stay distinct from
/// `Confirmed(None)` (we've heard from it and its log is confirmed empty,
/// i.e. match index -1) -- collapsing the two loses a confirmed fact and
/// makes a severely-behind follower's catch-up batches keep missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchIndex {
    Unknown,
    Confirmed(Option<usize>),
}

fn index_to_wire(index: Option<usize>) -> i64 {
    match index {
        None => -1,
        Some(i) => i as i64,
    }
}

fn wire_to_index(value: i64) -> Option<usize> {
    if value < 0 {
        None
    } else {
        Some(value as usize)
    }
}

fn message_term(body: &MessageBody) -> Option<u64> {
    match body {
        MessageBody::Candidacy { term, .. } => Some(*term),
        MessageBody::Vote { term, .. } => Some(*term),
        MessageBody::AppendEntries { term, .. } => Some(*term),
        MessageBody::Agree { term, .. } => Some(*term),
        _ => None,
    }
}

/// A running replica: its role, term, log, derived state machine, and (while
/// leader) the per-peer match-index and pending-request bookkeeping. Owned
/// exclusively by the event loop -- there is no locking anywhere in here.
pub struct Replica {
    id: String,
    peers: HashMap<String, SocketAddr>,
    transport: Transport,

    term: u64,
    role: Role,
    leader_id: String,
    voted_for: Option<String>,
    votes: HashSet<String>,

    log: raftlog::Log,
    commit_index: Option<usize>,

    /// Leader's belief about how far each follower's log extends.
    match_index: HashMap<String, MatchIndex>,

    pending: PendingTable,
    redirect_queue: RedirectQueue,

    timers: Timers,
}

impl Replica {
    pub fn new(config: Config) -> Result<Replica> {
        let (id, addr) = config.me;
        let transport = Transport::bind(addr)?;
        Ok(Replica {
            id,
            peers: config.peers,
            transport,
            term: 0,
            role: Role::Follower,
            leader_id: BROADCAST_ID.to_string(),
            voted_for: None,
            votes: HashSet::new(),
            log: raftlog::Log::new(),
            commit_index: None,
            match_index: HashMap::new(),
            pending: PendingTable::new(),
            redirect_queue: RedirectQueue::new(),
            timers: Timers::new(),
        })
    }

    fn peer_list(&self) -> Vec<(String, SocketAddr)> {
        self.peers.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    fn make_envelope(&self, dst: &str, body: MessageBody) -> Envelope {
        Envelope::new(&self.id, dst, &self.leader_id, body)
    }

    fn announce_hello(&self) {
        let env = Envelope::hello(&self.id);
        for (_peer_id, addr) in self.peer_list() {
            self.transport.send(addr, &env);
        }
    }

    /// Runs the event loop forever. Each iteration blocks on the transport
    /// for a short bounded wait, processes at most one inbound message, and
    /// then re-checks timers.
    pub fn run(&mut self) -> Result<()> {
        self.announce_hello();
        loop {
            self.tick()?;
        }
    }

    fn tick(&mut self) -> Result<()> {
        let wait = Duration::from_millis(TICK_WAIT_MS).min(self.timers.next_wake());
        if let Some((env, from)) = self.transport.recv_timeout(wait)? {
            self.handle_envelope(env, from);
        }
        self.check_timers();
        Ok(())
    }

    fn check_timers(&mut self) {
        match self.role {
            Role::Follower | Role::Candidate => {
                if self.timers.election_timed_out() {
                    self.start_election();
                }
            }
            Role::Leader => {
                if self.timers.heartbeat_due() {
                    self.broadcast_append_entries();
                    self.timers.note_heartbeat_sent();
                }
                if self.timers.leader_watchdog_expired() {
                    warn!(
                        "{} saw no commit progress for the watchdog period, stepping down",
                        self.id
                    );
                    self.start_election();
                }
            }
        }
        if self.redirect_queue.len() > common::REDIRECT_QUEUE_FLUSH_THRESHOLD
            || self.timers.redirect_flush_due()
        {
            self.flush_redirects();
        }
    }

    fn flush_redirects(&mut self) {
        for req in self.redirect_queue.drain() {
            let reply = self.make_envelope(&req.client, MessageBody::Redirect { mid: req.mid });
            self.transport.send(req.addr, &reply);
        }
        self.timers.reset_redirect_flush_deadline();
    }

    // ---- role transitions -------------------------------------------------

    fn become_follower(&mut self, term: u64) {
        self.term = term;
        self.voted_for = None;
        self.votes.clear();
        self.role = Role::Follower;
        self.leader_id = BROADCAST_ID.to_string();
        self.sweep_pending_to_redirects();
    }

    /// Adopts `leader` as the current leader without necessarily changing
    /// term (used when an AppendEntries arrives at `term == self.term` from
    /// a candidate/leader that isn't who we thought the leader was).
    fn demote_and_adopt_leader(&mut self, leader: &str) {
        if self.role != Role::Follower {
            info!("{} demoted to follower, adopting leader {}", self.id, leader);
        }
        self.role = Role::Follower;
        self.leader_id = leader.to_string();
        self.sweep_pending_to_redirects();
    }

    fn sweep_pending_to_redirects(&mut self) {
        for (mid, req) in self.pending.drain_all() {
            self.redirect_queue.push(req.client, req.addr, mid);
        }
    }

    fn start_election(&mut self) {
        self.term += 1;
        self.role = Role::Candidate;
        self.voted_for = Some(self.id.clone());
        self.votes.clear();
        self.votes.insert(self.id.clone());
        self.match_index.clear();
        self.leader_id = BROADCAST_ID.to_string();
        self.timers.reset_election_timeout();
        info!("{} starting election for term {}", self.id, self.term);

        let last_index = index_to_wire(self.log.last_index());
        let last_term = self.log.last_term();
        for (peer_id, addr) in self.peer_list() {
            let env = self.make_envelope(
                &peer_id,
                MessageBody::Candidacy {
                    term: self.term,
                    last_index,
                    last_term,
                },
            );
            self.transport.send(addr, &env);
        }

        // A lone replica with no peers is trivially its own majority.
        if self.peers.is_empty() {
            self.become_leader();
        }
    }

    fn become_leader(&mut self) {
        self.role = Role::Leader;
        self.leader_id = self.id.clone();
        for peer in self.peers.keys() {
            self.match_index.entry(peer.clone()).or_insert(MatchIndex::Unknown);
        }
        self.timers.note_heartbeat_sent();
        self.timers.note_consensus_progress();
        info!("{} became leader for term {}", self.id, self.term);
        self.broadcast_append_entries();
    }

    // ---- election protocol --------------------------------------------

    fn handle_candidacy(
        &mut self,
        candidate: String,
        term: u64,
        last_index: i64,
        last_term: u64,
        from: SocketAddr,
    ) {
        if term < self.term {
            return; // stale term, silently dropped
        }
        let our_last_index_wire = index_to_wire(self.log.last_index());
        let our_last_term = self.log.last_term();
        let log_ok = last_term > our_last_term
            || (last_term == our_last_term && last_index >= our_last_index_wire);
        let can_vote =
            self.voted_for.is_none() || self.voted_for.as_deref() == Some(candidate.as_str());

        if can_vote && log_ok {
            self.voted_for = Some(candidate.clone());
            self.timers.reset_election_timeout();
            debug!("{} granting vote to {} for term {}", self.id, candidate, term);
            let reply = self.make_envelope(
                &candidate,
                MessageBody::Vote {
                    term: self.term,
                    value: our_last_index_wire,
                },
            );
            self.transport.send(from, &reply);
        }
        // Denials are not modeled on the wire (no "deny" message type); the
        // candidate simply never hears from us this round.
    }

    fn handle_vote(&mut self, from_id: String, term: u64, value: i64) {
        if term < self.term || self.role != Role::Candidate || term != self.term {
            return;
        }
        self.votes.insert(from_id.clone());
        self.match_index
            .insert(from_id, MatchIndex::Confirmed(wire_to_index(value)));

        let granted_by_others = self.votes.iter().filter(|v| **v != self.id).count();
        if common::has_majority(granted_by_others, self.peers.len()) {
            self.become_leader();
        }
    }

    // ---- replication / induction protocol -------------------------------

    /// The confirmed match index for `peer_id`, or `None` if we've never
    /// heard from it this term. Distinct from `effective_match_index`: this
    /// never substitutes the optimistic default for an unconfirmed peer, so
    /// callers that need "do we actually know this" (commit computation) get
    /// a trustworthy answer.
    fn confirmed_match_index(&self, peer_id: &str) -> Option<Option<usize>> {
        match self.match_index.get(peer_id) {
            Some(MatchIndex::Confirmed(m)) => Some(*m),
            Some(MatchIndex::Unknown) | None => None,
        }
    }

    /// What prevLogIndex to use when replicating to `peer_id`. Honors an
    /// explicitly confirmed position -- including a confirmed empty log,
    /// match index -1 -- and only falls back to the optimistic
    /// `max(len(log)-50, 0)` guess when the peer has never been contacted.
    fn effective_match_index(&self, peer_id: &str) -> Option<usize> {
        match self.confirmed_match_index(peer_id) {
            Some(confirmed) => confirmed,
            None => {
                let default_count = self.log.len().saturating_sub(APPEND_ENTRIES_BATCH_SIZE);
                if default_count == 0 {
                    None
                } else {
                    Some(default_count - 1)
                }
            }
        }
    }

    fn send_append_entries_to(&mut self, peer_id: &str) {
        let addr = match self.peers.get(peer_id) {
            Some(a) => *a,
            None => return,
        };
        let prev_log_index = self.effective_match_index(peer_id);
        let prev_log_term = prev_log_index
            .map(|i| self.log.term_at(i).unwrap_or(0))
            .unwrap_or(0);
        let batch: Vec<WireEntry> = self
            .log
            .entries_after(prev_log_index)
            .iter()
            .take(APPEND_ENTRIES_BATCH_SIZE)
            .map(message::entry_to_wire)
            .collect();

        let env = self.make_envelope(
            peer_id,
            MessageBody::AppendEntries {
                term: self.term,
                prev_log_index: index_to_wire(prev_log_index),
                prev_log_term,
                entries: batch,
                leader_commit: index_to_wire(self.commit_index),
            },
        );
        self.transport.send(addr, &env);
    }

    fn broadcast_append_entries(&mut self) {
        let peer_ids: Vec<String> = self.peers.keys().cloned().collect();
        for peer_id in peer_ids {
            self.send_append_entries_to(&peer_id);
        }
    }

    fn handle_append_entries(
        &mut self,
        leader: String,
        term: u64,
        prev_log_index_wire: i64,
        prev_log_term: u64,
        wire_entries: Vec<WireEntry>,
        leader_commit_wire: i64,
        from: SocketAddr,
    ) {
        if term < self.term {
            return; // stale term, silently dropped
        }
        if self.role != Role::Follower || self.leader_id != leader {
            self.demote_and_adopt_leader(&leader);
        }
        self.timers.reset_election_timeout();

        let prev_log_index = wire_to_index(prev_log_index_wire);
        let entries: Vec<raftlog::Entry> =
            wire_entries.iter().map(message::entry_from_wire).collect();

        if entries.is_empty() {
            // Heartbeat: if the leader thinks we're shorter than our real
            // log length, we believe ourselves behind and ask to be caught up.
            if leader_commit_wire >= self.log.len() as i64 {
                let reply = self.make_envelope(
                    &leader,
                    MessageBody::InduceMe {
                        value: index_to_wire(self.commit_index),
                        mid: None,
                    },
                );
                self.transport.send(from, &reply);
            }
            return;
        }

        if self.log.matches_from(prev_log_index, &entries) {
            // Idempotent duplicate: our log already has these entries.
            let reply = self.make_envelope(
                &leader,
                MessageBody::Agree {
                    term: self.term,
                    value: index_to_wire(self.log.last_index()),
                    mid: None,
                },
            );
            self.transport.send(from, &reply);
            return;
        }

        let consistent = match prev_log_index {
            None => true,
            Some(i) => self.log.term_at(i) == Some(prev_log_term),
        };

        if consistent {
            self.log.truncate_and_append(prev_log_index, &entries);
            let new_last = self.log.last_index();
            let reply = self.make_envelope(
                &leader,
                MessageBody::Agree {
                    term: self.term,
                    value: index_to_wire(new_last),
                    mid: None,
                },
            );
            self.transport.send(from, &reply);

            if let Some(lc) = wire_to_index(leader_commit_wire) {
                if self.commit_index.map_or(true, |ci| lc > ci) {
                    self.commit_index = new_last.map(|nl| lc.min(nl)).or(self.commit_index);
                    self.log.apply_through(self.commit_index);
                }
            }
        } else {
            let reply = self.make_envelope(
                &leader,
                MessageBody::InduceMe {
                    value: index_to_wire(self.commit_index),
                    mid: None,
                },
            );
            self.transport.send(from, &reply);
        }
    }

    fn handle_agree(&mut self, from_id: String, term: u64, value: i64) {
        if term < self.term || self.role != Role::Leader {
            return;
        }
        let reported = wire_to_index(value);
        let slot = self.match_index.entry(from_id).or_insert(MatchIndex::Unknown);
        let merged = match *slot {
            MatchIndex::Unknown => reported,
            MatchIndex::Confirmed(existing) => match (existing, reported) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (existing, None) => existing,
                (None, Some(b)) => Some(b),
            },
        };
        *slot = MatchIndex::Confirmed(merged);
        self.recompute_commit();
    }

    fn handle_induce_me(&mut self, from_id: String, value: i64) {
        if self.role != Role::Leader {
            return;
        }
        // Only adopt the follower's self-reported position if we don't
        // already have a confirmed one -- induce_me's value is a fallback,
        // not an update, per the catch-up rule.
        if self.confirmed_match_index(&from_id).is_none() {
            self.match_index
                .insert(from_id.clone(), MatchIndex::Confirmed(wire_to_index(value)));
        }
        self.send_append_entries_to(&from_id);
    }

    // ---- commit computation ---------------------------------------------

    /// The `ceil((n+1)/2)`-th largest element of the match-index multiset,
    /// where `n` is the full cluster size including the leader's own log
    /// tail. For a five-node cluster this is the third-largest, generalizing
    /// the fixed-size "sort and take the median" trick to any cluster size.
    fn recompute_commit(&mut self) {
        if self.role != Role::Leader {
            return;
        }
        let n = self.peers.len() + 1;
        let mut indices: Vec<i64> = self
            .peers
            .keys()
            .map(|p| index_to_wire(self.confirmed_match_index(p).flatten()))
            .collect();
        indices.push(index_to_wire(self.log.last_index()));
        indices.sort_unstable();

        let k = (n + 2) / 2; // ceil((n+1)/2)
        let pos = n.saturating_sub(k);
        let h = match wire_to_index(indices[pos]) {
            Some(h) => h,
            None => return,
        };

        if self.log.term_at(h) != Some(self.term) {
            // Only commit entries from the current term directly; older
            // entries are committed indirectly once a same-term entry commits.
            return;
        }
        let advanced = self.commit_index.map_or(true, |ci| h > ci);
        if advanced {
            self.commit_index = Some(h);
            self.log.apply_through(self.commit_index);
            self.timers.note_consensus_progress();
            self.answer_committed_pending();
        }
    }

    fn answer_committed_pending(&mut self) {
        let ci = match self.commit_index {
            Some(c) => c,
            None => return,
        };
        for (mid, req) in self.pending.drain_committed(ci) {
            let reply = self.make_envelope(&req.client, MessageBody::Ok { mid, value: None });
            self.transport.send(req.addr, &reply);
        }
    }

    // ---- client request handling -----------------------------------------

    /// Reads are answered straight from the leader's applied state with no
    /// freshness round, so a recently-deposed leader sitting in a partition
    /// can return a stale value for a brief window. This is documented as
    /// accepted behavior rather than a bug.
    fn handle_get(&mut self, client: String, mid: String, key: String, from: SocketAddr) {
        match self.role {
            Role::Leader => {
                let value = self.log.get(&key);
                let reply =
                    self.make_envelope(&client, MessageBody::Ok { mid, value: Some(value) });
                self.transport.send(from, &reply);
            }
            _ => self.redirect_queue.push(client, from, mid),
        }
    }

    fn handle_put(&mut self, client: String, mid: String, key: String, value: String, from: SocketAddr) {
        match self.role {
            Role::Leader => {
                if self.pending.contains(&mid) {
                    return; // duplicate retry, dropped idempotently
                }
                let index = self.log.append(self.term, key, value);
                self.pending.insert(mid, client, from, index);
                // Eager fan-out is permitted; the next heartbeat would
                // replicate it anyway if this send is lost.
                self.broadcast_append_entries();
            }
            _ => self.redirect_queue.push(client, from, mid),
        }
    }

    fn handle_envelope(&mut self, env: Envelope, from: SocketAddr) {
        if !env.addressed_to(&self.id) {
            return;
        }
        if let Some(term) = message_term(&env.body) {
            if term > self.term {
                self.become_follower(term);
            }
        }
        match env.body {
            MessageBody::Hello => {}
            MessageBody::Get { mid, key } => self.handle_get(env.src, mid, key, from),
            MessageBody::Put { mid, key, value } => self.handle_put(env.src, mid, key, value, from),
            MessageBody::Candidacy {
                term,
                last_index,
                last_term,
            } => self.handle_candidacy(env.src, term, last_index, last_term, from),
            MessageBody::Vote { term, value } => self.handle_vote(env.src, term, value),
            MessageBody::AppendEntries {
                term,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            } => self.handle_append_entries(
                env.src,
                term,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
                from,
            ),
            MessageBody::Agree { term, value, .. } => self.handle_agree(env.src, term, value),
            MessageBody::InduceMe { value, .. } => self.handle_induce_me(env.src, value),
            MessageBody::Ok { .. } | MessageBody::Fail { .. } | MessageBody::Redirect { .. } => {
                // Replicas never issue get/put, so these client-facing
                // replies should never arrive here; ignore defensively.
            }
        }
    }
}

pub fn run(config: Config) -> Result<()> {
    let mut replica = Replica::new(config)?;
    replica.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn loopback_config(id: &str, peers: HashMap<String, SocketAddr>) -> Config {
        Config::new(
            (id.to_string(), SocketAddr::from((Ipv4Addr::LOCALHOST, 0))),
            peers,
        )
    }

    #[test]
    fn solo_cluster_becomes_leader_immediately() {
        let mut r = Replica::new(loopback_config("0000", HashMap::new())).unwrap();
        assert_eq!(r.role, Role::Follower);
        r.start_election();
        assert_eq!(r.role, Role::Leader);
        assert_eq!(r.term, 1);
    }

    #[test]
    fn candidate_becomes_leader_on_majority_vote() {
        let mut peers = HashMap::new();
        peers.insert("0001".to_string(), SocketAddr::from((Ipv4Addr::LOCALHOST, 1)));
        peers.insert("0002".to_string(), SocketAddr::from((Ipv4Addr::LOCALHOST, 2)));
        let mut r = Replica::new(loopback_config("0000", peers)).unwrap();
        r.start_election();
        assert_eq!(r.role, Role::Candidate);
        let term = r.term;
        r.handle_vote("0001".to_string(), term, 5);
        assert_eq!(r.role, Role::Leader);
    }

    #[test]
    fn stale_term_vote_is_ignored() {
        let mut peers = HashMap::new();
        peers.insert("0001".to_string(), SocketAddr::from((Ipv4Addr::LOCALHOST, 1)));
        let mut r = Replica::new(loopback_config("0000", peers)).unwrap();
        r.start_election(); // term 1
        r.handle_vote("0001".to_string(), 0, 5); // stale term, ignored
        assert_eq!(r.role, Role::Candidate);
    }

    #[test]
    fn duplicate_put_mid_is_dropped() {
        let mut r = Replica::new(loopback_config("0000", HashMap::new())).unwrap();
        r.role = Role::Leader;
        let from = SocketAddr::from((Ipv4Addr::LOCALHOST, 9999));
        r.handle_put("client".into(), "m1".into(), "k".into(), "v1".into(), from);
        r.handle_put("client".into(), "m1".into(), "k".into(), "v2".into(), from);
        assert_eq!(r.log.len(), 1);
        assert_eq!(r.log.entry(0).unwrap().value, "v1");
    }

    #[test]
    fn get_on_follower_is_redirected_not_failed() {
        let mut r = Replica::new(loopback_config("0000", HashMap::new())).unwrap();
        let from = SocketAddr::from((Ipv4Addr::LOCALHOST, 9999));
        r.handle_get("client".into(), "m1".into(), "k".into(), from);
        assert_eq!(r.redirect_queue.len(), 1);
    }

    #[test]
    fn missing_key_reads_back_empty_string() {
        let mut r = Replica::new(loopback_config("0000", HashMap::new())).unwrap();
        r.role = Role::Leader;
        assert_eq!(r.log.get("nope"), "");
    }

    #[test]
    fn five_node_commit_uses_third_largest_match_index() {
        let mut peers = HashMap::new();
        for (i, id) in ["0001", "0002", "0003", "0004"].iter().enumerate() {
            peers.insert(id.to_string(), SocketAddr::from((Ipv4Addr::LOCALHOST, 1 + i as u16)));
        }
        let mut r = Replica::new(loopback_config("0000", peers)).unwrap();
        r.role = Role::Leader;
        r.term = 1;
        for _ in 0..10 {
            r.log.append(1, "k".into(), "v".into());
        }
        // match indices: 9, 7, 3, 0 plus leader's own 9 => sorted [0,3,7,9,9], 3rd largest = 7.
        r.match_index.insert("0001".into(), MatchIndex::Confirmed(Some(9)));
        r.match_index.insert("0002".into(), MatchIndex::Confirmed(Some(7)));
        r.match_index.insert("0003".into(), MatchIndex::Confirmed(Some(3)));
        r.match_index.insert("0004".into(), MatchIndex::Confirmed(Some(0)));
        r.recompute_commit();
        assert_eq!(r.commit_index, Some(7));
    }

    #[test]
    fn commit_requires_current_term_entry() {
        let mut peers = HashMap::new();
        peers.insert("0001".to_string(), SocketAddr::from((Ipv4Addr::LOCALHOST, 1)));
        peers.insert("0002".to_string(), SocketAddr::from((Ipv4Addr::LOCALHOST, 2)));
        let mut r = Replica::new(loopback_config("0000", peers)).unwrap();
        r.role = Role::Leader;
        r.term = 2;
        r.log.append(1, "a".into(), "1".into()); // stale-term entry
        r.log.append(2, "b".into(), "2".into()); // current-term entry
        r.match_index.insert("0001".into(), MatchIndex::Confirmed(Some(0)));
        r.match_index.insert("0002".into(), MatchIndex::Confirmed(Some(0)));
        // Only index 0 (term 1) has quorum; must not commit despite quorum,
        // since its term doesn't match the current term.
        r.recompute_commit();
        assert_eq!(r.commit_index, None);

        r.match_index.insert("0001".into(), MatchIndex::Confirmed(Some(1)));
        r.match_index.insert("0002".into(), MatchIndex::Confirmed(Some(1)));
        r.recompute_commit();
        assert_eq!(r.commit_index, Some(1));
    }

    #[test]
    fn follower_accepts_first_entry_with_empty_prior_log() {
        let mut r = Replica::new(loopback_config("0001", HashMap::new())).unwrap();
        r.term = 1;
        let from = SocketAddr::from((Ipv4Addr::LOCALHOST, 9999));
        r.handle_append_entries(
            "0000".to_string(),
            1,
            -1,
            0,
            vec![(1, ("a".to_string(), "1".to_string()))],
            -1,
            from,
        );
        assert_eq!(r.log.len(), 1);
        assert_eq!(r.leader_id, "0000");
        assert_eq!(r.role, Role::Follower);
    }

    #[test]
    fn follower_requests_induction_on_mismatch() {
        let mut r = Replica::new(loopback_config("0001", HashMap::new())).unwrap();
        r.term = 1;
        let from = SocketAddr::from((Ipv4Addr::LOCALHOST, 9999));
        // prev_log_index = 5 but our log is empty: inconsistent, should ask to induce.
        r.handle_append_entries(
            "0000".to_string(),
            1,
            5,
            1,
            vec![(1, ("a".to_string(), "1".to_string()))],
            -1,
            from,
        );
        assert_eq!(r.log.len(), 0);
    }

    #[test]
    fn far_behind_follower_converges_via_repeated_induction() {
        let mut peers = HashMap::new();
        peers.insert("0001".to_string(), SocketAddr::from((Ipv4Addr::LOCALHOST, 1)));
        let mut leader = Replica::new(loopback_config("0000", peers)).unwrap();
        leader.role = Role::Leader;
        leader.term = 1;
        for i in 0..120 {
            leader.log.append(1, format!("k{}", i), format!("v{}", i));
        }

        let mut follower = Replica::new(loopback_config("0001", HashMap::new())).unwrap();
        follower.term = 1;
        let from = SocketAddr::from((Ipv4Addr::LOCALHOST, 9999));

        // Follower starts with an empty log and tells the leader so via
        // induce_me{value: -1}; this must register as a *confirmed* -1,
        // not get lost as "still unknown".
        leader.handle_induce_me("0001".to_string(), -1);

        let mut rounds = 0;
        loop {
            rounds += 1;
            assert!(rounds <= 10, "did not converge within a reasonable number of rounds");

            let prev_log_index = leader.effective_match_index("0001");
            let prev_log_term = prev_log_index
                .map(|i| leader.log.term_at(i).unwrap_or(0))
                .unwrap_or(0);
            let batch: Vec<WireEntry> = leader
                .log
                .entries_after(prev_log_index)
                .iter()
                .take(APPEND_ENTRIES_BATCH_SIZE)
                .map(message::entry_to_wire)
                .collect();
            if batch.is_empty() {
                break;
            }

            follower.handle_append_entries(
                "0000".to_string(),
                1,
                index_to_wire(prev_log_index),
                prev_log_term,
                batch,
                -1,
                from,
            );
            let follower_last = index_to_wire(follower.log.last_index());
            leader.handle_agree("0001".to_string(), 1, follower_last);

            if follower.log.len() == leader.log.len() {
                break;
            }
        }

        assert_eq!(follower.log.len(), leader.log.len());
        assert!(rounds > 1, "expected more than one batch for a 120-entry log with a 50-entry cap");
    }

    #[test]
    fn demotion_sweeps_pending_into_redirect_queue() {
        let mut r = Replica::new(loopback_config("0000", HashMap::new())).unwrap();
        r.role = Role::Leader;
        let from = SocketAddr::from((Ipv4Addr::LOCALHOST, 9999));
        r.handle_put("client".into(), "m1".into(), "k".into(), "v".into(), from);
        assert!(!r.pending.is_empty());
        let next_term = r.term + 1;
        r.handle_append_entries("0009".to_string(), next_term, -1, 0, vec![], -1, from);
        assert!(r.pending.is_empty());
        assert_eq!(r.redirect_queue.len(), 1);
    }

    #[test]
    fn has_majority_used_for_quorum_decisions() {
        assert!(common::has_majority(2, 4));
        assert!(!common::has_majority(1, 4));
    }
}
