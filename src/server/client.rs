//! Leader-side pending-request table and non-leader redirect queue.
use std::collections::HashMap;
use std::net::SocketAddr;

/// A client request buffered while waiting to be answered: either the
/// leader's pending commit (`PendingRequest`) or a non-leader's deferred
/// `redirect` (`RedirectRequest`). Both keep the client's observed UDP
/// source address, since that -- not a static peer table -- is how a reply
/// eventually finds its way back to an arbitrary client.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// The client replica id to answer, so the reply can echo a sensible `src`.
    pub client: String,
    pub addr: SocketAddr,
    /// The log index this MID's entry landed at.
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct RedirectRequest {
    pub client: String,
    pub addr: SocketAddr,
    pub mid: String,
}

/// `MID -> {client, log index}`, maintained only while this replica is
/// leader. Entries are removed on commit (answered with `ok`) and swept
/// into the redirect queue on demotion.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<String, PendingRequest>,
}

impl PendingTable {
    pub fn new() -> PendingTable {
        PendingTable {
            entries: HashMap::new(),
        }
    }

    pub fn contains(&self, mid: &str) -> bool {
        self.entries.contains_key(mid)
    }

    pub fn insert(&mut self, mid: String, client: String, addr: SocketAddr, index: usize) {
        self.entries.insert(
            mid,
            PendingRequest {
                client,
                addr,
                index,
            },
        );
    }

    /// Removes and returns every pending request whose index is `<= commit_index`,
    /// i.e. those now safe to answer with `ok`.
    pub fn drain_committed(&mut self, commit_index: usize) -> Vec<(String, PendingRequest)> {
        let ready: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, req)| req.index <= commit_index)
            .map(|(mid, _)| mid.clone())
            .collect();
        ready
            .into_iter()
            .map(|mid| {
                let req = self.entries.remove(&mid).unwrap();
                (mid, req)
            })
            .collect()
    }

    /// Removes everything, for the redirect sweep on demotion.
    pub fn drain_all(&mut self) -> Vec<(String, PendingRequest)> {
        self.entries.drain().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Buffer of `get`/`put` requests received while not leader, batched so a
/// run of leader churn doesn't thrash clients with one `redirect` per
/// message (spec 4.5).
#[derive(Debug, Default)]
pub struct RedirectQueue {
    queue: Vec<RedirectRequest>,
}

impl RedirectQueue {
    pub fn new() -> RedirectQueue {
        RedirectQueue { queue: Vec::new() }
    }

    pub fn push(&mut self, client: String, addr: SocketAddr, mid: String) {
        self.queue.push(RedirectRequest { client, addr, mid });
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn drain(&mut self) -> Vec<RedirectRequest> {
        self.queue.drain(..).collect()
    }
}
