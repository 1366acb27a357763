//! The replicated log and the derived key-value state machine.
use std::collections::HashMap;

/// A single client mutation, tagged with the term of the leader that placed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub term: u64,
    pub key: String,
    pub value: String,
}

/// Append-only sequence of entries plus the derived `key -> value` map and
/// the apply pointer. Indices are `usize`; "before the log" is represented
/// as `None` / `-1` at the call sites rather than in this type, since an
/// empty log has no valid `usize` index.
#[derive(Debug, Default)]
pub struct Log {
    entries: Vec<Entry>,
    data: HashMap<String, String>,
    last_applied: Option<usize>,
}

impl Log {
    pub fn new() -> Log {
        Log {
            entries: Vec::new(),
            data: HashMap::new(),
            last_applied: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last entry, or `None` if the log is empty.
    pub fn last_index(&self) -> Option<usize> {
        self.entries.len().checked_sub(1)
    }

    /// Term of the last entry, or 0 if the log is empty (spec's convention
    /// for `prevLogTerm` on an empty log).
    pub fn last_term(&self) -> u64 {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn term_at(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|e| e.term)
    }

    /// Entries strictly after `index` (so `-1` / `None` returns the whole log).
    pub fn entries_after(&self, index: Option<usize>) -> &[Entry] {
        let start = match index {
            None => 0,
            Some(i) => i + 1,
        };
        if start >= self.entries.len() {
            &[]
        } else {
            &self.entries[start..]
        }
    }

    /// Appends a leader-originated entry, returning its new index.
    pub fn append(&mut self, term: u64, key: String, value: String) -> usize {
        self.entries.push(Entry { term, key, value });
        self.entries.len() - 1
    }

    /// Follower-side: truncate any entries strictly after `prev_log_index`,
    /// then append `new_entries`. A leader must never call this on its own log.
    pub fn truncate_and_append(&mut self, prev_log_index: Option<usize>, new_entries: &[Entry]) {
        let keep = match prev_log_index {
            None => 0,
            Some(i) => i + 1,
        };
        self.entries.truncate(keep);
        self.entries.extend(new_entries.iter().cloned());
    }

    /// Checks whether `entries` already match this log's contents starting
    /// right after `prev_log_index` -- used for idempotent duplicate
    /// AppendEntries handling (spec 4.3 case 1).
    pub fn matches_from(&self, prev_log_index: Option<usize>, entries: &[Entry]) -> bool {
        let start = match prev_log_index {
            None => 0,
            Some(i) => i + 1,
        };
        if start + entries.len() > self.entries.len() {
            return false;
        }
        &self.entries[start..start + entries.len()] == entries
    }

    pub fn last_applied(&self) -> Option<usize> {
        self.last_applied
    }

    /// Applies entries `last_applied+1 ..= commit_index` in order.
    pub fn apply_through(&mut self, commit_index: Option<usize>) {
        let target = match commit_index {
            None => return,
            Some(i) => i,
        };
        let mut next = match self.last_applied {
            None => 0,
            Some(i) => i + 1,
        };
        while next <= target {
            if let Some(entry) = self.entries.get(next) {
                self.data.insert(entry.key.clone(), entry.value.clone());
            }
            self.last_applied = Some(next);
            next += 1;
        }
    }

    pub fn get(&self, key: &str) -> String {
        self.data.get(key).cloned().unwrap_or_default()
    }
}
