//! Wire format: a tagged JSON record per datagram, matching spec section 6.
//!
//! `Envelope` carries the common `{src, dst, leader, type, ...}` fields;
//! `MessageBody` is the tagged payload. One `Envelope` <-> one JSON object
//! <-> one UDP datagram.
use serde::{Deserialize, Serialize};

use crate::common::{RaftError, Result, BROADCAST_ID};
use crate::server::log::Entry;

/// A single log entry as it appears on the wire: `[term, [key, value]]`.
pub type WireEntry = (u64, (String, String));

pub fn entry_to_wire(e: &Entry) -> WireEntry {
    (e.term, (e.key.clone(), e.value.clone()))
}

pub fn entry_from_wire(w: &WireEntry) -> Entry {
    Entry {
        term: w.0,
        key: (w.1).0.clone(),
        value: (w.1).1.clone(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum MessageBody {
    #[serde(rename = "hello")]
    Hello,

    #[serde(rename = "get")]
    Get {
        #[serde(rename = "MID")]
        mid: String,
        key: String,
    },

    #[serde(rename = "put")]
    Put {
        #[serde(rename = "MID")]
        mid: String,
        key: String,
        value: String,
    },

    #[serde(rename = "ok")]
    Ok {
        #[serde(rename = "MID")]
        mid: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        value: Option<String>,
    },

    #[serde(rename = "fail")]
    Fail {
        #[serde(rename = "MID")]
        mid: String,
    },

    #[serde(rename = "redirect")]
    Redirect {
        #[serde(rename = "MID")]
        mid: String,
    },

    #[serde(rename = "candidacy")]
    Candidacy {
        term: u64,
        last_index: i64,
        last_term: u64,
    },

    #[serde(rename = "vote")]
    Vote { term: u64, value: i64 },

    #[serde(rename = "AppendEntries")]
    AppendEntries {
        term: u64,
        prev_log_index: i64,
        prev_log_term: u64,
        entries: Vec<WireEntry>,
        leader_commit: i64,
    },

    #[serde(rename = "agree")]
    Agree {
        term: u64,
        value: i64,
        #[serde(rename = "MID", skip_serializing_if = "Option::is_none", default)]
        mid: Option<String>,
    },

    #[serde(rename = "induce_me")]
    InduceMe {
        value: i64,
        #[serde(rename = "MID", skip_serializing_if = "Option::is_none", default)]
        mid: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub src: String,
    pub dst: String,
    pub leader: String,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Envelope {
    pub fn new(src: &str, dst: &str, leader: &str, body: MessageBody) -> Envelope {
        Envelope {
            src: src.to_string(),
            dst: dst.to_string(),
            leader: leader.to_string(),
            body,
        }
    }

    pub fn hello(src: &str) -> Envelope {
        Envelope::new(src, BROADCAST_ID, BROADCAST_ID, MessageBody::Hello)
    }

    /// True if this replica (`me`) should process the message at all.
    pub fn addressed_to(&self, me: &str) -> bool {
        self.dst == me || self.dst == BROADCAST_ID
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Envelope> {
        serde_json::from_slice(bytes).map_err(RaftError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_put() {
        let env = Envelope::new(
            "0000",
            "0001",
            "0001",
            MessageBody::Put {
                mid: "abc".into(),
                key: "x".into(),
                value: "1".into(),
            },
        );
        let bytes = env.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();
        match decoded.body {
            MessageBody::Put { mid, key, value } => {
                assert_eq!(mid, "abc");
                assert_eq!(key, "x");
                assert_eq!(value, "1");
            }
            _ => panic!("expected put"),
        }
    }

    #[test]
    fn append_entries_wire_shape_is_tuple_array() {
        let entries = vec![(3u64, ("k".to_string(), "v".to_string()))];
        let env = Envelope::new(
            "0000",
            "0001",
            "0000",
            MessageBody::AppendEntries {
                term: 3,
                prev_log_index: -1,
                prev_log_term: 0,
                entries,
                leader_commit: -1,
            },
        );
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""entries":[[3,["k","v"]]]"#));
        assert!(json.contains(r#""type":"AppendEntries""#));
        assert!(json.contains(r#""prevLogIndex":-1"#));
    }

    #[test]
    fn addressed_to_self_or_broadcast() {
        let env = Envelope::new("a", "FFFF", "FFFF", MessageBody::Hello);
        assert!(env.addressed_to("zzzz"));
        let env = Envelope::new("a", "bbbb", "FFFF", MessageBody::Hello);
        assert!(env.addressed_to("bbbb"));
        assert!(!env.addressed_to("cccc"));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Envelope::decode(b"not json").is_err());
    }

    #[test]
    fn mid_field_round_trips_as_upper_case() {
        let env = Envelope::new(
            "a",
            "b",
            "b",
            MessageBody::Ok {
                mid: "1".into(),
                value: Some("v".into()),
            },
        );
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""MID":"1""#));
    }
}
