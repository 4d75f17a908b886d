//! JSON frames exchanged with the rendezvous service.
//!
//! Every frame is a JSON object with a `"type"` discriminator:
//!
//! ```text
//! node -> service  {"type":"register","id":"…","name":"…","ip":"192.168.1.20","port":5000,"files":["a.txt"]}
//! service -> node  {"type":"peer-update","peers":[{"id":"…","ip":"…","port":5000,"files":[…]}]}
//! ```
//!
//! Inbound frames with any other type decode to [`InboundMessage::Unknown`]
//! so that a newer service does not break older nodes.

use serde::{Deserialize, Serialize};

use crate::domain::peers::PeerRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Announces this node and the names it shares.  Sent on every connect
    /// and again whenever the shared set changes.
    #[serde(rename = "register")]
    Register {
        id: String,
        name: String,
        ip: String,
        port: u16,
        files: Vec<String>,
    },
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// The full peer table; replaces whatever the node cached before.
    #[serde(rename = "peer-update")]
    PeerUpdate { peers: Vec<PeerRecord> },

    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
