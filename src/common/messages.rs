//! RPC request and response value types exchanged with the transport.
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::common::{Contact, Id};

/// A stored record as carried in `FIND_VALUE` responses and `STORE` requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: Bytes,
    pub value: Bytes,
    /// Id of the node that published the record.
    pub publisher: Id,
    /// Milliseconds since the Unix epoch at publication.
    pub timestamp: u64,
}

/// An outbound RPC. The sender descriptor rides along so receivers can feed
/// it through their own contact update path.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub sender: Contact,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestPayload {
    Ping,
    FindNode { target: Id },
    FindValue { key: Bytes },
    Store { item: Item },
}

impl RequestPayload {
    /// Wire method name, for diagnostics.
    pub fn method(&self) -> &'static str {
        match self {
            RequestPayload::Ping => "PING",
            RequestPayload::FindNode { .. } => "FIND_NODE",
            RequestPayload::FindValue { .. } => "FIND_VALUE",
            RequestPayload::Store { .. } => "STORE",
        }
    }
}

/// Result half of an RPC exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Closer contacts, for `FIND_NODE` and item-less `FIND_VALUE` replies.
    pub nodes: Vec<Contact>,
    /// The stored record, for a `FIND_VALUE` that hit.
    pub item: Option<Item>,
}

impl Response {
    pub fn with_nodes(nodes: Vec<Contact>) -> Response {
        Response { nodes, item: None }
    }

    pub fn with_item(item: Item) -> Response {
        Response {
            nodes: Vec::new(),
            item: Some(item),
        }
    }
}
