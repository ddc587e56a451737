//! Transport seam the router sends RPCs through.
use std::net::SocketAddr;

use crate::common::{Contact, Id, Request, Response};
use crate::Result;

/// The RPC transport the router drives.
///
/// The transport owns the local node's identity and every wire concern:
/// encoding, sockets, retries, and timeouts. A timed-out request surfaces as
/// `Err` from [Transport::send] like any other delivery failure.
pub trait Transport: Send + Sync {
    /// The descriptor other peers use to reach this node.
    fn local_contact(&self) -> Contact;

    /// Deliver `request` to `to` and block until its response or failure.
    fn send(&self, to: &Contact, request: Request) -> Result<Response>;

    /// Build a peer descriptor native to this transport. Transports with
    /// richer descriptors may override.
    fn create_contact(&self, id: Id, address: SocketAddr) -> Contact {
        Contact::new(id, address)
    }
}
