//! Peer descriptor tracked by the routing table.
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::common::Id;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A peer descriptor: identity, advisory address, and last observation time.
pub struct Contact {
    id: Id,
    address: SocketAddr,
    last_seen: u64,
}

impl Contact {
    /// Creates a new Contact from an id and socket address, observed now.
    pub fn new(id: Id, address: SocketAddr) -> Contact {
        Contact {
            id,
            address,
            last_seen: now_millis(),
        }
    }

    /// Creates a contact with a random Id for testing purposes.
    pub fn random() -> Contact {
        Contact::new(Id::random(), SocketAddr::from(([0, 0, 0, 0], 0)))
    }

    // === Options ===

    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    pub fn with_last_seen(mut self, last_seen: u64) -> Self {
        self.last_seen = last_seen;
        self
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    /// The address this peer was last reachable at. Advisory; it may change
    /// across observations of the same id.
    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    /// Milliseconds since the Unix epoch at the last observation.
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    // === Public Methods ===

    /// Record an observation. `last_seen` never decreases.
    pub fn seen(&mut self) {
        self.last_seen = self.last_seen.max(now_millis());
    }
}

/// Contacts are equal iff their ids are equal; the address is advisory.
impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn equality_is_by_id() {
        let a = Contact::random();
        let b = a
            .clone()
            .with_address(SocketAddr::from(([10, 0, 0, 1], 9000)))
            .with_last_seen(0);

        assert_eq!(a, b);
        assert_ne!(a, Contact::random());
    }

    #[test]
    fn seen_never_decreases() {
        let future = now_millis() + 60_000;
        let mut contact = Contact::random().with_last_seen(future);

        contact.seen();

        assert_eq!(contact.last_seen(), future);
    }

    #[test]
    fn record_round_trip() {
        let contact = Contact::random();

        let record = serde_json::to_vec(&contact).unwrap();
        let parsed: Contact = serde_json::from_slice(&record).unwrap();

        assert_eq!(parsed.id(), contact.id());
        assert_eq!(parsed.address(), contact.address());
        assert_eq!(parsed.last_seen(), contact.last_seen());
    }
}
