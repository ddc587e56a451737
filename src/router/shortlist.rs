//! Candidate set for an iterative lookup.
use std::collections::HashSet;

use crate::common::{Contact, Id};

/// Contacts under consideration by a lookup, deduplicated by id and kept
/// sorted by XOR distance to the target, closest first.
#[derive(Debug, Clone)]
pub(crate) struct Shortlist {
    target: Id,
    contacts: Vec<Contact>,
}

impl Shortlist {
    pub fn new(target: Id) -> Self {
        Self {
            target,
            contacts: Vec::new(),
        }
    }

    // === Getters ===

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn first(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    // === Public Methods ===

    /// Insert while keeping distance order; duplicate ids are dropped.
    pub fn add(&mut self, contact: Contact) {
        if self
            .contacts
            .iter()
            .any(|existing| existing.id() == contact.id())
        {
            return;
        }

        let seek = contact.id().xor(&self.target);
        let position = self
            .contacts
            .partition_point(|probe| probe.id().xor(&self.target) <= seek);

        self.contacts.insert(position, contact);
    }

    pub fn extend<I: IntoIterator<Item = Contact>>(&mut self, contacts: I) {
        for contact in contacts {
            self.add(contact);
        }
    }

    pub fn remove(&mut self, id: &Id) {
        self.contacts.retain(|contact| contact.id() != id);
    }

    /// The next contacts to query: closest first, skipping already contacted
    /// ids, at most `limit`.
    pub fn uncontacted(&self, contacted: &HashSet<Id>, limit: usize) -> Vec<Contact> {
        self.contacts
            .iter()
            .filter(|contact| !contacted.contains(contact.id()))
            .take(limit)
            .cloned()
            .collect()
    }
}
