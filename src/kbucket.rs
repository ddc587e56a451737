//! Kbuckets
use std::collections::HashMap;

use crate::common::{Contact, Id};
use crate::storage::{keys, Storage};
use crate::{Error, Result};

/// K = the maximum number of contacts in a k-bucket. This controls the
/// redundancy factor of the DHT client; the higher, the more nodes we store
/// (and thus lookup) values at.
pub const MAX_BUCKET_SIZE_K: usize = 20;

/// A bounded sequence of contacts at one distance prefix, ordered least
/// recently seen at the head and freshest at the tail.
///
/// The bucket keeps node ids only; full contact records live in the storage
/// adapter and are cached here by [KBucket::load_contacts] before any
/// operation that needs addresses or observation times.
#[derive(Debug, Clone)]
pub struct KBucket {
    index: usize,
    /// Node ids sorted by their contact's `last_seen`, ascending.
    order: Vec<Id>,
    contacts: HashMap<Id, Contact>,
}

impl KBucket {
    pub fn new(index: usize) -> Self {
        KBucket {
            index,
            order: Vec::with_capacity(MAX_BUCKET_SIZE_K),
            contacts: HashMap::new(),
        }
    }

    pub(crate) fn with_order(index: usize, order: Vec<Id>) -> Self {
        KBucket {
            index,
            order,
            contacts: HashMap::new(),
        }
    }

    // === Getters ===

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.order.len() >= MAX_BUCKET_SIZE_K
    }

    pub(crate) fn order(&self) -> &[Id] {
        &self.order
    }

    // === Public Methods ===

    /// Insert a contact at its last-seen position and return that position.
    ///
    /// A contact inserted after entries with the same timestamp keeps
    /// arrival order, so freshly seen contacts land at the tail.
    pub fn add(&mut self, contact: &Contact) -> Result<usize> {
        if self.has(contact.id()) {
            return Err(Error::DuplicateContact(*contact.id()));
        }
        if self.is_full() {
            return Err(Error::BucketFull);
        }

        let position = self.order.partition_point(|id| {
            self.contacts.get(id).map_or(0, Contact::last_seen) <= contact.last_seen()
        });

        self.order.insert(position, *contact.id());
        self.contacts.insert(*contact.id(), contact.clone());

        Ok(position)
    }

    /// Remove a contact by id, returning its cached record.
    pub fn remove(&mut self, id: &Id) -> Result<Contact> {
        let position = self
            .order
            .iter()
            .position(|entry| entry == id)
            .ok_or(Error::ContactNotFound(*id))?;
        let contact = self
            .contacts
            .remove(id)
            .ok_or(Error::ContactNotFound(*id))?;

        self.order.remove(position);

        Ok(contact)
    }

    pub fn has(&self, id: &Id) -> bool {
        self.order.contains(id)
    }

    /// Position of a contact within the bucket order.
    pub fn index_of(&self, id: &Id) -> Option<usize> {
        self.order.iter().position(|entry| entry == id)
    }

    /// Resolve the contact at `position` through the storage adapter.
    pub fn get(&self, position: usize, store: &dyn Storage) -> Result<Contact> {
        let id = self
            .order
            .get(position)
            .ok_or(Error::PositionOutOfRange(position))?;

        read_contact(store, id)
    }

    /// Snapshot of the cached contacts, in bucket order.
    pub fn list(&self) -> Vec<Contact> {
        self.order
            .iter()
            .filter_map(|id| self.contacts.get(id).cloned())
            .collect()
    }

    /// Persist the bucket order and register the bucket in the index list.
    pub fn save(&self, store: &dyn Storage) -> Result<()> {
        let order = serde_json::to_vec(&self.order)?;
        store.put(&keys::bucket(self.index), order.into())?;

        let mut indexes: Vec<usize> = match store.get(keys::BUCKETS)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        if !indexes.contains(&self.index) {
            indexes.push(self.index);
            indexes.sort_unstable();
            store.put(keys::BUCKETS, serde_json::to_vec(&indexes)?.into())?;
        }

        Ok(())
    }

    /// Replace the bucket order from its stored record; a missing record
    /// leaves the bucket unchanged.
    pub fn load(&mut self, store: &dyn Storage) -> Result<()> {
        if let Some(bytes) = store.get(&keys::bucket(self.index))? {
            self.order = serde_json::from_slice(&bytes)?;
        }

        Ok(())
    }

    /// Fill the contact cache from the adapter. A missing record for any
    /// listed id fails the whole batch.
    pub fn load_contacts(&mut self, store: &dyn Storage) -> Result<()> {
        let mut contacts = HashMap::with_capacity(self.order.len());
        for id in &self.order {
            contacts.insert(*id, read_contact(store, id)?);
        }
        self.contacts = contacts;

        Ok(())
    }

    /// Load, then delete every contained contact record and finally the
    /// bucket record itself.
    pub fn empty(&mut self, store: &dyn Storage) -> Result<()> {
        self.load(store)?;

        for id in &self.order {
            store.del(&keys::contact(id))?;
        }
        store.del(&keys::bucket(self.index))?;

        self.order.clear();
        self.contacts.clear();

        Ok(())
    }
}

/// Read and decode one contact record.
pub(crate) fn read_contact(store: &dyn Storage, id: &Id) -> Result<Contact> {
    let bytes = store
        .get(&keys::contact(id))?
        .ok_or(Error::ContactNotFound(*id))?;

    Ok(serde_json::from_slice(&bytes)?)
}
