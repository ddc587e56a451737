//! Distance-partitioned view of the overlay, persisted write-through.
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::common::{Contact, Id, ID_BITS};
use crate::kbucket::{read_contact, KBucket};
use crate::storage::{keys, Storage};
use crate::{Error, Result};

/// A sparse map of bucket index to [KBucket], plus the content-addressed
/// contact records, all persisted through a [Storage] adapter.
///
/// The table materializes lazily: the first accessor reads the stored
/// snapshot, and an absent or undecodable snapshot is an empty table, never
/// an error. Every structural mutation flushes through the adapter before
/// the operation returns.
pub struct RoutingTable {
    id: Id,
    store: Arc<dyn Storage>,
    buckets: BTreeMap<usize, KBucket>,
    loaded: bool,
}

impl RoutingTable {
    /// Create a new [RoutingTable] measuring distances from `id`.
    pub fn new(id: Id, store: Arc<dyn Storage>) -> Self {
        RoutingTable {
            id,
            store,
            buckets: BTreeMap::new(),
            loaded: false,
        }
    }

    // === Getters ===

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn store(&self) -> Arc<dyn Storage> {
        self.store.clone()
    }

    // === Public Methods ===

    /// Number of contacts across all buckets.
    pub fn size(&mut self) -> Result<usize> {
        self.ensure_loaded()?;

        Ok(self
            .buckets
            .values()
            .fold(0, |acc, bucket| acc + bucket.len()))
    }

    /// Populated bucket indices, ascending.
    pub fn indexes(&mut self) -> Result<Vec<usize>> {
        self.ensure_loaded()?;

        Ok(self
            .buckets
            .iter()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(index, _)| *index)
            .collect())
    }

    /// Drop every bucket and contact record and persist an empty snapshot.
    pub fn empty(&mut self) -> Result<()> {
        self.ensure_loaded()?;

        let store = self.store();
        for bucket in self.buckets.values_mut() {
            bucket.empty(store.as_ref())?;
        }
        self.buckets.clear();
        store.del(keys::BUCKETS)?;

        self.save()
    }

    /// The bucket at `index`, created (and persisted) on first access.
    pub fn get_bucket(&mut self, index: usize) -> Result<&mut KBucket> {
        if index >= ID_BITS {
            return Err(Error::InvalidBucketIndex(index));
        }
        self.ensure_loaded()?;

        if !self.buckets.contains_key(&index) {
            let bucket = KBucket::new(index);
            bucket.save(self.store.as_ref())?;
            self.buckets.insert(index, bucket);
            self.save()?;
        }

        Ok(self.buckets.get_mut(&index).expect("bucket just inserted"))
    }

    /// Whether bucket `index` exists and is non-empty.
    pub fn has_bucket(&mut self, index: usize) -> Result<bool> {
        self.ensure_loaded()?;

        Ok(self
            .buckets
            .get(&index)
            .is_some_and(|bucket| !bucket.is_empty()))
    }

    /// Read a contact record from the store.
    pub fn get_contact(&self, id: &Id) -> Result<Contact> {
        read_contact(self.store.as_ref(), id)
    }

    /// Upsert a contact record in the store.
    pub fn set_contact(&self, contact: &Contact) -> Result<()> {
        let record = serde_json::to_vec(contact)?;

        self.store.put(&keys::contact(contact.id()), record.into())
    }

    /// Whether any bucket currently contains this id.
    pub fn in_table(&mut self, id: &Id) -> Result<bool> {
        self.ensure_loaded()?;

        Ok(self.buckets.values().any(|bucket| bucket.has(id)))
    }

    /// Persist the bucket-index to id-list snapshot.
    pub fn save(&mut self) -> Result<()> {
        self.ensure_loaded()?;

        let snapshot: BTreeMap<String, Vec<Id>> = self
            .buckets
            .iter()
            .map(|(index, bucket)| (index.to_string(), bucket.order().to_vec()))
            .collect();
        let bytes = serde_json::to_vec(&snapshot)?;

        self.store.put(keys::ROUTING_TABLE, bytes.into())
    }

    /// Persist one bucket together with the table snapshot.
    pub fn save_bucket(&mut self, index: usize) -> Result<()> {
        let store = self.store();
        let bucket = self
            .buckets
            .get_mut(&index)
            .ok_or(Error::InvalidBucketIndex(index))?;
        bucket.save(store.as_ref())?;

        self.save()
    }

    // === Private Methods ===

    fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.loaded = true;

        let snapshot: BTreeMap<String, Vec<Id>> = self
            .store
            .get(keys::ROUTING_TABLE)?
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();

        for (index, order) in snapshot {
            let Ok(index) = index.parse::<usize>() else {
                continue;
            };
            if index >= ID_BITS {
                continue;
            }
            self.buckets.insert(index, KBucket::with_order(index, order));
        }

        Ok(())
    }
}

impl Debug for RoutingTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingTable")
            .field("id", &self.id)
            .field("buckets", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::MemoryStore;
    use std::str::FromStr;

    fn table() -> RoutingTable {
        RoutingTable::new(Id::random(), Arc::new(MemoryStore::new()))
    }

    fn populate(table: &mut RoutingTable, index: usize, count: usize) -> Vec<Contact> {
        let mut contacts = Vec::new();
        for i in 0..count {
            let contact = Contact::random().with_last_seen(i as u64);
            table.set_contact(&contact).unwrap();
            table.get_bucket(index).unwrap().add(&contact).unwrap();
            table.save_bucket(index).unwrap();
            contacts.push(contact);
        }
        contacts
    }

    #[test]
    fn fresh_table_is_empty() {
        let mut table = table();

        assert_eq!(table.size().unwrap(), 0);
        assert_eq!(table.indexes().unwrap(), Vec::<usize>::new());
        assert!(!table.has_bucket(0).unwrap());
    }

    #[test]
    fn bucket_index_bounds() {
        let mut table = table();

        assert!(table.get_bucket(ID_BITS - 1).is_ok());
        assert!(matches!(
            table.get_bucket(ID_BITS),
            Err(Error::InvalidBucketIndex(_))
        ));
    }

    #[test]
    fn created_empty_buckets_do_not_count_as_populated() {
        let mut table = table();

        table.get_bucket(4).unwrap();

        assert!(!table.has_bucket(4).unwrap());
        assert_eq!(table.indexes().unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn contact_records_round_trip() {
        let table = table();
        let contact = Contact::random();

        assert!(matches!(
            table.get_contact(contact.id()),
            Err(Error::ContactNotFound(_))
        ));

        table.set_contact(&contact).unwrap();
        assert_eq!(table.get_contact(contact.id()).unwrap(), contact);
    }

    #[test]
    fn snapshot_round_trip() {
        let id = Id::from_str("ba3042eb2d373b19e7c411ce6826e31b37be0b2e").unwrap();
        let store = Arc::new(MemoryStore::new());

        let mut table = RoutingTable::new(id, store.clone());
        let in_five = populate(&mut table, 5, 3);
        let in_nine = populate(&mut table, 9, 2);

        let mut reloaded = RoutingTable::new(id, store);

        assert_eq!(reloaded.indexes().unwrap(), vec![5, 9]);
        assert_eq!(reloaded.size().unwrap(), 5);
        assert_eq!(
            reloaded.get_bucket(5).unwrap().order(),
            in_five.iter().map(|c| *c.id()).collect::<Vec<_>>()
        );
        assert_eq!(
            reloaded.get_bucket(9).unwrap().order(),
            in_nine.iter().map(|c| *c.id()).collect::<Vec<_>>()
        );

        for contact in in_five.iter().chain(&in_nine) {
            assert!(reloaded.in_table(contact.id()).unwrap());
            assert_eq!(&reloaded.get_contact(contact.id()).unwrap(), contact);
        }
    }

    #[test]
    fn corrupt_snapshot_is_an_empty_table() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(keys::ROUTING_TABLE, b"not json".to_vec().into())
            .unwrap();

        let mut table = RoutingTable::new(Id::random(), store);

        assert_eq!(table.size().unwrap(), 0);
    }

    #[test]
    fn empty_destroys_contacts_and_resets_size() {
        let store = Arc::new(MemoryStore::new());
        let mut table = RoutingTable::new(Id::random(), store.clone());
        let contacts = populate(&mut table, 3, 4);

        table.empty().unwrap();

        assert_eq!(table.size().unwrap(), 0);
        for contact in &contacts {
            assert!(matches!(
                table.get_contact(contact.id()),
                Err(Error::ContactNotFound(_))
            ));
        }

        // A reload sees the persisted empty snapshot.
        let mut reloaded = RoutingTable::new(*table.id(), store);
        assert_eq!(reloaded.size().unwrap(), 0);
    }
}
