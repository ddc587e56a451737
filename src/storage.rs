//! Storage adapter the routing table persists through.
use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::Result;

/// Key namespaces the routing layer persists under. The routing table is the
/// sole producer and consumer of these records; adapters treat both keys and
/// values as opaque bytes.
pub(crate) mod keys {
    use crate::common::Id;

    /// Snapshot of the whole table: bucket index to node id list.
    pub const ROUTING_TABLE: &[u8] = b"ROUTING-TABLE";

    /// Index list of persisted buckets.
    pub const BUCKETS: &[u8] = b"BUCKETS";

    /// Per-bucket node id order.
    pub fn bucket(index: usize) -> Vec<u8> {
        format!("BUCKET-{index}").into_bytes()
    }

    /// Per-contact serialized record, keyed by hex node id.
    pub fn contact(id: &Id) -> Vec<u8> {
        id.to_string().into_bytes()
    }
}

/// A key-value adapter.
///
/// Implementations must be safe for concurrent `get`/`put`/`del`; the routing
/// layer serializes its own read-modify-write sequences on top.
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: Bytes) -> Result<()>;

    /// Delete the value stored under `key`. Deleting a missing key is not an
    /// error.
    fn del(&self, key: &[u8]) -> Result<()>;

    /// Enumerate every record in the store. Declared for adapter
    /// compatibility; the routing core itself never calls it.
    fn create_read_stream(&self) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Bytes)> + Send>>;
}

/// In-memory [Storage] adapter, for tests and for embedders whose table does
/// not need to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Vec<u8>, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Bytes) -> Result<()> {
        self.records.write().insert(key.to_vec(), value);
        Ok(())
    }

    fn del(&self, key: &[u8]) -> Result<()> {
        self.records.write().remove(key);
        Ok(())
    }

    fn create_read_stream(&self) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Bytes)> + Send>> {
        let snapshot: Vec<(Vec<u8>, Bytes)> = self
            .records
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Box::new(snapshot.into_iter()))
    }
}
