//! Contact maintenance, nearest-contact search, and bucket lifecycle events.
mod lookup;
mod shortlist;

pub use lookup::{LookupKind, LookupResult};

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{Contact, Id, Request, RequestPayload, Response, ID_BITS};
use crate::routing_table::RoutingTable;
use crate::storage::Storage;
use crate::transport::Transport;
use crate::{Error, Result};

/// ALPHA: how many lookup queries are kept in flight concurrently.
pub const ALPHA: usize = 3;

/// Emitted as contacts enter, leave, or reorder within buckets, after the
/// mutation they describe has been persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    /// A new contact entered a bucket.
    Added {
        contact: Contact,
        bucket: usize,
        position: usize,
    },
    /// A contact was evicted, by head-probe failure or query failure.
    Dropped { contact: Contact },
    /// A known contact was repositioned within its bucket.
    Shifted {
        contact: Contact,
        bucket: usize,
        position: usize,
    },
}

/// Application predicate applied to every value returned by a `FIND_VALUE`.
/// Without one, every value is accepted.
pub trait Validator: Send + Sync {
    fn validate(&self, key: &[u8], value: &[u8]) -> bool;
}

impl<F> Validator for F
where
    F: Fn(&[u8], &[u8]) -> bool + Send + Sync,
{
    fn validate(&self, key: &[u8], value: &[u8]) -> bool {
        self(key, value)
    }
}

/// The iterative lookup state machine and bucket maintenance policy; the
/// only component that talks to the transport.
pub struct Router {
    id: Id,
    transport: Arc<dyn Transport>,
    table: Mutex<RoutingTable>,
    validator: Option<Box<dyn Validator>>,
    subscribers: Mutex<Vec<flume::Sender<RouterEvent>>>,
}

impl Router {
    /// Create a router over a transport and a storage adapter. The local
    /// identity is read from the transport.
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn Storage>) -> Router {
        let id = *transport.local_contact().id();

        Router {
            id,
            transport,
            table: Mutex::new(RoutingTable::new(id, store)),
            validator: None,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    // === Options ===

    /// Install a value validator.
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Router {
        self.validator = Some(Box::new(validator));
        self
    }

    // === Getters ===

    /// Returns the local node's Id.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Subscribe to bucket lifecycle events. Each subscriber receives every
    /// event from the moment it subscribes; dropped receivers are pruned.
    pub fn events(&self) -> flume::Receiver<RouterEvent> {
        let (sender, receiver) = flume::unbounded();
        self.subscribers.lock().push(sender);

        receiver
    }

    // === Public Methods ===

    /// Fold an observed contact into the routing table, enforcing the
    /// least-recently-seen eviction policy with a liveness probe.
    ///
    /// When the owning bucket is full, the stalest entry is pinged: a live
    /// head keeps its spot (refreshed, moved to the tail) and the new
    /// contact is discarded; a dead head is dropped in favor of the new
    /// contact.
    pub fn update_contact(&self, contact: &Contact) -> Result<()> {
        let mut contact = contact.clone();
        contact.seen();

        // The local node keeps no bucket entry for itself.
        let Some(index) = self.id.bucket_index(contact.id()) else {
            return Ok(());
        };

        let head = {
            let mut table = self.table.lock();
            let store = table.store();

            table.set_contact(&contact)?;

            let bucket = table.get_bucket(index)?;
            bucket.load(store.as_ref())?;
            bucket.load_contacts(store.as_ref())?;

            if bucket.has(contact.id()) {
                bucket.remove(contact.id())?;
                let position = bucket.add(&contact)?;
                table.save_bucket(index)?;

                self.emit(RouterEvent::Shifted {
                    contact,
                    bucket: index,
                    position,
                });
                return Ok(());
            }

            match bucket.add(&contact) {
                Ok(position) => {
                    table.save_bucket(index)?;

                    self.emit(RouterEvent::Added {
                        contact,
                        bucket: index,
                        position,
                    });
                    return Ok(());
                }
                Err(Error::BucketFull) => bucket.get(0, store.as_ref())?,
                Err(err) => return Err(err),
            }
        };

        // Probe the stalest entry. The table is unlocked for the round trip,
        // so the bucket must be reloaded before deciding the eviction.
        let alive = self.ping(&head).is_ok();

        let mut table = self.table.lock();
        let store = table.store();
        let bucket = table.get_bucket(index)?;
        bucket.load(store.as_ref())?;
        bucket.load_contacts(store.as_ref())?;

        if alive {
            // The responsive head wins its spot back, at the tail; the new
            // contact is discarded without an event.
            let mut refreshed = bucket.get(0, store.as_ref())?;
            refreshed.seen();
            bucket.remove(refreshed.id())?;
            bucket.add(&refreshed)?;
            table.set_contact(&refreshed)?;
            table.save_bucket(index)?;

            debug!(contact = %contact.id(), bucket = index, "bucket full and head alive, discarding contact");
            return Ok(());
        }

        let stalest = bucket.get(0, store.as_ref())?;
        bucket.remove(stalest.id())?;
        let position = bucket.add(&contact)?;
        table.save_bucket(index)?;

        debug!(dropped = %stalest.id(), added = %contact.id(), bucket = index, "evicted unresponsive head");

        self.emit(RouterEvent::Dropped { contact: stalest });
        self.emit(RouterEvent::Added {
            contact,
            bucket: index,
            position,
        });

        Ok(())
    }

    /// Remove a contact from its bucket, persist, and emit
    /// [RouterEvent::Dropped].
    pub fn remove_contact(&self, contact: &Contact) -> Result<Contact> {
        let Some(index) = self.id.bucket_index(contact.id()) else {
            return Err(Error::ContactNotFound(*contact.id()));
        };

        let mut table = self.table.lock();
        if !table.has_bucket(index)? {
            return Err(Error::ContactNotFound(*contact.id()));
        }

        let store = table.store();
        let bucket = table.get_bucket(index)?;
        bucket.load(store.as_ref())?;
        bucket.load_contacts(store.as_ref())?;
        let removed = bucket.remove(contact.id())?;
        table.save_bucket(index)?;

        self.emit(RouterEvent::Dropped {
            contact: removed.clone(),
        });

        Ok(removed)
    }

    /// Up to `limit` contacts sorted by XOR distance to `create_id(key)`
    /// within each visited bucket, excluding `exclude`. Buckets are visited
    /// natural index first, then ascending, then descending.
    pub fn get_nearest_contacts(
        &self,
        key: &[u8],
        limit: usize,
        exclude: Option<&Id>,
    ) -> Result<Vec<Contact>> {
        let hashed = Id::from_key(key);
        let natural = self.id.bucket_index(&hashed).unwrap_or(0);

        let mut table = self.table.lock();
        let store = table.store();
        let mut nearest: Vec<Contact> = Vec::with_capacity(limit);

        for index in (natural..ID_BITS).chain((0..natural).rev()) {
            if nearest.len() == limit {
                break;
            }
            if !table.has_bucket(index)? {
                continue;
            }

            let bucket = table.get_bucket(index)?;
            bucket.load_contacts(store.as_ref())?;

            let mut contacts = bucket.list();
            contacts.sort_by_key(|contact| contact.id().xor(&hashed));

            nearest.extend(
                contacts
                    .into_iter()
                    .filter(|contact| exclude.map_or(true, |id| contact.id() != id))
                    .take(limit - nearest.len()),
            );
        }

        Ok(nearest)
    }

    /// Resolve a contact by id, falling back to an iterative `FIND_NODE`
    /// when the local table has no record of it.
    pub fn get_contact_by_node_id(&self, node_id: &Id) -> Result<Contact> {
        let known = { self.table.lock().get_contact(node_id) };

        match known {
            Ok(contact) => Ok(contact),
            Err(Error::ContactNotFound(_)) => {
                match self.lookup(LookupKind::Node, node_id.as_bytes())? {
                    LookupResult::Nodes(contacts) => contacts
                        .into_iter()
                        .find(|contact| contact.id() == node_id)
                        .ok_or(Error::ContactNotFound(*node_id)),
                    LookupResult::Value(_) => Err(Error::ContactNotFound(*node_id)),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Issue a `FIND_NODE` for a random id in bucket `index`.
    pub fn refresh_bucket(&self, index: usize) -> Result<()> {
        if index >= ID_BITS {
            return Err(Error::InvalidBucketIndex(index));
        }

        let target = self.id.random_in_bucket(index);
        self.lookup(LookupKind::Node, target.as_bytes()).map(|_| ())
    }

    /// Refresh every populated bucket strictly beyond the closest populated
    /// one. Per-bucket failures are logged and do not abort the rest.
    pub fn refresh_buckets_beyond_closest(&self) -> Result<()> {
        let indexes = { self.table.lock().indexes()? };
        let Some(closest) = indexes.first().copied() else {
            return Ok(());
        };

        for index in indexes.into_iter().filter(|&index| index > closest) {
            if let Err(err) = self.refresh_bucket(index) {
                debug!(index, %err, "bucket refresh failed");
            }
        }

        Ok(())
    }

    // === Private Methods ===

    fn ping(&self, contact: &Contact) -> Result<Response> {
        self.transport.send(
            contact,
            Request {
                sender: self.transport.local_contact(),
                payload: RequestPayload::Ping,
            },
        )
    }

    fn emit(&self, event: RouterEvent) {
        self.subscribers
            .lock()
            .retain(|sink| sink.send(event.clone()).is_ok());
    }
}

impl Debug for Router {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
