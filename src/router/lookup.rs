//! Iterative FIND_NODE / FIND_VALUE walks.
use std::collections::HashSet;
use std::thread;

use bytes::Bytes;
use tracing::{debug, trace};

use super::shortlist::Shortlist;
use super::{Router, ALPHA};
use crate::common::{Contact, Id, Item, Request, RequestPayload, Response};
use crate::kbucket::MAX_BUCKET_SIZE_K;
use crate::{Error, Result};

/// Which RPC an iterative walk issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Node,
    Value,
}

/// Outcome of a [Router::lookup].
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    /// The closest contacts found, nearest first, at most K of them.
    Nodes(Vec<Contact>),
    /// The validated value stored under the key.
    Value(Bytes),
}

/// Per-call state of one iterative walk.
struct LookupState {
    kind: LookupKind,
    key: Bytes,
    target: Id,
    shortlist: Shortlist,
    contacted: HashSet<Id>,
    closest: Id,
    closest_distance: Id,
    previous_closest: Option<Id>,
    item: Option<Item>,
    /// Responders that did not hold the value, candidates for replication.
    without_value: Vec<Contact>,
}

impl LookupState {
    fn promote(&mut self, responder: &Contact) {
        let distance = responder.id().xor(&self.target);

        if distance < self.closest_distance {
            self.previous_closest = Some(self.closest);
            self.closest = *responder.id();
            self.closest_distance = distance;
        }
    }

    fn no_progress(&self) -> bool {
        self.previous_closest == Some(self.closest)
    }

    fn into_nodes(self) -> LookupResult {
        LookupResult::Nodes(
            self.shortlist
                .contacts()
                .iter()
                .take(MAX_BUCKET_SIZE_K)
                .cloned()
                .collect(),
        )
    }
}

impl Router {
    /// Converge on the K closest contacts to `create_id(key)`, or on the
    /// value stored under `key`.
    ///
    /// Fails with [Error::NotConnected] before any RPC when the table holds
    /// no starting contacts, and with [Error::LookupFailed] when every query
    /// of an iteration fails.
    pub fn lookup(&self, kind: LookupKind, key: &[u8]) -> Result<LookupResult> {
        let target = Id::from_key(key);
        trace!(%target, ?kind, "new lookup");

        let mut shortlist = Shortlist::new(target);
        shortlist.extend(self.get_nearest_contacts(key, ALPHA, Some(&self.id))?);

        let (closest, closest_distance) = match shortlist.first() {
            Some(contact) => (*contact.id(), contact.id().xor(&target)),
            None => return Err(Error::NotConnected),
        };

        let mut state = LookupState {
            kind,
            key: Bytes::copy_from_slice(key),
            target,
            shortlist,
            contacted: HashSet::new(),
            closest,
            closest_distance,
            previous_closest: None,
            item: None,
            without_value: Vec::new(),
        };

        loop {
            let batch = state.shortlist.uncontacted(&state.contacted, ALPHA);
            if batch.is_empty() {
                return Ok(state.into_nodes());
            }

            let mut any_succeeded = false;
            for (responder, outcome) in self.query_batch(&state, &batch) {
                match outcome {
                    Ok(response) => {
                        if self.handle_response(&mut state, responder.clone(), response)? {
                            any_succeeded = true;
                        } else {
                            self.evict(&mut state, &responder);
                        }
                    }
                    Err(err) => {
                        debug!(contact = %responder.id(), %err, "lookup query failed");
                        self.evict(&mut state, &responder);
                    }
                }
            }

            if !any_succeeded {
                return Err(Error::LookupFailed);
            }

            if let Some(item) = state.item.take() {
                return Ok(self.value_returned(item, &state.without_value));
            }

            if state.no_progress() || state.shortlist.len() >= MAX_BUCKET_SIZE_K {
                debug!(target = %state.target, contacts = state.shortlist.len(), "lookup converged");
                return Ok(state.into_nodes());
            }
        }
    }

    // === Private Methods ===

    /// Dispatch one request per contact on scoped threads and join them all.
    fn query_batch(
        &self,
        state: &LookupState,
        batch: &[Contact],
    ) -> Vec<(Contact, Result<Response>)> {
        let request = Request {
            sender: self.transport.local_contact(),
            payload: match state.kind {
                LookupKind::Node => RequestPayload::FindNode {
                    target: state.target,
                },
                LookupKind::Value => RequestPayload::FindValue {
                    key: state.key.clone(),
                },
            },
        };

        debug!(
            target = %state.target,
            method = request.payload.method(),
            contacts = batch.len(),
            "querying batch"
        );

        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|contact| {
                    let request = request.clone();
                    scope.spawn(move || self.transport.send(contact, request))
                })
                .collect();

            batch
                .iter()
                .zip(handles)
                .map(|(contact, handle)| {
                    let outcome = match handle.join() {
                        Ok(outcome) => outcome,
                        Err(_) => Err(Error::LookupFailed),
                    };
                    (contact.clone(), outcome)
                })
                .collect()
        })
    }

    /// Fold one response into the lookup state. Returns `false` when the
    /// response carried an item that failed validation, which the caller
    /// treats as a query failure.
    fn handle_response(
        &self,
        state: &mut LookupState,
        responder: Contact,
        response: Response,
    ) -> Result<bool> {
        let item = match response.item {
            Some(item) if state.kind == LookupKind::Value => {
                let valid = self
                    .validator
                    .as_ref()
                    .map_or(true, |validator| validator.validate(&state.key, &item.value));
                if !valid {
                    debug!(contact = %responder.id(), "responder returned an invalid item");
                    return Ok(false);
                }
                Some(item)
            }
            _ => None,
        };

        state.contacted.insert(*responder.id());
        self.update_contact(&responder)?;
        state.promote(&responder);

        match item {
            Some(item) => {
                // The first validated item wins; sibling responses in the
                // batch still contribute to the shortlist.
                if state.item.is_none() {
                    state.item = Some(item);
                }
            }
            None => {
                if state.kind == LookupKind::Value {
                    state.without_value.push(responder);
                }
                state.shortlist.extend(
                    response
                        .nodes
                        .into_iter()
                        .filter(|contact| contact.id() != &self.id),
                );
            }
        }

        Ok(true)
    }

    /// A failed query drops the contact from both the shortlist and the
    /// routing table.
    fn evict(&self, state: &mut LookupState, contact: &Contact) {
        state.shortlist.remove(contact.id());

        if let Err(err) = self.remove_contact(contact) {
            trace!(contact = %contact.id(), %err, "failed responder was not tracked");
        }
    }

    /// Replicate the found item to the closest responder that lacked it,
    /// then return the value. The `STORE` outcome is ignored.
    fn value_returned(&self, item: Item, without_value: &[Contact]) -> LookupResult {
        let value = item.value.clone();

        if let Some(closest) = without_value
            .iter()
            .min_by_key(|contact| contact.id().xor(&self.id))
        {
            let request = Request {
                sender: self.transport.local_contact(),
                payload: RequestPayload::Store { item },
            };

            if let Err(err) = self.transport.send(closest, request) {
                debug!(contact = %closest.id(), %err, "replicating the found value failed");
            }
        }

        LookupResult::Value(value)
    }
}
