#![doc = include_str!("../README.md")]

// Public modules
mod common;
mod error;

pub mod kbucket;
pub mod router;
pub mod routing_table;
pub mod storage;
pub mod transport;

pub use crate::common::{
    Contact, Id, Item, Request, RequestPayload, Response, ID_BITS, ID_SIZE,
};
pub use crate::error::Error;
pub use crate::kbucket::{KBucket, MAX_BUCKET_SIZE_K};
pub use crate::router::{LookupKind, LookupResult, Router, RouterEvent, Validator, ALPHA};
pub use crate::routing_table::RoutingTable;
pub use crate::storage::{MemoryStore, Storage};
pub use crate::transport::Transport;

// Alias Result to be the crate Result.
pub type Result<T, E = error::Error> = core::result::Result<T, E>;
