//! Main Crate Error

use crate::common::Id;

#[derive(thiserror::Error, Debug)]
/// kadroute crate error enum.
pub enum Error {
    /// Id bytes were not exactly [ID_SIZE](crate::ID_SIZE) long.
    #[error("Invalid id size: {0}")]
    InvalidIdSize(usize),

    /// An id string was not hex of the right length.
    #[error("Invalid id encoding: {0}")]
    InvalidIdEncoding(String),

    /// Bucket indices live in `[0, ID_BITS)`.
    #[error("Bucket index out of range: {0}")]
    InvalidBucketIndex(usize),

    /// The bucket already holds its maximum of K contacts.
    #[error("Bucket is full")]
    BucketFull,

    /// The contact is already present in the bucket.
    #[error("Contact {0} is already in the bucket")]
    DuplicateContact(Id),

    /// No record of this contact in the bucket or the contact store.
    #[error("Contact {0} not found")]
    ContactNotFound(Id),

    /// A bucket position at or beyond the current bucket size.
    #[error("Position out of range: {0}")]
    PositionOutOfRange(usize),

    /// A lookup was attempted with no known contacts to start from.
    #[error("Not connected to any peers")]
    NotConnected,

    /// Every query of a lookup iteration failed.
    #[error("Lookup failed: all queried contacts errored")]
    LookupFailed,

    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    /// A persisted record failed to encode or decode.
    #[error("Bad stored record: {0}")]
    Record(#[from] serde_json::Error),
}
