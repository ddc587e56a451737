//! Kademlia node Id or a lookup target
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The size of node Ids in bytes.
pub const ID_SIZE: usize = 20;

/// B: the width of the id space in bits, and the number of possible buckets.
pub const ID_BITS: usize = ID_SIZE * 8;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// Kademlia node Id or a lookup target
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE](crate::ID_SIZE).
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp[..ID_SIZE].clone_from_slice(&bytes[..ID_SIZE]);

        Ok(Id(tmp))
    }

    /// Map an arbitrary key onto the id space.
    ///
    /// A key that is already exactly [ID_SIZE] bytes is taken verbatim,
    /// anything else is SHA-1 hashed.
    pub fn from_key<T: AsRef<[u8]>>(key: T) -> Id {
        let key = key.as_ref();

        if let Ok(id) = Id::from_bytes(key) {
            return id;
        }

        let mut hasher = sha1_smol::Sha1::new();
        hasher.update(key);

        Id(hasher.digest().bytes())
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// XOR distance between this Id and a target Id; itself a valid Id.
    ///
    /// The derived ordering on [Id] (unsigned big-endian compare) is the
    /// total order distances are ranked by.
    pub fn xor(&self, other: &Id) -> Id {
        let mut distance = [0u8; ID_SIZE];
        for (i, byte) in distance.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Id(distance)
    }

    /// The bucket an `other` id falls into relative to this id: the position
    /// of the most significant differing bit, in `[0, ID_BITS)`.
    ///
    /// `None` when the ids are equal; the local node belongs to no bucket of
    /// its own table.
    pub fn bucket_index(&self, other: &Id) -> Option<usize> {
        for i in 0..ID_SIZE {
            let xor = self.0[i] ^ other.0[i];

            if xor != 0 {
                return Some(i * 8 + xor.leading_zeros() as usize);
            }
        }

        None
    }

    /// A random id whose distance to this id has its most significant set bit
    /// at `index`, i.e. an id that falls in bucket `index`. Used as the
    /// target of bucket refresh lookups.
    ///
    /// `index` must be in `[0, ID_BITS)`.
    pub fn random_in_bucket(&self, index: usize) -> Id {
        debug_assert!(index < ID_BITS, "bucket index out of range: {index}");

        let mut distance = [0u8; ID_SIZE];
        rand::thread_rng().fill(&mut distance[..]);

        let byte = index / 8;
        let bit = index % 8;

        for prefix in distance.iter_mut().take(byte) {
            *prefix = 0;
        }
        distance[byte] &= 0xff >> bit;
        distance[byte] |= 0x80 >> bit;

        self.xor(&Id(distance))
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id> {
        if !s.is_ascii() || s.len() != ID_SIZE * 2 {
            return Err(Error::InvalidIdEncoding(s.into()));
        }

        let mut bytes = [0u8; ID_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidIdEncoding(s.into()))?;
        }

        Ok(Id(bytes))
    }
}
