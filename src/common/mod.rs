//! Miscellaneous common structs used throughout the library.

mod contact;
mod id;
mod messages;

pub use contact::*;
pub use id::*;
pub use messages::*;
