//! Identifier store.
//!
//! The simulation and the routing server share a namespace of compact
//! integer ids. Before routing starts, the simulation's id store file is
//! loaded and sealed into an [`IdRegistry`]; after that the mapping is
//! read-only for the lifetime of the process.
//!
//! File format: a sequence of records, each a varint byte length followed
//! by an encoded `IdsWithType` message. The message payload is either raw
//! or an LZ4 frame; once decompressed it is a back-to-back sequence of
//! varint-length-delimited UTF-8 strings. The position of a string in its
//! type's sequence is its code.

mod error;
mod kind;
mod registry;
mod store;

pub use error::IdStoreError;
pub use kind::IdKind;
pub use registry::IdRegistry;
pub use store::{Compression, IdStore};
