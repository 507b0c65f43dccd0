//! Functional simulation core for a single last-level (L2) cache in a
//! multi-processor MESI coherence domain.
//!
//! The [`Cache`] value holds the full set-associative array and applies one
//! trace operation at a time through [`Cache::apply`]. Bus traffic and L2→L1
//! messages are emitted through the [`traits::BusInterface`] implementation
//! supplied by the caller; the core itself performs no I/O.

pub mod traits;

mod address;
mod cache;
mod plru;
mod set;

pub use address::CacheAddress;
pub use cache::{AccessKind, Cache, CacheOp, CacheStats, EvictedLine, OpResult};
pub use plru::PlruTree;
pub use set::{CacheLine, CacheSet, MesiState};

/// Number of sets in the cache array (14-bit index).
pub const NUM_SETS: usize = 16384;

/// Associativity; ways per set (4-bit way selector).
pub const WAYS: usize = 16;

/// Line size is 64 bytes; bits \[5:0\] of an address select the byte.
pub const BYTE_OFFSET_BITS: u32 = 6;

/// Bits \[19:6\] of an address select the set.
pub const INDEX_BITS: u32 = 14;

/// Bits \[31:20\] of an address form the tag.
pub const TAG_BITS: u32 = 12;
