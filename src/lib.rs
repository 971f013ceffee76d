//! # bvser
//!
//! Compressed serialization and set algebra for sparse bit-vectors.
//!
//! A [`BitVector`] is a sparse bitmap over a 32-bit index space, stored as
//! 65536-bit blocks. This crate converts such vectors into a compact byte
//! stream and back, and additionally runs set operations (AND / OR / XOR /
//! SUB and their counting variants) **directly against a serialized
//! stream**, without materializing it first.
//!
//! ## Overview
//!
//! 1. **Adaptive block encoding**: every block is classified against ~20
//!    candidate encodings (plain bits, zero-run intervals, position arrays,
//!    GAP runs, Elias-gamma and binary-interpolative compressed forms,
//!    digest-driven hierarchical form) and the cheapest wins. Speculative
//!    encodings that lose to their plain fallback are rolled back in place.
//! 2. **Additive deserialization**: decoding OR-merges into the target, so
//!    a vector can be resumed from multiple blobs.
//! 3. **Stream operations**: [`OperationDeserializer`] walks the encoded
//!    stream block-by-block and recombines it with an in-memory vector,
//!    with optional index-range restriction and early exit.
//!
//! ## Quick Start
//!
//! ```rust
//! use bvser::{BitVector, SetOp, OperationDeserializer};
//!
//! let a = BitVector::from_indices([1u64, 5, 100_000].into_iter());
//! let buf = bvser::serialize(&a);
//!
//! // plain deserialization (OR-merge into an empty vector)
//! let mut b = BitVector::new();
//! bvser::deserialize(&mut b, &buf).unwrap();
//! assert_eq!(a, b);
//!
//! // set algebra straight against the serialized form
//! let mut c = BitVector::from_indices([5u64, 7].into_iter());
//! let n = OperationDeserializer::deserialize(&mut c, &buf, None, SetOp::CountAnd, false)
//!     .unwrap();
//! assert_eq!(n, 1); // only bit 5 is shared
//! ```
//!
//! ## Stream format
//!
//! ```text
//! Header:
//!   u8  flags        bit0 DEFAULT, bit1 RESIZE, bit2 ID_LIST (legacy),
//!                    bit3 NO_BO, bit4 NO_GAPL, bit5 64_BIT
//!   u8  byte_order   (iff !NO_BO)  0 = big, 1 = little
//!   u16 gap_levels[4] (iff !NO_GAPL)
//!   u32 bv_size      (iff RESIZE)
//!
//! Blocks: tagged records until set_block_end, or until the block space is
//! exhausted. A tag byte with the high bit set encodes a short run of
//! zero blocks in its low 7 bits.
//! ```
//!
//! Integers are little-endian on the wire; streams recorded by a big-endian
//! writer carry byte-order byte 0 and are swapped on load. The tag space is
//! append-only: values are never renumbered, unknown tags fail with
//! [`SerialError::SerialFormat`].
//!
//! ## Compression levels
//!
//! | Level | Strategy |
//! |-------|----------|
//! | 0–1 | blocks stored as-is |
//! | 2 | run, single-bit, digest and 0-runs detection |
//! | 3 | adds bit-to-array models |
//! | 4 | adds Elias-gamma GAP models |
//! | 5 | (default) binary interpolative coding |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitpack;
mod bitvec;
mod block;
pub mod bytes;
mod deserializer;
mod error;
mod op_deserializer;
mod ops;
mod serializer;
mod stream;
pub mod tags;

pub use bitvec::{BitVector, Block, Statistics, BLOCK_SHIFT, ID_MAX, TOTAL_BLOCKS};
pub use block::{
    BitData, BLOCK_WORDS, DEFAULT_GAP_LEVELS, GAP_LEVELS, GAP_MAX_BITS,
};
pub use deserializer::Deserializer;
pub use error::{Result, SerialError};
pub use op_deserializer::OperationDeserializer;
pub use ops::SetOp;
pub use serializer::{Serializer, COMPRESSION_DEFAULT, COMPRESSION_MAX};
pub use stream::{IterState, SerialStreamIterator};

/// Serialize `bv` with default settings into a fresh buffer.
pub fn serialize(bv: &BitVector) -> Vec<u8> {
    Serializer::new().serialize_to_vec(bv)
}

/// Deserialize `buf` into `bv` (OR-merge), returning bytes consumed.
pub fn deserialize(bv: &mut BitVector, buf: &[u8]) -> Result<usize> {
    Deserializer::new().deserialize(bv, buf)
}
