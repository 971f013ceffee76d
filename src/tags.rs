//! Serialization stream constants: header flags and block-type tags.
//!
//! Tag values are never renumbered; new encodings append new values. A
//! reader failing to recognize a tag must reject the stream.

/// Header flag: full-size vector, no resize on load.
pub const HM_DEFAULT: u8 = 1;
/// Header flag: logical size follows, target is resized.
pub const HM_RESIZE: u8 = 1 << 1;
/// Header flag: legacy body framing, a plain list of 32-bit ids.
pub const HM_ID_LIST: u8 = 1 << 2;
/// Header flag: no byte-order byte present.
pub const HM_NO_BO: u8 = 1 << 3;
/// Header flag: no GAP level table present.
pub const HM_NO_GAPL: u8 = 1 << 4;
/// Header flag: 64-bit address mode stream.
pub const HM_64_BIT: u8 = 1 << 5;

/// Byte-order byte value for big-endian streams.
pub const BO_BIG_ENDIAN: u8 = 0;
/// Byte-order byte value for little-endian streams.
pub const BO_LITTLE_ENDIAN: u8 = 1;

/// End of serialization.
pub const SET_BLOCK_END: u8 = 0;
/// One all-zero block.
pub const SET_BLOCK_1ZERO: u8 = 1;
/// One all-set block.
pub const SET_BLOCK_1ONE: u8 = 2;
/// Up to 255 zero blocks (u8 count).
pub const SET_BLOCK_8ZERO: u8 = 3;
/// Up to 255 all-set blocks (u8 count).
pub const SET_BLOCK_8ONE: u8 = 4;
/// Up to 65535 zero blocks (u16 count).
pub const SET_BLOCK_16ZERO: u8 = 5;
/// Up to 65535 all-set blocks (u16 count).
pub const SET_BLOCK_16ONE: u8 = 6;
/// Up to 4G zero blocks (u32 count).
pub const SET_BLOCK_32ZERO: u8 = 7;
/// Up to 4G all-set blocks (u32 count).
pub const SET_BLOCK_32ONE: u8 = 8;
/// All remaining blocks are zero.
pub const SET_BLOCK_AZERO: u8 = 9;
/// All remaining blocks are set.
pub const SET_BLOCK_AONE: u8 = 10;
/// Plain bit-block (2048 u32 words).
pub const SET_BLOCK_BIT: u8 = 11;
/// Reserved (SGAP compressed bit-block).
pub const SET_BLOCK_SGAPBIT: u8 = 12;
/// Reserved (SGAP compressed GAP block).
pub const SET_BLOCK_SGAPGAP: u8 = 13;
/// Plain GAP block.
pub const SET_BLOCK_GAP: u8 = 14;
/// Reserved (GAP compressed bit-block).
pub const SET_BLOCK_GAPBIT: u8 = 15;
/// List of set-bit positions.
pub const SET_BLOCK_ARRBIT: u8 = 16;
/// Bit-block with only an interior word interval streamed.
pub const SET_BLOCK_BIT_INTERVAL: u8 = 17;
/// List of set-bit positions, stored as a GAP block on load.
pub const SET_BLOCK_ARRGAP: u8 = 18;
/// Bit-block with exactly one bit set (u16 position).
pub const SET_BLOCK_BIT_1BIT: u8 = 19;
/// Elias-gamma compressed GAP block.
pub const SET_BLOCK_GAP_EGAMMA: u8 = 20;
/// Elias-gamma compressed delta array (GAP on load).
pub const SET_BLOCK_ARRGAP_EGAMMA: u8 = 21;
/// Bit-block with encoded zero-word intervals.
pub const SET_BLOCK_BIT_0RUNS: u8 = 22;
/// Inverted gamma-compressed delta array.
pub const SET_BLOCK_ARRGAP_EGAMMA_INV: u8 = 23;
/// List of clear-bit positions (GAP on load).
pub const SET_BLOCK_ARRGAP_INV: u8 = 24;
/// 64-bit zero-block run (64-bit address mode only).
pub const SET_BLOCK_64ZERO: u8 = 25;
/// 64-bit all-set-block run (64-bit address mode only).
pub const SET_BLOCK_64ONE: u8 = 26;
/// Interpolative-coded GAP block.
pub const SET_BLOCK_GAP_BIENC: u8 = 27;
/// Interpolative-coded GAP array.
pub const SET_BLOCK_ARRGAP_BIENC: u8 = 28;
/// Interpolative-coded GAP array, inverted.
pub const SET_BLOCK_ARRGAP_BIENC_INV: u8 = 29;
/// List of clear-bit positions.
pub const SET_BLOCK_ARRBIT_INV: u8 = 30;
/// Interpolative-coded position array decoded straight into a bit-block.
pub const SET_BLOCK_ARR_BIENC: u8 = 31;
/// Inverted interpolative-coded position array.
pub const SET_BLOCK_ARR_BIENC_INV: u8 = 32;
/// Interpolative-coded bit-block in GAP form.
pub const SET_BLOCK_BITGAP_BIENC: u8 = 33;
/// Digest-driven bit-block: 64-bit wave mask plus non-empty waves.
pub const SET_BLOCK_BIT_DIGEST0: u8 = 34;
