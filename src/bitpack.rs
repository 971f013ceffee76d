//! Unaligned bit-level streaming over the byte encoder.
//!
//! This module provides `BitWriter` and `BitReader` for writing and reading
//! variable-width codes that do not respect byte boundaries. Bits accumulate
//! in a 32-bit word, least-significant side first; each complete accumulator
//! word is flushed through the aligned encoder as one u32. A partially used
//! accumulator is zero-padded on `flush` — the reader never consumes past the
//! element count implied by the surrounding block token, so the padding is
//! invisible.
//!
//! Three code families live here:
//!
//! - raw bit runs (`put_bit` / `put_bits` / `get_bits`),
//! - Elias-gamma (`gamma`): `⌊log2 v⌋` zero bits, a marker bit, then the low
//!   `⌊log2 v⌋` bits of `v`, for `v ≥ 1`,
//! - binary interpolative coding, center-minimal variant (`bic_encode_u16` /
//!   `bic_decode_u16*`): a recursive near-optimal code for strictly
//!   increasing sequences whose bounds are known to both sides. The code
//!   length is derived from the `(lo, hi, sz)` triple and never stored.
//!
//! The interpolative coder keeps its traversal shape on both sides: the left
//! half recurses, the right half continues the loop. Encoder and decoder
//! must visit midpoints in identical order; the recursion depth is
//! `O(log sz)`.

use crate::bytes::{Decoder, Encoder, Endian};

/// Writer for un-aligned bit streaming on top of an [`Encoder`].
pub struct BitWriter<'e, 'b, E: Endian> {
    enc: &'e mut Encoder<'b, E>,
    used_bits: u32,
    accum: u32,
}

/// Reader for un-aligned bit streaming on top of a [`Decoder`].
pub struct BitReader<'d, 'b, E: Endian> {
    dec: &'d mut Decoder<'b, E>,
    used_bits: u32,
    accum: u32,
}

#[inline]
fn mask_low(n: u32) -> u32 {
    if n == 0 {
        0
    } else {
        !0u32 >> (32 - n)
    }
}

impl<'e, 'b, E: Endian> BitWriter<'e, 'b, E> {
    /// Create a bit writer; the accumulator starts empty.
    pub fn new(enc: &'e mut Encoder<'b, E>) -> Self {
        BitWriter {
            enc,
            used_bits: 0,
            accum: 0,
        }
    }

    #[inline]
    fn flush_accum(&mut self) {
        self.enc.put_u32(self.accum);
        self.used_bits = 0;
        self.accum = 0;
    }

    /// Flush the incomplete accumulator word (zero-padded).
    ///
    /// Must be called before any aligned write resumes on the underlying
    /// encoder.
    pub fn flush(&mut self) {
        if self.used_bits > 0 {
            self.flush_accum();
        }
    }

    /// Issue a single bit.
    #[inline]
    pub fn put_bit(&mut self, value: u32) {
        debug_assert!(value <= 1);
        self.accum |= value << self.used_bits;
        self.used_bits += 1;
        if self.used_bits == 32 {
            self.flush_accum();
        }
    }

    /// Issue the low `count` bits of `value`, low bit first.
    pub fn put_bits(&mut self, mut value: u32, mut count: u32) {
        debug_assert!(count >= 1 && count <= 32);
        if self.used_bits == 32 {
            self.flush_accum();
        }
        let mut used = self.used_bits;
        let mut acc = self.accum;

        if count < 32 {
            value &= mask_low(count);
        }
        loop {
            let free_bits = 32 - used;
            acc |= value << used;
            if count <= free_bits {
                used += count;
                break;
            }
            value >>= free_bits;
            count -= free_bits;
            self.enc.put_u32(acc);
            acc = 0;
            used = 0;
        }
        if used == 32 {
            self.enc.put_u32(acc);
            acc = 0;
            used = 0;
        }
        self.used_bits = used;
        self.accum = acc;
    }

    /// Elias-gamma encode `value` (`value ≥ 1`).
    pub fn gamma(&mut self, value: u32) {
        debug_assert!(value > 0);
        let logv = 31 - value.leading_zeros();

        // zero prefix plus the marker bit
        let mut used = self.used_bits;
        let mut acc = self.accum;
        {
            let mut count = logv;
            let free_bits = 32 - used;
            if count >= free_bits {
                self.enc.put_u32(acc);
                acc = 0;
                count -= free_bits;
                while count >= 32 {
                    self.enc.put_u32(0);
                    count -= 32;
                }
                used = count;
            } else {
                used += count;
            }
            acc |= 1 << used;
            used += 1;
            if used == 32 {
                self.enc.put_u32(acc);
                acc = 0;
                used = 0;
            }
        }

        // low logv bits of the value
        let mut count = logv;
        let mut v = value & mask_low(logv);
        while count > 0 {
            acc |= v << used;
            let free_bits = 32 - used;
            if count <= free_bits {
                used += count;
                break;
            }
            v >>= free_bits;
            count -= free_bits;
            self.enc.put_u32(acc);
            acc = 0;
            used = 0;
        }
        if used == 32 {
            self.enc.put_u32(acc);
            acc = 0;
            used = 0;
        }
        self.used_bits = used;
        self.accum = acc;
    }

    /// Binary interpolative encode of a strictly increasing u16 sequence
    /// with `lo ≤ arr[i] ≤ hi` (center-minimal codes).
    pub fn bic_encode_u16(&mut self, mut arr: &[u16], mut lo: u16, hi: u16) {
        while !arr.is_empty() {
            debug_assert!(lo <= hi);
            let sz = arr.len() as u32;
            let mid = arr.len() >> 1;
            let val = arr[mid];

            // write the interpolated value:
            // x = arr[mid] - lo - mid over the residual range r
            let r = (u32::from(hi) - u32::from(lo) + 1) - sz;
            if r != 0 {
                let value = u32::from(val) - u32::from(lo) - mid as u32;
                let n = r + 1;
                let mut logv = 31 - n.leading_zeros();
                let c = (1u32 << (logv + 1)) - n;
                let half_c = i64::from(c >> 1);
                let half_r = i64::from(r >> 1);
                let lo1 = half_r - half_c - i64::from(n & 1);
                let hi1 = half_r + half_c;
                if i64::from(value) <= lo1 || i64::from(value) > hi1 {
                    logv += 1;
                }
                self.put_bits(value, logv);
            }

            self.bic_encode_u16(&arr[..mid], lo, val.wrapping_sub(1));
            // tail half continues the loop
            arr = &arr[mid + 1..];
            lo = val.wrapping_add(1);
        }
    }

    /// Binary interpolative encode of a strictly increasing u32 sequence.
    pub fn bic_encode_u32(&mut self, mut arr: &[u32], mut lo: u32, hi: u32) {
        while !arr.is_empty() {
            debug_assert!(lo <= hi);
            let sz = arr.len() as u64;
            let mid = arr.len() >> 1;
            let val = arr[mid];

            let r = (u64::from(hi) - u64::from(lo) + 1) - sz;
            if r != 0 {
                let value = val - lo - mid as u32;
                let n = r + 1;
                let mut logv = 63 - n.leading_zeros();
                let c = (1u64 << (logv + 1)) - n;
                let half_c = (c >> 1) as i64;
                let half_r = (r >> 1) as i64;
                let lo1 = half_r - half_c - (n & 1) as i64;
                let hi1 = half_r + half_c + 1;
                if i64::from(value) <= lo1 || i64::from(value) >= hi1 {
                    logv += 1;
                }
                self.put_bits(value, logv);
            }

            self.bic_encode_u32(&arr[..mid], lo, val.wrapping_sub(1));
            arr = &arr[mid + 1..];
            lo = val.wrapping_add(1);
        }
    }
}

impl<'d, 'b, E: Endian> BitReader<'d, 'b, E> {
    /// Create a bit reader; the first word is fetched on demand.
    pub fn new(dec: &'d mut Decoder<'b, E>) -> Self {
        BitReader {
            dec,
            used_bits: 32,
            accum: 0,
        }
    }

    /// Read `count` bits (`1 ≤ count ≤ 32`), low bit first.
    pub fn get_bits(&mut self, count: u32) -> u32 {
        debug_assert!(count >= 1 && count <= 32);
        let mut acc = self.accum;
        let mut used = self.used_bits;
        let value;

        let free_bits = 32 - used;
        if count <= free_bits {
            value = acc & mask_low(count);
            acc = if count == 32 { 0 } else { acc >> count };
            used += count;
        } else if used == 32 {
            acc = self.dec.get_u32();
            value = acc & mask_low(count);
            acc = if count == 32 { 0 } else { acc >> count };
            used = count;
        } else {
            let part = acc;
            acc = self.dec.get_u32();
            used = count - free_bits;
            value = part | ((acc & mask_low(used)) << free_bits);
            acc >>= used;
        }
        self.accum = acc;
        self.used_bits = used;
        value
    }

    /// Decode one Elias-gamma value.
    pub fn gamma(&mut self) -> u32 {
        let mut acc = self.accum;
        let mut used = self.used_bits;
        if used == 32 {
            acc = self.dec.get_u32();
            used = 0;
        }

        // count the zero prefix
        let mut zero_bits = 0u32;
        while acc == 0 {
            zero_bits += 32 - used;
            used = 0;
            acc = self.dec.get_u32();
        }
        let tz = acc.trailing_zeros();
        acc >>= tz;
        zero_bits += tz;
        used += tz;

        // consume the marker bit
        used += 1;
        acc >>= 1;

        // low zero_bits bits of the value
        let current;
        let free_bits = 32 - used;
        if zero_bits <= free_bits {
            current = (acc & mask_low(zero_bits)) | (1 << zero_bits);
            acc >>= zero_bits;
            used += zero_bits;
        } else if used == 32 {
            acc = self.dec.get_u32();
            used = zero_bits;
            current = (acc & mask_low(zero_bits)) | (1 << zero_bits);
            acc >>= zero_bits;
        } else {
            let part = acc;
            acc = self.dec.get_u32();
            used = zero_bits - free_bits;
            current = part | ((acc & mask_low(used)) << free_bits) | (1 << zero_bits);
            acc >>= used;
        }
        self.accum = acc;
        self.used_bits = used;
        current
    }

    // One center-minimal code over residual range r (r > 0).
    #[inline]
    fn read_cm_u16(&mut self, r: u32) -> u32 {
        let logv = 31 - (r + 1).leading_zeros();
        let c = (1u64 << (logv + 1)) as u32 - r - 1;
        let half_c = i64::from(c >> 1);
        let half_r = i64::from(r >> 1);
        let lo1 = half_r - half_c - i64::from((r + 1) & 1);
        let hi1 = half_r + half_c + 1;
        let mut val = self.get_bits(logv);
        if i64::from(val) <= lo1 || i64::from(val) >= hi1 {
            val += self.get_bits(1) << logv;
        }
        debug_assert!(val <= r);
        val
    }

    /// Binary interpolative decode into a u16 array.
    ///
    /// `lo`/`hi` must match the values given to the encoder.
    pub fn bic_decode_u16(&mut self, arr: &mut [u16], lo: u16, hi: u16) {
        let sz = arr.len();
        self.bic_decode_u16_slice(arr, 0, sz, lo, hi);
    }

    fn bic_decode_u16_slice(
        &mut self,
        arr: &mut [u16],
        from: usize,
        sz: usize,
        lo: u16,
        hi: u16,
    ) {
        let (mut from, mut sz, mut lo) = (from, sz, lo);
        while sz > 0 {
            debug_assert!(lo <= hi);
            let r = (u32::from(hi) - u32::from(lo) + 1) - sz as u32;
            let mut val = if r != 0 { self.read_cm_u16(r) } else { 0 };
            let mid = sz >> 1;
            val += u32::from(lo) + mid as u32;
            arr[from + mid] = val as u16;
            if sz == 1 {
                return;
            }
            self.bic_decode_u16_slice(arr, from, mid, lo, (val as u16).wrapping_sub(1));
            // tail half continues the loop
            from += mid + 1;
            sz -= mid + 1;
            lo = (val as u16).wrapping_add(1);
        }
    }

    /// Binary interpolative decode directly into a bit block (sets bits).
    pub fn bic_decode_u16_bitset(&mut self, block: &mut [u32], sz: usize, lo: u16, hi: u16) {
        let (mut sz, mut lo) = (sz, lo);
        while sz > 0 {
            debug_assert!(lo <= hi);
            let r = (u32::from(hi) - u32::from(lo) + 1) - sz as u32;
            let mut val = if r != 0 { self.read_cm_u16(r) } else { 0 };
            let mid = sz >> 1;
            val += u32::from(lo) + mid as u32;
            block[(val >> 5) as usize] |= 1 << (val & 31);
            if sz == 1 {
                return;
            }
            self.bic_decode_u16_bitset(block, mid, lo, (val as u16).wrapping_sub(1));
            sz -= mid + 1;
            lo = (val as u16).wrapping_add(1);
        }
    }

    /// Binary interpolative dry decode: advances the stream, discards values.
    pub fn bic_decode_u16_dry(&mut self, sz: usize, lo: u16, hi: u16) {
        let (mut sz, mut lo) = (sz, lo);
        while sz > 0 {
            debug_assert!(lo <= hi);
            let r = (u32::from(hi) - u32::from(lo) + 1) - sz as u32;
            let mut val = if r != 0 { self.read_cm_u16(r) } else { 0 };
            let mid = sz >> 1;
            val += u32::from(lo) + mid as u32;
            if sz == 1 {
                return;
            }
            self.bic_decode_u16_dry(mid, lo, (val as u16).wrapping_sub(1));
            sz -= mid + 1;
            lo = (val as u16).wrapping_add(1);
        }
    }

    /// Binary interpolative decode into a u32 array.
    pub fn bic_decode_u32(&mut self, arr: &mut [u32], lo: u32, hi: u32) {
        let sz = arr.len();
        self.bic_decode_u32_slice(arr, 0, sz, lo, hi);
    }

    fn bic_decode_u32_slice(
        &mut self,
        arr: &mut [u32],
        from: usize,
        sz: usize,
        lo: u32,
        hi: u32,
    ) {
        let (mut from, mut sz, mut lo) = (from, sz, lo);
        while sz > 0 {
            debug_assert!(lo <= hi);
            let r = (u64::from(hi) - u64::from(lo) + 1) - sz as u64;
            let mut val = if r != 0 {
                let logv = 63 - (r + 1).leading_zeros();
                let c = (1u64 << (logv + 1)) - r - 1;
                let half_c = (c >> 1) as i64;
                let half_r = (r >> 1) as i64;
                let lo1 = half_r - half_c - ((r + 1) & 1) as i64;
                let hi1 = half_r + half_c + 1;
                let mut v = self.get_bits(logv);
                if i64::from(v) <= lo1 || i64::from(v) >= hi1 {
                    v += self.get_bits(1) << logv;
                }
                debug_assert!(u64::from(v) <= r);
                v
            } else {
                0
            };
            let mid = sz >> 1;
            val = val.wrapping_add(lo).wrapping_add(mid as u32);
            arr[from + mid] = val;
            if sz == 1 {
                return;
            }
            self.bic_decode_u32_slice(arr, from, mid, lo, val.wrapping_sub(1));
            from += mid + 1;
            sz -= mid + 1;
            lo = val.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::LittleEndian;

    fn write_bits<F>(f: F) -> Vec<u8>
    where
        F: FnOnce(&mut BitWriter<'_, '_, LittleEndian>),
    {
        let mut buf = vec![0u8; 4096];
        let mut enc = Encoder::<LittleEndian>::new(&mut buf);
        let mut bout = BitWriter::new(&mut enc);
        f(&mut bout);
        bout.flush();
        let len = enc.size();
        buf.truncate(len);
        buf
    }

    #[test]
    fn test_bits_roundtrip() {
        let buf = write_bits(|b| {
            b.put_bits(10, 4);
            b.put_bits(1021, 10);
            b.put_bits(3, 2);
            b.put_bit(1);
            b.put_bits(0xFFFF_FFFF, 32);
        });
        let mut dec = Decoder::<LittleEndian>::new(&buf);
        let mut bin = BitReader::new(&mut dec);
        assert_eq!(bin.get_bits(4), 10);
        assert_eq!(bin.get_bits(10), 1021);
        assert_eq!(bin.get_bits(2), 3);
        assert_eq!(bin.get_bits(1), 1);
        assert_eq!(bin.get_bits(32), 0xFFFF_FFFF);
    }

    #[test]
    fn test_bits_cross_word_boundary() {
        let buf = write_bits(|b| {
            b.put_bits(0x3FFF_FFFF, 30);
            b.put_bits(0x1F, 5); // straddles the first word
            b.put_bits(7, 3);
        });
        let mut dec = Decoder::<LittleEndian>::new(&buf);
        let mut bin = BitReader::new(&mut dec);
        assert_eq!(bin.get_bits(30), 0x3FFF_FFFF);
        assert_eq!(bin.get_bits(5), 0x1F);
        assert_eq!(bin.get_bits(3), 7);
    }

    #[test]
    fn test_gamma_roundtrip() {
        let values = [
            1u32, 2, 3, 4, 5, 7, 8, 15, 16, 63, 64, 255, 1000, 65535, 65536, 1 << 20,
        ];
        let buf = write_bits(|b| {
            for &v in &values {
                b.gamma(v);
            }
        });
        let mut dec = Decoder::<LittleEndian>::new(&buf);
        let mut bin = BitReader::new(&mut dec);
        for &v in &values {
            assert_eq!(bin.gamma(), v);
        }
    }

    #[test]
    fn test_gamma_after_bits() {
        // gamma codes interleaved with raw bit runs share the accumulator
        let buf = write_bits(|b| {
            b.put_bits(0x15, 5);
            b.gamma(777);
            b.put_bits(2, 2);
            b.gamma(1);
        });
        let mut dec = Decoder::<LittleEndian>::new(&buf);
        let mut bin = BitReader::new(&mut dec);
        assert_eq!(bin.get_bits(5), 0x15);
        assert_eq!(bin.gamma(), 777);
        assert_eq!(bin.get_bits(2), 2);
        assert_eq!(bin.gamma(), 1);
    }

    #[test]
    fn test_bic_u16_roundtrip() {
        let arr: Vec<u16> = vec![3, 10, 54, 103, 550, 1023, 20000, 65000];
        let buf = write_bits(|b| b.bic_encode_u16(&arr, 0, 65535));
        let mut dec = Decoder::<LittleEndian>::new(&buf);
        let mut bin = BitReader::new(&mut dec);
        let mut out = vec![0u16; arr.len()];
        bin.bic_decode_u16(&mut out, 0, 65535);
        assert_eq!(out, arr);
    }

    #[test]
    fn test_bic_u16_tight_range() {
        // fully determined sub-ranges (r == 0) cost no bits at all
        let arr: Vec<u16> = (100..200).collect();
        let buf = write_bits(|b| b.bic_encode_u16(&arr, 100, 199));
        assert!(buf.len() <= 4);
        let mut dec = Decoder::<LittleEndian>::new(&buf);
        let mut bin = BitReader::new(&mut dec);
        let mut out = vec![0u16; arr.len()];
        bin.bic_decode_u16(&mut out, 100, 199);
        assert_eq!(out, arr);
    }

    #[test]
    fn test_bic_u16_base_case_bounds() {
        // recursion base cases and range-edge values: sizes 1..3, values
        // pinned to lo/hi, fully determined and maximally free ranges
        let cases: Vec<(Vec<u16>, u16, u16)> = vec![
            (vec![0], 0, 0),
            (vec![0], 0, 65535),
            (vec![65535], 0, 65535),
            (vec![65535], 65535, 65535),
            (vec![0, 65535], 0, 65535),
            (vec![0, 1], 0, 1),
            (vec![0, 1, 2], 0, 2),
            (vec![5, 6, 7], 5, 7),
            (vec![5, 7], 5, 7),
            (vec![0, 32768, 65535], 0, 65535),
            (vec![1, 2, 3, 65533, 65534, 65535], 0, 65535),
            (vec![9, 10, 11, 12, 13], 9, 13),
        ];
        for (arr, lo, hi) in cases {
            let buf = write_bits(|b| b.bic_encode_u16(&arr, lo, hi));
            let mut dec = Decoder::<LittleEndian>::new(&buf);
            let mut bin = BitReader::new(&mut dec);
            let mut out = vec![0u16; arr.len()];
            bin.bic_decode_u16(&mut out, lo, hi);
            assert_eq!(out, arr, "lo={lo} hi={hi}");
        }
    }

    #[test]
    fn test_bic_u16_subset_sweep() {
        // every non-empty subset of a small universe survives all three
        // decode variants, and all three consume the same bytes
        for mask in 1u32..256 {
            let arr: Vec<u16> = (0..8u16)
                .filter(|i| mask & (1 << i) != 0)
                .map(|i| i * 3 + 1)
                .collect();
            let (lo, hi) = (0u16, 30u16);
            let buf = write_bits(|b| b.bic_encode_u16(&arr, lo, hi));

            let mut dec = Decoder::<LittleEndian>::new(&buf);
            let mut bin = BitReader::new(&mut dec);
            let mut out = vec![0u16; arr.len()];
            bin.bic_decode_u16(&mut out, lo, hi);
            assert_eq!(out, arr, "mask {mask:#b}");
            let consumed = dec.pos();

            let mut dec = Decoder::<LittleEndian>::new(&buf);
            let mut bin = BitReader::new(&mut dec);
            let mut block = vec![0u32; 2048];
            bin.bic_decode_u16_bitset(&mut block, arr.len(), lo, hi);
            assert_eq!(dec.pos(), consumed);
            for &v in &arr {
                assert!(block[(v >> 5) as usize] & (1 << (v & 31)) != 0);
            }
            assert_eq!(
                block.iter().map(|w| w.count_ones()).sum::<u32>(),
                arr.len() as u32
            );

            let mut dec = Decoder::<LittleEndian>::new(&buf);
            let mut bin = BitReader::new(&mut dec);
            bin.bic_decode_u16_dry(arr.len(), lo, hi);
            assert_eq!(dec.pos(), consumed);
        }
    }

    #[test]
    fn test_bic_u16_bitset_and_dry_agree() {
        let arr: Vec<u16> = vec![0, 7, 33, 64, 65, 900, 4095, 65535];
        let buf = write_bits(|b| b.bic_encode_u16(&arr, 0, 65535));

        let mut dec = Decoder::<LittleEndian>::new(&buf);
        let mut bin = BitReader::new(&mut dec);
        let mut block = vec![0u32; 2048];
        bin.bic_decode_u16_bitset(&mut block, arr.len(), 0, 65535);
        let consumed_bitset = dec.pos();
        for &v in &arr {
            assert!(block[(v >> 5) as usize] & (1 << (v & 31)) != 0, "bit {v}");
        }
        assert_eq!(
            block.iter().map(|w| w.count_ones()).sum::<u32>(),
            arr.len() as u32
        );

        let mut dec = Decoder::<LittleEndian>::new(&buf);
        let mut bin = BitReader::new(&mut dec);
        bin.bic_decode_u16_dry(arr.len(), 0, 65535);
        assert_eq!(dec.pos(), consumed_bitset);
    }

    #[test]
    fn test_bic_u32_roundtrip() {
        let arr: Vec<u32> = vec![5, 1_000, 70_000, 2_000_000, 400_000_000, 4_000_000_000];
        let buf = write_bits(|b| b.bic_encode_u32(&arr, 0, u32::MAX));
        let mut dec = Decoder::<LittleEndian>::new(&buf);
        let mut bin = BitReader::new(&mut dec);
        let mut out = vec![0u32; arr.len()];
        bin.bic_decode_u32(&mut out, 0, u32::MAX);
        assert_eq!(out, arr);
    }
}
