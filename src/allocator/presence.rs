//! Presence set over the bridge number domain
//!
//! A fixed 256-bit set. Bit `i` is set while number `i` is held by any
//! identity, whether active or reserved.

use std::ops::RangeInclusive;

const WORD_BITS: usize = u64::BITS as usize;
const WORDS: usize = 256 / WORD_BITS;

/// Fixed-capacity bitmap over `0..=255`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSet {
    words: [u64; WORDS],
}

impl PresenceSet {
    /// Number of bits tracked
    pub const CAPACITY: usize = WORDS * WORD_BITS;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, bit: u8) {
        let (word, mask) = Self::locate(bit);
        self.words[word] |= mask;
    }

    pub fn clear(&mut self, bit: u8) {
        let (word, mask) = Self::locate(bit);
        self.words[word] &= !mask;
    }

    pub fn is_set(&self, bit: u8) -> bool {
        let (word, mask) = Self::locate(bit);
        self.words[word] & mask != 0
    }

    /// Lowest clear bit within `range`, if any
    ///
    /// Scans a word at a time; fully claimed words are skipped without
    /// looking at individual bits.
    pub fn first_clear(&self, range: RangeInclusive<u8>) -> Option<u8> {
        let (lo, hi) = (*range.start() as usize, *range.end() as usize);
        if lo > hi {
            return None;
        }

        for word_idx in lo / WORD_BITS..=hi / WORD_BITS {
            let base = word_idx * WORD_BITS;
            let mut free = !self.words[word_idx];

            // Mask off bits below `lo` in the first word
            if base < lo {
                free &= u64::MAX << (lo - base);
            }
            if free == 0 {
                continue;
            }

            let bit = base + free.trailing_zeros() as usize;
            return if bit <= hi { Some(bit as u8) } else { None };
        }

        None
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    fn locate(bit: u8) -> (usize, u64) {
        let bit = bit as usize;
        (bit / WORD_BITS, 1u64 << (bit % WORD_BITS))
    }
}
