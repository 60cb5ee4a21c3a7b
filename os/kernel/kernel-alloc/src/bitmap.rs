//! Fixed-size bit array used by both the frame allocator and the swap slot
//! allocator.
//!
//! A set bit means "occupied". The bitmap itself is not synchronized; owners
//! wrap it in a [`SpinLock`](kernel_sync::SpinLock) and never touch a bit
//! outside that lock's critical section.

use alloc::collections::TryReserveError;
use alloc::vec::Vec;
use core::ops::Range;

const BITS: usize = u64::BITS as usize;

#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    /// Number of valid bits. Bits past `len` in the last word are always zero.
    len: usize,
}

impl Bitmap {
    /// Creates a bitmap of `len` clear bits.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            words: alloc::vec![0; len.div_ceil(BITS)],
            len,
        }
    }

    /// Creates a bitmap of `len` set bits.
    #[must_use]
    pub fn new_set(len: usize) -> Self {
        let mut bitmap = Self {
            words: alloc::vec![u64::MAX; len.div_ceil(BITS)],
            len,
        };
        bitmap.mask_tail();
        bitmap
    }

    /// Fallible variant of [`new`](Self::new)/[`new_set`](Self::new_set) for
    /// callers that must report allocation failure instead of aborting.
    ///
    /// # Errors
    /// Returns the allocator's error if the backing words cannot be reserved.
    pub fn try_filled(len: usize, set: bool) -> Result<Self, TryReserveError> {
        let count = len.div_ceil(BITS);
        let mut words = Vec::new();
        words.try_reserve_exact(count)?;
        words.resize(count, if set { u64::MAX } else { 0 });
        let mut bitmap = Self { words, len };
        bitmap.mask_tail();
        Ok(bitmap)
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn is_set(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "bit {index} out of range ({})", self.len);
        self.words[index / BITS] & (1 << (index % BITS)) != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len, "bit {index} out of range ({})", self.len);
        self.words[index / BITS] |= 1 << (index % BITS);
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len, "bit {index} out of range ({})", self.len);
        self.words[index / BITS] &= !(1 << (index % BITS));
    }

    /// Sets every bit in `range`. The range is clipped to the bitmap.
    pub fn set_range(&mut self, range: Range<usize>) {
        for i in self.clip(range) {
            self.set(i);
        }
    }

    /// Clears every bit in `range`. The range is clipped to the bitmap.
    pub fn clear_range(&mut self, range: Range<usize>) {
        for i in self.clip(range) {
            self.clear(i);
        }
    }

    /// Whether every bit in `range` is set. Out-of-range bits count as clear.
    #[must_use]
    pub fn all_set(&self, range: Range<usize>) -> bool {
        range.end <= self.len && range.into_iter().all(|i| self.is_set(i))
    }

    /// Whether every bit in `range` is clear. Out-of-range bits count as set.
    #[must_use]
    pub fn all_clear(&self, range: Range<usize>) -> bool {
        range.end <= self.len && range.into_iter().all(|i| !self.is_set(i))
    }

    #[must_use]
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn count_clear(&self) -> usize {
        self.len - self.count_set()
    }

    /// Index of the first clear bit at or after `from`.
    #[must_use]
    pub fn first_clear(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }

        let first_word = from / BITS;
        for (w, &word) in self.words.iter().enumerate().skip(first_word) {
            // Pretend the bits below `from` are set so they are skipped.
            let masked = if w == first_word {
                word | ((1u64 << (from % BITS)) - 1)
            } else {
                word
            };
            if masked != u64::MAX {
                let index = w * BITS + (!masked).trailing_zeros() as usize;
                return (index < self.len).then_some(index);
            }
        }
        None
    }

    /// Start of the first run of `count` clear bits that begins at or after
    /// `from` (first fit).
    #[must_use]
    pub fn first_clear_run(&self, from: usize, count: usize) -> Option<usize> {
        if count == 0 {
            return (from <= self.len).then_some(from);
        }

        let mut start = from;
        loop {
            start = self.first_clear(start)?;
            if start.checked_add(count)? > self.len {
                return None;
            }

            // Count the free bits starting from `start`, up to the number requested.
            let mut run = 1;
            while run < count && !self.is_set(start + run) {
                run += 1;
            }

            if run == count {
                return Some(start);
            }

            // Previous run too small, keep searching one past the occupied bit.
            start += run + 1;
        }
    }

    /// Iterates the indices of all set bits in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&i| self.is_set(i))
    }

    fn clip(&self, range: Range<usize>) -> Range<usize> {
        range.start.min(self.len)..range.end.min(self.len)
    }

    fn mask_tail(&mut self) {
        let tail = self.len % BITS;
        if tail != 0
            && let Some(last) = self.words.last_mut()
        {
            *last &= (1u64 << tail) - 1;
        }
    }
}

impl core::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bitmap")
            .field("len", &self.len)
            .field("set", &self.count_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_set_masks_the_tail() {
        let b = Bitmap::new_set(70);
        assert_eq!(b.count_set(), 70);
        assert_eq!(b.count_clear(), 0);
        assert_eq!(b.first_clear(0), None);
    }

    #[test]
    fn first_clear_skips_full_words() {
        let mut b = Bitmap::new(200);
        b.set_range(0..130);
        assert_eq!(b.first_clear(0), Some(130));
        assert_eq!(b.first_clear(131), Some(131));
        assert_eq!(b.first_clear(200), None);
    }

    #[test]
    fn first_clear_respects_len() {
        let mut b = Bitmap::new(65);
        b.set_range(0..65);
        assert_eq!(b.first_clear(0), None);
        b.clear(64);
        assert_eq!(b.first_clear(0), Some(64));
    }

    #[test]
    fn first_clear_run_is_first_fit() {
        let mut b = Bitmap::new(16);
        b.set_range(2..4);
        b.set_range(8..13);
        b.set(15);

        // Free bits: 0-1, 4-7, 13-14
        assert_eq!(b.first_clear_run(0, 4), Some(4));
        assert_eq!(b.first_clear_run(0, 2), Some(0));
        assert_eq!(b.first_clear_run(1, 2), Some(4));
        assert_eq!(b.first_clear_run(9, 2), Some(13));
        assert_eq!(b.first_clear_run(0, 5), None);
        assert_eq!(b.first_clear_run(14, 2), None);
    }

    #[test]
    fn run_across_word_boundary() {
        let mut b = Bitmap::new(128);
        b.set_range(0..60);
        assert_eq!(b.first_clear_run(0, 10), Some(60));
    }

    #[test]
    fn range_predicates() {
        let mut b = Bitmap::new(8);
        b.set_range(2..5);
        assert!(b.all_set(2..5));
        assert!(!b.all_set(1..5));
        assert!(b.all_clear(5..8));
        assert!(!b.all_clear(5..9));
        assert_eq!(b.iter_set().collect::<Vec<_>>(), vec![2, 3, 4]);
        b.clear_range(0..100);
        assert_eq!(b.count_set(), 0);
    }

    #[test]
    fn try_filled_matches_constructors() {
        assert_eq!(Bitmap::try_filled(77, true).unwrap(), Bitmap::new_set(77));
        assert_eq!(Bitmap::try_filled(77, false).unwrap(), Bitmap::new(77));
    }
}
