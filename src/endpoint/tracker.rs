use crate::frame::BITMAP_SIZE;

const WORD_COUNT: usize = 4;

//            base
//            v
// ...___****_*__*_______...  sequence numbers, mod 256
//
// *: confirmed
//
// Bits are stored by sequence number; the exchange format is rotated so that bit 0 is the
// window base.

/// Records which cyclic sequence numbers have been confirmed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeliveryTracker {
    base: u8,
    words: [u64; WORD_COUNT],
}

impl DeliveryTracker {
    pub fn new(base: u8) -> Self {
        Self {
            base,
            words: [0; WORD_COUNT],
        }
    }

    fn locate(seq: u8) -> (usize, u64) {
        ((seq >> 6) as usize, 1 << (seq & 0x3F))
    }

    /// Marks `seq` confirmed. Returns true if it was not already marked.
    pub fn mark(&mut self, seq: u8) -> bool {
        let (word, bit) = Self::locate(seq);
        let newly_marked = self.words[word] & bit == 0;
        self.words[word] |= bit;
        newly_marked
    }

    pub fn is_marked(&self, seq: u8) -> bool {
        let (word, bit) = Self::locate(seq);
        self.words[word] & bit != 0
    }

    fn unmark(&mut self, seq: u8) {
        let (word, bit) = Self::locate(seq);
        self.words[word] &= !bit;
    }

    pub fn clear_all(&mut self) {
        self.words = [0; WORD_COUNT];
    }

    pub fn marked_count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn window_base(&self) -> u8 {
        self.base
    }

    /// Number of sequence numbers between the window base and `seq`.
    pub fn distance(&self, seq: u8) -> u8 {
        seq.wrapping_sub(self.base)
    }

    /// Moves the window base forward to `new_base`, clearing every sequence number passed over.
    pub fn advance_base(&mut self, new_base: u8) {
        while self.base != new_base {
            self.unmark(self.base);
            self.base = self.base.wrapping_add(1);
        }
    }

    /// Moves the window base past the run of marked sequence numbers starting at the base.
    /// Returns the number of positions advanced.
    pub fn advance_while_marked(&mut self) -> u32 {
        let mut count = 0;

        while count < 256 && self.is_marked(self.base) {
            self.unmark(self.base);
            self.base = self.base.wrapping_add(1);
            count += 1;
        }

        count
    }

    pub fn to_bitmap_bytes(&self) -> [u8; BITMAP_SIZE] {
        let mut bytes = [0; BITMAP_SIZE];

        for i in 0..=255u8 {
            if self.is_marked(self.base.wrapping_add(i)) {
                bytes[(i >> 3) as usize] |= 1 << (i & 0x07);
            }
        }

        bytes
    }

    pub fn from_bitmap_bytes(base: u8, bytes: &[u8; BITMAP_SIZE]) -> Self {
        let mut tracker = Self::new(base);

        for i in 0..=255u8 {
            if bytes[(i >> 3) as usize] & (1 << (i & 0x07)) != 0 {
                tracker.mark(base.wrapping_add(i));
            }
        }

        tracker
    }

    /// Iterates over marked sequence numbers in window order, starting at the base.
    pub fn iter_marked(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8)
            .map(move |i| self.base.wrapping_add(i))
            .filter(move |&seq| self.is_marked(seq))
    }
}
