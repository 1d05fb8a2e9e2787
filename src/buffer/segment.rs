use super::Block;

use std::sync::Arc;

/// Splits a message into consecutive blocks of at most `block_size` bytes.
///
/// Blocks are produced lazily, in order. The iterator can be rewound with
/// [`Segments::restart`], and always produces the same blocks for the same input.
#[derive(Clone, Debug)]
pub struct Segments {
    data: Arc<[u8]>,
    block_size: usize,
    next_index: u32,
}

pub fn segment(data: Arc<[u8]>, block_size: usize) -> Segments {
    assert!(block_size > 0, "block size must be nonzero");

    Segments {
        data,
        block_size,
        next_index: 0,
    }
}

impl Segments {
    /// Total number of blocks in the message. An empty message has none.
    pub fn block_count(&self) -> u32 {
        ((self.data.len() + self.block_size - 1) / self.block_size) as u32
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    /// Index of the block the next call to `next()` will return.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_index >= self.block_count()
    }

    pub fn restart(&mut self) {
        self.next_index = 0;
    }

    /// Returns the block at `index` without moving the iterator.
    pub fn block(&self, index: u32) -> Option<Block> {
        if index >= self.block_count() {
            return None;
        }

        let start = index as usize * self.block_size;
        let end = (start + self.block_size).min(self.data.len());

        Some(Block {
            index,
            sequence: (index % 256) as u8,
            data: Arc::clone(&self.data),
            data_range: start..end,
        })
    }
}

impl Iterator for Segments {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.block(self.next_index)?;
        self.next_index += 1;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.block_count().saturating_sub(self.next_index) as usize;
        (remaining, Some(remaining))
    }
}
