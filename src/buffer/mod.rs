use std::ops::Range;
use std::sync::Arc;

mod reassembly;
mod segment;

/// A range of absolute block indices, `[base_id, base_id + size)`, evaluated with wrapping
/// arithmetic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Window {
    pub base_id: u32,
    pub size: u32,
}

impl Window {
    pub fn new(base_id: u32, size: u32) -> Self {
        Self { base_id, size }
    }

    pub fn contains(&self, id: u32) -> bool {
        let delta = id.wrapping_sub(self.base_id);
        delta < self.size
    }

    pub fn end_id(&self) -> u32 {
        self.base_id.wrapping_add(self.size)
    }
}

/// One bounded slice of an outgoing message.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Absolute position of this block in the message, starting at zero.
    pub index: u32,
    /// Cyclic sequence number carried on the wire, `index mod 256`.
    pub sequence: u8,
    pub data: Arc<[u8]>,
    pub data_range: Range<usize>,
}

impl Block {
    pub fn offset(&self) -> u32 {
        self.data_range.start as u32
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[self.data_range.clone()]
    }
}

pub use reassembly::ReassemblyBuffer;
pub use reassembly::WriteResult;
pub use segment::segment;
pub use segment::Segments;
