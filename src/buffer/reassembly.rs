use std::ops::Range;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteResult {
    /// At least one byte was not previously held.
    New,
    /// Every byte was already held.
    Duplicate,
    /// The write extends past the end of the message.
    OutOfBounds,
}

/// Receiver-side message storage.
///
/// Writes land at their declared offsets regardless of arrival order. Received ranges are
/// kept merged so that the length of the contiguous prefix, and therefore completion, can be
/// read off directly.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    data: Vec<u8>,

    // Sorted, disjoint, non-adjacent
    ranges: Vec<Range<usize>>,
}

impl ReassemblyBuffer {
    /// Allocates storage for a message of `total_size` bytes.
    pub fn new(total_size: usize) -> Self {
        Self {
            data: vec![0; total_size],
            ranges: Vec::new(),
        }
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> WriteResult {
        let end = offset + bytes.len();

        if end > self.data.len() {
            return WriteResult::OutOfBounds;
        }

        if self.contains(offset..end) {
            return WriteResult::Duplicate;
        }

        self.data[offset..end].copy_from_slice(bytes);
        self.insert_range(offset..end);

        WriteResult::New
    }

    fn contains(&self, range: Range<usize>) -> bool {
        if range.is_empty() {
            return true;
        }

        self.ranges
            .iter()
            .any(|r| r.start <= range.start && range.end <= r.end)
    }

    fn insert_range(&mut self, range: Range<usize>) {
        let idx = self.ranges.partition_point(|r| r.start < range.start);
        self.ranges.insert(idx, range);

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(self.ranges.len());

        for r in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
                _ => merged.push(r),
            }
        }

        self.ranges = merged;
    }

    /// Number of bytes received without gaps from the start of the message.
    pub fn contiguous_len(&self) -> usize {
        match self.ranges.first() {
            Some(r) if r.start == 0 => r.end,
            _ => 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.contiguous_len() == self.data.len()
    }

    pub fn contiguous_data(&self) -> &[u8] {
        &self.data[..self.contiguous_len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order() {
        let mut buf = ReassemblyBuffer::new(6);

        assert_eq!(buf.write(0, b"abc"), WriteResult::New);
        assert_eq!(buf.contiguous_len(), 3);
        assert!(!buf.is_complete());

        assert_eq!(buf.write(3, b"def"), WriteResult::New);
        assert!(buf.is_complete());
        assert_eq!(buf.contiguous_data(), b"abcdef");
    }

    #[test]
    fn out_of_order() {
        let mut buf = ReassemblyBuffer::new(9);

        assert_eq!(buf.write(6, b"ghi"), WriteResult::New);
        assert_eq!(buf.contiguous_len(), 0);

        assert_eq!(buf.write(3, b"def"), WriteResult::New);
        assert_eq!(buf.contiguous_len(), 0);

        assert_eq!(buf.write(0, b"abc"), WriteResult::New);
        assert_eq!(buf.contiguous_len(), 9);
        assert_eq!(buf.contiguous_data(), b"abcdefghi");
    }

    #[test]
    fn duplicates() {
        let mut buf = ReassemblyBuffer::new(6);

        assert_eq!(buf.write(0, b"abc"), WriteResult::New);
        assert_eq!(buf.write(0, b"abc"), WriteResult::Duplicate);
        assert_eq!(buf.write(1, b"bc"), WriteResult::Duplicate);
        assert_eq!(buf.write(2, b"cd"), WriteResult::New);
        assert_eq!(buf.contiguous_len(), 4);
    }

    #[test]
    fn out_of_bounds() {
        let mut buf = ReassemblyBuffer::new(4);

        assert_eq!(buf.write(2, b"xyz"), WriteResult::OutOfBounds);
        assert_eq!(buf.write(4, b"z"), WriteResult::OutOfBounds);
        assert_eq!(buf.contiguous_len(), 0);
    }

    #[test]
    fn empty_message() {
        let buf = ReassemblyBuffer::new(0);

        assert!(buf.is_complete());
        assert_eq!(buf.contiguous_data(), b"");
    }
}
