use crate::buffer::Window;
use crate::error::SessionError;

use std::collections::VecDeque;
use std::ops::Range;

//            base            next    base+capacity
//            v               v       v
// -----------#*##*#*##########_______--------> block indices
//
// *: acknowledged
// #: outstanding
// _: admissible

/// A block that has been sent and awaits acknowledgment.
#[derive(Clone, Debug, PartialEq)]
pub struct OutstandingBlock {
    pub index: u32,
    pub sequence: u8,
    pub data_range: Range<usize>,
    /// Encoded data frame, resent verbatim.
    pub frame: Box<[u8]>,
    pub last_sent_ms: u64,
    pub retries: u32,
}

/// Bounded set of in-flight blocks.
///
/// Blocks are admitted in index order. Acknowledged blocks leave a hole until every block
/// before them has been acknowledged too, so the span `[base_index, next_index)` never
/// exceeds the capacity.
pub struct TransmitWindow {
    capacity: u32,
    retry_limit: u32,

    base_index: u32,
    next_index: u32,

    // Slots for [base_index, next_index), None once acknowledged
    slots: VecDeque<Option<OutstandingBlock>>,
}

impl TransmitWindow {
    pub fn new(capacity: u32, retry_limit: u32) -> Self {
        assert!(capacity > 0, "window capacity must be nonzero");
        assert!(capacity <= 128, "window capacity must not exceed half the sequence space");

        Self {
            capacity,
            retry_limit,

            base_index: 0,
            next_index: 0,

            slots: VecDeque::with_capacity(capacity as usize),
        }
    }

    pub fn base_index(&self) -> u32 {
        self.base_index
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Absolute indices of blocks that have been admitted but whose window slot has not yet
    /// been released.
    pub fn span(&self) -> Window {
        Window::new(self.base_index, self.next_index - self.base_index)
    }

    pub fn can_admit(&self) -> bool {
        self.next_index - self.base_index < self.capacity
    }

    /// Adds a freshly sent block. Fails if the window is full.
    pub fn try_admit(&mut self, block: OutstandingBlock) -> bool {
        if !self.can_admit() {
            return false;
        }

        debug_assert_eq!(block.index, self.next_index);

        self.slots.push_back(Some(block));
        self.next_index += 1;

        true
    }

    /// Maps a cyclic sequence number onto the absolute index of an admitted block, if any.
    pub fn index_of(&self, seq: u8) -> Option<u32> {
        let delta = seq.wrapping_sub(self.base_index as u8) as u32;
        let index = self.base_index + delta;

        if self.span().contains(index) {
            Some(index)
        } else {
            None
        }
    }

    fn slot_mut(&mut self, seq: u8) -> Option<&mut Option<OutstandingBlock>> {
        let index = self.index_of(seq)?;
        self.slots.get_mut((index - self.base_index) as usize)
    }

    /// Removes and returns the outstanding block with sequence number `seq`. Releases window
    /// slots at the base that are no longer outstanding.
    pub fn on_ack(&mut self, seq: u8) -> Option<OutstandingBlock> {
        let block = self.slot_mut(seq)?.take()?;

        while let Some(None) = self.slots.front() {
            self.slots.pop_front();
            self.base_index += 1;
        }

        if self.slots.is_empty() {
            self.base_index = self.next_index;
        }

        Some(block)
    }

    /// Sequence numbers of outstanding blocks sent at least `timeout_ms` ago, oldest first.
    pub fn due_for_retransmit(&self, now_ms: u64, timeout_ms: u64) -> Vec<u8> {
        self.iter()
            .filter(|block| now_ms.saturating_sub(block.last_sent_ms) >= timeout_ms)
            .map(|block| block.sequence)
            .collect()
    }

    /// Records a resend of block `seq`. Fails once the block has been resent more times than
    /// the retry limit allows.
    pub fn mark_resent(&mut self, seq: u8, now_ms: u64) -> Result<&OutstandingBlock, SessionError> {
        let retry_limit = self.retry_limit;

        let block = match self.slot_mut(seq) {
            Some(Some(block)) => block,
            _ => {
                return Err(SessionError::InvalidSequence { sequence: seq });
            }
        };

        if block.retries >= retry_limit {
            return Err(SessionError::RetryExhausted {
                sequence: seq,
                retries: block.retries,
            });
        }

        block.retries += 1;
        block.last_sent_ms = now_ms;

        Ok(block)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutstandingBlock> {
        self.slots.iter().flatten()
    }

    /// Number of blocks awaiting acknowledgment.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outstanding(index: u32, now_ms: u64) -> OutstandingBlock {
        OutstandingBlock {
            index,
            sequence: index as u8,
            data_range: index as usize * 10..(index as usize + 1) * 10,
            frame: vec![index as u8; 4].into(),
            last_sent_ms: now_ms,
            retries: 0,
        }
    }

    fn filled(capacity: u32) -> TransmitWindow {
        let mut window = TransmitWindow::new(capacity, 5);

        for index in 0..capacity {
            assert!(window.try_admit(outstanding(index, 0)));
        }

        window
    }

    #[test]
    fn admit_up_to_capacity() {
        let mut window = filled(4);

        assert!(!window.can_admit());
        assert!(!window.try_admit(outstanding(4, 0)));
        assert_eq!(window.len(), 4);
        assert_eq!(window.next_index(), 4);
    }

    #[test]
    fn ack_releases_base() {
        let mut window = filled(4);

        // Acknowledging out of order leaves a hole
        assert_eq!(window.on_ack(1).map(|b| b.index), Some(1));
        assert_eq!(window.base_index(), 0);
        assert!(!window.can_admit());

        assert_eq!(window.on_ack(0).map(|b| b.index), Some(0));
        assert_eq!(window.base_index(), 2);
        assert!(window.try_admit(outstanding(4, 0)));
        assert!(window.try_admit(outstanding(5, 0)));
        assert!(!window.can_admit());

        // Repeated acks are no-ops
        assert_eq!(window.on_ack(1), None);
        assert_eq!(window.on_ack(0), None);
    }

    #[test]
    fn ack_outside_span_ignored() {
        let mut window = filled(4);

        assert_eq!(window.on_ack(4), None);
        assert_eq!(window.on_ack(200), None);
        assert_eq!(window.len(), 4);
    }

    #[test]
    fn empty_after_all_acked() {
        let mut window = filled(3);

        for seq in [2, 0, 1] {
            assert!(window.on_ack(seq).is_some());
        }

        assert!(window.is_empty());
        assert_eq!(window.base_index(), 3);
        assert_eq!(window.next_index(), 3);
    }

    #[test]
    fn sequence_maps_across_wrap() {
        let mut window = TransmitWindow::new(8, 5);

        // Walk the window up to index 254
        for index in 0..254 {
            assert!(window.try_admit(outstanding(index, 0)));
            assert!(window.on_ack(index as u8).is_some());
        }

        for index in 254..258 {
            assert!(window.try_admit(outstanding(index, 0)));
        }

        assert_eq!(window.index_of(254), Some(254));
        assert_eq!(window.index_of(0), Some(256));
        assert_eq!(window.index_of(1), Some(257));
        assert_eq!(window.index_of(2), None);
        assert_eq!(window.index_of(253), None);

        assert_eq!(window.on_ack(0).map(|b| b.index), Some(256));
    }

    #[test]
    fn due_for_retransmit() {
        let mut window = TransmitWindow::new(4, 5);

        window.try_admit(outstanding(0, 100));
        window.try_admit(outstanding(1, 200));
        window.try_admit(outstanding(2, 300));

        assert_eq!(window.due_for_retransmit(250, 100), vec![0]);
        assert_eq!(window.due_for_retransmit(300, 100), vec![0, 1]);
        assert_eq!(window.due_for_retransmit(1000, 100), vec![0, 1, 2]);
        assert!(window.due_for_retransmit(50, 100).is_empty());

        window.mark_resent(0, 290).unwrap();
        assert_eq!(window.due_for_retransmit(300, 100), vec![1]);
    }

    #[test]
    fn retry_limit() {
        let mut window = TransmitWindow::new(4, 2);
        window.try_admit(outstanding(0, 0));

        assert_eq!(window.mark_resent(0, 10).unwrap().retries, 1);
        assert_eq!(window.mark_resent(0, 20).unwrap().retries, 2);
        assert_eq!(
            window.mark_resent(0, 30),
            Err(SessionError::RetryExhausted {
                sequence: 0,
                retries: 2
            })
        );

        assert!(matches!(
            window.mark_resent(1, 30),
            Err(SessionError::InvalidSequence { sequence: 1 })
        ));
    }
}
