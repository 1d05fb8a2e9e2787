/// How the most recent session ended, if it has.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Outcome {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Per-session counters. Observational only; nothing in the engine reads them back.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Data frames handed to the host, retransmissions included.
    pub data_frames_sent: u64,
    pub blocks_retransmitted: u64,
    pub acks_received: u64,
    pub acks_sent: u64,
    /// Blocks or heralds whose acknowledgment timer expired.
    pub timeouts: u64,
    pub checksum_failures: u64,
    /// Frames that decoded correctly but could not be used.
    pub frames_discarded: u64,
    pub heralds_sent: u64,
    pub data_frames_received: u64,
    /// Data frames whose payload had already been received.
    pub duplicate_frames: u64,
    pub outcome: Outcome,
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sent {} ({} resent, {} heralds), received {} ({} duplicate), acks {}/{} out/in, \
             {} timeouts, {} checksum failures, {} discarded, {:?}",
            self.data_frames_sent,
            self.blocks_retransmitted,
            self.heralds_sent,
            self.data_frames_received,
            self.duplicate_frames,
            self.acks_sent,
            self.acks_received,
            self.timeouts,
            self.checksum_failures,
            self.frames_discarded,
            self.outcome
        )
    }
}
