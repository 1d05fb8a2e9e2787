use crate::frame::Herald;

/// Nominal modem data rates.
///
/// The rate is chosen at session start and determines how many payload bytes go into each data
/// frame as well as the default acknowledgment timeout.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DataRate {
    Bps75,
    Bps150,
    Bps300,
    Bps600,
    Bps1200,
    Bps2400,
    Bps4800,
}

/// Modem interleaver length. Longer interleavers ride out longer fades at the cost of latency.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Interleaver {
    Zero,
    Short,
    Long,
}

pub const ALL_RATES: [DataRate; 7] = [
    DataRate::Bps75,
    DataRate::Bps150,
    DataRate::Bps300,
    DataRate::Bps600,
    DataRate::Bps1200,
    DataRate::Bps2400,
    DataRate::Bps4800,
];

// Time spent turning the link around (key, sync preamble, unkey) on top of the airtime of a
// full acknowledgment round trip.
const TURNAROUND_MS: u64 = 1_500;

// Approximate serialized size of an acknowledgment frame with short addresses.
const ACK_FRAME_SIZE: u64 = 43;

impl DataRate {
    pub fn bits_per_second(self) -> u32 {
        match self {
            Self::Bps75 => 75,
            Self::Bps150 => 150,
            Self::Bps300 => 300,
            Self::Bps600 => 600,
            Self::Bps1200 => 1200,
            Self::Bps2400 => 2400,
            Self::Bps4800 => 4800,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Bps75 => 0,
            Self::Bps150 => 1,
            Self::Bps300 => 2,
            Self::Bps600 => 3,
            Self::Bps1200 => 4,
            Self::Bps2400 => 5,
            Self::Bps4800 => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        ALL_RATES.iter().copied().find(|rate| rate.code() == code)
    }

    /// Payload bytes carried by one data frame at this rate.
    pub fn bytes_per_block(self) -> usize {
        match self {
            Self::Bps75 => 32,
            Self::Bps150 => 64,
            Self::Bps300 => 128,
            Self::Bps600 => 256,
            Self::Bps1200 => 512,
            Self::Bps2400 | Self::Bps4800 => crate::frame::DATA_PAYLOAD_SIZE_MAX,
        }
    }

    pub fn default_interleaver(self) -> Interleaver {
        match self {
            Self::Bps75 | Self::Bps150 | Self::Bps300 => Interleaver::Long,
            Self::Bps600 | Self::Bps1200 => Interleaver::Short,
            Self::Bps2400 | Self::Bps4800 => Interleaver::Zero,
        }
    }

    /// Airtime of `size` bytes at this rate, rounded up to whole milliseconds.
    pub fn airtime_ms(self, size: usize) -> u64 {
        let bits = size as u64 * 8 * 1000;
        let bps = self.bits_per_second() as u64;

        (bits + bps - 1) / bps
    }

    /// Default time to wait for an acknowledgment of a data frame before resending it.
    ///
    /// Covers the airtime of one full data frame, the returning acknowledgment, and the link
    /// turnaround in between, doubled to leave room for queueing behind other frames.
    pub fn default_ack_timeout_ms(self) -> u64 {
        let frame_size = self.bytes_per_block() + crate::frame::DATA_FRAME_OVERHEAD_SIZE;
        let round_trip =
            self.airtime_ms(frame_size) + self.airtime_ms(ACK_FRAME_SIZE as usize) + TURNAROUND_MS;

        round_trip * 2
    }

    /// Herald announcing a series of data frames sent at this rate.
    pub fn herald(self, blocks_per_series: u8) -> Herald {
        Herald {
            data_rate: self,
            interleaver: self.default_interleaver(),
            bytes_per_block: self.bytes_per_block() as u16,
            blocks_per_series,
        }
    }
}

impl Default for DataRate {
    fn default() -> Self {
        Self::Bps600
    }
}

impl Interleaver {
    pub fn code(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::Short => 1,
            Self::Long => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Zero),
            1 => Some(Self::Short),
            2 => Some(Self::Long),
            _ => None,
        }
    }
}

/// Packs a rate and interleaver into the shared rate/interleaver byte used by both frame kinds.
pub fn pack_rate_byte(rate: DataRate, interleaver: Interleaver) -> u8 {
    (rate.code() << 4) | interleaver.code()
}

pub fn unpack_rate_byte(byte: u8) -> Result<(DataRate, Interleaver), crate::error::FrameError> {
    let rate = DataRate::from_code(byte >> 4).ok_or(crate::error::FrameError::InvalidField {
        field: "data rate",
        value: (byte >> 4) as u32,
    })?;

    let interleaver =
        Interleaver::from_code(byte & 0x0F).ok_or(crate::error::FrameError::InvalidField {
            field: "interleaver",
            value: (byte & 0x0F) as u32,
        })?;

    Ok((rate, interleaver))
}
