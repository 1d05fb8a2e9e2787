pub mod serial;

use crate::rate::{DataRate, Interleaver};

pub const PROTOCOL_VERSION: u8 = 1;

pub const SHORT_ADDRESS_SIZE: usize = 2;
pub const LONG_ADDRESS_SIZE: usize = 18;

/// Byte used to pad addresses up to the width of their length class.
pub const ADDRESS_PAD: u8 = b'@';

pub const BITMAP_SIZE: usize = 32;

pub const DATA_PAYLOAD_SIZE_MAX: usize = 1023;

pub const DATA_FRAME_OVERHEAD_SIZE: usize = serial::DATA_HEADER_SIZE + serial::FRAME_CRC_SIZE;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameKind {
    Data,
    Control,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArqMode {
    Adaptive,
    Broadcast,
    Circuit,
    FixedBlock,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkState {
    Calling,
    CallAck,
    LinkUp,
    Dropping,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AckType {
    Null,
    DataAck,
    DataAckRequest,
    HeraldAck,
}

/// Station address, either in the short (2 byte) or long (18 byte) class.
///
/// Addresses shorter than their class are padded with `@` on the wire, and the padding is
/// stripped again when decoding. An address containing `@` cannot be encoded.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Address {
    Short(Vec<u8>),
    Long(Vec<u8>),
}

impl Address {
    /// Picks the smallest length class that fits `text`. Text longer than a long address, or
    /// containing the pad character, is kept as-is and rejected when encoding.
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes().to_vec();

        if bytes.len() <= SHORT_ADDRESS_SIZE {
            Self::Short(bytes)
        } else {
            Self::Long(bytes)
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Short(bytes) | Self::Long(bytes) => bytes,
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Self::Long(_))
    }

    /// Width of this address on the wire.
    pub fn wire_size(&self) -> usize {
        match self {
            Self::Short(_) => SHORT_ADDRESS_SIZE,
            Self::Long(_) => LONG_ADDRESS_SIZE,
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.bytes()))
    }
}

/// Parameters of the next series of data frames.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Herald {
    pub data_rate: DataRate,
    pub interleaver: Interleaver,
    pub bytes_per_block: u16,
    pub blocks_per_series: u8,
}

/// Describes the message being transferred.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MessageDescriptor {
    pub total_size: u32,
    pub message_id: u16,
    pub connection_id: u8,
    pub priority: u8,
    /// Offset of the next byte the sender of this frame will transmit.
    pub tx_next_byte: u32,
    /// Number of contiguous bytes the sender of this frame has received.
    pub rx_next_byte: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlFrame {
    pub version: u8,
    pub mode: ArqMode,
    pub source: Address,
    pub destination: Address,
    pub link_state: LinkState,
    pub ack_type: AckType,
    /// Sequence number corresponding to bit 0 of `bitmap`.
    pub ack_base: u8,
    pub bitmap: [u8; BITMAP_SIZE],
    pub herald: Option<Herald>,
    pub message: Option<MessageDescriptor>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataFrame {
    pub data_rate: DataRate,
    pub interleaver: Interleaver,
    pub sequence: u8,
    pub offset: u32,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    Data(DataFrame),
    Control(ControlFrame),
}
