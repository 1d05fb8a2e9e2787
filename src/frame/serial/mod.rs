mod crc;

use super::*;
use crate::error::FrameError;
use crate::rate;

pub const FRAME_HEADER_SIZE: usize = 1;
pub const FRAME_CRC_SIZE: usize = crc::SIZE;
pub const FRAME_OVERHEAD_SIZE: usize = FRAME_HEADER_SIZE + FRAME_CRC_SIZE;

pub const DATA_HEADER_SIZE: usize = FRAME_HEADER_SIZE + 8;
pub const CONTROL_HEADER_SIZE: usize = FRAME_HEADER_SIZE + 6;
pub const HERALD_SIZE: usize = 4;
pub const MESSAGE_DESCRIPTOR_SIZE: usize = 16;

const FRAME_TYPE_DATA: u8 = 0x01;
const FRAME_TYPE_CONTROL: u8 = 0x02;

const CONTROL_SOURCE_LONG_BIT: u8 = 0x01;
const CONTROL_DESTINATION_LONG_BIT: u8 = 0x02;
const CONTROL_HERALD_BIT: u8 = 0x04;
const CONTROL_MESSAGE_BIT: u8 = 0x08;
const CONTROL_FLAGS_MASK: u8 = 0x0F;

/// Bounds-checked big-endian reader over the body of a frame (everything between the type byte
/// and the checksum).
pub struct Reader<'a> {
    buffer: &'a [u8],
    read_idx: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            read_idx: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.read_idx
    }

    fn take(&mut self, size: usize) -> Result<&'a [u8], FrameError> {
        let end_idx = self.read_idx + size;

        if end_idx > self.buffer.len() {
            // Sizes are reported for the whole frame, as seen by the caller
            return Err(FrameError::TruncatedFrame {
                needed: FRAME_OVERHEAD_SIZE + end_idx,
                available: FRAME_OVERHEAD_SIZE + self.buffer.len(),
            });
        }

        let bytes = &self.buffer[self.read_idx..end_idx];
        self.read_idx = end_idx;

        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, FrameError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, FrameError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_slice(&mut self, size: usize) -> Result<&'a [u8], FrameError> {
        self.take(size)
    }

    /// Fails if anything follows the fields read so far.
    pub fn finish(&self) -> Result<(), FrameError> {
        if self.remaining() != 0 {
            return Err(FrameError::TruncatedFrame {
                needed: FRAME_OVERHEAD_SIZE + self.read_idx,
                available: FRAME_OVERHEAD_SIZE + self.buffer.len(),
            });
        }

        Ok(())
    }
}

/// Big-endian frame writer. The type byte is written on construction and the checksum is
/// appended by [`Writer::finalize`].
pub struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    pub fn new(kind: FrameKind, capacity: usize) -> Self {
        let mut buffer = Vec::with_capacity(capacity + FRAME_OVERHEAD_SIZE);

        buffer.push(match kind {
            FrameKind::Data => FRAME_TYPE_DATA,
            FrameKind::Control => FRAME_TYPE_CONTROL,
        });

        Self { buffer }
    }

    pub fn bytes_written(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn finalize(mut self) -> Vec<u8> {
        let frame_crc = crc::compute(&self.buffer);
        self.buffer.extend_from_slice(&frame_crc.to_le_bytes());
        self.buffer
    }
}

/// Fixed-size sections of a frame.
pub trait BlockSerial {
    const SIZE: usize;

    fn read(rd: &mut Reader) -> Result<Self, FrameError>
    where
        Self: Sized;

    fn write(wr: &mut Writer, obj: &Self);
}

impl BlockSerial for Herald {
    const SIZE: usize = HERALD_SIZE;

    fn read(rd: &mut Reader) -> Result<Self, FrameError> {
        let (data_rate, interleaver) = rate::unpack_rate_byte(rd.read_u8()?)?;
        let bytes_per_block = rd.read_u16()?;
        let blocks_per_series = rd.read_u8()?;

        Ok(Self {
            data_rate,
            interleaver,
            bytes_per_block,
            blocks_per_series,
        })
    }

    fn write(wr: &mut Writer, obj: &Self) {
        wr.write_u8(rate::pack_rate_byte(obj.data_rate, obj.interleaver));
        wr.write_u16(obj.bytes_per_block);
        wr.write_u8(obj.blocks_per_series);
    }
}

impl BlockSerial for MessageDescriptor {
    const SIZE: usize = MESSAGE_DESCRIPTOR_SIZE;

    fn read(rd: &mut Reader) -> Result<Self, FrameError> {
        let total_size = rd.read_u32()?;
        let message_id = rd.read_u16()?;
        let connection_id = rd.read_u8()?;
        let priority = rd.read_u8()?;
        let tx_next_byte = rd.read_u32()?;
        let rx_next_byte = rd.read_u32()?;

        Ok(Self {
            total_size,
            message_id,
            connection_id,
            priority,
            tx_next_byte,
            rx_next_byte,
        })
    }

    fn write(wr: &mut Writer, obj: &Self) {
        wr.write_u32(obj.total_size);
        wr.write_u16(obj.message_id);
        wr.write_u8(obj.connection_id);
        wr.write_u8(obj.priority);
        wr.write_u32(obj.tx_next_byte);
        wr.write_u32(obj.rx_next_byte);
    }
}

fn mode_code(mode: ArqMode) -> u8 {
    match mode {
        ArqMode::Adaptive => 0,
        ArqMode::Broadcast => 1,
        ArqMode::Circuit => 2,
        ArqMode::FixedBlock => 3,
    }
}

fn mode_from_code(code: u8) -> Result<ArqMode, FrameError> {
    match code {
        0 => Ok(ArqMode::Adaptive),
        1 => Ok(ArqMode::Broadcast),
        2 => Ok(ArqMode::Circuit),
        3 => Ok(ArqMode::FixedBlock),
        _ => Err(FrameError::InvalidField {
            field: "mode",
            value: code as u32,
        }),
    }
}

fn link_state_code(state: LinkState) -> u8 {
    match state {
        LinkState::Calling => 0,
        LinkState::CallAck => 1,
        LinkState::LinkUp => 2,
        LinkState::Dropping => 3,
    }
}

fn link_state_from_code(code: u8) -> Result<LinkState, FrameError> {
    match code {
        0 => Ok(LinkState::Calling),
        1 => Ok(LinkState::CallAck),
        2 => Ok(LinkState::LinkUp),
        3 => Ok(LinkState::Dropping),
        _ => Err(FrameError::InvalidField {
            field: "link state",
            value: code as u32,
        }),
    }
}

fn ack_type_code(ack_type: AckType) -> u8 {
    match ack_type {
        AckType::Null => 0,
        AckType::DataAck => 1,
        AckType::DataAckRequest => 2,
        AckType::HeraldAck => 3,
    }
}

fn ack_type_from_code(code: u8) -> Result<AckType, FrameError> {
    match code {
        0 => Ok(AckType::Null),
        1 => Ok(AckType::DataAck),
        2 => Ok(AckType::DataAckRequest),
        3 => Ok(AckType::HeraldAck),
        _ => Err(FrameError::InvalidField {
            field: "ack type",
            value: code as u32,
        }),
    }
}

fn write_address(wr: &mut Writer, address: &Address) -> Result<(), FrameError> {
    let bytes = address.bytes();
    let wire_size = address.wire_size();

    if bytes.len() > wire_size {
        return Err(FrameError::EncodingError(format!(
            "address {:?} exceeds {} bytes",
            String::from_utf8_lossy(bytes),
            wire_size
        )));
    }

    // Padding is stripped on decode, so it may not appear in the address itself
    if bytes.contains(&ADDRESS_PAD) {
        return Err(FrameError::EncodingError(format!(
            "address {:?} contains the pad character",
            String::from_utf8_lossy(bytes)
        )));
    }

    wr.write_slice(bytes);

    for _ in bytes.len()..wire_size {
        wr.write_u8(ADDRESS_PAD);
    }

    Ok(())
}

fn read_address(rd: &mut Reader, long: bool) -> Result<Address, FrameError> {
    let wire_size = if long {
        LONG_ADDRESS_SIZE
    } else {
        SHORT_ADDRESS_SIZE
    };

    let bytes = rd.read_slice(wire_size)?;

    let len = bytes
        .iter()
        .rposition(|&b| b != ADDRESS_PAD)
        .map_or(0, |idx| idx + 1);

    let bytes = bytes[..len].to_vec();

    Ok(if long {
        Address::Long(bytes)
    } else {
        Address::Short(bytes)
    })
}

/// Returns the kind of frame indicated by the leading type byte, without validating anything
/// else.
pub fn frame_kind(frame_bytes: &[u8]) -> Option<FrameKind> {
    match frame_bytes.first() {
        Some(&FRAME_TYPE_DATA) => Some(FrameKind::Data),
        Some(&FRAME_TYPE_CONTROL) => Some(FrameKind::Control),
        _ => None,
    }
}

pub fn verify_minimum_size(frame_bytes: &[u8]) -> Result<(), FrameError> {
    if frame_bytes.len() < FRAME_OVERHEAD_SIZE {
        return Err(FrameError::TruncatedFrame {
            needed: FRAME_OVERHEAD_SIZE,
            available: frame_bytes.len(),
        });
    }

    Ok(())
}

pub fn verify_crc(frame_bytes: &[u8]) -> Result<(), FrameError> {
    verify_minimum_size(frame_bytes)?;

    let crc_idx = frame_bytes.len() - FRAME_CRC_SIZE;

    let mut crc_bytes = [0; FRAME_CRC_SIZE];
    crc_bytes.copy_from_slice(&frame_bytes[crc_idx..]);

    let received = u32::from_le_bytes(crc_bytes);
    let computed = crc::compute(&frame_bytes[..crc_idx]);

    if received != computed {
        return Err(FrameError::ChecksumMismatch { received, computed });
    }

    Ok(())
}

/// Body of a frame whose size and checksum have been verified.
fn frame_body(frame_bytes: &[u8]) -> &[u8] {
    &frame_bytes[FRAME_HEADER_SIZE..frame_bytes.len() - FRAME_CRC_SIZE]
}

/// Validates size, checksum and kind, and returns the frame body.
fn open_frame(frame_bytes: &[u8], expected: FrameKind) -> Result<&[u8], FrameError> {
    verify_crc(frame_bytes)?;

    let actual = frame_kind(frame_bytes);

    if actual != Some(expected) {
        return Err(FrameError::UnexpectedFrameKind { expected, actual });
    }

    Ok(frame_body(frame_bytes))
}

pub fn encode_data(frame: &DataFrame) -> Result<Vec<u8>, FrameError> {
    if frame.payload.len() > DATA_PAYLOAD_SIZE_MAX {
        return Err(FrameError::EncodingError(format!(
            "payload of {} bytes exceeds {} bytes",
            frame.payload.len(),
            DATA_PAYLOAD_SIZE_MAX
        )));
    }

    let mut wr = Writer::new(FrameKind::Data, DATA_HEADER_SIZE + frame.payload.len());

    wr.write_u8(rate::pack_rate_byte(frame.data_rate, frame.interleaver));
    wr.write_u8(frame.sequence);
    wr.write_u32(frame.offset);
    wr.write_u16(frame.payload.len() as u16);

    debug_assert_eq!(wr.bytes_written(), DATA_HEADER_SIZE);

    wr.write_slice(&frame.payload);

    Ok(wr.finalize())
}

pub fn decode_data(frame_bytes: &[u8]) -> Result<DataFrame, FrameError> {
    parse_data(open_frame(frame_bytes, FrameKind::Data)?)
}

fn parse_data(body: &[u8]) -> Result<DataFrame, FrameError> {
    let mut rd = Reader::new(body);

    let (data_rate, interleaver) = rate::unpack_rate_byte(rd.read_u8()?)?;
    let sequence = rd.read_u8()?;
    let offset = rd.read_u32()?;
    let payload_len = rd.read_u16()? as usize;

    if payload_len > DATA_PAYLOAD_SIZE_MAX {
        return Err(FrameError::InvalidField {
            field: "payload length",
            value: payload_len as u32,
        });
    }

    let payload = rd.read_slice(payload_len)?.to_vec();

    rd.finish()?;

    Ok(DataFrame {
        data_rate,
        interleaver,
        sequence,
        offset,
        payload,
    })
}

pub fn encode_control(frame: &ControlFrame) -> Result<Vec<u8>, FrameError> {
    let mut flags = 0;
    if frame.source.is_long() {
        flags |= CONTROL_SOURCE_LONG_BIT;
    }
    if frame.destination.is_long() {
        flags |= CONTROL_DESTINATION_LONG_BIT;
    }
    if frame.herald.is_some() {
        flags |= CONTROL_HERALD_BIT;
    }
    if frame.message.is_some() {
        flags |= CONTROL_MESSAGE_BIT;
    }

    let capacity = CONTROL_HEADER_SIZE
        + frame.source.wire_size()
        + frame.destination.wire_size()
        + BITMAP_SIZE
        + HERALD_SIZE
        + MESSAGE_DESCRIPTOR_SIZE;

    let mut wr = Writer::new(FrameKind::Control, capacity);

    wr.write_u8(frame.version);
    wr.write_u8(mode_code(frame.mode));
    wr.write_u8(flags);
    wr.write_u8(link_state_code(frame.link_state));
    wr.write_u8(ack_type_code(frame.ack_type));
    wr.write_u8(frame.ack_base);

    debug_assert_eq!(wr.bytes_written(), CONTROL_HEADER_SIZE);

    write_address(&mut wr, &frame.source)?;
    write_address(&mut wr, &frame.destination)?;

    wr.write_slice(&frame.bitmap);

    if let Some(ref herald) = frame.herald {
        Herald::write(&mut wr, herald);
    }

    if let Some(ref message) = frame.message {
        MessageDescriptor::write(&mut wr, message);
    }

    Ok(wr.finalize())
}

pub fn decode_control(frame_bytes: &[u8]) -> Result<ControlFrame, FrameError> {
    parse_control(open_frame(frame_bytes, FrameKind::Control)?)
}

fn parse_control(body: &[u8]) -> Result<ControlFrame, FrameError> {
    let mut rd = Reader::new(body);

    let version = rd.read_u8()?;
    let mode = mode_from_code(rd.read_u8()?)?;

    let flags = rd.read_u8()?;
    if flags & !CONTROL_FLAGS_MASK != 0 {
        return Err(FrameError::InvalidField {
            field: "flags",
            value: flags as u32,
        });
    }

    let link_state = link_state_from_code(rd.read_u8()?)?;
    let ack_type = ack_type_from_code(rd.read_u8()?)?;
    let ack_base = rd.read_u8()?;

    let source = read_address(&mut rd, flags & CONTROL_SOURCE_LONG_BIT != 0)?;
    let destination = read_address(&mut rd, flags & CONTROL_DESTINATION_LONG_BIT != 0)?;

    let mut bitmap = [0; BITMAP_SIZE];
    bitmap.copy_from_slice(rd.read_slice(BITMAP_SIZE)?);

    let herald = if flags & CONTROL_HERALD_BIT != 0 {
        Some(Herald::read(&mut rd)?)
    } else {
        None
    };

    let message = if flags & CONTROL_MESSAGE_BIT != 0 {
        Some(MessageDescriptor::read(&mut rd)?)
    } else {
        None
    };

    rd.finish()?;

    Ok(ControlFrame {
        version,
        mode,
        source,
        destination,
        link_state,
        ack_type,
        ack_base,
        bitmap,
        herald,
        message,
    })
}

/// Decodes a frame of either kind, dispatching on the type byte.
pub fn decode(frame_bytes: &[u8]) -> Result<Frame, FrameError> {
    verify_crc(frame_bytes)?;

    let body = frame_body(frame_bytes);

    match frame_kind(frame_bytes) {
        Some(FrameKind::Data) => parse_data(body).map(Frame::Data),
        Some(FrameKind::Control) => parse_control(body).map(Frame::Control),
        None => Err(FrameError::InvalidField {
            field: "frame type",
            value: frame_bytes[0] as u32,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::{DataRate, Interleaver};

    fn random_bytes(size: usize) -> Vec<u8> {
        (0..size).map(|_| rand::random::<u8>()).collect()
    }

    fn full_control_frame() -> ControlFrame {
        let mut bitmap = [0; BITMAP_SIZE];
        bitmap[0] = 0b1011;
        bitmap[31] = 0x80;

        ControlFrame {
            version: PROTOCOL_VERSION,
            mode: ArqMode::Adaptive,
            source: Address::new("K7"),
            destination: Address::new("STATION-ALPHA"),
            link_state: LinkState::LinkUp,
            ack_type: AckType::DataAck,
            ack_base: 250,
            bitmap,
            herald: Some(DataRate::Bps1200.herald(8)),
            message: Some(MessageDescriptor {
                total_size: 2000,
                message_id: 0xBEEF,
                connection_id: 3,
                priority: 1,
                tx_next_byte: 1024,
                rx_next_byte: 512,
            }),
        }
    }

    // Rewrites the checksum of a hand-modified frame so that it passes validation
    fn reseal(frame_bytes: &mut Vec<u8>) {
        let crc_idx = frame_bytes.len() - FRAME_CRC_SIZE;
        frame_bytes.truncate(crc_idx);
        let frame_crc = crc::compute(frame_bytes);
        frame_bytes.extend_from_slice(&frame_crc.to_le_bytes());
    }

    #[test]
    fn control_round_trip() {
        let frame = full_control_frame();
        let bytes = encode_control(&frame).unwrap();

        assert_eq!(
            bytes.len(),
            CONTROL_HEADER_SIZE
                + SHORT_ADDRESS_SIZE
                + LONG_ADDRESS_SIZE
                + BITMAP_SIZE
                + HERALD_SIZE
                + MESSAGE_DESCRIPTOR_SIZE
                + FRAME_CRC_SIZE
        );
        assert_eq!(frame_kind(&bytes), Some(FrameKind::Control));
        assert_eq!(decode_control(&bytes), Ok(frame.clone()));
        assert_eq!(decode(&bytes), Ok(Frame::Control(frame)));
    }

    #[test]
    fn control_round_trip_without_sections() {
        let frame = ControlFrame {
            herald: None,
            message: None,
            source: Address::new(""),
            destination: Address::new("A"),
            ..full_control_frame()
        };

        let bytes = encode_control(&frame).unwrap();

        assert_eq!(
            bytes.len(),
            CONTROL_HEADER_SIZE + 2 * SHORT_ADDRESS_SIZE + BITMAP_SIZE + FRAME_CRC_SIZE
        );
        assert_eq!(decode_control(&bytes), Ok(frame));
    }

    #[test]
    fn address_padding() {
        let frame = ControlFrame {
            source: Address::new("Q"),
            ..full_control_frame()
        };

        let bytes = encode_control(&frame).unwrap();

        assert_eq!(&bytes[CONTROL_HEADER_SIZE..CONTROL_HEADER_SIZE + 2], b"Q@");
    }

    #[test]
    fn oversize_address() {
        let frame = ControlFrame {
            source: Address::Short(b"ABC".to_vec()),
            ..full_control_frame()
        };

        assert!(matches!(
            encode_control(&frame),
            Err(FrameError::EncodingError(_))
        ));

        let frame = ControlFrame {
            destination: Address::new("THIS-ADDRESS-IS-TOO-LONG"),
            ..full_control_frame()
        };

        assert!(matches!(
            encode_control(&frame),
            Err(FrameError::EncodingError(_))
        ));
    }

    #[test]
    fn data_round_trip() {
        for size in [0, 1, 11, 512, DATA_PAYLOAD_SIZE_MAX] {
            let frame = DataFrame {
                data_rate: DataRate::Bps2400,
                interleaver: Interleaver::Short,
                sequence: rand::random::<u8>(),
                offset: rand::random::<u32>(),
                payload: random_bytes(size),
            };

            let bytes = encode_data(&frame).unwrap();

            assert_eq!(bytes.len(), DATA_FRAME_OVERHEAD_SIZE + size);
            assert_eq!(frame_kind(&bytes), Some(FrameKind::Data));
            assert_eq!(decode_data(&bytes), Ok(frame));
        }
    }

    #[test]
    fn oversize_payload() {
        let frame = DataFrame {
            data_rate: DataRate::Bps2400,
            interleaver: Interleaver::Zero,
            sequence: 0,
            offset: 0,
            payload: vec![0; DATA_PAYLOAD_SIZE_MAX + 1],
        };

        assert!(matches!(
            encode_data(&frame),
            Err(FrameError::EncodingError(_))
        ));
    }

    #[test]
    fn single_bit_flips_are_detected() {
        let data_bytes = encode_data(&DataFrame {
            data_rate: DataRate::Bps300,
            interleaver: Interleaver::Long,
            sequence: 17,
            offset: 4096,
            payload: random_bytes(40),
        })
        .unwrap();

        let control_bytes = encode_control(&full_control_frame()).unwrap();

        for bytes in [data_bytes, control_bytes] {
            for bit in 0..bytes.len() * 8 {
                let mut corrupted = bytes.clone();
                corrupted[bit / 8] ^= 1 << (bit % 8);

                let result = match frame_kind(&bytes) {
                    Some(FrameKind::Data) => decode_data(&corrupted).map(|_| ()),
                    _ => decode_control(&corrupted).map(|_| ()),
                };

                assert!(
                    matches!(result, Err(FrameError::ChecksumMismatch { .. })),
                    "bit {} not detected",
                    bit
                );
            }
        }
    }

    #[test]
    fn truncated() {
        assert!(matches!(
            decode_data(&[FRAME_TYPE_DATA, 0, 0]),
            Err(FrameError::TruncatedFrame { .. })
        ));

        // Valid checksum, but shorter than the declared payload length
        let mut bytes = encode_data(&DataFrame {
            data_rate: DataRate::Bps600,
            interleaver: Interleaver::Short,
            sequence: 1,
            offset: 0,
            payload: vec![1, 2, 3, 4],
        })
        .unwrap();

        bytes.remove(DATA_HEADER_SIZE);
        reseal(&mut bytes);

        assert!(matches!(
            decode_data(&bytes),
            Err(FrameError::TruncatedFrame { .. })
        ));

        // Control frame cut off in the middle of the bitmap
        let mut bytes = encode_control(&full_control_frame()).unwrap();
        bytes.truncate(CONTROL_HEADER_SIZE + 30);
        bytes.extend_from_slice(&[0; FRAME_CRC_SIZE]);
        reseal(&mut bytes);

        assert!(matches!(
            decode_control(&bytes),
            Err(FrameError::TruncatedFrame { .. })
        ));
    }

    #[test]
    fn surplus_bytes() {
        let mut bytes = encode_data(&DataFrame {
            data_rate: DataRate::Bps600,
            interleaver: Interleaver::Short,
            sequence: 1,
            offset: 0,
            payload: vec![1, 2, 3, 4],
        })
        .unwrap();

        bytes.insert(bytes.len() - FRAME_CRC_SIZE, 0xFF);
        reseal(&mut bytes);

        assert!(matches!(
            decode_data(&bytes),
            Err(FrameError::TruncatedFrame { .. })
        ));
    }

    #[test]
    fn pad_character_in_address() {
        for text in ["K@", "@", "STATION@ALPHA"] {
            let frame = ControlFrame {
                destination: Address::new(text),
                ..full_control_frame()
            };

            assert!(matches!(
                encode_control(&frame),
                Err(FrameError::EncodingError(_))
            ));
        }
    }

    #[test]
    fn decode_dispatches_on_kind() {
        let control = full_control_frame();
        let data = DataFrame {
            data_rate: DataRate::Bps600,
            interleaver: Interleaver::Short,
            sequence: 9,
            offset: 1024,
            payload: random_bytes(40),
        };

        let control_bytes = encode_control(&control).unwrap();
        let data_bytes = encode_data(&data).unwrap();

        assert_eq!(decode(&control_bytes), Ok(Frame::Control(control)));
        assert_eq!(decode(&data_bytes), Ok(Frame::Data(data)));

        let mut data_bytes = data_bytes;
        data_bytes[4] ^= 0x10;

        assert!(matches!(
            decode(&data_bytes),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn unexpected_kind() {
        let bytes = encode_control(&full_control_frame()).unwrap();

        assert_eq!(
            decode_data(&bytes),
            Err(FrameError::UnexpectedFrameKind {
                expected: FrameKind::Data,
                actual: Some(FrameKind::Control),
            })
        );

        let mut bytes = bytes;
        bytes[0] = 0x7F;
        reseal(&mut bytes);

        assert_eq!(frame_kind(&bytes), None);
        assert_eq!(
            decode_control(&bytes),
            Err(FrameError::UnexpectedFrameKind {
                expected: FrameKind::Control,
                actual: None,
            })
        );
        assert!(matches!(
            decode(&bytes),
            Err(FrameError::InvalidField { .. })
        ));
    }

    #[test]
    fn invalid_fields() {
        let bytes = encode_control(&full_control_frame()).unwrap();

        // Reserved flag bit
        let mut corrupted = bytes.clone();
        corrupted[3] |= 0x80;
        reseal(&mut corrupted);
        assert!(matches!(
            decode_control(&corrupted),
            Err(FrameError::InvalidField { field: "flags", .. })
        ));

        // Unknown mode
        let mut corrupted = bytes.clone();
        corrupted[2] = 9;
        reseal(&mut corrupted);
        assert!(matches!(
            decode_control(&corrupted),
            Err(FrameError::InvalidField { field: "mode", .. })
        ));

        // Payload length over the maximum
        let mut bytes = encode_data(&DataFrame {
            data_rate: DataRate::Bps600,
            interleaver: Interleaver::Short,
            sequence: 1,
            offset: 0,
            payload: vec![],
        })
        .unwrap();
        bytes[7] = 0x04;
        bytes[8] = 0x00;
        reseal(&mut bytes);
        assert!(matches!(
            decode_data(&bytes),
            Err(FrameError::InvalidField {
                field: "payload length",
                value: 1024
            })
        ));
    }
}
