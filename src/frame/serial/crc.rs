// CRC-32 with reflected polynomial 0x04C11DB7, all-ones seed and inverted output. The lookup
// table is computed at compile time.
const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

pub const SIZE: usize = 4;

pub fn compute(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}
