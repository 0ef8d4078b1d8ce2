// Licensed under the Apache-2.0 license

use crc::{Crc, CRC_32_ISO_HDLC};

// The standard CRC-32 (the ISO-HDLC parameterization), fixed by the image
// format; must match bit-for-bit to interoperate with existing images.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}
