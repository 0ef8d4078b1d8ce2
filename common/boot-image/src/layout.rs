// Licensed under the Apache-2.0 license

//! Byte-exact container layout.
//!
//! All integers are naturally aligned and host/target endianness must
//! match; explicit `reserved` fields stand in for what would otherwise be
//! implicit compiler padding, so the structs have no padding bytes and the
//! zerocopy derives hold.

use bitflags::bitflags;
use core::fmt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const BOOT_IMAGE_MAGIC: u32 = 0xB007_C0DE;
pub const BOOT_IMAGE_VERSION: u32 = 1;

/// Fixed per-image hart descriptor count.
pub const NUM_HARTS: usize = 4;

/// Fixed size of hart and image-set name fields, NUL padded.
pub const NAME_LEN: usize = 32;

/// Embedded signature block: ECDSA P-384 r‖s.
pub const SIGNATURE_LEN: usize = 96;

/// Chunk-table records name their owning hart by id; descriptor index `i`
/// owns id `i + 1` (id 0 is the monitor core, which never boots from the
/// chunk table).
pub const fn hart_owner_id(index: usize) -> u32 {
    index as u32 + 1
}

bitflags! {
    /// Independent per-hart boot capabilities.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BootFlags: u64 {
        /// Ancillary data follows the hart's payload.
        const ANCILLARY_DATA = 1 << 0;
        /// Jump straight to the payload, skipping the secondary bootloader.
        const SKIP_SECONDARY_BOOT = 1 << 1;
        const ALLOW_COLD_REBOOT = 1 << 2;
        const ALLOW_WARM_REBOOT = 1 << 3;
        const SKIP_AUTOBOOT = 1 << 4;
    }
}

/// RISC-V privilege level a hart starts its payload in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrivMode {
    User = 0,
    Supervisor = 1,
    Machine = 3,
}

impl PrivMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(PrivMode::User),
            1 => Some(PrivMode::Supervisor),
            3 => Some(PrivMode::Machine),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrivMode::User => "user",
            PrivMode::Supervisor => "supervisor",
            PrivMode::Machine => "machine",
        }
    }
}

impl fmt::Display for PrivMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-hart boot descriptor. 80 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct HartDescriptor {
    pub name: [u8; NAME_LEN],
    pub entry_point: u64,
    pub priv_mode: u8,
    pub reserved: [u8; 7],
    pub flags: u64,
    /// Index of this hart's first record in the load-chunk table.
    pub first_chunk: u64,
    /// Index of this hart's last record in the load-chunk table.
    pub last_chunk: u64,
    pub num_chunks: u64,
}

impl HartDescriptor {
    pub fn name_str(&self) -> &str {
        fixed_str(&self.name)
    }

    pub fn boot_flags(&self) -> BootFlags {
        BootFlags::from_bits_truncate(self.flags)
    }

    pub fn priv_mode(&self) -> Option<PrivMode> {
        PrivMode::from_raw(self.priv_mode)
    }
}

/// Load-chunk record: a contiguous byte range of the image to copy into
/// hart memory. The table is terminated by a record whose `size` is zero.
/// 40 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BootChunkDesc {
    /// Owning hart id. Loaders must check this against the owning hart's
    /// declared chunk range; the parser only observes it.
    pub owner: u32,
    pub reserved: [u8; 4],
    /// Source of the payload bytes, as an offset from the image base.
    pub load_addr: u64,
    /// Destination address in the owning hart's memory.
    pub exec_addr: u64,
    pub size: u64,
    /// Payload CRC. Present in the format; checking it is the loader's
    /// business, not the parser's.
    pub crc32: u32,
    pub reserved2: [u8; 4],
}

/// Zero-init chunk record: memory to zero-fill rather than copy, so no
/// payload bytes are consumed. Sentinel-terminated like the load table.
/// 24 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BootZiChunkDesc {
    pub owner: u32,
    pub reserved: [u8; 4],
    pub exec_addr: u64,
    pub size: u64,
}

/// Fixed-size image header. The header CRC is computed with `header_crc`
/// and `signature` zeroed, so verification replicates that masking.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BootImageHeader {
    pub magic: u32,
    pub version: u32,
    pub header_length: u64,
    pub chunk_table_offset: u64,
    pub zi_chunk_table_offset: u64,
    pub harts: [HartDescriptor; NUM_HARTS],
    pub set_name: [u8; NAME_LEN],
    pub boot_image_length: u64,
    pub header_crc: u32,
    pub reserved: [u8; 4],
    pub signature: [u8; SIGNATURE_LEN],
}

impl BootImageHeader {
    pub fn set_name_str(&self) -> &str {
        fixed_str(&self.set_name)
    }
}

/// Decodes a NUL-padded fixed-size name field. Non-UTF-8 names render
/// empty rather than failing; names are informational only.
pub(crate) fn fixed_str(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    #[test]
    fn test_layout_sizes_are_stable() {
        // The wire format is byte-exact; these sizes are load-bearing.
        assert_eq!(size_of::<HartDescriptor>(), 80);
        assert_eq!(size_of::<BootChunkDesc>(), 40);
        assert_eq!(size_of::<BootZiChunkDesc>(), 24);
        assert_eq!(size_of::<BootImageHeader>(), 496);
    }

    #[test]
    fn test_priv_mode_decode() {
        assert_eq!(PrivMode::from_raw(0), Some(PrivMode::User));
        assert_eq!(PrivMode::from_raw(1), Some(PrivMode::Supervisor));
        assert_eq!(PrivMode::from_raw(3), Some(PrivMode::Machine));
        assert_eq!(PrivMode::from_raw(2), None, "2 is not a defined mode");
        assert_eq!(PrivMode::Machine.as_str(), "machine");
    }

    #[test]
    fn test_name_decoding_stops_at_nul() {
        let mut name = [0u8; NAME_LEN];
        name[..4].copy_from_slice(b"u54a");
        let hart = HartDescriptor {
            name,
            entry_point: 0,
            priv_mode: 1,
            reserved: [0; 7],
            flags: 0,
            first_chunk: 0,
            last_chunk: 0,
            num_chunks: 0,
        };
        assert_eq!(hart.name_str(), "u54a");
    }

    #[test]
    fn test_boot_flags_decode_ignores_unknown_bits() {
        let hart = HartDescriptor {
            name: [0; NAME_LEN],
            entry_point: 0,
            priv_mode: 3,
            reserved: [0; 7],
            flags: BootFlags::SKIP_SECONDARY_BOOT.bits() | BootFlags::ALLOW_COLD_REBOOT.bits()
                | (1 << 63),
            first_chunk: 0,
            last_chunk: 0,
            num_chunks: 0,
        };
        assert_eq!(
            hart.boot_flags(),
            BootFlags::SKIP_SECONDARY_BOOT | BootFlags::ALLOW_COLD_REBOOT
        );
    }
}
