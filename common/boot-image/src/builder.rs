// Licensed under the Apache-2.0 license

//! Well-formed image construction for host tooling and tests.
//!
//! Layout produced: header, load-chunk table (sentinel-terminated),
//! zero-init table (sentinel-terminated), then the chunk payload blobs.
//! Each chunk's `load_addr` is assigned as the payload's offset from the
//! image base. The header CRC is computed with the CRC and signature
//! fields zeroed; the signature block is left zeroed for a detached signer
//! to fill in afterwards.

use crate::crc32::crc32;
use crate::layout::{
    hart_owner_id, BootChunkDesc, BootFlags, BootImageHeader, BootZiChunkDesc, HartDescriptor,
    PrivMode, BOOT_IMAGE_MAGIC, BOOT_IMAGE_VERSION, NAME_LEN, NUM_HARTS, SIGNATURE_LEN,
};
use alloc::string::String;
use alloc::vec::Vec;
use core::mem::{offset_of, size_of};
use zerocopy::IntoBytes;

struct HartSpec {
    name: String,
    entry_point: u64,
    priv_mode: PrivMode,
    flags: BootFlags,
}

struct ChunkSpec {
    owner: u32,
    exec_addr: u64,
    payload: Vec<u8>,
}

struct ZiSpec {
    owner: u32,
    exec_addr: u64,
    size: u64,
}

pub struct ImageBuilder {
    set_name: String,
    harts: [Option<HartSpec>; NUM_HARTS],
    chunks: Vec<ChunkSpec>,
    zi_chunks: Vec<ZiSpec>,
}

impl ImageBuilder {
    pub fn new(set_name: &str) -> Self {
        Self {
            set_name: String::from(set_name),
            harts: [None, None, None, None],
            chunks: Vec::new(),
            zi_chunks: Vec::new(),
        }
    }

    /// Declares hart `index` (0-based descriptor slot). Chunk ranges are
    /// derived from the chunk list at build time, matching owner id
    /// [`hart_owner_id`]`(index)`.
    pub fn hart(
        mut self,
        index: usize,
        name: &str,
        entry_point: u64,
        priv_mode: PrivMode,
        flags: BootFlags,
    ) -> Self {
        self.harts[index] = Some(HartSpec {
            name: String::from(name),
            entry_point,
            priv_mode,
            flags,
        });
        self
    }

    /// Appends a load chunk for `owner` with the given payload bytes.
    pub fn chunk(mut self, owner: u32, exec_addr: u64, payload: &[u8]) -> Self {
        assert!(!payload.is_empty(), "zero-size chunks are the sentinel");
        self.chunks.push(ChunkSpec {
            owner,
            exec_addr,
            payload: payload.to_vec(),
        });
        self
    }

    /// Appends a zero-init chunk for `owner` (no payload bytes consumed).
    pub fn zi_chunk(mut self, owner: u32, exec_addr: u64, size: u64) -> Self {
        assert!(size != 0, "zero-size ZI chunks are the sentinel");
        self.zi_chunks.push(ZiSpec {
            owner,
            exec_addr,
            size,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let header_len = size_of::<BootImageHeader>();
        let chunk_table_offset = header_len;
        let chunk_table_len = (self.chunks.len() + 1) * size_of::<BootChunkDesc>();
        let zi_table_offset = chunk_table_offset + chunk_table_len;
        let zi_table_len = (self.zi_chunks.len() + 1) * size_of::<BootZiChunkDesc>();
        let payload_offset = zi_table_offset + zi_table_len;
        let payload_len: usize = self.chunks.iter().map(|c| c.payload.len()).sum();
        let image_len = payload_offset + payload_len;

        // Assign payload positions, then materialize the chunk table.
        let mut chunk_table = Vec::with_capacity(self.chunks.len() + 1);
        let mut next_payload = payload_offset as u64;
        for chunk in &self.chunks {
            chunk_table.push(BootChunkDesc {
                owner: chunk.owner,
                reserved: [0; 4],
                load_addr: next_payload,
                exec_addr: chunk.exec_addr,
                size: chunk.payload.len() as u64,
                crc32: crc32(&chunk.payload),
                reserved2: [0; 4],
            });
            next_payload += chunk.payload.len() as u64;
        }
        chunk_table.push(BootChunkDesc {
            owner: 0,
            reserved: [0; 4],
            load_addr: 0,
            exec_addr: 0,
            size: 0,
            crc32: 0,
            reserved2: [0; 4],
        });

        let mut zi_table = Vec::with_capacity(self.zi_chunks.len() + 1);
        for zi in &self.zi_chunks {
            zi_table.push(BootZiChunkDesc {
                owner: zi.owner,
                reserved: [0; 4],
                exec_addr: zi.exec_addr,
                size: zi.size,
            });
        }
        zi_table.push(BootZiChunkDesc {
            owner: 0,
            reserved: [0; 4],
            exec_addr: 0,
            size: 0,
        });

        let mut header = BootImageHeader {
            magic: BOOT_IMAGE_MAGIC,
            version: BOOT_IMAGE_VERSION,
            header_length: header_len as u64,
            chunk_table_offset: chunk_table_offset as u64,
            zi_chunk_table_offset: zi_table_offset as u64,
            harts: [self.hart_descriptor(0), self.hart_descriptor(1),
                self.hart_descriptor(2), self.hart_descriptor(3)],
            set_name: fixed_name(&self.set_name),
            boot_image_length: image_len as u64,
            header_crc: 0,
            reserved: [0; 4],
            signature: [0u8; SIGNATURE_LEN],
        };
        header.header_crc = crc32(header.as_bytes());

        let mut image = Vec::with_capacity(image_len);
        image.extend_from_slice(header.as_bytes());
        for record in &chunk_table {
            image.extend_from_slice(record.as_bytes());
        }
        for record in &zi_table {
            image.extend_from_slice(record.as_bytes());
        }
        for chunk in &self.chunks {
            image.extend_from_slice(&chunk.payload);
        }
        debug_assert_eq!(image.len(), image_len);
        image
    }

    fn hart_descriptor(&self, index: usize) -> HartDescriptor {
        let owner = hart_owner_id(index);
        let owned: Vec<usize> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.owner == owner)
            .map(|(i, _)| i)
            .collect();
        let (first, last) = match (owned.first(), owned.last()) {
            (Some(&first), Some(&last)) => (first as u64, last as u64),
            _ => (0, 0),
        };
        let (name, entry_point, priv_mode, flags) = match &self.harts[index] {
            Some(spec) => (
                fixed_name(&spec.name),
                spec.entry_point,
                spec.priv_mode as u8,
                spec.flags.bits(),
            ),
            None => ([0u8; NAME_LEN], 0, PrivMode::User as u8, 0),
        };
        HartDescriptor {
            name,
            entry_point,
            priv_mode,
            reserved: [0; 7],
            flags,
            first_chunk: first,
            last_chunk: last,
            num_chunks: owned.len() as u64,
        }
    }
}

fn fixed_name(name: &str) -> [u8; NAME_LEN] {
    let mut field = [0u8; NAME_LEN];
    // Truncate to the field size, keeping at least one trailing NUL.
    let len = name.len().min(NAME_LEN - 1);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}
