// Licensed under the Apache-2.0 license

//! Read-only, bounds-checked view over a mapped image buffer.
//!
//! Records are copied out with [`zerocopy`] rather than referenced in
//! place, so the buffer needs no particular alignment. Every record read is
//! validated against both the buffer length and the header-declared image
//! length before any byte is dereferenced.

use crate::layout::{BootChunkDesc, BootImageHeader, BootZiChunkDesc};
use crate::{ImageError, BOOT_IMAGE_MAGIC, BOOT_IMAGE_VERSION};
use core::marker::PhantomData;
use core::mem::size_of;
use zerocopy::FromBytes;

/// Parsed view of an untrusted boot-image buffer.
pub struct BootImage<'a> {
    bytes: &'a [u8],
    header: BootImageHeader,
}

impl<'a> BootImage<'a> {
    /// Wraps `bytes`, reading out the fixed-size header.
    ///
    /// Fails only when the buffer cannot even hold a header; format
    /// problems (magic, version) are left to [`check_format`] so an
    /// inspection tool can still display raw structure.
    ///
    /// [`check_format`]: BootImage::check_format
    pub fn new(bytes: &'a [u8]) -> Result<Self, ImageError> {
        let (header, _) = BootImageHeader::read_from_prefix(bytes)
            .map_err(|_| ImageError::TruncatedImage)?;
        Ok(Self { bytes, header })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn header(&self) -> &BootImageHeader {
        &self.header
    }

    /// Checks the magic constant and format version.
    pub fn check_format(&self) -> Result<(), ImageError> {
        if self.header.magic != BOOT_IMAGE_MAGIC {
            return Err(ImageError::BadMagic {
                found: self.header.magic,
            });
        }
        if self.header.version != BOOT_IMAGE_VERSION {
            return Err(ImageError::UnsupportedVersion {
                found: self.header.version,
            });
        }
        Ok(())
    }

    // Record reads are bounded by the mapped buffer and by the declared
    // image length, whichever is smaller: a header that overstates the
    // image must not cause reads past the buffer, and one that understates
    // it must surface truncation rather than scan trailing bytes.
    fn limit(&self) -> usize {
        let declared = usize::try_from(self.header.boot_image_length).unwrap_or(usize::MAX);
        self.bytes.len().min(declared)
    }

    /// Linear scan of the load-chunk table, stopping at (and excluding)
    /// the zero-size sentinel.
    pub fn load_chunks(&self) -> ChunkIter<'a> {
        TableIter::new(self.bytes, self.limit(), self.header.chunk_table_offset)
    }

    /// Linear scan of the zero-init-chunk table.
    pub fn zi_chunks(&self) -> ZiChunkIter<'a> {
        TableIter::new(self.bytes, self.limit(), self.header.zi_chunk_table_offset)
    }
}

/// Common shape of the two sentinel-terminated record tables.
pub trait ChunkRecord: FromBytes + Copy {
    fn owner(&self) -> u32;
    fn size(&self) -> u64;
}

impl ChunkRecord for BootChunkDesc {
    fn owner(&self) -> u32 {
        self.owner
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl ChunkRecord for BootZiChunkDesc {
    fn owner(&self) -> u32 {
        self.owner
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Fixed-size record scan: yields each record until the sentinel, checking
/// bounds before every read. A failed bounds check yields one
/// `TruncatedImage` and fuses the iterator; the other table may still be
/// walked independently.
pub struct TableIter<'a, T> {
    bytes: &'a [u8],
    limit: usize,
    offset: usize,
    done: bool,
    _record: PhantomData<T>,
}

pub type ChunkIter<'a> = TableIter<'a, BootChunkDesc>;
pub type ZiChunkIter<'a> = TableIter<'a, BootZiChunkDesc>;

impl<'a, T: ChunkRecord> TableIter<'a, T> {
    fn new(bytes: &'a [u8], limit: usize, table_offset: u64) -> Self {
        Self {
            bytes,
            limit,
            // An offset too large for the address space fails the bounds
            // check on first use, reporting truncation rather than
            // silently yielding nothing.
            offset: usize::try_from(table_offset).unwrap_or(usize::MAX),
            done: false,
            _record: PhantomData,
        }
    }

    /// Groups this scan into maximal consecutive same-owner runs.
    pub fn runs(self) -> Runs<'a, T> {
        Runs {
            iter: self,
            current: None,
        }
    }
}

impl<T: ChunkRecord> Iterator for TableIter<'_, T> {
    type Item = Result<T, ImageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let end = match self.offset.checked_add(size_of::<T>()) {
            Some(end) if end <= self.limit => end,
            _ => {
                self.done = true;
                return Some(Err(ImageError::TruncatedImage));
            }
        };
        let Ok(record) = T::read_from_bytes(&self.bytes[self.offset..end]) else {
            self.done = true;
            return Some(Err(ImageError::TruncatedImage));
        };
        self.offset = end;
        if record.size() == 0 {
            // Sentinel: terminates the table, not part of it.
            self.done = true;
            return None;
        }
        Some(Ok(record))
    }
}

/// A maximal run of consecutive records sharing one owner.
///
/// Run boundaries come purely from comparing each record's owner to the
/// previous record's, so an owner whose records are interleaved with
/// another's is reported as two runs. That matches the historic reporting
/// behavior; the per-record `owner` field stays authoritative for loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRun {
    pub owner: u32,
    pub count: usize,
    pub total_bytes: u64,
}

pub struct Runs<'a, T> {
    iter: TableIter<'a, T>,
    current: Option<ChunkRun>,
}

impl<T: ChunkRecord> Iterator for Runs<'_, T> {
    type Item = Result<ChunkRun, ImageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.iter.next() {
                Some(Ok(record)) => match self.current.as_mut() {
                    Some(run) if run.owner == record.owner() => {
                        run.count += 1;
                        run.total_bytes += record.size();
                    }
                    Some(run) => {
                        let finished = *run;
                        self.current = Some(ChunkRun {
                            owner: record.owner(),
                            count: 1,
                            total_bytes: record.size(),
                        });
                        return Some(Ok(finished));
                    }
                    None => {
                        self.current = Some(ChunkRun {
                            owner: record.owner(),
                            count: 1,
                            total_bytes: record.size(),
                        });
                    }
                },
                Some(Err(e)) => {
                    self.current = None;
                    return Some(Err(e));
                }
                None => return self.current.take().map(Ok),
            }
        }
    }
}
