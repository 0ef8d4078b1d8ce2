// Licensed under the Apache-2.0 license

//! Signed multi-hart boot-image container: on-disk layout, bounds-checked
//! parsing and integrity/authenticity verification.
//!
//! The image is a self-describing binary blob supplied by an external
//! medium, so nothing in here trusts a declared offset or length without
//! validating it against the mapped buffer first. Parsing is read-only;
//! all accessors work on a borrowed byte slice.

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "builder"))]
extern crate alloc;

#[cfg(any(test, feature = "builder"))]
mod builder;
mod crc32;
mod layout;
mod parse;
mod verify;

#[cfg(any(test, feature = "builder"))]
pub use builder::ImageBuilder;
pub use crc32::crc32;
pub use layout::{
    hart_owner_id, BootChunkDesc, BootFlags, BootImageHeader, BootZiChunkDesc, HartDescriptor,
    PrivMode, BOOT_IMAGE_MAGIC, BOOT_IMAGE_VERSION, NAME_LEN, NUM_HARTS, SIGNATURE_LEN,
};
pub use parse::{BootImage, ChunkIter, ChunkRecord, ChunkRun, Runs, TableIter, ZiChunkIter};
pub use verify::{signature_region, SignatureVerifier};

use core::fmt;

/// Parse/verification failures. These are reported, not aborted on: the
/// caller (inspection tool or the hart loader) decides whether a given
/// failure blocks boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// The magic constant does not identify this format.
    BadMagic { found: u32 },
    /// The format version is not one this parser understands.
    UnsupportedVersion { found: u32 },
    /// A declared offset/length implies reading past the mapped buffer.
    TruncatedImage,
    /// The recomputed header CRC does not match the stored one.
    ChecksumMismatch { stored: u32, calculated: u32 },
    /// The embedded signature did not verify against the supplied key.
    SignatureInvalid,
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::BadMagic { found } => {
                write!(f, "bad magic {found:#010x} (expected {BOOT_IMAGE_MAGIC:#010x})")
            }
            ImageError::UnsupportedVersion { found } => {
                write!(f, "unsupported format version {found:#x}")
            }
            ImageError::TruncatedImage => write!(f, "image truncated"),
            ImageError::ChecksumMismatch { stored, calculated } => write!(
                f,
                "header CRC mismatch (stored {stored:#010x}, calculated {calculated:#010x})"
            ),
            ImageError::SignatureInvalid => write!(f, "signature verification failed"),
        }
    }
}

impl core::error::Error for ImageError {}
