// Licensed under the Apache-2.0 license

//! Header integrity and image authenticity checks.
//!
//! The header CRC is recomputed over a copy of the header with the CRC and
//! signature fields zeroed; that masking is part of the format. Signature
//! checking is delegated through [`SignatureVerifier`] so the firmware and
//! the host tool can plug in scheme-specific implementations (or none:
//! no key supplied means "skipped", not "failed").

use crate::crc32::crc32;
use crate::layout::{BootImageHeader, SIGNATURE_LEN};
use crate::parse::BootImage;
use crate::ImageError;
use core::mem::offset_of;
use core::ops::Range;
use zerocopy::IntoBytes;

/// Byte range of the embedded signature block within the image, so
/// verifier implementations can mask it out of the signed message.
pub fn signature_region() -> Range<usize> {
    let start = offset_of!(BootImageHeader, signature);
    start..start + SIGNATURE_LEN
}

/// Scheme-specific signature check over the whole mapped image.
///
/// `image` is the full buffer as stored (embedded signature included);
/// `signature` is the embedded block to check. Implementations define the
/// exact signed message; the convention is the image with the signature
/// region zeroed, mirroring the header-CRC masking.
pub trait SignatureVerifier {
    fn verify(&self, image: &[u8], signature: &[u8; SIGNATURE_LEN]) -> bool;
}

impl BootImage<'_> {
    /// Recomputes the masked header CRC and compares it to the stored one.
    ///
    /// A mismatch is reported, not fatal: structural inspection remains
    /// possible, the caller decides whether it blocks boot.
    pub fn verify_header(&self) -> Result<(), ImageError> {
        let mut shadow = *self.header();
        shadow.header_crc = 0;
        shadow.signature = [0u8; SIGNATURE_LEN];
        let calculated = crc32(shadow.as_bytes());
        if calculated != self.header().header_crc {
            return Err(ImageError::ChecksumMismatch {
                stored: self.header().header_crc,
                calculated,
            });
        }
        Ok(())
    }

    /// Runs the scheme-specific signature check. Call only after
    /// [`verify_header`] has passed.
    ///
    /// [`verify_header`]: BootImage::verify_header
    pub fn verify_signature(&self, verifier: &dyn SignatureVerifier) -> Result<(), ImageError> {
        if verifier.verify(self.as_bytes(), &self.header().signature) {
            Ok(())
        } else {
            Err(ImageError::SignatureInvalid)
        }
    }
}
