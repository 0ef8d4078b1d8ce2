// Licensed under the Apache-2.0 license

//! Host-side boot-image inspection tool.
//!
//! Dumps the header, hart descriptors and chunk tables of an image file and
//! reports integrity verdicts: header CRC always, embedded signature when a
//! public key is supplied. Structural problems (bad magic, wrong version)
//! are reported but do not stop the dump; the tool exits non-zero if any
//! check failed.

use anyhow::{bail, Context, Result};
use boot_image::{
    signature_region, BootImage, ChunkRecord, SignatureVerifier, TableIter, SIGNATURE_LEN,
};
use clap::Parser;
use p384::ecdsa::signature::Verifier;
use p384::ecdsa::{Signature, VerifyingKey};
use p384::pkcs8::DecodePublicKey;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(version, about = "Inspect and verify a multi-hart boot image")]
struct Args {
    /// Boot image file to inspect
    image: PathBuf,

    /// PEM-encoded ECDSA P-384 public key; enables the signature check
    public_key: Option<PathBuf>,
}

/// Checks the embedded signature against a P-384 public key. The signed
/// message is the whole image with the signature block zeroed, so the
/// header CRC (computed before signing) is covered too.
struct EcdsaP384Verifier {
    key: VerifyingKey,
}

impl EcdsaP384Verifier {
    fn from_pem_file(path: &Path) -> Result<Self> {
        let pem = fs::read_to_string(path)
            .with_context(|| format!("reading public key {}", path.display()))?;
        let key = VerifyingKey::from_public_key_pem(&pem)
            .with_context(|| format!("parsing public key {}", path.display()))?;
        Ok(Self { key })
    }
}

impl SignatureVerifier for EcdsaP384Verifier {
    fn verify(&self, image: &[u8], signature: &[u8; SIGNATURE_LEN]) -> bool {
        // An all-zero block (unsigned image) fails scalar validation here.
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        let mut masked = image.to_vec();
        masked[signature_region()].fill(0);
        self.key.verify(&masked, &signature).is_ok()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    // Log level comes from the environment (RUST_LOG); the CLI surface is
    // just the two inputs.
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let bytes = fs::read(&args.image)
        .with_context(|| format!("reading image {}", args.image.display()))?;
    log::debug!("mapped {} bytes", bytes.len());

    let image = BootImage::new(&bytes)
        .with_context(|| format!("{} is too short to hold a header", args.image.display()))?;

    let mut failed = false;

    if let Err(err) = image.check_format() {
        // Structure stays viewable; keep dumping so the operator can see
        // what the file actually contains.
        println!("FORMAT:        BAD ({err})");
        failed = true;
    }
    dump_header(&image);
    dump_harts(&image);

    println!();
    println!("load chunks:");
    if !dump_table(image.load_chunks()) {
        failed = true;
    }
    println!("zero-init chunks:");
    if !dump_table(image.zi_chunks()) {
        failed = true;
    }

    println!();
    match image.verify_header() {
        Ok(()) => println!("header CRC:    OK"),
        Err(err) => {
            println!("header CRC:    BAD ({err})");
            failed = true;
        }
    }
    match &args.public_key {
        Some(path) => {
            let verifier = EcdsaP384Verifier::from_pem_file(path)?;
            match image.verify_signature(&verifier) {
                Ok(()) => println!("signature:     OK"),
                Err(err) => {
                    println!("signature:     BAD ({err})");
                    failed = true;
                }
            }
        }
        None => println!("signature:     not checked (no public key supplied)"),
    }

    if failed {
        bail!("{} failed verification", args.image.display());
    }
    Ok(())
}

fn dump_header(image: &BootImage) {
    let header = image.header();
    println!("set name:      {}", header.set_name_str());
    println!("magic:         {:#010x}", header.magic);
    println!("version:       {}", header.version);
    println!("header length: {:#x}", header.header_length);
    println!("image length:  {:#x}", header.boot_image_length);
    println!("chunk tables:  {:#x} / {:#x} (zi)", header.chunk_table_offset, header.zi_chunk_table_offset);
    println!("header CRC:    {:#010x} (stored)", header.header_crc);
}

fn dump_harts(image: &BootImage) {
    for (index, hart) in image.header().harts.iter().enumerate() {
        if hart.num_chunks == 0 && hart.entry_point == 0 {
            println!("hart {index}:        (not populated)");
            continue;
        }
        let priv_mode = match hart.priv_mode() {
            Some(mode) => mode.as_str(),
            None => "invalid",
        };
        println!(
            "hart {index}:        {:<16} entry {:#010x} priv {} flags {:#x}",
            hart.name_str(),
            hart.entry_point,
            priv_mode,
            hart.flags,
        );
        println!(
            "               chunks [{}..={}] ({})",
            hart.first_chunk, hart.last_chunk, hart.num_chunks
        );
    }
}

/// Prints per-owner run summaries and grand totals. Returns false if the
/// table walk hit a structural error.
fn dump_table<T: ChunkRecord>(table: TableIter<T>) -> bool {
    let mut chunks = 0usize;
    let mut bytes = 0u64;
    let mut intact = true;
    for run in table.runs() {
        match run {
            Ok(run) => {
                println!(
                    "  owner {}: {} chunk(s), {} byte(s)",
                    run.owner, run.count, run.total_bytes
                );
                chunks += run.count;
                bytes += run.total_bytes;
            }
            Err(err) => {
                println!("  walk aborted: {err}");
                intact = false;
            }
        }
    }
    println!("  total: {chunks} chunk(s), {bytes} byte(s)");
    intact
}

#[cfg(test)]
mod tests {
    use super::*;
    use boot_image::{hart_owner_id, BootFlags, ImageBuilder, ImageError, PrivMode};
    use core::mem::offset_of;
    use p384::ecdsa::{signature::Signer, SigningKey};
    use p384::pkcs8::{EncodePublicKey, LineEnding};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_image() -> Vec<u8> {
        ImageBuilder::new("inspect-test")
            .hart(0, "u54_1", 0x8000_0000, PrivMode::Supervisor, BootFlags::empty())
            .chunk(hart_owner_id(0), 0x8000_0000, &[0x5A; 128])
            .build()
    }

    fn sign(image: &mut [u8], key: &SigningKey) {
        let mut masked = image.to_vec();
        masked[signature_region()].fill(0);
        let signature: Signature = key.sign(&masked);
        image[signature_region()].copy_from_slice(&signature.to_bytes());
    }

    #[test]
    fn test_sign_embed_verify_roundtrip() {
        let mut bytes = test_image();
        let key = SigningKey::random(&mut StdRng::seed_from_u64(7));
        sign(&mut bytes, &key);

        let image = BootImage::new(&bytes).unwrap();
        image
            .verify_header()
            .expect("signing must not disturb the header CRC");
        let verifier = EcdsaP384Verifier {
            key: *key.verifying_key(),
        };
        image
            .verify_signature(&verifier)
            .expect("embedded signature verifies against its own key");
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let mut bytes = test_image();
        let key = SigningKey::random(&mut StdRng::seed_from_u64(7));
        sign(&mut bytes, &key);

        let last = bytes.len() - 1;
        bytes[last] ^= 0x01; // payload byte, outside the header
        let image = BootImage::new(&bytes).unwrap();
        image.verify_header().expect("header itself is untouched");
        let verifier = EcdsaP384Verifier {
            key: *key.verifying_key(),
        };
        assert_eq!(
            image.verify_signature(&verifier),
            Err(ImageError::SignatureInvalid),
            "signature covers the payload, not just the header"
        );
    }

    #[test]
    fn test_wrong_key_fails_signature() {
        let mut bytes = test_image();
        let key = SigningKey::random(&mut StdRng::seed_from_u64(7));
        sign(&mut bytes, &key);

        let other = SigningKey::random(&mut StdRng::seed_from_u64(8));
        let verifier = EcdsaP384Verifier {
            key: *other.verifying_key(),
        };
        let image = BootImage::new(&bytes).unwrap();
        assert_eq!(
            image.verify_signature(&verifier),
            Err(ImageError::SignatureInvalid)
        );
    }

    #[test]
    fn test_unsigned_image_fails_signature_check() {
        let bytes = test_image(); // signature block left zeroed by the builder
        let key = SigningKey::random(&mut StdRng::seed_from_u64(7));
        let verifier = EcdsaP384Verifier {
            key: *key.verifying_key(),
        };
        let image = BootImage::new(&bytes).unwrap();
        assert_eq!(
            image.verify_signature(&verifier),
            Err(ImageError::SignatureInvalid)
        );
    }

    #[test]
    fn test_public_key_pem_roundtrip() {
        let key = SigningKey::random(&mut StdRng::seed_from_u64(7));
        let pem = key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let parsed = VerifyingKey::from_public_key_pem(&pem).unwrap();
        assert_eq!(&parsed, key.verifying_key());
    }

    #[test]
    fn test_dump_table_flags_truncated_walk() {
        let mut bytes = test_image();
        // Declare the image over mid-table so the walk aborts.
        let image = BootImage::new(&bytes).unwrap();
        let new_len = image.header().chunk_table_offset + 1;
        let field = offset_of!(boot_image::BootImageHeader, boot_image_length);
        bytes[field..field + 8].copy_from_slice(&new_len.to_le_bytes());

        let image = BootImage::new(&bytes).unwrap();
        assert!(!dump_table(image.load_chunks()));
    }
}
