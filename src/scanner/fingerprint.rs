//! Content fingerprint computation.
//!
//! The stock calculator always produces an oshash (64 KiB head/tail
//! wrapping sum, cheap even on huge files) and optionally MD5 and SHA-256
//! streaming digests. Perceptual kinds are left to collaborator-provided
//! calculators.

use std::fmt::Write as _;
use std::io::{Read, Seek, SeekFrom};

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::core::config::ScanOptions;
use crate::core::errors::{Result, ScanError};
use crate::fsys::ScanFs;
use crate::model::{CatFile, Fingerprint, FingerprintKind, FingerprintSet};

/// Capability to compute the fingerprint set for a file snapshot.
pub trait FingerprintCalculator: Send + Sync {
    /// Compute fingerprints for `file`, opening its contents through `fs`.
    ///
    /// With `use_existing`, kinds already present in `file.fingerprints`
    /// are kept as-is and only missing kinds are computed; the returned
    /// set is the union. Without it, every enabled kind is recomputed.
    fn calculate(&self, fs: &dyn ScanFs, file: &CatFile, use_existing: bool)
    -> Result<FingerprintSet>;
}

/// The stock calculator: oshash always, MD5/SHA-256 when enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdCalculator {
    pub calculate_md5: bool,
    pub calculate_sha256: bool,
}

impl StdCalculator {
    /// Mirror the digest toggles from scan options.
    #[must_use]
    pub fn from_options(options: &ScanOptions) -> Self {
        Self {
            calculate_md5: options.calculate_md5,
            calculate_sha256: options.calculate_sha256,
        }
    }

    fn enabled_kinds(&self) -> Vec<FingerprintKind> {
        let mut kinds = vec![FingerprintKind::Oshash];
        if self.calculate_md5 {
            kinds.push(FingerprintKind::Md5);
        }
        if self.calculate_sha256 {
            kinds.push(FingerprintKind::Sha256);
        }
        kinds
    }
}

impl FingerprintCalculator for StdCalculator {
    fn calculate(
        &self,
        fs: &dyn ScanFs,
        file: &CatFile,
        use_existing: bool,
    ) -> Result<FingerprintSet> {
        let mut out = FingerprintSet::new();
        let mut missing = Vec::new();
        for kind in self.enabled_kinds() {
            match file.fingerprints.get(kind) {
                Some(value) if use_existing => {
                    out.insert(Fingerprint::new(kind, value));
                }
                _ => missing.push(kind),
            }
        }
        if missing.is_empty() {
            return Ok(out);
        }

        let fail = |details: String| ScanError::Fingerprint {
            path: file.path.clone(),
            details,
        };
        let mut reader = fs
            .open(&file.path)
            .map_err(|e| fail(format!("open: {e}")))?;
        for kind in missing {
            reader
                .seek(SeekFrom::Start(0))
                .map_err(|e| fail(format!("seek: {e}")))?;
            let value = match kind {
                FingerprintKind::Oshash => {
                    oshash(&mut reader, file.size).map_err(|e| fail(format!("oshash: {e}")))?
                }
                FingerprintKind::Md5 => {
                    digest_stream::<Md5>(&mut reader).map_err(|e| fail(format!("md5: {e}")))?
                }
                FingerprintKind::Sha256 => digest_stream::<Sha256>(&mut reader)
                    .map_err(|e| fail(format!("sha256: {e}")))?,
                FingerprintKind::Phash => continue,
            };
            out.insert(Fingerprint::new(kind, value));
        }
        Ok(out)
    }
}

const OSHASH_CHUNK: u64 = 64 * 1024;

/// Opensubtitles-style hash: file size plus the wrapping sum of the
/// little-endian u64 words of the first and last 64 KiB (overlapping for
/// small files; a trailing partial word is zero-padded).
pub fn oshash<R: Read + Seek + ?Sized>(reader: &mut R, size: u64) -> std::io::Result<String> {
    let head_len = usize::try_from(size.min(OSHASH_CHUNK)).unwrap_or(0);
    let mut head = vec![0u8; head_len];
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut head)?;

    let tail_start = size.saturating_sub(OSHASH_CHUNK);
    let tail_len = usize::try_from(size - tail_start).unwrap_or(0);
    let mut tail = vec![0u8; tail_len];
    reader.seek(SeekFrom::Start(tail_start))?;
    reader.read_exact(&mut tail)?;

    let hash = size
        .wrapping_add(word_sum(&head))
        .wrapping_add(word_sum(&tail));
    Ok(format!("{hash:016x}"))
}

fn word_sum(buf: &[u8]) -> u64 {
    let mut sum = 0u64;
    let mut chunks = buf.chunks_exact(8);
    for chunk in &mut chunks {
        let word = u64::from_le_bytes(chunk.try_into().unwrap_or([0u8; 8]));
        sum = sum.wrapping_add(word);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut padded = [0u8; 8];
        padded[..rest.len()].copy_from_slice(rest);
        sum = sum.wrapping_add(u64::from_le_bytes(padded));
    }
    sum
}

fn digest_stream<D: Digest>(reader: &mut (impl Read + ?Sized)) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
