//! Build input fingerprinting
//!
//! An image is valid only for the exact inputs it was built from. Every input
//! takes part in the digest, so a toolchain upgrade or a manifest edit that
//! leaves the package set alone still invalidates the image.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Hex characters kept from the digest (embedded in file names)
pub const FINGERPRINT_LEN: usize = 16;

/// Everything that determines whether an image is still valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintInputs {
    /// Digest of the project and manifest files
    pub manifest_digest: String,
    /// Resolved package set
    pub packages: BTreeSet<String>,
    /// Toolchain/runtime version
    pub toolchain_version: String,
    /// Digest of the accumulated usage hints
    pub hints_digest: String,
}

impl FingerprintInputs {
    /// Deterministic digest of all inputs
    pub fn fingerprint(&self) -> String {
        self.digest(true)
    }

    /// Digest of everything except the usage hints.
    ///
    /// Two images with the same base fingerprint hold the same packages for
    /// the same manifest and toolchain; they differ only in how much of the
    /// recorded usage was precompiled.
    pub fn base_fingerprint(&self) -> String {
        self.digest(false)
    }

    fn digest(&self, with_hints: bool) -> String {
        let mut hasher = Sha256::new();

        field(&mut hasher, "manifest", self.manifest_digest.as_bytes());
        hasher.update(b"packages");
        hasher.update((self.packages.len() as u64).to_le_bytes());
        for package in &self.packages {
            field(&mut hasher, "package", package.as_bytes());
        }
        field(&mut hasher, "toolchain", self.toolchain_version.as_bytes());
        if with_hints {
            field(&mut hasher, "hints", self.hints_digest.as_bytes());
        }

        let hash = hex::encode(hasher.finalize());
        hash[..FINGERPRINT_LEN].to_string()
    }
}

/// Tagged, length-prefixed field so adjacent values cannot run together
fn field(hasher: &mut Sha256, tag: &str, value: &[u8]) {
    hasher.update(tag.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
}
