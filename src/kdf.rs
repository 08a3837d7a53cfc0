//! Passphrase to key derivation using scrypt
//!
//! The derived key is deterministic for a given passphrase and parameter
//! set, which is what lets a vault be re-opened. The default salt is a
//! fixed value shared by every installation; it can be overridden through
//! configuration, but the vault file does not record which salt was used.

use std::fmt;

use scrypt::{Params, scrypt};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};

/// Length of derived key in bytes
pub const KEY_LEN: usize = 32;

/// scrypt log2(N) parameter (CPU/memory cost), N = 32768
pub const DEFAULT_LOG_N: u8 = 15;

/// scrypt r parameter (block size)
pub const DEFAULT_R: u32 = 8;

/// scrypt p parameter (parallelization)
pub const DEFAULT_P: u32 = 1;

/// Salt used when none is configured.
pub const DEFAULT_SALT: &str = "salt";

/// scrypt cost parameters and salt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct KdfParams {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
    pub salt: String,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: DEFAULT_LOG_N,
            r: DEFAULT_R,
            p: DEFAULT_P,
            salt: DEFAULT_SALT.to_string(),
        }
    }
}

/// Symmetric key material held only for the lifetime of an unlocked session.
///
/// Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(***)")
    }
}

/// Derive a 32-byte key from a passphrase using scrypt
pub fn derive(passphrase: &[u8], params: &KdfParams) -> Result<DerivedKey> {
    let scrypt_params = Params::new(params.log_n, params.r, params.p, KEY_LEN).map_err(|e| {
        VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::KdfFailure,
            format!("invalid scrypt parameters: {}", e),
        )
    })?;

    let mut key = DerivedKey([0u8; KEY_LEN]);
    scrypt(passphrase, params.salt.as_bytes(), &scrypt_params, &mut key.0).map_err(|e| {
        VaultError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::KdfFailure,
            format!("scrypt key derivation failed: {}", e),
        )
    })?;

    Ok(key)
}

#[cfg(test)]
pub(crate) fn fast_params() -> KdfParams {
    KdfParams {
        log_n: 10,
        ..KdfParams::default()
    }
}
