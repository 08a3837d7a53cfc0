//! Authenticated encryption of vault payloads using XSalsa20Poly1305
//!
//! A [`SealedEnvelope`] is self-contained: it carries the random nonce and
//! the detached Poly1305 tag next to the ciphertext. On disk it is a JSON
//! object with hex-encoded fields:
//!
//! ```text
//! {"nonce": "<24 bytes>", "authTag": "<16 bytes>", "ciphertext": "<variable>"}
//! ```

use crypto_secretbox::XSalsa20Poly1305;
use crypto_secretbox::aead::generic_array::GenericArray;
use crypto_secretbox::aead::{AeadInPlace, KeyInit};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::kdf::DerivedKey;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of the Poly1305 authentication tag in bytes
pub const TAG_LEN: usize = 16;

const AUTH_FAILED_MSG: &str = "corrupt input, tampered-with data, or bad passphrase";

/// Nonce, tag and ciphertext produced by one call to [`seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub nonce: [u8; NONCE_LEN],
    pub auth_tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeJson {
    nonce: String,
    auth_tag: String,
    ciphertext: String,
}

impl SealedEnvelope {
    /// Encode as the on-disk JSON object.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let wire = EnvelopeJson {
            nonce: hex::encode(self.nonce),
            auth_tag: hex::encode(self.auth_tag),
            ciphertext: hex::encode(&self.ciphertext),
        };
        serde_json::to_vec(&wire).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Serialization,
                "failed to encode envelope",
                e,
            )
        })
    }

    /// Parse the on-disk JSON object, checking field presence, encoding and
    /// the fixed nonce and tag lengths.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let wire: EnvelopeJson = serde_json::from_slice(bytes).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::MalformedEnvelope,
                "vault file is not a sealed envelope",
                e,
            )
        })?;

        let mut nonce = [0u8; NONCE_LEN];
        decode_fixed("nonce", &wire.nonce, &mut nonce)?;
        let mut auth_tag = [0u8; TAG_LEN];
        decode_fixed("authTag", &wire.auth_tag, &mut auth_tag)?;
        let ciphertext = hex::decode(&wire.ciphertext).map_err(|e| malformed_field("ciphertext", e))?;

        Ok(Self {
            nonce,
            auth_tag,
            ciphertext,
        })
    }
}

fn decode_fixed(field: &str, encoded: &str, out: &mut [u8]) -> Result<()> {
    hex::decode_to_slice(encoded, out).map_err(|e| malformed_field(field, e))
}

fn malformed_field(field: &str, err: hex::FromHexError) -> VaultError {
    VaultError::with_kind_and_source(
        ErrorCategory::User,
        ErrorKind::MalformedEnvelope,
        format!("envelope field {} is invalid", field),
        err,
    )
}

/// Encrypt plaintext under `key` with a fresh random nonce.
pub fn seal(plaintext: &[u8], key: &DerivedKey) -> Result<SealedEnvelope> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    seal_with_nonce(plaintext, key, &nonce)
}

/// Encrypt plaintext with a caller-provided nonce.
///
/// Only for deterministic tests. Reusing a nonce under the same key breaks
/// both confidentiality and integrity; production paths go through [`seal`].
pub(crate) fn seal_with_nonce(
    plaintext: &[u8],
    key: &DerivedKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<SealedEnvelope> {
    let cipher = XSalsa20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", &mut buffer)
        .map_err(|e| {
            VaultError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::CipherFailure,
                format!("encryption failed: {}", e),
            )
        })?;

    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(tag.as_slice());

    Ok(SealedEnvelope {
        nonce: *nonce,
        auth_tag,
        ciphertext: buffer,
    })
}

/// Verify and decrypt an envelope.
///
/// The tag is checked before any plaintext is produced. A wrong key and a
/// modified envelope fail identically.
pub fn open(envelope: &SealedEnvelope, key: &DerivedKey) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = XSalsa20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    let mut buffer = Zeroizing::new(envelope.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(&envelope.nonce),
            b"",
            buffer.as_mut_slice(),
            GenericArray::from_slice(&envelope.auth_tag),
        )
        .map_err(|_| {
            VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                AUTH_FAILED_MSG,
            )
        })?;

    Ok(buffer)
}
