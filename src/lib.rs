//! credvault - local credential vault sealed under a single master passphrase
//!
//! The vault is one file holding an authenticated secretbox envelope whose
//! plaintext is the JSON list of credential records. The key comes from
//! scrypt over the master passphrase and lives only inside an unlocked
//! [`session::VaultSession`].

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod passphrase;
pub mod record;
pub mod session;
pub mod store;
pub mod vault_file;
