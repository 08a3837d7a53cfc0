//! Configuration loading using Figment for layered config merging.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `~/.config/credvault/credvault.toml` (user config)
//! 3. `./credvault.toml` (local directory)
//! 4. `CREDVAULT_*` environment variables
//!
//! An explicit config file replaces layers 2 and 3.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::kdf::KdfParams;

pub const APP_NAME: &str = "credvault";

/// File name of the vault inside the data directory.
pub const VAULT_FILE_NAME: &str = "passwords.enc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Location of the encrypted vault. Defaults to the per-user data
    /// directory.
    #[serde(default)]
    pub vault_path: Option<PathBuf>,

    /// Default log filter level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub kdf: KdfParams,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            vault_path: None,
            log_level: default_log_level(),
            kdf: KdfParams::default(),
        }
    }
}

impl VaultConfig {
    /// The configured vault path, or `<data dir>/credvault/passwords.enc`.
    pub fn resolved_vault_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.vault_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or_else(|| {
            VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                "cannot determine data directory; set vault_path",
            )
        })?;
        Ok(data_dir.join(APP_NAME).join(VAULT_FILE_NAME))
    }
}

/// Load configuration from the standard locations with env var overrides.
pub fn load_config() -> Result<VaultConfig> {
    let user_file = dirs::config_dir()
        .map(|d| d.join(APP_NAME).join("credvault.toml"))
        .unwrap_or_default();

    extract(
        Figment::new()
            .merge(Serialized::defaults(VaultConfig::default()))
            .merge(Toml::file(user_file))
            .merge(Toml::file("credvault.toml"))
            .merge(env_provider()),
    )
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<VaultConfig> {
    if !path.is_file() {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::Config,
            format!("config file {} not found", path.display()),
        ));
    }
    extract(
        Figment::new()
            .merge(Serialized::defaults(VaultConfig::default()))
            .merge(Toml::file(path))
            .merge(env_provider()),
    )
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<VaultConfig> {
    extract(
        Figment::new()
            .merge(Serialized::defaults(VaultConfig::default()))
            .merge(Toml::string(toml_content)),
    )
}

/// `CREDVAULT_KDF_LOG_N` maps to `kdf.log_n`; top-level keys keep their
/// underscores.
fn env_provider() -> Env {
    Env::prefixed("CREDVAULT_").map(|key| key.as_str().replacen("kdf_", "kdf.", 1).into())
}

fn extract(figment: Figment) -> Result<VaultConfig> {
    figment.extract().map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Config,
            "invalid configuration",
            e,
        )
    })
}
