//! Vault file persistence
//!
//! The record set is serialized to JSON, sealed, and written as an envelope.
//! Writes go to a tempfile in the target directory which is flushed, fsynced
//! and then renamed over the vault, so a crash leaves either the old file or
//! the new one, never a partial write.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::Zeroizing;

use crate::envelope::{self, SealedEnvelope};
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::kdf::DerivedKey;
use crate::record::CredentialRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFile {
    path: PathBuf,
}

impl VaultFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and open the vault.
    ///
    /// A missing file is a fresh vault and yields an empty record set.
    pub fn load(&self, key: &DerivedKey) -> Result<Vec<CredentialRecord>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no vault file, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(read_error(&self.path, e)),
        };

        let sealed = SealedEnvelope::from_json(&bytes)?;
        let plaintext = envelope::open(&sealed, key)?;
        let records: Vec<CredentialRecord> = serde_json::from_slice(&plaintext).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::MalformedEnvelope,
                "vault payload is not a credential list",
                e,
            )
        })?;

        debug!(path = %self.path.display(), records = records.len(), "vault loaded");
        Ok(records)
    }

    /// Seal `records` and atomically replace the vault file.
    ///
    /// On failure the previous file, if any, is untouched.
    pub fn save(&self, key: &DerivedKey, records: &[CredentialRecord]) -> Result<()> {
        let payload = Zeroizing::new(serde_json::to_vec(records).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Serialization,
                "failed to serialize records",
                e,
            )
        })?);
        let sealed = envelope::seal(&payload, key)?;
        let contents = sealed.to_json()?;

        write_private(&self.path, &contents)
            .map_err(|e| e.with_context(format!("failed to save vault to {}", self.path.display())))?;

        debug!(path = %self.path.display(), records = records.len(), "vault saved");
        Ok(())
    }
}

/// Write a plaintext export readable only by its owner.
///
/// Goes through the same tempfile and rename as [`VaultFile::save`], so an
/// existing file at `path` is replaced with a fresh 0o600 inode rather than
/// truncated in place with its old mode.
pub fn write_export(path: &Path, contents: &[u8]) -> Result<()> {
    write_private(path, contents)
        .map_err(|e| e.with_context(format!("failed to write export to {}", path.display())))
}

/// Atomically replace `path` with `contents`, mode 0o600 on Unix.
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| persistence_error("failed to create directory", e))?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(".credvault-tmp")
        .tempfile_in(dir)
        .map_err(|e| persistence_error("failed to create tempfile", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| persistence_error("failed to set tempfile permissions", e))?;
    }

    temp_file
        .write_all(contents)
        .map_err(|e| persistence_error("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| persistence_error("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| persistence_error("failed to sync file prior to rename", e))?;

    temp_file.persist(path).map_err(|e| {
        persistence_error(
            format!("failed to rename to target file {}", path.display()),
            e.error,
        )
    })?;
    Ok(())
}

fn persistence_error(msg: impl Into<String>, err: io::Error) -> VaultError {
    VaultError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::PersistenceFailure, msg, err)
}

fn read_error(path: &Path, err: io::Error) -> VaultError {
    let category = if err.kind() == io::ErrorKind::PermissionDenied {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    VaultError::with_kind_and_source(
        category,
        ErrorKind::ReadFailure,
        format!("failed to read from {}", path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{self, fast_params};
    use crate::record::LoginKind;
    use crate::store::RecordStore;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn sample_records() -> Vec<CredentialRecord> {
        let mut store = RecordStore::new();
        store.upsert(
            CredentialRecord::new("Mail", "a@b.com", "x", LoginKind::Website)
                .with_site_reference("mail.example.com"),
        );
        store.upsert(CredentialRecord::new("Router", "admin", "y", LoginKind::System).with_notes("closet"));
        store.into_records()
    }

    #[test]
    fn test_missing_file_is_empty_vault() {
        let temp_dir = TempDir::new().unwrap();
        let file = VaultFile::new(temp_dir.path().join("passwords.enc"));
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();

        assert!(file.load(&key).unwrap().is_empty());
        assert!(!file.path().exists());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let file = VaultFile::new(temp_dir.path().join("passwords.enc"));
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();
        let records = sample_records();

        file.save(&key, &records).unwrap();
        assert_eq!(file.load(&key).unwrap(), records);
    }

    #[test]
    fn test_file_does_not_contain_plaintext() {
        let temp_dir = TempDir::new().unwrap();
        let file = VaultFile::new(temp_dir.path().join("passwords.enc"));
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();
        file.save(&key, &sample_records()).unwrap();

        let on_disk = fs::read_to_string(file.path()).unwrap();
        assert!(!on_disk.contains("a@b.com"));
        assert!(!on_disk.contains("closet"));
        let json: serde_json::Value = serde_json::from_str(&on_disk).unwrap();
        assert!(json.get("nonce").is_some());
        assert!(json.get("authTag").is_some());
        assert!(json.get("ciphertext").is_some());
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let temp_dir = TempDir::new().unwrap();
        let file = VaultFile::new(temp_dir.path().join("passwords.enc"));
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();
        file.save(&key, &sample_records()).unwrap();

        let wrong = kdf::derive(b"wrong", &fast_params()).unwrap();
        let err = file.load(&wrong).expect_err("expected authentication failure");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_garbage_file_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwords.enc");
        fs::write(&path, b"definitely not an envelope").unwrap();
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();

        let err = VaultFile::new(&path).load(&key).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_authenticated_non_record_payload_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwords.enc");
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();
        let sealed = envelope::seal(b"{\"not\": \"a list\"}", &key).unwrap();
        fs::write(&path, sealed.to_json().unwrap()).unwrap();

        let err = VaultFile::new(&path).load(&key).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_directory_at_path_is_read_failure() {
        let temp_dir = TempDir::new().unwrap();
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();

        let err = VaultFile::new(temp_dir.path()).load(&key).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::ReadFailure));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let file = VaultFile::new(temp_dir.path().join("nested/deeper/passwords.enc"));
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();

        file.save(&key, &[]).unwrap();
        assert!(file.load(&key).unwrap().is_empty());
    }

    #[test]
    fn test_save_leaves_no_tempfiles() {
        let temp_dir = TempDir::new().unwrap();
        let file = VaultFile::new(temp_dir.path().join("passwords.enc"));
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();
        file.save(&key, &sample_records()).unwrap();
        file.save(&key, &[]).unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, ["passwords.enc"]);
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwords.enc");
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();
        let records = sample_records();
        VaultFile::new(&path).save(&key, &records).unwrap();

        // A regular file in place of the parent directory makes the write fail.
        let blocked = VaultFile::new(path.join("child.enc"));
        let err = blocked.save(&key, &[]).expect_err("expected persistence failure");
        assert_eq!(err.kind, Some(ErrorKind::PersistenceFailure));

        assert_eq!(VaultFile::new(&path).load(&key).unwrap(), records);
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let file = VaultFile::new(temp_dir.path().join("passwords.enc"));
        let key = kdf::derive(b"hunter2", &fast_params()).unwrap();
        file.save(&key, &sample_records()).unwrap();

        let metadata = fs::metadata(file.path()).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    #[cfg(unix)]
    fn test_write_export_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("export.json");
        write_export(&path, b"[]").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"[]");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    #[cfg(unix)]
    fn test_write_export_over_readable_file_restricts_mode() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("export.json");
        fs::write(&path, b"old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_export(&path, b"[{\"password\": \"x\"}]").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"[{\"password\": \"x\"}]");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_write_export_under_regular_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        let err = write_export(&blocker.join("export.json"), b"[]").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::PersistenceFailure));
    }
}
