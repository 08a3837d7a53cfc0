//! Unlock state and the operations exposed to a front end
//!
//! A [`VaultSession`] is either locked or holds the derived key together
//! with the live record set. Every successful mutation is followed by a
//! save; a failed save is reported but the in-memory change is kept, so the
//! caller can retry or warn that the change is not on disk.

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::kdf::{self, DerivedKey, KdfParams};
use crate::record::CredentialRecord;
use crate::store::RecordStore;
use crate::vault_file::VaultFile;

const UNLOCK_FAILED_MSG: &str = "incorrect passphrase";

enum SessionState {
    Locked,
    Unlocked { key: DerivedKey, store: RecordStore },
}

pub struct VaultSession {
    file: VaultFile,
    kdf: KdfParams,
    state: SessionState,
}

impl VaultSession {
    /// A locked session over the vault at `file`.
    pub fn new(file: VaultFile, kdf: KdfParams) -> Self {
        Self {
            file,
            kdf,
            state: SessionState::Locked,
        }
    }

    pub fn vault_file(&self) -> &VaultFile {
        &self.file
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.state, SessionState::Unlocked { .. })
    }

    /// Derive the key from `passphrase` and open the vault.
    ///
    /// A wrong passphrase and a corrupt or tampered file produce the same
    /// `AuthenticationFailed` error and leave the session locked.
    pub fn unlock(&mut self, passphrase: &[u8]) -> Result<&[CredentialRecord]> {
        if self.is_unlocked() {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::AlreadyUnlocked,
                "vault is already unlocked",
            ));
        }

        let key = kdf::derive(passphrase, &self.kdf)?;
        let records = match self.file.load(&key) {
            Ok(records) => records,
            Err(e) if e.is(ErrorKind::AuthenticationFailed) || e.is(ErrorKind::MalformedEnvelope) => {
                warn!(path = %self.file.path().display(), "unlock rejected");
                return Err(VaultError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::AuthenticationFailed,
                    UNLOCK_FAILED_MSG,
                ));
            }
            Err(e) => return Err(e),
        };

        info!(path = %self.file.path().display(), records = records.len(), "vault unlocked");
        self.state = SessionState::Unlocked {
            key,
            store: RecordStore::from_records(records),
        };
        self.list_all()
    }

    /// Drop the key and record set. No-op when already locked.
    pub fn lock(&mut self) {
        if self.is_unlocked() {
            self.state = SessionState::Locked;
            info!(path = %self.file.path().display(), "vault locked");
        }
    }

    pub fn list_all(&self) -> Result<&[CredentialRecord]> {
        Ok(self.store()?.records())
    }

    pub fn search(&self, query: &str) -> Result<Vec<CredentialRecord>> {
        Ok(self.store()?.filter(query))
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<&CredentialRecord>> {
        Ok(self.store()?.find_by_id(id))
    }

    /// Insert or update a record and save.
    pub fn upsert(&mut self, record: CredentialRecord) -> Result<&[CredentialRecord]> {
        let (key, store) = unlocked_mut(&mut self.state)?;
        store.upsert(record);
        persist(&self.file, key, store)
    }

    /// Delete a record and save. Deleting an unknown id changes nothing and
    /// does not write.
    pub fn delete(&mut self, id: &str) -> Result<&[CredentialRecord]> {
        let (key, store) = unlocked_mut(&mut self.state)?;
        if !store.delete(id) {
            debug!(id, "delete: no such record");
            return Ok(store.records());
        }
        persist(&self.file, key, store)
    }

    /// Plaintext JSON of every record.
    ///
    /// The output is NOT encrypted. It exists so a user can deliberately
    /// move credentials elsewhere, and should be handled as a secret.
    pub fn export_plain(&self) -> Result<Zeroizing<Vec<u8>>> {
        let store = self.store()?;
        let json = serde_json::to_vec_pretty(store.records()).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Serialization,
                "failed to serialize records",
                e,
            )
        })?;
        info!(records = store.len(), "plaintext export produced");
        Ok(Zeroizing::new(json))
    }

    /// Merge a plaintext JSON export into the vault and save. Records whose
    /// id already exists are skipped.
    pub fn import_plain(&mut self, bytes: &[u8]) -> Result<&[CredentialRecord]> {
        let (key, store) = unlocked_mut(&mut self.state)?;
        let incoming: Vec<CredentialRecord> = serde_json::from_slice(bytes).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ImportFormat,
                "import failed: not a credential export",
                e,
            )
        })?;

        let offered = incoming.len();
        let added = store.merge(incoming);
        info!(offered, added, "import merged");
        if added == 0 {
            return Ok(store.records());
        }
        persist(&self.file, key, store)
    }

    fn store(&self) -> Result<&RecordStore> {
        match &self.state {
            SessionState::Unlocked { store, .. } => Ok(store),
            SessionState::Locked => Err(locked_error()),
        }
    }
}

// Free function so callers can borrow `file` alongside the state.
fn unlocked_mut(state: &mut SessionState) -> Result<(&DerivedKey, &mut RecordStore)> {
    match state {
        SessionState::Unlocked { key, store } => Ok((&*key, store)),
        SessionState::Locked => Err(locked_error()),
    }
}

fn persist<'a>(
    file: &VaultFile,
    key: &DerivedKey,
    store: &'a RecordStore,
) -> Result<&'a [CredentialRecord]> {
    if let Err(e) = file.save(key, store.records()) {
        warn!(path = %file.path().display(), error = %e, "save failed; in-memory changes not persisted");
        return Err(e);
    }
    Ok(store.records())
}

fn locked_error() -> VaultError {
    VaultError::with_kind(ErrorCategory::User, ErrorKind::Locked, "vault is locked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::fast_params;
    use crate::record::LoginKind;
    use std::fs;
    use tempfile::TempDir;

    fn session_in(dir: &TempDir) -> VaultSession {
        VaultSession::new(VaultFile::new(dir.path().join("passwords.enc")), fast_params())
    }

    #[test]
    fn test_starts_locked() {
        let temp_dir = TempDir::new().unwrap();
        let session = session_in(&temp_dir);
        assert!(!session.is_unlocked());
        let err = session.list_all().unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Locked));
    }

    #[test]
    fn test_mutations_require_unlock() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session_in(&temp_dir);

        let record = CredentialRecord::new("Mail", "a", "x", LoginKind::App);
        assert!(session.upsert(record).unwrap_err().is(ErrorKind::Locked));
        assert!(session.delete("1").unwrap_err().is(ErrorKind::Locked));
        assert!(session.import_plain(b"[]").unwrap_err().is(ErrorKind::Locked));
        assert!(session.export_plain().unwrap_err().is(ErrorKind::Locked));
        assert!(session.search("").unwrap_err().is(ErrorKind::Locked));
        assert!(!session.vault_file().path().exists());
    }

    #[test]
    fn test_unlock_twice_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session_in(&temp_dir);
        session.unlock(b"pw").unwrap();
        let err = session.unlock(b"pw").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::AlreadyUnlocked));
        assert!(session.is_unlocked());
    }

    #[test]
    fn test_lock_discards_records() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session_in(&temp_dir);
        session.unlock(b"pw").unwrap();
        session
            .upsert(CredentialRecord::new("Mail", "a", "x", LoginKind::App))
            .unwrap();

        session.lock();
        assert!(!session.is_unlocked());
        assert!(session.list_all().is_err());
        session.lock();
    }

    #[test]
    fn test_corrupt_file_reported_as_incorrect_passphrase() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session_in(&temp_dir);
        fs::write(session.vault_file().path(), b"{ garbage").unwrap();

        let err = session.unlock(b"pw").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert_eq!(err.to_string(), UNLOCK_FAILED_MSG);
        assert!(!session.is_unlocked());
    }

    #[test]
    fn test_delete_missing_does_not_write() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session_in(&temp_dir);
        session.unlock(b"pw").unwrap();

        let records = session.delete("nope").unwrap();
        assert!(records.is_empty());
        assert!(!session.vault_file().path().exists());
    }

    #[test]
    fn test_failed_save_keeps_mutation_in_memory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let mut session = VaultSession::new(VaultFile::new(blocker.join("passwords.enc")), fast_params());
        session.unlock(b"pw").unwrap();

        let err = session
            .upsert(CredentialRecord::new("Mail", "a", "x", LoginKind::App))
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::PersistenceFailure));
        assert_eq!(session.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_bad_import_leaves_store_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session_in(&temp_dir);
        session.unlock(b"pw").unwrap();
        session
            .upsert(CredentialRecord::new("Mail", "a", "x", LoginKind::App))
            .unwrap();

        let err = session.import_plain(b"{\"not\": \"a list\"}").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::ImportFormat));
        assert_eq!(session.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_export_then_import_elsewhere() {
        let temp_dir = TempDir::new().unwrap();
        let mut source = session_in(&temp_dir);
        source.unlock(b"pw").unwrap();
        source
            .upsert(
                CredentialRecord::new("Mail", "a@b.com", "x", LoginKind::Website)
                    .with_site_reference("mail.example.com"),
            )
            .unwrap();
        let exported = source.export_plain().unwrap();
        assert!(exported.starts_with(b"[\n  {"));

        let other_dir = TempDir::new().unwrap();
        let mut target = session_in(&other_dir);
        target.unlock(b"other").unwrap();
        let records = target.import_plain(&exported).unwrap();
        assert_eq!(records, source.list_all().unwrap());
    }
}
