//! In-memory credential set
//!
//! Pure operations over an insertion-ordered list of records. Nothing here
//! touches the filesystem; [`crate::session::VaultSession`] pairs every
//! mutation with a save.

use uuid::Uuid;

use crate::record::{self, CredentialRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStore {
    records: Vec<CredentialRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<CredentialRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CredentialRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Insert a new record or replace an existing one in place.
    ///
    /// A record whose id is empty, or names no stored record, is appended
    /// under a freshly generated id with `created_at == modified_at`. A
    /// record whose id matches replaces the stored one at the same position,
    /// keeping the stored `created_at`.
    pub fn upsert(&mut self, mut record: CredentialRecord) -> &[CredentialRecord] {
        let now = record::now();
        clear_unused_site(&mut record);

        let position = if record.id.is_empty() {
            None
        } else {
            self.records.iter().position(|r| r.id == record.id)
        };

        match position {
            Some(idx) => {
                let existing = &mut self.records[idx];
                record.created_at = existing.created_at;
                record.modified_at = now.max(existing.created_at);
                *existing = record;
            }
            None => {
                record.id = new_id();
                record.created_at = now;
                record.modified_at = now;
                self.records.push(record);
            }
        }

        &self.records
    }

    /// Remove the record with `id`. Returns whether anything was removed;
    /// an unknown id is not an error.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        self.records.len() != before
    }

    /// Records whose title, username, site reference or notes contain
    /// `query`, ignoring case. An empty query returns everything.
    pub fn filter(&self, query: &str) -> Vec<CredentialRecord> {
        if query.is_empty() {
            return self.records.clone();
        }
        let needle = query.to_lowercase();
        self.records
            .iter()
            .filter(|r| r.matches(&needle))
            .cloned()
            .collect()
    }

    /// Union by id, keeping the stored record on collision. Incoming
    /// records without an id get a fresh one. Returns the number added.
    ///
    /// Added records keep their timestamps, except that `modified_at` is
    /// raised to `created_at` when an export carried it older or missing.
    pub fn merge(&mut self, incoming: Vec<CredentialRecord>) -> usize {
        let mut added = 0;
        for mut record in incoming {
            if record.id.is_empty() {
                record.id = new_id();
            } else if self.find_by_id(&record.id).is_some() {
                continue;
            }
            clear_unused_site(&mut record);
            record.modified_at = record.modified_at.max(record.created_at);
            self.records.push(record);
            added += 1;
        }
        added
    }

    pub fn into_records(self) -> Vec<CredentialRecord> {
        self.records
    }
}

fn clear_unused_site(record: &mut CredentialRecord) {
    if !record.login_kind.uses_site_reference() {
        record.site_reference.clear();
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}
