//! Credential records and their JSON interchange shape
//!
//! Field names on the wire are fixed (`password`, `loginType`, `website`,
//! `created`, `modified`) so exported files stay importable.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// What kind of login a record describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginKind {
    #[default]
    Website,
    App,
    System,
    Other,
}

impl LoginKind {
    /// Whether `site_reference` carries meaning for this kind.
    pub fn uses_site_reference(self) -> bool {
        matches!(self, LoginKind::Website)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoginKind::Website => "website",
            LoginKind::App => "app",
            LoginKind::System => "system",
            LoginKind::Other => "other",
        }
    }
}

impl fmt::Display for LoginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialRecord {
    pub id: String,
    pub title: String,
    pub username: String,
    #[serde(rename = "password")]
    pub secret_value: Zeroizing<String>,
    #[serde(rename = "loginType")]
    pub login_kind: LoginKind,
    #[serde(rename = "website")]
    pub site_reference: String,
    pub notes: String,
    #[serde(rename = "created", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "modified", with = "chrono::serde::ts_milliseconds")]
    pub modified_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// A record without an id; the store assigns one on first upsert.
    pub fn new(
        title: impl Into<String>,
        username: impl Into<String>,
        secret_value: impl Into<String>,
        login_kind: LoginKind,
    ) -> Self {
        Self {
            title: title.into(),
            username: username.into(),
            secret_value: Zeroizing::new(secret_value.into()),
            login_kind,
            ..Self::default()
        }
    }

    pub fn with_site_reference(mut self, site: impl Into<String>) -> Self {
        self.site_reference = site.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret_value
    }

    /// Case-insensitive substring match over the searchable fields.
    /// `needle` must already be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        [
            &self.title,
            &self.username,
            &self.site_reference,
            &self.notes,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("username", &self.username)
            .field("secret_value", &"***")
            .field("login_kind", &self.login_kind)
            .field("site_reference", &self.site_reference)
            .field("notes", &self.notes)
            .field("created_at", &self.created_at)
            .field("modified_at", &self.modified_at)
            .finish()
    }
}

/// Characters drawn from by [`generate_secret`].
pub const SECRET_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()_-+=<>?";

/// Length of a generated secret when none is requested.
pub const DEFAULT_SECRET_LEN: usize = 16;

/// A random secret value of `length` characters from [`SECRET_CHARSET`],
/// drawn uniformly from the OS RNG.
pub fn generate_secret(length: usize) -> Zeroizing<String> {
    let mut secret = Zeroizing::new(String::with_capacity(length));
    for _ in 0..length {
        let idx = OsRng.gen_range(0..SECRET_CHARSET.len());
        secret.push(char::from(SECRET_CHARSET[idx]));
    }
    secret
}

/// Current time at the precision records are persisted with, so a record
/// compares equal to itself after a save/load cycle.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
