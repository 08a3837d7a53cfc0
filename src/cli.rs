//! Command-line front end
//!
//! Each subcommand unlocks the vault, performs one session operation and
//! exits. Secret values are never written to stdout.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use zeroize::Zeroizing;

use crate::config::{self, VaultConfig};
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};
use crate::record::{self, CredentialRecord, LoginKind};
use crate::session::VaultSession;
use crate::vault_file::{self, VaultFile};

#[derive(Parser, Debug)]
#[command(name = "credvault")]
#[command(version)]
#[command(about = "Local credential vault.", long_about = None)]
pub struct Cli {
    /// Read the master passphrase from stdin instead of from terminal. A
    /// trailing newline is ignored.
    #[arg(long, global = true)]
    pub passphrase_stdin: bool,

    /// Path to the vault file, overriding configuration
    #[arg(long, global = true, value_name = "FILE")]
    pub vault: Option<PathBuf>,

    /// Load configuration from this file instead of the default locations
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level, ignoring RUST_LOG and configuration
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Website,
    App,
    System,
    Other,
}

impl From<KindArg> for LoginKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Website => LoginKind::Website,
            KindArg::App => LoginKind::App,
            KindArg::System => LoginKind::System,
            KindArg::Other => LoginKind::Other,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all records
    #[command(alias = "ls")]
    List,

    /// List records whose title, username, website or notes contain QUERY
    Search {
        query: String,
    },

    /// Print one record, including its secret value
    Show {
        #[arg(long)]
        id: String,
    },

    /// Add a record; the secret is prompted for unless --password or
    /// --generate is given
    Add {
        #[arg(long)]
        title: String,

        #[arg(long)]
        username: String,

        #[arg(long, conflicts_with = "generate")]
        password: Option<String>,

        /// Use a random secret value
        #[arg(long)]
        generate: bool,

        /// Length of the generated secret [default: 16]
        #[arg(long, requires = "generate", value_parser = clap::value_parser!(u16).range(1..=1024))]
        length: Option<u16>,

        #[arg(long, value_enum, default_value = "website")]
        kind: KindArg,

        #[arg(long, default_value = "")]
        website: String,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Change fields of an existing record
    Edit {
        #[arg(long)]
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long, conflicts_with = "generate")]
        password: Option<String>,

        /// Replace the secret value with a random one
        #[arg(long)]
        generate: bool,

        /// Length of the generated secret [default: 16]
        #[arg(long, requires = "generate", value_parser = clap::value_parser!(u16).range(1..=1024))]
        length: Option<u16>,

        #[arg(long, value_enum)]
        kind: Option<KindArg>,

        #[arg(long)]
        website: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a record
    #[command(alias = "rm")]
    Delete {
        #[arg(long)]
        id: String,
    },

    /// Write every record, UNENCRYPTED, to a JSON file
    Export {
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Merge records from a plaintext JSON export; existing ids are kept
    Import {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

/// Resolve configuration from `--config` or the default locations, then
/// apply `--vault`.
pub fn load_config(cli: &Cli) -> Result<VaultConfig> {
    let mut config = match &cli.config {
        Some(path) => config::load_config_from_path(path)?,
        None => config::load_config()?,
    };
    if let Some(vault) = &cli.vault {
        config.vault_path = Some(vault.clone());
    }
    Ok(config)
}

/// Execute one subcommand, writing listings to `out`.
pub fn run(cli: Cli, config: &VaultConfig, out: &mut dyn Write) -> Result<()> {
    let mut reader = passphrase_reader(cli.passphrase_stdin);
    let mut session = VaultSession::new(
        VaultFile::new(config.resolved_vault_path()?),
        config.kdf.clone(),
    );

    let passphrase = checked_passphrase(reader.read_passphrase()?)?;
    session.unlock(&passphrase)?;
    drop(passphrase);

    let result = execute(cli.command, &mut session, out);
    session.lock();
    result
}

fn execute(command: Commands, session: &mut VaultSession, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::List => print_records(out, session.list_all()?),
        Commands::Search { query } => print_records(out, &session.search(&query)?),
        Commands::Show { id } => {
            let record = session.find_by_id(&id)?.ok_or_else(|| no_such_record(&id))?;
            print_record_details(out, record)
        }
        Commands::Add {
            title,
            username,
            password,
            generate,
            length,
            kind,
            website,
            notes,
        } => {
            let secret = match new_secret(password, generate, length) {
                Some(secret) => secret,
                None => Zeroizing::new(prompt_secret()?),
            };
            let mut record = CredentialRecord::new(title, username, "", kind.into())
                .with_site_reference(website)
                .with_notes(notes);
            record.secret_value = secret;
            let records = session.upsert(record)?;
            match records.last() {
                Some(added) => print_line(out, &added.id),
                None => Ok(()),
            }
        }
        Commands::Edit {
            id,
            title,
            username,
            password,
            generate,
            length,
            kind,
            website,
            notes,
        } => {
            let mut record = session
                .find_by_id(&id)?
                .cloned()
                .ok_or_else(|| no_such_record(&id))?;
            if let Some(title) = title {
                record.title = title;
            }
            if let Some(username) = username {
                record.username = username;
            }
            if let Some(secret) = new_secret(password, generate, length) {
                record.secret_value = secret;
            }
            if let Some(kind) = kind {
                record.login_kind = kind.into();
            }
            if let Some(website) = website {
                record.site_reference = website;
            }
            if let Some(notes) = notes {
                record.notes = notes;
            }
            session.upsert(record)?;
            Ok(())
        }
        Commands::Delete { id } => {
            session.delete(&id)?;
            Ok(())
        }
        Commands::Export { output } => {
            let json = session.export_plain()?;
            vault_file::write_export(&output, &json)?;
            eprintln!(
                "warning: {} is NOT encrypted; anyone who can read it sees every secret",
                output.display()
            );
            Ok(())
        }
        Commands::Import { input } => {
            let bytes = read_import(&input)?;
            let before = session.list_all()?.len();
            let after = session.import_plain(&bytes)?.len();
            print_line(out, &format!("imported {} record(s)", after - before))
        }
    }
}

/// Drop a trailing line ending and refuse a blank passphrase.
fn checked_passphrase(mut passphrase: Zeroizing<Vec<u8>>) -> Result<Zeroizing<Vec<u8>>> {
    while matches!(passphrase.last(), Some(b'\n' | b'\r')) {
        passphrase.pop();
    }
    if passphrase.iter().all(u8::is_ascii_whitespace) {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::PassphraseUnavailable,
            "master passphrase must not be empty",
        ));
    }
    Ok(passphrase)
}

/// The secret given on the command line or generated, if either was asked for.
fn new_secret(password: Option<String>, generate: bool, length: Option<u16>) -> Option<Zeroizing<String>> {
    if generate {
        let length = length.map_or(record::DEFAULT_SECRET_LEN, usize::from);
        return Some(record::generate_secret(length));
    }
    password.map(Zeroizing::new)
}

fn no_such_record(id: &str) -> VaultError {
    VaultError::new(ErrorCategory::User, format!("no record with id {}", id))
}

fn passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader::new())
    }
}

fn prompt_secret() -> Result<String> {
    let mut bytes = TerminalPassphraseReader::with_prompt("Secret value: ").read_passphrase()?;
    String::from_utf8(std::mem::take(&mut *bytes)).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::PassphraseUnavailable,
            "secret value is not valid UTF-8",
            e,
        )
    })
}

fn read_import(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to read from {}", path.display()),
            e,
        )
    })
}

fn print_records(out: &mut dyn Write, records: &[CredentialRecord]) -> Result<()> {
    for record in records {
        print_line(
            out,
            &format!(
                "{}\t{}\t{}\t{}\t{}",
                record.id, record.title, record.username, record.login_kind, record.site_reference
            ),
        )?;
    }
    Ok(())
}

fn print_record_details(out: &mut dyn Write, record: &CredentialRecord) -> Result<()> {
    print_line(out, &format!("id:       {}", record.id))?;
    print_line(out, &format!("title:    {}", record.title))?;
    print_line(out, &format!("username: {}", record.username))?;
    print_line(out, &format!("password: {}", record.secret()))?;
    print_line(out, &format!("kind:     {}", record.login_kind))?;
    if record.login_kind.uses_site_reference() {
        print_line(out, &format!("website:  {}", record.site_reference))?;
    }
    print_line(out, &format!("notes:    {}", record.notes))?;
    print_line(out, &format!("created:  {}", record.created_at))?;
    print_line(out, &format!("modified: {}", record.modified_at))
}

fn print_line(out: &mut dyn Write, line: &str) -> Result<()> {
    writeln!(out, "{}", line).map_err(|e| {
        VaultError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, "failed to write output", e)
    })
}
