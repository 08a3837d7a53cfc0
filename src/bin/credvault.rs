//! credvault CLI - local credential vault
//!
//! Every invocation prompts for the master passphrase, unlocks the vault,
//! runs one subcommand and locks again.

use std::error::Error as StdError;
use std::io;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use credvault::cli::{self, Cli};
use credvault::error::VaultError;

fn main() {
    let cli = Cli::parse();

    let result = cli::load_config(&cli).and_then(|config| {
        init_tracing(&config.log_level, cli.verbose);
        let stdout = io::stdout();
        cli::run(cli, &config, &mut stdout.lock())
    });

    if let Err(e) = result {
        eprintln!("Error: {}", render_chain(&e));
        process::exit(1);
    }
}

/// `-v` forces debug for this crate; otherwise `RUST_LOG` wins over
/// configuration.
fn init_tracing(log_level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("credvault=debug,warn")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("credvault={log_level},warn")))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn render_chain(err: &VaultError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
