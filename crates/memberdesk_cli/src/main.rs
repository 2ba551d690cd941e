//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `memberdesk_core` linkage and database bootstrap end to end.
//! - Print the member table and status summary for a database.

use clap::Parser;
use memberdesk_core::{default_log_level, init_logging, MemberStore, StoreConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "memberdesk", version, about = "Inspect a membership database")]
struct Args {
    /// SQLite database file. Uses a throwaway in-memory database when absent.
    #[arg(long, env = "MEMBERDESK_DB")]
    db: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files. Logging stays off when absent.
    #[arg(long)]
    log_dir: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(log_dir) = args.log_dir.as_deref() {
        let level = args.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("memberdesk: {err}");
            return ExitCode::FAILURE;
        }
    }

    println!("memberdesk_core ping={}", memberdesk_core::ping());
    println!("memberdesk_core version={}", memberdesk_core::core_version());

    let config = match args.db {
        Some(path) => StoreConfig::file(path),
        None => StoreConfig::default(),
    };

    let store = match MemberStore::try_new(config.into_provider()) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("memberdesk: cannot open member store: {err}");
            return ExitCode::FAILURE;
        }
    };

    match store.print_all_members() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("memberdesk: cannot list members: {err}");
            ExitCode::FAILURE
        }
    }
}
