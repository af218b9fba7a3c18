//! Command-line interface for the s83 client.
//!
//! Mines creator keys, publishes boards to the profile's server and pulls
//! followed boards into a local "Daily Spring" digest.

pub mod args;
pub mod commands;
pub mod render;

use crate::config::Profile;
use crate::Result;

pub use args::{Command, Invocation};

/// Main entry point for the CLI application
pub fn run() -> Result<()> {
    let invocation = match args::parse_args(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            args::print_usage();
            std::process::exit(2);
        }
    };

    if invocation.command == Command::Help {
        args::print_usage();
        return Ok(());
    }

    let profile = Profile::load(&invocation.profile)?;

    match invocation.command {
        Command::New { jobs } => commands::new_creator(jobs),
        Command::Who => commands::who(&profile),
        Command::Pub { path, dry_run } => {
            runtime()?.block_on(commands::publish(&profile, &path, dry_run))
        }
        Command::Get {
            key,
            output,
            browse,
            new_only,
        } => runtime()?.block_on(commands::get(
            &profile,
            key.as_deref(),
            output,
            browse,
            new_only,
        )),
        Command::Help => Ok(()),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
