//! Command-line argument parsing for s83.

use crate::config::DEFAULT_PROFILE;
use crate::error::{Result, SpringError};
use std::path::PathBuf;

/// Client commands
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    New {
        jobs: usize,
    },
    Who,
    Pub {
        path: PathBuf,
        dry_run: bool,
    },
    Get {
        key: Option<String>,
        output: Option<PathBuf>,
        browse: bool,
        new_only: bool,
    },
    Help,
}

/// A parsed invocation: which profile, and what to do with it.
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub profile: String,
    pub command: Command,
}

/// Parses arguments (without the program name) into an [`Invocation`].
pub fn parse_args<I>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    let mut profile = DEFAULT_PROFILE.to_string();

    // global flags come before the command
    while let Some(arg) = args.peek() {
        match arg.as_str() {
            "-c" => {
                args.next();
                profile = args
                    .next()
                    .ok_or_else(|| usage("-c requires a profile name"))?;
            }
            "-h" | "--help" => {
                return Ok(Invocation {
                    profile,
                    command: Command::Help,
                })
            }
            _ => break,
        }
    }

    let Some(name) = args.next() else {
        return Err(usage("missing command"));
    };
    let rest: Vec<String> = args.collect();

    let command = match name.as_str() {
        "new" => parse_new(&rest)?,
        "who" => {
            if let Some(extra) = rest.first() {
                return Err(usage(format!("who takes no arguments, got '{extra}'")));
            }
            Command::Who
        }
        "pub" => parse_pub(&rest)?,
        "get" => parse_get(&rest)?,
        "help" => Command::Help,
        other => return Err(usage(format!("unknown command '{other}'"))),
    };

    Ok(Invocation { profile, command })
}

fn parse_new(args: &[String]) -> Result<Command> {
    let mut jobs = 1usize;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-j" => {
                let value = iter.next().ok_or_else(|| usage("-j requires a number"))?;
                jobs = value
                    .parse()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| usage(format!("invalid miner count '{value}'")))?;
            }
            other => return Err(usage(format!("unexpected argument to new: '{other}'"))),
        }
    }
    Ok(Command::New { jobs })
}

fn parse_pub(args: &[String]) -> Result<Command> {
    let mut dry_run = false;
    let mut path = None;
    for arg in args {
        match arg.as_str() {
            "--dry" | "-dry" => dry_run = true,
            flag if flag.starts_with('-') => {
                return Err(usage(format!("unknown flag to pub: '{flag}'")))
            }
            value => {
                if path.replace(PathBuf::from(value)).is_some() {
                    return Err(usage("pub takes exactly one <path>"));
                }
            }
        }
    }
    let path = path.ok_or_else(|| usage("<path> to the file to publish is required"))?;
    Ok(Command::Pub { path, dry_run })
}

fn parse_get(args: &[String]) -> Result<Command> {
    let mut key = None;
    let mut output = None;
    let mut browse = false;
    let mut new_only = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" => {
                let value = iter.next().ok_or_else(|| usage("-o requires a path"))?;
                output = Some(PathBuf::from(value));
            }
            "--go" | "-go" => browse = true,
            "--new" | "-new" => new_only = true,
            flag if flag.starts_with('-') => {
                return Err(usage(format!("unknown flag to get: '{flag}'")))
            }
            value => {
                if key.replace(value.to_string()).is_some() {
                    return Err(usage("get takes at most one [key]"));
                }
            }
        }
    }

    Ok(Command::Get {
        key,
        output,
        browse,
        new_only,
    })
}

fn usage(msg: impl ToString) -> SpringError {
    SpringError::config(msg)
}

/// Print usage information
pub fn print_usage() {
    println!("s83 - Spring '83 client");
    println!();
    println!("Usage: s83 [-c <profile>] <command> [args...]");
    println!();
    println!("Commands:");
    println!("  pub [--dry] <path>                   Publish a board");
    println!("  get [--new] [--go] [-o <path>] [key] Download follows and make your 'Daily Spring'");
    println!("  new [-j <miners>]                    Generate a new keypair");
    println!("  who                                  Show profile information");
    println!();
    println!("Flags:");
    println!("  -c <profile>   Name of the profile to use (default: {DEFAULT_PROFILE})");
    println!();
    println!("Examples:");
    println!("  s83 new -j 8");
    println!("  s83 pub --dry board.html");
    println!("  s83 -c work get --new -o today.html");
}
