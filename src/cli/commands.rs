//! Command implementations for the s83 client.

use crate::cli::render::render_digest;
use crate::config::Profile;
use crate::error::{Result, SpringError};
use crate::follow::{sync_follows, Follow, FollowClient};
use crate::identity::Creator;
use crate::miner::{mine, CancelToken};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Execute new command
pub fn new_creator(jobs: usize) -> Result<()> {
    info!("generating a new creator key with {} miners, please be patient", jobs);
    let start = Instant::now();

    let result = mine(jobs, &CancelToken::new())?;

    let elapsed = start.elapsed().as_secs_f64();
    let kps = if elapsed > 0.0 {
        (result.attempts as f64 / elapsed) as u64
    } else {
        result.attempts
    };

    println!(
        "Found a valid key in {} iterations over {} seconds ({} kps)",
        result.attempts, elapsed as u64, kps
    );
    println!("The public key is your creator id. Share it!");
    println!("The secret key is SECRET. Do not share it or lose it.");
    println!("public: {}", result.creator);
    println!("secret: {}", result.creator.export_private_key());
    Ok(())
}

/// Execute who command
pub fn who(profile: &Profile) -> Result<()> {
    print!("{profile}");
    Ok(())
}

/// Execute pub command
pub async fn publish(profile: &Profile, path: &Path, dry_run: bool) -> Result<()> {
    let creator = usable_creator(profile)?;

    let content = fs::read(path)?;
    let board = creator.publish(content)?;

    if dry_run {
        println!("This board should publish (pending TTL checks)");
        println!("Size: {}", board.content().len());
        println!("{board}");
        return Ok(());
    }

    let server = profile.server.as_ref().ok_or_else(|| {
        SpringError::config(format!(
            "missing server: add a 'server =' line to {}",
            profile.path().display()
        ))
    })?;

    FollowClient::new()?.publish(server, &board).await?;
    println!("Published {} to {}", board.publisher(), server);
    Ok(())
}

/// Execute get command
pub async fn get(
    profile: &Profile,
    key: Option<&str>,
    output: Option<PathBuf>,
    browse: bool,
    new_only: bool,
) -> Result<()> {
    let follows = match key {
        Some(key) => {
            let server = profile.server.as_ref().ok_or_else(|| {
                SpringError::config(format!(
                    "getting a single board needs a 'server =' line in {}",
                    profile.path().display()
                ))
            })?;
            vec![Follow::on_server(server, key, None)?]
        }
        None => profile.follows.clone(),
    };

    if follows.is_empty() {
        println!(
            "No follows configured. Add board URLs to {}",
            profile.path().display()
        );
        return Ok(());
    }

    let store = profile.store()?;
    let client = FollowClient::new()?;
    let report = sync_follows(&client, &follows, &store).await;

    if report.is_partial_failure() {
        warn!("failed to get {}/{} boards", report.failed, report.total);
    }
    let report = report.into_result()?;

    let new_count = report.new_count();
    if new_only && new_count == 0 {
        println!("No new boards");
        return Ok(());
    }

    let now = Utc::now();
    let html = render_digest(profile.name(), &report.boards, new_only, now)?;
    let output = output.unwrap_or_else(|| profile.digest_path(now));
    fs::write(&output, html)?;

    println!(
        "Saved {} new boards to {}",
        new_count,
        profile.data_dir().display()
    );
    println!("Published your 'Daily Spring' to: {}", output.display());

    if browse {
        match open_in_browser(&output) {
            Ok(()) => info!("opened your 'Daily Spring' in a browser"),
            Err(e) => warn!("failed launching a browser: {}", e),
        }
    }
    Ok(())
}

fn usable_creator(profile: &Profile) -> Result<&Creator> {
    let creator = profile.creator.as_ref().ok_or_else(|| {
        SpringError::config(format!(
            "no secret configured: run `s83 new`, then add a 'secret =' line to {}",
            profile.path().display()
        ))
    })?;
    if !creator.is_valid() {
        return Err(SpringError::config(format!(
            "creator key {} is outside its validity window, mine a new one with `s83 new`",
            creator
        )));
    }
    Ok(creator)
}

fn open_in_browser(path: &Path) -> Result<()> {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let status = std::process::Command::new(opener).arg(path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(SpringError::config(format!("{opener} exited with {status}")))
    }
}
