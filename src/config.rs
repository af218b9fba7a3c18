//! Client profiles.
//!
//! A profile is a small text file at `<config>/s83/<name>`:
//!
//! ```text
//! secret = <64 hex chars>
//! server = https://bogbody.biz
//!
//! alice
//! https://bogbody.biz/<alice's key>
//! ```
//!
//! The file holds a private key, so it is created with mode `0600` and
//! refused when its permissions are any wider. Local copies of followed
//! boards live in `<config>/s83/data/<name>/`.

use crate::error::{Result, SpringError};
use crate::follow::{parse_follows, Follow};
use crate::identity::Creator;
use crate::store::Store;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Url;
use std::env;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Profile used when none is named
pub const DEFAULT_PROFILE: &str = "default";

const BLANK_PROFILE: &str = "public =\nsecret =\nserver =\n";

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^secret\s*=\s*([0-9A-Fa-f]{64})[ \t\r]*$").expect("static secret pattern compiles")
    })
}

fn server_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^server\s*=[ \t]*(.*?)[ \t\r]*$").expect("static server pattern compiles")
    })
}

/// `$XDG_CONFIG_HOME/s83`, falling back to `$HOME/.config/s83`.
pub fn config_root() -> Result<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => {
            let home = env::var_os("HOME")
                .ok_or_else(|| SpringError::config("HOME environment variable not set"))?;
            Path::new(&home).join(".config")
        }
    };
    Ok(base.join("s83"))
}

/// A loaded client profile.
#[derive(Debug)]
pub struct Profile {
    name: String,
    root: PathBuf,
    pub creator: Option<Creator>,
    pub server: Option<Url>,
    pub follows: Vec<Follow>,
}

impl Profile {
    /// Builds a profile from file contents. Invalid `secret` or `server`
    /// values are logged and left unset.
    pub fn parse(name: &str, root: &Path, text: &str) -> Self {
        let server = server_pattern()
            .captures(text)
            .map(|caps| caps[1].to_string())
            .filter(|s| !s.is_empty())
            .and_then(|s| match Url::parse(&s) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
                Ok(url) => {
                    warn!("invalid server {url}: must be http or https");
                    None
                }
                Err(e) => {
                    warn!("invalid server {s}: {e}");
                    None
                }
            });

        let creator = secret_pattern().captures(text).and_then(|caps| {
            Creator::from_private_hex(&caps[1])
                .map_err(|e| warn!("invalid secret: {e}"))
                .ok()
        });

        Self {
            name: name.to_string(),
            root: root.to_path_buf(),
            creator,
            server,
            follows: parse_follows(text),
        }
    }

    /// Loads profile `name` from the user's config directory.
    pub fn load(name: &str) -> Result<Self> {
        Self::load_from(&config_root()?, name)
    }

    /// Loads profile `name` from `root`, creating a blank profile and the
    /// data directory on first use.
    pub fn load_from(root: &Path, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(SpringError::config(format!("invalid profile name: {name:?}")));
        }

        let path = root.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("profile did not exist, initializing {}", path.display());
                init_profile(root, &path)?
            }
            Err(e) => return Err(e.into()),
        };
        check_permissions(&path)?;

        let profile = Self::parse(name, root, &text);
        create_private_dir(&profile.data_dir())?;
        Ok(profile)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the profile file.
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    /// Directory holding local copies of followed boards.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data").join(&self.name)
    }

    /// Opens the local board store.
    pub fn store(&self) -> Result<Store> {
        Store::open(self.data_dir())
    }

    /// Default location for a digest rendered at `now`.
    pub fn digest_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.data_dir()
            .join(now.format("daily-spring-%Y-%m-%dT%H:%M:%S.html").to_string())
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name    : {}", self.name)?;
        writeln!(f, "path    : {}", self.path().display())?;
        match &self.server {
            Some(server) => writeln!(f, "server  : {server}")?,
            None => writeln!(f, "server  :")?,
        }
        match &self.creator {
            Some(creator) => writeln!(f, "pub     : {creator}")?,
            None => writeln!(f, "pub     :")?,
        }
        writeln!(f, "---------")?;
        writeln!(f, "follows :")?;
        for follow in &self.follows {
            writeln!(f, "{follow}")?;
        }
        Ok(())
    }
}

fn init_profile(root: &Path, path: &Path) -> Result<String> {
    create_private_dir(root)?;
    let mut file = open_new_private(path)?;
    file.write_all(BLANK_PROFILE.as_bytes())?;
    Ok(BLANK_PROFILE.to_string())
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)?.permissions().mode() & 0o777;
    if mode != 0o600 {
        return Err(SpringError::config(format!(
            "insecure profile {} has mode {mode:o}, must be 600 to protect your private key",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(unix)]
fn open_new_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_new_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}
