//! Flat-file board store with a write-through cache.
//!
//! On disk a board is a file named `<key>.s83`: the first line is the hex
//! signature and everything after the newline is the content. The directory
//! is the source of truth; the cache keeps every live board in memory so a
//! read-heavy server rarely touches the disk.
//!
//! ## Concurrency
//!
//! Readers take the cache read lock only. `add`, `remove` and cache misses
//! take a store-wide write mutex first, so two writers never race on the same
//! file and a miss can never resurrect a board that is being removed. Files
//! are written to a temporary name and renamed into place, so a crashed write
//! never leaves a half-written board behind.
//!
//! The store works the same for servers and for a client's local copies.

use crate::board::Board;
use crate::error::{Result, SpringError};
use crate::identity::Publisher;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// File extension for stored boards
pub const BOARD_EXT: &str = "s83";

/// Directory-backed board repository.
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    /// Every live board, keyed by lowercase hex publisher key.
    cache: RwLock<HashMap<String, Board>>,
    /// Serialises disk mutation.
    write_lock: Mutex<()>,
}

impl Store {
    /// Opens a store over an existing directory, loading and validating every
    /// `*.s83` file in it. Files that fail validation are logged and skipped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let dir = fs::canonicalize(path.as_ref())?;
        if !fs::metadata(&dir)?.is_dir() {
            return Err(SpringError::NotADirectory(dir.display().to_string()));
        }

        let mut boards = HashMap::new();
        let mut misnamed = Vec::new();
        let mut rejected = 0usize;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BOARD_EXT) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match load_board(&path, key) {
                Ok(board) if board.key() != key => misnamed.push((path, board)),
                Ok(board) => {
                    boards.insert(board.key(), board);
                }
                Err(e) => {
                    warn!("bad board at {}: {}", path.display(), e);
                    rejected += 1;
                }
            }
        }

        // files named by a non-lowercase key are moved to the lowercase name,
        // unless a board at least as new already lives there
        for (path, board) in misnamed {
            let key = board.key();
            match boards.get(&key) {
                Some(current) if !board.is_after(current) => {
                    warn!(key = %key, "discarding stale board at {}", path.display());
                    fs::remove_file(&path)?;
                }
                _ => {
                    info!(key = %key, "renaming board at {}", path.display());
                    fs::rename(&path, dir.join(format!("{key}.{BOARD_EXT}")))?;
                    boards.insert(key, board);
                }
            }
        }

        info!(
            boards = boards.len(),
            rejected,
            "loaded store {}",
            dir.display()
        );

        Ok(Self {
            dir,
            cache: RwLock::new(boards),
            write_lock: Mutex::new(()),
        })
    }

    /// The absolute directory this store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetches the board for `key`.
    ///
    /// Cache hits return immediately. A miss reads and validates the file and
    /// caches it only if it is a valid board.
    pub fn get(&self, key: &str) -> Result<Board> {
        let key = canonical_key(key)?;
        if let Some(board) = self.read_cache().get(&key) {
            return Ok(board.clone());
        }

        let _guard = self.lock_writes();
        // another miss may have filled it while we waited
        if let Some(board) = self.read_cache().get(&key) {
            return Ok(board.clone());
        }

        let path = self.path_for(&key);
        let board = load_board(&path, &key).map_err(|e| {
            if e.is_not_found() {
                SpringError::not_found(&key)
            } else {
                e
            }
        })?;
        debug!(key = %key, "cached board from disk");
        self.write_cache().insert(key, board.clone());
        Ok(board)
    }

    /// Writes `board`, replacing any previous board for the same key.
    ///
    /// Returns true when the key had no live board before, i.e. `count()`
    /// grew. A corrupt file left on disk for the key does not count.
    pub fn add(&self, board: &Board) -> Result<bool> {
        let key = board.key();
        let _guard = self.lock_writes();

        self.write_file(&key, &board.to_bytes())?;
        let previous = self.write_cache().insert(key, board.clone());

        Ok(previous.is_none())
    }

    /// Deletes the board for `key` from the cache and from disk.
    pub fn remove(&self, key: &str) -> Result<()> {
        let key = canonical_key(key)?;
        let _guard = self.lock_writes();

        let cached = self.write_cache().remove(&key).is_some();
        match fs::remove_file(self.path_for(&key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if cached {
                    // the file went missing underneath us, the board is gone either way
                    warn!(key = %key, "removed cached board with no backing file");
                    Ok(())
                } else {
                    Err(SpringError::not_found(&key))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of live boards. Always equals the number of keys `get` can return.
    pub fn count(&self) -> usize {
        self.read_cache().len()
    }

    /// Keys of every live board.
    pub fn keys(&self) -> Vec<String> {
        self.read_cache().keys().cloned().collect()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{BOARD_EXT}"))
    }

    fn write_file(&self, key: &str, data: &[u8]) -> Result<()> {
        let tmp = self.dir.join(format!(".{key}.{BOARD_EXT}.tmp"));
        {
            let mut file = open_private(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.path_for(key))?;
        Ok(())
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, Board>> {
        self.cache.read().unwrap_or_else(|poisoned| {
            warn!("store cache lock was poisoned on read, recovering");
            poisoned.into_inner()
        })
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, Board>> {
        self.cache.write().unwrap_or_else(|poisoned| {
            warn!("store cache lock was poisoned on write, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| {
            warn!("store write lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Normalises a key to lowercase hex, rejecting anything that is not a key.
/// Keeps arbitrary strings out of file paths.
fn canonical_key(key: &str) -> Result<String> {
    Ok(Publisher::from_hex(key)?.to_hex())
}

fn load_board(path: &Path, key: &str) -> Result<Board> {
    let data = fs::read(path)?;
    Board::from_bytes(key, &data)
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}
