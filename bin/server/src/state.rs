//! Shared server state and the board admission rules.

use crate::config::ServerConfig;
use chrono::{DateTime, Duration, Utc};
use spring83::difficulty::DifficultyGate;
use spring83::{Board, Creator, Publisher, Result, SpringError, Store, INFERNAL_KEY, TEST_PRIVATE};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// State shared by every request.
pub struct AppState {
    pub store: Store,
    pub ttl_days: i64,
    pub title: String,
    pub admin: Option<Publisher>,
    pub difficulty: DifficultyGate,
    /// Signs the ever-changing test board
    pub test_creator: Creator,
    blocklist: HashSet<Publisher>,
    /// Held across a PUT's check-and-write and across lazy eviction, so a
    /// stale board can never overwrite or evict a fresher one.
    admission: Mutex<()>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Opens the store named by `config` and assembles the state.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let store = Store::open(&config.store)?;
        info!(
            "loaded {} boards from store {}",
            store.count(),
            store.dir().display()
        );

        let mut blocklist: HashSet<Publisher> = config.blocklist.iter().copied().collect();
        blocklist.insert(Publisher::from_hex(INFERNAL_KEY)?);

        match &config.admin {
            Some(admin) => info!("admin board configured for {}", admin),
            None => info!("no admin board configured"),
        }
        if config.difficulty.enabled {
            info!(
                seed = config.difficulty.seed_boards,
                "difficulty gating enabled for new keys"
            );
        }
        info!("board TTL: {} days", config.ttl_days);

        Ok(Self {
            store,
            ttl_days: config.ttl_days,
            title: config.title.clone(),
            admin: config.admin,
            difficulty: config.difficulty,
            test_creator: Creator::from_private_hex(TEST_PRIVATE)?,
            blocklist,
            admission: Mutex::new(()),
        })
    }

    pub fn is_blocked(&self, publisher: &Publisher) -> bool {
        self.blocklist.contains(publisher)
    }

    /// A board is expired once it is no newer than `now - TTL`.
    pub fn is_expired(&self, board: &Board, now: DateTime<Utc>) -> bool {
        !board.is_after_time(now - Duration::days(self.ttl_days))
    }

    /// Runs the PUT rules for a board that already passed validation and
    /// stores it. Returns true if the key is new to this server.
    pub fn admit(&self, board: &Board, now: DateTime<Utc>) -> Result<bool> {
        let _guard = self.lock_admission();

        match self.existing_board(&board.key())? {
            Some(existing) => {
                // existing keys are grandfathered past the difficulty gate
                if !board.is_after(&existing) {
                    return Err(SpringError::conflict("not newer than existing board"));
                }
            }
            None => {
                if !self.difficulty.admits(board.publisher(), self.store.count()) {
                    return Err(SpringError::forbidden("key does not meet current difficulty"));
                }
            }
        }

        if self.is_expired(board, now) {
            return Err(SpringError::conflict(format!(
                "older than TTL: {} days",
                self.ttl_days
            )));
        }

        self.store.add(board)
    }

    /// Removes the board for `key` if it is still expired. Returns true if a
    /// board was removed.
    pub fn evict_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool> {
        let _guard = self.lock_admission();

        match self.existing_board(key)? {
            Some(board) if self.is_expired(&board, now) => {
                self.store.remove(key)?;
                info!(key = %key, "removed expired board");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The stored board for `key`, treating a corrupt file as absent.
    fn existing_board(&self, key: &str) -> Result<Option<Board>> {
        match self.store.get(key) {
            Ok(board) => Ok(Some(board)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) if e.board_error().is_some() => {
                warn!(key = %key, "ignoring corrupt stored board: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn lock_admission(&self) -> MutexGuard<'_, ()> {
        self.admission.lock().unwrap_or_else(|poisoned| {
            warn!("admission lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
