//! # spring83 - Spring '83 boards in Rust
//!
//! A publisher mines an ed25519 keypair whose public key encodes its own
//! expiry month, signs small HTML documents ("boards") with it and pushes them
//! to servers. Followers pull the latest board per key and trust the
//! signature rather than the transport.
//!
//! ## Layout
//!
//! - [`identity`]: publisher/creator keys and the date-encoded validity window
//! - [`difficulty`]: the population-scaled admission threshold
//! - [`miner`]: cancellable parallel search for a valid creator key
//! - [`board`]: the board validator and its on-disk/on-wire codec
//! - [`store`]: flat-file board store with a write-through cache
//! - [`follow`]: conditional fetch of followed boards and local merge
//! - [`config`]: client profile files
//!
//! ## Example
//!
//! ```rust,no_run
//! use spring83::identity::Creator;
//! # fn main() -> spring83::Result<()> {
//! let creator = Creator::from_private_hex(spring83::TEST_PRIVATE)?;
//! let board = creator.publish(b"<h1>hello</h1>".to_vec())?;
//! assert!(board.verify_signature());
//! # Ok(())
//! # }
//! ```

pub mod board;
pub mod cli;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod follow;
pub mod identity;
pub mod miner;
pub mod signature;
pub mod store;

pub use board::Board;
pub use error::{BoardError, KeyError, Result, SpringError};
pub use identity::{Creator, Publisher};
pub use signature::Signature;
pub use store::Store;

/// Protocol version sent in the `Spring-Version` header
pub const SPRING_VERSION: &str = "83";

/// Header carrying the protocol version on every exchange
pub const HEADER_VERSION: &str = "Spring-Version";

/// Header carrying the hex board signature on PUT requests and GET responses
pub const HEADER_SIGNATURE: &str = "Spring-Signature";

/// Length of a hex encoded key (public or private)
pub const KEY_LEN: usize = 64;

/// Length of a hex encoded signature
pub const SIG_LEN: usize = 128;

/// Maximum size of board content in bytes
pub const MAX_BOARD_LEN: usize = 2217;

/// Well-known test key. It encodes 1983 so it is never valid for publishing.
pub const TEST_PUBLIC: &str = "ab589f4dde9fce4180fcf42c7b05185b0a02a5d682e353fa39177995083e0583";

/// Private half of [`TEST_PUBLIC`]
pub const TEST_PRIVATE: &str = "3371f8b011f51632fea33ed0a3688c26a45498205c6097c352bd4d079d224419";

/// Key every server refuses for both GET and PUT
pub const INFERNAL_KEY: &str = "d17eef211f510479ee6696495a2589f7e9fb055c2576749747d93444883e0123";

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
