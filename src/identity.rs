//! Publisher and creator identities.
//!
//! A [`Publisher`] is a 32-byte ed25519 public key, shown as 64 lowercase hex
//! characters. The last seven characters must read `83e` followed by a month
//! (`01`-`12`) and a two digit year. A key is valid from the first day of
//! that month two years earlier until the encoded month ends. Validity is
//! recomputed against the clock on every check and never stored.
//!
//! A [`Creator`] pairs a publisher with its private seed and is the only
//! thing that can sign boards for that key.

use crate::error::{KeyError, Result, SpringError};
use crate::signature::Signature;
use crate::KEY_LEN;
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Century the two digit key year is relative to
const YEAR_BASE: i32 = 2000;

/// Years before the encoded month that a key becomes usable
const VALID_YEARS: i32 = 2;

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"83e(0[1-9]|1[0-2])(\d\d)$").expect("static key pattern compiles")
    })
}

/// Decodes exactly 64 hex characters into 32 bytes.
fn decode_key(hex_key: &str) -> std::result::Result<[u8; 32], KeyError> {
    if hex_key.len() != KEY_LEN {
        return Err(KeyError::BadLength(hex_key.len()));
    }
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(hex_key, &mut bytes).map_err(|_| KeyError::BadHex)?;
    Ok(bytes)
}

/// A board publisher, identified by its public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Publisher {
    key: [u8; 32],
}

impl Publisher {
    /// Parses a 64 character hex public key.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        Ok(Self {
            key: decode_key(hex_key)?,
        })
    }

    /// Canonical lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// The dalek verifying key, if the bytes are a valid curve point.
    pub(crate) fn verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.key).ok()
    }

    /// The window `[start, expiry)` encoded in the key suffix, or `None` if the
    /// suffix does not follow the `83eMMYY` format.
    pub fn validity_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let hex_key = self.to_hex();
        let caps = key_pattern().captures(&hex_key)?;
        let month: u32 = caps[1].parse().ok()?;
        let year = YEAR_BASE + caps[2].parse::<i32>().ok()?;

        let start = Utc
            .with_ymd_and_hms(year - VALID_YEARS, month, 1, 0, 0, 0)
            .single()?;
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let expiry = Utc
            .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
            .single()?;

        Some((start, expiry))
    }

    /// Returns the first instant at which the key is no longer valid.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.validity_window().map(|(_, expiry)| expiry)
    }

    /// Checks the key format and its date window against `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match self.validity_window() {
            Some((start, expiry)) => start <= now && now < expiry,
            None => false,
        }
    }

    /// [`Publisher::is_valid`] against the current clock.
    pub fn is_valid_now(&self) -> bool {
        self.is_valid(Utc::now())
    }

    /// The key read as a big-endian unsigned integer, compared against the
    /// admission threshold when difficulty gating is on.
    pub fn strength(&self) -> BigUint {
        BigUint::from_bytes_be(&self.key)
    }
}

impl fmt::Display for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Publisher({})", self.to_hex())
    }
}

/// A publisher together with its private key.
#[derive(Clone)]
pub struct Creator {
    signing_key: SigningKey,
    publisher: Publisher,
}

impl Creator {
    /// Generates a fresh random keypair. The key is not necessarily valid.
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(SpringError::entropy)?;
        Ok(Self::from_seed(seed))
    }

    fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let publisher = Publisher {
            key: signing_key.verifying_key().to_bytes(),
        };
        Self {
            signing_key,
            publisher,
        }
    }

    /// Imports a creator from its 64 hex character seed.
    pub fn from_private_hex(hex_seed: &str) -> Result<Self> {
        Ok(Self::from_seed(decode_key(hex_seed)?))
    }

    /// The seed as 64 hex characters. This is the secret to keep safe.
    pub fn export_private_key(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Shorthand for `publisher().is_valid_now()`.
    pub fn is_valid(&self) -> bool {
        self.publisher.is_valid_now()
    }

    /// Signs arbitrary bytes with this creator's key.
    pub fn sign(&self, content: &[u8]) -> Signature {
        Signature::from_dalek(self.signing_key.sign(content))
    }
}

impl fmt::Display for Creator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.publisher, f)
    }
}

impl fmt::Debug for Creator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Creator")
            .field("publisher", &self.publisher.to_hex())
            .finish_non_exhaustive()
    }
}
