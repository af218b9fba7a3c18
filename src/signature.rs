//! Board signatures.
//!
//! A [`Signature`] is an opaque 64-byte ed25519 signature. It can only be
//! checked against a publisher and content, or rendered as hex; the raw bytes
//! are never handed out as trusted input.

use crate::error::{BoardError, Result};
use crate::identity::Publisher;
use crate::SIG_LEN;
use ed25519_dalek::Verifier;
use std::fmt;

/// Number of raw signature bytes
pub const SIGNATURE_BYTES: usize = 64;

/// An ed25519 signature over board content
#[derive(Clone, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_BYTES]);

impl Signature {
    pub(crate) fn from_dalek(sig: ed25519_dalek::Signature) -> Self {
        Self(sig.to_bytes())
    }

    /// Parses the hex form carried by `Spring-Signature` and the first line of
    /// a stored board. Exactly 128 hex characters are accepted.
    pub fn from_hex(hex_sig: &str) -> Result<Self> {
        if hex_sig.len() != SIG_LEN {
            return Err(BoardError::BadSignatureEncoding.into());
        }
        let mut bytes = [0u8; SIGNATURE_BYTES];
        hex::decode_to_slice(hex_sig, &mut bytes)
            .map_err(|_| BoardError::BadSignatureEncoding)?;
        Ok(Self(bytes))
    }

    /// Returns true if this signature was made by `publisher` over `content`.
    pub fn verify(&self, publisher: &Publisher, content: &[u8]) -> bool {
        let Some(key) = publisher.verifying_key() else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&self.0);
        key.verify(content, &sig).is_ok()
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", &self.to_hex()[..16])
    }
}
