//! Error types for Spring '83 operations.

use thiserror::Error;

/// Result type alias for Spring '83 operations.
pub type Result<T> = std::result::Result<T, SpringError>;

/// Reasons a hex key string cannot be turned into a key.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    /// Keys are exactly 64 hex characters
    #[error("invalid key length: expected 64 hex characters, got {0}")]
    BadLength(usize),

    /// Keys must be hex encoded
    #[error("key is not valid hex")]
    BadHex,
}

/// Reasons a candidate board is rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    #[error("board is not UTF-8")]
    NotUtf8,

    #[error("board is too large: {0} bytes (max 2217)")]
    TooLarge(usize),

    #[error("signature does not verify")]
    InvalidSignature,

    #[error("signature must be 128 hex characters")]
    BadSignatureEncoding,

    #[error("stored board is missing its signature line")]
    MissingSignatureLine,

    #[error("unable to find a valid time element")]
    NoTimestamp,

    #[error("time element timestamp is in the future")]
    FutureTimestamp,
}

/// Main error type for Spring '83 operations.
#[derive(Error, Debug)]
pub enum SpringError {
    /// Publisher or private key could not be parsed
    #[error("Malformed key: {0}")]
    MalformedKey(#[from] KeyError),

    /// Board failed validation
    #[error("Malformed board: {0}")]
    MalformedBoard(#[from] BoardError),

    /// No board is stored for the key
    #[error("Board not found: {0}")]
    NotFound(String),

    /// Board is stale relative to the stored one or the TTL window
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Key is blocked or does not meet the admission difficulty
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Store path exists but is not a directory
    #[error("Store path is not a directory: {0}")]
    NotADirectory(String),

    /// I/O errors
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// HTTP transport errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A server answered with a status the client cannot use
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Every followed board failed to fetch
    #[error("Failed to get any boards ({0} follows)")]
    FollowsFailed(usize),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operating system could not provide randomness
    #[error("Entropy error: {0}")]
    Entropy(String),

    /// A cancellable operation was stopped before it finished
    #[error("Operation canceled")]
    Canceled,

    /// Template rendering errors
    #[error("Render error: {0}")]
    Render(String),
}

impl SpringError {
    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(key: T) -> Self {
        Self::NotFound(key.to_string())
    }

    /// Creates a new conflict error.
    pub fn conflict<T: ToString>(msg: T) -> Self {
        Self::Conflict(msg.to_string())
    }

    /// Creates a new forbidden error.
    pub fn forbidden<T: ToString>(msg: T) -> Self {
        Self::Forbidden(msg.to_string())
    }

    /// Creates a new configuration error.
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Creates a new entropy error.
    pub fn entropy<T: ToString>(msg: T) -> Self {
        Self::Entropy(msg.to_string())
    }

    /// Creates a new render error.
    pub fn render<T: ToString>(msg: T) -> Self {
        Self::Render(msg.to_string())
    }

    /// Returns the board validation failure, if this is one.
    pub fn board_error(&self) -> Option<BoardError> {
        match self {
            Self::MalformedBoard(e) => Some(*e),
            _ => None,
        }
    }

    /// True when the error means "nothing stored under this key".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Storage(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
