//! Error types for the covert channel framework.

use thiserror::Error;

/// Result type alias for covert channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while framing, embedding or transporting data.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error on a carrier (capture file, stdio, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration (slice size, padding, offsets, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A chunk does not have the configured slice size.
    #[error("Chunk length mismatch: expected {expected} bits, got {actual} bits")]
    ChunkLength { expected: usize, actual: usize },

    /// A bit sequence was converted to bytes but its length is not a multiple of 8.
    #[error("Bit sequence of {0} bits is not byte aligned")]
    NotByteAligned(usize),

    /// A textual bit string contained something other than `0` and `1`.
    #[error("Invalid bit string: {0}")]
    InvalidBits(String),

    /// The embedding handler was asked to embed but has nothing queued.
    #[error("Send queue is empty")]
    SendQueueEmpty,

    /// The carrier ran out of units before every chunk was embedded.
    #[error("Carrier exhausted with {remaining} chunks still queued")]
    CarrierExhausted { remaining: usize },

    /// A whole cycle of a repeating carrier passed without a usable unit.
    #[error("No usable carrier unit among {scanned} units")]
    NoUsableUnits { scanned: usize },

    /// A rewritten payload does not fit in its carrier unit.
    #[error("Payload of {size} bytes exceeds the carrier unit's limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A chunk that the line carrier could not read back intact.
    #[error("Chunk {index} cannot be sent as a line: {reason}")]
    LineChunk { index: usize, reason: &'static str },

    /// Capture file could not be parsed.
    #[error("Malformed capture file: {0}")]
    MalformedCapture(String),

    /// Capture link type this crate cannot parse.
    #[error("Unsupported capture link type: {0}")]
    UnsupportedLinkType(u32),

    /// Text that was expected to be UTF-8 was not.
    #[error("Invalid UTF-8: {0}")]
    Utf8(String),

    /// Regular expression failed to compile.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Base64 decoding failed.
    #[error("Base64 decoding failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Key, nonce or IV with an unusable length or encoding.
    #[error("Invalid key material: {0}")]
    KeyMaterial(String),

    /// Encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Decryption error (wrong password or corrupted data).
    #[error("Decryption failed: wrong password or corrupted data")]
    Decryption,

    /// Key derivation error.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Error::Utf8(e.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(e: std::str::Utf8Error) -> Self {
        Error::Utf8(e.to_string())
    }
}
