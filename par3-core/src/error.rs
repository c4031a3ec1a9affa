//! Error taxonomy and the process return codes.

use thiserror::Error;

/// The five-way error taxonomy.
#[derive(Debug, Error)]
pub enum Par3Error {
    /// A structural invariant was violated: declared vs. measured length mismatch,
    /// chunk-size sum disagreeing with file size, a tail offset past block_size, etc.
    /// Fatal; indicates a bug or adversarial input.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// No Start Packet, no Root Packet, or an underdetermined repair matrix.
    /// Recoverable only by supplying more PAR files.
    #[error("insufficient metadata: {0}")]
    InsufficientMetadata(String),

    /// A BLAKE3 fingerprint, CRC-64, or parity word disagreed.
    #[error("integrity failure: {0}")]
    Integrity(String),

    /// Allocator failure, path too long, numeric field overflow.
    #[error("resource exhaustion: {0}")]
    Resource(String),

    /// Open/read/write/seek/close failure from the host.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Par3Error {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Par3Error::Invariant(msg.into())
    }
    pub fn insufficient(msg: impl Into<String>) -> Self {
        Par3Error::InsufficientMetadata(msg.into())
    }
    pub fn integrity(msg: impl Into<String>) -> Self {
        Par3Error::Integrity(msg.into())
    }
    pub fn resource(msg: impl Into<String>) -> Self {
        Par3Error::Resource(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Par3Error>;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReturnCode {
    Success = 0,
    RepairPossible = 1,
    RepairNotPossible = 2,
    InvalidCommand = 3,
    InsufficientMetadata = 4,
    RepairFailed = 5,
    IoError = 6,
    LogicError = 7,
    OutOfMemory = 8,
}

impl ReturnCode {
    pub fn from_error(e: &Par3Error) -> Self {
        match e {
            Par3Error::Invariant(_) => ReturnCode::LogicError,
            Par3Error::InsufficientMetadata(_) => ReturnCode::InsufficientMetadata,
            Par3Error::Integrity(_) => ReturnCode::RepairFailed,
            Par3Error::Resource(_) => ReturnCode::OutOfMemory,
            Par3Error::Io(_) => ReturnCode::IoError,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}
