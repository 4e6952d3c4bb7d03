//! Error types for MIDI import.
//!
//! The clef assignment itself never fails; only reading the MIDI data,
//! the import options, and serializing the result can.

use thiserror::Error;

/// Import failure.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The bytes are not a well-formed Standard MIDI File
    #[error("MIDI parse error: {0}")]
    Midi(#[from] midly::Error),

    /// SMPTE timecode timing; only metrical (ticks per quarter) files are imported
    #[error("Unsupported MIDI timing: only metrical timing can be imported")]
    UnsupportedTiming,

    /// A track runs longer than the score's tick range
    #[error("MIDI tick {0} is out of range")]
    TickOverflow(u64),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Import options JSON could not be decoded
    #[error("Invalid import options: {0}")]
    Options(#[source] serde_json::Error),

    #[error("Invalid import options: {0}")]
    InvalidOptions(String),

    #[error("JSON serialization error: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ImportError>;
