//! Import options, deserializable from JSON.
//!
//! ```
//! use midiclef::{ImportOptions, Quantize};
//!
//! let opts = ImportOptions::from_json(r#"{
//!     "quantize": "Eighth",
//!     "tracks": [{ "change_clef": false }]
//! }"#).unwrap();
//! assert_eq!(opts.quantize, Quantize::Eighth);
//! assert!(!opts.track(0).change_clef);
//! assert!(opts.track(1).change_clef);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};
use crate::model::DIVISION;

/// Grid that note onsets and offsets are snapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantize {
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl Default for Quantize {
    fn default() -> Self {
        Quantize::Sixteenth
    }
}

impl Quantize {
    /// Grid step in ticks at `division` ticks per quarter.
    pub fn ticks(self, division: u32) -> u32 {
        match self {
            Quantize::Quarter => division,
            Quantize::Eighth => division / 2,
            Quantize::Sixteenth => division / 4,
            Quantize::ThirtySecond => division / 8,
        }
    }
}

/// Per-track choices made by the user before import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackOperations {
    /// Import this track at all
    pub do_import: bool,
    /// Insert clef changes following the pitch content
    pub change_clef: bool,
}

impl Default for TrackOperations {
    fn default() -> Self {
        Self {
            do_import: true,
            change_clef: true,
        }
    }
}

/// Options for a whole import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub quantize: Quantize,
    /// Indexed by the order of note-carrying MIDI tracks
    pub tracks: Vec<TrackOperations>,
    /// Check every staff for clefs that break a tie after the clef pass
    pub verify_ties: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            quantize: Quantize::default(),
            tracks: Vec::new(),
            verify_ties: true,
        }
    }
}

impl ImportOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        let options: ImportOptions = serde_json::from_str(json).map_err(ImportError::Options)?;
        options.validate()?;
        Ok(options)
    }

    /// Operations for the `index`-th imported track (defaults when unset).
    pub fn track(&self, index: usize) -> TrackOperations {
        self.tracks.get(index).copied().unwrap_or_default()
    }

    /// Grid step in ticks.
    pub fn grid(&self) -> u32 {
        self.quantize.ticks(DIVISION)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid() == 0 {
            return Err(ImportError::InvalidOptions(format!(
                "quantization {:?} is finer than one tick",
                self.quantize
            )));
        }
        Ok(())
    }
}

/// Pitch thresholds and debounce window for clef assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClefThresholds {
    /// Notes below this always belong in bass clef
    pub low_pitch: i32,
    /// Boundary between the two clefs
    pub mid_pitch: i32,
    /// Notes at or above this always belong in treble clef
    pub high_pitch: i32,
    /// Consecutive ambiguous positions needed before a change
    pub counter_limit: u32,
}

impl Default for ClefThresholds {
    fn default() -> Self {
        Self {
            low_pitch: 55,
            mid_pitch: 60,
            high_pitch: 65,
            counter_limit: 3,
        }
    }
}
