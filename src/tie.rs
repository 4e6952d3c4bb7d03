//! Tie detection and the per-staff tie run tracker.
//!
//! A clef change may only be placed where no tie is sounding through.
//! The tracker classifies each position against the previous one so
//! the clef pass can tell where a tied run starts, continues, and ends.

use serde::Serialize;

use crate::model::{Segment, VOICES};

/// Does the chord in `voice` start a tie to the next chord?
pub fn is_tied_for(segment: &Segment, voice: usize) -> bool {
    segment
        .chord(voice)
        .map_or(false, |chord| chord.notes.iter().any(|n| n.tie_for))
}

/// Does the chord in `voice` continue a tie from the previous chord?
pub fn is_tied_back(segment: &Segment, voice: usize) -> bool {
    segment
        .chord(voice)
        .map_or(false, |chord| chord.notes.iter().any(|n| n.tie_back))
}

/// Tie status of a position relative to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TieState {
    /// Nothing tied into or out of this position
    Untied,
    /// A tied run starts here
    TiedFor,
    /// Inside a tied run
    TiedBoth,
    /// A tied run ends here
    TiedBack,
}

impl TieState {
    /// Can a clef boundary be placed at a position in this state?
    pub fn allows_clef(self) -> bool {
        matches!(self, TieState::Untied | TieState::TiedFor)
    }
}

/// Tracks which voices of a staff are inside a tie.
#[derive(Debug, Clone)]
pub struct TieStateMachine {
    tied: [bool; VOICES],
    state: TieState,
}

impl Default for TieStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TieStateMachine {
    pub fn new() -> Self {
        Self {
            tied: [false; VOICES],
            state: TieState::Untied,
        }
    }

    pub fn state(&self) -> TieState {
        self.state
    }

    /// Advance over one segment. Segments without chords leave the state as is.
    pub fn add_segment(&mut self, segment: &Segment) {
        let tied_in = self.tied.iter().any(|&t| t);
        let mut has_chord = false;

        for voice in 0..VOICES {
            if segment.chord(voice).is_none() {
                continue;
            }
            has_chord = true;
            // A note may end one tie and start another; clear first.
            if is_tied_back(segment, voice) {
                self.tied[voice] = false;
            }
            if is_tied_for(segment, voice) {
                self.tied[voice] = true;
            }
        }
        if !has_chord {
            return;
        }

        let tied_out = self.tied.iter().any(|&t| t);
        self.state = match (tied_in, tied_out) {
            (false, false) => TieState::Untied,
            (false, true) => TieState::TiedFor,
            (true, true) => TieState::TiedBoth,
            (true, false) => TieState::TiedBack,
        };
    }
}
