//! Check that no clef change sits inside a tie.

use serde::Serialize;

use crate::model::{RhythmicPosition, Staff, VOICES};
use crate::tie::{is_tied_back, is_tied_for};

/// A clef change placed while a tie is sounding through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub position: RhythmicPosition,
    pub staff: usize,
    /// Voice whose tie the clef breaks
    pub voice: usize,
}

/// Every (clef change, voice) pair where the clef breaks a tie.
///
/// A clef at tick `t` is checked against the ties left open by the
/// segments before `t`, since the clef precedes the notes at its own tick.
pub fn validate(staff: &Staff) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut tied = [false; VOICES];
    let mut clefs = staff.clef_changes().peekable();

    let mut check = |position: RhythmicPosition, tied: &[bool; VOICES]| {
        for voice in (0..VOICES).filter(|&v| tied[v]) {
            violations.push(Violation {
                position,
                staff: staff.index,
                voice,
            });
        }
    };

    for segment in staff.segments() {
        while let Some((position, _)) = clefs.next_if(|(p, _)| p.tick <= segment.tick()) {
            check(position, &tied);
        }
        for voice in 0..VOICES {
            if is_tied_back(segment, voice) {
                tied[voice] = false;
            }
            if is_tied_for(segment, voice) {
                tied[voice] = true;
            }
        }
    }
    for (position, _) in clefs {
        check(position, &tied);
    }

    violations
}
