//! Per-staff clef pass and the score-wide driver.

use log::{debug, error};

use super::average_pitch::average_segment_pitch;
use super::engine::ClefDecisionEngine;
use super::placer::{ClefAssignment, ClefPlacer, Placement};
use super::validate::validate;
use crate::model::{Score, Staff};
use crate::options::{ClefThresholds, ImportOptions};
use crate::tie::TieStateMachine;

/// Settings for running the clef pass over one staff.
#[derive(Debug, Clone, Copy)]
pub struct StaffClefPass {
    pub change_clef: bool,
    pub is_drum_track: bool,
    pub thresholds: ClefThresholds,
    pub verify_ties: bool,
}

impl Default for StaffClefPass {
    fn default() -> Self {
        Self {
            change_clef: true,
            is_drum_track: false,
            thresholds: ClefThresholds::default(),
            verify_ties: true,
        }
    }
}

impl StaffClefPass {
    /// Place the initial clef and, if enabled, the clef changes.
    ///
    /// Returns every clef this pass left in the staff, initial clef
    /// first. Changes are applied as soon as the engine commits them.
    pub fn run(&self, staff: &mut Staff) -> Vec<ClefAssignment> {
        let initial = staff.concert_clef;
        let mut placed = vec![ClefPlacer::new(staff).create_initial_clef(initial)];

        if !self.change_clef || self.is_drum_track {
            return placed;
        }
        debug!("clef pass on staff {} starting in {:?}", staff.index, initial);

        let mut engine = ClefDecisionEngine::new(initial, self.thresholds);
        let mut tracker = TieStateMachine::new();

        for idx in 0..staff.segments.len() {
            let segment = &staff.segments[idx];
            let pitch = average_segment_pitch(segment);
            tracker.add_segment(segment);
            let Some(change) = engine.step(segment.position, pitch, tracker.state()) else {
                continue;
            };

            let placement = ClefPlacer::new(staff).place(change.clef, change.position, true);
            // A replaced or cancelled clef is no longer in the staff.
            if placement != Placement::Inserted {
                placed.retain(|a| !a.is_small || a.position != change.position);
            }
            if placement != Placement::Cancelled {
                placed.push(ClefAssignment {
                    clef_type: change.clef,
                    position: change.position,
                    is_small: true,
                });
            }
        }

        if self.verify_ties {
            for v in validate(staff) {
                error!(
                    "Clef breaks tie; measure number (from 1): {}, staff index (from 0): {}, voice: {}",
                    v.position.measure + 1,
                    v.staff,
                    v.voice
                );
            }
        }
        debug!(
            "clef pass on staff {} done: {} clef change(s)",
            staff.index,
            placed.len() - 1
        );
        placed
    }
}

/// Run the clef pass with default thresholds over a single staff.
pub fn create_clefs(staff: &mut Staff, change_clef: bool, is_drum_track: bool) -> Vec<ClefAssignment> {
    StaffClefPass {
        change_clef,
        is_drum_track,
        ..StaffClefPass::default()
    }
    .run(staff)
}

/// Run the clef pass over every staff of the score.
///
/// Staves are independent; each is processed to completion in turn.
pub fn assign_clefs(score: &mut Score, options: &ImportOptions) {
    let Score { parts, staves, .. } = score;
    for part in parts.iter() {
        let ops = options.track(part.track_index);
        let pass = StaffClefPass {
            change_clef: ops.change_clef,
            is_drum_track: part.is_drum,
            verify_ties: options.verify_ties,
            ..StaffClefPass::default()
        };
        let range = part.first_staff..part.first_staff + part.staff_count;
        for staff in staves.iter_mut().filter(|s| range.contains(&s.index)) {
            pass.run(staff);
        }
    }
}
