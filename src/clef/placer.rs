//! Inserting and replacing clef elements on a staff.

use serde::Serialize;

use crate::model::{Clef, ClefType, RhythmicPosition, Staff};

/// A clef the pass has written into the staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClefAssignment {
    pub clef_type: ClefType,
    pub position: RhythmicPosition,
    pub is_small: bool,
}

/// What `ClefPlacer::place` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// New clef added
    Inserted,
    /// An existing clef at the position was swapped for the new one
    Replaced,
    /// The new clef would repeat the clef already in effect, so nothing
    /// was added (any clef previously at the position is gone)
    Cancelled,
}

/// Writes clefs into one staff. Borrowed for the duration of a pass.
pub struct ClefPlacer<'a> {
    staff: &'a mut Staff,
}

impl<'a> ClefPlacer<'a> {
    pub fn new(staff: &'a mut Staff) -> Self {
        Self { staff }
    }

    fn make_clef(&self, clef_type: ClefType, small: bool) -> Clef {
        Clef {
            clef_type,
            small,
            generated: false,
            mag: self.staff.mag,
        }
    }

    /// Full-size clef at the start of the staff. Overwrites a previous one.
    pub fn create_initial_clef(&mut self, clef_type: ClefType) -> ClefAssignment {
        self.staff.header_clef = Some(self.make_clef(clef_type, false));
        ClefAssignment {
            clef_type,
            position: self.staff.first_position(),
            is_small: false,
        }
    }

    /// Put a clef change at `position`, replacing any clef already there.
    pub fn place(&mut self, clef_type: ClefType, position: RhythmicPosition, small: bool) -> Placement {
        let tick = position.tick;
        let mut replaced = false;

        if let Some(seg) = self.staff.clef_segment_mut(tick) {
            replaced = seg.elements[0].take().is_some();
            if seg.is_empty() {
                self.staff.remove_clef_segment(tick);
            }
        }

        if self.staff.clef_before(tick) == Some(clef_type) {
            return Placement::Cancelled;
        }

        let clef = self.make_clef(clef_type, small);
        self.staff.clef_segment_mut_or_insert(position).elements[0] = Some(clef);
        if replaced {
            Placement::Replaced
        } else {
            Placement::Inserted
        }
    }
}
