//! Running pitch average over a chord, a segment, or a tied run.

use std::ops::AddAssign;

use crate::model::{ClefType, Segment, VOICES};

/// Sum and count of note pitches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AveragePitch {
    sum_pitch: i32,
    count: i32,
}

impl AveragePitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(sum_pitch: i32, count: i32) -> Self {
        Self { sum_pitch, count }
    }

    pub fn add_pitch(&mut self, pitch: i32) {
        self.sum_pitch += pitch;
        self.count += 1;
    }

    /// Integer mean, or `None` when nothing was added (a rest).
    pub fn pitch(&self) -> Option<i32> {
        (self.count > 0).then(|| self.sum_pitch / self.count)
    }

    pub fn sum_pitch(&self) -> i32 {
        self.sum_pitch
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl AddAssign for AveragePitch {
    fn add_assign(&mut self, other: Self) {
        self.sum_pitch += other.sum_pitch;
        self.count += other.count;
    }
}

impl FromIterator<i32> for AveragePitch {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        let mut avg = Self::new();
        for pitch in iter {
            avg.add_pitch(pitch);
        }
        avg
    }
}

/// Average over every note of every voice's chord in `segment`.
pub fn average_segment_pitch(segment: &Segment) -> AveragePitch {
    (0..VOICES)
        .filter_map(|voice| segment.chord(voice))
        .flat_map(|chord| chord.notes.iter())
        .map(|note| i32::from(note.pitch))
        .collect()
}

/// Clef suggested by an average pitch: bass below middle C.
pub fn clef_type_from_average_pitch(pitch: i32, mid_pitch: i32) -> ClefType {
    if pitch < mid_pitch {
        ClefType::F
    } else {
        ClefType::G
    }
}
