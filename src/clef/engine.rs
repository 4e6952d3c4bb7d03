//! Clef decision state machine.
//!
//! Fed one rhythmic position at a time, the engine keeps the current
//! clef and decides where the clef should change. Clearly high or low
//! positions switch at once; positions in the ambiguous middle band have
//! to repeat for `counter_limit` consecutive positions first. Tied runs
//! are judged by the average over the whole run and may only switch at
//! the position where the run starts.

use std::ops::Range;

use log::{debug, warn};

use super::average_pitch::{clef_type_from_average_pitch, AveragePitch};
use crate::model::{ClefType, RhythmicPosition};
use crate::options::ClefThresholds;
use crate::tie::TieState;

/// A clef change the engine has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClefChange {
    pub clef: ClefType,
    pub position: RhythmicPosition,
}

/// Consecutive ambiguous positions seen so far, and where the run began.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HysteresisCounter {
    count: u32,
    anchor: Option<RhythmicPosition>,
}

impl HysteresisCounter {
    /// Count one more qualifying position; the first one becomes the anchor.
    pub fn advance(&mut self, position: RhythmicPosition) -> u32 {
        if self.count == 0 {
            self.anchor = Some(position);
        }
        self.count += 1;
        self.count
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.count > 0
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn anchor(&self) -> Option<RhythmicPosition> {
        self.anchor
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    position: RhythmicPosition,
    pitch: AveragePitch,
    tie: TieState,
}

/// Decides clef changes for one staff.
#[derive(Debug, Clone)]
pub struct ClefDecisionEngine {
    thresholds: ClefThresholds,
    current: ClefType,
    /// Pitches of the tied run in progress
    group_pitch: AveragePitch,
    /// Start of the tied run in progress
    tied_anchor: Option<RhythmicPosition>,
    counter: HysteresisCounter,
    /// Every position seen so far, for the look-back extension
    history: Vec<Observation>,
}

impl ClefDecisionEngine {
    pub fn new(initial: ClefType, thresholds: ClefThresholds) -> Self {
        Self {
            thresholds,
            current: initial,
            group_pitch: AveragePitch::new(),
            tied_anchor: None,
            counter: HysteresisCounter::default(),
            history: Vec::new(),
        }
    }

    pub fn current_clef(&self) -> ClefType {
        self.current
    }

    pub fn counter(&self) -> HysteresisCounter {
        self.counter
    }

    /// Feed the next position. Positions must arrive in ascending tick order.
    ///
    /// `pitch` is the average over all notes at the position (empty for a
    /// rest) and `tie` its state from the staff's tie tracker.
    pub fn step(
        &mut self,
        position: RhythmicPosition,
        pitch: AveragePitch,
        tie: TieState,
    ) -> Option<ClefChange> {
        self.history.push(Observation {
            position,
            pitch,
            tie,
        });
        // Rests neither vote nor break a run.
        let avg = pitch.pitch()?;

        let mut change = None;
        match tie {
            TieState::Untied => {}
            TieState::TiedFor => {
                self.group_pitch = pitch;
                self.tied_anchor = Some(position);
            }
            TieState::TiedBoth => self.group_pitch += pitch,
            TieState::TiedBack => {
                self.group_pitch += pitch;
                change = self.finish_tied_run(position);
            }
        }

        let before = self.counter.count();
        if tie.allows_clef() {
            if let Some(c) = self.apply_thresholds(position, avg) {
                change = Some(c);
            }
        }
        if self.counter.is_active() && self.counter.count() == before {
            self.counter.reset();
        }

        if let Some(c) = change {
            debug!(
                "clef change to {:?} at tick {} (measure {}), decided at tick {}",
                c.clef,
                c.position.tick,
                c.position.measure + 1,
                position.tick
            );
        }
        change
    }

    fn finish_tied_run(&mut self, end: RhythmicPosition) -> Option<ClefChange> {
        let anchor = self.tied_anchor.take();
        let group = std::mem::take(&mut self.group_pitch);
        let clef = clef_type_from_average_pitch(group.pitch()?, self.thresholds.mid_pitch);
        if clef == self.current {
            return None;
        }
        match anchor {
            Some(position) => {
                self.current = clef;
                Some(ClefChange { clef, position })
            }
            // No start: both the change and the clef switch are dropped.
            None => {
                warn!(
                    "tied run ending at tick {} (measure {}) has no recorded start; clef change skipped",
                    end.tick,
                    end.measure + 1
                );
                None
            }
        }
    }

    fn apply_thresholds(&mut self, position: RhythmicPosition, avg: i32) -> Option<ClefChange> {
        let t = self.thresholds;
        match self.current {
            ClefType::G if avg < t.low_pitch => self.commit_immediate(ClefType::F, position),
            ClefType::G if avg < t.mid_pitch => self.debounce(ClefType::F, position),
            ClefType::F if avg >= t.high_pitch => self.commit_immediate(ClefType::G, position),
            ClefType::F if avg >= t.mid_pitch => self.debounce(ClefType::G, position),
            _ => None,
        }
    }

    fn commit_immediate(&mut self, clef: ClefType, position: RhythmicPosition) -> Option<ClefChange> {
        // An ambiguous run leading up to this position moves with it.
        let anchor = self.counter.anchor().unwrap_or(position);
        Some(self.commit(clef, anchor))
    }

    fn debounce(&mut self, clef: ClefType, position: RhythmicPosition) -> Option<ClefChange> {
        if self.counter.advance(position) < self.thresholds.counter_limit {
            return None;
        }
        let anchor = self.counter.anchor().unwrap_or(position);
        Some(self.commit(clef, anchor))
    }

    fn commit(&mut self, clef: ClefType, anchor: RhythmicPosition) -> ClefChange {
        let position = self.extend_back(anchor, clef);
        self.current = clef;
        self.counter.reset();
        ClefChange { clef, position }
    }

    /// Pitches that sit comfortably in `clef` without having triggered it.
    fn register(&self, clef: ClefType) -> Range<i32> {
        let t = self.thresholds;
        match clef {
            ClefType::F => t.mid_pitch..t.high_pitch,
            ClefType::G => t.low_pitch..t.mid_pitch,
        }
    }

    /// Move `start` back over a short run of in-register positions when
    /// that run directly follows a rest.
    fn extend_back(&self, start: RhythmicPosition, clef: ClefType) -> RhythmicPosition {
        let Some(idx) = self.history.iter().rposition(|o| o.position == start) else {
            return start;
        };
        let register = self.register(clef);
        let mut candidate = &self.history[idx];
        let mut steps = 0;

        for prev in self.history[..idx].iter().rev() {
            match prev.pitch.pitch() {
                None if candidate.tie.allows_clef() => return candidate.position,
                None => return start,
                Some(p) if register.contains(&p) => candidate = prev,
                Some(_) => break,
            }
            steps += 1;
            if steps == self.thresholds.counter_limit {
                break;
            }
        }
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(i: u32) -> RhythmicPosition {
        RhythmicPosition::new(i * 480, (i / 4) as usize)
    }

    fn one(pitch: i32) -> AveragePitch {
        AveragePitch::with(pitch, 1)
    }

    /// Feed untied single-note positions (0 = rest) and collect changes.
    fn run(initial: ClefType, pitches: &[i32]) -> Vec<(ClefType, u32)> {
        let mut engine = ClefDecisionEngine::new(initial, ClefThresholds::default());
        pitches
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| {
                let pitch = if p == 0 { AveragePitch::new() } else { one(p) };
                engine.step(pos(i as u32), pitch, TieState::Untied)
            })
            .map(|c| (c.clef, c.position.tick / 480))
            .collect()
    }

    #[test]
    fn consistent_pitches_change_nothing() {
        assert!(run(ClefType::G, &[62, 70, 65, 60, 61]).is_empty());
        assert!(run(ClefType::F, &[40, 59, 45, 55]).is_empty());
    }

    #[test]
    fn low_pitch_switches_to_bass_immediately() {
        assert_eq!(run(ClefType::G, &[62, 63, 50, 48, 45]), vec![(ClefType::F, 2)]);
    }

    #[test]
    fn high_pitch_switches_to_treble_immediately() {
        assert_eq!(run(ClefType::F, &[50, 65]), vec![(ClefType::G, 1)]);
    }

    #[test]
    fn single_ambiguous_position_is_ignored() {
        assert!(run(ClefType::G, &[62, 57, 62, 63]).is_empty());
    }

    #[test]
    fn three_consecutive_ambiguous_positions_switch_at_first() {
        assert_eq!(run(ClefType::G, &[62, 57, 58, 56, 57]), vec![(ClefType::F, 1)]);
        assert_eq!(run(ClefType::F, &[50, 61, 62, 63]), vec![(ClefType::G, 1)]);
    }

    #[test]
    fn interrupted_ambiguous_run_starts_over() {
        // 57 58 | 62 | 57 58: never three in a row
        assert!(run(ClefType::G, &[57, 58, 62, 57, 58]).is_empty());
    }

    #[test]
    fn rest_does_not_break_ambiguous_run() {
        assert_eq!(run(ClefType::G, &[62, 57, 0, 58, 56]), vec![(ClefType::F, 1)]);
    }

    #[test]
    fn immediate_change_takes_ambiguous_run_with_it() {
        assert_eq!(run(ClefType::G, &[62, 57, 58, 50]), vec![(ClefType::F, 1)]);
    }

    #[test]
    fn change_extends_back_to_note_after_rest() {
        // rest, 62, 63, then a clear bass note: the two in-register notes follow
        assert_eq!(run(ClefType::G, &[0, 62, 63, 50]), vec![(ClefType::F, 1)]);
    }

    #[test]
    fn extension_without_rest_keeps_trigger_position() {
        assert_eq!(run(ClefType::G, &[62, 63, 50]), vec![(ClefType::F, 2)]);
        // Out-of-register note before the run stops the extension
        assert_eq!(run(ClefType::G, &[0, 70, 62, 50]), vec![(ClefType::F, 3)]);
    }

    #[test]
    fn extension_is_bounded_by_counter_limit() {
        // Three in-register notes between the rest and the trigger: too far back
        assert_eq!(run(ClefType::G, &[0, 61, 62, 63, 50]), vec![(ClefType::F, 4)]);
    }

    #[test]
    fn debounce_window_is_configurable() {
        let thresholds = ClefThresholds {
            counter_limit: 1,
            ..ClefThresholds::default()
        };
        let mut engine = ClefDecisionEngine::new(ClefType::G, thresholds);
        let change = engine.step(pos(0), one(57), TieState::Untied);
        assert_eq!(
            change,
            Some(ClefChange {
                clef: ClefType::F,
                position: pos(0)
            })
        );
    }

    #[test]
    fn tied_run_switches_at_its_start() {
        let mut engine = ClefDecisionEngine::new(ClefType::G, ClefThresholds::default());
        let steps = [
            (62, TieState::Untied),
            (63, TieState::Untied),
            (62, TieState::Untied),
            (58, TieState::TiedFor),
            (59, TieState::TiedBoth),
            (57, TieState::TiedBoth),
            (56, TieState::TiedBack),
        ];
        let changes: Vec<ClefChange> = steps
            .iter()
            .enumerate()
            .filter_map(|(i, &(p, tie))| engine.step(pos(i as u32), one(p), tie))
            .collect();
        assert_eq!(
            changes,
            vec![ClefChange {
                clef: ClefType::F,
                position: pos(3)
            }]
        );
        assert_eq!(engine.current_clef(), ClefType::F);
    }

    #[test]
    fn tied_run_in_current_register_changes_nothing() {
        let mut engine = ClefDecisionEngine::new(ClefType::G, ClefThresholds::default());
        assert_eq!(engine.step(pos(0), one(64), TieState::TiedFor), None);
        assert_eq!(engine.step(pos(1), one(50), TieState::TiedBoth), None);
        // Average (64 + 50 + 70) / 3 = 61
        assert_eq!(engine.step(pos(2), one(70), TieState::TiedBack), None);
        assert_eq!(engine.current_clef(), ClefType::G);
    }

    #[test]
    fn positions_inside_a_tie_do_not_count() {
        let mut engine = ClefDecisionEngine::new(ClefType::G, ClefThresholds::default());
        assert_eq!(engine.step(pos(0), one(57), TieState::Untied), None);
        assert_eq!(engine.counter().count(), 1);
        assert_eq!(engine.step(pos(1), one(64), TieState::TiedFor), None);
        assert_eq!(engine.step(pos(2), one(40), TieState::TiedBoth), None);
        assert_eq!(engine.counter().count(), 0);
    }

    #[test]
    fn tied_run_without_start_is_skipped() {
        let mut engine = ClefDecisionEngine::new(ClefType::G, ClefThresholds::default());
        assert_eq!(engine.step(pos(0), one(40), TieState::TiedBoth), None);
        assert_eq!(engine.step(pos(1), one(40), TieState::TiedBack), None);
        assert_eq!(engine.current_clef(), ClefType::G);
    }

    #[test]
    fn counter_resets_after_commit() {
        let mut engine = ClefDecisionEngine::new(ClefType::G, ClefThresholds::default());
        for i in 0..3 {
            engine.step(pos(i), one(57), TieState::Untied);
        }
        assert_eq!(engine.current_clef(), ClefType::F);
        assert!(!engine.counter().is_active());
    }
}
