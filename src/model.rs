//! Data model for a score built from an imported MIDI performance.
//!
//! The model owns every placed element. Staves hold their rhythmic
//! positions ("segments") in tick order, plus a separate map of clef
//! segments so that clef changes can be inserted and removed without
//! disturbing the note content.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Number of voices per staff.
pub const VOICES: usize = 4;

/// Ticks per quarter note used throughout the score.
pub const DIVISION: u32 = 480;

/// A complete imported score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    /// Title (taken from the first track name, if any)
    pub title: Option<String>,
    /// Ticks per quarter note
    pub division: u32,
    /// Measure map shared by all staves
    pub measures: Vec<Measure>,
    /// Parts (one per imported MIDI track)
    pub parts: Vec<Part>,
    /// Staves, indexed by `Staff::index`
    pub staves: Vec<Staff>,
    /// Dynamic markings
    pub dynamics: Vec<Dynamic>,
}

/// A single measure (bar) in the measure map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    /// Measure number (1-based)
    pub number: usize,
    /// Start tick
    pub tick: u32,
    /// Length in ticks
    pub len: u32,
    /// Time signature: (beats, beat_type)
    pub time_sig: (u32, u32),
}

/// A musical part (one instrument).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    /// Part name (MIDI track name, if present)
    pub name: String,
    /// Position of the source track among the note-carrying MIDI tracks
    pub track_index: usize,
    /// Index of the part's first staff
    pub first_staff: usize,
    /// Number of staves in this part
    pub staff_count: usize,
    /// MIDI program number
    pub midi_program: Option<u8>,
    /// MIDI channel (0-based)
    pub midi_channel: Option<u8>,
    /// Percussion part (MIDI channel 10)
    pub is_drum: bool,
}

/// Clef sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClefType {
    /// Treble clef
    G,
    /// Bass clef
    F,
}

impl ClefType {
    /// The other clef.
    pub fn opposite(self) -> Self {
        match self {
            ClefType::G => ClefType::F,
            ClefType::F => ClefType::G,
        }
    }
}

/// A clef element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clef {
    pub clef_type: ClefType,
    /// Rendered at reduced size (clef changes inside a system)
    pub small: bool,
    /// Created by layout rather than by the import
    pub generated: bool,
    /// Magnification inherited from the staff
    pub mag: f64,
}

/// A staff-scoped location in musical time.
///
/// Ordered by tick; the measure index is carried along so that
/// diagnostics can name the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RhythmicPosition {
    pub tick: u32,
    /// Index into `Score::measures`
    pub measure: usize,
}

impl RhythmicPosition {
    pub fn new(tick: u32, measure: usize) -> Self {
        Self { tick, measure }
    }
}

/// A played note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI pitch (middle C = 60)
    pub pitch: u8,
    pub velocity: u8,
    /// Tied to the same pitch in the next chord of this voice
    pub tie_for: bool,
    /// Tied from the same pitch in the previous chord of this voice
    pub tie_back: bool,
}

/// One or more notes sharing onset and duration in a voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    /// Duration in ticks
    pub duration: u32,
    pub notes: Vec<Note>,
}

/// Content of one voice at one rhythmic position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChordRest {
    Chord(Chord),
    Rest { duration: u32 },
}

impl ChordRest {
    pub fn as_chord(&self) -> Option<&Chord> {
        match self {
            ChordRest::Chord(chord) => Some(chord),
            ChordRest::Rest { .. } => None,
        }
    }

    pub fn duration(&self) -> u32 {
        match self {
            ChordRest::Chord(chord) => chord.duration,
            ChordRest::Rest { duration } => *duration,
        }
    }
}

/// Chords and rests of all voices starting at one rhythmic position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub position: RhythmicPosition,
    pub voices: [Option<ChordRest>; VOICES],
}

impl Segment {
    pub fn new(position: RhythmicPosition) -> Self {
        Self {
            position,
            voices: Default::default(),
        }
    }

    pub fn tick(&self) -> u32 {
        self.position.tick
    }

    /// The chord in `voice`, if that voice holds one here.
    pub fn chord(&self, voice: usize) -> Option<&Chord> {
        self.voices.get(voice)?.as_ref()?.as_chord()
    }

    /// True when no voice holds a chord (rests only, or nothing).
    pub fn is_rest(&self) -> bool {
        (0..VOICES).all(|v| self.chord(v).is_none())
    }
}

/// Clef elements at one rhythmic position, one slot per voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClefSegment {
    pub position: RhythmicPosition,
    pub elements: [Option<Clef>; VOICES],
}

impl ClefSegment {
    pub fn new(position: RhythmicPosition) -> Self {
        Self {
            position,
            elements: Default::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(Option::is_none)
    }
}

/// A single staff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    /// Index of the staff within the score
    pub index: usize,
    /// Nominal clef before any import-driven changes
    pub concert_clef: ClefType,
    /// Staff magnification
    pub mag: f64,
    /// Full-size clef at the start of the staff
    pub header_clef: Option<Clef>,
    /// Chord/rest segments, ascending by tick, one per tick
    pub segments: Vec<Segment>,
    /// Clef change segments keyed by tick
    pub clef_segments: BTreeMap<u32, ClefSegment>,
}

impl Staff {
    pub fn new(index: usize, concert_clef: ClefType) -> Self {
        Self {
            index,
            concert_clef,
            mag: 1.0,
            header_clef: None,
            segments: Vec::new(),
            clef_segments: BTreeMap::new(),
        }
    }

    /// First track number of this staff (`index * VOICES`).
    pub fn first_track(&self) -> usize {
        self.index * VOICES
    }

    /// The staff's very first rhythmic position.
    pub fn first_position(&self) -> RhythmicPosition {
        RhythmicPosition::new(0, 0)
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn segment_at(&self, tick: u32) -> Option<&Segment> {
        self.segments
            .binary_search_by_key(&tick, Segment::tick)
            .ok()
            .map(|i| &self.segments[i])
    }

    /// Find the segment at `position`, creating it in tick order if absent.
    pub fn segment_at_mut_or_insert(&mut self, position: RhythmicPosition) -> &mut Segment {
        let idx = match self
            .segments
            .binary_search_by_key(&position.tick, Segment::tick)
        {
            Ok(i) => i,
            Err(i) => {
                self.segments.insert(i, Segment::new(position));
                i
            }
        };
        &mut self.segments[idx]
    }

    pub fn clef_segment(&self, tick: u32) -> Option<&ClefSegment> {
        self.clef_segments.get(&tick)
    }

    pub fn clef_segment_mut(&mut self, tick: u32) -> Option<&mut ClefSegment> {
        self.clef_segments.get_mut(&tick)
    }

    pub fn clef_segment_mut_or_insert(&mut self, position: RhythmicPosition) -> &mut ClefSegment {
        self.clef_segments
            .entry(position.tick)
            .or_insert_with(|| ClefSegment::new(position))
    }

    pub fn remove_clef_segment(&mut self, tick: u32) -> Option<ClefSegment> {
        self.clef_segments.remove(&tick)
    }

    /// Clef changes (voice 0 slot) in tick order.
    pub fn clef_changes(&self) -> impl Iterator<Item = (RhythmicPosition, &Clef)> {
        self.clef_segments
            .values()
            .filter_map(|seg| seg.elements[0].as_ref().map(|c| (seg.position, c)))
    }

    /// Clef in effect at `tick`, counting a change placed exactly at `tick`.
    pub fn clef_at(&self, tick: u32) -> Option<ClefType> {
        self.clef_segments
            .range(..=tick)
            .rev()
            .find_map(|(_, seg)| seg.elements[0].as_ref())
            .or(self.header_clef.as_ref())
            .map(|c| c.clef_type)
    }

    /// Clef in effect just before `tick`, ignoring any change at `tick` itself.
    pub fn clef_before(&self, tick: u32) -> Option<ClefType> {
        self.clef_segments
            .range(..tick)
            .rev()
            .find_map(|(_, seg)| seg.elements[0].as_ref())
            .or(self.header_clef.as_ref())
            .map(|c| c.clef_type)
    }
}

/// Scope a dynamic marking applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DynamicRange {
    Voice,
    Staff,
    Part,
    System,
}

/// A dynamic marking (p, mf, ff, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dynamic {
    pub tick: u32,
    /// Track the marking is attached to
    pub track: usize,
    pub range: DynamicRange,
    /// Marking text, e.g. "mf"
    pub kind: String,
}

impl Score {
    /// Create a new empty score.
    pub fn new() -> Self {
        Self {
            title: None,
            division: DIVISION,
            measures: Vec::new(),
            parts: Vec::new(),
            staves: Vec::new(),
            dynamics: Vec::new(),
        }
    }

    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }

    /// Index of the measure containing `tick`.
    pub fn tick_to_measure(&self, tick: u32) -> Option<usize> {
        let idx = self.measures.partition_point(|m| m.tick <= tick);
        if idx == 0 {
            return None;
        }
        let m = &self.measures[idx - 1];
        (tick < m.tick + m.len || idx == self.measures.len()).then_some(idx - 1)
    }

    /// Rhythmic position for `tick`, clamped to the first measure.
    pub fn position(&self, tick: u32) -> RhythmicPosition {
        RhythmicPosition::new(tick, self.tick_to_measure(tick).unwrap_or(0))
    }

    /// Part owning `staff`.
    pub fn part_of_staff(&self, staff: usize) -> Option<&Part> {
        self.parts
            .iter()
            .find(|p| staff >= p.first_staff && staff < p.first_staff + p.staff_count)
    }

    pub fn first_track_of_part(&self, track: usize) -> Option<usize> {
        self.part_of_staff(track / VOICES)
            .map(|p| p.first_staff * VOICES)
    }

    pub fn last_track_of_part(&self, track: usize) -> Option<usize> {
        self.part_of_staff(track / VOICES)
            .map(|p| (p.first_staff + p.staff_count) * VOICES - 1)
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::new()
    }
}
