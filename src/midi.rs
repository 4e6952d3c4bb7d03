//! MIDI import: turns a Standard MIDI File into a staff-based score.
//!
//! Each note-carrying track becomes a part with one staff. Notes are
//! snapped to a grid, grouped into chords, spread over up to four
//! voices, and cut at barlines with ties joining the pieces. Finally
//! the clef pass decides the clef changes of every staff.

use std::collections::HashMap;

use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::clef::{assign_clefs, clef_type_from_average_pitch, AveragePitch};
use crate::error::{ImportError, Result};
use crate::model::*;
use crate::options::{ClefThresholds, ImportOptions};

/// MIDI channel index (0-based) reserved for percussion.
pub const DRUM_CHANNEL: u8 = 9;

/// Largest accepted time signature denominator, as a power of two (1/64).
const MAX_BEAT_TYPE_POW: u8 = 6;

// ═══════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════

/// A note read from a track, in score ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiNote {
    pub on_tick: u32,
    pub off_tick: u32,
    pub pitch: u8,
    pub velocity: u8,
}

/// Notes and metadata of one MIDI track.
#[derive(Debug, Clone, Default)]
pub struct MidiTrack {
    pub name: Option<String>,
    /// Channel of the first channel message
    pub channel: Option<u8>,
    pub program: Option<u8>,
    pub notes: Vec<MidiNote>,
}

impl MidiTrack {
    pub fn is_drum(&self) -> bool {
        self.channel == Some(DRUM_CHANNEL)
    }
}

/// Contents of a MIDI file, rescaled to `DIVISION` ticks per quarter.
#[derive(Debug, Clone, Default)]
pub struct MidiFile {
    pub tracks: Vec<MidiTrack>,
    /// Time signature changes: (tick, (beats, beat_type))
    pub time_sigs: Vec<(u32, (u32, u32))>,
}

/// Import a Standard MIDI File and assign clefs to every staff.
pub fn import_midi(data: &[u8], options: &ImportOptions) -> Result<Score> {
    options.validate()?;
    let file = read_midi(data)?;
    let mut score = build_score(&file, options);
    assign_clefs(&mut score, options);
    debug!(
        "imported {} part(s), {} measure(s)",
        score.parts.len(),
        score.measures.len()
    );
    Ok(score)
}

// ═══════════════════════════════════════════════════════════════════════
// SMF reading
// ═══════════════════════════════════════════════════════════════════════

/// Parse SMF bytes into tracks of paired notes.
pub fn read_midi(data: &[u8]) -> Result<MidiFile> {
    let smf = Smf::parse(data)?;
    let tpq = match smf.header.timing {
        Timing::Metrical(tpq) => u32::from(tpq.as_int()).max(1),
        Timing::Timecode(..) => return Err(ImportError::UnsupportedTiming),
    };
    let rescale = |tick: u64| -> Result<u32> {
        u32::try_from(tick.saturating_mul(u64::from(DIVISION)) / u64::from(tpq))
            .map_err(|_| ImportError::TickOverflow(tick))
    };

    let mut file = MidiFile::default();
    for events in &smf.tracks {
        let mut track = MidiTrack::default();
        // Sounding notes per (channel, key), oldest first
        let mut open: HashMap<(u8, u8), Vec<(u32, u8)>> = HashMap::new();
        let mut tick: u64 = 0;

        for event in events {
            tick += u64::from(event.delta.as_int());
            let now = rescale(tick)?;
            match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    track.channel.get_or_insert(channel);
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open.entry((channel, key.as_int()))
                                .or_default()
                                .push((now, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            if let Some(stack) = open.get_mut(&(channel, key.as_int())) {
                                if !stack.is_empty() {
                                    let (on_tick, velocity) = stack.remove(0);
                                    track.notes.push(MidiNote {
                                        on_tick,
                                        off_tick: now,
                                        pitch: key.as_int(),
                                        velocity,
                                    });
                                }
                            }
                        }
                        MidiMessage::ProgramChange { program } => {
                            track.program.get_or_insert(program.as_int());
                        }
                        _ => {}
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    track.name = Some(String::from_utf8_lossy(name).trim().to_string());
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, den_pow, _, _)) => {
                    if den_pow > MAX_BEAT_TYPE_POW {
                        warn!("ignoring time signature {num}/2^{den_pow} at tick {now}");
                        continue;
                    }
                    file.time_sigs.push((now, (u32::from(num).max(1), 1 << den_pow)));
                }
                _ => {}
            }
        }

        // Notes never switched off end with the track.
        let end = rescale(tick)?;
        for ((_, key), stack) in open {
            for (on_tick, velocity) in stack {
                track.notes.push(MidiNote {
                    on_tick,
                    off_tick: end,
                    pitch: key,
                    velocity,
                });
            }
        }
        track.notes.sort_by_key(|n| (n.on_tick, n.pitch));
        file.tracks.push(track);
    }

    file.time_sigs.sort_by_key(|&(tick, _)| tick);
    Ok(file)
}

// ═══════════════════════════════════════════════════════════════════════
// Score building
// ═══════════════════════════════════════════════════════════════════════

/// A chord as laid out in a voice, before barline splitting.
#[derive(Debug, Clone)]
struct VoiceChord {
    onset: u32,
    duration: u32,
    /// (pitch, velocity)
    notes: Vec<(u8, u8)>,
}

impl VoiceChord {
    fn end(&self) -> u32 {
        self.onset + self.duration
    }
}

/// Build the score (without clefs) from parsed MIDI data.
pub fn build_score(file: &MidiFile, options: &ImportOptions) -> Score {
    let grid = options.grid();
    let mut score = Score::new();
    score.title = file
        .tracks
        .iter()
        .find(|t| t.notes.is_empty())
        .and_then(|t| t.name.clone())
        .filter(|n| !n.is_empty());

    let note_tracks: Vec<&MidiTrack> = file.tracks.iter().filter(|t| !t.notes.is_empty()).collect();

    let mut voiced: Vec<(usize, &MidiTrack, Vec<Vec<VoiceChord>>)> = Vec::new();
    let mut end_tick = 0;
    for (track_index, track) in note_tracks.into_iter().enumerate() {
        if !options.track(track_index).do_import {
            debug!("skipping track {track_index} by request");
            continue;
        }
        let voices = assign_voices(group_chords(&track.notes, grid));
        end_tick = voices
            .iter()
            .flatten()
            .map(VoiceChord::end)
            .fold(end_tick, u32::max);
        voiced.push((track_index, track, voices));
    }

    score.measures = build_measures(&file.time_sigs, end_tick);

    for (track_index, track, voices) in voiced {
        let staff_idx = score.staves.len();
        let concert_clef = if track.is_drum() {
            ClefType::G
        } else {
            let avg: AveragePitch = track.notes.iter().map(|n| i32::from(n.pitch)).collect();
            let mid = ClefThresholds::default().mid_pitch;
            avg.pitch()
                .map_or(ClefType::G, |p| clef_type_from_average_pitch(p, mid))
        };

        let mut staff = Staff::new(staff_idx, concert_clef);
        for (voice, chords) in voices.iter().enumerate() {
            for chord in chords {
                add_chord(&score, &mut staff, voice, chord);
            }
        }
        fill_rests(&score, &mut staff, &voices[0]);

        debug!(
            "track {}: {} note(s) in staff {}, concert clef {:?}",
            track_index,
            track.notes.len(),
            staff_idx,
            concert_clef
        );
        score.parts.push(Part {
            name: track
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("Track {}", track_index + 1)),
            track_index,
            first_staff: staff_idx,
            staff_count: 1,
            midi_program: track.program,
            midi_channel: track.channel,
            is_drum: track.is_drum(),
        });
        score.staves.push(staff);
    }

    score
}

/// Snap to the nearest grid line.
fn quantize(tick: u32, grid: u32) -> u32 {
    tick.saturating_add(grid / 2) / grid * grid
}

/// Quantize notes and group those with equal onset and offset into chords.
fn group_chords(notes: &[MidiNote], grid: u32) -> Vec<VoiceChord> {
    let mut chords: Vec<VoiceChord> = Vec::new();
    let mut index: HashMap<(u32, u32), usize> = HashMap::new();

    for note in notes {
        let onset = quantize(note.on_tick, grid);
        let offset = quantize(note.off_tick, grid).max(onset.saturating_add(grid));
        let i = *index.entry((onset, offset)).or_insert_with(|| {
            chords.push(VoiceChord {
                onset,
                duration: offset - onset,
                notes: Vec::new(),
            });
            chords.len() - 1
        });
        if !chords[i].notes.iter().any(|&(p, _)| p == note.pitch) {
            chords[i].notes.push((note.pitch, note.velocity));
        }
    }

    // Longer chords first at equal onsets so they settle in the lower voices.
    chords.sort_by(|a, b| a.onset.cmp(&b.onset).then(b.duration.cmp(&a.duration)));
    chords
}

/// Spread chords over the voices, lowest free voice first.
fn assign_voices(chords: Vec<VoiceChord>) -> Vec<Vec<VoiceChord>> {
    let mut voices: Vec<Vec<VoiceChord>> = vec![Vec::new(); VOICES];

    for chord in chords {
        let free = voices
            .iter()
            .position(|v| v.last().map_or(true, |last| last.end() <= chord.onset));
        match free {
            Some(voice) => voices[voice].push(chord),
            None => {
                let last_voice = &mut voices[VOICES - 1];
                let Some(last) = last_voice.last_mut() else {
                    continue;
                };
                if last.onset == chord.onset {
                    for note in chord.notes {
                        if !last.notes.iter().any(|&(p, _)| p == note.0) {
                            last.notes.push(note);
                        }
                    }
                } else {
                    last.duration = chord.onset - last.onset;
                    last_voice.push(chord);
                }
            }
        }
    }
    voices
}

/// Build the measure map from time signature changes, covering `end_tick`.
///
/// A change that falls inside a measure takes effect at the next barline.
pub fn build_measures(time_sigs: &[(u32, (u32, u32))], end_tick: u32) -> Vec<Measure> {
    let mut measures = Vec::new();
    let mut sig = (4, 4);
    let mut pending = time_sigs.iter().peekable();
    let mut tick = 0;

    loop {
        while let Some(&(_, s)) = pending.next_if(|&&(t, _)| t <= tick) {
            sig = s;
        }
        let len = (sig.0 * 4 * DIVISION / sig.1.max(1)).max(1);
        measures.push(Measure {
            number: measures.len() + 1,
            tick,
            len,
            time_sig: sig,
        });
        match tick.checked_add(len) {
            Some(next) if next < end_tick => tick = next,
            _ => break,
        }
    }
    measures
}

/// Split `[start, start + len)` at barlines.
fn split_at_barlines(score: &Score, start: u32, len: u32) -> Vec<(u32, u32)> {
    let end = start + len;
    let mut pieces = Vec::new();
    let mut tick = start;
    while tick < end {
        let bar_end = score
            .tick_to_measure(tick)
            .map(|m| score.measures[m].tick.saturating_add(score.measures[m].len))
            .filter(|&e| e > tick)
            .unwrap_or(end);
        let piece_end = bar_end.min(end);
        pieces.push((tick, piece_end - tick));
        tick = piece_end;
    }
    pieces
}

fn add_chord(score: &Score, staff: &mut Staff, voice: usize, chord: &VoiceChord) {
    let pieces = split_at_barlines(score, chord.onset, chord.duration);
    let last = pieces.len().saturating_sub(1);
    for (i, (tick, len)) in pieces.into_iter().enumerate() {
        let notes = chord
            .notes
            .iter()
            .map(|&(pitch, velocity)| Note {
                pitch,
                velocity,
                tie_for: i < last,
                tie_back: i > 0,
            })
            .collect();
        let segment = staff.segment_at_mut_or_insert(score.position(tick));
        segment.voices[voice] = Some(ChordRest::Chord(Chord {
            duration: len,
            notes,
        }));
    }
}

/// Fill the gaps of the first voice with rests up to the end of the score.
fn fill_rests(score: &Score, staff: &mut Staff, chords: &[VoiceChord]) {
    let score_end = score.measures.last().map_or(0, |m| m.tick.saturating_add(m.len));
    let mut gaps = Vec::new();
    let mut cursor = 0;
    for chord in chords {
        if chord.onset > cursor {
            gaps.push((cursor, chord.onset - cursor));
        }
        cursor = cursor.max(chord.end());
    }
    if score_end > cursor {
        gaps.push((cursor, score_end - cursor));
    }

    for (start, len) in gaps {
        for (tick, len) in split_at_barlines(score, start, len) {
            let segment = staff.segment_at_mut_or_insert(score.position(tick));
            segment.voices[0] = Some(ChordRest::Rest { duration: len });
        }
    }
}
