//! Integration tests for the MIDI import pipeline:
//! SMF reading, score building, and clef assignment.

use midiclef::{
    import_bytes, import_midi, score_to_json, validate, ClefType, ImportError, ImportOptions,
    Score, TrackOperations,
};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use pretty_assertions::assert_eq;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// (start tick, duration, pitch) at 480 ticks per quarter.
type Played = (u32, u32, u8);

fn track<'a>(name: &'a str, channel: u8, notes: &[Played]) -> Track<'a> {
    let mut events: Vec<(u32, TrackEventKind<'a>)> = vec![(
        0,
        TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
    )];
    for &(start, len, pitch) in notes {
        events.push((
            start,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOn {
                    key: pitch.into(),
                    vel: 80.into(),
                },
            },
        ));
        events.push((
            start + len,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff {
                    key: pitch.into(),
                    vel: 0.into(),
                },
            },
        ));
    }
    // Note-offs before note-ons at the same tick
    events.sort_by_key(|(tick, kind)| {
        let on = matches!(
            kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { .. },
                ..
            }
        );
        (*tick, on)
    });

    let mut last = 0;
    let mut out: Track<'a> = events
        .into_iter()
        .map(|(tick, kind)| {
            let delta = tick - last;
            last = tick;
            TrackEvent {
                delta: delta.into(),
                kind,
            }
        })
        .collect();
    out.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    out
}

fn conductor<'a>(time_sig: (u8, u8)) -> Track<'a> {
    vec![
        TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Test Song")),
        },
        TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(time_sig.0, time_sig.1, 24, 8)),
        },
        TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]
}

fn smf_bytes(tracks: Vec<Track>, tpq: u16) -> Vec<u8> {
    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(tpq.into()),
        },
        tracks,
    };
    let mut out = Vec::new();
    smf.write(&mut out).unwrap();
    out
}

fn quarters(pitches: &[u8]) -> Vec<Played> {
    pitches
        .iter()
        .enumerate()
        .map(|(i, &p)| (i as u32 * 480, 480, p))
        .collect()
}

fn clef_changes(score: &Score, staff: usize) -> Vec<(u32, ClefType)> {
    score.staves[staff]
        .clef_changes()
        .map(|(p, c)| (p.tick, c.clef_type))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Score building
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn one_part_per_note_track() {
    init_logger();
    let data = smf_bytes(
        vec![
            conductor((4, 2)),
            track("Right", 0, &quarters(&[72, 74, 76, 77])),
            track("Left", 1, &quarters(&[36, 43, 48, 43])),
        ],
        480,
    );
    let score = import_bytes(&data, &ImportOptions::default()).unwrap();

    assert_eq!(score.title.as_deref(), Some("Test Song"));
    assert_eq!(score.parts.len(), 2);
    assert_eq!(score.parts[0].name, "Right");
    assert_eq!(score.parts[1].track_index, 1);
    assert_eq!(score.staves[0].concert_clef, ClefType::G);
    assert_eq!(score.staves[1].concert_clef, ClefType::F);
    assert_eq!(score.measures.len(), 1);
}

#[test]
fn ticks_are_rescaled() {
    // 96 ticks per quarter in the file
    let notes: Vec<Played> = (0..4).map(|i| (i * 96, 96, 67)).collect();
    let data = smf_bytes(vec![track("Melody", 0, &notes)], 96);
    let score = import_bytes(&data, &ImportOptions::default()).unwrap();
    let ticks: Vec<u32> = score.staves[0].segments().map(|s| s.tick()).collect();
    assert_eq!(ticks, vec![0, 480, 960, 1440]);
}

#[test]
fn note_across_barline_becomes_tied_pair() {
    let data = smf_bytes(
        vec![conductor((4, 2)), track("Melody", 0, &[(1440, 960, 64)])],
        480,
    );
    let score = import_bytes(&data, &ImportOptions::default()).unwrap();
    let staff = &score.staves[0];

    let first = staff.segment_at(1440).unwrap().chord(0).unwrap();
    let second = staff.segment_at(1920).unwrap().chord(0).unwrap();
    assert!(first.notes[0].tie_for);
    assert!(second.notes[0].tie_back);
    assert_eq!(score.measures.len(), 2);
    // Leading rest fills the gap before the note
    assert!(staff.segment_at(0).unwrap().is_rest());
}

#[test]
fn time_signature_sets_measure_length() {
    let data = smf_bytes(
        vec![conductor((3, 2)), track("Waltz", 0, &quarters(&[67; 6]))],
        480,
    );
    let score = import_bytes(&data, &ImportOptions::default()).unwrap();
    assert_eq!(score.measures.len(), 2);
    assert_eq!(score.measures[1].tick, 1440);
    assert_eq!(score.measures[1].time_sig, (3, 4));
}

#[test]
fn unreasonable_time_signature_is_ignored() {
    // Denominator 2^9 would give measures shorter than a tick
    let data = smf_bytes(
        vec![conductor((3, 9)), track("Melody", 0, &quarters(&[67; 4]))],
        480,
    );
    let score = import_bytes(&data, &ImportOptions::default()).unwrap();
    assert_eq!(score.measures.len(), 1);
    assert_eq!(score.measures[0].time_sig, (4, 4));
    assert_eq!(score.staves[0].segments().count(), 4);
}

// ═══════════════════════════════════════════════════════════════════════
// Clef assignment through import
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn melody_dropping_into_bass_gets_clef_change() {
    init_logger();
    let data = smf_bytes(
        vec![track("Cello", 0, &quarters(&[67, 69, 71, 72, 74, 72, 50, 48]))],
        480,
    );
    let score = import_bytes(&data, &ImportOptions::default()).unwrap();
    assert_eq!(score.staves[0].concert_clef, ClefType::G);
    assert_eq!(clef_changes(&score, 0), vec![(6 * 480, ClefType::F)]);
    assert!(validate(&score.staves[0]).is_empty());
}

#[test]
fn tied_low_note_changes_clef_at_tie_start() {
    // A long A3 starting in the last beat of bar one, tied into bar two
    let mut notes = quarters(&[72, 71, 69]);
    notes.push((1440, 1440, 57));
    let data = smf_bytes(vec![conductor((4, 2)), track("Voice", 0, &notes)], 480);
    let score = import_bytes(&data, &ImportOptions::default()).unwrap();

    assert_eq!(clef_changes(&score, 0), vec![(1440, ClefType::F)]);
    assert!(validate(&score.staves[0]).is_empty());
}

#[test]
fn drum_track_keeps_initial_clef() {
    let data = smf_bytes(
        vec![track("Drums", 9, &quarters(&[36, 38, 36, 38, 42, 42]))],
        480,
    );
    let score = import_bytes(&data, &ImportOptions::default()).unwrap();
    assert!(score.parts[0].is_drum);
    assert_eq!(score.staves[0].concert_clef, ClefType::G);
    assert!(clef_changes(&score, 0).is_empty());
    assert!(score.staves[0].header_clef.is_some());
}

#[test]
fn change_clef_can_be_disabled_per_track() {
    let pitches = [72, 74, 40, 38, 76, 77];
    let data = smf_bytes(
        vec![track("A", 0, &quarters(&pitches)), track("B", 1, &quarters(&pitches))],
        480,
    );
    let options = ImportOptions {
        tracks: vec![
            TrackOperations {
                do_import: true,
                change_clef: false,
            },
            TrackOperations::default(),
        ],
        ..ImportOptions::default()
    };
    let score = import_midi(&data, &options).unwrap();
    assert!(clef_changes(&score, 0).is_empty());
    assert_eq!(
        clef_changes(&score, 1),
        vec![(960, ClefType::F), (1920, ClefType::G)]
    );
}

#[test]
fn skipped_track_is_not_imported() {
    let data = smf_bytes(
        vec![
            track("A", 0, &quarters(&[60, 62])),
            track("B", 1, &quarters(&[48, 50])),
        ],
        480,
    );
    let options = ImportOptions::from_json(r#"{"tracks":[{"do_import":false}]}"#).unwrap();
    let score = import_midi(&data, &options).unwrap();
    assert_eq!(score.parts.len(), 1);
    assert_eq!(score.parts[0].name, "B");
    assert_eq!(score.parts[0].track_index, 1);
    assert_eq!(score.staves[0].index, 0);
}

// ═══════════════════════════════════════════════════════════════════════
// Errors and output
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn garbage_is_a_midi_error() {
    let err = import_bytes(b"not a midi file", &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, ImportError::Midi(_)), "got {err}");
}

#[test]
fn track_longer_than_tick_range_is_an_error() {
    // 17 maximal deltas add up past u32::MAX ticks
    let mut events: Track = (0..17)
        .map(|_| TrackEvent {
            delta: 0x0FFF_FFFF.into(),
            kind: TrackEventKind::Meta(MetaMessage::Text(b"padding")),
        })
        .collect();
    events.extend(track("Late", 0, &[(0, 480, 60)]));
    let data = smf_bytes(vec![events], 480);

    let err = import_bytes(&data, &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, ImportError::TickOverflow(_)), "got {err}");
}

#[test]
fn score_serializes_to_json() {
    let data = smf_bytes(vec![track("Melody", 0, &quarters(&[60, 40]))], 480);
    let score = import_bytes(&data, &ImportOptions::default()).unwrap();
    let json = score_to_json(&score).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["parts"][0]["name"], "Melody");
    assert_eq!(value["staves"][0]["header_clef"]["small"], false);
}
