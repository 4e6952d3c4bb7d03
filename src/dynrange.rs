//! Choosing which dynamic marking applies to a track.
//!
//! Several markings can cover one track at the same tick: one written
//! for the voice itself, one for its staff, one for the whole part, one
//! for the system. The filter keeps the most specific candidate using a
//! priority ladder; a candidate is only considered when its priority is
//! strictly higher than the current one, except that a later marking for
//! the track's own voice always replaces an earlier one.
//!
//! MIDI import does not create dynamics; `Score::dynamics` is filled by
//! callers that attach markings to an imported score.

use crate::model::{Dynamic, DynamicRange, Score, VOICES};

/// When a matching candidate becomes the active marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adopt {
    Always,
    /// Only when voice markings are shared across the part
    VoiceToPart,
    /// Shared across the part, or the track leads a part the marking
    /// does not belong to
    VoiceToPartOrPartLeader,
}

struct Rule {
    range: DynamicRange,
    matches: fn(&DynRangeFilter, &Dynamic) -> bool,
    priority: u8,
    /// A candidate at the same priority replaces the active one
    replaces_equal: bool,
    adopt: Adopt,
}

fn on_track(f: &DynRangeFilter, d: &Dynamic) -> bool {
    d.track == f.track
}

fn same_staff(f: &DynRangeFilter, d: &Dynamic) -> bool {
    d.track / VOICES == f.track / VOICES
}

fn inside_part(f: &DynRangeFilter, d: &Dynamic) -> bool {
    match (f.score.first_track_of_part(d.track), f.score.last_track_of_part(d.track)) {
        (Some(first), Some(last)) => (first..=last).contains(&f.track),
        _ => false,
    }
}

fn any(_: &DynRangeFilter, _: &Dynamic) -> bool {
    true
}

/// Ordered from most to least specific; the first matching row wins.
const RULES: &[Rule] = &[
    Rule { range: DynamicRange::Voice, matches: on_track, priority: 7, replaces_equal: true, adopt: Adopt::Always },
    Rule { range: DynamicRange::Staff, matches: on_track, priority: 6, replaces_equal: false, adopt: Adopt::Always },
    Rule { range: DynamicRange::Staff, matches: same_staff, priority: 5, replaces_equal: false, adopt: Adopt::VoiceToPart },
    Rule { range: DynamicRange::Part, matches: on_track, priority: 4, replaces_equal: false, adopt: Adopt::Always },
    Rule { range: DynamicRange::Part, matches: inside_part, priority: 3, replaces_equal: false, adopt: Adopt::VoiceToPart },
    Rule { range: DynamicRange::System, matches: on_track, priority: 2, replaces_equal: false, adopt: Adopt::Always },
    Rule { range: DynamicRange::System, matches: any, priority: 1, replaces_equal: false, adopt: Adopt::VoiceToPartOrPartLeader },
];

/// Picks the active dynamic for one track among competing candidates.
pub struct DynRangeFilter<'a> {
    score: &'a Score,
    track: usize,
    voice_to_part: bool,
    priority: u8,
    active: Option<&'a Dynamic>,
}

impl<'a> DynRangeFilter<'a> {
    pub fn new(score: &'a Score, track: usize, voice_to_part: bool) -> Self {
        Self {
            score,
            track,
            voice_to_part,
            priority: 0,
            active: None,
        }
    }

    /// Offer a candidate. Returns the active marking afterwards.
    pub fn add(&mut self, dynamic: &'a Dynamic) -> Option<&'a Dynamic> {
        let this = &*self;
        let outcome = RULES
            .iter()
            .filter(|r| r.range == dynamic.range)
            .filter(|r| r.priority > this.priority || (r.replaces_equal && r.priority == this.priority))
            .find(|r| (r.matches)(this, dynamic))
            .map(|r| (r.priority, this.adopts(r.adopt, dynamic)));

        if let Some((priority, adopted)) = outcome {
            if adopted {
                self.active = Some(dynamic);
            }
            self.priority = priority;
        }
        self.active
    }

    pub fn active(&self) -> Option<&'a Dynamic> {
        self.active
    }

    fn adopts(&self, adopt: Adopt, dynamic: &Dynamic) -> bool {
        match adopt {
            Adopt::Always => true,
            Adopt::VoiceToPart => self.voice_to_part,
            Adopt::VoiceToPartOrPartLeader => {
                self.voice_to_part
                    || (self.score.first_track_of_part(self.track) == Some(self.track)
                        && !inside_part(self, dynamic))
            }
        }
    }
}

/// The dynamic in effect for `track` at each tick that has markings.
pub fn dynamics_for_track(score: &Score, track: usize, voice_to_part: bool) -> Vec<&Dynamic> {
    let mut sorted: Vec<&Dynamic> = score.dynamics.iter().collect();
    sorted.sort_by_key(|d| d.tick);

    sorted
        .chunk_by(|a, b| a.tick == b.tick)
        .filter_map(|group| {
            let mut filter = DynRangeFilter::new(score, track, voice_to_part);
            for d in group {
                filter.add(d);
            }
            filter.active()
        })
        .collect()
}
