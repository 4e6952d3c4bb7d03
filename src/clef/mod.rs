//! Automatic clef assignment for imported staves.
//!
//! For each staff the pass walks the rhythmic positions in order, scores
//! each one by the average pitch of its notes, and lets the decision
//! engine choose where treble and bass clefs change. Ties are tracked so
//! that a clef is never placed inside a tied run.

mod average_pitch;
mod engine;
mod pass;
mod placer;
mod validate;

pub use average_pitch::{average_segment_pitch, clef_type_from_average_pitch, AveragePitch};
pub use engine::{ClefChange, ClefDecisionEngine, HysteresisCounter};
pub use pass::{assign_clefs, create_clefs, StaffClefPass};
pub use placer::{ClefAssignment, ClefPlacer, Placement};
pub use validate::{validate, Violation};
