//! midiclef: MIDI import into staff notation with automatic clef assignment.
//!
//! Each note-carrying MIDI track becomes a staff. After the notes are laid
//! out, every staff gets its initial clef and, unless disabled for the
//! track, treble/bass clef changes that follow the pitch content without
//! splitting tied notes or flickering on borderline pitches.
//!
//! # Example
//! ```no_run
//! use midiclef::{import_file, ImportOptions};
//!
//! let score = import_file("path/to/performance.mid", &ImportOptions::default()).unwrap();
//! for staff in &score.staves {
//!     println!("staff {}: {} clef change(s)", staff.index, staff.clef_changes().count());
//! }
//! ```

pub mod clef;
pub mod dynrange;
pub mod error;
pub mod midi;
pub mod model;
pub mod options;
pub mod tie;

use std::path::Path;

pub use clef::{assign_clefs, create_clefs, validate, ClefAssignment, StaffClefPass, Violation};
pub use error::{ImportError, Result};
pub use midi::import_midi;
pub use model::*;
pub use options::{ClefThresholds, ImportOptions, Quantize, TrackOperations};

/// Import a MIDI file from a file path.
pub fn import_file<P: AsRef<Path>>(path: P, options: &ImportOptions) -> Result<Score> {
    let data = std::fs::read(path.as_ref())?;
    import_bytes(&data, options)
}

/// Import MIDI from raw bytes.
pub fn import_bytes(data: &[u8], options: &ImportOptions) -> Result<Score> {
    import_midi(data, options)
}

/// Convert an imported score to a JSON string.
/// Useful for passing data across FFI boundaries.
pub fn score_to_json(score: &Score) -> Result<String> {
    serde_json::to_string_pretty(score).map_err(ImportError::Serialize)
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI for static library / cdylib consumers
// ═══════════════════════════════════════════════════════════════════════

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Import MIDI bytes and return the score as a JSON C string.
/// The caller must free the returned string with `midiclef_free_string`.
///
/// `options_json` may be null for default options.
///
/// # Safety
/// `data` must point to `len` valid bytes. `options_json` must be null or a
/// valid null-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn midiclef_import_bytes(
    data: *const u8,
    len: usize,
    options_json: *const c_char,
) -> *mut c_char {
    if data.is_null() || len == 0 {
        return std::ptr::null_mut();
    }
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };

    let options = if options_json.is_null() {
        Ok(ImportOptions::default())
    } else {
        match unsafe { CStr::from_ptr(options_json) }.to_str() {
            Ok(json) => ImportOptions::from_json(json),
            Err(_) => return std::ptr::null_mut(),
        }
    };

    let json = options
        .and_then(|opts| import_bytes(bytes, &opts))
        .and_then(|score| score_to_json(&score));
    match json {
        Ok(json) => CString::new(json).unwrap_or_default().into_raw(),
        Err(e) => {
            log::warn!("midiclef_import_bytes failed: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Free a string previously returned by midiclef functions.
///
/// # Safety
/// `ptr` must be a string previously returned by a midiclef function, or null.
#[no_mangle]
pub unsafe extern "C" fn midiclef_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}
