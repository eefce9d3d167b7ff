//! Mapping system for transforming controller values to synth parameters
//!
//! Maps 7-bit MIDI values to parameter values using scaling curves.

mod linear;
mod mapper;
mod octave;

pub use linear::LinearMapper;
pub use mapper::{Mapper, MAX_MIDI};
pub use octave::OctaveMapper;

use crate::config::CurveKind;

/// Build a mapper from the MIDI range for a configured curve
pub fn for_curve(kind: &CurveKind, name: &str, min: f64, max: f64) -> Box<dyn Mapper> {
    match kind {
        CurveKind::Linear => Box::new(LinearMapper::midi(name, min, max)),
        CurveKind::Octaves => Box::new(OctaveMapper::midi(name, min, max)),
    }
}
