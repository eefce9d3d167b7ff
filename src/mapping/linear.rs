//! Straight-line controller curve

use super::mapper::MAX_MIDI;
use super::Mapper;

/// Maps controller values 0..=127 evenly onto `lo..=hi`
///
/// `lo` may be greater than `hi` for a reversed control. Values outside
/// the controller range stay pinned to the ends.
pub struct LinearMapper {
    name: String,
    lo: f64,
    hi: f64,
}

impl LinearMapper {
    pub fn midi(name: impl Into<String>, lo: f64, hi: f64) -> Self {
        Self {
            name: name.into(),
            lo,
            hi,
        }
    }

    /// Point at fraction `t` of the way from `lo` to `hi`
    pub fn at(&self, t: f64) -> f64 {
        self.lo + (self.hi - self.lo) * t.clamp(0.0, 1.0)
    }
}

impl Mapper for LinearMapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn map(&self, input: f64) -> f64 {
        self.at(input / MAX_MIDI)
    }
}
