//! Octave mapper implementation
//!
//! Maps input values linearly onto an exponent and raises 2 to it, so
//! equal controller movements give equal musical intervals.
//!
//! Use cases:
//! - Operator frequency ratios
//! - Any control that should sweep in octaves

use super::{LinearMapper, Mapper};

/// Exponential mapper with base 2
///
/// For normalized input t in [0, 1]:
///   output = 2 ^ (lo + (hi - lo) * t)
///
/// where lo and hi are octave offsets, e.g. -8..2 spans 1/256 to 4.
pub struct OctaveMapper {
    exponent: LinearMapper,
}

impl OctaveMapper {
    /// Sweep from `2^octaves_lo` at controller 0 to `2^octaves_hi` at 127
    pub fn midi(name: impl Into<String>, octaves_lo: f64, octaves_hi: f64) -> Self {
        Self {
            exponent: LinearMapper::midi(name, octaves_lo, octaves_hi),
        }
    }
}

impl Mapper for OctaveMapper {
    fn name(&self) -> &str {
        self.exponent.name()
    }

    fn map(&self, input: f64) -> f64 {
        2f64.powf(self.exponent.map(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octave_mapper_endpoints() {
        let mapper = OctaveMapper::midi("op2freqscale", -8.0, 2.0);

        assert_eq!(mapper.map_midi(127), 4.0);
        assert_eq!(mapper.map_midi(0), 1.0 / 256.0);
    }

    #[test]
    fn test_octave_mapper_is_exponential() {
        // one octave per controller step
        let mapper = OctaveMapper::midi("test", 0.0, 127.0);

        assert_eq!(mapper.map_midi(0), 1.0);
        assert_eq!(mapper.map_midi(1), 2.0);
        assert_eq!(mapper.map_midi(5), 32.0);
        assert_eq!(mapper.map_midi(7) / mapper.map_midi(6), 2.0);
    }

    #[test]
    fn test_octave_mapper_clamped() {
        let mapper = OctaveMapper::midi("test", -1.0, 1.0);

        assert_eq!(mapper.map(-50.0), 0.5);
        assert_eq!(mapper.map(500.0), 2.0);
    }
}
