//! Mapper trait

/// Largest value of a 7-bit MIDI data byte
pub const MAX_MIDI: f64 = 127.0;

/// Trait for functions that turn a controller value into a parameter value
pub trait Mapper: Send + Sync {
    /// Get the name of the parameter this mapper produces
    fn name(&self) -> &str;

    /// Map an input value to an output value
    fn map(&self, input: f64) -> f64;

    /// Map a 7-bit MIDI controller value
    fn map_midi(&self, value: u8) -> f32 {
        self.map(value as f64) as f32
    }
}
