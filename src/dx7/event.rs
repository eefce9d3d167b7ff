//! Note and controller events delivered to the session

use serde::{Deserialize, Serialize};

/// A note event: velocity 0 releases the note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub note: u8,
    pub velocity: u8,
}

impl Note {
    pub fn on(note: u8, velocity: u8) -> Self {
        Self { note, velocity }
    }

    pub fn off(note: u8) -> Self {
        Self { note, velocity: 0 }
    }

    pub fn is_on(&self) -> bool {
        self.velocity > 0
    }
}

/// A control change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ctrl {
    pub num: u8,
    pub value: u8,
}

impl Ctrl {
    pub fn new(num: u8, value: u8) -> Self {
        Self { num, value }
    }
}

/// Frequency in Hz of a MIDI note number, A4 = 440
pub fn midicps(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}
