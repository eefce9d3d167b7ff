//! dx7 - FM synthesis in the manner of the Yamaha DX7
//!
//! Decodes DX7 sysex voice banks, compiles the 32 operator algorithms into
//! SuperCollider synth definitions, and plays them polyphonically from
//! MIDI through a running `scsynth`.

pub mod config;
pub mod dx7;
pub mod engine;
pub mod mapping;
pub mod midi;
pub mod rpc;
pub mod synth;
pub mod synthdef;
pub mod sysex;

pub use config::Dx7Config;
pub use dx7::{Ctrl, Dx7, Dx7Error, Note};
pub use engine::{ScsynthClient, SynthEngine};
