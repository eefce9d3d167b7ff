//! Synth definitions for the external synthesis server
//!
//! Signals are built as shared expression graphs, then flattened into a
//! [`SynthDef`] that encodes to the `.scsyndef` binary format.

mod graph;
mod signal;

pub use graph::{Input, SynthDef, Ugen};
pub use signal::{BinaryOp, DoneAction, EnvStage, Envelope, Params, Rate, Signal, SignalNode};
