//! Synthesis engine boundary
//!
//! Voices are rendered by an external server. The session talks to it
//! through [`SynthEngine`]; [`ScsynthClient`] is the implementation for
//! SuperCollider's `scsynth`.

pub mod osc;
mod scsynth;

pub use osc::{OscArg, OscError, OscMessage};
pub use scsynth::ScsynthClient;

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::synthdef::SynthDef;

/// Parameter values keyed by synth parameter name
pub type ParamMap = BTreeMap<String, f32>;

/// Errors talking to the synthesis engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no reply to {command} within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("{command} failed: {reason}")]
    Failed { command: String, reason: String },

    #[error("malformed reply: {0}")]
    Osc(#[from] OscError),

    #[error("engine connection closed")]
    Disconnected,
}

/// Handle to a running voice on the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    pub id: i32,
}

/// Operations the session needs from a synthesis engine
pub trait SynthEngine: Send + Sync {
    /// Upload a definition; sending the same name again is a no-op
    fn send_definition(&self, def: &SynthDef) -> Result<(), EngineError>;

    /// Start a voice of the named definition with initial parameters
    fn start_voice(&self, def_name: &str, voice_id: i32, params: &ParamMap)
        -> Result<VoiceHandle, EngineError>;

    /// Update parameters of a running voice
    fn set_voice_params(&self, voice: &VoiceHandle, params: &ParamMap) -> Result<(), EngineError>;
}

#[cfg(test)]
pub mod testing {
    //! In-memory engine that records every call

    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Definition(String),
        Start { def: String, id: i32, params: ParamMap },
        Set { id: i32, params: ParamMap },
    }

    #[derive(Default)]
    pub struct RecordingEngine {
        calls: Mutex<Vec<Call>>,
        failing: Mutex<HashSet<i32>>,
    }

    impl RecordingEngine {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make parameter updates to this voice fail
        pub fn fail_voice(&self, id: i32) {
            self.failing.lock().unwrap().insert(id);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        pub fn starts(&self) -> Vec<(i32, ParamMap)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Start { id, params, .. } => Some((id, params)),
                    _ => None,
                })
                .collect()
        }

        pub fn sets(&self) -> Vec<(i32, ParamMap)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Set { id, params } => Some((id, params)),
                    _ => None,
                })
                .collect()
        }
    }

    impl SynthEngine for RecordingEngine {
        fn send_definition(&self, def: &SynthDef) -> Result<(), EngineError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Definition(def.name().to_string()));
            Ok(())
        }

        fn start_voice(
            &self,
            def_name: &str,
            voice_id: i32,
            params: &ParamMap,
        ) -> Result<VoiceHandle, EngineError> {
            self.calls.lock().unwrap().push(Call::Start {
                def: def_name.to_string(),
                id: voice_id,
                params: params.clone(),
            });
            Ok(VoiceHandle { id: voice_id })
        }

        fn set_voice_params(
            &self,
            voice: &VoiceHandle,
            params: &ParamMap,
        ) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(Call::Set {
                id: voice.id,
                params: params.clone(),
            });
            if self.failing.lock().unwrap().contains(&voice.id) {
                return Err(EngineError::Failed {
                    command: "/n_set".to_string(),
                    reason: format!("node {} not found", voice.id),
                });
            }
            Ok(())
        }
    }
}
