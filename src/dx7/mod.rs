//! The synthesizer session
//!
//! [`Dx7`] owns the voice table and the controller state, and turns note
//! and controller events into engine calls. It is shared between the MIDI
//! dispatcher and the remote control server.

mod controls;
mod event;
mod presets;
mod voices;

pub use controls::{ControlRouter, ControlState};
pub use event::{midicps, Ctrl, Note};
pub use presets::{voice_params, PresetRef};
pub use voices::{Slot, VoiceTable, NOTE_COUNT};

use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use thiserror::Error;

use crate::config::Dx7Config;
use crate::engine::{EngineError, ParamMap, SynthEngine, VoiceHandle};
use crate::synth::algorithm::{self, CompiledAlgorithm, DX7_OPERATORS};
use crate::synth::{param_name, AlgorithmError};
use crate::sysex::{BulkDump, FormatError};

/// First node id handed to the engine; lower ids are left to the server
const FIRST_VOICE_ID: i32 = 1000;

/// Highest MIDI note number
const MAX_NOTE: u8 = 127;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum Dx7Error {
    #[error("note off for note {0} without a note on")]
    MissingNoteOn(u8),

    #[error("note event has no note")]
    NilNote,

    #[error("control event has no controller")]
    NilCtrl,

    #[error("invalid note number {0}")]
    InvalidNote(u8),

    #[error("no algorithm selected")]
    NoAlgorithm,

    #[error("preset not found: {0}")]
    PresetNotFound(String),

    #[error("invalid voice number {0} (must be 1-32)")]
    InvalidVoice(String),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Algorithm(#[from] AlgorithmError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{failed} of {attempted} voices failed to update")]
    Broadcast {
        failed: usize,
        attempted: usize,
        #[source]
        source: EngineError,
    },
}

/// The currently selected preset
#[derive(Debug, Clone)]
pub struct Preset {
    pub reference: PresetRef,
    pub voice: BulkDump,
}

/// A playing synthesizer
pub struct Dx7 {
    engine: Arc<dyn SynthEngine>,
    router: ControlRouter,
    // lock order: voices, then controls
    voices: Mutex<VoiceTable>,
    controls: RwLock<ControlState>,
    algorithm: RwLock<Option<CompiledAlgorithm>>,
    preset: RwLock<Option<Preset>>,
    algorithm_override: Option<u8>,
    presets_dir: PathBuf,
    polyphony: f32,
    channels: usize,
    next_id: AtomicI32,
}

impl Dx7 {
    pub fn new(engine: Arc<dyn SynthEngine>, config: &Dx7Config) -> Self {
        let router = ControlRouter::new(&config.controls);
        let controls = router.initial_state();
        Self {
            engine,
            router,
            voices: Mutex::new(VoiceTable::new()),
            controls: RwLock::new(controls),
            algorithm: RwLock::new(None),
            preset: RwLock::new(None),
            algorithm_override: config.synth.algorithm,
            presets_dir: PathBuf::from(&config.synth.presets_dir),
            polyphony: config.synth.polyphony,
            channels: config.engine.channels,
            next_id: AtomicI32::new(FIRST_VOICE_ID),
        }
    }

    /// Load a preset by `name` or `name#voice`, selecting its algorithm
    ///
    /// Nothing changes if the file cannot be decoded. The preset's
    /// parameters are merged into the control state and sent to every
    /// sounding voice, as a control change would be.
    pub fn load_preset(&self, name: &str) -> Result<(), Dx7Error> {
        let reference = PresetRef::resolve(&self.presets_dir, name)?;
        let voice = reference.load()?;
        let index = self.algorithm_override.unwrap_or_else(|| voice.algorithm_number());
        self.select_algorithm(index)?;

        let graph = algorithm::dx7(index)?;
        let voices = lock(&self.voices);
        let params = {
            let mut controls = write(&self.controls);
            for (param, value) in voice_params(&voice, &graph) {
                controls.set(&param, value);
            }
            controls.snapshot()
        };
        let targets: Vec<VoiceHandle> = voices.sounding().map(|(_, v)| v).collect();

        log::info!(
            "loaded preset '{}' voice {} ({}), algorithm {}",
            reference.path.display(),
            reference.voice,
            voice.name.trim_end(),
            index
        );
        *write(&self.preset) = Some(Preset { reference, voice });
        self.broadcast(&targets, &params)
    }

    /// Compile and upload an algorithm, making it current for new notes
    pub fn select_algorithm(&self, index: u8) -> Result<(), Dx7Error> {
        let compiled = algorithm::compile_with_channels(index, DX7_OPERATORS, self.channels)?;
        self.engine.send_definition(&compiled.synthdef)?;
        log::info!("algorithm {} selected ({})", index, compiled.name());
        *write(&self.algorithm) = Some(compiled);
        Ok(())
    }

    /// Start or release a note
    pub fn on_note(&self, note: Option<Note>) -> Result<(), Dx7Error> {
        let note = note.ok_or(Dx7Error::NilNote)?;
        if note.note > MAX_NOTE {
            return Err(Dx7Error::InvalidNote(note.note));
        }

        let mut voices = lock(&self.voices);
        if note.is_on() {
            self.start(&mut voices, note)
        } else {
            let Slot::Sounding(voice) = voices.get(note.note) else {
                return Err(Dx7Error::MissingNoteOn(note.note));
            };
            log::debug!("note off {} (voice {})", note.note, voice.id);
            // the slot is kept until the server has the release
            self.engine.set_voice_params(&voice, &gate(0.0))?;
            voices.release(note.note);
            Ok(())
        }
    }

    fn start(&self, voices: &mut VoiceTable, note: Note) -> Result<(), Dx7Error> {
        let (def_name, carriers, operators) = {
            let algorithm = read(&self.algorithm);
            let compiled = algorithm.as_ref().ok_or(Dx7Error::NoAlgorithm)?;
            (
                compiled.name().to_string(),
                compiled.carriers().collect::<Vec<_>>(),
                compiled.operator_count(),
            )
        };

        let mut params = read(&self.controls).snapshot();
        params.insert("gate".to_string(), 1.0);
        let freq = midicps(note.note);
        for op in 1..=operators {
            params.insert(param_name(op, "freq"), freq);
        }
        let gain = note.velocity as f32 / (MAX_NOTE as f32 * self.polyphony);
        for op in carriers {
            params.insert(param_name(op, "gain"), gain);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let voice = self.engine.start_voice(&def_name, id, &params)?;
        log::debug!("note on {} vel {} (voice {})", note.note, note.velocity, voice.id);

        if let Some(previous) = voices.start(note.note, voice) {
            log::debug!("note {} retriggered, releasing voice {}", note.note, previous.id);
            if let Err(e) = self.engine.set_voice_params(&previous, &gate(0.0)) {
                log::warn!("failed to release voice {}: {}", previous.id, e);
            }
        }
        Ok(())
    }

    /// Apply a control change and send the new state to every voice
    ///
    /// Returns false if the controller is not routed.
    pub fn on_control(&self, ctrl: Option<Ctrl>) -> Result<bool, Dx7Error> {
        let ctrl = ctrl.ok_or(Dx7Error::NilCtrl)?;
        if !self.router.apply(&mut write(&self.controls), ctrl.num, ctrl.value) {
            log::debug!("cc {} is not routed", ctrl.num);
            return Ok(false);
        }

        let voices = lock(&self.voices);
        let params = read(&self.controls).snapshot();
        let targets: Vec<VoiceHandle> = voices.sounding().map(|(_, v)| v).collect();
        self.broadcast(&targets, &params)?;
        Ok(true)
    }

    /// Release every sounding voice
    pub fn release_all(&self) -> Result<(), Dx7Error> {
        let targets = lock(&self.voices).drain();
        if !targets.is_empty() {
            log::info!("releasing {} voices", targets.len());
        }
        self.broadcast(&targets, &gate(0.0))
    }

    /// The server freed voice `id`
    pub fn voice_ended(&self, id: i32) {
        if let Some(note) = lock(&self.voices).forget(id) {
            log::debug!("voice {} for note {} ended", id, note);
        }
    }

    /// Send `params` to each voice, continuing past failures
    fn broadcast(&self, targets: &[VoiceHandle], params: &ParamMap) -> Result<(), Dx7Error> {
        let mut first = None;
        let mut failed = 0;
        for voice in targets {
            if let Err(e) = self.engine.set_voice_params(voice, params) {
                log::error!("failed to update voice {}: {}", voice.id, e);
                failed += 1;
                first.get_or_insert(e);
            }
        }
        match first {
            Some(source) => Err(Dx7Error::Broadcast {
                failed,
                attempted: targets.len(),
                source,
            }),
            None => Ok(()),
        }
    }

    pub fn controls(&self) -> ControlState {
        read(&self.controls).clone()
    }

    pub fn voices(&self) -> VoiceTable {
        lock(&self.voices).clone()
    }

    /// Name of the current definition
    pub fn algorithm_name(&self) -> Option<String> {
        read(&self.algorithm).as_ref().map(|a| a.name().to_string())
    }

    pub fn preset(&self) -> Option<Preset> {
        read(&self.preset).clone()
    }
}

fn gate(value: f32) -> ParamMap {
    ParamMap::from([("gate".to_string(), value)])
}

// A panic while a lock is held cannot leave the tables half-updated, so
// poisoned locks are recovered.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(l: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}
