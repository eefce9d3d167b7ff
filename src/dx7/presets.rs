//! Loading voices from sysex preset files

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::Dx7Error;
use crate::engine::ParamMap;
use crate::synth::{param_name, AlgorithmGraph};
use crate::sysex::{BulkDump, Sysex, VOICE_COUNT};

/// FM amount reached by a modulator at full output level
const MAX_AMOUNT: f32 = 2000.0;
const MAX_OUTPUT_LEVEL: f32 = 99.0;

/// A preset reference: file plus voice number within its bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetRef {
    pub path: PathBuf,
    /// 1-based voice number
    pub voice: usize,
}

impl PresetRef {
    /// Resolve `name` or `name#voice` against a presets directory
    ///
    /// An existing path is used as is; otherwise `<dir>/<name>.syx`.
    pub fn resolve(dir: &Path, reference: &str) -> Result<Self, Dx7Error> {
        let (name, voice) = match reference.rsplit_once('#') {
            Some((name, voice)) => {
                let voice = voice
                    .parse::<usize>()
                    .map_err(|_| Dx7Error::InvalidVoice(voice.to_string()))?;
                (name, voice)
            }
            None => (reference, 1),
        };
        if voice == 0 || voice > VOICE_COUNT {
            return Err(Dx7Error::InvalidVoice(voice.to_string()));
        }

        let direct = PathBuf::from(name);
        let path = if direct.is_file() {
            direct
        } else {
            dir.join(format!("{}.syx", name))
        };
        if !path.is_file() {
            return Err(Dx7Error::PresetNotFound(reference.to_string()));
        }
        Ok(Self { path, voice })
    }

    /// Read the file and decode the referenced voice
    pub fn load(&self) -> Result<BulkDump, Dx7Error> {
        let file = File::open(&self.path).map_err(crate::sysex::FormatError::from)?;
        let sysex = Sysex::read(BufReader::new(file))?;
        let mut bank = sysex.bank()?;
        if self.voice > bank.len() {
            return Err(Dx7Error::InvalidVoice(self.voice.to_string()));
        }
        Ok(bank.swap_remove(self.voice - 1))
    }
}

/// Synth parameters derived from a voice for the given operator wiring
///
/// Every operator gets an `op<N>freqscale`: its ratio, or 1 for
/// fixed-frequency oscillators so they keep the note frequency. Each modulated operator's
/// `op<N>amt` follows the loudest of its modulators.
pub fn voice_params(voice: &BulkDump, graph: &AlgorithmGraph) -> ParamMap {
    let mut params = ParamMap::new();
    for (i, op) in voice.ops.iter().enumerate() {
        let number = i + 1;
        let scale = op.oscillator.ratio().unwrap_or_else(|| {
            log::debug!("operator {} is fixed frequency, keeping note pitch", number);
            1.0
        });
        params.insert(param_name(number, "freqscale"), scale);
    }

    for target in 1..=graph.operator_count() {
        let level = graph
            .modulators_of(target)
            .filter_map(|m| voice.op(m))
            .map(|op| op.output_level.clamp(0, 99) as f32)
            .fold(None, |max: Option<f32>, l| Some(max.map_or(l, |m| m.max(l))));
        if let Some(level) = level {
            params.insert(param_name(target, "amt"), level / MAX_OUTPUT_LEVEL * MAX_AMOUNT);
        }
    }
    params
}
