//! Configuration schema definitions

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;

use crate::synth::algorithm::DX7_ALGORITHMS;

/// Main configuration for the synthesizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dx7Config {
    /// Synthesis server connection
    #[serde(default)]
    pub engine: EngineConfig,

    /// MIDI input
    #[serde(default)]
    pub midi: MidiConfig,

    /// Presets, algorithm and polyphony
    #[serde(default)]
    pub synth: SynthConfig,

    /// Controller mappings
    #[serde(default = "default_controls")]
    pub controls: Vec<ControlConfig>,

    /// Remote control server
    #[serde(default)]
    pub rpc: RpcConfig,
}

impl Default for Dx7Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            midi: MidiConfig::default(),
            synth: SynthConfig::default(),
            controls: default_controls(),
            rpc: RpcConfig::default(),
        }
    }
}

impl Dx7Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate engine settings
        if self.engine.scsynth_addr.parse::<SocketAddr>().is_err() {
            bail!("Invalid scsynth address '{}'", self.engine.scsynth_addr);
        }
        if self.engine.local_addr.parse::<SocketAddr>().is_err() {
            bail!("Invalid local address '{}'", self.engine.local_addr);
        }
        if self.engine.timeout_ms == 0 {
            bail!("Engine timeout must be greater than 0");
        }
        if self.engine.channels == 0 {
            bail!("Engine must write at least one channel");
        }

        if let Some(channel) = self.midi.channel {
            if channel > 15 {
                bail!("MIDI channel must be between 0 and 15");
            }
        }

        // Validate synth settings
        if let Some(algorithm) = self.synth.algorithm {
            if algorithm == 0 || algorithm > DX7_ALGORITHMS {
                bail!("Algorithm must be between 1 and {}", DX7_ALGORITHMS);
            }
        }
        if !(self.synth.polyphony.is_finite() && self.synth.polyphony > 0.0) {
            bail!("Polyphony must be greater than 0");
        }

        // Validate controller mappings
        let mut seen = HashSet::new();
        for control in &self.controls {
            if control.cc > 127 {
                bail!("Control '{}' uses CC {} (must be 0-127)", control.param, control.cc);
            }
            if !seen.insert(control.cc) {
                bail!("CC {} is mapped more than once", control.cc);
            }
            if control.param.is_empty() {
                bail!("Control for CC {} has no parameter", control.cc);
            }
            if ![control.min, control.max, control.default].iter().all(|v| v.is_finite()) {
                bail!("Control '{}' has a non-finite range", control.param);
            }
        }

        if let Some(listen) = &self.rpc.listen {
            if listen.parse::<SocketAddr>().is_err() {
                bail!("Invalid RPC listen address '{}'", listen);
            }
        }

        Ok(())
    }
}

/// Synthesis server connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// scsynth UDP address (default: 127.0.0.1:57110)
    #[serde(default = "default_scsynth_addr")]
    pub scsynth_addr: String,

    /// Local UDP address to bind (default: any port on loopback)
    #[serde(default = "default_local_addr")]
    pub local_addr: String,

    /// Group voices are started in (default: 1)
    #[serde(default = "default_group")]
    pub group: i32,

    /// How long to wait for replies (default: 2000 ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Output channels written by each voice (default: 2)
    #[serde(default = "default_channels")]
    pub channels: usize,

    /// Ask the server to print incoming OSC
    #[serde(default)]
    pub dump_osc: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scsynth_addr: default_scsynth_addr(),
            local_addr: default_local_addr(),
            group: default_group(),
            timeout_ms: default_timeout_ms(),
            channels: default_channels(),
            dump_osc: false,
        }
    }
}

fn default_scsynth_addr() -> String { "127.0.0.1:57110".to_string() }
fn default_local_addr() -> String { "127.0.0.1:0".to_string() }
fn default_group() -> i32 { 1 }
fn default_timeout_ms() -> u64 { 2000 }
fn default_channels() -> usize { 2 }

/// MIDI input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MidiConfig {
    /// Input port name substring (None = first port)
    pub device: Option<String>,

    /// Channel to listen on, 0-15 (None = all channels)
    pub channel: Option<u8>,
}

/// Preset and voice settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Directory searched for `<name>.syx` presets
    #[serde(default = "default_presets_dir")]
    pub presets_dir: String,

    /// Preset to load at startup: `<name>` or `<name>#<voice>`
    pub preset: Option<String>,

    /// Algorithm 1-32, overriding the preset's
    pub algorithm: Option<u8>,

    /// Divisor for carrier gains so held notes do not clip (default: 4)
    #[serde(default = "default_polyphony")]
    pub polyphony: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            presets_dir: default_presets_dir(),
            preset: None,
            algorithm: None,
            polyphony: default_polyphony(),
        }
    }
}

fn default_presets_dir() -> String { "assets/syx".to_string() }
fn default_polyphony() -> f32 { 4.0 }

/// A controller mapped onto a synth parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// MIDI control change number
    pub cc: u8,

    /// Synth parameter name, e.g. `op1amt`
    pub param: String,

    /// Mapping curve
    #[serde(default)]
    pub curve: CurveKind,

    /// Output at controller value 0 (octaves for the octave curve)
    pub min: f64,

    /// Output at controller value 127 (octaves for the octave curve)
    pub max: f64,

    /// Value before any controller moves
    pub default: f64,
}

impl ControlConfig {
    pub fn new(cc: u8, param: &str, curve: CurveKind, min: f64, max: f64, default: f64) -> Self {
        Self {
            cc,
            param: param.to_string(),
            curve,
            min,
            max,
            default,
        }
    }
}

/// Types of mapping curves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    /// Linear interpolation (default)
    #[default]
    Linear,
    /// Linear in octaves: 2 raised to the interpolated value
    Octaves,
}

/// The controller table of the DX7 session
pub fn default_controls() -> Vec<ControlConfig> {
    vec![
        ControlConfig::new(106, "op1amt", CurveKind::Linear, 0.0, 2000.0, 0.0),
        ControlConfig::new(107, "op2freqscale", CurveKind::Octaves, -8.0, 2.0, 1.0),
        ControlConfig::new(108, "op2decay", CurveKind::Linear, 0.0001, 10.0, 0.3),
        ControlConfig::new(109, "op2sustain", CurveKind::Linear, 0.0, 1.0, 0.5),
    ]
}

/// Remote control server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcConfig {
    /// TCP address to listen on (None = disabled)
    pub listen: Option<String>,
}
