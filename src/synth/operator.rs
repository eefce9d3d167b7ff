//! FM operator: a sine oscillator shaped by an ADSR envelope

use crate::synthdef::{DoneAction, Envelope, Params, Signal, SignalNode};

pub const DEFAULT_FREQ: f32 = 440.0;
pub const DEFAULT_FREQ_SCALE: f32 = 1.0;
pub const DEFAULT_AMOUNT: f32 = 0.0;
pub const DEFAULT_GAIN: f32 = 1.0;
pub const DEFAULT_ATTACK: f32 = 0.01;
pub const DEFAULT_DECAY: f32 = 0.3;
pub const DEFAULT_SUSTAIN: f32 = 0.5;
pub const DEFAULT_RELEASE: f32 = 1.0;
pub const DEFAULT_GATE: f32 = 1.0;

/// Per-operator parameter suffixes, in declaration order
pub const PARAM_SUFFIXES: [&str; 8] = [
    "freq",
    "freqscale",
    "amt",
    "gain",
    "attack",
    "decay",
    "sustain",
    "release",
];

/// Name of an operator parameter, e.g. `op2decay`
pub fn param_name(op: usize, suffix: &str) -> String {
    format!("op{}{}", op, suffix)
}

/// One operator of an algorithm graph
///
/// Every input is a signal, so an operator always has a complete set of
/// values before it is compiled. Inputs start as constants and are
/// replaced by synth parameters with [`Operator::with_params`].
#[derive(Debug, Clone)]
pub struct Operator {
    pub freq: Signal,
    pub freq_scale: Signal,
    /// How strongly the FM input deviates the frequency, in Hz per unit
    pub amount: Signal,
    pub gain: Signal,
    pub attack: Signal,
    pub decay: Signal,
    pub sustain: Signal,
    pub release: Signal,
    pub gate: Signal,
    pub done_action: DoneAction,
}

impl Default for Operator {
    fn default() -> Self {
        Self {
            freq: DEFAULT_FREQ.into(),
            freq_scale: DEFAULT_FREQ_SCALE.into(),
            amount: DEFAULT_AMOUNT.into(),
            gain: DEFAULT_GAIN.into(),
            attack: DEFAULT_ATTACK.into(),
            decay: DEFAULT_DECAY.into(),
            sustain: DEFAULT_SUSTAIN.into(),
            release: DEFAULT_RELEASE.into(),
            gate: DEFAULT_GATE.into(),
            done_action: DoneAction::default(),
        }
    }
}

impl Operator {
    /// Operator `number` with every input bound to an `op<number>...`
    /// parameter and the envelope gated by `gate`
    pub fn with_params(number: usize, params: &mut Params, gate: &Signal) -> Self {
        let mut param =
            |suffix: &str, default: f32| params.add(param_name(number, suffix), default);
        Self {
            freq: param("freq", DEFAULT_FREQ),
            freq_scale: param("freqscale", DEFAULT_FREQ_SCALE),
            amount: param("amt", DEFAULT_AMOUNT),
            gain: param("gain", DEFAULT_GAIN),
            attack: param("attack", DEFAULT_ATTACK),
            decay: param("decay", DEFAULT_DECAY),
            sustain: param("sustain", DEFAULT_SUSTAIN),
            release: param("release", DEFAULT_RELEASE),
            gate: gate.clone(),
            done_action: DoneAction::default(),
        }
    }

    /// Output signal given an optional frequency modulation input
    pub fn signal(&self, fm: Option<Signal>) -> Signal {
        let mut freq = self.freq.mul(&self.freq_scale);
        if let Some(fm) = fm {
            freq = freq.add(&fm.mul(&self.amount));
        }

        let envelope = Signal::new(SignalNode::EnvGen {
            envelope: Envelope::adsr(
                self.attack.clone(),
                self.decay.clone(),
                self.sustain.clone(),
                self.release.clone(),
            ),
            gate: self.gate.clone(),
            level_scale: self.gain.clone(),
            level_bias: Signal::constant(0.0),
            time_scale: Signal::constant(1.0),
            done_action: self.done_action,
        });

        Signal::sin_osc(freq).mul(&envelope)
    }
}
