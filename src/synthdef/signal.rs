//! Signal expressions
//!
//! A signal is an immutable, shareable node in a unit generator graph.
//! Cloning a signal shares the node, so a modulator feeding several
//! operators is emitted once when the graph is compiled.

use std::rc::Rc;

/// Calculation rate of a unit generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rate {
    Scalar = 0,
    Control = 1,
    Audio = 2,
}

/// Binary operators understood by `BinaryOpUGen`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add = 0,
    Mul = 2,
}

/// What the server does with a voice once an envelope finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoneAction {
    Nothing = 0,
    Pause = 1,
    #[default]
    FreeSelf = 2,
}

/// Curve shape code for `Env` stages
const SHAPE_CURVE: f32 = 5.0;
const ADSR_CURVE: f32 = -4.0;
const NO_LOOP: f32 = -99.0;

/// A node in a signal graph
#[derive(Debug)]
pub enum SignalNode {
    Constant(f32),
    /// Output of the synth's `Control` unit generator
    Param(usize),
    Binary {
        op: BinaryOp,
        lhs: Signal,
        rhs: Signal,
    },
    SinOsc {
        freq: Signal,
        phase: Signal,
    },
    EnvGen {
        envelope: Envelope,
        gate: Signal,
        level_scale: Signal,
        level_bias: Signal,
        time_scale: Signal,
        done_action: DoneAction,
    },
    /// Three or four way sum
    Sum(Vec<Signal>),
    Out {
        bus: Signal,
        channels: Vec<Signal>,
    },
}

/// Shared handle to a signal node
#[derive(Debug, Clone)]
pub struct Signal(Rc<SignalNode>);

impl Signal {
    pub fn new(node: SignalNode) -> Self {
        Self(Rc::new(node))
    }

    pub fn constant(value: f32) -> Self {
        Self::new(SignalNode::Constant(value))
    }

    pub fn node(&self) -> &SignalNode {
        &self.0
    }

    /// Identity of the underlying node
    pub(crate) fn id(&self) -> *const SignalNode {
        Rc::as_ptr(&self.0)
    }

    pub fn add(&self, other: &Signal) -> Signal {
        self.binary(BinaryOp::Add, other)
    }

    pub fn mul(&self, other: &Signal) -> Signal {
        self.binary(BinaryOp::Mul, other)
    }

    fn binary(&self, op: BinaryOp, other: &Signal) -> Signal {
        Signal::new(SignalNode::Binary {
            op,
            lhs: self.clone(),
            rhs: other.clone(),
        })
    }

    /// Sine oscillator at the given frequency
    pub fn sin_osc(freq: Signal) -> Signal {
        Signal::new(SignalNode::SinOsc {
            freq,
            phase: Signal::constant(0.0),
        })
    }

    /// Sum signals: addition for two, `Sum3`/`Sum4` groups for more
    pub fn mix(mut signals: Vec<Signal>) -> Option<Signal> {
        match signals.len() {
            0 => None,
            1 => signals.pop(),
            2 => Some(signals[0].add(&signals[1])),
            3 | 4 => Some(Signal::new(SignalNode::Sum(signals))),
            _ => {
                let groups = signals
                    .chunks(4)
                    .filter_map(|chunk| Signal::mix(chunk.to_vec()))
                    .collect();
                Signal::mix(groups)
            }
        }
    }

    /// Write `signal` to `channels` consecutive outputs starting at `bus`
    pub fn out(bus: Signal, signal: &Signal, channels: usize) -> Signal {
        Signal::new(SignalNode::Out {
            bus,
            channels: vec![signal.clone(); channels.max(1)],
        })
    }
}

impl From<f32> for Signal {
    fn from(value: f32) -> Self {
        Signal::constant(value)
    }
}

/// One segment of an envelope
#[derive(Debug, Clone)]
pub struct EnvStage {
    pub level: Signal,
    pub time: Signal,
    pub shape: f32,
    pub curve: f32,
}

/// Breakpoint envelope as consumed by `EnvGen`
#[derive(Debug, Clone)]
pub struct Envelope {
    pub initial: Signal,
    pub stages: Vec<EnvStage>,
    pub release_node: Option<usize>,
}

impl Envelope {
    /// Attack to full level, decay to sustain, hold while gated, release to zero
    pub fn adsr(attack: Signal, decay: Signal, sustain: Signal, release: Signal) -> Self {
        let stage = |level: Signal, time: Signal| EnvStage {
            level,
            time,
            shape: SHAPE_CURVE,
            curve: ADSR_CURVE,
        };
        Self {
            initial: Signal::constant(0.0),
            stages: vec![
                stage(Signal::constant(1.0), attack),
                stage(sustain, decay),
                stage(Signal::constant(0.0), release),
            ],
            release_node: Some(2),
        }
    }

    /// Flattened `EnvGen` inputs
    pub fn inputs(&self) -> Vec<Signal> {
        let release = self.release_node.map_or(NO_LOOP, |node| node as f32);
        let mut inputs = vec![
            self.initial.clone(),
            Signal::constant(self.stages.len() as f32),
            Signal::constant(release),
            Signal::constant(NO_LOOP),
        ];
        for stage in &self.stages {
            inputs.push(stage.level.clone());
            inputs.push(stage.time.clone());
            inputs.push(Signal::constant(stage.shape));
            inputs.push(Signal::constant(stage.curve));
        }
        inputs
    }
}

/// Named synth parameters with their default values
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: Vec<(String, f32)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter, or return the existing one with that name
    pub fn add(&mut self, name: impl Into<String>, default: f32) -> Signal {
        let name = name.into();
        let index = match self.entries.iter().position(|(n, _)| *n == name) {
            Some(index) => index,
            None => {
                self.entries.push((name, default));
                self.entries.len() - 1
            }
        };
        Signal::new(SignalNode::Param(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }
}
