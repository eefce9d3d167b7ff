//! Compiled synth definitions
//!
//! Flattens a signal graph into the unit generator list scsynth expects
//! and encodes it in the `SCgf` version 2 file format.

use std::collections::HashMap;
use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};

use super::signal::{Params, Rate, Signal, SignalNode};

const FILE_TYPE: &[u8; 4] = b"SCgf";
const FILE_VERSION: i32 = 2;

/// Where a unit generator input comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Constant(usize),
    Ugen { index: usize, output: usize },
}

/// A unit generator in a compiled definition
#[derive(Debug, Clone, PartialEq)]
pub struct Ugen {
    pub name: &'static str,
    pub rate: Rate,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Rate>,
    pub special_index: i16,
}

/// A named, immutable synth definition
#[derive(Debug, Clone, PartialEq)]
pub struct SynthDef {
    name: String,
    params: Vec<(String, f32)>,
    constants: Vec<f32>,
    ugens: Vec<Ugen>,
}

impl SynthDef {
    /// Compile the graph ending in `root`
    pub fn new(name: impl Into<String>, params: &Params, root: &Signal) -> Self {
        let mut builder = Builder::default();
        if !params.is_empty() {
            builder.ugens.push(Ugen {
                name: "Control",
                rate: Rate::Control,
                inputs: Vec::new(),
                outputs: vec![Rate::Control; params.len()],
                special_index: 0,
            });
        }
        builder.visit(root);

        Self {
            name: name.into(),
            params: params.iter().map(|(n, v)| (n.to_string(), v)).collect(),
            constants: builder.constants,
            ugens: builder.ugens,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter names in declaration order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(name, _)| name.as_str())
    }

    pub fn param_default(&self, name: &str) -> Option<f32> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn constants(&self) -> &[f32] {
        &self.constants
    }

    pub fn ugens(&self) -> &[Ugen] {
        &self.ugens
    }

    /// Number of unit generators with the given class name
    pub fn count(&self, ugen: &str) -> usize {
        self.ugens.iter().filter(|u| u.name == ugen).count()
    }

    /// Encode as a complete `.scsyndef` file holding this definition
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }

    /// Write as a complete `.scsyndef` file holding this definition
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(FILE_TYPE)?;
        w.write_i32::<BigEndian>(FILE_VERSION)?;
        w.write_i16::<BigEndian>(1)?;

        write_pstring(w, &self.name)?;

        w.write_i32::<BigEndian>(self.constants.len() as i32)?;
        for c in &self.constants {
            w.write_f32::<BigEndian>(*c)?;
        }

        w.write_i32::<BigEndian>(self.params.len() as i32)?;
        for (_, value) in &self.params {
            w.write_f32::<BigEndian>(*value)?;
        }
        w.write_i32::<BigEndian>(self.params.len() as i32)?;
        for (index, (name, _)) in self.params.iter().enumerate() {
            write_pstring(w, name)?;
            w.write_i32::<BigEndian>(index as i32)?;
        }

        w.write_i32::<BigEndian>(self.ugens.len() as i32)?;
        for ugen in &self.ugens {
            write_pstring(w, ugen.name)?;
            w.write_i8(ugen.rate as i8)?;
            w.write_i32::<BigEndian>(ugen.inputs.len() as i32)?;
            w.write_i32::<BigEndian>(ugen.outputs.len() as i32)?;
            w.write_i16::<BigEndian>(ugen.special_index)?;
            for input in &ugen.inputs {
                match *input {
                    Input::Constant(index) => {
                        w.write_i32::<BigEndian>(-1)?;
                        w.write_i32::<BigEndian>(index as i32)?;
                    }
                    Input::Ugen { index, output } => {
                        w.write_i32::<BigEndian>(index as i32)?;
                        w.write_i32::<BigEndian>(output as i32)?;
                    }
                }
            }
            for rate in &ugen.outputs {
                w.write_i8(*rate as i8)?;
            }
        }

        // no variants
        w.write_i16::<BigEndian>(0)?;
        Ok(())
    }
}

fn write_pstring<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let len = u8::try_from(s.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("name too long: {}", s))
    })?;
    w.write_u8(len)?;
    w.write_all(s.as_bytes())
}

/// Post-order walk that emits each node once, after its inputs
#[derive(Default)]
struct Builder {
    constants: Vec<f32>,
    ugens: Vec<Ugen>,
    visited: HashMap<*const SignalNode, (Input, Rate)>,
}

impl Builder {
    fn visit(&mut self, signal: &Signal) -> (Input, Rate) {
        if let Some(found) = self.visited.get(&signal.id()) {
            return *found;
        }

        let ugen = match signal.node() {
            SignalNode::Constant(value) => return (self.constant(*value), Rate::Scalar),
            SignalNode::Param(index) => {
                return (Input::Ugen { index: 0, output: *index }, Rate::Control);
            }
            SignalNode::Binary { op, lhs, rhs } => {
                let (inputs, rate) = self.visit_all([lhs, rhs]);
                Ugen {
                    name: "BinaryOpUGen",
                    rate,
                    inputs,
                    outputs: vec![rate],
                    special_index: *op as i16,
                }
            }
            SignalNode::SinOsc { freq, phase } => {
                let (inputs, _) = self.visit_all([freq, phase]);
                Self::audio("SinOsc", inputs, 1)
            }
            SignalNode::EnvGen {
                envelope,
                gate,
                level_scale,
                level_bias,
                time_scale,
                done_action,
            } => {
                let done = Signal::constant(*done_action as i32 as f32);
                let env = envelope.inputs();
                let (inputs, _) = self.visit_all(
                    [gate, level_scale, level_bias, time_scale, &done]
                        .into_iter()
                        .chain(env.iter()),
                );
                Self::audio("EnvGen", inputs, 1)
            }
            SignalNode::Sum(signals) => {
                let name = if signals.len() == 3 { "Sum3" } else { "Sum4" };
                let (inputs, rate) = self.visit_all(signals.iter());
                Ugen {
                    name,
                    rate,
                    inputs,
                    outputs: vec![rate],
                    special_index: 0,
                }
            }
            SignalNode::Out { bus, channels } => {
                let (inputs, _) = self.visit_all(std::iter::once(bus).chain(channels.iter()));
                Self::audio("Out", inputs, 0)
            }
        };

        let rate = ugen.rate;
        let input = Input::Ugen {
            index: self.ugens.len(),
            output: 0,
        };
        self.ugens.push(ugen);
        self.visited.insert(signal.id(), (input, rate));
        (input, rate)
    }

    fn visit_all<'a>(
        &mut self,
        signals: impl IntoIterator<Item = &'a Signal>,
    ) -> (Vec<Input>, Rate) {
        let mut rate = Rate::Scalar;
        let inputs = signals
            .into_iter()
            .map(|s| {
                let (input, r) = self.visit(s);
                rate = rate.max(r);
                input
            })
            .collect();
        (inputs, rate)
    }

    fn constant(&mut self, value: f32) -> Input {
        let index = match self.constants.iter().position(|c| c.to_bits() == value.to_bits()) {
            Some(index) => index,
            None => {
                self.constants.push(value);
                self.constants.len() - 1
            }
        };
        Input::Constant(index)
    }

    fn audio(name: &'static str, inputs: Vec<Input>, outputs: usize) -> Ugen {
        Ugen {
            name,
            rate: Rate::Audio,
            inputs,
            outputs: vec![Rate::Audio; outputs],
            special_index: 0,
        }
    }
}
