//! Algorithm graphs
//!
//! An algorithm wires operators together: each operator's frequency may be
//! modulated by the summed outputs of other operators, and the outputs of
//! the carriers are mixed into the voice output. Graphs are validated and
//! compiled into synth definitions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use super::operator::{Operator, DEFAULT_GATE};
use crate::synthdef::{Params, Signal, SynthDef};

/// Number of operators in a DX7 voice
pub const DX7_OPERATORS: usize = 6;

/// Number of entries in the DX7 algorithm table
pub const DX7_ALGORITHMS: u8 = 32;

/// Output channels written by compiled definitions unless configured
pub const DEFAULT_CHANNELS: usize = 2;

/// Errors building or compiling an algorithm
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlgorithmError {
    #[error("algorithm {0} is out of range (1-32)")]
    OutOfRange(u8),

    #[error("algorithm needs {expected} operators, got {actual}")]
    OperatorCount { expected: usize, actual: usize },

    #[error("operator {op} is outside 1-{count}")]
    InvalidOperator { op: usize, count: usize },

    #[error("modulation cycle through operator {0}")]
    Cycle(usize),

    #[error("operator {0} does not reach any carrier")]
    Unreachable(usize),

    #[error("algorithm has no carriers")]
    NoCarriers,
}

/// Operator topology: who modulates whom, and which operators are heard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmGraph {
    operators: usize,
    /// target -> modulators feeding its frequency
    modulators: BTreeMap<usize, BTreeSet<usize>>,
    carriers: BTreeSet<usize>,
    feedback: Option<usize>,
}

impl AlgorithmGraph {
    /// Graph of `operators` unconnected operators with no carriers
    pub fn new(operators: usize) -> Self {
        Self {
            operators,
            modulators: BTreeMap::new(),
            carriers: BTreeSet::new(),
            feedback: None,
        }
    }

    /// Route `modulator`'s output into `target`'s frequency
    pub fn modulate(mut self, target: usize, modulator: usize) -> Self {
        self.modulators.entry(target).or_default().insert(modulator);
        self
    }

    /// Add operators to the output mix
    pub fn output(mut self, carriers: &[usize]) -> Self {
        self.carriers.extend(carriers.iter().copied());
        self
    }

    /// Record which operator carries self-feedback
    ///
    /// The loop is not part of the compiled graph.
    pub fn feedback(mut self, op: usize) -> Self {
        self.feedback = Some(op);
        self
    }

    pub fn operator_count(&self) -> usize {
        self.operators
    }

    pub fn carriers(&self) -> impl Iterator<Item = usize> + '_ {
        self.carriers.iter().copied()
    }

    /// Operators modulating `target`, in ascending order
    pub fn modulators_of(&self, target: usize) -> impl Iterator<Item = usize> + '_ {
        self.modulators.get(&target).into_iter().flatten().copied()
    }

    pub fn feedback_operator(&self) -> Option<usize> {
        self.feedback
    }

    /// Whether two graphs wire operators identically, ignoring feedback
    pub fn same_topology(&self, other: &AlgorithmGraph) -> bool {
        self.operators == other.operators
            && self.modulators == other.modulators
            && self.carriers == other.carriers
    }

    /// Check that the graph is acyclic, references only known operators,
    /// and that every operator is heard directly or through modulation
    pub fn validate(&self) -> Result<(), AlgorithmError> {
        let count = self.operators;
        let check = |op: usize| {
            if op == 0 || op > count {
                Err(AlgorithmError::InvalidOperator { op, count })
            } else {
                Ok(())
            }
        };
        for (target, mods) in &self.modulators {
            check(*target)?;
            for m in mods {
                check(*m)?;
            }
        }
        for c in &self.carriers {
            check(*c)?;
        }
        if let Some(fb) = self.feedback {
            check(fb)?;
        }
        if self.carriers.is_empty() {
            return Err(AlgorithmError::NoCarriers);
        }

        // Depth-first search for cycles: 1 = on the stack, 2 = done
        let mut state = vec![0u8; count + 1];
        for op in 1..=count {
            self.find_cycle(op, &mut state)?;
        }

        // Walk from the carriers back through their modulators
        let mut heard = vec![false; count + 1];
        let mut stack: Vec<usize> = self.carriers.iter().copied().collect();
        while let Some(op) = stack.pop() {
            if heard[op] {
                continue;
            }
            heard[op] = true;
            stack.extend(self.modulators_of(op));
        }
        match (1..=count).find(|op| !heard[*op]) {
            Some(op) => Err(AlgorithmError::Unreachable(op)),
            None => Ok(()),
        }
    }

    fn find_cycle(&self, op: usize, state: &mut [u8]) -> Result<(), AlgorithmError> {
        match state[op] {
            1 => return Err(AlgorithmError::Cycle(op)),
            2 => return Ok(()),
            _ => {}
        }
        state[op] = 1;
        for m in self.modulators_of(op) {
            self.find_cycle(m, state)?;
        }
        state[op] = 2;
        Ok(())
    }

    /// Validate and compile into a definition writing `channels` copies of
    /// the mixed carrier output to bus 0
    pub fn compile(&self, name: &str, channels: usize) -> Result<SynthDef, AlgorithmError> {
        self.validate()?;

        let mut params = Params::new();
        let gate = params.add("gate", DEFAULT_GATE);
        let operators: Vec<Operator> = (1..=self.operators)
            .map(|n| Operator::with_params(n, &mut params, &gate))
            .collect();

        let mut built = HashMap::new();
        let carriers: Vec<Signal> = self
            .carriers
            .iter()
            .map(|c| self.build(*c, &operators, &mut built))
            .collect();

        // validate() guarantees at least one carrier
        let sig = Signal::mix(carriers).ok_or(AlgorithmError::NoCarriers)?;
        let root = Signal::out(Signal::constant(0.0), &sig, channels);
        Ok(SynthDef::new(name, &params, &root))
    }

    /// Output of `op`, building each operator at most once
    fn build(
        &self,
        op: usize,
        operators: &[Operator],
        built: &mut HashMap<usize, Signal>,
    ) -> Signal {
        if let Some(sig) = built.get(&op) {
            return sig.clone();
        }
        let inputs: Vec<Signal> = self
            .modulators_of(op)
            .map(|m| self.build(m, operators, built))
            .collect();
        let sig = operators[op - 1].signal(Signal::mix(inputs));
        built.insert(op, sig.clone());
        sig
    }
}

struct Topology {
    edges: &'static [(usize, usize)],
    carriers: &'static [usize],
    feedback: usize,
}

/// The DX7 algorithm chart as (modulator, target) edges
const DX7_TABLE: [Topology; 32] = [
    Topology { edges: &[(2, 1), (4, 3), (5, 4), (6, 5)], carriers: &[1, 3], feedback: 6 },
    Topology { edges: &[(2, 1), (4, 3), (5, 4), (6, 5)], carriers: &[1, 3], feedback: 2 },
    Topology { edges: &[(2, 1), (3, 2), (5, 4), (6, 5)], carriers: &[1, 4], feedback: 6 },
    Topology { edges: &[(2, 1), (3, 2), (5, 4), (6, 5)], carriers: &[1, 4], feedback: 4 },
    Topology { edges: &[(2, 1), (4, 3), (6, 5)], carriers: &[1, 3, 5], feedback: 6 },
    Topology { edges: &[(2, 1), (4, 3), (6, 5)], carriers: &[1, 3, 5], feedback: 5 },
    Topology { edges: &[(2, 1), (4, 3), (5, 3), (6, 5)], carriers: &[1, 3], feedback: 6 },
    Topology { edges: &[(2, 1), (4, 3), (5, 3), (6, 5)], carriers: &[1, 3], feedback: 4 },
    Topology { edges: &[(2, 1), (4, 3), (5, 3), (6, 5)], carriers: &[1, 3], feedback: 2 },
    Topology { edges: &[(2, 1), (3, 2), (5, 4), (6, 4)], carriers: &[1, 4], feedback: 3 },
    Topology { edges: &[(2, 1), (3, 2), (5, 4), (6, 4)], carriers: &[1, 4], feedback: 6 },
    Topology { edges: &[(2, 1), (4, 3), (5, 3), (6, 3)], carriers: &[1, 3], feedback: 2 },
    Topology { edges: &[(2, 1), (4, 3), (5, 3), (6, 3)], carriers: &[1, 3], feedback: 6 },
    Topology { edges: &[(2, 1), (4, 3), (5, 4), (6, 4)], carriers: &[1, 3], feedback: 6 },
    Topology { edges: &[(2, 1), (4, 3), (5, 4), (6, 4)], carriers: &[1, 3], feedback: 2 },
    Topology { edges: &[(2, 1), (3, 1), (5, 1), (4, 3), (6, 5)], carriers: &[1], feedback: 6 },
    Topology { edges: &[(2, 1), (3, 1), (5, 1), (4, 3), (6, 5)], carriers: &[1], feedback: 2 },
    Topology { edges: &[(2, 1), (3, 1), (4, 1), (5, 4), (6, 5)], carriers: &[1], feedback: 3 },
    Topology { edges: &[(2, 1), (3, 2), (6, 4), (6, 5)], carriers: &[1, 4, 5], feedback: 6 },
    Topology { edges: &[(3, 1), (3, 2), (5, 4), (6, 4)], carriers: &[1, 2, 4], feedback: 3 },
    Topology { edges: &[(3, 1), (3, 2), (6, 4), (6, 5)], carriers: &[1, 2, 4, 5], feedback: 3 },
    Topology { edges: &[(2, 1), (6, 3), (6, 4), (6, 5)], carriers: &[1, 3, 4, 5], feedback: 6 },
    Topology { edges: &[(3, 2), (6, 4), (6, 5)], carriers: &[1, 2, 4, 5], feedback: 6 },
    Topology { edges: &[(6, 3), (6, 4), (6, 5)], carriers: &[1, 2, 3, 4, 5], feedback: 6 },
    Topology { edges: &[(6, 4), (6, 5)], carriers: &[1, 2, 3, 4, 5], feedback: 6 },
    Topology { edges: &[(3, 2), (5, 4), (6, 4)], carriers: &[1, 2, 4], feedback: 6 },
    Topology { edges: &[(3, 2), (5, 4), (6, 4)], carriers: &[1, 2, 4], feedback: 3 },
    Topology { edges: &[(2, 1), (4, 3), (5, 4)], carriers: &[1, 3, 6], feedback: 5 },
    Topology { edges: &[(4, 3), (6, 5)], carriers: &[1, 2, 3, 5], feedback: 6 },
    Topology { edges: &[(4, 3), (5, 4)], carriers: &[1, 2, 3, 6], feedback: 5 },
    Topology { edges: &[(6, 5)], carriers: &[1, 2, 3, 4, 5], feedback: 6 },
    Topology { edges: &[], carriers: &[1, 2, 3, 4, 5, 6], feedback: 6 },
];

/// Graph for a DX7 algorithm number (1-32)
pub fn dx7(index: u8) -> Result<AlgorithmGraph, AlgorithmError> {
    if index == 0 || index > DX7_ALGORITHMS {
        return Err(AlgorithmError::OutOfRange(index));
    }
    let topology = &DX7_TABLE[index as usize - 1];
    let graph = topology
        .edges
        .iter()
        .fold(AlgorithmGraph::new(DX7_OPERATORS), |g, &(m, t)| g.modulate(t, m))
        .output(topology.carriers)
        .feedback(topology.feedback);
    Ok(graph)
}

/// Lowest algorithm number with the same feedback-free topology
pub fn canonical(index: u8) -> Result<u8, AlgorithmError> {
    let graph = dx7(index)?;
    for candidate in 1..index {
        if dx7(candidate)?.same_topology(&graph) {
            return Ok(candidate);
        }
    }
    Ok(index)
}

/// Synth definition name for a canonical algorithm number
pub fn def_name(canonical: u8) -> String {
    format!("dx7_algo{}", canonical)
}

/// A DX7 algorithm compiled for the synthesis server
#[derive(Debug, Clone)]
pub struct CompiledAlgorithm {
    /// Algorithm number as selected
    pub index: u8,
    /// Algorithm number the definition was compiled from
    pub canonical: u8,
    pub graph: AlgorithmGraph,
    pub synthdef: SynthDef,
}

impl CompiledAlgorithm {
    pub fn name(&self) -> &str {
        self.synthdef.name()
    }

    /// Carrier operators, whose gains follow note velocity
    pub fn carriers(&self) -> impl Iterator<Item = usize> + '_ {
        self.graph.carriers()
    }

    pub fn operator_count(&self) -> usize {
        self.graph.operator_count()
    }
}

/// Compile a DX7 algorithm with stereo output
pub fn compile(index: u8, operator_count: usize) -> Result<CompiledAlgorithm, AlgorithmError> {
    compile_with_channels(index, operator_count, DEFAULT_CHANNELS)
}

/// Compile a DX7 algorithm writing `channels` outputs
pub fn compile_with_channels(
    index: u8,
    operator_count: usize,
    channels: usize,
) -> Result<CompiledAlgorithm, AlgorithmError> {
    let canonical = canonical(index)?;
    if operator_count != DX7_OPERATORS {
        return Err(AlgorithmError::OperatorCount {
            expected: DX7_OPERATORS,
            actual: operator_count,
        });
    }
    let graph = dx7(canonical)?;
    let synthdef = graph.compile(&def_name(canonical), channels)?;
    log::debug!(
        "compiled algorithm {} as {} ({} ugens)",
        index,
        synthdef.name(),
        synthdef.ugens().len()
    );
    Ok(CompiledAlgorithm {
        index,
        canonical,
        graph,
        synthdef,
    })
}
