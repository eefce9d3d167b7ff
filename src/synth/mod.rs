//! FM operators and the algorithms that wire them together

pub mod algorithm;
mod operator;

pub use algorithm::{AlgorithmError, AlgorithmGraph, CompiledAlgorithm};
pub use operator::{param_name, Operator, PARAM_SUFFIXES};
