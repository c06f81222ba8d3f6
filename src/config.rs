// SPDX-License-Identifier: Apache-2.0

//! Run configuration and the search budget.
//!
//! Every numeric bound that decides which branches of the candidate search
//! are explored lives in `SearchBudget`, so that a run is reproducible from
//! its configuration alone. The defaults below are the values the search
//! was tuned with.

use serde::{Deserialize, Serialize};

use crate::candidates::CandidateType;
use crate::netlist::GateId;

/// Maximum number of control signals per functional candidate. Each one
/// doubles the number of realized candidates.
pub const DEFAULT_MAX_CONTROL_SIGNALS: usize = 5;

/// Maximum operand count for adder candidates.
pub const DEFAULT_MAX_OPERANDS_ADDER: usize = 3;

/// Maximum operand count for counter, absolute and constant-multiplication
/// candidates before shifted copies are added.
pub const DEFAULT_MAX_OPERANDS_SINGLE: usize = 1;

/// Largest input bin that is still split by exhaustive assignment.
pub const DEFAULT_MAX_BIN_SIZE: usize = 12;

/// Widest input bin that may contribute control-signal candidates.
pub const DEFAULT_MAX_CTRL_BIN_WIDTH: usize = 6;

/// Upper bound on candidates produced by a single splitting stage.
pub const DEFAULT_MAX_FUTURE_CANDIDATES: usize = 32_000;

/// Largest bin for which single-pair permutations are enumerated.
pub const DEFAULT_MAX_SINGLE_PAIR_PERMUTATION: usize = 3;

/// Largest output bin that is permuted exhaustively.
pub const DEFAULT_MAX_OUTPUT_PERMUTATION_BIN: usize = 3;

/// Structural growth stops when a step offers more branches than this.
pub const DEFAULT_STRUCTURAL_BRANCH_BOUND: usize = 4;

/// Predecessor growth is kept while the variant is at most this many times
/// the base chain size.
pub const DEFAULT_PREDECESSOR_SIZE_MULTIPLIER: usize = 16;

/// Successor growth is kept while the variant is at most this many times
/// the base chain size.
pub const DEFAULT_SUCCESSOR_SIZE_MULTIPLIER: usize = 8;

/// The whole combinational cone behind a `CARRY4` chain is kept while it is
/// at most this many times the chain size.
pub const DEFAULT_CONE_SIZE_MULTIPLIER: usize = 128;

/// Size of a first-gate tier before falling back to the next stricter tier.
pub const DEFAULT_FIRST_GATE_TIER_BOUND: usize = 16;

/// Maximum trailing inverters attached to one gate.
pub const DEFAULT_MAX_INVERTERS_PER_GATE: usize = 2;

/// Overfull bins are reordered by influence up to this size (adder and
/// constant multiplication).
pub const DEFAULT_OVERFULL_REORDER_ADDER: usize = 5;

/// Overfull bins are reordered by influence up to this size (counter).
pub const DEFAULT_OVERFULL_REORDER_COUNTER: usize = 2;

/// Random assignments used to estimate the influence of a variable.
pub const DEFAULT_INFLUENCE_SAMPLES: usize = 1024;

/// Probe assignments evaluated before the solver for add/sub/counter.
pub const DEFAULT_PROBES_ARITHMETIC: usize = 8;

/// Probe assignments evaluated before the solver for all other types.
pub const DEFAULT_PROBES_OTHER: usize = 2;

/// Maximum difference between output count and operand width for which
/// truncated-output variants are generated.
pub const DEFAULT_MAX_OUTPUT_VARIANT_DELTA: usize = 3;

/// Structural candidates with an output depending on more inputs than this
/// are not analyzed functionally.
pub const DEFAULT_MAX_SUBGRAPH_INPUTS: usize = 130;

/// Seed for all pseudo-random probing and sampling.
pub const DEFAULT_SEED: u64 = 0x6d6f_6469_6400_0001;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBudget {
    pub max_control_signals: usize,
    pub max_operands_adder: usize,
    pub max_operands_single: usize,
    pub max_bin_size: usize,
    pub max_ctrl_bin_width: usize,
    pub max_future_candidates: usize,
    pub max_single_pair_permutation: usize,
    pub max_output_permutation_bin: usize,
    pub structural_branch_bound: usize,
    pub predecessor_size_multiplier: usize,
    pub successor_size_multiplier: usize,
    pub cone_size_multiplier: usize,
    pub first_gate_tier_bound: usize,
    pub max_inverters_per_gate: usize,
    pub overfull_reorder_adder: usize,
    pub overfull_reorder_counter: usize,
    pub influence_samples: usize,
    pub probes_arithmetic: usize,
    pub probes_other: usize,
    pub max_output_variant_delta: usize,
    pub max_subgraph_inputs: usize,
}

impl Default for SearchBudget {
    fn default() -> Self {
        SearchBudget {
            max_control_signals: DEFAULT_MAX_CONTROL_SIGNALS,
            max_operands_adder: DEFAULT_MAX_OPERANDS_ADDER,
            max_operands_single: DEFAULT_MAX_OPERANDS_SINGLE,
            max_bin_size: DEFAULT_MAX_BIN_SIZE,
            max_ctrl_bin_width: DEFAULT_MAX_CTRL_BIN_WIDTH,
            max_future_candidates: DEFAULT_MAX_FUTURE_CANDIDATES,
            max_single_pair_permutation: DEFAULT_MAX_SINGLE_PAIR_PERMUTATION,
            max_output_permutation_bin: DEFAULT_MAX_OUTPUT_PERMUTATION_BIN,
            structural_branch_bound: DEFAULT_STRUCTURAL_BRANCH_BOUND,
            predecessor_size_multiplier: DEFAULT_PREDECESSOR_SIZE_MULTIPLIER,
            successor_size_multiplier: DEFAULT_SUCCESSOR_SIZE_MULTIPLIER,
            cone_size_multiplier: DEFAULT_CONE_SIZE_MULTIPLIER,
            first_gate_tier_bound: DEFAULT_FIRST_GATE_TIER_BOUND,
            max_inverters_per_gate: DEFAULT_MAX_INVERTERS_PER_GATE,
            overfull_reorder_adder: DEFAULT_OVERFULL_REORDER_ADDER,
            overfull_reorder_counter: DEFAULT_OVERFULL_REORDER_COUNTER,
            influence_samples: DEFAULT_INFLUENCE_SAMPLES,
            probes_arithmetic: DEFAULT_PROBES_ARITHMETIC,
            probes_other: DEFAULT_PROBES_OTHER,
            max_output_variant_delta: DEFAULT_MAX_OUTPUT_VARIANT_DELTA,
            max_subgraph_inputs: DEFAULT_MAX_SUBGRAPH_INPUTS,
        }
    }
}

impl SearchBudget {
    /// Number of probe assignments for a verification of `ty`.
    pub fn probes_for(&self, ty: CandidateType) -> usize {
        match ty {
            CandidateType::Adder
            | CandidateType::Subtraction
            | CandidateType::Counter => self.probes_arithmetic,
            _ => self.probes_other,
        }
    }

    pub fn max_operands_for(&self, ty: CandidateType) -> usize {
        match ty {
            CandidateType::Adder => self.max_operands_adder,
            _ => self.max_operands_single,
        }
    }
}

/// Which backlog idle workers drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultithreadingPriority {
    /// Expand structural candidates first; maximizes parallelism.
    TimePriority,
    /// Verify functional candidates first; bounds peak memory.
    MemoryPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub types_to_check: Vec<CandidateType>,
    /// Register groups (e.g. the bits of one state register), used to rank
    /// operand orderings.
    pub known_registers: Vec<Vec<GateId>>,
    pub max_thread_count: usize,
    pub multithreading_priority: MultithreadingPriority,
    pub already_classified_candidates: Vec<Vec<GateId>>,
    pub blocked_base_candidates: Vec<Vec<GateId>>,
    pub seed: u64,
    pub budget: SearchBudget,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            types_to_check: CandidateType::SEARCH_TYPES.to_vec(),
            known_registers: Vec::new(),
            max_thread_count: num_cpus::get(),
            multithreading_priority: MultithreadingPriority::MemoryPriority,
            already_classified_candidates: Vec::new(),
            blocked_base_candidates: Vec::new(),
            seed: DEFAULT_SEED,
            budget: SearchBudget::default(),
        }
    }
}

impl Configuration {
    /// Worker pool size: capped by `max_thread_count` and leaves one
    /// hardware thread to the caller, but never drops below one.
    pub fn worker_count(&self) -> usize {
        let hardware = num_cpus::get();
        std::cmp::max(1, std::cmp::min(self.max_thread_count, hardware.saturating_sub(1)))
    }

    pub fn with_types(mut self, types: &[CandidateType]) -> Self {
        self.types_to_check = types.to_vec();
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.max_thread_count = threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_is_at_least_one() {
        let cfg = Configuration::default().with_threads(0);
        assert_eq!(cfg.worker_count(), 1);
    }

    #[test]
    fn test_configuration_serde_fills_defaults() {
        let cfg: Configuration = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.budget, SearchBudget::default());
        assert_eq!(cfg.types_to_check, CandidateType::SEARCH_TYPES.to_vec());
    }

    #[test]
    fn test_probe_counts_by_type() {
        let b = SearchBudget::default();
        assert_eq!(b.probes_for(CandidateType::Counter), 8);
        assert_eq!(b.probes_for(CandidateType::Equal), 2);
    }
}
