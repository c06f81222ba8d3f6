// SPDX-License-Identifier: Apache-2.0

//! Candidate data model: base chains, structural gate subsets grown from
//! them, in-flight functional hypotheses and verified results.

pub mod context;
pub mod functional;
pub mod verified;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::netlist::{GateId, NetId, Netlist};
pub use context::CandidateContext;
pub use functional::FunctionalCandidate;
pub use verified::VerifiedCandidate;

/// A realized 0/1 assignment of control signals.
pub type CtrlMapping = BTreeMap<NetId, bool>;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateType {
    None,
    Adder,
    Subtraction,
    Counter,
    Negation,
    Absolute,
    ConstantMultiplication,
    Equal,
    LessEqual,
    LessThan,
    SignedLessEqual,
    SignedLessThan,
    ValueCheck,
    Mixed,
}

impl CandidateType {
    /// Types for which a functional search exists. Subtraction, negation and
    /// the ordering comparisons are discovered while verifying one of these.
    pub const SEARCH_TYPES: [CandidateType; 7] = [
        CandidateType::Equal,
        CandidateType::LessEqual,
        CandidateType::Adder,
        CandidateType::Absolute,
        CandidateType::ValueCheck,
        CandidateType::ConstantMultiplication,
        CandidateType::Counter,
    ];

    pub fn is_searchable(self) -> bool {
        Self::SEARCH_TYPES.contains(&self)
    }

    pub fn name(self) -> &'static str {
        match self {
            CandidateType::None => "NONE",
            CandidateType::Adder => "ADDER",
            CandidateType::Subtraction => "SUBTRACTION",
            CandidateType::Counter => "COUNTER",
            CandidateType::Negation => "NEGATION",
            CandidateType::Absolute => "ABSOLUTE",
            CandidateType::ConstantMultiplication => "CONSTANT_MULTIPLICATION",
            CandidateType::Equal => "EQUAL",
            CandidateType::LessEqual => "LESS_EQUAL",
            CandidateType::LessThan => "LESS_THAN",
            CandidateType::SignedLessEqual => "SIGNED_LESS_EQUAL",
            CandidateType::SignedLessThan => "SIGNED_LESS_THAN",
            CandidateType::ValueCheck => "VALUE_CHECK",
            CandidateType::Mixed => "MIXED",
        }
    }

    /// Final tie-break between otherwise equally ranked candidates: the
    /// more specific operation wins, e.g. a counter over an adder with a
    /// constant operand.
    pub fn priority(self) -> u8 {
        match self {
            CandidateType::Counter => 0,
            CandidateType::Negation => 1,
            CandidateType::Absolute => 2,
            CandidateType::Adder => 3,
            CandidateType::Subtraction => 4,
            CandidateType::ConstantMultiplication => 5,
            CandidateType::Equal
            | CandidateType::LessThan
            | CandidateType::LessEqual
            | CandidateType::SignedLessThan
            | CandidateType::SignedLessEqual => 6,
            CandidateType::ValueCheck => 7,
            CandidateType::Mixed => 8,
            CandidateType::None => 9,
        }
    }
}

impl std::fmt::Display for CandidateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A maximal chain of a dedicated arithmetic primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaseCandidate {
    pub id: usize,
    pub gates: Vec<GateId>,
}

/// One concrete gate subset grown around a base candidate. Owns the
/// memoization context of its boolean functions.
pub struct StructuralCandidate<'nl> {
    pub base: Arc<BaseCandidate>,
    pub gates: Vec<GateId>,
    pub context: CandidateContext<'nl>,
}

impl<'nl> StructuralCandidate<'nl> {
    pub fn new(
        netlist: &'nl Netlist,
        base: Arc<BaseCandidate>,
        gates: Vec<GateId>,
        seed: u64,
        influence_samples: usize,
    ) -> Self {
        let context = CandidateContext::new(netlist, &gates, seed, influence_samples);
        StructuralCandidate {
            base,
            gates,
            context,
        }
    }
}

impl std::fmt::Debug for StructuralCandidate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuralCandidate")
            .field("base", &self.base.id)
            .field("gates", &self.gates)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_types_exclude_derived_types() {
        assert!(CandidateType::Adder.is_searchable());
        assert!(!CandidateType::Subtraction.is_searchable());
        assert!(!CandidateType::SignedLessThan.is_searchable());
    }

    #[test]
    fn test_candidate_type_serde_is_snake_case() {
        let s = serde_json::to_string(&CandidateType::ConstantMultiplication).unwrap();
        assert_eq!(s, "\"constant_multiplication\"");
    }
}
