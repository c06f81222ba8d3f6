// SPDX-License-Identifier: Apache-2.0

//! Verified candidates and their merging across control assignments.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::candidates::{CandidateType, CtrlMapping};
use crate::error::ModIdError;
use crate::netlist::{GateId, NetId, Netlist};
use crate::word::WordExpr;

pub const UNKNOWN_OPERATION: &str = "UNKNOWN_OPERATION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedCandidate {
    pub verified: bool,
    pub operands: Vec<Vec<NetId>>,
    pub output_nets: Vec<NetId>,
    pub control_signals: Vec<NetId>,
    pub control_mappings: Vec<CtrlMapping>,
    /// One word-level operation per entry of `control_mappings`.
    pub operations: Vec<(CtrlMapping, WordExpr)>,
    pub types: BTreeSet<CandidateType>,
    pub gates: Vec<GateId>,
    pub base_gates: Vec<GateId>,
    pub additional_data: BTreeMap<String, String>,
}

impl VerifiedCandidate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        candidate_type: CandidateType,
        operands: Vec<Vec<NetId>>,
        output_nets: Vec<NetId>,
        control_signals: Vec<NetId>,
        control_mapping: CtrlMapping,
        operation: WordExpr,
        gates: Vec<GateId>,
        additional_data: BTreeMap<String, String>,
    ) -> Self {
        VerifiedCandidate {
            verified: true,
            operands,
            output_nets,
            control_signals,
            control_mappings: vec![control_mapping.clone()],
            operations: vec![(control_mapping, operation)],
            types: BTreeSet::from([candidate_type]),
            gates,
            base_gates: Vec::new(),
            additional_data,
        }
    }

    /// Placeholder for a base candidate without any verified explanation.
    pub fn unverified(base_gates: Vec<GateId>) -> Self {
        VerifiedCandidate {
            verified: false,
            operands: Vec::new(),
            output_nets: Vec::new(),
            control_signals: Vec::new(),
            control_mappings: Vec::new(),
            operations: Vec::new(),
            types: BTreeSet::new(),
            gates: Vec::new(),
            base_gates,
            additional_data: BTreeMap::new(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// The single matched type, or `Mixed` after merging different types.
    pub fn primary_type(&self) -> CandidateType {
        match self.types.len() {
            0 => CandidateType::None,
            1 => self.types.iter().next().copied().unwrap_or(CandidateType::None),
            _ => CandidateType::Mixed,
        }
    }

    pub fn name(&self) -> String {
        if self.types.is_empty() {
            return "NONE_CARRY_CHAIN".to_string();
        }
        self.types
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Gates owned by the candidate once materialized.
    pub fn owned_gates(&self) -> &[GateId] {
        if self.verified {
            &self.gates
        } else {
            &self.base_gates
        }
    }

    /// Merges candidates of the same gate set that cover different control
    /// assignments. Gates, outputs and control signals are taken from the
    /// first candidate. Differing `additional_data` values under one key are
    /// joined with `"; "` in candidate order.
    pub fn merge(netlist: &Netlist, candidates: &[VerifiedCandidate]) -> Result<VerifiedCandidate, ModIdError> {
        let first = candidates.first().ok_or_else(|| {
            ModIdError::MergeConflict("no candidates to merge".to_string())
        })?;
        let mut merged = VerifiedCandidate {
            verified: candidates.iter().all(|c| c.verified),
            operands: Vec::new(),
            output_nets: first.output_nets.clone(),
            control_signals: first.control_signals.clone(),
            control_mappings: Vec::new(),
            operations: Vec::new(),
            types: BTreeSet::new(),
            gates: first.gates.clone(),
            base_gates: first.base_gates.clone(),
            additional_data: BTreeMap::new(),
        };
        let mut assigned_to_operand = BTreeSet::new();
        for c in candidates {
            merged.types.extend(c.types.iter().copied());
            for (key, value) in &c.additional_data {
                match merged.additional_data.get_mut(key) {
                    Some(existing) => {
                        if !existing.split("; ").any(|v| v == value) {
                            existing.push_str("; ");
                            existing.push_str(value);
                        }
                    }
                    None => {
                        merged.additional_data.insert(key.clone(), value.clone());
                    }
                }
            }
            for (mapping, op) in &c.operations {
                if merged.control_mappings.contains(mapping) {
                    return Err(ModIdError::MergeConflict(format!(
                        "overlapping control mapping {:?}",
                        mapping
                    )));
                }
                merged.control_mappings.push(mapping.clone());
                merged.operations.push((mapping.clone(), op.clone()));
            }
            for nets in &c.operands {
                if merged.operands.contains(nets) {
                    continue;
                }
                let intersecting = nets
                    .iter()
                    .filter(|n| !netlist.is_constant_net(**n))
                    .find(|n| assigned_to_operand.contains(*n));
                if let Some(n) = intersecting {
                    log::warn!(
                        "found intersecting operand at net {} with ID {}",
                        netlist.net(*n).name,
                        n.0
                    );
                    continue;
                }
                merged.operands.push(nets.clone());
                assigned_to_operand.extend(nets.iter().copied().filter(|n| !netlist.is_constant_net(*n)));
            }
        }
        Ok(merged)
    }

    /// A single word-level operation selecting between the per-assignment
    /// operations by the control signals.
    pub fn merged_operation(&self) -> WordExpr {
        let width = self.output_nets.len();
        let mut result = WordExpr::Var {
            name: UNKNOWN_OPERATION.to_string(),
            width,
        };
        for (mapping, op) in &self.operations {
            if mapping.is_empty() {
                if self.operations.len() != 1 {
                    log::error!(
                        "found a candidate with {} word level operations but at least one being unconditional",
                        self.operations.len()
                    );
                } else {
                    result = op.clone();
                }
                break;
            }
            let nets: Vec<NetId> = mapping.keys().copied().collect();
            let values: Vec<bool> = mapping.values().copied().collect();
            let cond = WordExpr::Eq(
                Box::new(WordExpr::nets(&nets)),
                Box::new(WordExpr::from_bits(&values)),
            );
            result = WordExpr::ite(cond, op.clone(), result);
        }
        result
    }

    /// Human-readable dump for debug logging.
    pub fn info(&self, netlist: &Netlist) -> String {
        let mut s = format!("verified: {}\ntypes: {}\n", self.verified, self.name());
        s += &format!("gates [{}]\n", self.gates.len());
        for (idx, op) in self.operands.iter().enumerate() {
            let names: Vec<&str> = op.iter().map(|n| netlist.net(*n).name.as_str()).collect();
            s += &format!("operand {} [{}]: {}\n", idx, op.len(), names.join(", "));
        }
        let outs: Vec<&str> = self
            .output_nets
            .iter()
            .map(|n| netlist.net(*n).name.as_str())
            .collect();
        s += &format!("outputs [{}]: {}\n", outs.len(), outs.join(", "));
        for (mapping, op) in &self.operations {
            s += &format!("{:?}: {}\n", mapping, op);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::GateLibrary;
    use pretty_assertions::assert_eq;

    fn candidate(nl_nets: &[NetId], ctrl: NetId, value: bool, ty: CandidateType) -> VerifiedCandidate {
        let op = WordExpr::nets(&nl_nets[..2]).add(WordExpr::nets(&nl_nets[2..4]));
        VerifiedCandidate::new(
            ty,
            vec![nl_nets[..2].to_vec(), nl_nets[2..4].to_vec()],
            nl_nets[4..6].to_vec(),
            vec![ctrl],
            CtrlMapping::from([(ctrl, value)]),
            op,
            vec![GateId(0)],
            BTreeMap::new(),
        )
    }

    fn netlist_with_nets(count: usize) -> (Netlist, Vec<NetId>) {
        let mut nl = Netlist::new("t", GateLibrary::ice40());
        let nets = (0..count).map(|i| nl.create_net(&format!("n{i}"))).collect();
        (nl, nets)
    }

    #[test]
    fn test_merge_preserves_every_assignment() {
        let (nl, nets) = netlist_with_nets(7);
        let a = candidate(&nets, nets[6], false, CandidateType::Adder);
        let b = candidate(&nets, nets[6], true, CandidateType::Subtraction);
        let merged = VerifiedCandidate::merge(&nl, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(
            merged.control_mappings.len(),
            a.control_mappings.len() + b.control_mappings.len()
        );
        assert_eq!(merged.operands.len(), 2);
        assert_eq!(merged.name(), "ADDER_SUBTRACTION");
        assert!(matches!(merged.merged_operation(), WordExpr::Ite { .. }));
    }

    #[test]
    fn test_merge_keeps_additional_data() {
        let (nl, nets) = netlist_with_nets(7);
        let mut a = candidate(&nets, nets[6], false, CandidateType::Counter);
        a.additional_data.insert("COUNTER_INCREMENT".to_string(), "2'd1".to_string());
        let single = VerifiedCandidate::merge(&nl, std::slice::from_ref(&a)).unwrap();
        assert_eq!(single.additional_data, a.additional_data);

        let mut b = candidate(&nets, nets[6], true, CandidateType::Counter);
        b.additional_data.insert("COUNTER_INCREMENT".to_string(), "2'd3".to_string());
        let merged = VerifiedCandidate::merge(&nl, &[a, b]).unwrap();
        assert_eq!(merged.additional_data["COUNTER_INCREMENT"], "2'd1; 2'd3");
    }

    #[test]
    fn test_merge_rejects_overlapping_assignment() {
        let (nl, nets) = netlist_with_nets(7);
        let a = candidate(&nets, nets[6], true, CandidateType::Adder);
        let err = VerifiedCandidate::merge(&nl, &[a.clone(), a]).unwrap_err();
        assert!(matches!(err, ModIdError::MergeConflict(_)));
    }

    #[test]
    fn test_unverified_name_and_ownership() {
        let vc = VerifiedCandidate::unverified(vec![GateId(3)]);
        assert_eq!(vc.name(), "NONE_CARRY_CHAIN");
        assert_eq!(vc.owned_gates(), &[GateId(3)]);
    }
}
