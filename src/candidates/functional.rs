// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use crate::candidates::{CandidateContext, CandidateType, CtrlMapping};
use crate::netlist::NetId;

/// An in-progress hypothesis about the operands, control signals and
/// outputs of a structural candidate. Pipeline stages copy and refine it.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionalCandidate {
    pub candidate_type: CandidateType,
    /// Operand net groups, each LSB first. May contain ground/power nets
    /// used as padding.
    pub operands: Vec<Vec<NetId>>,
    pub control_signals: Vec<NetId>,
    /// Realized values of `control_signals`; empty until realization.
    pub control_mapping: CtrlMapping,
    /// Input nets bucketed by the number of outputs they influence.
    pub influence_bins: BTreeMap<usize, Vec<NetId>>,
    /// Output nets bucketed by the number of inputs they depend on.
    pub output_bins: BTreeMap<usize, Vec<NetId>>,
    /// Inputs that are the only variable of some output (buffered bits).
    pub single_input_to_output: BTreeMap<NetId, NetId>,
    pub permuted_single_pairs: Vec<(NetId, NetId)>,
    pub input_nets: Vec<NetId>,
    /// Ordered output nets, LSB first.
    pub output_nets: Vec<NetId>,
    pub max_control_signals: usize,
    /// Zero means unbounded.
    pub max_operands: usize,
    pub additional_data: BTreeMap<String, String>,
    /// Control signal folded back into the operand (absolute value sign).
    pub ctrl_to_operand_net: Option<NetId>,
    pub sign_nets: Vec<NetId>,
}

impl FunctionalCandidate {
    pub fn new(ctx: &CandidateContext<'_>, candidate_type: CandidateType, max_control_signals: usize) -> Self {
        FunctionalCandidate {
            candidate_type,
            operands: Vec::new(),
            control_signals: Vec::new(),
            control_mapping: CtrlMapping::new(),
            influence_bins: BTreeMap::new(),
            output_bins: BTreeMap::new(),
            single_input_to_output: BTreeMap::new(),
            permuted_single_pairs: Vec::new(),
            input_nets: ctx.input_nets(),
            output_nets: ctx.output_nets(true),
            max_control_signals,
            max_operands: 0,
            additional_data: BTreeMap::new(),
            ctrl_to_operand_net: None,
            sign_nets: Vec::new(),
        }
    }

    pub fn add_additional_data(&mut self, key: &str, value: String) {
        self.additional_data.insert(key.to_string(), value);
    }

    /// Width of the widest operand.
    pub fn operand_width(&self) -> usize {
        self.operands.iter().map(|o| o.len()).max().unwrap_or(0)
    }

    /// Short human-readable summary for trace logging.
    pub fn info(&self) -> String {
        format!(
            "{} ops={:?} out={} ctrl={:?}",
            self.candidate_type,
            self.operands.iter().map(|o| o.len()).collect::<Vec<_>>(),
            self.output_nets.len(),
            self.control_mapping
        )
    }
}
