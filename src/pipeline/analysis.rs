// SPDX-License-Identifier: Apache-2.0

//! Stages that inspect the output functions: output set canonicalization,
//! input/output bucketing and the early-abort plausibility check.

use std::collections::{BTreeMap, BTreeSet};

use super::{StageEnv, StageResult};
use crate::candidates::{CandidateContext, CandidateType, CtrlMapping, FunctionalCandidate};
use crate::netlist::NetId;

pub fn trim_to_single_output_net(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    if candidate.output_nets.len() > 2 || ctx.gates().is_empty() {
        return Ok(Vec::new());
    }
    Ok(candidate
        .output_nets
        .iter()
        .map(|out| {
            let mut c = candidate.clone();
            c.output_nets = vec![*out];
            c
        })
        .collect())
}

/// An equality over two operands has an even number of variables.
pub fn discard_equal_candidate(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    let Some(out) = candidate.output_nets.first() else {
        return Ok(Vec::new());
    };
    let vars = ctx.variables(*out, &candidate.control_mapping)?;
    if vars.len() % 2 == 0 {
        Ok(vec![candidate.clone()])
    } else {
        Ok(Vec::new())
    }
}

/// Adds a variant whose outputs are all nets with any destination outside
/// the gate set, if that adds only a few outputs.
pub fn create_output_net_variant(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    env: &StageEnv<'_>,
) -> StageResult {
    let mut result = vec![candidate.clone()];
    let extended = ctx.output_nets(false);
    if extended.len() != candidate.output_nets.len()
        && extended.len().saturating_sub(candidate.output_nets.len())
            <= env.budget.max_output_variant_delta
    {
        let mut c = candidate.clone();
        c.output_nets = extended;
        result.push(c);
    }
    Ok(result)
}

/// A value check has exactly one output: either the only one, or the only
/// net leaving the gate set exclusively.
pub fn check_output_size(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    if candidate.output_nets.len() == 1 {
        return Ok(vec![candidate.clone()]);
    }
    let external = ctx.output_nets(true);
    if external.len() == 1 {
        let mut c = candidate.clone();
        c.output_nets = external;
        return Ok(vec![c]);
    }
    Ok(Vec::new())
}

fn skips_single_inputs(ty: CandidateType) -> bool {
    matches!(
        ty,
        CandidateType::Adder | CandidateType::Counter | CandidateType::Absolute
    )
}

/// Buckets inputs by the number of outputs they influence and outputs by
/// the number of inputs they depend on. Outputs that are a function of a
/// single input are recorded as buffered bits.
pub fn update_input_output_stats(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    env: &StageEnv<'_>,
) -> StageResult {
    if candidate.output_nets.len() < 2 {
        return Ok(Vec::new());
    }
    let ty = candidate.candidate_type;

    let mut variables: Vec<BTreeSet<NetId>> = Vec::with_capacity(candidate.output_nets.len());
    for out in &candidate.output_nets {
        variables.push(ctx.variables(*out, &candidate.control_mapping)?);
    }

    let mut single_input_to_output = BTreeMap::new();
    for (out, vars) in candidate.output_nets.iter().zip(&variables) {
        if vars.len() != 1 {
            continue;
        }
        let input = *vars.iter().next().unwrap_or(out);
        // One input buffered to two outputs cannot be placed in an operand.
        if single_input_to_output.insert(input, *out).is_some() {
            return Ok(Vec::new());
        }
    }

    let mut influenced_outputs: BTreeMap<NetId, usize> = BTreeMap::new();
    for vars in &variables {
        for input in vars {
            if skips_single_inputs(ty) && single_input_to_output.contains_key(input) {
                continue;
            }
            if ty == CandidateType::Absolute && candidate.ctrl_to_operand_net == Some(*input) {
                continue;
            }
            *influenced_outputs.entry(*input).or_default() += 1;
        }
    }

    let mut influence_bins: BTreeMap<usize, Vec<NetId>> = BTreeMap::new();
    for (input, count) in influenced_outputs {
        influence_bins.entry(count).or_default().push(input);
    }
    let max_bin = influence_bins.values().map(|b| b.len()).max().unwrap_or(0);
    if max_bin > env.budget.max_bin_size {
        log::trace!("abandoning candidate with an input bin of {} nets", max_bin);
        return Ok(Vec::new());
    }

    let mut output_bins: BTreeMap<usize, Vec<NetId>> = BTreeMap::new();
    let mut by_net: Vec<(NetId, usize)> = candidate
        .output_nets
        .iter()
        .zip(&variables)
        .map(|(o, v)| (*o, v.len()))
        .collect();
    by_net.sort();
    for (out, count) in by_net {
        if count == 1 && (skips_single_inputs(ty) || ty == CandidateType::ConstantMultiplication) {
            continue;
        }
        output_bins.entry(count).or_default().push(out);
    }

    let mut c = candidate.clone();
    c.influence_bins = influence_bins;
    c.output_bins = output_bins;
    c.single_input_to_output = single_input_to_output;
    Ok(vec![c])
}

/// Rejects candidates whose response to an all-zero data input cannot
/// come from the claimed operation.
pub fn early_abort(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    match candidate.candidate_type {
        CandidateType::Adder | CandidateType::ConstantMultiplication => {
            let mut assignment: BTreeMap<NetId, bool> = BTreeMap::new();
            for input in &candidate.input_nets {
                let value = if candidate.control_signals.contains(input) {
                    candidate.control_mapping.get(input).copied().unwrap_or(false)
                } else {
                    false
                };
                assignment.insert(*input, value);
            }
            // An adder may add a constant one, so one set output is allowed.
            let allowed = if candidate.candidate_type == CandidateType::Adder {
                1
            } else {
                0
            };
            let mut non_zero = 0;
            for out in &candidate.output_nets {
                if ctx.evaluate(*out, &CtrlMapping::new(), &assignment)? {
                    non_zero += 1;
                    if non_zero > allowed {
                        return Ok(Vec::new());
                    }
                }
            }
        }
        CandidateType::Counter | CandidateType::Absolute => {
            let outputs = candidate.output_nets.len();
            let inputs = candidate.input_nets.len();
            if outputs <= inputs && inputs - outputs >= outputs {
                return Ok(Vec::new());
            }
        }
        _ => {}
    }
    Ok(vec![candidate.clone()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchBudget;
    use crate::test_utils::{build_ice40_counter, build_ice40_ripple_adder};
    use pretty_assertions::assert_eq;

    fn env(budget: &SearchBudget) -> StageEnv<'_> {
        StageEnv {
            budget,
            registers: &[],
        }
    }

    #[test]
    fn test_adder_bins_follow_bit_significance() {
        let adder = build_ice40_ripple_adder(4);
        let mut gates = adder.carries.clone();
        gates.extend(adder.luts.iter().copied());
        let mut ctx = CandidateContext::new(&adder.netlist, &gates, 1, 256);
        let budget = SearchBudget::default();
        let c = FunctionalCandidate::new(&ctx, CandidateType::Adder, 5);
        let out = update_input_output_stats(&c, &mut ctx, &env(&budget)).unwrap();
        assert_eq!(out.len(), 1);
        let bins = &out[0].influence_bins;
        assert_eq!(bins.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(bins[&4], vec![adder.a[0], adder.b[0]]);
        assert_eq!(out[0].output_bins[&8], vec![adder.sum[3]]);
    }

    #[test]
    fn test_counter_lsb_is_a_buffered_bit() {
        let counter = build_ice40_counter(4);
        let mut ctx = CandidateContext::new(&counter.netlist, &counter.logic, 1, 256);
        let budget = SearchBudget::default();
        let c = FunctionalCandidate::new(&ctx, CandidateType::Counter, 5);
        let out = update_input_output_stats(&c, &mut ctx, &env(&budget)).unwrap();
        assert_eq!(
            out[0].single_input_to_output,
            maplit::btreemap! { counter.q[0] => counter.next[0] }
        );
        assert!(!out[0].output_bins.values().flatten().any(|n| *n == counter.next[0]));
    }

    #[test]
    fn test_early_abort_keeps_plain_adder() {
        let adder = build_ice40_ripple_adder(3);
        let mut gates = adder.carries.clone();
        gates.extend(adder.luts.iter().copied());
        let mut ctx = CandidateContext::new(&adder.netlist, &gates, 1, 256);
        let budget = SearchBudget::default();
        let c = FunctionalCandidate::new(&ctx, CandidateType::Adder, 5);
        assert_eq!(early_abort(&c, &mut ctx, &env(&budget)).unwrap().len(), 1);
    }

    #[test]
    fn test_trim_rejects_wide_outputs() {
        let adder = build_ice40_ripple_adder(3);
        let mut gates = adder.carries.clone();
        gates.extend(adder.luts.iter().copied());
        let mut ctx = CandidateContext::new(&adder.netlist, &gates, 1, 256);
        let budget = SearchBudget::default();
        let c = FunctionalCandidate::new(&ctx, CandidateType::Equal, 5);
        assert!(trim_to_single_output_net(&c, &mut ctx, &env(&budget)).unwrap().is_empty());
    }
}
