// SPDX-License-Identifier: Apache-2.0

//! Stages that turn input/output bins into ordered operand and output
//! vectors, plus the sign and width variants explored around them.

use std::collections::{BTreeMap, BTreeSet};

use super::{StageEnv, StageResult, sorted_influence};
use crate::candidates::{CandidateContext, CandidateType, CtrlMapping, FunctionalCandidate};
use crate::error::ModIdError;
use crate::netlist::{NetId, Netlist};
use crate::utils::{
    combinations_with_repetition, next_permutation, permutations, reorder_commutative_operands,
};

/// Overfull bins holding more nets than this are never permuted as a whole.
const MAX_PERMUTED_NETS: usize = 5;

/// One candidate per ordering of the buffered input/output pairs.
pub fn permute_single_input_signals(
    candidate: &FunctionalCandidate,
    _ctx: &mut CandidateContext<'_>,
    env: &StageEnv<'_>,
) -> StageResult {
    if candidate.single_input_to_output.len() > env.budget.max_single_pair_permutation {
        return Ok(Vec::new());
    }
    let pairs: Vec<(NetId, NetId)> = candidate
        .single_input_to_output
        .iter()
        .map(|(i, o)| (*i, *o))
        .collect();
    Ok(permutations(&pairs)
        .into_iter()
        .map(|perm| {
            let mut c = candidate.clone();
            c.permuted_single_pairs = perm;
            c
        })
        .collect())
}

fn non_constant_count(netlist: &Netlist, op: &[NetId]) -> usize {
    op.iter().filter(|n| !netlist.is_constant_net(**n)).count()
}

/// Orderings of the nets of a single operand. Bins are visited from the
/// most influential one; overfull bins (more than one net) may only
/// precede all singleton bins and are permuted, the singletons follow in
/// order.
fn reorder_overfull_input_bins(
    bins: &BTreeMap<usize, Vec<NetId>>,
    max_overfull_bins: usize,
) -> Vec<Vec<NetId>> {
    let mut singletons = Vec::new();
    let mut to_permute = Vec::new();
    let mut overfull: Vec<Vec<NetId>> = Vec::new();
    for nets in bins.values().rev() {
        if nets.len() == 1 {
            singletons.push(nets[0]);
            continue;
        }
        if !singletons.is_empty() {
            return Vec::new();
        }
        to_permute.extend(nets.iter().copied());
        overfull.push(nets.clone());
    }
    if overfull.len() > max_overfull_bins {
        return Vec::new();
    }

    if to_permute.len() <= MAX_PERMUTED_NETS {
        return permutations(&to_permute)
            .into_iter()
            .map(|mut p| {
                p.extend(singletons.iter().copied());
                p
            })
            .collect();
    }

    // Equally sized bins are permuted one by one and interleaved.
    let width = overfull[0].len();
    if overfull.iter().any(|b| b.len() != width) || width > MAX_PERMUTED_NETS {
        return Vec::new();
    }
    let mut bin_sets: Vec<Vec<Vec<NetId>>> = vec![Vec::new()];
    for bin in &overfull {
        let mut next = Vec::new();
        for perm in permutations(bin) {
            for set in &bin_sets {
                let mut s = set.clone();
                s.push(perm.clone());
                next.push(s);
            }
        }
        bin_sets = next;
    }
    bin_sets
        .into_iter()
        .map(|set| {
            let mut op: Vec<NetId> = (0..width)
                .flat_map(|idx| set.iter().map(move |bin| bin[idx]))
                .collect();
            op.extend(singletons.iter().copied());
            op
        })
        .collect()
}

/// Adder operands: the i-th net of every input bin goes to operand i. A
/// bin distribution with a hump (the most influential bin is not the
/// widest) is also tried with ground padding up to the widest bin.
fn build_adder_operands(
    candidate: &FunctionalCandidate,
    ctx: &CandidateContext<'_>,
) -> StageResult {
    let netlist = ctx.netlist();
    let mut result = Vec::new();
    let max_operands = candidate.max_operands;
    let valid_count = |n: usize| n >= 2 && n <= max_operands;

    let widest = candidate.influence_bins.values().map(|b| b.len()).max().unwrap_or(0);
    let top_width = candidate.influence_bins.values().next_back().map(|b| b.len());
    if top_width.is_some_and(|w| w < widest) {
        let gnd = ctx.gnd()?;
        let mut operands: Vec<Vec<NetId>> = Vec::new();
        let mut reached = false;
        for nets in candidate.influence_bins.values().rev() {
            reached |= nets.len() == widest;
            let upper = if reached { nets.len() } else { widest };
            for idx in 0..upper {
                if operands.len() <= idx {
                    operands.push(Vec::new());
                }
                operands[idx].push(nets.get(idx).copied().unwrap_or(gnd));
            }
        }
        if valid_count(operands.len())
            && operands.iter().all(|op| non_constant_count(netlist, op) >= 2)
        {
            let mut c = candidate.clone();
            c.operands = operands;
            result.push(c);
        }
    }

    let mut operands: Vec<Vec<NetId>> = Vec::new();
    for nets in candidate.influence_bins.values().rev() {
        if max_operands != 0 && nets.len() > max_operands {
            return Ok(result);
        }
        for (idx, net) in nets.iter().enumerate() {
            if operands.len() <= idx {
                operands.push(Vec::new());
            }
            operands[idx].push(*net);
        }
    }
    if !valid_count(operands.len()) {
        return Ok(result);
    }
    if !candidate.permuted_single_pairs.is_empty() {
        let gnd = ctx.gnd()?;
        for (input, _) in &candidate.permuted_single_pairs {
            for (op_idx, op) in operands.iter_mut().enumerate() {
                op.insert(0, if op_idx == 0 { *input } else { gnd });
            }
        }
    }
    // A one-bit operand is an enable, which makes this a counter.
    if operands.iter().any(|op| non_constant_count(netlist, op) < 2) {
        return Ok(result);
    }
    let mut c = candidate.clone();
    c.operands = operands;
    result.push(c);
    Ok(result)
}

fn build_single_operand(candidate: &FunctionalCandidate, env: &StageEnv<'_>) -> StageResult {
    let ty = candidate.candidate_type;
    let (max_overfull, min_len, with_single) = match ty {
        CandidateType::ConstantMultiplication => (env.budget.overfull_reorder_adder, 1, false),
        _ => (env.budget.overfull_reorder_counter, 2, true),
    };
    let mut result = Vec::new();
    for nets in reorder_overfull_input_bins(&candidate.influence_bins, max_overfull) {
        if nets.len() < min_len {
            continue;
        }
        let mut op: Vec<NetId> = Vec::with_capacity(nets.len() + candidate.permuted_single_pairs.len());
        if with_single {
            op.extend(candidate.permuted_single_pairs.iter().map(|(i, _)| *i));
        }
        op.extend(nets);
        if ty == CandidateType::Absolute {
            if op.len() >= candidate.output_nets.len() {
                return Ok(Vec::new());
            }
            op.extend(candidate.ctrl_to_operand_net);
        }
        let mut c = candidate.clone();
        c.operands = vec![op];
        result.push(c);
    }
    Ok(result)
}

/// Builds operand vectors from the input bins. The most influential
/// output must depend on every binned input.
pub fn build_input_operands(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    env: &StageEnv<'_>,
) -> StageResult {
    let input_count: usize = candidate.influence_bins.values().map(|b| b.len()).sum();
    match candidate.output_bins.keys().next_back() {
        Some(widest) if *widest >= input_count => {}
        _ => return Ok(Vec::new()),
    }
    let result = match candidate.candidate_type {
        CandidateType::Adder => build_adder_operands(candidate, ctx)?,
        CandidateType::Counter | CandidateType::ConstantMultiplication | CandidateType::Absolute => {
            build_single_operand(candidate, env)?
        }
        _ => Vec::new(),
    };
    for c in &result {
        for net in c.operands.iter().flatten() {
            if !ctx.netlist().is_constant_net(*net) && !c.input_nets.contains(net) {
                log::error!(
                    "operand net {} is not an input of the candidate",
                    ctx.netlist().net(*net).name
                );
            }
        }
    }
    Ok(result)
}

/// Value checks compare all inputs against one constant.
pub fn build_input_operand(
    candidate: &FunctionalCandidate,
    _ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    let mut c = candidate.clone();
    c.operands = vec![candidate.input_nets.clone()];
    Ok(vec![c])
}

/// Orders `nets` by ascending summed influence of their variables.
fn order_by_influence(
    ctx: &mut CandidateContext<'_>,
    ctrl: &CtrlMapping,
    nets: &[NetId],
) -> Result<Option<Vec<NetId>>, ModIdError> {
    let mut scored = Vec::with_capacity(nets.len());
    for net in nets {
        let influence = sorted_influence(ctx, *net, ctrl)?;
        if influence.is_empty() {
            return Ok(None);
        }
        scored.push((*net, influence.iter().map(|(_, v)| v).sum::<f64>()));
    }
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Some(scored.into_iter().map(|(n, _)| n).collect()))
}

/// Orders outputs by how many inputs they depend on, most first, then
/// reverses to LSB first. Small bins are permuted, large ones ordered by
/// influence.
pub fn order_output_signals(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    env: &StageEnv<'_>,
) -> StageResult {
    let mut orderings: Vec<Vec<NetId>> = Vec::new();
    for bin in candidate.output_bins.values().rev() {
        let perms = if bin.len() <= env.budget.max_output_permutation_bin {
            permutations(bin)
        } else {
            match order_by_influence(ctx, &candidate.control_mapping, bin)? {
                Some(order) => vec![order],
                None => return Ok(Vec::new()),
            }
        };
        orderings = if orderings.is_empty() {
            perms
        } else {
            orderings
                .iter()
                .flat_map(|prefix| {
                    perms.iter().map(move |p| {
                        let mut v = prefix.clone();
                        v.extend(p.iter().copied());
                        v
                    })
                })
                .collect()
        };
    }
    Ok(orderings
        .into_iter()
        .filter(|o| !o.is_empty())
        .map(|mut o| {
            o.reverse();
            let mut c = candidate.clone();
            c.output_nets = o;
            c
        })
        .collect())
}

/// Puts the outputs of buffered inputs in front of the output vector.
pub fn add_single_input_signals(
    candidate: &FunctionalCandidate,
    _ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    let mut c = candidate.clone();
    for (_, out) in candidate.permuted_single_pairs.iter().rev() {
        c.output_nets.insert(0, *out);
    }
    if c.candidate_type == CandidateType::Absolute
        && c.operands.first().is_some_and(|op| op.len() > c.output_nets.len())
    {
        return Ok(Vec::new());
    }
    Ok(vec![c])
}

/// All assignments of the bits at `position` to the operands that have
/// that bit.
fn sign_bit_permutations(operands: &[Vec<NetId>], position: usize) -> Vec<Vec<Vec<NetId>>> {
    let mut signals = Vec::new();
    let mut op_indices = Vec::new();
    for (idx, op) in operands.iter().enumerate() {
        if let Some(net) = op.get(position) {
            signals.push(*net);
            op_indices.push(idx);
        }
    }
    if op_indices.len() <= 1 {
        return vec![operands.to_vec()];
    }
    let mut result = Vec::new();
    loop {
        let mut ops = operands.to_vec();
        for (signal, op_idx) in signals.iter().zip(&op_indices) {
            ops[*op_idx][position] = *signal;
        }
        result.push(ops);
        if !next_permutation(&mut op_indices) {
            break;
        }
    }
    result
}

/// Operands may be mis-assigned at their MSBs, where the bins cannot tell
/// them apart; tries every assignment of every sign position.
pub fn create_sign_bit_variants(
    candidate: &FunctionalCandidate,
    _ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    let positions: BTreeSet<usize> = candidate
        .operands
        .iter()
        .filter(|op| !op.is_empty())
        .map(|op| op.len() - 1)
        .collect();
    let mut variants = vec![candidate.operands.clone()];
    for position in positions {
        variants = variants
            .iter()
            .flat_map(|ops| sign_bit_permutations(ops, position))
            .collect();
    }
    Ok(variants
        .into_iter()
        .map(|ops| {
            let mut c = candidate.clone();
            c.operands = ops;
            c
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extension {
    Zero,
    Sign,
    /// Sign extended up to the second highest bit, then zero.
    SignBelowTop,
}

const ALL_EXTENSIONS: [Extension; 3] = [Extension::Zero, Extension::Sign, Extension::SignBelowTop];

fn resize(op: &[NetId], size: usize, fill: NetId) -> Vec<NetId> {
    (0..size).map(|idx| op.get(idx).copied().unwrap_or(fill)).collect()
}

fn apply_extension(op: &[NetId], size: usize, extension: Extension, sign: NetId, gnd: NetId) -> Vec<NetId> {
    match extension {
        Extension::Zero => resize(op, size, gnd),
        Extension::Sign => resize(op, size, op.last().copied().unwrap_or(gnd)),
        Extension::SignBelowTop => resize(&resize(op, size.saturating_sub(1), sign), size, gnd),
    }
}

/// Extends operands to the output width, with zero, sign or
/// sign-below-top extension. Constant multiplications extend each operand
/// independently and use the sign of the unshifted operand.
pub fn create_input_extension_variants(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    let ty = candidate.candidate_type;
    let outputs = candidate.output_nets.len();
    let possible: &[Extension] = if ty == CandidateType::ConstantMultiplication || candidate.operands.len() != 1 {
        &ALL_EXTENSIONS
    } else {
        let width = candidate.operands[0].len();
        if width + 1 < outputs {
            &ALL_EXTENSIONS
        } else if width < outputs {
            &ALL_EXTENSIONS[..2]
        } else {
            &[]
        }
    };
    let extension_sets: Vec<Vec<Extension>> = if ty == CandidateType::ConstantMultiplication {
        combinations_with_repetition(possible, candidate.operands.len())
    } else {
        possible
            .iter()
            .map(|e| vec![*e; candidate.operands.len()])
            .collect()
    };
    if extension_sets.is_empty() {
        return Ok(vec![candidate.clone()]);
    }

    let gnd = ctx.gnd()?;
    let shared_sign = candidate.operands.first().and_then(|op| op.last()).copied();
    let mut result: Vec<FunctionalCandidate> = Vec::with_capacity(extension_sets.len());
    for set in extension_sets {
        let operands: Vec<Vec<NetId>> = candidate
            .operands
            .iter()
            .zip(&set)
            .map(|(op, ext)| {
                let sign = if ty == CandidateType::ConstantMultiplication {
                    shared_sign
                } else {
                    op.last().copied()
                };
                apply_extension(op, outputs, *ext, sign.unwrap_or(gnd), gnd)
            })
            .collect();
        if result.iter().any(|c| c.operands == operands) {
            continue;
        }
        let mut c = candidate.clone();
        c.operands = operands;
        result.push(c);
    }
    Ok(result)
}

/// Keeps the candidate and adds a copy whose commutative operands are
/// reordered bitwise to follow the register groups.
pub fn reorder_commutative(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    env: &StageEnv<'_>,
) -> StageResult {
    let mut reordered = candidate.clone();
    reordered.operands =
        reorder_commutative_operands(ctx.netlist(), &candidate.operands, env.registers, 0);
    if reordered.operands == candidate.operands {
        return Ok(vec![candidate.clone()]);
    }
    Ok(vec![candidate.clone(), reordered])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchBudget;
    use crate::netlist::GateLibrary;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn nets(ids: &[usize]) -> Vec<NetId> {
        ids.iter().map(|i| NetId(*i)).collect()
    }

    #[test]
    fn test_overfull_bins_are_permuted_before_singletons() {
        let bins = btreemap! { 1 => nets(&[9]), 2 => nets(&[8]), 3 => nets(&[2, 1]) };
        let got = reorder_overfull_input_bins(&bins, 2);
        assert_eq!(got, vec![nets(&[1, 2, 8, 9]), nets(&[2, 1, 8, 9])]);
    }

    #[test]
    fn test_overfull_bin_after_singleton_is_rejected() {
        let bins = btreemap! { 1 => nets(&[3, 4]), 2 => nets(&[8]), 3 => nets(&[1, 2]) };
        assert!(reorder_overfull_input_bins(&bins, 2).is_empty());
    }

    #[test]
    fn test_large_overfull_bins_are_interleaved() {
        let bins = btreemap! { 2 => nets(&[4, 5, 6]), 3 => nets(&[1, 2, 3]) };
        let got = reorder_overfull_input_bins(&bins, 2);
        assert_eq!(got.len(), 36);
        assert_eq!(got[0], nets(&[1, 4, 2, 5, 3, 6]));
    }

    #[test]
    fn test_sign_bit_permutations_swap_msbs() {
        let ops = vec![nets(&[1, 2]), nets(&[3, 4]), nets(&[5])];
        let got = sign_bit_permutations(&ops, 1);
        assert_eq!(got.len(), 2);
        assert_eq!(got[1], vec![nets(&[1, 4]), nets(&[3, 2]), nets(&[5])]);
    }

    #[test]
    fn test_extensions() {
        let gnd = NetId(0);
        let op = nets(&[1, 2]);
        assert_eq!(apply_extension(&op, 4, Extension::Zero, NetId(2), gnd), nets(&[1, 2, 0, 0]));
        assert_eq!(apply_extension(&op, 4, Extension::Sign, NetId(2), gnd), nets(&[1, 2, 2, 2]));
        assert_eq!(
            apply_extension(&op, 4, Extension::SignBelowTop, NetId(7), gnd),
            nets(&[1, 2, 7, 0])
        );
        assert_eq!(apply_extension(&op, 1, Extension::Zero, NetId(2), gnd), nets(&[1]));
    }

    #[test]
    fn test_permute_single_input_signals_respects_budget() {
        let mut netlist = Netlist::new("t", GateLibrary::ice40());
        let _ = netlist.create_net("n");
        let ctx_gates = Vec::new();
        let mut ctx = CandidateContext::new(&netlist, &ctx_gates, 1, 64);
        let budget = SearchBudget::default();
        let env = StageEnv {
            budget: &budget,
            registers: &[],
        };
        let mut c = FunctionalCandidate::new(&ctx, CandidateType::Counter, 0);
        c.single_input_to_output = btreemap! { NetId(1) => NetId(5), NetId(2) => NetId(6) };
        let got = permute_single_input_signals(&c, &mut ctx, &env).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].permuted_single_pairs, vec![(NetId(2), NetId(6)), (NetId(1), NetId(5))]);

        c.single_input_to_output = (0..4).map(|i| (NetId(i), NetId(10 + i))).collect();
        assert!(permute_single_input_signals(&c, &mut ctx, &env).unwrap().is_empty());
    }
}
