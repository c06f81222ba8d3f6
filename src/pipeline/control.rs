// SPDX-License-Identifier: Apache-2.0

//! Control signal identification and realization.

use std::collections::BTreeMap;

use super::{StageEnv, StageResult, sorted_influence};
use crate::candidates::{CandidateContext, CandidateType, CtrlMapping, FunctionalCandidate};
use crate::netlist::NetId;
use crate::utils::combinations;

/// Bins may only hold this many control-free layers of recursion.
const MAX_BINS_INCLUDING_CONTROL: usize = 2;

type Split = (BTreeMap<usize, Vec<NetId>>, Vec<NetId>);

/// For comparisons: offers the most influential input as a control signal
/// next to the unchanged candidate.
pub fn find_control_signals(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    let mut result = vec![candidate.clone()];
    let Some(out) = candidate.output_nets.first() else {
        return Ok(result);
    };
    let influence = sorted_influence(ctx, *out, &candidate.control_mapping)?;
    let max_ctrl = candidate.max_control_signals.min(1).min(influence.len());
    for count in 0..max_ctrl {
        let mut c = candidate.clone();
        c.control_signals = influence[..=count].iter().map(|(n, _)| *n).collect();
        result.push(c);
    }
    Ok(result)
}

/// Removes nets from every bin holding more than `threshold` inputs and
/// treats them as control signals, recursing into the remaining bins.
fn control_input_splits(initial: &Split, threshold: usize, max_ctrl: usize, depth: usize) -> Vec<Split> {
    let (bins, ctrl) = initial;
    if ctrl.len() > max_ctrl {
        return Vec::new();
    }
    for (count, vars) in bins {
        if vars.len() <= threshold {
            continue;
        }
        let excess = vars.len() - threshold;
        if excess > max_ctrl || depth == 0 {
            return Vec::new();
        }
        let mut result = Vec::new();
        for removed in combinations(vars, excess) {
            let mut split = initial.clone();
            if let Some(bin) = split.0.get_mut(count) {
                bin.retain(|n| !removed.contains(n));
            }
            split.1.extend(removed);
            result.extend(control_input_splits(&split, threshold, max_ctrl, depth - 1));
        }
        return result;
    }
    vec![initial.clone()]
}

fn future_size(splits: &[Split]) -> usize {
    let ctrl = splits.first().map(|s| s.1.len()).unwrap_or(0);
    splits.len().saturating_mul(1usize << ctrl.min(usize::BITS as usize - 1))
}

/// Derives control signal sets from over-full input bins. The expected
/// operand count is the typical bin size; every net beyond it in a bin is a
/// control signal candidate.
pub fn identify_control_signals(
    candidate: &FunctionalCandidate,
    _ctx: &mut CandidateContext<'_>,
    env: &StageEnv<'_>,
) -> StageResult {
    let budget = env.budget;
    if candidate.max_control_signals > budget.max_control_signals {
        log::error!(
            "more than {} control signals are not supported",
            budget.max_control_signals
        );
        return Ok(vec![candidate.clone()]);
    }

    let mut sizes: Vec<usize> = candidate.influence_bins.values().map(|v| v.len()).collect();
    if sizes.is_empty() {
        log::warn!("unable to identify control signals: no input bins");
        return Ok(Vec::new());
    }
    sizes.sort_unstable();
    let distinct = {
        let mut d = sizes.clone();
        d.dedup();
        d.len()
    };
    let nth_largest = |n: usize| sizes[sizes.len().saturating_sub(n + 1)];
    let upper_bound = if distinct == 1 {
        sizes[0]
    } else {
        nth_largest(0).min(nth_largest(1))
    };
    let upper_bound_alt = if distinct == 2 || sizes.len() < 3 {
        sizes[0]
    } else {
        nth_largest(1).min(nth_largest(2))
    };
    let pick = |bound: usize| {
        let t = if candidate.max_operands != 0 {
            candidate.max_operands
        } else {
            bound
        };
        t.min(budget.max_ctrl_bin_width)
    };
    let threshold = pick(upper_bound);
    let threshold_alt = pick(upper_bound_alt);

    let initial: Split = (candidate.influence_bins.clone(), Vec::new());
    let bounded = |threshold: usize| {
        let splits = control_input_splits(
            &initial,
            threshold,
            candidate.max_control_signals,
            MAX_BINS_INCLUDING_CONTROL,
        );
        if future_size(&splits) > budget.max_future_candidates {
            log::debug!(
                "dropping {} control splits at threshold {}: too many future candidates",
                splits.len(),
                threshold
            );
            Vec::new()
        } else {
            splits
        }
    };
    let mut splits = bounded(threshold);
    if threshold_alt != threshold {
        splits.extend(bounded(threshold_alt));
    }

    let mut result = Vec::with_capacity(splits.len() + 1);
    let mut has_vanilla = false;
    for (_, ctrl) in splits {
        has_vanilla |= ctrl.is_empty();
        let mut c = candidate.clone();
        c.control_signals.extend(ctrl);
        result.push(c);
    }
    if matches!(
        candidate.candidate_type,
        CandidateType::Counter | CandidateType::Absolute
    ) && !has_vanilla
    {
        let mut c = candidate.clone();
        c.control_signals = c.control_mapping.keys().copied().collect();
        result.push(c);
    }
    Ok(result)
}

/// For absolute values: each control signal may instead be the sign bit
/// of the operand.
pub fn create_operand_control_variations(
    candidate: &FunctionalCandidate,
    _ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    Ok(candidate
        .control_signals
        .iter()
        .map(|sig| {
            let mut c = candidate.clone();
            c.control_signals.retain(|s| s != sig);
            c.ctrl_to_operand_net = Some(*sig);
            c
        })
        .collect())
}

/// Mapping of the `value`-th assignment: bit `i` of `value` drives
/// `signals[i]`.
pub(crate) fn control_mapping(signals: &[NetId], value: usize) -> CtrlMapping {
    signals
        .iter()
        .enumerate()
        .map(|(idx, n)| (*n, (value >> idx) & 1 == 1))
        .collect()
}

/// One candidate per 0/1 assignment of the control signals.
pub fn realize_control_signals(
    candidate: &FunctionalCandidate,
    _ctx: &mut CandidateContext<'_>,
    env: &StageEnv<'_>,
) -> StageResult {
    let count = 1usize << candidate.control_signals.len();
    Ok((0..count)
        .map(|value| {
            let mut c = candidate.clone();
            c.max_control_signals = 0;
            c.max_operands = env.budget.max_operands_for(c.candidate_type);
            c.control_mapping = control_mapping(&candidate.control_signals, value);
            c
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn nets(ids: &[usize]) -> Vec<NetId> {
        ids.iter().map(|i| NetId(*i)).collect()
    }

    #[test]
    fn test_control_mapping_bit_order() {
        let m = control_mapping(&nets(&[7, 3]), 0b01);
        assert_eq!(m, btreemap! { NetId(7) => true, NetId(3) => false });
    }

    #[test]
    fn test_splits_remove_excess_nets() {
        let bins = btreemap! { 1 => nets(&[1, 2]), 2 => nets(&[3, 4, 5]) };
        let splits = control_input_splits(&(bins, Vec::new()), 2, 5, 2);
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].1, nets(&[3]));
        assert_eq!(splits[0].0[&2], nets(&[4, 5]));
        assert_eq!(splits[2].1, nets(&[5]));
    }

    #[test]
    fn test_splits_respect_depth() {
        let bins = btreemap! { 1 => nets(&[1, 2, 3]), 2 => nets(&[4, 5, 6]), 3 => nets(&[7, 8, 9]) };
        assert!(control_input_splits(&(bins, Vec::new()), 2, 5, 2).is_empty());
    }

    #[test]
    fn test_splits_without_overfull_bins_keep_initial() {
        let bins = btreemap! { 1 => nets(&[1, 2]) };
        let splits = control_input_splits(&(bins.clone(), Vec::new()), 2, 5, 2);
        assert_eq!(splits, vec![(bins, Vec::new())]);
    }
}
