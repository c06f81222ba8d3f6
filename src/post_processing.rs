// SPDX-License-Identifier: Apache-2.0

//! Selection of one explanation per base candidate.
//!
//! The verified candidates of a base candidate are grouped into sets that
//! share gates and control signals. The best set is chosen by a fixed
//! sequence of criteria, each of which keeps only the sets that score best
//! on it. Within the winning set one candidate per control assignment is
//! kept and the survivors are merged into a single multi-assignment
//! candidate.

use std::collections::{BTreeMap, BTreeSet};

use crate::candidates::{BaseCandidate, CandidateType, CtrlMapping, VerifiedCandidate};
use crate::netlist::{GateId, NetId, Netlist, connectivity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Goal {
    Min,
    Max,
}

/// Keeps the items that score best on `criterion`, in their original order.
fn keep_best<T>(items: Vec<T>, goal: Goal, criterion: impl Fn(&T) -> usize) -> Vec<T> {
    let scores: Vec<usize> = items.iter().map(&criterion).collect();
    let best = match goal {
        Goal::Min => scores.iter().min().copied(),
        Goal::Max => scores.iter().max().copied(),
    };
    let Some(best) = best else {
        return items;
    };
    items
        .into_iter()
        .zip(scores)
        .filter(|(_, s)| *s == best)
        .map(|(item, _)| item)
        .collect()
}

fn non_constant_operand_nets(netlist: &Netlist, c: &VerifiedCandidate) -> BTreeSet<NetId> {
    c.operands
        .iter()
        .flatten()
        .copied()
        .filter(|n| !netlist.is_constant_net(*n))
        .collect()
}

fn constant_operand_bits(netlist: &Netlist, c: &VerifiedCandidate) -> usize {
    c.operands
        .iter()
        .flatten()
        .filter(|n| netlist.is_constant_net(**n))
        .count()
}

/// Inputs of the candidate's gates that are neither operand bits nor
/// control signals.
fn unexplained_inputs(netlist: &Netlist, c: &VerifiedCandidate) -> usize {
    let mut covered = non_constant_operand_nets(netlist, c);
    covered.extend(c.control_signals.iter().copied());
    connectivity::input_nets(netlist, &c.gates)
        .iter()
        .filter(|n| !covered.contains(n))
        .count()
}

fn io_signals(netlist: &Netlist, c: &VerifiedCandidate) -> usize {
    let mut nets = non_constant_operand_nets(netlist, c);
    nets.extend(c.output_nets.iter().copied());
    nets.len()
}

fn unexplained_outputs(netlist: &Netlist, c: &VerifiedCandidate) -> usize {
    connectivity::output_nets(netlist, &c.gates, false)
        .len()
        .saturating_sub(c.output_nets.len())
}

/// Register groups feeding both an operand and a control signal.
fn shared_source_registers(netlist: &Netlist, c: &VerifiedCandidate, registers: &[Vec<GateId>]) -> usize {
    let operand_nets: Vec<NetId> = c.operands.iter().flatten().copied().collect();
    let op_regs = connectivity::neighboring_registers_of(netlist, &operand_nets, registers);
    let ctrl_regs = connectivity::neighboring_registers_of(netlist, &c.control_signals, registers);
    op_regs.intersection(&ctrl_regs).count()
}

/// Sum over operands of the register groups feeding each operand.
fn operand_source_registers(netlist: &Netlist, c: &VerifiedCandidate, registers: &[Vec<GateId>]) -> usize {
    c.operands
        .iter()
        .map(|op| connectivity::neighboring_registers_of(netlist, op, registers).len())
        .sum()
}

/// Nets that appear in more than one operand.
fn multi_operand_nets(c: &VerifiedCandidate) -> usize {
    let mut owners: BTreeMap<NetId, BTreeSet<usize>> = BTreeMap::new();
    for (idx, op) in c.operands.iter().enumerate() {
        for n in op {
            owners.entry(*n).or_default().insert(idx);
        }
    }
    owners.values().filter(|o| o.len() > 1).count()
}

fn type_priority(c: &VerifiedCandidate) -> usize {
    c.types
        .iter()
        .map(|t| t.priority() as usize)
        .min()
        .unwrap_or(CandidateType::None.priority() as usize)
}

/// Largest score of any member of the set.
fn set_max(set: &[VerifiedCandidate], f: impl Fn(&VerifiedCandidate) -> usize) -> usize {
    set.iter().map(f).max().unwrap_or(0)
}

/// Drops constant multiplications whose outputs are already explained by a
/// counter. A counter `x + 1` can also be written as a shifted sum.
fn drop_redundant_constant_multiplications(sets: Vec<Vec<VerifiedCandidate>>) -> Vec<Vec<VerifiedCandidate>> {
    let counter_outputs: BTreeSet<Vec<NetId>> = sets
        .iter()
        .filter(|s| s[0].types.contains(&CandidateType::Counter))
        .map(|s| s[0].output_nets.clone())
        .collect();
    sets.into_iter()
        .filter(|s| {
            let redundant = s[0].types.contains(&CandidateType::ConstantMultiplication)
                && counter_outputs.contains(&s[0].output_nets);
            if redundant {
                log::debug!("dropping constant multiplication explained by a counter");
            }
            !redundant
        })
        .collect()
}

fn select_best_set(
    netlist: &Netlist,
    candidates: Vec<VerifiedCandidate>,
    registers: &[Vec<GateId>],
) -> Vec<VerifiedCandidate> {
    let mut grouped: BTreeMap<(Vec<GateId>, Vec<NetId>), Vec<VerifiedCandidate>> = BTreeMap::new();
    for c in candidates {
        let mut gates = c.gates.clone();
        gates.sort();
        grouped.entry((gates, c.control_signals.clone())).or_default().push(c);
    }
    let mut sets: Vec<Vec<VerifiedCandidate>> = grouped.into_values().collect();
    log::debug!("sorted candidates into {} candidate sets", sets.len());

    sets = drop_redundant_constant_multiplications(sets);
    sets = keep_best(sets, Goal::Max, |s| usize::from(s.iter().all(|c| c.verified)));
    sets = keep_best(sets, Goal::Max, |s| set_max(s, |c| io_signals(netlist, c)));
    sets = keep_best(sets, Goal::Min, |s| set_max(s, |c| unexplained_inputs(netlist, c)));
    sets = keep_best(sets, Goal::Min, |s| s[0].control_signals.len());
    sets = keep_best(sets, Goal::Min, |s| set_max(s, |c| unexplained_outputs(netlist, c)));
    sets = keep_best(sets, Goal::Max, |s| s[0].gates.len());
    sets = keep_best(sets, Goal::Min, |s| {
        s.iter().map(|c| shared_source_registers(netlist, c, registers)).sum()
    });
    sets = keep_best(sets, Goal::Max, |s| s.len());
    sets = keep_best(sets, Goal::Min, |s| set_max(s, |c| constant_operand_bits(netlist, c)));
    sets = keep_best(sets, Goal::Min, |s| s.iter().map(type_priority).min().unwrap_or(usize::MAX));

    if sets.len() > 1 {
        log::debug!("found {} equally ranked candidate sets, keeping the first", sets.len());
    }
    sets.into_iter().next().unwrap_or_default()
}

/// Among signed comparisons, picks the one whose sign-extended operand bit
/// reaches most of the gates shared between operand cones.
fn best_signed_comparison(netlist: &Netlist, candidates: &[VerifiedCandidate]) -> usize {
    let Some(first) = candidates.first() else {
        return 0;
    };
    let members: BTreeSet<GateId> = first.gates.iter().copied().collect();
    let mut reach: BTreeMap<NetId, BTreeSet<GateId>> = BTreeMap::new();
    let mut counter: BTreeMap<GateId, usize> = BTreeMap::new();
    for net in non_constant_operand_nets(netlist, first) {
        let reached = connectivity::next_matching_gates_until(netlist, net, true, |g| members.contains(&g));
        for g in &reached {
            *counter.entry(*g).or_default() += 1;
        }
        reach.insert(net, reached);
    }
    let core: BTreeSet<GateId> = counter
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(g, _)| g)
        .collect();

    let mut best = 0;
    let mut most_reached = 0;
    for (idx, c) in candidates.iter().enumerate() {
        let sign = c.operands.iter().find_map(|op| {
            let len = op.len();
            if len >= 2 && op[len - 1] == op[len - 2] {
                Some(op[len - 1])
            } else {
                None
            }
        });
        let Some(sign) = sign else {
            continue;
        };
        let reached = reach.get(&sign).map_or(0, |r| r.intersection(&core).count());
        if reached > most_reached {
            most_reached = reached;
            best = idx;
        }
    }
    best
}

/// Picks one candidate among those explaining the same control assignment.
fn select_best_candidate(
    netlist: &Netlist,
    candidates: Vec<VerifiedCandidate>,
    registers: &[Vec<GateId>],
) -> Option<VerifiedCandidate> {
    let mut best = candidates;
    best = keep_best(best, Goal::Min, |c| unexplained_outputs(netlist, c));
    best = keep_best(best, Goal::Max, |c| non_constant_operand_nets(netlist, c).len());
    best = keep_best(best, Goal::Min, |c| constant_operand_bits(netlist, c));
    best = keep_best(best, Goal::Min, multi_operand_nets);
    best = keep_best(best, Goal::Min, |c| operand_source_registers(netlist, c, registers));

    let signed = |c: &VerifiedCandidate| {
        matches!(
            c.primary_type(),
            CandidateType::SignedLessEqual | CandidateType::SignedLessThan
        )
    };
    let (signed_cmps, mut rest): (Vec<_>, Vec<_>) = best.into_iter().partition(signed);
    if !signed_cmps.is_empty() {
        let idx = best_signed_comparison(netlist, &signed_cmps);
        rest.extend(signed_cmps.into_iter().nth(idx));
    }

    rest = keep_best(rest, Goal::Min, type_priority);
    rest.into_iter().next()
}

/// Recovers the unshifted operand from the shifted copies of a constant
/// multiplication: every net gets one consensus bit index across all copies.
pub fn reconstruct_shifted_operand(netlist: &Netlist, operands: &[Vec<NetId>]) -> Option<Vec<NetId>> {
    // net -> (operand index -> first bit index)
    let mut indices: BTreeMap<NetId, BTreeMap<usize, i64>> = BTreeMap::new();
    for (op_idx, op) in operands.iter().enumerate() {
        for (bit, net) in op.iter().enumerate() {
            if netlist.is_constant_net(*net) {
                continue;
            }
            indices.entry(*net).or_default().entry(op_idx).or_insert(bit as i64);
        }
    }
    let baseline = indices.values().flat_map(|m| m.keys()).min().copied()?;

    // shift[o]: bit index in operand o plus shift[o] is the baseline index.
    let mut shift: BTreeMap<usize, i64> = BTreeMap::from([(baseline, 0)]);
    let mut changed = true;
    while changed {
        changed = false;
        for (net, positions) in &indices {
            let Some((known, known_idx)) = positions.iter().find(|(o, _)| shift.contains_key(*o)) else {
                continue;
            };
            let consensus = known_idx + shift[known];
            for (o, idx) in positions {
                match shift.get(o) {
                    Some(s) if idx + s != consensus => {
                        log::error!(
                            "failed to reconstruct shifted operand: inconsistent offset for net {} with ID {}",
                            netlist.net(*net).name,
                            net.0
                        );
                        return None;
                    }
                    Some(_) => {}
                    None => {
                        shift.insert(*o, consensus - idx);
                        changed = true;
                    }
                }
            }
        }
    }

    let mut ordered = Vec::with_capacity(indices.len());
    for (net, positions) in &indices {
        let Some((o, idx)) = positions.iter().find(|(o, _)| shift.contains_key(*o)) else {
            log::error!(
                "failed to reconstruct shifted operand: no offset for net {} with ID {}",
                netlist.net(*net).name,
                net.0
            );
            return None;
        };
        ordered.push((idx + shift[o], *net));
    }
    ordered.sort();
    Some(ordered.into_iter().map(|(_, n)| n).collect())
}

fn reconstruct_operands(netlist: &Netlist, c: &mut VerifiedCandidate) {
    if c.types.len() != 1 || !c.types.contains(&CandidateType::ConstantMultiplication) {
        return;
    }
    if let Some(op) = reconstruct_shifted_operand(netlist, &c.operands) {
        c.operands = vec![op];
    }
}

type OrderKey<'a> = (
    &'a Vec<GateId>,
    &'a Vec<NetId>,
    &'a Vec<CtrlMapping>,
    &'a BTreeSet<CandidateType>,
    &'a Vec<Vec<NetId>>,
    &'a Vec<NetId>,
);

fn order_key(c: &VerifiedCandidate) -> OrderKey<'_> {
    (
        &c.gates,
        &c.control_signals,
        &c.control_mappings,
        &c.types,
        &c.operands,
        &c.output_nets,
    )
}

/// Reduces the verified candidates of `base` to a single candidate. Without
/// any verified candidate the result is an unverified placeholder owning the
/// base gates.
pub fn post_process(
    netlist: &Netlist,
    base: &BaseCandidate,
    candidates: &[VerifiedCandidate],
    registers: &[Vec<GateId>],
) -> VerifiedCandidate {
    log::info!(
        "processing base candidate {} with {} verified variants",
        base.id,
        candidates.len()
    );
    if candidates.is_empty() {
        return VerifiedCandidate::unverified(base.gates.clone());
    }

    let mut unique: Vec<VerifiedCandidate> = Vec::new();
    for c in candidates {
        if !unique.contains(c) {
            unique.push(c.clone());
        }
    }
    // Worker threads publish in any order.
    unique.sort_by(|x, y| order_key(x).cmp(&order_key(y)));
    log::debug!("{} unique verified variants", unique.len());

    let best_set = select_best_set(netlist, unique, registers);
    log::debug!("selected candidate set of {} candidates", best_set.len());

    let mut by_mapping: BTreeMap<CtrlMapping, Vec<VerifiedCandidate>> = BTreeMap::new();
    let mut selected = Vec::new();
    for c in best_set {
        if c.control_mappings.len() == 1 {
            by_mapping.entry(c.control_mappings[0].clone()).or_default().push(c);
        } else {
            selected.push(c);
        }
    }
    for (_, group) in by_mapping {
        if let Some(mut c) = select_best_candidate(netlist, group, registers) {
            reconstruct_operands(netlist, &mut c);
            selected.push(c);
        }
    }

    let mut result = match VerifiedCandidate::merge(netlist, &selected) {
        Ok(merged) => merged,
        Err(e) => {
            log::warn!("base candidate {}: {}", base.id, e);
            match selected.into_iter().next() {
                Some(c) => c,
                None => return VerifiedCandidate::unverified(base.gates.clone()),
            }
        }
    };
    result.base_gates = base.gates.clone();
    log::debug!("{}", result.info(netlist));
    result
}
