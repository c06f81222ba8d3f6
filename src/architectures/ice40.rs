// SPDX-License-Identifier: Apache-2.0

//! Lattice iCE40: chains of `SB_CARRY` cells linked through `CI`/`CO`.

use std::collections::BTreeSet;

use super::{Detector, dedup_variants, find_carry_chains};
use crate::config::SearchBudget;
use crate::error::ModIdError;
use crate::netlist::connectivity::{
    next_gates, non_constant_fan_in_nets, predecessor_gates, successors,
};
use crate::netlist::{GateId, GateTypeProperty, Netlist};

const CARRY_IN: &str = "CI";
const CARRY_OUT: &str = "CO";

pub struct Ice40;

impl Detector for Ice40 {
    fn name(&self) -> &'static str {
        "ice40"
    }

    fn applies_to(&self, netlist: &Netlist) -> bool {
        netlist.library.types.values().any(|t| {
            t.has_property(GateTypeProperty::Carry)
                && t.has_input_pin(CARRY_IN)
                && t.has_output_pin(CARRY_OUT)
        })
    }

    fn base_chains(&self, netlist: &Netlist) -> Result<Vec<Vec<GateId>>, ModIdError> {
        find_carry_chains(netlist, CARRY_IN, CARRY_OUT)
    }

    fn structural_variants(
        &self,
        netlist: &Netlist,
        base: &[GateId],
        all_bases: &[Vec<GateId>],
        budget: &SearchBudget,
    ) -> Vec<Vec<GateId>> {
        let mut result = Vec::new();
        for chain in chain_variants(netlist, base, all_bases, budget.structural_branch_bound) {
            result.extend(grow(netlist, &chain, base.len(), budget));
        }
        dedup_variants(netlist, result)
    }
}

fn is(nl: &Netlist, g: GateId, p: GateTypeProperty) -> bool {
    nl.has_property(g, p)
}

/// Combinational gates other than carries and constant drivers.
fn is_plain_logic(nl: &Netlist, g: GateId) -> bool {
    is(nl, g, GateTypeProperty::Combinational)
        && !is(nl, g, GateTypeProperty::Carry)
        && !is(nl, g, GateTypeProperty::Ground)
        && !is(nl, g, GateTypeProperty::Power)
}

fn has_outside_successor(nl: &Netlist, g: GateId, chain: &[GateId]) -> bool {
    successors(nl, g).iter().any(|ep| !chain.contains(&ep.gate))
}

/// Suffixes of `chain` starting at gates that look like the start of a
/// separate operation: a constant input followed by a non-constant one, a
/// gate shared with another chain, or the first gate with loads outside the
/// chain.
fn chain_variants(
    nl: &Netlist,
    chain: &[GateId],
    all_bases: &[Vec<GateId>],
    bound: usize,
) -> Vec<Vec<GateId>> {
    let constant_inputs = |g: GateId| {
        crate::netlist::connectivity::fan_in_nets(nl, g)
            .iter()
            .any(|n| nl.is_constant_net(*n))
    };
    let mut starts = BTreeSet::from([0usize]);
    for idx in 1..chain.len() {
        if idx + 1 < chain.len() {
            if constant_inputs(chain[idx]) && !constant_inputs(chain[idx + 1]) {
                starts.insert(idx);
                starts.insert(idx + 1);
            }
            let shared = all_bases
                .iter()
                .filter(|b| b.as_slice() != chain)
                .any(|b| b.contains(&chain[idx]));
            if shared {
                starts.insert(idx + 1);
            }
        }
        if has_outside_successor(nl, chain[idx], chain)
            && !has_outside_successor(nl, chain[idx - 1], chain)
        {
            starts.insert(idx);
        }
    }
    if starts.len() > bound {
        return vec![chain.to_vec()];
    }
    starts.into_iter().map(|idx| chain[idx..].to_vec()).collect()
}

/// Plain logic reachable backwards from `gates`, together with `gates`.
fn with_logic_cone(nl: &Netlist, gates: &[GateId]) -> BTreeSet<GateId> {
    let mut all = BTreeSet::new();
    for g in gates {
        all.insert(*g);
        all.extend(next_gates(nl, *g, false, None, |p| is_plain_logic(nl, p)));
    }
    all
}

fn grow(nl: &Netlist, chain: &[GateId], base_len: usize, budget: &SearchBudget) -> Vec<Vec<GateId>> {
    let bound = budget.structural_branch_bound;
    let mut candidates: Vec<Vec<GateId>> = Vec::new();

    let cone = with_logic_cone(nl, chain);
    if cone.len() <= base_len * budget.predecessor_size_multiplier {
        candidates.push(cone.into_iter().collect());
    }

    let mut starting = chain.to_vec();
    let loads: BTreeSet<GateId> = chain
        .iter()
        .flat_map(|g| successors(nl, *g))
        .map(|ep| ep.gate)
        .filter(|g| is(nl, *g, GateTypeProperty::Combinational) && !is(nl, *g, GateTypeProperty::Carry))
        .collect();
    starting.extend(loads);
    let cone = with_logic_cone(nl, &starting);
    if cone.len() <= base_len * budget.successor_size_multiplier {
        candidates.push(cone.into_iter().collect());
    }

    let (Some(first), Some(last)) = (chain.first().copied(), chain.last().copied()) else {
        return candidates;
    };

    // Each extra load of a carry cell is an alternative extension.
    let mut variants = vec![chain.to_vec()];
    let mut variants_without_last = vec![chain.to_vec()];
    for gate in chain {
        let loads = successors(nl, *gate);
        if *gate != last && loads.len() > bound {
            return candidates;
        }
        let mut next_variants: Vec<Vec<GateId>> = Vec::new();
        let mut next_without_last = Vec::new();
        for ep in loads {
            let load = ep.gate;
            if is(nl, load, GateTypeProperty::Io) {
                log::error!("carry {} drives IO gate {}", nl.gate(*gate).name, nl.gate(load).name);
                continue;
            }
            if is(nl, load, GateTypeProperty::Sequential) || is(nl, load, GateTypeProperty::Carry) {
                continue;
            }
            for v in &variants {
                if v.contains(&load) {
                    continue;
                }
                let mut extended = v.clone();
                extended.push(load);
                next_variants.push(extended);
            }
            if next_variants.len() > bound {
                return candidates;
            }
            next_without_last = if *gate != last {
                next_variants.clone()
            } else {
                variants_without_last.clone()
            };
        }
        if !next_variants.is_empty() {
            variants = next_variants;
            variants_without_last = next_without_last;
        }
    }
    candidates.extend(variants);
    candidates.extend(variants_without_last);

    // Operations often start with a gate that shares the inputs of the
    // first carry instead of being driven by it.
    let first_inputs = non_constant_fan_in_nets(nl, first);
    let mut all_loads: Vec<GateId> = Vec::new();
    let mut reduced: Vec<GateId> = Vec::new();
    let mut more_reduced: Vec<GateId> = Vec::new();
    for net in &first_inputs {
        for ep in &nl.net(*net).destinations {
            let g = ep.gate;
            if all_loads.contains(&g)
                || is(nl, g, GateTypeProperty::Sequential)
                || is(nl, g, GateTypeProperty::Carry)
                || is(nl, g, GateTypeProperty::Io)
                || !is(nl, g, GateTypeProperty::Combinational)
            {
                continue;
            }
            all_loads.push(g);
            let fan_in = non_constant_fan_in_nets(nl, g).len();
            if fan_in >= 4 {
                continue;
            }
            reduced.push(g);
            let and_or = is(nl, g, GateTypeProperty::And) || is(nl, g, GateTypeProperty::Or);
            if fan_in < 3 && !and_or {
                more_reduced.push(g);
            }
        }
    }
    let tier = budget.first_gate_tier_bound;
    let considered = if all_loads.len() <= tier {
        &all_loads
    } else if reduced.len() <= tier {
        &reduced
    } else {
        &more_reduced
    };

    let inverters_before = |g: GateId| -> Vec<GateId> {
        predecessor_gates(nl, g)
            .into_iter()
            .filter(|p| is(nl, *p, GateTypeProperty::Inverter))
            .collect()
    };

    let mut first_gates: BTreeSet<Vec<GateId>> = BTreeSet::new();
    for g in considered {
        let inputs = non_constant_fan_in_nets(nl, *g);
        if !first_inputs.iter().all(|n| inputs.contains(n)) {
            continue;
        }
        first_gates.insert(vec![*g]);
        for inv in inverters_before(*g) {
            first_gates.insert(vec![*g, inv]);
        }
        for other in &reduced {
            if other != g {
                first_gates.insert(vec![*g, *other]);
            }
        }
    }
    if first_gates.is_empty() {
        let carry_inverters = inverters_before(first);
        for g in considered {
            first_gates.insert(vec![*g]);
            for inv in &carry_inverters {
                first_gates.insert(vec![*g, *inv]);
            }
            let loads = successors(nl, *g);
            if loads.len() != 1 {
                continue;
            }
            let load = loads[0].gate;
            if !is(nl, load, GateTypeProperty::Io) && is(nl, load, GateTypeProperty::Combinational) {
                first_gates.insert(vec![*g, load]);
            }
        }
    }
    let mut with_first = Vec::new();
    for c in &candidates {
        for extra in &first_gates {
            let mut gates = c.clone();
            gates.extend(extra.iter().copied());
            with_first.push(gates);
        }
    }
    candidates.extend(with_first);

    // Inverted outputs of subtractions and negations.
    let mut with_inverters = Vec::new();
    for c in &candidates {
        let mut gates = c.clone();
        let mut inverters = 0usize;
        let mut carries = 0usize;
        for g in c {
            if is(nl, *g, GateTypeProperty::Carry) {
                carries += 1;
                continue;
            }
            let invs: BTreeSet<GateId> = successors(nl, *g)
                .into_iter()
                .map(|ep| ep.gate)
                .filter(|s| is(nl, *s, GateTypeProperty::Inverter))
                .collect();
            if invs.len() > budget.max_inverters_per_gate {
                continue;
            }
            inverters += invs.len();
            gates.extend(invs);
        }
        if inverters + 1 >= carries {
            with_inverters.push(gates);
        }
    }
    candidates.extend(with_inverters);

    // Logic feeding the last added gate from the side.
    let mut with_last_inputs = Vec::new();
    for c in &candidates {
        let Some(last_gate) = c.last() else {
            continue;
        };
        for p in predecessor_gates(nl, *last_gate) {
            if is(nl, p, GateTypeProperty::Carry) || !is(nl, p, GateTypeProperty::Combinational) {
                continue;
            }
            let mut gates = c.clone();
            gates.push(p);
            with_last_inputs.push(gates);
        }
    }
    candidates.extend(with_last_inputs);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{build_ice40_counter, build_ice40_ripple_adder};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_adder_chain_is_one_base() {
        let adder = build_ice40_ripple_adder(4);
        let chains = find_carry_chains(&adder.netlist, CARRY_IN, CARRY_OUT).unwrap();
        assert_eq!(chains, vec![adder.carries.clone()]);
    }

    #[test]
    fn test_single_carry_is_not_a_chain() {
        let adder = build_ice40_ripple_adder(1);
        assert!(find_carry_chains(&adder.netlist, CARRY_IN, CARRY_OUT).unwrap().is_empty());
    }

    #[test]
    fn test_variants_contain_full_adder() {
        let adder = build_ice40_ripple_adder(4);
        let mut want = adder.gates();
        want.sort();
        let variants = Ice40.structural_variants(
            &adder.netlist,
            &adder.carries,
            &[adder.carries.clone()],
            &SearchBudget::default(),
        );
        assert!(variants.contains(&want), "{variants:?}");
        assert!(variants.contains(&adder.carries));
        let unique: BTreeSet<&Vec<GateId>> = variants.iter().collect();
        assert_eq!(unique.len(), variants.len());
    }

    #[test]
    fn test_variants_contain_counter_logic() {
        let counter = build_ice40_counter(4);
        let mut want = counter.logic.clone();
        want.sort();
        let carries: Vec<GateId> = counter
            .logic
            .iter()
            .copied()
            .filter(|g| counter.netlist.has_property(*g, GateTypeProperty::Carry))
            .collect();
        let variants = Ice40.structural_variants(
            &counter.netlist,
            &carries,
            &[carries.clone()],
            &SearchBudget::default(),
        );
        assert!(variants.contains(&want));
        assert!(variants.iter().all(|v| v.iter().all(|g| !counter.registers.contains(g))));
    }

    #[test]
    fn test_too_many_start_points_keep_whole_chain() {
        let adder = build_ice40_ripple_adder(4);
        let got = chain_variants(&adder.netlist, &adder.carries, &[adder.carries.clone()], 0);
        assert_eq!(got, vec![adder.carries.clone()]);
    }
}
