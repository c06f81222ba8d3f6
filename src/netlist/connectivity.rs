// SPDX-License-Identifier: Apache-2.0

//! Connectivity queries over a `Netlist`: fan-in/fan-out, neighbor gates,
//! filtered traversal and the boundary nets of a gate set.

use std::collections::{BTreeSet, VecDeque};

use crate::error::ModIdError;
use crate::netlist::{Endpoint, GateId, GateTypeProperty, NetId, Netlist};

/// Fan-in nets of `gate`, ordered by the input pin order of its type.
pub fn fan_in_nets(nl: &Netlist, gate: GateId) -> Vec<NetId> {
    let g = nl.gate(gate);
    match nl.gate_type(gate) {
        Some(t) => t
            .input_pins
            .iter()
            .filter_map(|p| g.fan_in.get(p).copied())
            .collect(),
        None => g.fan_in.values().copied().collect(),
    }
}

/// Fan-in nets of `gate` that are neither ground nor power.
pub fn non_constant_fan_in_nets(nl: &Netlist, gate: GateId) -> Vec<NetId> {
    fan_in_nets(nl, gate)
        .into_iter()
        .filter(|n| !nl.is_constant_net(*n))
        .collect()
}

pub fn fan_out_nets(nl: &Netlist, gate: GateId) -> Vec<NetId> {
    let g = nl.gate(gate);
    match nl.gate_type(gate) {
        Some(t) => t
            .output_pins
            .iter()
            .filter_map(|p| g.fan_out.get(p).copied())
            .collect(),
        None => g.fan_out.values().copied().collect(),
    }
}

pub fn fan_in_net(nl: &Netlist, gate: GateId, pin: &str) -> Option<NetId> {
    nl.gate(gate).fan_in.get(pin).copied()
}

pub fn fan_out_net(nl: &Netlist, gate: GateId, pin: &str) -> Option<NetId> {
    nl.gate(gate).fan_out.get(pin).copied()
}

/// Source endpoints of all fan-in nets.
pub fn predecessors(nl: &Netlist, gate: GateId) -> Vec<Endpoint> {
    fan_in_nets(nl, gate)
        .into_iter()
        .flat_map(|n| nl.net(n).sources.iter().cloned())
        .collect()
}

/// Destination endpoints of all fan-out nets.
pub fn successors(nl: &Netlist, gate: GateId) -> Vec<Endpoint> {
    fan_out_nets(nl, gate)
        .into_iter()
        .flat_map(|n| nl.net(n).destinations.iter().cloned())
        .collect()
}

pub fn predecessor_gates(nl: &Netlist, gate: GateId) -> BTreeSet<GateId> {
    predecessors(nl, gate).into_iter().map(|e| e.gate).collect()
}

pub fn successor_gates(nl: &Netlist, gate: GateId) -> BTreeSet<GateId> {
    successors(nl, gate).into_iter().map(|e| e.gate).collect()
}

fn neighbors(nl: &Netlist, gate: GateId, forward: bool) -> BTreeSet<GateId> {
    if forward {
        successor_gates(nl, gate)
    } else {
        predecessor_gates(nl, gate)
    }
}

/// Collects gates reachable from `start` that satisfy `filter`, walking
/// successors (`forward`) or predecessors. Traversal only continues through
/// matching gates. A `depth` of `None` is unbounded.
pub fn next_gates(
    nl: &Netlist,
    start: GateId,
    forward: bool,
    depth: Option<usize>,
    filter: impl Fn(GateId) -> bool,
) -> BTreeSet<GateId> {
    let mut found = BTreeSet::new();
    let mut worklist: VecDeque<(GateId, usize)> = VecDeque::new();
    worklist.push_back((start, 0));
    while let Some((gate, level)) = worklist.pop_front() {
        if depth.is_some_and(|d| level >= d) {
            continue;
        }
        for next in neighbors(nl, gate, forward) {
            if next == start || found.contains(&next) || !filter(next) {
                continue;
            }
            found.insert(next);
            worklist.push_back((next, level + 1));
        }
    }
    found
}

fn net_neighbors(nl: &Netlist, net: NetId, forward: bool) -> Vec<GateId> {
    let n = nl.net(net);
    let eps = if forward {
        &n.destinations
    } else {
        &n.sources
    };
    eps.iter().map(|e| e.gate).collect()
}

fn gate_nets(nl: &Netlist, gate: GateId, forward: bool) -> Vec<NetId> {
    if forward {
        fan_out_nets(nl, gate)
    } else {
        fan_in_nets(nl, gate)
    }
}

/// Walks from `net` until the first gates satisfying `filter`, passing
/// through any number of non-matching gates.
pub fn next_matching_gates(
    nl: &Netlist,
    net: NetId,
    forward: bool,
    filter: impl Fn(GateId) -> bool,
) -> BTreeSet<GateId> {
    let mut found = BTreeSet::new();
    let mut visited_nets = BTreeSet::new();
    let mut worklist = vec![net];
    while let Some(n) = worklist.pop() {
        if !visited_nets.insert(n) {
            continue;
        }
        for gate in net_neighbors(nl, n, forward) {
            if filter(gate) {
                found.insert(gate);
            } else {
                worklist.extend(gate_nets(nl, gate, forward));
            }
        }
    }
    found
}

/// Walks from `net` through gates satisfying `filter` and collects all of
/// them; traversal stops at the first non-matching gate.
pub fn next_matching_gates_until(
    nl: &Netlist,
    net: NetId,
    forward: bool,
    filter: impl Fn(GateId) -> bool,
) -> BTreeSet<GateId> {
    let mut found = BTreeSet::new();
    let mut visited_nets = BTreeSet::new();
    let mut worklist = vec![net];
    while let Some(n) = worklist.pop() {
        if !visited_nets.insert(n) {
            continue;
        }
        for gate in net_neighbors(nl, n, forward) {
            if filter(gate) && found.insert(gate) {
                worklist.extend(gate_nets(nl, gate, forward));
            }
        }
    }
    found
}

/// Follows a chain of same-typed gates through the given pins, in both
/// directions starting at `start`. A link is followed only if it is
/// unambiguous.
pub fn gate_chain(
    nl: &Netlist,
    start: GateId,
    input_pin: &str,
    output_pin: &str,
) -> Result<Vec<GateId>, ModIdError> {
    let type_name = &nl.gate(start).type_name;
    let gate_type = nl
        .gate_type(start)
        .ok_or_else(|| ModIdError::UnknownGateType(type_name.clone()))?;
    for (pin, present) in [
        (input_pin, gate_type.has_input_pin(input_pin)),
        (output_pin, gate_type.has_output_pin(output_pin)),
    ] {
        if !present {
            return Err(ModIdError::MissingPin {
                gate: gate_type.name.clone(),
                pin: pin.to_string(),
            });
        }
    }

    let mut chain = VecDeque::from([start]);
    let mut members = BTreeSet::from([start]);

    // Backwards via the input pin.
    let mut current = start;
    while let Some(net) = fan_in_net(nl, current, input_pin) {
        let sources = &nl.net(net).sources;
        if sources.len() != 1 {
            break;
        }
        let src = &sources[0];
        if src.pin != output_pin || &nl.gate(src.gate).type_name != type_name {
            break;
        }
        if !members.insert(src.gate) {
            break;
        }
        chain.push_front(src.gate);
        current = src.gate;
    }

    // Forwards via the output pin.
    current = start;
    while let Some(net) = fan_out_net(nl, current, output_pin) {
        let next: Vec<GateId> = nl
            .net(net)
            .destinations
            .iter()
            .filter(|d| d.pin == input_pin && &nl.gate(d.gate).type_name == type_name)
            .map(|d| d.gate)
            .collect();
        if next.len() != 1 || !members.insert(next[0]) {
            break;
        }
        chain.push_back(next[0]);
        current = next[0];
    }

    Ok(chain.into_iter().collect())
}

/// Nets entering `gates` from outside: non-constant fan-in nets that are
/// global inputs, undriven, or driven by a gate outside the set.
pub fn input_nets(nl: &Netlist, gates: &[GateId]) -> Vec<NetId> {
    let members: BTreeSet<GateId> = gates.iter().copied().collect();
    let mut result = BTreeSet::new();
    for g in gates {
        for n in fan_in_nets(nl, *g) {
            if nl.is_constant_net(n) {
                continue;
            }
            let net = nl.net(n);
            if net.is_global_input || net.sources.is_empty() {
                result.insert(n);
                continue;
            }
            if net.sources.len() > 1 {
                log::warn!(
                    "net {} ({}) has multiple drivers, ignoring it as an input",
                    net.name,
                    n.0
                );
                continue;
            }
            if net.sources.iter().any(|s| !members.contains(&s.gate)) {
                result.insert(n);
            }
        }
    }
    result.into_iter().collect()
}

/// Nets leaving `gates`. Global outputs always qualify. With
/// `only_external` a net qualifies if it has destinations and none of them
/// is inside the set; otherwise a single outside destination suffices.
pub fn output_nets(nl: &Netlist, gates: &[GateId], only_external: bool) -> Vec<NetId> {
    let members: BTreeSet<GateId> = gates.iter().copied().collect();
    let mut result = BTreeSet::new();
    for g in gates {
        for n in fan_out_nets(nl, *g) {
            let net = nl.net(n);
            let is_output = if net.is_global_output {
                true
            } else if only_external {
                !net.destinations.is_empty()
                    && net.destinations.iter().all(|d| !members.contains(&d.gate))
            } else {
                net.destinations.iter().any(|d| !members.contains(&d.gate))
            };
            if is_output {
                result.insert(n);
            }
        }
    }
    result.into_iter().collect()
}

/// Indices of the register groups in `registers` that drive `net` through
/// combinational logic.
pub fn neighboring_registers(
    nl: &Netlist,
    net: NetId,
    registers: &[Vec<GateId>],
) -> BTreeSet<usize> {
    let sequential = next_matching_gates(nl, net, false, |g| {
        nl.has_property(g, GateTypeProperty::Sequential)
    });
    let mut result = BTreeSet::new();
    for s in sequential {
        if let Some(idx) = registers.iter().position(|r| r.contains(&s)) {
            result.insert(idx);
        }
    }
    result
}

pub fn neighboring_registers_of(
    nl: &Netlist,
    nets: &[NetId],
    registers: &[Vec<GateId>],
) -> BTreeSet<usize> {
    nets.iter()
        .flat_map(|n| neighboring_registers(nl, *n, registers))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_ice40_ripple_adder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_gate_chain_walks_both_directions() {
        let adder = build_ice40_ripple_adder(4);
        let middle = adder.carries[1];
        let chain = gate_chain(&adder.netlist, middle, "CI", "CO").unwrap();
        assert_eq!(chain, adder.carries);
    }

    #[test]
    fn test_gate_chain_reports_missing_pin() {
        let adder = build_ice40_ripple_adder(2);
        let err = gate_chain(&adder.netlist, adder.carries[0], "CIN", "CO").unwrap_err();
        assert!(matches!(err, ModIdError::MissingPin { .. }));
    }

    #[test]
    fn test_input_and_output_nets_of_adder() {
        let adder = build_ice40_ripple_adder(4);
        let mut gates = adder.carries.clone();
        gates.extend(adder.luts.iter().copied());
        let mut want_inputs: Vec<NetId> = adder.a.iter().chain(adder.b.iter()).copied().collect();
        want_inputs.sort();
        assert_eq!(input_nets(&adder.netlist, &gates), want_inputs);
        assert_eq!(output_nets(&adder.netlist, &gates, true), adder.sum);
        assert_eq!(output_nets(&adder.netlist, &gates, false), adder.sum);
    }

    #[test]
    fn test_next_gates_stops_at_filtered_gates() {
        let adder = build_ice40_ripple_adder(3);
        let nl = &adder.netlist;
        let last_lut = *adder.luts.last().unwrap();
        let luts_and_carries = next_gates(nl, last_lut, false, None, |g| {
            nl.has_property(g, GateTypeProperty::Combinational)
        });
        assert!(luts_and_carries.contains(&adder.carries[0]));
        let depth_one = next_gates(nl, last_lut, false, Some(1), |g| {
            nl.has_property(g, GateTypeProperty::Combinational)
        });
        // The top carry has no loads; the last LUT reads the one below it.
        assert_eq!(depth_one, BTreeSet::from([adder.carries[1]]));
    }
}
