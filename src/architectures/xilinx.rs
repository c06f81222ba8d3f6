// SPDX-License-Identifier: Apache-2.0

//! Xilinx UNISIM: chains of `CARRY4` cells linked through `CI`/`CO(3)`.
//!
//! The operand logic of a `CARRY4` sits in front of its `S(i)` and `DI(i)`
//! pins, so most variants add the drivers of a selection of those pins.

use std::collections::BTreeSet;

use super::{Detector, dedup_variants, find_carry_chains};
use crate::config::SearchBudget;
use crate::error::ModIdError;
use crate::netlist::connectivity::{fan_in_net, next_gates, non_constant_fan_in_nets, predecessor_gates};
use crate::netlist::{GateId, GateTypeProperty, Netlist};

const CARRY_IN: &str = "CI";
const CARRY_OUT: &str = "CO(3)";

const SELECT_PINS: [&str; 4] = ["S(0)", "S(1)", "S(2)", "S(3)"];
const DATA_PINS: [&str; 4] = ["DI(0)", "DI(1)", "DI(2)", "DI(3)"];

pub struct XilinxUnisim;

impl Detector for XilinxUnisim {
    fn name(&self) -> &'static str {
        "xilinx_unisim"
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
        _all_bases: &[Vec<GateId>],
        budget: &SearchBudget,
    ) -> Vec<Vec<GateId>> {
        dedup_variants(netlist, grow(netlist, base, budget))
    }
}

fn is(nl: &Netlist, g: GateId, p: GateTypeProperty) -> bool {
    nl.has_property(g, p)
}

/// Combinational gates that may join a candidate in front of the chain.
fn is_operand_logic(nl: &Netlist, g: GateId) -> bool {
    !nl.is_gnd_gate(g)
        && !nl.is_vcc_gate(g)
        && is(nl, g, GateTypeProperty::Combinational)
        && !is(nl, g, GateTypeProperty::Io)
        && !is(nl, g, GateTypeProperty::Carry)
        && !is(nl, g, GateTypeProperty::Sequential)
}

/// `chain` plus the operand logic driving the named pins of its cells.
fn with_pin_drivers(nl: &Netlist, chain: &[GateId], pins: &[&str]) -> Vec<GateId> {
    let mut gates = chain.to_vec();
    for cell in chain {
        for pin in pins {
            let Some(net) = fan_in_net(nl, *cell, pin) else {
                continue;
            };
            for src in &nl.net(net).sources {
                if is(nl, src.gate, GateTypeProperty::Io) {
                    log::error!(
                        "carry {} pin {} driven by IO gate {}",
                        nl.gate(*cell).name,
                        pin,
                        nl.gate(src.gate).name
                    );
                    continue;
                }
                if is_operand_logic(nl, src.gate) && !gates.contains(&src.gate) {
                    gates.push(src.gate);
                }
            }
        }
    }
    gates
}

/// Predecessors of the non-carry gates of `gates` accepted by `filter`,
/// appended to `gates`.
fn with_layer(nl: &Netlist, gates: &[GateId], filter: impl Fn(GateId) -> bool) -> Vec<GateId> {
    let layer: BTreeSet<GateId> = gates
        .iter()
        .filter(|g| !is(nl, **g, GateTypeProperty::Carry))
        .flat_map(|g| predecessor_gates(nl, *g))
        .filter(|p| filter(*p))
        .collect();
    let mut result = gates.to_vec();
    result.extend(layer.into_iter().filter(|g| !gates.contains(g)));
    result
}

/// Single-input helpers (inverters and one-input LUTs) sitting next to the
/// first carry cell on one of its inputs.
fn first_cell_neighbors(nl: &Netlist, first: GateId) -> Vec<GateId> {
    let mut found = Vec::new();
    for net in non_constant_fan_in_nets(nl, first) {
        for dst in &nl.net(net).destinations {
            let g = dst.gate;
            if g == first || found.contains(&g) {
                continue;
            }
            let single_input_lut = is(nl, g, GateTypeProperty::Lut)
                && nl.gate(g).functions.len() == 1
                && nl
                    .gate(g)
                    .functions
                    .values()
                    .all(|f| f.referenced_pins().len() == 1);
            if is(nl, g, GateTypeProperty::Inverter) || single_input_lut {
                found.push(g);
            }
        }
    }
    found
}

fn grow(nl: &Netlist, chain: &[GateId], budget: &SearchBudget) -> Vec<Vec<GateId>> {
    let Some(first) = chain.first().copied() else {
        return Vec::new();
    };
    let mut candidates: Vec<Vec<GateId>> = Vec::new();

    // Everything combinational behind the chain, up to sequential gates.
    let mut cone: BTreeSet<GateId> = chain.iter().copied().collect();
    for cell in chain {
        cone.extend(next_gates(nl, *cell, false, None, |g| {
            is(nl, g, GateTypeProperty::Combinational)
                && !is(nl, g, GateTypeProperty::Io)
                && !nl.is_gnd_gate(g)
                && !nl.is_vcc_gate(g)
        }));
    }
    if cone.len() < chain.len() * budget.cone_size_multiplier {
        candidates.push(cone.into_iter().collect());
    } else {
        log::debug!("cone of {} gates is too big", cone.len());
    }

    candidates.push(chain.to_vec());

    let mut all_preds = chain.to_vec();
    for cell in chain {
        for p in predecessor_gates(nl, *cell) {
            if is_operand_logic(nl, p) && !all_preds.contains(&p) {
                all_preds.push(p);
            }
        }
    }
    candidates.push(all_preds);

    let mut select_and_first_data: Vec<&str> = SELECT_PINS.to_vec();
    select_and_first_data.push(DATA_PINS[0]);
    let mut select_and_data: Vec<&str> = SELECT_PINS.to_vec();
    select_and_data.extend(DATA_PINS);
    candidates.push(with_pin_drivers(nl, chain, &select_and_first_data));
    candidates.push(with_pin_drivers(nl, chain, &select_and_data));
    candidates.push(with_pin_drivers(nl, chain, &SELECT_PINS));

    let layered: Vec<Vec<GateId>> = candidates
        .iter()
        .map(|c| with_layer(nl, c, |p| is_operand_logic(nl, p)))
        .collect();
    candidates.extend(layered);

    let inverted: Vec<Vec<GateId>> = candidates
        .iter()
        .map(|c| with_layer(nl, c, |p| is(nl, p, GateTypeProperty::Inverter)))
        .collect();
    candidates.extend(inverted);

    let neighbors = first_cell_neighbors(nl, first);
    let mut with_neighbor = Vec::new();
    for c in &candidates {
        for n in &neighbors {
            let mut gates = c.clone();
            gates.push(*n);
            with_neighbor.push(gates);
        }
    }
    candidates.extend(with_neighbor);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_xilinx_adder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_carry4_chain_is_one_base() {
        let adder = build_xilinx_adder(8);
        assert!(XilinxUnisim.applies_to(&adder.netlist));
        let chains = XilinxUnisim.base_chains(&adder.netlist).unwrap();
        assert_eq!(chains, vec![adder.carries.clone()]);
    }

    #[test]
    fn test_ice40_does_not_claim_carry4() {
        let adder = build_xilinx_adder(8);
        assert!(!super::super::ice40::Ice40.applies_to(&adder.netlist));
    }

    #[test]
    fn test_select_pin_drivers_form_the_adder() {
        let adder = build_xilinx_adder(8);
        let selected = with_pin_drivers(&adder.netlist, &adder.carries, &SELECT_PINS);
        let got: BTreeSet<GateId> = selected.into_iter().collect();
        let want: BTreeSet<GateId> = adder.gates().into_iter().collect();
        assert_eq!(got, want);

        let variants = XilinxUnisim.structural_variants(
            &adder.netlist,
            &adder.carries,
            &[adder.carries.clone()],
            &SearchBudget::default(),
        );
        let mut sorted = adder.gates();
        sorted.sort();
        assert!(variants.contains(&sorted), "{variants:?}");
        assert!(variants.contains(&adder.carries));
    }

    #[test]
    fn test_data_pin_drivers_are_a_separate_variant() {
        let adder = build_xilinx_adder(8);
        let selected = with_pin_drivers(&adder.netlist, &adder.carries, &DATA_PINS[..1]);
        assert_eq!(selected, adder.carries);
    }
}
