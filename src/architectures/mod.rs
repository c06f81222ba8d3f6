// SPDX-License-Identifier: Apache-2.0

//! Architecture specific detection of arithmetic primitives and growth of
//! structural candidates around them.

pub mod ice40;
pub mod xilinx;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::candidates::BaseCandidate;
use crate::config::{Configuration, SearchBudget};
use crate::error::ModIdError;
use crate::netlist::connectivity::gate_chain;
use crate::netlist::{GateId, GateTypeProperty, Netlist};

pub trait Detector {
    fn name(&self) -> &'static str;

    /// Whether the netlist's gate library contains this architecture's
    /// primitives.
    fn applies_to(&self, netlist: &Netlist) -> bool;

    /// Maximal chains of the primitive, gates in chain order.
    fn base_chains(&self, netlist: &Netlist) -> Result<Vec<Vec<GateId>>, ModIdError>;

    /// Gate sets grown around `base`. `all_bases` holds every chain of the
    /// netlist, including `base`.
    fn structural_variants(
        &self,
        netlist: &Netlist,
        base: &[GateId],
        all_bases: &[Vec<GateId>],
        budget: &SearchBudget,
    ) -> Vec<Vec<GateId>>;
}

/// A base candidate with the gate sets of its structural candidates.
#[derive(Debug, Clone)]
pub struct BaseFamily {
    pub base: Arc<BaseCandidate>,
    pub structural: Vec<Vec<GateId>>,
}

pub fn detectors() -> Vec<Box<dyn Detector + Send + Sync>> {
    vec![Box::new(ice40::Ice40), Box::new(xilinx::XilinxUnisim)]
}

fn gate_set(gates: &[GateId]) -> BTreeSet<GateId> {
    gates.iter().copied().collect()
}

/// Whether a chain may be searched: it is not blocked, and none of its gates
/// was classified before.
fn is_allowed(chain: &[GateId], config: &Configuration) -> bool {
    let set = gate_set(chain);
    if config
        .blocked_base_candidates
        .iter()
        .any(|blocked| gate_set(blocked) == set)
    {
        return false;
    }
    !config
        .already_classified_candidates
        .iter()
        .any(|done| done.iter().any(|g| set.contains(g)))
}

/// Maximal chains of at least two carry cells linked from `carry_out` to
/// `carry_in`. Only carry types with both pins are considered. Chains
/// contained in another chain are dropped.
pub(crate) fn find_carry_chains(
    nl: &Netlist,
    carry_in: &str,
    carry_out: &str,
) -> Result<Vec<Vec<GateId>>, ModIdError> {
    let mut remaining: BTreeSet<GateId> = nl
        .gate_ids()
        .filter(|g| {
            nl.gate_type(*g).is_some_and(|t| {
                t.has_property(GateTypeProperty::Carry)
                    && t.has_input_pin(carry_in)
                    && t.has_output_pin(carry_out)
            })
        })
        .collect();
    let mut chains = Vec::new();
    while let Some(start) = remaining.first().copied() {
        let chain = gate_chain(nl, start, carry_in, carry_out)?;
        remaining.remove(&start);
        for g in &chain {
            remaining.remove(g);
        }
        if chain.len() >= 2 {
            chains.push(chain);
        }
    }

    let sets: Vec<BTreeSet<GateId>> = chains.iter().map(|c| c.iter().copied().collect()).collect();
    let maximal = chains
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            !sets
                .iter()
                .enumerate()
                .any(|(j, other)| *i != j && sets[*i].is_subset(other))
        })
        .map(|(_, c)| c.clone())
        .collect();
    Ok(maximal)
}

/// Drops constant drivers and returns each distinct gate set once, gates
/// sorted.
pub(crate) fn dedup_variants(nl: &Netlist, candidates: Vec<Vec<GateId>>) -> Vec<Vec<GateId>> {
    let total = candidates.len();
    let mut seen: BTreeSet<BTreeSet<GateId>> = BTreeSet::new();
    let mut result = Vec::new();
    for c in candidates {
        let set: BTreeSet<GateId> = c
            .into_iter()
            .filter(|g| !nl.is_gnd_gate(*g) && !nl.is_vcc_gate(*g))
            .collect();
        if set.is_empty() || !seen.insert(set.clone()) {
            continue;
        }
        result.push(set.into_iter().collect());
    }
    log::debug!("remaining {}/{} after duplicate removal", result.len(), total);
    result
}

/// Runs every applicable detector and grows the structural candidates of
/// each surviving base candidate. Base candidates are numbered in detection
/// order.
pub fn generate_structural_candidates(
    netlist: &Netlist,
    config: &Configuration,
) -> Result<Vec<BaseFamily>, ModIdError> {
    let mut families = Vec::new();
    for detector in detectors() {
        if !detector.applies_to(netlist) {
            continue;
        }
        let mut seen: BTreeSet<BTreeSet<GateId>> = BTreeSet::new();
        let mut chains = Vec::new();
        for chain in detector.base_chains(netlist)? {
            if seen.insert(gate_set(&chain)) {
                chains.push(chain);
            }
        }
        let found = chains.len();
        let allowed: Vec<Vec<GateId>> = chains
            .iter()
            .filter(|c| is_allowed(c, config))
            .cloned()
            .collect();
        log::info!(
            "{}: left with {} / {} base candidates",
            detector.name(),
            allowed.len(),
            found
        );

        for chain in &allowed {
            let structural =
                detector.structural_variants(netlist, chain, &chains, &config.budget);
            let base = Arc::new(BaseCandidate {
                id: families.len(),
                gates: chain.clone(),
            });
            log::debug!(
                "base candidate {} with {} gates: {} structural candidates",
                base.id,
                base.gates.len(),
                structural.len()
            );
            families.push(BaseFamily { base, structural });
        }
    }
    Ok(families)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_ice40_ripple_adder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blocked_and_classified_chains_are_skipped() {
        let adder = build_ice40_ripple_adder(4);
        let families = generate_structural_candidates(&adder.netlist, &Configuration::default()).unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].base.gates, adder.carries);

        let mut blocked = adder.carries.clone();
        blocked.reverse();
        let config = Configuration {
            blocked_base_candidates: vec![blocked],
            ..Configuration::default()
        };
        assert!(generate_structural_candidates(&adder.netlist, &config).unwrap().is_empty());

        let config = Configuration {
            already_classified_candidates: vec![vec![adder.carries[2], adder.luts[0]]],
            ..Configuration::default()
        };
        assert!(generate_structural_candidates(&adder.netlist, &config).unwrap().is_empty());
    }
}
