// SPDX-License-Identifier: Apache-2.0

//! The outcome of an identification run and its materialization as
//! netlist modules.

use std::collections::{BTreeMap, BTreeSet};

use crate::candidates::{BaseCandidate, CtrlMapping, VerifiedCandidate};
use crate::error::ModIdError;
use crate::netlist::{Endpoint, GateId, ModuleId, NetId, Netlist, PinDirection, TOP_MODULE, connectivity};
use crate::stats::RunStats;

/// Pin group names of operands, in operand order.
pub const OPERAND_NAMES: [&str; 21] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "J", "K", "L", "M", "N", "P", "Q", "R", "S", "T", "U", "V", "W",
];

pub const VERIFIED_CANDIDATE_ID_KEY: &str = "VERIFIED_CANDIDATE_ID";
pub const VERIFIED_TYPES_KEY: &str = "VERIFIED_TYPES";
pub const CTRL_MAPPINGS_KEY: &str = "CTRL_MAPPINGS";
pub const OPERATIONS_KEY: &str = "OPERATIONS";
pub const OPERATIONS_HR_KEY: &str = "OPERATIONS_HR";
pub const OPERATIONS_JSON_KEY: &str = "OPERATIONS_JSON";

/// One selected candidate per base candidate.
#[derive(Debug, Clone, Default)]
pub struct IdentificationResult {
    pub pairs: Vec<(BaseCandidate, VerifiedCandidate)>,
    pub stats: RunStats,
}

/// Packs a control assignment into an integer, first net in the MSB.
fn ctrl_value(mapping: &CtrlMapping) -> u64 {
    mapping
        .values()
        .fold(0, |acc, bit| (acc << 1) | u64::from(*bit))
}

fn owned_gates_mut(vc: &mut VerifiedCandidate) -> &mut Vec<GateId> {
    if vc.verified {
        &mut vc.gates
    } else {
        &mut vc.base_gates
    }
}

/// Gate to indices of the candidates that own it.
fn gate_owners(candidates: &[(BaseCandidate, VerifiedCandidate)]) -> BTreeMap<GateId, Vec<usize>> {
    let mut owners: BTreeMap<GateId, Vec<usize>> = BTreeMap::new();
    for (idx, (_, vc)) in candidates.iter().enumerate() {
        for g in vc.owned_gates() {
            owners.entry(*g).or_default().push(idx);
        }
    }
    owners
}

/// Picks a (gate, candidate) conflict whose candidate has no conflict on a
/// successor of the gate, so clones are made from the outputs backwards.
fn next_conflict(netlist: &Netlist, conflicts: &BTreeMap<GateId, Vec<usize>>) -> Option<(GateId, usize)> {
    for (gate, owners) in conflicts {
        let successor_owners: BTreeSet<usize> = connectivity::successor_gates(netlist, *gate)
            .iter()
            .filter_map(|s| conflicts.get(s))
            .flatten()
            .copied()
            .collect();
        if let Some(c) = owners.iter().find(|c| !successor_owners.contains(*c)) {
            return Some((*gate, *c));
        }
    }
    let (gate, owners) = conflicts.iter().next()?;
    log::error!(
        "could not resolve conflicts in duplicate gates due to cyclic dependency, continuing with broken gate {}",
        netlist.gate(*gate).name
    );
    owners.first().map(|c| (*gate, *c))
}

/// Moves candidate `owner`'s copy of `gate` onto a fresh clone.
fn clone_into(
    netlist: &mut Netlist,
    gate: GateId,
    owner: usize,
    owners: &mut BTreeMap<GateId, Vec<usize>>,
    candidates: &mut [(BaseCandidate, VerifiedCandidate)],
) -> Result<(), ModIdError> {
    let clone_name = format!("{}_CLONE_{}_{}", netlist.gate(gate).name, gate.0, netlist.gate_count());
    let clone = netlist.clone_gate(gate, &clone_name)?;

    let vc = &mut candidates[owner].1;
    let gates = owned_gates_mut(vc);
    match gates.iter().position(|g| *g == gate) {
        Some(pos) => {
            gates.remove(pos);
        }
        None => log::error!(
            "trying to erase gate {} / {} from a candidate it is not part of",
            gate.0,
            netlist.gate(gate).name
        ),
    }
    gates.push(clone);
    owners.insert(clone, vec![owner]);
    if let Some(list) = owners.get_mut(&gate) {
        list.retain(|c| *c != owner);
    }

    // Loads inside the owning candidate move to the clone; all other loads
    // stay on the original.
    let mut moved: BTreeMap<String, Vec<Endpoint>> = BTreeMap::new();
    let fan_out: Vec<(String, NetId)> = netlist
        .gate(gate)
        .fan_out
        .iter()
        .map(|(p, n)| (p.clone(), *n))
        .collect();
    for (pin, net) in fan_out {
        let destinations = netlist.net(net).destinations.clone();
        for dest in destinations {
            let internal = owners.get(&dest.gate).is_some_and(|o| o.contains(&owner));
            if !internal {
                continue;
            }
            netlist.disconnect_destination(net, &dest);
            moved.entry(pin.clone()).or_default().push(dest);
        }

        if vc.verified && vc.output_nets.contains(&net) {
            let new_net = netlist.create_net(&format!("n{}_OUTPUT", netlist.net_count()));
            netlist.connect_source(new_net, clone, &pin)?;
            if netlist.net(net).is_global_output {
                netlist.mark_global_output(new_net);
            }
            for n in vc.output_nets.iter_mut().filter(|n| **n == net) {
                *n = new_net;
            }
        }
    }

    for (pin, dests) in moved {
        let net = match netlist.gate(clone).fan_out.get(&pin) {
            Some(n) => *n,
            None => {
                let n = netlist.create_net(&format!("n{}_CLONED", netlist.net_count()));
                netlist.connect_source(n, clone, &pin)?;
                n
            }
        };
        for dest in dests {
            if let Err(e) = netlist.connect_destination(net, dest.gate, &dest.pin) {
                log::error!(
                    "failed to add destination to net {} with ID {}: {}",
                    netlist.net(net).name,
                    net.0,
                    e
                );
            }
        }
    }
    log::debug!(
        "cloned gate {} into {} for candidate {}",
        netlist.gate(gate).name,
        clone_name,
        owner
    );
    Ok(())
}

/// Duplicates every gate owned by more than one candidate until each gate
/// has a single owner. Returns the number of clones made.
fn resolve_conflicts(
    netlist: &mut Netlist,
    candidates: &mut [(BaseCandidate, VerifiedCandidate)],
) -> Result<usize, ModIdError> {
    let mut owners = gate_owners(candidates);
    let mut conflicts: BTreeMap<GateId, Vec<usize>> = owners
        .iter()
        .filter(|(_, o)| o.len() > 1)
        .map(|(g, o)| (*g, o.clone()))
        .collect();
    let mut clones = 0;
    while let Some((gate, owner)) = next_conflict(netlist, &conflicts) {
        clone_into(netlist, gate, owner, &mut owners, candidates)?;
        clones += 1;
        let resolved = match conflicts.get_mut(&gate) {
            Some(list) => {
                list.retain(|c| *c != owner);
                list.len() <= 1
            }
            None => true,
        };
        if resolved {
            conflicts.remove(&gate);
        }
    }
    Ok(clones)
}

impl IdentificationResult {
    pub fn new(pairs: Vec<(BaseCandidate, VerifiedCandidate)>, stats: RunStats) -> Self {
        IdentificationResult { pairs, stats }
    }

    pub fn candidates(&self) -> BTreeMap<usize, &VerifiedCandidate> {
        self.pairs.iter().map(|(_, vc)| vc).enumerate().collect()
    }

    pub fn verified_candidates(&self) -> BTreeMap<usize, &VerifiedCandidate> {
        self.pairs
            .iter()
            .map(|(_, vc)| vc)
            .enumerate()
            .filter(|(_, vc)| vc.is_verified())
            .collect()
    }

    pub fn candidate_by_id(&self, id: usize) -> Option<&VerifiedCandidate> {
        self.pairs.get(id).map(|(_, vc)| vc)
    }

    /// Gates of all base candidates.
    pub fn all_gates(&self) -> BTreeSet<GateId> {
        self.pairs.iter().flat_map(|(b, _)| b.gates.iter().copied()).collect()
    }

    pub fn all_verified_gates(&self) -> BTreeSet<GateId> {
        self.pairs
            .iter()
            .filter(|(_, vc)| vc.is_verified())
            .flat_map(|(_, vc)| vc.gates.iter().copied())
            .collect()
    }

    /// Drops unverified candidates whose base chain is already covered by a
    /// verified candidate.
    fn modules_to_create(&self) -> Vec<(BaseCandidate, VerifiedCandidate)> {
        self.pairs
            .iter()
            .enumerate()
            .filter(|(i, (base, vc))| {
                if vc.is_verified() {
                    return true;
                }
                let covered = self.pairs.iter().enumerate().any(|(j, (_, other))| {
                    j != *i && other.is_verified() && base.gates.iter().all(|g| other.gates.contains(g))
                });
                !covered
            })
            .map(|(_, pair)| pair.clone())
            .collect()
    }

    /// Creates one module below the top module per candidate, after
    /// resolving gates claimed by several candidates. Errors on single pins
    /// are logged and skipped.
    pub fn create_modules(&self, netlist: &mut Netlist) -> Result<Vec<ModuleId>, ModIdError> {
        let mut candidates = self.modules_to_create();
        let clones = resolve_conflicts(netlist, &mut candidates)?;
        if clones > 0 {
            log::info!("resolved {} gate conflicts by cloning", clones);
        }

        let mut type_counter: BTreeMap<String, usize> = BTreeMap::new();
        let mut modules = Vec::with_capacity(candidates.len());
        for (idx, (_, vc)) in candidates.iter().enumerate() {
            if vc.operands.len() > OPERAND_NAMES.len() {
                return Err(ModIdError::Materialization(format!(
                    "candidate {} has {} operands but only {} operand names exist",
                    idx,
                    vc.operands.len(),
                    OPERAND_NAMES.len()
                )));
            }
            let name = vc.name();
            let count = type_counter.entry(name.clone()).or_default();
            let module = netlist.create_module(&format!("{}_{}", name, count), TOP_MODULE, vc.owned_gates());
            *count += 1;
            materialize_pins(netlist, module, vc);
            set_metadata(netlist, module, idx, vc);
            modules.push(module);
        }
        Ok(modules)
    }
}

fn materialize_pins(netlist: &mut Netlist, module: ModuleId, vc: &VerifiedCandidate) {
    // A net used by several operand bits gets one pin naming all of them.
    let mut net_to_indices: BTreeMap<NetId, BTreeMap<&str, Vec<usize>>> = BTreeMap::new();
    for (op, nets) in OPERAND_NAMES.iter().zip(&vc.operands) {
        for (idx, net) in nets.iter().enumerate() {
            net_to_indices.entry(*net).or_default().entry(*op).or_default().push(idx);
        }
    }

    let missing = |netlist: &Netlist, net: NetId| {
        log::error!(
            "module {} does not have a pin connected to net {} / {}",
            netlist.module(module).name,
            netlist.net(net).name,
            net.0
        );
    };

    let mut visited = BTreeSet::new();
    for (op, nets) in OPERAND_NAMES.iter().zip(&vc.operands) {
        let mut group = Vec::new();
        for net in nets {
            if !netlist.module_has_pin(module, *net) {
                missing(netlist, *net);
                continue;
            }
            if !visited.insert(*net) {
                continue;
            }
            let pin_name = net_to_indices[net]
                .iter()
                .map(|(name, indices)| {
                    let idx: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                    format!("{}_{}", name, idx.join(", "))
                })
                .collect::<Vec<_>>()
                .join(" | ");
            netlist.set_pin_name(module, *net, pin_name);
            group.push(*net);
        }
        if let Err(e) = netlist.create_pin_group(module, op, PinDirection::Input, group) {
            log::error!("could not create input pin group: {}", e);
        }
    }

    let mut outputs = Vec::new();
    for net in &vc.output_nets {
        if !netlist.module_has_pin(module, *net) {
            missing(netlist, *net);
            continue;
        }
        netlist.set_pin_name(module, *net, format!("OUT_{}", outputs.len()));
        outputs.push(*net);
    }
    if let Err(e) = netlist.create_pin_group(module, "OUT", PinDirection::Output, outputs) {
        log::error!("could not create output pin group: {}", e);
    }

    let mut ctrl = Vec::new();
    for net in &vc.control_signals {
        if !netlist.module_has_pin(module, *net) {
            missing(netlist, *net);
            continue;
        }
        netlist.set_pin_name(module, *net, format!("CTRL_{}", ctrl.len()));
        ctrl.push(*net);
    }
    if !ctrl.is_empty() {
        if let Err(e) = netlist.create_pin_group(module, "CTRL", PinDirection::Input, ctrl) {
            log::info!("could not create ctrl pin group: {}", e);
        }
    }
}

fn set_metadata(netlist: &mut Netlist, module: ModuleId, idx: usize, vc: &VerifiedCandidate) {
    let types: Vec<&str> = vc.types.iter().map(|t| t.name()).collect();
    let ctrl_values: BTreeSet<u64> = vc.control_mappings.iter().map(ctrl_value).collect();
    let ctrl_values: Vec<String> = ctrl_values.iter().map(|v| v.to_string()).collect();

    let pin_names = netlist.module(module).pin_names.clone();
    let name_of = |n: NetId| {
        pin_names
            .get(&n)
            .cloned()
            .unwrap_or_else(|| netlist.net(n).name.clone())
    };
    let mut raw = String::new();
    let mut readable = String::new();
    for (mapping, op) in &vc.operations {
        let value = ctrl_value(mapping);
        raw += &format!("{}: {}\n", value, op);
        readable += &format!("{}: {}\n", value, op.render(&name_of));
    }
    let json = match serde_json::to_string(&vc.operations) {
        Ok(j) => j,
        Err(e) => {
            log::warn!("could not serialize operations: {}", e);
            String::new()
        }
    };

    netlist.set_module_data(module, VERIFIED_CANDIDATE_ID_KEY, idx.to_string());
    netlist.set_module_data(module, VERIFIED_TYPES_KEY, types.join(", "));
    netlist.set_module_data(module, CTRL_MAPPINGS_KEY, ctrl_values.join(", "));
    netlist.set_module_data(module, OPERATIONS_KEY, raw);
    netlist.set_module_data(module, OPERATIONS_HR_KEY, readable);
    netlist.set_module_data(module, OPERATIONS_JSON_KEY, json);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::CandidateType;
    use crate::test_utils::build_ice40_ripple_adder;
    use crate::word::WordExpr;
    use pretty_assertions::assert_eq;

    fn adder_candidate(a: &[NetId], b: &[NetId], sum: &[NetId], gates: &[GateId]) -> VerifiedCandidate {
        let op = WordExpr::nets(a).add(WordExpr::nets(b));
        VerifiedCandidate::new(
            CandidateType::Adder,
            vec![a.to_vec(), b.to_vec()],
            sum.to_vec(),
            Vec::new(),
            CtrlMapping::new(),
            op,
            gates.to_vec(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_ctrl_value_msb_first() {
        let m = CtrlMapping::from([(NetId(1), true), (NetId(5), false), (NetId(9), true)]);
        assert_eq!(ctrl_value(&m), 0b101);
    }

    #[test]
    fn test_adder_module_has_named_pin_groups() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut adder = build_ice40_ripple_adder(4);
        let vc = adder_candidate(&adder.a, &adder.b, &adder.sum, &adder.gates());
        let base = BaseCandidate {
            id: 0,
            gates: adder.carries.clone(),
        };
        let result = IdentificationResult::new(vec![(base, vc)], RunStats::default());
        let modules = result.create_modules(&mut adder.netlist).unwrap();
        assert_eq!(modules.len(), 1);
        let m = adder.netlist.module(modules[0]);
        assert_eq!(m.name, "ADDER_0");
        let groups: Vec<&str> = m.pin_groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(groups, vec!["A", "B", "OUT"]);
        assert_eq!(m.pin_groups[0].nets, adder.a);
        assert_eq!(m.pin_names[&adder.a[2]], "A_2");
        assert_eq!(m.data[VERIFIED_TYPES_KEY], "ADDER");
        assert_eq!(m.data[OPERATIONS_HR_KEY], "0: (A + B)\n");
    }

    #[test]
    fn test_shared_gate_is_cloned() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut adder = build_ice40_ripple_adder(4);
        let shared = adder.luts[3];
        let top_sum = adder.sum[3];
        let inv = adder.netlist.create_gate("INV", "inv_top").unwrap();
        let inv_out = adder.netlist.create_net("inv_top_o");
        adder.netlist.connect_destination(top_sum, inv, "I").unwrap();
        adder.netlist.connect_source(inv_out, inv, "O").unwrap();
        adder.netlist.mark_global_output(inv_out);

        let first = adder_candidate(&adder.a, &adder.b, &adder.sum, &adder.gates());
        let second = VerifiedCandidate::new(
            CandidateType::Negation,
            vec![vec![adder.a[3]]],
            vec![inv_out],
            Vec::new(),
            CtrlMapping::new(),
            WordExpr::Net(adder.a[3]).neg(),
            vec![shared, inv],
            BTreeMap::new(),
        );
        let pairs = vec![
            (
                BaseCandidate {
                    id: 0,
                    gates: adder.carries.clone(),
                },
                first,
            ),
            (
                BaseCandidate {
                    id: 1,
                    gates: vec![inv],
                },
                second,
            ),
        ];
        let gates_before = adder.netlist.gate_count();
        let result = IdentificationResult::new(pairs, RunStats::default());
        let modules = result.create_modules(&mut adder.netlist).unwrap();
        assert_eq!(adder.netlist.gate_count(), gates_before + 1);

        let g0: BTreeSet<GateId> = adder.netlist.module(modules[0]).gates.iter().copied().collect();
        let g1: BTreeSet<GateId> = adder.netlist.module(modules[1]).gates.iter().copied().collect();
        assert!(g0.is_disjoint(&g1));
        assert_eq!(g0.len(), adder.gates().len());
        assert!(g1.contains(&shared));
        // The inverter still reads the original gate's output.
        assert_eq!(adder.netlist.gate(inv).fan_in["I"], top_sum);
    }

    #[test]
    fn test_unverified_chain_inside_verified_candidate_is_dropped() {
        let mut adder = build_ice40_ripple_adder(2);
        let vc = adder_candidate(&adder.a, &adder.b, &adder.sum, &adder.gates());
        let pairs = vec![
            (
                BaseCandidate {
                    id: 0,
                    gates: adder.carries.clone(),
                },
                vc,
            ),
            (
                BaseCandidate {
                    id: 1,
                    gates: adder.carries.clone(),
                },
                VerifiedCandidate::unverified(adder.carries.clone()),
            ),
        ];
        let result = IdentificationResult::new(pairs, RunStats::default());
        assert_eq!(result.verified_candidates().len(), 1);
        let modules = result.create_modules(&mut adder.netlist).unwrap();
        assert_eq!(modules.len(), 1);
    }
}
