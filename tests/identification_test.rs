// SPDX-License-Identifier: Apache-2.0

//! End to end identification on small iCE40 and Xilinx netlists.

use std::collections::{BTreeMap, BTreeSet};

use pretty_assertions::assert_eq;
use test_case::test_case;
use xlsynth_modid::candidates::{CandidateContext, CandidateType, VerifiedCandidate};
use xlsynth_modid::config::Configuration;
use xlsynth_modid::error::ModIdError;
use xlsynth_modid::netlist::{GateId, NetId, Netlist};
use xlsynth_modid::test_utils::{
    build_equality_comparator, build_ice40_add_sub, build_ice40_counter, build_ice40_ripple_adder,
    build_ice40_subtractor, build_xilinx_adder,
};
use xlsynth_modid::verify::COUNTER_INCREMENT_KEY;

fn config() -> Configuration {
    Configuration::default().with_threads(2)
}

/// Checks every reported word-level operation against the gate-level
/// functions of the candidate's outputs on all input assignments.
fn assert_operations_match_gates(netlist: &Netlist, vc: &VerifiedCandidate) {
    assert!(!vc.operations.is_empty());
    let mut ctx = CandidateContext::new(netlist, &vc.gates, 1, 16);
    for (mapping, expr) in &vc.operations {
        let observed = ctx.functions(&vc.output_nets, mapping).unwrap();
        let expected = expr.bitblast(ctx.aig_mut()).unwrap();
        assert_eq!(observed.len(), expected.len());

        let mut roots = observed.clone();
        roots.extend(expected.iter().copied());
        let support: Vec<NetId> = ctx
            .aig()
            .support(&roots)
            .into_iter()
            .filter(|n| !mapping.contains_key(n))
            .collect();
        assert!(support.len() <= 16, "support of {} nets", support.len());

        for word in 0u32..1 << support.len() {
            let mut assignment: BTreeMap<NetId, bool> = mapping.clone();
            for (i, net) in support.iter().enumerate() {
                assignment.insert(*net, (word >> i) & 1 == 1);
            }
            let value = |n: NetId| assignment.get(&n).copied().unwrap_or(false);
            assert_eq!(
                ctx.aig().eval(&observed, &value),
                ctx.aig().eval(&expected, &value),
                "mapping {mapping:?}, inputs {assignment:?}"
            );
        }
    }
}

#[test_case(2 ; "two bits")]
#[test_case(4 ; "four bits")]
fn test_ripple_adder_is_one_adder(width: usize) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut adder = build_ice40_ripple_adder(width);
    let result = xlsynth_modid::execute(&mut adder.netlist, &config()).unwrap();

    let verified = result.verified_candidates();
    assert_eq!(verified.len(), 1);
    let vc = verified.values().next().unwrap();
    assert_eq!(vc.primary_type(), CandidateType::Adder);
    assert_eq!(vc.operands.len(), 2);
    assert!(vc.operands.iter().all(|op| op.len() == width));
    assert_eq!(vc.output_nets, adder.sum);

    let owned: BTreeSet<GateId> = vc.gates.iter().copied().collect();
    assert!(adder.gates().iter().all(|g| owned.contains(g)));
    assert_operations_match_gates(&adder.netlist, vc);
}

#[test]
fn test_counter_is_not_an_adder() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut counter = build_ice40_counter(4);
    let config = Configuration {
        known_registers: vec![counter.registers.clone()],
        ..config()
    };
    let result = xlsynth_modid::execute(&mut counter.netlist, &config).unwrap();

    assert_eq!(result.pairs.len(), 1);
    let (_, vc) = &result.pairs[0];
    assert!(vc.is_verified());
    assert_eq!(vc.primary_type(), CandidateType::Counter);
    assert!(!vc.types.contains(&CandidateType::Adder));
    assert_eq!(vc.operands.len(), 1);
    assert_eq!(vc.operands[0][..4], counter.q[..]);
    assert_eq!(vc.additional_data[COUNTER_INCREMENT_KEY], "4'd1");
    assert_operations_match_gates(&counter.netlist, vc);
}

#[test]
fn test_add_sub_is_split_on_its_control_signal() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut add_sub = build_ice40_add_sub(3);
    let result = xlsynth_modid::execute(&mut add_sub.netlist, &config()).unwrap();

    let verified = result.verified_candidates();
    assert_eq!(verified.len(), 1);
    let vc = verified.values().next().unwrap();
    assert_eq!(vc.control_signals, vec![add_sub.ctrl]);
    assert_eq!(vc.control_mappings.len(), 2);
    assert!(vc.types.contains(&CandidateType::Adder));
    assert!(vc.types.contains(&CandidateType::Subtraction));
    assert_eq!(vc.output_nets, add_sub.out);
    assert_operations_match_gates(&add_sub.netlist, vc);
}

#[test]
fn test_carry4_adder_is_one_adder() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut adder = build_xilinx_adder(8);
    let result = xlsynth_modid::execute(&mut adder.netlist, &config()).unwrap();

    let verified = result.verified_candidates();
    assert_eq!(verified.len(), 1);
    let vc = verified.values().next().unwrap();
    assert_eq!(vc.primary_type(), CandidateType::Adder);
    assert_eq!(vc.output_nets, adder.sum);
    let owned: BTreeSet<GateId> = vc.gates.iter().copied().collect();
    assert!(adder.carries.iter().all(|g| owned.contains(g)));
    assert_operations_match_gates(&adder.netlist, vc);
}

#[test]
fn test_subtractor_on_given_gates() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sub = build_ice40_subtractor(4);
    let gates = sub.gates.clone();
    let config = config().with_types(&[CandidateType::Adder]);
    let result = xlsynth_modid::execute_on_gates(&mut sub.netlist, &gates, &config).unwrap();

    let (base, vc) = &result.pairs[0];
    assert_eq!(base.gates, gates);
    assert_eq!(vc.primary_type(), CandidateType::Subtraction);
    assert_eq!(vc.operands, vec![sub.a.clone(), sub.b.clone()]);
    assert_eq!(vc.output_nets, sub.diff);
}

#[test]
fn test_equality_comparator_on_given_gates() {
    let mut cmp = build_equality_comparator(3);
    let gates = cmp.gates.clone();
    let config = config().with_types(&[CandidateType::Equal]);
    let result = xlsynth_modid::execute_on_gates(&mut cmp.netlist, &gates, &config).unwrap();

    let vc = result.candidate_by_id(0).unwrap();
    assert_eq!(vc.primary_type(), CandidateType::Equal);
    assert_eq!(vc.output_nets, vec![cmp.out]);
    let operand_nets: BTreeSet<_> = vc.operands.iter().flatten().copied().collect();
    let expected: BTreeSet<_> = cmp.a.iter().chain(cmp.b.iter()).copied().collect();
    assert_eq!(operand_nets, expected);
}

#[test]
fn test_empty_gate_list_is_rejected() {
    let mut adder = build_ice40_ripple_adder(2);
    let err = xlsynth_modid::execute_on_gates(&mut adder.netlist, &[], &config()).unwrap_err();
    assert!(matches!(err, ModIdError::EmptyGates));
}

#[test]
fn test_verification_is_deterministic() {
    let first = {
        let mut adder = build_ice40_ripple_adder(3);
        xlsynth_modid::execute(&mut adder.netlist, &config()).unwrap()
    };
    let second = {
        let mut adder = build_ice40_ripple_adder(3);
        xlsynth_modid::execute(&mut adder.netlist, &config().with_threads(1)).unwrap()
    };
    assert_eq!(first.pairs, second.pairs);
}

#[test]
fn test_adder_materializes_as_module() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut adder = build_ice40_ripple_adder(4);
    let result = xlsynth_modid::execute(&mut adder.netlist, &config()).unwrap();
    let gates_before = adder.netlist.gate_count();
    let modules = result.create_modules(&mut adder.netlist).unwrap();

    assert_eq!(modules.len(), 1);
    assert_eq!(adder.netlist.gate_count(), gates_before);
    let module = adder.netlist.module(modules[0]);
    assert_eq!(module.name, "ADDER_0");
    let groups: Vec<&str> = module.pin_groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(groups, vec!["A", "B", "OUT"]);
    let owned: BTreeSet<GateId> = module.gates.iter().copied().collect();
    assert!(adder.gates().iter().all(|g| owned.contains(g)));
}
