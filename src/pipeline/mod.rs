// SPDX-License-Identifier: Apache-2.0

//! Functional candidate search.
//!
//! Every searchable candidate type has an ordered list of stages. A stage
//! takes one candidate and returns any number of refined copies; the working
//! set is flat-mapped through the stages in order and a branch dies as soon
//! as a stage returns nothing for it.

mod analysis;
mod comparison;
mod control;
mod operands;
mod shifts;

use std::time::Instant;

use crate::candidates::{
    CandidateContext, CandidateType, CtrlMapping, FunctionalCandidate, StructuralCandidate,
};
use crate::config::{Configuration, SearchBudget};
use crate::error::ModIdError;
use crate::netlist::{GateId, NetId};
use crate::stats::RunStats;

/// Read-only inputs shared by all stages of one search.
pub struct StageEnv<'a> {
    pub budget: &'a SearchBudget,
    pub registers: &'a [Vec<GateId>],
}

pub type StageResult = Result<Vec<FunctionalCandidate>, ModIdError>;

pub type StageFn = fn(&FunctionalCandidate, &mut CandidateContext<'_>, &StageEnv<'_>) -> StageResult;

#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub run: StageFn,
}

macro_rules! stage {
    ($module:ident :: $f:ident) => {
        Stage {
            name: stringify!($f),
            run: $module::$f,
        }
    };
}

const EQUAL_STAGES: &[Stage] = &[
    stage!(analysis::trim_to_single_output_net),
    stage!(analysis::discard_equal_candidate),
];

const LESS_EQUAL_STAGES: &[Stage] = &[
    stage!(analysis::trim_to_single_output_net),
    stage!(control::find_control_signals),
    stage!(control::realize_control_signals),
    stage!(comparison::create_sign_extension_variants),
    stage!(comparison::order_input_operands),
    stage!(operands::create_sign_bit_variants),
];

const ADDER_STAGES: &[Stage] = &[
    stage!(analysis::create_output_net_variant),
    stage!(analysis::update_input_output_stats),
    stage!(control::identify_control_signals),
    stage!(control::realize_control_signals),
    stage!(analysis::early_abort),
    stage!(analysis::update_input_output_stats),
    stage!(operands::permute_single_input_signals),
    stage!(operands::build_input_operands),
    stage!(operands::order_output_signals),
    stage!(operands::add_single_input_signals),
    stage!(operands::create_sign_bit_variants),
    stage!(operands::create_input_extension_variants),
    stage!(operands::reorder_commutative),
];

const VALUE_CHECK_STAGES: &[Stage] = &[
    stage!(analysis::check_output_size),
    stage!(operands::build_input_operand),
];

const CONSTANT_MULTIPLICATION_STAGES: &[Stage] = &[
    stage!(analysis::update_input_output_stats),
    stage!(analysis::early_abort),
    stage!(operands::build_input_operands),
    stage!(operands::order_output_signals),
    stage!(shifts::add_shifted_operand),
    stage!(operands::create_input_extension_variants),
];

const COUNTER_STAGES: &[Stage] = &[
    stage!(analysis::create_output_net_variant),
    stage!(analysis::early_abort),
    stage!(analysis::update_input_output_stats),
    stage!(control::identify_control_signals),
    stage!(control::realize_control_signals),
    stage!(analysis::update_input_output_stats),
    stage!(operands::permute_single_input_signals),
    stage!(operands::build_input_operands),
    stage!(operands::order_output_signals),
    stage!(operands::add_single_input_signals),
    stage!(operands::create_input_extension_variants),
];

const ABSOLUTE_STAGES: &[Stage] = &[
    stage!(analysis::create_output_net_variant),
    stage!(analysis::early_abort),
    stage!(analysis::update_input_output_stats),
    stage!(control::identify_control_signals),
    stage!(control::create_operand_control_variations),
    stage!(control::realize_control_signals),
    stage!(analysis::update_input_output_stats),
    stage!(operands::permute_single_input_signals),
    stage!(operands::build_input_operands),
    stage!(operands::order_output_signals),
    stage!(operands::add_single_input_signals),
    stage!(operands::create_input_extension_variants),
];

/// The ordered stage list of `ty`, or `None` for types that are only
/// discovered while verifying another type.
pub fn stages_for(ty: CandidateType) -> Option<&'static [Stage]> {
    match ty {
        CandidateType::Equal => Some(EQUAL_STAGES),
        CandidateType::LessEqual => Some(LESS_EQUAL_STAGES),
        CandidateType::Adder => Some(ADDER_STAGES),
        CandidateType::ValueCheck => Some(VALUE_CHECK_STAGES),
        CandidateType::ConstantMultiplication => Some(CONSTANT_MULTIPLICATION_STAGES),
        CandidateType::Counter => Some(COUNTER_STAGES),
        CandidateType::Absolute => Some(ABSOLUTE_STAGES),
        _ => None,
    }
}

/// Runs the stage list of `ty` on a fresh candidate of `ctx`.
pub fn create_candidates(
    ctx: &mut CandidateContext<'_>,
    ty: CandidateType,
    env: &StageEnv<'_>,
) -> Result<Vec<FunctionalCandidate>, ModIdError> {
    let stages = stages_for(ty).ok_or_else(|| {
        ModIdError::Expression(format!("no candidate search available for type {}", ty))
    })?;
    let mut candidates = vec![FunctionalCandidate::new(ctx, ty, env.budget.max_control_signals)];
    for stage in stages {
        let mut next = Vec::new();
        for candidate in &candidates {
            let produced = (stage.run)(candidate, ctx, env).map_err(|e| {
                ModIdError::Expression(format!("stage {} failed: {}", stage.name, e))
            })?;
            next.extend(produced);
        }
        log::trace!("{} {}: {} candidates", ty, stage.name, next.len());
        candidates = next;
        if candidates.is_empty() {
            break;
        }
    }
    Ok(candidates)
}

/// All functional candidates of one structural candidate over the
/// configured types. Candidates with an output depending on too many inputs
/// are skipped entirely. A failing type is logged and skipped.
pub fn generate_functional_candidates(
    sc: &mut StructuralCandidate<'_>,
    config: &Configuration,
    stats: &mut RunStats,
) -> Vec<FunctionalCandidate> {
    let output_nets = sc.context.output_nets(false);
    for net in &output_nets {
        match sc.context.subgraph_input_count(*net) {
            Ok(count) if count > config.budget.max_subgraph_inputs => {
                log::debug!(
                    "skipping structural candidate of base {}: output {} depends on {} inputs",
                    sc.base.id,
                    net.0,
                    count
                );
                return Vec::new();
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!(
                    "cannot build functions for structural candidate of base {}: {}",
                    sc.base.id,
                    e
                );
                return Vec::new();
            }
        }
    }

    let env = StageEnv {
        budget: &config.budget,
        registers: &config.known_registers,
    };
    let mut result = Vec::new();
    for ty in &config.types_to_check {
        if !ty.is_searchable() {
            log::error!("no candidate generation available for type {}", ty);
            continue;
        }
        let start = Instant::now();
        let created = create_candidates(&mut sc.context, *ty, &env);
        let entry = stats.entry(*ty);
        entry.creation_time += start.elapsed();
        match created {
            Ok(candidates) => {
                entry.created += candidates.len();
                result.extend(candidates);
            }
            Err(e) => log::warn!(
                "candidate creation for type {} on base {} failed: {}",
                ty,
                sc.base.id,
                e
            ),
        }
    }
    result
}

/// Control mapping extended with every net of `nets` fixed to `value`.
pub(crate) fn with_fixed(
    ctrl: &CtrlMapping,
    nets: impl IntoIterator<Item = NetId>,
    value: bool,
) -> CtrlMapping {
    let mut mapping = ctrl.clone();
    for n in nets {
        mapping.entry(n).or_insert(value);
    }
    mapping
}

/// Influence of `net`'s variables sorted by descending influence. Ties keep
/// ascending net order so the result is deterministic.
pub(crate) fn sorted_influence(
    ctx: &mut CandidateContext<'_>,
    net: NetId,
    ctrl: &CtrlMapping,
) -> Result<Vec<(NetId, f64)>, ModIdError> {
    let mut influence = ctx.influence(net, ctrl)?;
    influence.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(influence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::BaseCandidate;
    use crate::test_utils::{build_ice40_counter, build_ice40_ripple_adder};
    use std::sync::Arc;

    fn adder_candidate(adder: &crate::test_utils::RippleAdder) -> Vec<GateId> {
        let mut gates = adder.carries.clone();
        gates.extend(adder.luts.iter().copied());
        gates
    }

    #[test]
    fn test_every_search_type_has_stages() {
        for ty in CandidateType::SEARCH_TYPES {
            assert!(stages_for(ty).is_some(), "{ty}");
        }
        assert!(stages_for(CandidateType::Subtraction).is_none());
    }

    #[test]
    fn test_adder_search_proposes_ordered_operands() {
        let _ = env_logger::builder().is_test(true).try_init();
        let adder = build_ice40_ripple_adder(4);
        let gates = adder_candidate(&adder);
        let budget = SearchBudget::default();
        let env = StageEnv {
            budget: &budget,
            registers: &[],
        };
        let mut ctx = CandidateContext::new(&adder.netlist, &gates, 1, 256);
        let candidates = create_candidates(&mut ctx, CandidateType::Adder, &env).unwrap();
        assert!(!candidates.is_empty());
        let found = candidates.iter().any(|c| {
            c.output_nets == adder.sum
                && c.operands.len() == 2
                && c.operands.iter().any(|op| op[..4] == adder.a[..])
                && c.operands.iter().any(|op| op[..4] == adder.b[..])
        });
        assert!(found, "no candidate with a, b -> sum among {}", candidates.len());
    }

    #[test]
    fn test_generate_skips_unknown_types() {
        let adder = build_ice40_ripple_adder(3);
        let gates = adder_candidate(&adder);
        let base = Arc::new(BaseCandidate {
            id: 0,
            gates: adder.carries.clone(),
        });
        let mut sc = StructuralCandidate::new(&adder.netlist, base, gates, 1, 256);
        let config = Configuration::default()
            .with_types(&[CandidateType::Subtraction, CandidateType::Equal]);
        let mut stats = RunStats::default();
        // Three sum outputs: the equality search trims to at most two.
        let candidates = generate_functional_candidates(&mut sc, &config, &mut stats);
        assert!(candidates.is_empty());
        assert!(stats.per_type.contains_key(&CandidateType::Equal));
        assert!(!stats.per_type.contains_key(&CandidateType::Subtraction));
    }

    #[test]
    fn test_counter_search_finds_single_operand() {
        let counter = build_ice40_counter(4);
        let budget = SearchBudget::default();
        let env = StageEnv {
            budget: &budget,
            registers: &[],
        };
        let mut ctx = CandidateContext::new(&counter.netlist, &counter.logic, 1, 256);
        let candidates = create_candidates(&mut ctx, CandidateType::Counter, &env).unwrap();
        assert!(candidates
            .iter()
            .any(|c| c.operands.len() == 1 && c.output_nets == counter.next));
    }
}
