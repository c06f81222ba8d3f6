// SPDX-License-Identifier: Apache-2.0

//! Identification of word-level arithmetic in gate-level netlists.
//!
//! Carry chains are detected per architecture and grown into structural
//! candidates. For each structural candidate and operation type a pipeline
//! of stages proposes operand, output and control-signal assignments, which
//! are then verified against the gate-level functions by random probing and
//! a SAT equivalence check. One explanation per carry chain survives
//! post-processing and can be materialized as a netlist module.

pub mod aig;
pub mod architectures;
pub mod candidates;
pub mod config;
pub mod error;
pub mod netlist;
pub mod pipeline;
pub mod post_processing;
pub mod result;
pub mod sat;
pub mod scheduler;
pub mod stats;
pub mod test_utils;
pub mod utils;
pub mod verify;
pub mod word;

use std::sync::Arc;
use std::time::Instant;

use crate::architectures::BaseFamily;
use crate::candidates::BaseCandidate;
use crate::config::Configuration;
use crate::error::ModIdError;
use crate::netlist::{GateId, Netlist};
use crate::result::IdentificationResult;
use crate::scheduler::VerifiedMap;
use crate::stats::RunStats;

fn finish(
    netlist: &Netlist,
    families: &[BaseFamily],
    verified: VerifiedMap,
    stats: RunStats,
    config: &Configuration,
) -> IdentificationResult {
    let pairs = families
        .iter()
        .map(|family| {
            let found = verified.get(&family.base.id).map_or(&[][..], |v| v.as_slice());
            let vc = post_processing::post_process(netlist, &family.base, found, &config.known_registers);
            (family.base.as_ref().clone(), vc)
        })
        .collect();
    stats.log_summary();
    IdentificationResult::new(pairs, stats)
}

/// Searches the whole netlist for arithmetic modules.
///
/// The netlist is only modified to provide a ground net if it has none;
/// call [`IdentificationResult::create_modules`] to materialize the result.
pub fn execute(netlist: &mut Netlist, config: &Configuration) -> Result<IdentificationResult, ModIdError> {
    let start = Instant::now();
    netlist.ensure_gnd_net()?;
    let netlist: &Netlist = netlist;
    let families = architectures::generate_structural_candidates(netlist, config)?;
    let (verified, stats) = scheduler::run(netlist, &families, config);
    let result = finish(netlist, &families, verified, stats, config);
    log::info!(
        "identified {} of {} base candidates in {:.3}s",
        result.verified_candidates().len(),
        families.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(result)
}

/// Analyzes `gates` as a single structural candidate, skipping chain
/// detection and growth.
pub fn execute_on_gates(
    netlist: &mut Netlist,
    gates: &[GateId],
    config: &Configuration,
) -> Result<IdentificationResult, ModIdError> {
    if gates.is_empty() {
        return Err(ModIdError::EmptyGates);
    }
    netlist.ensure_gnd_net()?;
    let netlist: &Netlist = netlist;
    let families = vec![BaseFamily {
        base: Arc::new(BaseCandidate {
            id: 0,
            gates: gates.to_vec(),
        }),
        structural: vec![gates.to_vec()],
    }];
    let (verified, stats) = scheduler::run(netlist, &families, config);
    Ok(finish(netlist, &families, verified, stats, config))
}
