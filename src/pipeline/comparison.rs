// SPDX-License-Identifier: Apache-2.0

//! Operand reconstruction for ordering comparisons.

use std::collections::BTreeMap;

use super::{StageEnv, StageResult, sorted_influence, with_fixed};
use crate::candidates::{CandidateContext, CtrlMapping, FunctionalCandidate};
use crate::error::ModIdError;
use crate::netlist::NetId;

/// Sign extension nets have at least this factor more influence than the
/// next bit below them.
const SIGN_INFLUENCE_RATIO: f64 = 0.75;

const MAX_SIGN_NETS: usize = 6;

/// Nets paired per influence round.
const PAIRS_PER_ROUND: usize = 10;

/// Adds a variant in which the top influence nets are treated as sign
/// extension bits of one of the operands.
pub fn create_sign_extension_variants(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    let mut result = vec![candidate.clone()];
    let Some(out) = candidate.output_nets.first() else {
        return Ok(result);
    };
    let influence = sorted_influence(ctx, *out, &candidate.control_mapping)?;
    if influence.len() < 3 || influence[0].1 * SIGN_INFLUENCE_RATIO < influence[1].1 {
        return Ok(result);
    }

    let mut sign_nets = vec![influence[0].0];
    for idx in 1..influence.len() - 1 {
        sign_nets.push(influence[idx].0);
        if influence[idx].1 * SIGN_INFLUENCE_RATIO > influence[idx + 1].1 {
            break;
        }
    }
    if sign_nets.len() > MAX_SIGN_NETS || (influence.len() - sign_nets.len()) % 2 != 0 {
        return Ok(result);
    }
    let mut c = candidate.clone();
    c.sign_nets = sign_nets;
    result.push(c);
    Ok(result)
}

/// Pairs up inputs of similar influence, most significant pairs first
/// until the influence vector is exhausted, then returns them LSB first.
fn net_pairs_by_influence(
    ctx: &mut CandidateContext<'_>,
    out: NetId,
    initial: &CtrlMapping,
) -> Result<Vec<(NetId, NetId)>, ModIdError> {
    let mut mapping = initial.clone();
    let mut pairs = Vec::new();
    loop {
        let influence = sorted_influence(ctx, out, &mapping)?;
        if influence.len() % 2 != 0 {
            return Ok(Vec::new());
        }
        let upper = influence.len().min(PAIRS_PER_ROUND);
        for pair in influence[..upper].chunks(2) {
            mapping.insert(pair[0].0, false);
            mapping.insert(pair[1].0, false);
            pairs.push((pair[0].0, pair[1].0));
        }
        if influence.len() <= PAIRS_PER_ROUND {
            break;
        }
    }
    pairs.reverse();
    Ok(pairs)
}

/// Splits the inputs into the two compared operands by toggling one net of
/// each pair from an all-zero assignment: the net that alone makes the
/// predicate true belongs to the larger side.
pub fn order_input_operands(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    let Some(out) = candidate.output_nets.first().copied() else {
        return Ok(Vec::new());
    };
    let mapping = with_fixed(
        &candidate.control_mapping,
        candidate.sign_nets.iter().copied(),
        false,
    );
    let inputs = ctx.variables(out, &mapping)?;
    if inputs.len() % 2 != 0 {
        return Ok(Vec::new());
    }
    let pairs = net_pairs_by_influence(ctx, out, &mapping)?;
    if pairs.is_empty() {
        return Ok(Vec::new());
    }

    let mut assignment: BTreeMap<NetId, bool> = inputs.iter().map(|n| (*n, false)).collect();
    let mut lhs = Vec::with_capacity(pairs.len());
    let mut rhs = Vec::with_capacity(pairs.len());
    for (first, second) in pairs {
        assignment.insert(first, true);
        let found_first = ctx.evaluate(out, &mapping, &assignment)?;
        assignment.insert(first, false);
        assignment.insert(second, true);
        let found_second = ctx.evaluate(out, &mapping, &assignment)?;
        assignment.insert(second, false);
        if found_first == found_second {
            return Ok(Vec::new());
        }
        if found_first {
            lhs.push(second);
            rhs.push(first);
        } else {
            lhs.push(first);
            rhs.push(second);
        }
    }

    let mut base = candidate.clone();
    base.operands = vec![lhs, rhs];
    let mut result = vec![base.clone()];

    // Any sign net but the first may be the MSB of the extended side.
    let sign = &candidate.sign_nets;
    for msb_idx in 1..sign.len() {
        let mut extended: Vec<NetId> = Vec::with_capacity(sign.len());
        let mut plain: Vec<NetId> = Vec::with_capacity(sign.len());
        for (idx, net) in sign.iter().enumerate().skip(1) {
            if idx == msb_idx {
                continue;
            }
            extended.push(sign[msb_idx]);
            plain.push(*net);
        }
        extended.push(sign[msb_idx]);
        plain.push(sign[0]);

        let mut left = base.clone();
        left.operands[0].extend(extended.iter().copied());
        left.operands[1].extend(plain.iter().copied());
        let mut right = base.clone();
        right.operands[0].extend(plain.iter().copied());
        right.operands[1].extend(extended.iter().copied());
        result.push(left);
        result.push(right);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::CandidateType;
    use crate::config::SearchBudget;
    use crate::test_utils::build_comparator;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_order_input_operands_of_less_equal() {
        let cmp = build_comparator(3, false);
        let mut ctx = CandidateContext::new(&cmp.netlist, &cmp.gates, 3, 512);
        let budget = SearchBudget::default();
        let env = StageEnv {
            budget: &budget,
            registers: &[],
        };
        let mut c = FunctionalCandidate::new(&ctx, CandidateType::LessEqual, 0);
        c.output_nets = vec![cmp.out];
        let got = order_input_operands(&c, &mut ctx, &env).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].operands, vec![cmp.a.clone(), cmp.b.clone()]);
    }
}
