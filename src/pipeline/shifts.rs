// SPDX-License-Identifier: Apache-2.0

//! Shifted operand recognition for constant multiplications.
//!
//! A multiplication by a constant with few set bits is a sum of shifted
//! copies of the input. The three most influential input bins, expressed as
//! bit positions within the input operand, identify which shifts are
//! summed. Negative shifts drop low bits, positive shifts insert zeros.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use super::{StageEnv, StageResult};
use crate::candidates::{CandidateContext, FunctionalCandidate};
use crate::error::ModIdError;
use crate::netlist::NetId;

pub const OPERAND_SHIFTS_KEY: &str = "OPERAND_SHIFTS";

type Fingerprint = Vec<Vec<usize>>;

static FINGERPRINTS: Lazy<BTreeMap<Fingerprint, Vec<Vec<i32>>>> = Lazy::new(|| {
    let entries: &[(&[&[usize]], &[&[i32]])] = &[
        (&[&[0, 4, 5], &[1, 6], &[2, 7]], &[&[-5, -4]]),
        (&[&[0, 3, 5], &[1, 4, 6], &[2, 7]], &[&[-5, -3]]),
        (&[&[0, 2, 5], &[1, 3, 6], &[4, 7]], &[&[-5, -2]]),
        (&[&[0, 1, 5], &[2, 6], &[3, 7]], &[&[-5, -1]]),
        (
            &[&[0, 5], &[1, 6], &[2, 7]],
            &[&[-5], &[-5, 1], &[-5, 2], &[-5, 3], &[-5, 4], &[-5, 5], &[5]],
        ),
        (&[&[0, 3, 4], &[1, 5], &[2, 6]], &[&[-4, -3]]),
        (&[&[0, 2, 4], &[1, 3, 5], &[6]], &[&[-4, -2]]),
        (&[&[0, 1, 4], &[2, 5], &[3, 6]], &[&[-4, -1]]),
        (
            &[&[0, 4], &[1, 5], &[2, 6]],
            &[&[-4], &[-4, 1], &[-4, 2], &[-4, 3], &[-4, 4], &[-4, 5], &[4], &[4, 5]],
        ),
        (&[&[0, 2, 3], &[1, 4], &[5]], &[&[-3, -2]]),
        (&[&[0, 1, 3], &[2, 4], &[5]], &[&[-3, -1]]),
        (
            &[&[0, 3], &[1, 4], &[2, 5]],
            &[
                &[-3],
                &[-3, 1],
                &[-3, 2],
                &[-3, 3],
                &[-3, 4],
                &[-3, 5],
                &[3],
                &[3, 4],
                &[3, 5],
            ],
        ),
        (&[&[0, 1, 2], &[3], &[4]], &[&[-2, -1]]),
        (
            &[&[0, 2], &[1, 3], &[4]],
            &[
                &[-2],
                &[-2, 1],
                &[-2, 2],
                &[-2, 3],
                &[-2, 4],
                &[-2, 5],
                &[2],
                &[2, 3],
                &[2, 4],
                &[2, 5],
            ],
        ),
        (
            &[&[0, 1], &[2], &[3]],
            &[
                &[-1],
                &[-1, 1],
                &[-1, 2],
                &[-1, 3],
                &[-1, 4],
                &[-1, 5],
                &[1],
                &[1, 2],
                &[1, 3],
                &[1, 4],
                &[1, 5],
            ],
        ),
    ];
    entries
        .iter()
        .map(|(fp, offsets)| {
            (
                fp.iter().map(|bin| bin.to_vec()).collect(),
                offsets.iter().map(|o| o.to_vec()).collect(),
            )
        })
        .collect()
});

/// Appends one shifted copy of the first operand per offset.
fn add_shifted_operands(candidate: &FunctionalCandidate, offsets: &[i32], gnd: NetId) -> FunctionalCandidate {
    let mut c = candidate.clone();
    let Some(base) = candidate.operands.first() else {
        return c;
    };
    for offset in offsets {
        let shift = offset.unsigned_abs() as usize;
        if *offset < 0 {
            if shift < base.len() {
                c.operands.push(base[shift..].to_vec());
            }
        } else {
            let mut op = vec![gnd; shift];
            op.extend(base.iter().copied());
            c.operands.push(op);
        }
    }
    c
}

fn join(offsets: &[i32]) -> String {
    offsets
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Bit positions within `operand` of the nets in the three most influential
/// input bins, or `None` if a bin net is not part of the operand.
fn fingerprint(
    ctx: &mut CandidateContext<'_>,
    candidate: &FunctionalCandidate,
    operand: &[NetId],
) -> Result<Option<Fingerprint>, ModIdError> {
    let mut influenced: BTreeMap<NetId, usize> = BTreeMap::new();
    if candidate.output_nets.len() > 1 {
        for out in &candidate.output_nets {
            for input in ctx.variables(*out, &candidate.control_mapping)? {
                *influenced.entry(input).or_default() += 1;
            }
        }
    }
    let mut bins: BTreeMap<usize, Vec<NetId>> = BTreeMap::new();
    for (input, count) in influenced {
        bins.entry(count).or_default().push(input);
    }
    if bins.len() < 3 {
        return Ok(None);
    }
    let mut result = Vec::with_capacity(3);
    for nets in bins.values().rev().take(3) {
        let mut indices = Vec::with_capacity(nets.len());
        for net in nets {
            match operand.iter().position(|n| n == net) {
                Some(idx) => indices.push(idx),
                None => return Ok(None),
            }
        }
        indices.sort_unstable();
        result.push(indices);
    }
    Ok(Some(result))
}

pub fn add_shifted_operand(
    candidate: &FunctionalCandidate,
    ctx: &mut CandidateContext<'_>,
    _env: &StageEnv<'_>,
) -> StageResult {
    let Some(operand) = candidate.operands.first().cloned() else {
        return Ok(Vec::new());
    };
    let Some(fp) = fingerprint(ctx, candidate, &operand)? else {
        return Ok(Vec::new());
    };
    let Some(library_offsets) = FINGERPRINTS.get(&fp) else {
        log::trace!("no shift pattern for fingerprint {:?}", fp);
        return Ok(Vec::new());
    };

    let gnd = ctx.gnd()?;
    let mut result = Vec::new();
    for offsets in library_offsets {
        let mut c = add_shifted_operands(candidate, offsets, gnd);
        c.add_additional_data(OPERAND_SHIFTS_KEY, join(offsets));
        result.push(c.clone());

        // Low output bits below a left shift are plain copies of the input.
        if !c.single_input_to_output.is_empty() {
            let upper = offsets.last().copied().unwrap_or(0).max(0) as usize;
            for idx in 0..upper.min(operand.len()) {
                let net = operand[idx];
                let out = c.single_input_to_output.get(&net).copied().unwrap_or(net);
                let at = idx.min(c.output_nets.len());
                c.output_nets.insert(at, out);
            }
            result.push(c);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_library_is_complete() {
        assert_eq!(FINGERPRINTS.len(), 15);
        let by_one = &FINGERPRINTS[&vec![vec![0, 1], vec![2], vec![3]]];
        assert_eq!(by_one[0], vec![-1]);
        assert_eq!(by_one.len(), 11);
    }

    #[test]
    fn test_shifted_operands() {
        let mut netlist = crate::netlist::Netlist::new("t", crate::netlist::GateLibrary::ice40());
        let ids: Vec<NetId> = (0..4).map(|i| netlist.create_net(&format!("i{i}"))).collect();
        let gnd = netlist.create_net("gnd");
        let ctx = CandidateContext::new(&netlist, &[], 1, 64);
        let mut c = FunctionalCandidate::new(&ctx, crate::candidates::CandidateType::ConstantMultiplication, 0);
        c.operands = vec![ids.clone()];
        let got = add_shifted_operands(&c, &[-1, 2, -4], gnd);
        assert_eq!(got.operands.len(), 3);
        assert_eq!(got.operands[1], ids[1..].to_vec());
        assert_eq!(got.operands[2], vec![gnd, gnd, ids[0], ids[1], ids[2], ids[3]]);
        assert_eq!(join(&[-5, 3]), "-5, 3");
    }
}
