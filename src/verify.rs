// SPDX-License-Identifier: Apache-2.0

//! Verification of realized functional candidates.
//!
//! For each candidate type a word-level expression over the operand nets is
//! proposed and compared against the observed output functions: first on
//! pseudo-random probe assignments, then, if all probes agree, by an exact
//! SAT equivalence query.

use std::collections::BTreeMap;
use std::time::Instant;

use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::aig::{Aig, AigOperand};
use crate::candidates::{
    BaseCandidate, CandidateContext, CandidateType, FunctionalCandidate, VerifiedCandidate,
};
use crate::error::ModIdError;
use crate::netlist::{NetId, Netlist, connectivity};
use crate::pipeline::StageEnv;
use crate::sat;
use crate::stats::{RunStats, TypeStats};
use crate::word::WordExpr;

pub const COUNTER_INCREMENT_KEY: &str = "COUNTER_INCREMENT";
pub const SUM_OPERATIONS_KEY: &str = "SUM_OPERATIONS";

/// Word of `nets`, LSB first, with ground and power nets as constant bits.
pub fn operand_expr(netlist: &Netlist, nets: &[NetId]) -> WordExpr {
    let mut parts: Vec<WordExpr> = nets
        .iter()
        .map(|n| {
            if netlist.is_gnd_net(*n) {
                WordExpr::Const(vec![false])
            } else if netlist.is_vcc_net(*n) {
                WordExpr::Const(vec![true])
            } else {
                WordExpr::Net(*n)
            }
        })
        .collect();
    if parts.len() == 1 {
        return parts.remove(0);
    }
    WordExpr::Concat(parts)
}

/// Compares `lhs` and `rhs` on `rounds` words of 64 random assignments.
fn probe(aig: &Aig, lhs: &[AigOperand], rhs: &[AigOperand], rounds: usize, seed: u64) -> bool {
    let mut support = aig.support(lhs);
    support.extend(aig.support(rhs));
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    for _ in 0..rounds.max(1) {
        let words: BTreeMap<NetId, u64> = support.iter().map(|n| (*n, rng.next_u64())).collect();
        let assign = |n: NetId| words.get(&n).copied().unwrap_or(0);
        if aig.eval64(lhs, &assign) != aig.eval64(rhs, &assign) {
            return false;
        }
    }
    true
}

struct Checker<'c, 'nl> {
    ctx: &'c mut CandidateContext<'nl>,
    observed: Vec<AigOperand>,
    rounds: usize,
    stats: &'c mut TypeStats,
}

impl<'nl> Checker<'_, 'nl> {
    /// Whether `expected` equals the low `expected.width()` observed
    /// output bits.
    fn matches_prefix(&mut self, expected: &WordExpr) -> Result<bool, ModIdError> {
        let width = expected.width();
        if width == 0 || width > self.observed.len() {
            return Ok(false);
        }
        let bits = expected.bitblast(self.ctx.aig_mut())?;
        let observed = &self.observed[..width];

        let start = Instant::now();
        let agrees = probe(self.ctx.aig(), observed, &bits, self.rounds, self.ctx.seed());
        self.stats.probe_time += start.elapsed();
        if !agrees {
            self.stats.probe_rejected += 1;
            return Ok(false);
        }

        let start = Instant::now();
        let equivalent = sat::is_equivalent(self.ctx.aig(), observed, &bits)?;
        self.stats.solver_time += start.elapsed();
        self.stats.solver_queries += 1;
        Ok(equivalent)
    }

    /// Whether `expected` explains every observed output bit.
    fn matches(&mut self, expected: &WordExpr) -> Result<bool, ModIdError> {
        if expected.width() != self.observed.len() {
            return Ok(false);
        }
        self.matches_prefix(expected)
    }

    /// Observed outputs with every input at zero.
    fn zero_response(&self) -> Vec<bool> {
        self.ctx.aig().eval(&self.observed, &|_| false)
    }

    fn netlist(&self) -> &'nl Netlist {
        self.ctx.netlist()
    }

    fn verified(
        &self,
        fc: &FunctionalCandidate,
        ty: CandidateType,
        operands: Vec<Vec<NetId>>,
        operation: WordExpr,
        additional: &[(&str, String)],
    ) -> VerifiedCandidate {
        let mut data = fc.additional_data.clone();
        for (k, v) in additional {
            data.insert(k.to_string(), v.clone());
        }
        VerifiedCandidate::new(
            ty,
            operands,
            fc.output_nets.clone(),
            fc.control_signals.clone(),
            fc.control_mapping.clone(),
            operation,
            self.ctx.gates().to_vec(),
            data,
        )
    }
}

fn sum_of(netlist: &Netlist, operands: &[Vec<NetId>]) -> Option<WordExpr> {
    let mut iter = operands.iter();
    let mut sum = operand_expr(netlist, iter.next()?);
    for op in iter {
        sum = sum.add(operand_expr(netlist, op));
    }
    Some(sum)
}

fn same_width(operands: &[Vec<NetId>], width: usize) -> bool {
    operands.iter().all(|op| op.len() == width)
}

fn check_add_sub(
    c: &mut Checker<'_, '_>,
    fc: &FunctionalCandidate,
    env: &StageEnv<'_>,
) -> Result<Option<VerifiedCandidate>, ModIdError> {
    let outputs = fc.output_nets.len();
    if fc.operands.len() < 2 || !same_width(&fc.operands, outputs) {
        return Ok(None);
    }
    let Some(mut sum) = sum_of(c.netlist(), &fc.operands) else {
        return Ok(None);
    };
    let offset = c.zero_response();
    if offset.iter().any(|b| *b) {
        sum = sum.add(WordExpr::from_bits(&offset));
    }
    if c.matches(&sum)? {
        return Ok(Some(c.verified(
            fc,
            CandidateType::Adder,
            fc.operands.clone(),
            sum,
            &[],
        )));
    }
    check_sub(c, fc, env)
}

/// Subtraction is verified bit position by bit position. When a position
/// fails, the operand bits one below it are swapped, since the bins cannot
/// tell minuend and subtrahend bits apart.
fn check_sub(
    c: &mut Checker<'_, '_>,
    fc: &FunctionalCandidate,
    env: &StageEnv<'_>,
) -> Result<Option<VerifiedCandidate>, ModIdError> {
    if fc.operands.len() != 2 {
        return Ok(None);
    }
    let outputs = fc.output_nets.len();
    let mut ops = fc.operands.clone();
    let difference = |nl: &Netlist, ops: &[Vec<NetId>], width: usize| {
        operand_expr(nl, &ops[0][..width]).sub(operand_expr(nl, &ops[1][..width]))
    };

    let mut found: Vec<VerifiedCandidate> = Vec::new();
    for pos in 1..outputs {
        let last = pos == outputs - 1;
        let expr = difference(c.netlist(), &ops, pos + 1);
        if c.matches_prefix(&expr)? {
            if !last {
                continue;
            }
            found.push(c.verified(fc, CandidateType::Subtraction, ops.clone(), expr, &[]));
        }

        let tmp = ops[0][pos - 1];
        ops[0][pos - 1] = ops[1][pos - 1];
        ops[1][pos - 1] = tmp;

        let expr = difference(c.netlist(), &ops, pos + 1);
        if c.matches_prefix(&expr)? {
            if !last {
                continue;
            }
            found.push(c.verified(fc, CandidateType::Subtraction, ops.clone(), expr, &[]));
        }
        if found.is_empty() {
            return Ok(None);
        }
        break;
    }

    // Prefer operands fed by more register groups.
    let netlist = c.netlist();
    let score = |vc: &VerifiedCandidate| -> usize {
        vc.operands
            .iter()
            .map(|op| connectivity::neighboring_registers_of(netlist, op, env.registers).len())
            .sum()
    };
    let best = found
        .iter()
        .enumerate()
        .max_by_key(|(idx, vc)| (score(vc), std::cmp::Reverse(*idx)))
        .map(|(idx, _)| idx);
    Ok(best.map(|idx| found.swap_remove(idx)))
}

fn check_counter(
    c: &mut Checker<'_, '_>,
    fc: &FunctionalCandidate,
) -> Result<Option<VerifiedCandidate>, ModIdError> {
    let Some(op) = fc.operands.first().filter(|op| !op.is_empty()) else {
        return Ok(None);
    };
    let outputs = fc.output_nets.len();
    let operand = operand_expr(c.netlist(), op);
    let width = operand.width();

    let increment_bits = c.zero_response();
    let msb = increment_bits.last().copied().unwrap_or(false);
    let mut extended = increment_bits.clone();
    extended.resize(width, msb);
    let increment = WordExpr::from_bits(&extended);

    let mut count = operand.clone().add(increment);
    if width > outputs {
        count = count.slice(width - outputs, outputs);
    }
    if c.matches(&count)? {
        let shown = WordExpr::from_bits(&increment_bits).to_string();
        return Ok(Some(c.verified(
            fc,
            CandidateType::Counter,
            fc.operands.clone(),
            count,
            &[(COUNTER_INCREMENT_KEY, shown)],
        )));
    }

    let negation = operand.neg();
    if c.matches(&negation)? {
        return Ok(Some(c.verified(
            fc,
            CandidateType::Negation,
            fc.operands.clone(),
            negation,
            &[],
        )));
    }
    Ok(None)
}

fn check_absolute(
    c: &mut Checker<'_, '_>,
    fc: &FunctionalCandidate,
) -> Result<Option<VerifiedCandidate>, ModIdError> {
    let Some(op) = fc.operands.first().filter(|op| !op.is_empty()) else {
        return Ok(None);
    };
    let operand = operand_expr(c.netlist(), op);
    let width = operand.width();
    let sign = operand.clone().slice(width - 1, 1);
    let absolute = WordExpr::ite(sign, operand.clone().neg(), operand);
    if c.matches(&absolute)? {
        return Ok(Some(c.verified(
            fc,
            CandidateType::Absolute,
            fc.operands.clone(),
            absolute,
            &[],
        )));
    }
    Ok(None)
}

fn check_constant_multiplication(
    c: &mut Checker<'_, '_>,
    fc: &FunctionalCandidate,
) -> Result<Option<VerifiedCandidate>, ModIdError> {
    let outputs = fc.output_nets.len();
    if fc.operands.len() < 2 || !same_width(&fc.operands, outputs) {
        return Ok(None);
    }
    let ty = CandidateType::ConstantMultiplication;
    let Some(sum) = sum_of(c.netlist(), &fc.operands) else {
        return Ok(None);
    };
    if c.matches(&sum)? {
        return Ok(Some(c.verified(fc, ty, fc.operands.clone(), sum, &[])));
    }
    if fc.operands.len() == 2 {
        let a = operand_expr(c.netlist(), &fc.operands[0]);
        let b = operand_expr(c.netlist(), &fc.operands[1]);
        for (expr, shown) in [
            (a.clone().sub(b.clone()), "[+, -]"),
            (b.sub(a), "[-, +]"),
        ] {
            if c.matches(&expr)? {
                return Ok(Some(c.verified(
                    fc,
                    ty,
                    fc.operands.clone(),
                    expr,
                    &[(SUM_OPERATIONS_KEY, shown.to_string())],
                )));
            }
        }
    }
    Ok(None)
}

/// Pairs the inputs of an equality by setting one unpaired input and
/// searching for the partner that makes the predicate true again.
fn equality_operands(
    ctx: &mut CandidateContext<'_>,
    fc: &FunctionalCandidate,
) -> Result<Option<Vec<Vec<NetId>>>, ModIdError> {
    let out = fc.output_nets[0];
    let inputs: Vec<NetId> = ctx.variables(out, &fc.control_mapping)?.into_iter().collect();
    let mut assignment: BTreeMap<NetId, bool> = inputs.iter().map(|n| (*n, false)).collect();
    let mut unused = inputs.clone();
    let (mut lhs, mut rhs) = (Vec::new(), Vec::new());
    for input in &inputs {
        let Some(pos) = unused.iter().position(|n| n == input) else {
            continue;
        };
        unused.remove(pos);
        lhs.push(*input);
        assignment.insert(*input, true);

        let mut partner = None;
        for (idx, candidate) in unused.iter().enumerate() {
            assignment.insert(*candidate, true);
            if ctx.evaluate(out, &fc.control_mapping, &assignment)? {
                partner = Some(idx);
                break;
            }
            assignment.insert(*candidate, false);
        }
        match partner {
            Some(idx) => rhs.push(unused.remove(idx)),
            None => return Ok(None),
        }
    }
    Ok(Some(vec![lhs, rhs]))
}

fn check_comparison(
    c: &mut Checker<'_, '_>,
    fc: &FunctionalCandidate,
) -> Result<Option<VerifiedCandidate>, ModIdError> {
    if fc.output_nets.len() != 1 {
        return Ok(None);
    }
    let operands = if fc.operands.len() == 2 {
        fc.operands.clone()
    } else {
        match equality_operands(c.ctx, fc)? {
            Some(ops) => ops,
            None => return Ok(None),
        }
    };
    if operands[0].is_empty() || operands[0].len() != operands[1].len() {
        return Ok(None);
    }
    let a = Box::new(operand_expr(c.netlist(), &operands[0]));
    let b = Box::new(operand_expr(c.netlist(), &operands[1]));
    let attempts = [
        (CandidateType::Equal, WordExpr::Eq(a.clone(), b.clone())),
        (CandidateType::LessThan, WordExpr::Ult(a.clone(), b.clone())),
        (CandidateType::LessEqual, WordExpr::Ule(a.clone(), b.clone())),
        (CandidateType::SignedLessThan, WordExpr::Slt(a.clone(), b.clone())),
        (CandidateType::SignedLessEqual, WordExpr::Sle(a, b)),
    ];
    for (ty, expr) in attempts {
        if c.matches(&expr)? {
            return Ok(Some(c.verified(fc, ty, operands, expr, &[])));
        }
    }
    Ok(None)
}

/// A value check holds for exactly one operand value: find a witness,
/// then prove no other operand value satisfies the predicate.
fn check_value_check(
    c: &mut Checker<'_, '_>,
    fc: &FunctionalCandidate,
) -> Result<Option<VerifiedCandidate>, ModIdError> {
    let Some(op) = fc.operands.first().filter(|op| !op.is_empty()) else {
        return Ok(None);
    };
    if c.observed.len() != 1 {
        return Ok(None);
    }
    let predicate = c.observed[0];

    let start = Instant::now();
    let witness = sat::find_model(c.ctx.aig(), &[predicate])?;
    c.stats.solver_queries += 1;
    let Some(model) = witness else {
        c.stats.solver_time += start.elapsed();
        return Ok(None);
    };
    let operand = operand_expr(c.netlist(), op);
    let value: Vec<bool> = op
        .iter()
        .map(|n| {
            if c.netlist().is_vcc_net(*n) {
                true
            } else {
                model.get(n).copied().unwrap_or(false)
            }
        })
        .collect();
    let check = WordExpr::Eq(Box::new(operand), Box::new(WordExpr::from_bits(&value)));
    let equal = check.bitblast(c.ctx.aig_mut())?;
    let other = sat::find_model(c.ctx.aig(), &[predicate, equal[0].negate()])?;
    c.stats.solver_queries += 1;
    c.stats.solver_time += start.elapsed();
    if other.is_some() {
        return Ok(None);
    }
    Ok(Some(c.verified(
        fc,
        CandidateType::ValueCheck,
        fc.operands.clone(),
        check,
        &[],
    )))
}

fn check(
    ctx: &mut CandidateContext<'_>,
    fc: &FunctionalCandidate,
    env: &StageEnv<'_>,
    stats: &mut TypeStats,
) -> Result<Option<VerifiedCandidate>, ModIdError> {
    if fc.output_nets.is_empty() {
        return Ok(None);
    }
    let observed = ctx.functions(&fc.output_nets, &fc.control_mapping)?;
    let mut c = Checker {
        ctx,
        observed,
        rounds: env.budget.probes_for(fc.candidate_type),
        stats,
    };
    match fc.candidate_type {
        CandidateType::Adder => check_add_sub(&mut c, fc, env),
        CandidateType::Counter => check_counter(&mut c, fc),
        CandidateType::Absolute => check_absolute(&mut c, fc),
        CandidateType::ConstantMultiplication => check_constant_multiplication(&mut c, fc),
        CandidateType::Equal | CandidateType::LessEqual => check_comparison(&mut c, fc),
        CandidateType::ValueCheck => check_value_check(&mut c, fc),
        other => {
            log::error!("no verification available for type {}", other);
            Ok(None)
        }
    }
}

/// Verifies one realized candidate of `base`. Failures are logged and
/// treated as a rejection.
pub fn verify(
    ctx: &mut CandidateContext<'_>,
    fc: &FunctionalCandidate,
    base: &BaseCandidate,
    env: &StageEnv<'_>,
    stats: &mut RunStats,
) -> Option<VerifiedCandidate> {
    let entry = stats.entry(fc.candidate_type);
    match check(ctx, fc, env, entry) {
        Ok(Some(mut vc)) => {
            entry.verified += 1;
            vc.base_gates = base.gates.clone();
            log::debug!("verified {} for base {}", vc.name(), base.id);
            Some(vc)
        }
        Ok(None) => None,
        Err(e) => {
            log::warn!(
                "verification of {} candidate for base {} failed: {}",
                fc.candidate_type,
                base.id,
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchBudget;
    use crate::netlist::GateId;
    use crate::test_utils::{
        build_comparator, build_equality_comparator, build_ice40_counter,
        build_ice40_ripple_adder, build_ice40_subtractor, build_lut_word,
        build_registered_subtractor,
    };
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn run(
        netlist: &Netlist,
        gates: &[GateId],
        ty: CandidateType,
        operands: Vec<Vec<NetId>>,
        outputs: Vec<NetId>,
    ) -> Option<VerifiedCandidate> {
        run_with_registers(netlist, gates, ty, operands, outputs, &[])
    }

    fn run_with_registers(
        netlist: &Netlist,
        gates: &[GateId],
        ty: CandidateType,
        operands: Vec<Vec<NetId>>,
        outputs: Vec<NetId>,
        registers: &[Vec<GateId>],
    ) -> Option<VerifiedCandidate> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut ctx = CandidateContext::new(netlist, gates, 5, 256);
        let budget = SearchBudget::default();
        let env = StageEnv {
            budget: &budget,
            registers,
        };
        let mut fc = FunctionalCandidate::new(&ctx, ty, 0);
        fc.operands = operands;
        fc.output_nets = outputs;
        let base = BaseCandidate {
            id: 0,
            gates: gates.to_vec(),
        };
        let mut stats = RunStats::default();
        verify(&mut ctx, &fc, &base, &env, &mut stats)
    }

    #[test]
    fn test_ripple_adder_verifies_as_adder() {
        let adder = build_ice40_ripple_adder(4);
        let gates = adder.gates();
        let vc = run(
            &adder.netlist,
            &gates,
            CandidateType::Adder,
            vec![adder.a.clone(), adder.b.clone()],
            adder.sum.clone(),
        )
        .expect("adder");
        assert_eq!(vc.primary_type(), CandidateType::Adder);
        assert_eq!(vc.operations.len(), 1);
        assert_eq!(vc.base_gates, gates);
    }

    #[test]
    fn test_wrong_operand_order_is_rejected() {
        let adder = build_ice40_ripple_adder(3);
        let gates = adder.gates();
        let mut a = adder.a.clone();
        a.reverse();
        assert!(run(
            &adder.netlist,
            &gates,
            CandidateType::Adder,
            vec![a, adder.b.clone()],
            adder.sum.clone(),
        )
        .is_none());
    }

    #[test]
    fn test_subtractor_falls_back_to_subtraction() {
        let sub = build_ice40_subtractor(4);
        let vc = run(
            &sub.netlist,
            &sub.gates,
            CandidateType::Adder,
            vec![sub.a.clone(), sub.b.clone()],
            sub.diff.clone(),
        )
        .expect("subtraction");
        assert_eq!(vc.primary_type(), CandidateType::Subtraction);
        assert_eq!(vc.operands, vec![sub.a.clone(), sub.b.clone()]);
    }

    #[test]
    fn test_registered_subtraction_keeps_register_operands() {
        let (sub, registers) = build_registered_subtractor(4);
        let vc = run_with_registers(
            &sub.netlist,
            &sub.gates,
            CandidateType::Adder,
            vec![sub.a.clone(), sub.b.clone()],
            sub.diff.clone(),
            &registers,
        )
        .expect("subtraction");
        assert_eq!(vc.primary_type(), CandidateType::Subtraction);
        assert_eq!(vc.operands, vec![sub.a.clone(), sub.b.clone()]);
        for (op, group) in vc.operands.iter().zip(0..) {
            let regs = connectivity::neighboring_registers_of(&sub.netlist, op, &registers);
            assert_eq!(regs.into_iter().collect::<Vec<_>>(), vec![group]);
        }
    }

    #[test]
    fn test_absolute_value() {
        let word = build_lut_word(3, 3, |x| if x & 4 != 0 { x.wrapping_neg() & 7 } else { x });
        let vc = run(
            &word.netlist,
            &word.gates,
            CandidateType::Absolute,
            vec![word.inputs.clone()],
            word.outputs.clone(),
        )
        .expect("absolute");
        assert_eq!(vc.primary_type(), CandidateType::Absolute);
        assert!(matches!(vc.operations[0].1, WordExpr::Ite { .. }));
    }

    #[test]
    fn test_absolute_rejects_identity() {
        let word = build_lut_word(3, 3, |x| x);
        assert!(run(
            &word.netlist,
            &word.gates,
            CandidateType::Absolute,
            vec![word.inputs.clone()],
            word.outputs.clone(),
        )
        .is_none());
    }

    #[test_case(|x| (3 * x) & 7, None ; "sum of shifted copies")]
    #[test_case(|x| x.wrapping_sub(2 * x) & 7, Some("[+, -]") ; "difference of shifted copies")]
    fn test_constant_multiplication(f: fn(u64) -> u64, sum_operations: Option<&str>) {
        let word = build_lut_word(3, 3, f);
        let x = &word.inputs;
        let shifted = vec![word.gnd, x[0], x[1]];
        let vc = run(
            &word.netlist,
            &word.gates,
            CandidateType::ConstantMultiplication,
            vec![x.clone(), shifted],
            word.outputs.clone(),
        )
        .expect("constant multiplication");
        assert_eq!(vc.primary_type(), CandidateType::ConstantMultiplication);
        assert_eq!(vc.additional_data.get(SUM_OPERATIONS_KEY).map(String::as_str), sum_operations);
    }

    #[test]
    fn test_constant_multiplication_rejects_wrong_shift() {
        let word = build_lut_word(3, 3, |x| (5 * x) & 7);
        let x = &word.inputs;
        assert!(run(
            &word.netlist,
            &word.gates,
            CandidateType::ConstantMultiplication,
            vec![x.clone(), vec![word.gnd, x[0], x[1]]],
            word.outputs.clone(),
        )
        .is_none());
    }

    #[test]
    fn test_counter_reports_increment() {
        let counter = build_ice40_counter(4);
        let vc = run(
            &counter.netlist,
            &counter.logic,
            CandidateType::Counter,
            vec![counter.q.clone()],
            counter.next.clone(),
        )
        .expect("counter");
        assert_eq!(vc.primary_type(), CandidateType::Counter);
        assert_eq!(vc.additional_data[COUNTER_INCREMENT_KEY], "4'd1");
    }

    #[test_case(false, CandidateType::LessEqual ; "unsigned")]
    #[test_case(true, CandidateType::SignedLessEqual ; "signed")]
    fn test_comparator_kind(signed: bool, want: CandidateType) {
        let cmp = build_comparator(3, signed);
        let vc = run(
            &cmp.netlist,
            &cmp.gates,
            CandidateType::LessEqual,
            vec![cmp.a.clone(), cmp.b.clone()],
            vec![cmp.out],
        )
        .expect("comparison");
        assert_eq!(vc.primary_type(), want);
    }

    #[test]
    fn test_equality_pairs_operands() {
        let cmp = build_equality_comparator(3);
        let vc = run(
            &cmp.netlist,
            &cmp.gates,
            CandidateType::Equal,
            Vec::new(),
            vec![cmp.out],
        )
        .expect("equality");
        assert_eq!(vc.primary_type(), CandidateType::Equal);
        assert_eq!(vc.operands, vec![cmp.a.clone(), cmp.b.clone()]);
    }

    #[test]
    fn test_value_check_needs_unique_witness() {
        let cmp = build_equality_comparator(2);
        // Equality of two free words holds for many assignments.
        let mut inputs = cmp.a.clone();
        inputs.extend(cmp.b.iter().copied());
        assert!(run(
            &cmp.netlist,
            &cmp.gates,
            CandidateType::ValueCheck,
            vec![inputs],
            vec![cmp.out],
        )
        .is_none());
    }

    #[test]
    fn test_value_check_on_and_of_inputs() {
        let adder = build_ice40_ripple_adder(1);
        // The carry out of a one-bit adder is a AND b: true only for 11.
        let vc = run(
            &adder.netlist,
            &adder.carries,
            CandidateType::ValueCheck,
            vec![vec![adder.a[0], adder.b[0]]],
            vec![adder.carry_out],
        )
        .expect("value check");
        assert_eq!(
            vc.operations[0].1,
            WordExpr::Eq(
                Box::new(WordExpr::nets(&[adder.a[0], adder.b[0]])),
                Box::new(WordExpr::from_bits(&[true, true]))
            )
        );
    }
}
