// SPDX-License-Identifier: Apache-2.0

//! Satisfiability queries over AIG cones using varisat.
//!
//! Every query encodes the relevant cone into a fresh solver, so queries
//! are independent of each other and may run on any thread.

use std::collections::{BTreeMap, HashSet};

use ahash::AHashMap;
use varisat::{ExtendFormula, Lit};

use crate::aig::{Aig, AigNode, AigOperand, AigRef};
use crate::netlist::NetId;

#[derive(Debug)]
pub enum SatError {
    SolverError(varisat::solver::SolverError),
    /// The two sides of an equivalence query have different bit widths.
    WidthMismatch { lhs: usize, rhs: usize },
}

impl std::fmt::Display for SatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for SatError {}

// Tseitin clauses for: output <=> a AND b
fn add_tseitsin_and(solver: &mut impl ExtendFormula, a: Lit, b: Lit, output: Lit) {
    solver.add_clause(&[!a, !b, output]);
    solver.add_clause(&[a, !output]);
    solver.add_clause(&[b, !output]);
}

// Tseitin clauses for: output <=> a XOR b
fn add_tseitsin_xor(solver: &mut impl ExtendFormula, a: Lit, b: Lit, output: Lit) {
    solver.add_clause(&[!a, !b, !output]);
    solver.add_clause(&[a, b, !output]);
    solver.add_clause(&[a, !b, output]);
    solver.add_clause(&[!a, b, output]);
}

struct Encoder<'a, 's> {
    aig: &'a Aig,
    solver: varisat::Solver<'s>,
    node_lits: AHashMap<usize, Lit>,
    input_lits: BTreeMap<NetId, Lit>,
}

impl<'a, 's> Encoder<'a, 's> {
    fn new(aig: &'a Aig) -> Self {
        Encoder {
            aig,
            solver: varisat::Solver::new(),
            node_lits: AHashMap::new(),
            input_lits: BTreeMap::new(),
        }
    }

    /// Returns the literal of `op`, encoding its cone on first use.
    fn encode(&mut self, op: AigOperand) -> Lit {
        let mut stack = vec![(op.node.id, false)];
        while let Some((id, expanded)) = stack.pop() {
            if self.node_lits.contains_key(&id) {
                continue;
            }
            let aig = self.aig;
            let node = aig.node(AigRef { id });
            match node {
                AigNode::Literal(value) => {
                    let lit = self.solver.new_lit();
                    if *value {
                        self.solver.add_clause(&[lit]);
                    } else {
                        self.solver.add_clause(&[!lit]);
                    }
                    self.node_lits.insert(id, lit);
                }
                AigNode::Input(net) => {
                    let lit = self.solver.new_lit();
                    self.input_lits.insert(*net, lit);
                    self.node_lits.insert(id, lit);
                }
                AigNode::And2 { a, b } => {
                    if expanded {
                        let la = self.operand_lit(*a);
                        let lb = self.operand_lit(*b);
                        let lit = self.solver.new_lit();
                        add_tseitsin_and(&mut self.solver, la, lb, lit);
                        self.node_lits.insert(id, lit);
                    } else {
                        stack.push((id, true));
                        stack.push((a.node.id, false));
                        stack.push((b.node.id, false));
                    }
                }
            }
        }
        self.operand_lit(op)
    }

    fn operand_lit(&self, op: AigOperand) -> Lit {
        let lit = self.node_lits[&op.node.id];
        if op.negated { !lit } else { lit }
    }

    fn solve(&mut self, assumptions: &[Lit]) -> Result<Option<BTreeMap<NetId, bool>>, SatError> {
        self.solver.assume(assumptions);
        match self.solver.solve() {
            Ok(false) => Ok(None),
            Ok(true) => {
                let model: HashSet<Lit> = self
                    .solver
                    .model()
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                Ok(Some(
                    self.input_lits
                        .iter()
                        .map(|(net, lit)| (*net, model.contains(lit)))
                        .collect(),
                ))
            }
            Err(e) => Err(SatError::SolverError(e)),
        }
    }
}

/// Finds an input assignment for which every operand in `constraints` is
/// true. Returns `None` if there is none.
pub fn find_model(
    aig: &Aig,
    constraints: &[AigOperand],
) -> Result<Option<BTreeMap<NetId, bool>>, SatError> {
    let mut enc = Encoder::new(aig);
    let lits: Vec<Lit> = constraints.iter().map(|c| enc.encode(*c)).collect();
    enc.solve(&lits)
}

/// Checks whether the two bit vectors agree under all input assignments.
/// Returns a distinguishing assignment if they do not.
pub fn check_equivalence(
    aig: &Aig,
    lhs: &[AigOperand],
    rhs: &[AigOperand],
) -> Result<Option<BTreeMap<NetId, bool>>, SatError> {
    if lhs.len() != rhs.len() {
        return Err(SatError::WidthMismatch {
            lhs: lhs.len(),
            rhs: rhs.len(),
        });
    }
    let mut enc = Encoder::new(aig);
    let mut miters = Vec::with_capacity(lhs.len());
    for (l, r) in lhs.iter().zip(rhs.iter()) {
        let ll = enc.encode(*l);
        let lr = enc.encode(*r);
        let m = enc.solver.new_lit();
        add_tseitsin_xor(&mut enc.solver, ll, lr, m);
        miters.push(m);
    }
    // Fresh literal that stands for "outputs differ in some bit".
    let diff = enc.solver.new_lit();
    let mut clause = Vec::with_capacity(miters.len() + 1);
    clause.push(!diff);
    clause.extend(miters.iter().cloned());
    enc.solver.add_clause(&clause);
    enc.solve(&[diff])
}

pub fn is_equivalent(aig: &Aig, lhs: &[AigOperand], rhs: &[AigOperand]) -> Result<bool, SatError> {
    Ok(check_equivalence(aig, lhs, rhs)?.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_matches_xor_or_and() {
        let mut aig = Aig::new();
        let a = aig.input(NetId(0));
        let b = aig.input(NetId(1));
        let lhs = aig.or(a, b);
        // Built through xor so that hashing does not make both sides share
        // a node.
        let x = aig.xor(a, b);
        let ab = aig.and(a, b);
        let rhs = aig.or(x, ab);
        assert!(is_equivalent(&aig, &[lhs], &[rhs]).unwrap());
        assert!(!is_equivalent(&aig, &[lhs], &[x]).unwrap());
    }

    #[test]
    fn test_find_model_returns_witness() {
        let mut aig = Aig::new();
        let a = aig.input(NetId(3));
        let b = aig.input(NetId(4));
        let f = aig.and(a, b.negate());
        let model = find_model(&aig, &[f]).unwrap().unwrap();
        assert_eq!(model[&NetId(3)], true);
        assert_eq!(model[&NetId(4)], false);
        let contradiction = aig.and(f, b);
        assert!(find_model(&aig, &[contradiction]).unwrap().is_none());
    }
}
