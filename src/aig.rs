// SPDX-License-Identifier: Apache-2.0

//! Structurally hashed And-inverter graph used to represent the boolean
//! function of netlist nets.
//!
//! Nodes are appended in topological order: an `And2` node only refers to
//! nodes with a smaller id. Node 0 is the constant `false` literal, the
//! constant `true` is its negation.

use std::collections::BTreeSet;

use ahash::AHashMap;

use crate::netlist::NetId;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct AigRef {
    pub id: usize,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct AigOperand {
    pub node: AigRef,
    pub negated: bool,
}

impl AigOperand {
    #[must_use]
    pub fn negate(&self) -> Self {
        Self {
            node: self.node,
            negated: !self.negated,
        }
    }

    pub fn is_const(&self) -> bool {
        self.node.id == 0
    }

    /// The constant value, if this operand is a literal.
    pub fn const_value(&self) -> Option<bool> {
        if self.is_const() {
            Some(self.negated)
        } else {
            None
        }
    }
}

impl From<AigRef> for AigOperand {
    fn from(node: AigRef) -> Self {
        AigOperand {
            node,
            negated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AigNode {
    Input(NetId),
    Literal(bool),
    And2 { a: AigOperand, b: AigOperand },
}

/// LSB-first bit vector of operands.
pub type Bits = Vec<AigOperand>;

#[derive(Debug, Clone)]
pub struct Aig {
    nodes: Vec<AigNode>,
    strash: AHashMap<(AigOperand, AigOperand), AigRef>,
    inputs: AHashMap<NetId, AigRef>,
}

impl Default for Aig {
    fn default() -> Self {
        Self::new()
    }
}

impl Aig {
    pub fn new() -> Self {
        Aig {
            nodes: vec![AigNode::Literal(false)],
            strash: AHashMap::new(),
            inputs: AHashMap::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, r: AigRef) -> &AigNode {
        &self.nodes[r.id]
    }

    pub fn lit(&self, value: bool) -> AigOperand {
        AigOperand {
            node: AigRef { id: 0 },
            negated: value,
        }
    }

    pub fn input(&mut self, net: NetId) -> AigOperand {
        if let Some(r) = self.inputs.get(&net) {
            return (*r).into();
        }
        let r = AigRef {
            id: self.nodes.len(),
        };
        self.nodes.push(AigNode::Input(net));
        self.inputs.insert(net, r);
        r.into()
    }

    pub fn and(&mut self, a: AigOperand, b: AigOperand) -> AigOperand {
        match (a.const_value(), b.const_value()) {
            (Some(false), _) | (_, Some(false)) => return self.lit(false),
            (Some(true), _) => return b,
            (_, Some(true)) => return a,
            _ => {}
        }
        if a == b {
            return a;
        }
        if a == b.negate() {
            return self.lit(false);
        }
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(r) = self.strash.get(&key) {
            return (*r).into();
        }
        let r = AigRef {
            id: self.nodes.len(),
        };
        self.nodes.push(AigNode::And2 { a: key.0, b: key.1 });
        self.strash.insert(key, r);
        r.into()
    }

    pub fn or(&mut self, a: AigOperand, b: AigOperand) -> AigOperand {
        self.and(a.negate(), b.negate()).negate()
    }

    pub fn xor(&mut self, a: AigOperand, b: AigOperand) -> AigOperand {
        let l = self.and(a, b.negate());
        let r = self.and(a.negate(), b);
        self.or(l, r)
    }

    pub fn xnor(&mut self, a: AigOperand, b: AigOperand) -> AigOperand {
        self.xor(a, b).negate()
    }

    /// `sel ? t : f`
    pub fn mux(&mut self, sel: AigOperand, t: AigOperand, f: AigOperand) -> AigOperand {
        let l = self.and(sel, t);
        let r = self.and(sel.negate(), f);
        self.or(l, r)
    }

    pub fn and_all(&mut self, ops: &[AigOperand]) -> AigOperand {
        ops.iter().fold(self.lit(true), |acc, o| self.and(acc, *o))
    }

    pub fn or_all(&mut self, ops: &[AigOperand]) -> AigOperand {
        ops.iter().fold(self.lit(false), |acc, o| self.or(acc, *o))
    }

    /// Node ids of the transitive fan-in of `roots`, ascending.
    fn cone(&self, roots: &[AigOperand]) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = roots.iter().map(|r| r.node.id).collect();
        let mut cone = Vec::new();
        while let Some(id) = stack.pop() {
            if seen[id] {
                continue;
            }
            seen[id] = true;
            cone.push(id);
            if let AigNode::And2 { a, b } = &self.nodes[id] {
                stack.push(a.node.id);
                stack.push(b.node.id);
            }
        }
        cone.sort_unstable();
        cone
    }

    /// Free variables of `roots`.
    pub fn support(&self, roots: &[AigOperand]) -> BTreeSet<NetId> {
        self.cone(roots)
            .into_iter()
            .filter_map(|id| match &self.nodes[id] {
                AigNode::Input(net) => Some(*net),
                _ => None,
            })
            .collect()
    }

    /// Bit-parallel evaluation: each bit position of the returned words is
    /// an independent assignment drawn from `assign`.
    pub fn eval64(&self, roots: &[AigOperand], assign: &dyn Fn(NetId) -> u64) -> Vec<u64> {
        let mut values: AHashMap<usize, u64> = AHashMap::new();
        for id in self.cone(roots) {
            let v = match &self.nodes[id] {
                AigNode::Literal(b) => {
                    if *b {
                        u64::MAX
                    } else {
                        0
                    }
                }
                AigNode::Input(net) => assign(*net),
                AigNode::And2 { a, b } => {
                    let va = operand_value(&values, *a);
                    let vb = operand_value(&values, *b);
                    va & vb
                }
            };
            values.insert(id, v);
        }
        roots.iter().map(|r| operand_value(&values, *r)).collect()
    }

    pub fn eval(&self, roots: &[AigOperand], assign: &dyn Fn(NetId) -> bool) -> Vec<bool> {
        self.eval64(roots, &|n| if assign(n) { u64::MAX } else { 0 })
            .into_iter()
            .map(|w| w & 1 == 1)
            .collect()
    }

    /// Rebuilds `roots` with every input for which `replace` returns an
    /// operand substituted by it.
    pub fn substitute(
        &mut self,
        roots: &[AigOperand],
        replace: &dyn Fn(NetId) -> Option<AigOperand>,
    ) -> Vec<AigOperand> {
        let mut mapped: AHashMap<usize, AigOperand> = AHashMap::new();
        for id in self.cone(roots) {
            let new = match self.nodes[id].clone() {
                AigNode::Literal(_) => self.lit(false),
                AigNode::Input(net) => {
                    replace(net).unwrap_or(AigRef { id }.into())
                }
                AigNode::And2 { a, b } => {
                    let na = remap(&mapped, a);
                    let nb = remap(&mapped, b);
                    self.and(na, nb)
                }
            };
            mapped.insert(id, new);
        }
        roots.iter().map(|r| remap(&mapped, *r)).collect()
    }

    /// Substitutes constants for the given nets.
    pub fn restrict(
        &mut self,
        roots: &[AigOperand],
        fixed: &std::collections::BTreeMap<NetId, bool>,
    ) -> Vec<AigOperand> {
        if fixed.is_empty() {
            return roots.to_vec();
        }
        let t = self.lit(true);
        let f = self.lit(false);
        self.substitute(roots, &|net| {
            fixed.get(&net).map(|v| if *v { t } else { f })
        })
    }
}

fn operand_value(values: &AHashMap<usize, u64>, op: AigOperand) -> u64 {
    let v = values.get(&op.node.id).copied().unwrap_or(0);
    if op.negated { !v } else { v }
}

fn remap(mapped: &AHashMap<usize, AigOperand>, op: AigOperand) -> AigOperand {
    let base = mapped.get(&op.node.id).copied().unwrap_or(op);
    if op.negated { base.negate() } else { base }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_and_folds_constants_and_duplicates() {
        let mut aig = Aig::new();
        let a = aig.input(NetId(1));
        let t = aig.lit(true);
        assert_eq!(aig.and(a, t), a);
        assert_eq!(aig.and(a, a.negate()), aig.lit(false));
        let b = aig.input(NetId(2));
        let x = aig.and(a, b);
        let before = aig.node_count();
        assert_eq!(aig.and(b, a), x);
        assert_eq!(aig.node_count(), before);
    }

    #[test]
    fn test_xor_eval64_lanes() {
        let mut aig = Aig::new();
        let a = aig.input(NetId(0));
        let b = aig.input(NetId(1));
        let x = aig.xor(a, b);
        let got = aig.eval64(&[x], &|n| {
            if n == NetId(0) { 0b1100 } else { 0b1010 }
        });
        assert_eq!(got[0] & 0xf, 0b0110);
    }

    #[test]
    fn test_restrict_and_support() {
        let mut aig = Aig::new();
        let a = aig.input(NetId(0));
        let b = aig.input(NetId(1));
        let c = aig.input(NetId(2));
        let m = aig.mux(a, b, c);
        assert_eq!(aig.support(&[m]).len(), 3);
        let fixed = BTreeMap::from([(NetId(0), true)]);
        let r = aig.restrict(&[m], &fixed);
        assert_eq!(r[0], b);
        assert_eq!(aig.support(&r), BTreeSet::from([NetId(1)]));
    }
}
