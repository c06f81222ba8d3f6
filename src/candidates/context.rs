// SPDX-License-Identifier: Apache-2.0

//! Per structural candidate memoization of net functions, their free
//! variables and per-variable influence, keyed by (net, control mapping).

use std::collections::{BTreeMap, BTreeSet};

use ahash::{AHashMap, AHashSet};
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::aig::{Aig, AigOperand};
use crate::candidates::CtrlMapping;
use crate::error::ModIdError;
use crate::netlist::connectivity;
use crate::netlist::{GateId, GateTypeProperty, NetId, Netlist, PinFunction};

type Key = (NetId, CtrlMapping);

pub struct CandidateContext<'nl> {
    netlist: &'nl Netlist,
    gates: Vec<GateId>,
    gate_set: AHashSet<GateId>,
    seed: u64,
    influence_samples: usize,
    aig: Aig,
    /// Unrestricted subgraph function of each net.
    base_functions: AHashMap<NetId, AigOperand>,
    functions: AHashMap<Key, AigOperand>,
    variables: AHashMap<Key, BTreeSet<NetId>>,
    influences: AHashMap<Key, Vec<(NetId, f64)>>,
}

impl<'nl> CandidateContext<'nl> {
    pub fn new(netlist: &'nl Netlist, gates: &[GateId], seed: u64, influence_samples: usize) -> Self {
        CandidateContext {
            netlist,
            gates: gates.to_vec(),
            gate_set: gates.iter().copied().collect(),
            seed,
            influence_samples,
            aig: Aig::new(),
            base_functions: AHashMap::new(),
            functions: AHashMap::new(),
            variables: AHashMap::new(),
            influences: AHashMap::new(),
        }
    }

    pub fn netlist(&self) -> &'nl Netlist {
        self.netlist
    }

    pub fn gates(&self) -> &[GateId] {
        &self.gates
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn aig(&self) -> &Aig {
        &self.aig
    }

    pub fn aig_mut(&mut self) -> &mut Aig {
        &mut self.aig
    }

    pub fn gnd(&self) -> Result<NetId, ModIdError> {
        self.netlist
            .gnd_net()
            .ok_or_else(|| ModIdError::UnknownNet("ground".to_string()))
    }

    pub fn vcc(&self) -> Result<NetId, ModIdError> {
        self.netlist
            .vcc_net()
            .ok_or_else(|| ModIdError::UnknownNet("power".to_string()))
    }

    /// Nets entering the candidate's gate set.
    pub fn input_nets(&self) -> Vec<NetId> {
        connectivity::input_nets(self.netlist, &self.gates)
    }

    /// Nets leaving the candidate's gate set.
    pub fn output_nets(&self, only_external: bool) -> Vec<NetId> {
        connectivity::output_nets(self.netlist, &self.gates, only_external)
    }

    /// Boolean function of `net` over the inputs of the gate set, with the
    /// control signals in `ctrl` fixed to constants.
    pub fn function(&mut self, net: NetId, ctrl: &CtrlMapping) -> Result<AigOperand, ModIdError> {
        let key = (net, ctrl.clone());
        if let Some(f) = self.functions.get(&key) {
            return Ok(*f);
        }
        let mut in_progress = AHashSet::new();
        let base = self.base_function(net, &mut in_progress)?;
        let f = self.aig.restrict(&[base], ctrl)[0];
        self.functions.insert(key, f);
        Ok(f)
    }

    pub fn functions(&mut self, nets: &[NetId], ctrl: &CtrlMapping) -> Result<Vec<AigOperand>, ModIdError> {
        nets.iter().map(|n| self.function(*n, ctrl)).collect()
    }

    /// Free variables of the function of `net` under `ctrl`.
    pub fn variables(&mut self, net: NetId, ctrl: &CtrlMapping) -> Result<BTreeSet<NetId>, ModIdError> {
        let key = (net, ctrl.clone());
        if let Some(v) = self.variables.get(&key) {
            return Ok(v.clone());
        }
        let f = self.function(net, ctrl)?;
        let vars = self.aig.support(&[f]);
        self.variables.insert(key, vars.clone());
        Ok(vars)
    }

    /// Number of inputs of the unrestricted function of `net`.
    pub fn subgraph_input_count(&mut self, net: NetId) -> Result<usize, ModIdError> {
        Ok(self.variables(net, &CtrlMapping::new())?.len())
    }

    /// Estimated probability, per free variable, that flipping it flips the
    /// function value. Ordered by net id.
    pub fn influence(&mut self, net: NetId, ctrl: &CtrlMapping) -> Result<Vec<(NetId, f64)>, ModIdError> {
        let key = (net, ctrl.clone());
        if let Some(v) = self.influences.get(&key) {
            return Ok(v.clone());
        }
        let f = self.function(net, ctrl)?;
        let vars: Vec<NetId> = self.aig.support(&[f]).into_iter().collect();
        let words = self.influence_samples.div_ceil(64).max(1);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed ^ (net.0 as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let samples: Vec<BTreeMap<NetId, u64>> = (0..words)
            .map(|_| vars.iter().map(|v| (*v, rng.next_u64())).collect())
            .collect();
        let mut result = Vec::with_capacity(vars.len());
        for var in &vars {
            let mut flips = 0u32;
            for sample in &samples {
                let low = self.aig.eval64(&[f], &|n| if n == *var { 0 } else { sample[&n] })[0];
                let high = self.aig.eval64(&[f], &|n| if n == *var { u64::MAX } else { sample[&n] })[0];
                flips += (low ^ high).count_ones();
            }
            result.push((*var, flips as f64 / (words * 64) as f64));
        }
        self.influences.insert(key, result.clone());
        Ok(result)
    }

    /// Evaluates the function of `net` under `ctrl` for one assignment.
    /// Variables missing from `assignment` are taken as zero.
    pub fn evaluate(
        &mut self,
        net: NetId,
        ctrl: &CtrlMapping,
        assignment: &BTreeMap<NetId, bool>,
    ) -> Result<bool, ModIdError> {
        let f = self.function(net, ctrl)?;
        Ok(self.aig.eval(&[f], &|n| assignment.get(&n).copied().unwrap_or(false))[0])
    }

    fn base_function(
        &mut self,
        net: NetId,
        in_progress: &mut AHashSet<NetId>,
    ) -> Result<AigOperand, ModIdError> {
        if let Some(f) = self.base_functions.get(&net) {
            return Ok(*f);
        }
        if self.netlist.is_gnd_net(net) {
            return Ok(self.aig.lit(false));
        }
        if self.netlist.is_vcc_net(net) {
            return Ok(self.aig.lit(true));
        }
        let driver = self
            .netlist
            .net(net)
            .sources
            .iter()
            .find(|s| self.gate_set.contains(&s.gate))
            .cloned();
        let f = match driver {
            Some(src)
                if self
                    .netlist
                    .has_property(src.gate, GateTypeProperty::Combinational) =>
            {
                if !in_progress.insert(net) {
                    return Err(ModIdError::Expression(format!(
                        "combinational loop through net {}",
                        self.netlist.net(net).name
                    )));
                }
                let gate = self.netlist.gate(src.gate);
                let function = gate.functions.get(&src.pin).cloned().ok_or_else(|| {
                    ModIdError::Expression(format!(
                        "gate {} has no function for pin {}",
                        gate.name, src.pin
                    ))
                })?;
                let f = self.pin_function(src.gate, &function, in_progress)?;
                in_progress.remove(&net);
                f
            }
            _ => self.aig.input(net),
        };
        self.base_functions.insert(net, f);
        Ok(f)
    }

    fn pin_function(
        &mut self,
        gate: GateId,
        function: &PinFunction,
        in_progress: &mut AHashSet<NetId>,
    ) -> Result<AigOperand, ModIdError> {
        let f = match function {
            PinFunction::Const(v) => self.aig.lit(*v),
            PinFunction::Pin(pin) => self.pin_value(gate, pin, in_progress)?,
            PinFunction::Not(inner) => self.pin_function(gate, inner, in_progress)?.negate(),
            PinFunction::And(fs) => {
                let mut acc = self.aig.lit(true);
                for f in fs {
                    let v = self.pin_function(gate, f, in_progress)?;
                    acc = self.aig.and(acc, v);
                }
                acc
            }
            PinFunction::Or(fs) => {
                let mut acc = self.aig.lit(false);
                for f in fs {
                    let v = self.pin_function(gate, f, in_progress)?;
                    acc = self.aig.or(acc, v);
                }
                acc
            }
            PinFunction::Xor(fs) => {
                let mut acc = self.aig.lit(false);
                for f in fs {
                    let v = self.pin_function(gate, f, in_progress)?;
                    acc = self.aig.xor(acc, v);
                }
                acc
            }
            PinFunction::Lut { inputs, init } => {
                let mut values = Vec::with_capacity(inputs.len());
                for pin in inputs {
                    values.push(self.pin_value(gate, pin, in_progress)?);
                }
                self.lut(&values, *init, 0)
            }
        };
        Ok(f)
    }

    fn pin_value(
        &mut self,
        gate: GateId,
        pin: &str,
        in_progress: &mut AHashSet<NetId>,
    ) -> Result<AigOperand, ModIdError> {
        match connectivity::fan_in_net(self.netlist, gate, pin) {
            Some(net) => self.base_function(net, in_progress),
            None => {
                log::trace!(
                    "unconnected pin {} of gate {} read as zero",
                    pin,
                    self.netlist.gate(gate).name
                );
                Ok(self.aig.lit(false))
            }
        }
    }

    /// Shannon expansion of a truth table over `inputs`, splitting on the
    /// highest input first.
    fn lut(&mut self, inputs: &[AigOperand], init: u64, offset: usize) -> AigOperand {
        match inputs.split_last() {
            None => self.aig.lit(offset < 64 && (init >> offset) & 1 == 1),
            Some((msb, rest)) => {
                let half = 1usize << rest.len();
                let lo = self.lut(rest, init, offset);
                let hi = self.lut(rest, init, offset + half);
                self.aig.mux(*msb, hi, lo)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_ice40_ripple_adder;

    #[test]
    fn test_sum_bit_depends_on_lower_operand_bits() {
        let adder = build_ice40_ripple_adder(4);
        let mut gates = adder.carries.clone();
        gates.extend(adder.luts.iter().copied());
        let mut ctx = CandidateContext::new(&adder.netlist, &gates, 1, 256);
        let vars = ctx.variables(adder.sum[2], &CtrlMapping::new()).unwrap();
        let want: BTreeSet<NetId> = adder.a[..3]
            .iter()
            .chain(adder.b[..3].iter())
            .copied()
            .collect();
        assert_eq!(vars, want);
    }

    #[test]
    fn test_evaluate_adds() {
        let adder = build_ice40_ripple_adder(4);
        let mut gates = adder.carries.clone();
        gates.extend(adder.luts.iter().copied());
        let mut ctx = CandidateContext::new(&adder.netlist, &gates, 1, 256);
        // 3 + 1 = 4 -> sum bit 2 set.
        let assignment: BTreeMap<NetId, bool> = [
            (adder.a[0], true),
            (adder.a[1], true),
            (adder.b[0], true),
        ]
        .into_iter()
        .collect();
        let bits: Vec<bool> = adder
            .sum
            .iter()
            .map(|s| ctx.evaluate(*s, &CtrlMapping::new(), &assignment).unwrap())
            .collect();
        assert_eq!(bits, vec![false, false, true, false]);
    }

    #[test]
    fn test_influence_of_sum_lsb_is_one() {
        let adder = build_ice40_ripple_adder(2);
        let mut gates = adder.carries.clone();
        gates.extend(adder.luts.iter().copied());
        let mut ctx = CandidateContext::new(&adder.netlist, &gates, 7, 128);
        let inf = ctx.influence(adder.sum[0], &CtrlMapping::new()).unwrap();
        assert_eq!(inf.len(), 2);
        for (_, v) in inf {
            assert_eq!(v, 1.0);
        }
    }

    #[test]
    fn test_control_mapping_removes_variable() {
        let adder = build_ice40_ripple_adder(2);
        let mut gates = adder.carries.clone();
        gates.extend(adder.luts.iter().copied());
        let mut ctx = CandidateContext::new(&adder.netlist, &gates, 7, 128);
        // b0 = 0 kills the carry into bit 1, so a0 leaves the support too.
        let ctrl: CtrlMapping = [(adder.b[0], false)].into_iter().collect();
        let vars = ctx.variables(adder.sum[1], &ctrl).unwrap();
        assert!(!vars.contains(&adder.b[0]));
        assert!(!vars.contains(&adder.a[0]));
        assert!(vars.contains(&adder.a[1]));
        assert!(vars.contains(&adder.b[1]));

        // b0 = 1 propagates a0 as the carry.
        let ctrl: CtrlMapping = [(adder.b[0], true)].into_iter().collect();
        let vars = ctx.variables(adder.sum[1], &ctrl).unwrap();
        assert!(!vars.contains(&adder.b[0]));
        assert!(vars.contains(&adder.a[0]));
    }
}
