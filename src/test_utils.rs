// SPDX-License-Identifier: Apache-2.0

//! Small iCE40 and Xilinx netlists shared by unit and integration tests.

use crate::netlist::{GateId, GateLibrary, NetId, Netlist, PinFunction};

fn lut(nl: &mut Netlist, name: &str, inputs: &[NetId], init: u64, out: NetId) -> GateId {
    let g = nl.create_gate("SB_LUT4", name).unwrap();
    let pins = ["I0", "I1", "I2", "I3"];
    for (pin, net) in pins.iter().zip(inputs) {
        nl.connect_destination(*net, g, pin).unwrap();
    }
    nl.set_function(
        g,
        "O",
        PinFunction::Lut {
            inputs: pins.iter().map(|p| p.to_string()).collect(),
            init,
        },
    );
    nl.connect_source(out, g, "O").unwrap();
    g
}

fn carry(nl: &mut Netlist, name: &str, i0: NetId, i1: NetId, ci: NetId, co: NetId) -> GateId {
    let g = nl.create_gate("SB_CARRY", name).unwrap();
    nl.connect_destination(i0, g, "I0").unwrap();
    nl.connect_destination(i1, g, "I1").unwrap();
    nl.connect_destination(ci, g, "CI").unwrap();
    nl.connect_source(co, g, "CO").unwrap();
    g
}

fn inverter(nl: &mut Netlist, name: &str, input: NetId) -> (GateId, NetId) {
    let g = nl.create_gate("INV", name).unwrap();
    let out = nl.create_net(&format!("{name}_o"));
    nl.connect_destination(input, g, "I").unwrap();
    nl.connect_source(out, g, "O").unwrap();
    (g, out)
}

/// Paired operand nets `a_i`, `b_i`, created in bit order.
fn operand_pairs(nl: &mut Netlist, width: usize) -> (Vec<NetId>, Vec<NetId>) {
    let mut a = Vec::with_capacity(width);
    let mut b = Vec::with_capacity(width);
    for i in 0..width {
        a.push(nl.create_net(&format!("a_{i}")));
        b.push(nl.create_net(&format!("b_{i}")));
    }
    for n in a.iter().chain(b.iter()) {
        nl.mark_global_input(*n);
    }
    (a, b)
}

pub struct RippleAdder {
    pub netlist: Netlist,
    pub carries: Vec<GateId>,
    pub luts: Vec<GateId>,
    pub a: Vec<NetId>,
    pub b: Vec<NetId>,
    pub sum: Vec<NetId>,
    /// Carry out of the top bit; left without loads.
    pub carry_out: NetId,
}

impl RippleAdder {
    pub fn gates(&self) -> Vec<GateId> {
        let mut gates = self.carries.clone();
        gates.extend(self.luts.iter().copied());
        gates
    }
}

/// `sum = a + b` over `width` bits built from an `SB_CARRY` chain and one
/// XOR3 LUT per bit.
pub fn build_ice40_ripple_adder(width: usize) -> RippleAdder {
    let mut nl = Netlist::new("ripple_adder", GateLibrary::ice40());
    let gnd = nl.ensure_gnd_net().unwrap();
    let (a, b) = operand_pairs(&mut nl, width);
    let mut carries = Vec::new();
    let mut luts = Vec::new();
    let mut sum = Vec::new();
    let mut cin = gnd;
    for i in 0..width {
        let co = nl.create_net(&format!("c_{i}"));
        carries.push(carry(&mut nl, &format!("carry_{i}"), a[i], b[i], cin, co));
        let s = nl.create_net(&format!("sum_{i}"));
        luts.push(lut(&mut nl, &format!("lut_{i}"), &[a[i], b[i], cin], 0x96, s));
        nl.mark_global_output(s);
        sum.push(s);
        cin = co;
    }
    RippleAdder {
        netlist: nl,
        carries,
        luts,
        a,
        b,
        sum,
        carry_out: cin,
    }
}

/// `sum = a + b` over `width` bits on a `CARRY4` chain: one XOR `LUT2` per
/// bit drives `S(i)`, `a_i` drives `DI(i)`. Stages above `width` in the last
/// cell stay unconnected.
pub fn build_xilinx_adder(width: usize) -> RippleAdder {
    let mut nl = Netlist::new("carry4_adder", GateLibrary::xilinx_unisim());
    let gnd = nl.ensure_gnd_net().unwrap();
    let (a, b) = operand_pairs(&mut nl, width);
    let mut carries = Vec::new();
    let mut luts = Vec::new();
    let mut sum = Vec::new();
    let mut cin = gnd;
    for cell in 0..width.div_ceil(4) {
        let g = nl.create_gate("CARRY4", &format!("carry4_{cell}")).unwrap();
        nl.connect_destination(cin, g, "CI").unwrap();
        nl.connect_destination(gnd, g, "CYINIT").unwrap();
        for stage in 0..4 {
            let bit = cell * 4 + stage;
            if bit >= width {
                break;
            }
            let s = nl.create_net(&format!("s_{bit}"));
            let lut = nl.create_gate("LUT2", &format!("lut_{bit}")).unwrap();
            nl.connect_destination(a[bit], lut, "I0").unwrap();
            nl.connect_destination(b[bit], lut, "I1").unwrap();
            nl.set_function(
                lut,
                "O",
                PinFunction::Lut {
                    inputs: vec!["I0".into(), "I1".into()],
                    init: 0x6,
                },
            );
            nl.connect_source(s, lut, "O").unwrap();
            luts.push(lut);
            nl.connect_destination(s, g, &format!("S({stage})")).unwrap();
            nl.connect_destination(a[bit], g, &format!("DI({stage})")).unwrap();
            let o = nl.create_net(&format!("sum_{bit}"));
            nl.connect_source(o, g, &format!("O({stage})")).unwrap();
            nl.mark_global_output(o);
            sum.push(o);
        }
        let co = nl.create_net(&format!("co_{cell}"));
        nl.connect_source(co, g, "CO(3)").unwrap();
        carries.push(g);
        cin = co;
    }
    RippleAdder {
        netlist: nl,
        carries,
        luts,
        a,
        b,
        sum,
        carry_out: cin,
    }
}

pub struct Subtractor {
    pub netlist: Netlist,
    pub gates: Vec<GateId>,
    pub a: Vec<NetId>,
    pub b: Vec<NetId>,
    pub diff: Vec<NetId>,
}

/// `diff = a - b` as `a + ~b + 1`.
pub fn build_ice40_subtractor(width: usize) -> Subtractor {
    let mut nl = Netlist::new("subtractor", GateLibrary::ice40());
    let vcc = nl.ensure_vcc_net().unwrap();
    let (a, b) = operand_pairs(&mut nl, width);
    let mut gates = Vec::new();
    let mut diff = Vec::new();
    let mut cin = vcc;
    for i in 0..width {
        let (inv, nb) = inverter(&mut nl, &format!("inv_{i}"), b[i]);
        gates.push(inv);
        let co = nl.create_net(&format!("c_{i}"));
        gates.push(carry(&mut nl, &format!("carry_{i}"), a[i], nb, cin, co));
        let d = nl.create_net(&format!("diff_{i}"));
        gates.push(lut(&mut nl, &format!("lut_{i}"), &[a[i], b[i], cin], 0x69, d));
        nl.mark_global_output(d);
        diff.push(d);
        cin = co;
    }
    Subtractor {
        netlist: nl,
        gates,
        a,
        b,
        diff,
    }
}

/// `diff = a - b` like `build_ice40_subtractor`, with `a` and `b` read from
/// two `SB_DFF` register groups. `registers[0]` drives `a`.
pub fn build_registered_subtractor(width: usize) -> (Subtractor, Vec<Vec<GateId>>) {
    let mut nl = Netlist::new("registered_subtractor", GateLibrary::ice40());
    let vcc = nl.ensure_vcc_net().unwrap();
    let clk = nl.create_net("clk");
    nl.mark_global_input(clk);
    let mut registers = vec![Vec::new(), Vec::new()];
    let mut words = vec![Vec::new(), Vec::new()];
    for i in 0..width {
        for (group, prefix) in ["a", "b"].iter().enumerate() {
            let d = nl.create_net(&format!("d{prefix}_{i}"));
            nl.mark_global_input(d);
            let q = nl.create_net(&format!("{prefix}_{i}"));
            let dff = nl.create_gate("SB_DFF", &format!("reg_{prefix}_{i}")).unwrap();
            nl.connect_destination(d, dff, "D").unwrap();
            nl.connect_destination(clk, dff, "C").unwrap();
            nl.connect_source(q, dff, "Q").unwrap();
            registers[group].push(dff);
            words[group].push(q);
        }
    }
    let b = words.pop().unwrap();
    let a = words.pop().unwrap();
    let mut gates = Vec::new();
    let mut diff = Vec::new();
    let mut cin = vcc;
    for i in 0..width {
        let (inv, nb) = inverter(&mut nl, &format!("inv_{i}"), b[i]);
        gates.push(inv);
        let co = nl.create_net(&format!("c_{i}"));
        gates.push(carry(&mut nl, &format!("carry_{i}"), a[i], nb, cin, co));
        let d = nl.create_net(&format!("diff_{i}"));
        gates.push(lut(&mut nl, &format!("lut_{i}"), &[a[i], b[i], cin], 0x69, d));
        nl.mark_global_output(d);
        diff.push(d);
        cin = co;
    }
    let sub = Subtractor {
        netlist: nl,
        gates,
        a,
        b,
        diff,
    };
    (sub, registers)
}

pub struct AddSub {
    pub netlist: Netlist,
    pub gates: Vec<GateId>,
    pub a: Vec<NetId>,
    pub b: Vec<NetId>,
    pub ctrl: NetId,
    pub out: Vec<NetId>,
}

/// `out = ctrl ? a - b : a + b`: `ctrl` inverts `b` and is the carry in.
pub fn build_ice40_add_sub(width: usize) -> AddSub {
    let mut nl = Netlist::new("add_sub", GateLibrary::ice40());
    nl.ensure_gnd_net().unwrap();
    let (a, b) = operand_pairs(&mut nl, width);
    let ctrl = nl.create_net("ctrl");
    nl.mark_global_input(ctrl);
    let mut gates = Vec::new();
    let mut out = Vec::new();
    let mut cin = ctrl;
    for i in 0..width {
        let t = nl.create_net(&format!("t_{i}"));
        gates.push(lut(&mut nl, &format!("xor_{i}"), &[b[i], ctrl], 0x6, t));
        let co = nl.create_net(&format!("c_{i}"));
        gates.push(carry(&mut nl, &format!("carry_{i}"), a[i], t, cin, co));
        let o = nl.create_net(&format!("out_{i}"));
        gates.push(lut(&mut nl, &format!("sum_{i}"), &[a[i], t, cin], 0x96, o));
        nl.mark_global_output(o);
        out.push(o);
        cin = co;
    }
    AddSub {
        netlist: nl,
        gates,
        a,
        b,
        ctrl,
        out,
    }
}

pub struct LutWord {
    pub netlist: Netlist,
    pub gates: Vec<GateId>,
    pub inputs: Vec<NetId>,
    pub outputs: Vec<NetId>,
    pub gnd: NetId,
}

/// `outputs = f(inputs)` with one `SB_LUT4` per output bit, so at most four
/// inputs. Both words are LSB first.
pub fn build_lut_word(inputs: usize, outputs: usize, f: impl Fn(u64) -> u64) -> LutWord {
    assert!(inputs <= 4);
    let mut nl = Netlist::new("lut_word", GateLibrary::ice40());
    let gnd = nl.ensure_gnd_net().unwrap();
    let ins: Vec<NetId> = (0..inputs).map(|i| nl.create_net(&format!("x_{i}"))).collect();
    for n in &ins {
        nl.mark_global_input(*n);
    }
    let mut gates = Vec::new();
    let mut outs = Vec::new();
    for bit in 0..outputs {
        let init = (0..1u64 << inputs).fold(0u64, |acc, x| acc | (((f(x) >> bit) & 1) << x));
        let o = nl.create_net(&format!("y_{bit}"));
        gates.push(lut(&mut nl, &format!("lut_{bit}"), &ins, init, o));
        nl.mark_global_output(o);
        outs.push(o);
    }
    LutWord {
        netlist: nl,
        gates,
        inputs: ins,
        outputs: outs,
        gnd,
    }
}

pub struct Counter {
    pub netlist: Netlist,
    pub registers: Vec<GateId>,
    pub logic: Vec<GateId>,
    pub q: Vec<NetId>,
    pub next: Vec<NetId>,
}

/// Free running `q <= q + 1` with one `SB_DFF` per bit.
pub fn build_ice40_counter(width: usize) -> Counter {
    let mut nl = Netlist::new("counter", GateLibrary::ice40());
    let gnd = nl.ensure_gnd_net().unwrap();
    let vcc = nl.ensure_vcc_net().unwrap();
    let clk = nl.create_net("clk");
    nl.mark_global_input(clk);
    let q: Vec<NetId> = (0..width).map(|i| nl.create_net(&format!("q_{i}"))).collect();
    let mut registers = Vec::new();
    let mut logic = Vec::new();
    let mut next = Vec::new();
    let mut cin = vcc;
    for i in 0..width {
        let co = nl.create_net(&format!("c_{i}"));
        logic.push(carry(&mut nl, &format!("carry_{i}"), q[i], gnd, cin, co));
        let n = nl.create_net(&format!("next_{i}"));
        logic.push(lut(&mut nl, &format!("lut_{i}"), &[q[i], cin], 0x6, n));
        let dff = nl.create_gate("SB_DFF", &format!("dff_{i}")).unwrap();
        nl.connect_destination(n, dff, "D").unwrap();
        nl.connect_destination(clk, dff, "C").unwrap();
        nl.connect_source(q[i], dff, "Q").unwrap();
        registers.push(dff);
        next.push(n);
        cin = co;
    }
    Counter {
        netlist: nl,
        registers,
        logic,
        q,
        next,
    }
}

pub struct Comparator {
    pub netlist: Netlist,
    pub gates: Vec<GateId>,
    pub a: Vec<NetId>,
    pub b: Vec<NetId>,
    pub out: NetId,
}

/// `out = a <= b` as the carry out of `b + ~a + 1`. The signed variant
/// flips both sign bits first.
pub fn build_comparator(width: usize, signed: bool) -> Comparator {
    let mut nl = Netlist::new("comparator", GateLibrary::ice40());
    let vcc = nl.ensure_vcc_net().unwrap();
    let (a, b) = operand_pairs(&mut nl, width);
    let mut gates = Vec::new();
    let mut cin = vcc;
    for i in 0..width {
        let (lhs, rhs) = if signed && i + 1 == width {
            let (inv, nb) = inverter(&mut nl, &format!("inv_{i}"), b[i]);
            gates.push(inv);
            (nb, a[i])
        } else {
            let (inv, na) = inverter(&mut nl, &format!("inv_{i}"), a[i]);
            gates.push(inv);
            (b[i], na)
        };
        let co = nl.create_net(&format!("c_{i}"));
        gates.push(carry(&mut nl, &format!("carry_{i}"), lhs, rhs, cin, co));
        cin = co;
    }
    nl.mark_global_output(cin);
    Comparator {
        netlist: nl,
        gates,
        a,
        b,
        out: cin,
    }
}

/// `out = a == b` as a chain of LUTs, each folding one bit pair into the
/// running result.
pub fn build_equality_comparator(width: usize) -> Comparator {
    let mut nl = Netlist::new("equality", GateLibrary::ice40());
    let (a, b) = operand_pairs(&mut nl, width);
    let mut gates = Vec::new();
    let mut running: Option<NetId> = None;
    for i in 0..width {
        let eq = nl.create_net(&format!("eq_{i}"));
        let g = match running {
            None => lut(&mut nl, &format!("lut_{i}"), &[a[i], b[i]], 0x9, eq),
            Some(prev) => lut(&mut nl, &format!("lut_{i}"), &[a[i], b[i], prev], 0x90, eq),
        };
        gates.push(g);
        running = Some(eq);
    }
    let out = running.unwrap();
    nl.mark_global_output(out);
    Comparator {
        netlist: nl,
        gates,
        a,
        b,
        out,
    }
}
