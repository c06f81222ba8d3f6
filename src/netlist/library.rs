// SPDX-License-Identifier: Apache-2.0

//! Gate types, their property tags and the boolean behavior of their output
//! pins.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Coarse classification tags attached to a gate type.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum GateTypeProperty {
    Combinational,
    Sequential,
    Carry,
    Io,
    Ground,
    Power,
    Lut,
    Inverter,
    And,
    Or,
    Xor,
    Buffer,
}

/// Boolean behavior of a single output pin in terms of the gate's input pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinFunction {
    Const(bool),
    Pin(String),
    Not(Box<PinFunction>),
    And(Vec<PinFunction>),
    Or(Vec<PinFunction>),
    Xor(Vec<PinFunction>),
    /// Truth table over `inputs`, where bit `i` of `init` is the output for
    /// the assignment whose binary encoding (input 0 as the LSB) is `i`.
    Lut { inputs: Vec<String>, init: u64 },
}

impl PinFunction {
    pub fn pin(name: &str) -> Self {
        PinFunction::Pin(name.to_string())
    }

    /// Evaluates the function given a lookup for input pin values.
    pub fn eval(&self, value_of: &dyn Fn(&str) -> bool) -> bool {
        match self {
            PinFunction::Const(v) => *v,
            PinFunction::Pin(p) => value_of(p),
            PinFunction::Not(f) => !f.eval(value_of),
            PinFunction::And(fs) => fs.iter().all(|f| f.eval(value_of)),
            PinFunction::Or(fs) => fs.iter().any(|f| f.eval(value_of)),
            PinFunction::Xor(fs) => fs.iter().fold(false, |acc, f| acc ^ f.eval(value_of)),
            PinFunction::Lut { inputs, init } => {
                let mut index = 0usize;
                for (i, pin) in inputs.iter().enumerate() {
                    if value_of(pin) {
                        index |= 1 << i;
                    }
                }
                (init >> index) & 1 == 1
            }
        }
    }

    /// Input pins referenced by this function, in first-use order.
    pub fn referenced_pins(&self) -> Vec<String> {
        let mut pins = Vec::new();
        self.collect_pins(&mut pins);
        pins
    }

    fn collect_pins(&self, pins: &mut Vec<String>) {
        match self {
            PinFunction::Const(_) => {}
            PinFunction::Pin(p) => {
                if !pins.contains(p) {
                    pins.push(p.clone());
                }
            }
            PinFunction::Not(f) => f.collect_pins(pins),
            PinFunction::And(fs) | PinFunction::Or(fs) | PinFunction::Xor(fs) => {
                for f in fs {
                    f.collect_pins(pins);
                }
            }
            PinFunction::Lut { inputs, .. } => {
                for p in inputs {
                    if !pins.contains(p) {
                        pins.push(p.clone());
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateType {
    pub name: String,
    pub properties: BTreeSet<GateTypeProperty>,
    pub input_pins: Vec<String>,
    pub output_pins: Vec<String>,
    /// Default behavior per output pin. Sequential outputs have no entry.
    pub functions: BTreeMap<String, PinFunction>,
}

impl GateType {
    pub fn has_property(&self, property: GateTypeProperty) -> bool {
        self.properties.contains(&property)
    }

    pub fn has_input_pin(&self, pin: &str) -> bool {
        self.input_pins.iter().any(|p| p == pin)
    }

    pub fn has_output_pin(&self, pin: &str) -> bool {
        self.output_pins.iter().any(|p| p == pin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateLibrary {
    pub name: String,
    pub types: BTreeMap<String, GateType>,
}

impl Default for GateLibrary {
    fn default() -> Self {
        GateLibrary::ice40()
    }
}

fn make_type(
    name: &str,
    properties: &[GateTypeProperty],
    inputs: &[&str],
    outputs: &[&str],
    functions: Vec<(&str, PinFunction)>,
) -> GateType {
    GateType {
        name: name.to_string(),
        properties: properties.iter().copied().collect(),
        input_pins: inputs.iter().map(|s| s.to_string()).collect(),
        output_pins: outputs.iter().map(|s| s.to_string()).collect(),
        functions: functions
            .into_iter()
            .map(|(pin, f)| (pin.to_string(), f))
            .collect(),
    }
}

impl GateLibrary {
    pub fn get(&self, type_name: &str) -> Option<&GateType> {
        self.types.get(type_name)
    }

    pub fn add_type(&mut self, gate_type: GateType) {
        self.types.insert(gate_type.name.clone(), gate_type);
    }

    /// A Lattice iCE40 flavored library: 4-input LUTs, the dedicated
    /// `SB_CARRY` cell, flip-flops, constant drivers and a few simple gates.
    pub fn ice40() -> Self {
        use GateTypeProperty::*;
        let p = PinFunction::pin;
        let mut lib = GateLibrary {
            name: "ICE40ULTRA".to_string(),
            types: BTreeMap::new(),
        };
        lib.add_type(make_type(
            "SB_LUT4",
            &[Combinational, Lut],
            &["I0", "I1", "I2", "I3"],
            &["O"],
            vec![(
                "O",
                PinFunction::Lut {
                    inputs: vec!["I0".into(), "I1".into(), "I2".into(), "I3".into()],
                    init: 0,
                },
            )],
        ));
        // CO = I0 & I1 | (I0 | I1) & CI
        lib.add_type(make_type(
            "SB_CARRY",
            &[Combinational, Carry],
            &["I0", "I1", "CI"],
            &["CO"],
            vec![(
                "CO",
                PinFunction::Or(vec![
                    PinFunction::And(vec![p("I0"), p("I1")]),
                    PinFunction::And(vec![
                        PinFunction::Or(vec![p("I0"), p("I1")]),
                        p("CI"),
                    ]),
                ]),
            )],
        ));
        lib.add_type(make_type(
            "SB_DFF",
            &[Sequential],
            &["D", "C"],
            &["Q"],
            vec![],
        ));
        lib.add_type(make_type(
            "GND",
            &[Ground],
            &[],
            &["O"],
            vec![("O", PinFunction::Const(false))],
        ));
        lib.add_type(make_type(
            "VCC",
            &[Power],
            &[],
            &["O"],
            vec![("O", PinFunction::Const(true))],
        ));
        lib.add_type(make_type(
            "INV",
            &[Combinational, Inverter],
            &["I"],
            &["O"],
            vec![("O", PinFunction::Not(Box::new(p("I"))))],
        ));
        lib.add_type(make_type(
            "BUF",
            &[Combinational, Buffer],
            &["I"],
            &["O"],
            vec![("O", p("I"))],
        ));
        lib.add_type(make_type(
            "AND2",
            &[Combinational, And],
            &["I0", "I1"],
            &["O"],
            vec![("O", PinFunction::And(vec![p("I0"), p("I1")]))],
        ));
        lib.add_type(make_type(
            "OR2",
            &[Combinational, Or],
            &["I0", "I1"],
            &["O"],
            vec![("O", PinFunction::Or(vec![p("I0"), p("I1")]))],
        ));
        lib.add_type(make_type(
            "XOR2",
            &[Combinational, Xor],
            &["I0", "I1"],
            &["O"],
            vec![("O", PinFunction::Xor(vec![p("I0"), p("I1")]))],
        ));
        lib.add_type(make_type(
            "SB_IO",
            &[Io],
            &["D_OUT_0"],
            &["D_IN_0"],
            vec![("D_IN_0", p("D_OUT_0"))],
        ));
        lib
    }
}

/// Carry of stage `i` of a `CARRY4`: `CI | CYINIT` enters stage 0, each
/// stage muxes between its carry in (`S(i)` set) and `DI(i)`.
fn carry4_carry(i: usize) -> PinFunction {
    if i == 0 {
        return PinFunction::Or(vec![PinFunction::pin("CI"), PinFunction::pin("CYINIT")]);
    }
    let s = PinFunction::pin(&format!("S({})", i - 1));
    let di = PinFunction::pin(&format!("DI({})", i - 1));
    PinFunction::Or(vec![
        PinFunction::And(vec![s.clone(), carry4_carry(i - 1)]),
        PinFunction::And(vec![PinFunction::Not(Box::new(s)), di]),
    ])
}

impl GateLibrary {
    /// A Xilinx UNISIM flavored library: LUTs, the four-bit `CARRY4` cell,
    /// `FDRE` flip-flops, constant drivers and an inverter.
    pub fn xilinx_unisim() -> Self {
        use GateTypeProperty::*;
        let p = PinFunction::pin;
        let mut lib = GateLibrary {
            name: "XILINX_UNISIM".to_string(),
            types: BTreeMap::new(),
        };
        for width in 1..=6usize {
            let inputs: Vec<String> = (0..width).map(|i| format!("I{i}")).collect();
            let pins: Vec<&str> = inputs.iter().map(String::as_str).collect();
            lib.add_type(make_type(
                &format!("LUT{width}"),
                &[Combinational, Lut],
                &pins,
                &["O"],
                vec![("O", PinFunction::Lut { inputs: inputs.clone(), init: 0 })],
            ));
        }

        let mut inputs = vec!["CI".to_string(), "CYINIT".to_string()];
        inputs.extend((0..4).map(|i| format!("DI({i})")));
        inputs.extend((0..4).map(|i| format!("S({i})")));
        let outputs: Vec<String> = (0..4)
            .map(|i| format!("O({i})"))
            .chain((0..4).map(|i| format!("CO({i})")))
            .collect();
        let mut functions = Vec::new();
        for i in 0..4 {
            functions.push((
                outputs[i].as_str(),
                PinFunction::Xor(vec![p(&format!("S({i})")), carry4_carry(i)]),
            ));
            functions.push((outputs[4 + i].as_str(), carry4_carry(i + 1)));
        }
        let input_pins: Vec<&str> = inputs.iter().map(String::as_str).collect();
        let output_pins: Vec<&str> = outputs.iter().map(String::as_str).collect();
        lib.add_type(make_type(
            "CARRY4",
            &[Combinational, Carry],
            &input_pins,
            &output_pins,
            functions,
        ));

        lib.add_type(make_type(
            "FDRE",
            &[Sequential],
            &["D", "C", "CE", "R"],
            &["Q"],
            vec![],
        ));
        lib.add_type(make_type(
            "GND",
            &[Ground],
            &[],
            &["G"],
            vec![("G", PinFunction::Const(false))],
        ));
        lib.add_type(make_type(
            "VCC",
            &[Power],
            &[],
            &["P"],
            vec![("P", PinFunction::Const(true))],
        ));
        lib.add_type(make_type(
            "INV",
            &[Combinational, Inverter],
            &["I"],
            &["O"],
            vec![("O", PinFunction::Not(Box::new(p("I"))))],
        ));
        lib
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_function_truth_table() {
        let lib = GateLibrary::ice40();
        let carry = lib.get("SB_CARRY").unwrap();
        let co = &carry.functions["CO"];
        for bits in 0..8u32 {
            let i0 = bits & 1 == 1;
            let i1 = bits & 2 == 2;
            let ci = bits & 4 == 4;
            let got = co.eval(&|pin| match pin {
                "I0" => i0,
                "I1" => i1,
                "CI" => ci,
                _ => unreachable!(),
            });
            let want = (i0 as u32 + i1 as u32 + ci as u32) >= 2;
            assert_eq!(got, want, "bits={bits:03b}");
        }
    }

    #[test]
    fn test_carry4_adds_four_bits() {
        let lib = GateLibrary::xilinx_unisim();
        let carry4 = lib.get("CARRY4").unwrap();
        // S = a ^ b and DI = a gives a + b + ci.
        for (a, b, ci) in [(0u32, 0u32, false), (5, 3, false), (15, 1, false), (9, 9, true), (15, 15, true)] {
            let value_of = |pin: &str| -> bool {
                match pin {
                    "CI" => ci,
                    "CYINIT" => false,
                    _ => {
                        let bit: u32 = pin[pin.len() - 2..pin.len() - 1].parse().unwrap();
                        if pin.starts_with("S(") {
                            ((a ^ b) >> bit) & 1 == 1
                        } else {
                            (a >> bit) & 1 == 1
                        }
                    }
                }
            };
            let mut got = 0u32;
            for i in 0..4 {
                if carry4.functions[&format!("O({i})")].eval(&value_of) {
                    got |= 1 << i;
                }
            }
            if carry4.functions["CO(3)"].eval(&value_of) {
                got |= 1 << 4;
            }
            assert_eq!(got, a + b + ci as u32, "a={a} b={b} ci={ci}");
        }
    }

    #[test]
    fn test_lut_eval_uses_i0_as_lsb() {
        // Only assignment I0=1, others 0 produces a one.
        let lut = PinFunction::Lut {
            inputs: vec!["I0".into(), "I1".into()],
            init: 0b0010,
        };
        assert!(lut.eval(&|pin| pin == "I0"));
        assert!(!lut.eval(&|pin| pin == "I1"));
        assert_eq!(lut.referenced_pins(), vec!["I0".to_string(), "I1".to_string()]);
    }
}
