// SPDX-License-Identifier: Apache-2.0

//! Flat gate-level netlist with hierarchical modules.
//!
//! Gates, nets and modules are stored in arenas and referred to by index
//! newtypes. Identities are never reused: gates and nets are only ever
//! appended, which keeps ids stable across conflict resolution.

pub mod connectivity;
pub mod library;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModIdError;
pub use library::{GateLibrary, GateType, GateTypeProperty, PinFunction};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct GateId(pub usize);

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NetId(pub usize);

#[derive(
    Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct ModuleId(pub usize);

impl std::fmt::Display for NetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "net_{}", self.0)
    }
}

/// A (gate, pin) pair on one side of a net.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Endpoint {
    pub gate: GateId,
    pub pin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Net {
    pub id: NetId,
    pub name: String,
    pub sources: Vec<Endpoint>,
    pub destinations: Vec<Endpoint>,
    #[serde(default)]
    pub is_global_input: bool,
    #[serde(default)]
    pub is_global_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub id: GateId,
    pub name: String,
    pub type_name: String,
    /// Per-instance behavior of each output pin, seeded from the gate type.
    pub functions: BTreeMap<String, PinFunction>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub fan_in: BTreeMap<String, NetId>,
    #[serde(default)]
    pub fan_out: BTreeMap<String, NetId>,
    #[serde(default)]
    pub module: ModuleId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinGroup {
    pub name: String,
    pub direction: PinDirection,
    pub nets: Vec<NetId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub parent: Option<ModuleId>,
    pub gates: Vec<GateId>,
    pub data: BTreeMap<String, String>,
    pub pin_names: BTreeMap<NetId, String>,
    pub pin_groups: Vec<PinGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Netlist {
    pub name: String,
    #[serde(default)]
    pub library: GateLibrary,
    pub gates: Vec<Gate>,
    pub nets: Vec<Net>,
    #[serde(default)]
    pub modules: Vec<Module>,
}

pub const TOP_MODULE: ModuleId = ModuleId(0);

impl Netlist {
    pub fn new(name: &str, library: GateLibrary) -> Self {
        Netlist {
            name: name.to_string(),
            library,
            gates: Vec::new(),
            nets: Vec::new(),
            modules: vec![Module {
                id: TOP_MODULE,
                name: "top".to_string(),
                parent: None,
                gates: Vec::new(),
                data: BTreeMap::new(),
                pin_names: BTreeMap::new(),
                pin_groups: Vec::new(),
            }],
        }
    }

    /// Restores the top module if a deserialized netlist omitted it and
    /// assigns every gate that claims it.
    pub fn ensure_top_module(&mut self) {
        if self.modules.is_empty() {
            let mut top = Netlist::new(&self.name, GateLibrary::default())
                .modules
                .remove(0);
            top.gates = self
                .gates
                .iter()
                .filter(|g| g.module == TOP_MODULE)
                .map(|g| g.id)
                .collect();
            self.modules.push(top);
        }
    }

    pub fn gate(&self, id: GateId) -> &Gate {
        &self.gates[id.0]
    }

    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.0]
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    pub fn gate_ids(&self) -> impl Iterator<Item = GateId> + '_ {
        self.gates.iter().map(|g| g.id)
    }

    pub fn gate_type(&self, id: GateId) -> Option<&GateType> {
        self.library.get(&self.gate(id).type_name)
    }

    pub fn has_property(&self, id: GateId, property: GateTypeProperty) -> bool {
        self.gate_type(id)
            .map(|t| t.has_property(property))
            .unwrap_or(false)
    }

    pub fn gate_by_name(&self, name: &str) -> Option<GateId> {
        self.gates.iter().find(|g| g.name == name).map(|g| g.id)
    }

    pub fn net_by_name(&self, name: &str) -> Option<NetId> {
        self.nets.iter().find(|n| n.name == name).map(|n| n.id)
    }

    pub fn create_net(&mut self, name: &str) -> NetId {
        let id = NetId(self.nets.len());
        self.nets.push(Net {
            id,
            name: name.to_string(),
            sources: Vec::new(),
            destinations: Vec::new(),
            is_global_input: false,
            is_global_output: false,
        });
        id
    }

    pub fn create_gate(&mut self, type_name: &str, name: &str) -> Result<GateId, ModIdError> {
        let gate_type = self
            .library
            .get(type_name)
            .ok_or_else(|| ModIdError::UnknownGateType(type_name.to_string()))?;
        let id = GateId(self.gates.len());
        self.gates.push(Gate {
            id,
            name: name.to_string(),
            type_name: type_name.to_string(),
            functions: gate_type.functions.clone(),
            data: BTreeMap::new(),
            fan_in: BTreeMap::new(),
            fan_out: BTreeMap::new(),
            module: TOP_MODULE,
        });
        self.modules[TOP_MODULE.0].gates.push(id);
        Ok(id)
    }

    /// Overrides the behavior of one output pin, e.g. the truth table of a
    /// LUT instance.
    pub fn set_function(&mut self, gate: GateId, pin: &str, function: PinFunction) {
        self.gates[gate.0].functions.insert(pin.to_string(), function);
    }

    pub fn mark_global_input(&mut self, net: NetId) {
        self.nets[net.0].is_global_input = true;
    }

    pub fn mark_global_output(&mut self, net: NetId) {
        self.nets[net.0].is_global_output = true;
    }

    /// Drives `net` from output `pin` of `gate`.
    pub fn connect_source(&mut self, net: NetId, gate: GateId, pin: &str) -> Result<(), ModIdError> {
        let has_pin = self
            .gate_type(gate)
            .map(|t| t.has_output_pin(pin))
            .unwrap_or(false);
        if !has_pin {
            return Err(ModIdError::MissingPin {
                gate: self.gate(gate).name.clone(),
                pin: pin.to_string(),
            });
        }
        if self.gates[gate.0].fan_out.contains_key(pin) {
            return Err(ModIdError::PinAlreadyConnected {
                gate: self.gate(gate).name.clone(),
                pin: pin.to_string(),
            });
        }
        self.gates[gate.0].fan_out.insert(pin.to_string(), net);
        self.nets[net.0].sources.push(Endpoint {
            gate,
            pin: pin.to_string(),
        });
        Ok(())
    }

    /// Loads `net` into input `pin` of `gate`.
    pub fn connect_destination(
        &mut self,
        net: NetId,
        gate: GateId,
        pin: &str,
    ) -> Result<(), ModIdError> {
        let has_pin = self
            .gate_type(gate)
            .map(|t| t.has_input_pin(pin))
            .unwrap_or(false);
        if !has_pin {
            return Err(ModIdError::MissingPin {
                gate: self.gate(gate).name.clone(),
                pin: pin.to_string(),
            });
        }
        if self.gates[gate.0].fan_in.contains_key(pin) {
            return Err(ModIdError::PinAlreadyConnected {
                gate: self.gate(gate).name.clone(),
                pin: pin.to_string(),
            });
        }
        self.gates[gate.0].fan_in.insert(pin.to_string(), net);
        self.nets[net.0].destinations.push(Endpoint {
            gate,
            pin: pin.to_string(),
        });
        Ok(())
    }

    /// Detaches a single destination endpoint. Returns whether it was
    /// connected.
    pub fn disconnect_destination(&mut self, net: NetId, endpoint: &Endpoint) -> bool {
        let dests = &mut self.nets[net.0].destinations;
        let Some(pos) = dests.iter().position(|d| d == endpoint) else {
            return false;
        };
        dests.remove(pos);
        self.gates[endpoint.gate.0].fan_in.remove(&endpoint.pin);
        true
    }

    pub fn is_gnd_net(&self, net: NetId) -> bool {
        let sources = &self.net(net).sources;
        !sources.is_empty()
            && sources
                .iter()
                .all(|s| self.has_property(s.gate, GateTypeProperty::Ground))
    }

    pub fn is_vcc_net(&self, net: NetId) -> bool {
        let sources = &self.net(net).sources;
        !sources.is_empty()
            && sources
                .iter()
                .all(|s| self.has_property(s.gate, GateTypeProperty::Power))
    }

    pub fn is_constant_net(&self, net: NetId) -> bool {
        self.is_gnd_net(net) || self.is_vcc_net(net)
    }

    pub fn is_gnd_gate(&self, gate: GateId) -> bool {
        self.has_property(gate, GateTypeProperty::Ground)
    }

    pub fn is_vcc_gate(&self, gate: GateId) -> bool {
        self.has_property(gate, GateTypeProperty::Power)
    }

    pub fn gnd_net(&self) -> Option<NetId> {
        self.nets.iter().map(|n| n.id).find(|n| self.is_gnd_net(*n))
    }

    pub fn vcc_net(&self) -> Option<NetId> {
        self.nets.iter().map(|n| n.id).find(|n| self.is_vcc_net(*n))
    }

    fn ensure_constant_net(&mut self, value: bool) -> Result<NetId, ModIdError> {
        let existing = if value { self.vcc_net() } else { self.gnd_net() };
        if let Some(net) = existing {
            return Ok(net);
        }
        let property = if value {
            GateTypeProperty::Power
        } else {
            GateTypeProperty::Ground
        };
        let gate_type = self
            .library
            .types
            .values()
            .find(|t| t.has_property(property))
            .ok_or_else(|| {
                ModIdError::UnknownGateType(format!("{:?} driver", property).to_lowercase())
            })?;
        let type_name = gate_type.name.clone();
        let out_pin = gate_type
            .output_pins
            .first()
            .cloned()
            .ok_or_else(|| ModIdError::MissingPin {
                gate: type_name.clone(),
                pin: "<output>".to_string(),
            })?;
        let label = if value { "vcc" } else { "gnd" };
        let gate = self.create_gate(&type_name, &format!("{label}_driver"))?;
        let net = self.create_net(label);
        self.connect_source(net, gate, &out_pin)?;
        Ok(net)
    }

    /// Returns the ground net, creating a ground driver if none exists.
    pub fn ensure_gnd_net(&mut self) -> Result<NetId, ModIdError> {
        self.ensure_constant_net(false)
    }

    /// Returns the power net, creating a power driver if none exists.
    pub fn ensure_vcc_net(&mut self) -> Result<NetId, ModIdError> {
        self.ensure_constant_net(true)
    }

    /// Creates a copy of `gate` with identical type, behavior and data whose
    /// input pins are attached to the same nets. Outputs are left open.
    pub fn clone_gate(&mut self, gate: GateId, name: &str) -> Result<GateId, ModIdError> {
        let original = self.gate(gate).clone();
        let new_gate = self.create_gate(&original.type_name, name)?;
        self.gates[new_gate.0].functions = original.functions.clone();
        self.gates[new_gate.0].data = original.data.clone();
        for (pin, net) in &original.fan_in {
            self.connect_destination(*net, new_gate, pin)?;
        }
        Ok(new_gate)
    }

    /// Creates a module below `parent` and moves `gates` into it.
    pub fn create_module(&mut self, name: &str, parent: ModuleId, gates: &[GateId]) -> ModuleId {
        let id = ModuleId(self.modules.len());
        for g in gates {
            let old = self.gates[g.0].module;
            self.modules[old.0].gates.retain(|x| x != g);
            self.gates[g.0].module = id;
        }
        self.modules.push(Module {
            id,
            name: name.to_string(),
            parent: Some(parent),
            gates: gates.to_vec(),
            data: BTreeMap::new(),
            pin_names: BTreeMap::new(),
            pin_groups: Vec::new(),
        });
        id
    }

    pub fn set_module_data(&mut self, module: ModuleId, key: &str, value: String) {
        self.modules[module.0].data.insert(key.to_string(), value);
    }

    /// Whether `net` crosses the boundary of `module`, i.e. whether the
    /// module exposes a pin for it.
    pub fn module_has_pin(&self, module: ModuleId, net: NetId) -> bool {
        let gates = &self.module(module).gates;
        let inputs = connectivity::input_nets(self, gates);
        if inputs.contains(&net) {
            return true;
        }
        connectivity::output_nets(self, gates, false).contains(&net)
    }

    pub fn set_pin_name(&mut self, module: ModuleId, net: NetId, name: String) {
        self.modules[module.0].pin_names.insert(net, name);
    }

    pub fn create_pin_group(
        &mut self,
        module: ModuleId,
        name: &str,
        direction: PinDirection,
        nets: Vec<NetId>,
    ) -> Result<(), ModIdError> {
        if nets.is_empty() {
            return Err(ModIdError::Materialization(format!(
                "pin group '{}' of module '{}' would be empty",
                name,
                self.module(module).name
            )));
        }
        let m = &mut self.modules[module.0];
        if m.pin_groups.iter().any(|g| g.name == name) {
            return Err(ModIdError::Materialization(format!(
                "module '{}' already has a pin group named '{}'",
                m.name, name
            )));
        }
        m.pin_groups.push(PinGroup {
            name: name.to_string(),
            direction,
            nets,
        });
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut netlist: Netlist = serde_json::from_str(text)?;
        netlist.ensure_top_module();
        Ok(netlist)
    }
}
