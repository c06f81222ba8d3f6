// SPDX-License-Identifier: Apache-2.0

//! Tests that invoke the `modid` binary.

use std::io::Write;
use std::process::Command;

use xlsynth_modid::netlist::Netlist;
use xlsynth_modid::test_utils::build_ice40_ripple_adder;

#[test]
fn test_modid_invoke_creates_modules() {
    let _ = env_logger::builder().is_test(true).try_init();
    let adder = build_ice40_ripple_adder(4);

    let mut netlist_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(netlist_file, "{}", adder.netlist.to_json().unwrap()).unwrap();
    let netlist_path = netlist_file.into_temp_path();

    let mut config_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(config_file, r#"{{"types_to_check": ["adder"]}}"#).unwrap();
    let config_path = config_file.into_temp_path();

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("out.json");

    let output = Command::new(env!("CARGO_BIN_EXE_modid"))
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--threads=1")
        .arg("--create-modules")
        .arg("--output")
        .arg(out_path.to_str().unwrap())
        .arg(netlist_path.to_str().unwrap())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["candidates"][0]["name"], "ADDER");
    assert_eq!(summary["candidates"][0]["verified"], true);
    assert_eq!(summary["modules"], serde_json::json!(["ADDER_0"]));

    let written = Netlist::from_json(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert!(written.modules.iter().any(|m| m.name == "ADDER_0"));
}

#[test]
fn test_modid_invoke_rejects_unknown_gate() {
    let adder = build_ice40_ripple_adder(2);
    let mut netlist_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(netlist_file, "{}", adder.netlist.to_json().unwrap()).unwrap();
    let netlist_path = netlist_file.into_temp_path();

    let output = Command::new(env!("CARGO_BIN_EXE_modid"))
        .arg("--gates=no_such_gate")
        .arg(netlist_path.to_str().unwrap())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no gate named 'no_such_gate'"));
}
