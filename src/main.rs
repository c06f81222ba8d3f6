// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clap::ValueEnum;
use serde::Serialize;
use xlsynth_modid::config::{Configuration, MultithreadingPriority};
use xlsynth_modid::netlist::{GateId, Netlist};
use xlsynth_modid::result::IdentificationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
enum PriorityArg {
    /// Expand structural candidates first.
    Time,
    /// Verify functional candidates first.
    Memory,
}

#[derive(Debug, Parser)]
#[command(name = "modid")]
#[command(about = "Identifies word-level arithmetic modules in a gate-level netlist")]
struct Args {
    /// Path to the netlist in JSON form.
    netlist: PathBuf,

    /// Optional JSON configuration; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the maximum worker thread count.
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, value_enum)]
    priority: Option<PriorityArg>,

    /// Analyze exactly these gates (by name) instead of searching the whole
    /// netlist.
    #[arg(long, value_delimiter = ',')]
    gates: Vec<String>,

    /// Materialize the identified candidates as modules.
    #[arg(long, default_value_t = false)]
    create_modules: bool,

    /// Where to write the (possibly modified) netlist.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CandidateSummary {
    base_id: usize,
    base_gates: Vec<String>,
    verified: bool,
    name: String,
    gate_count: usize,
    operands: Vec<Vec<String>>,
    outputs: Vec<String>,
    control_signals: Vec<String>,
    operation: String,
}

#[derive(Debug, Serialize)]
struct Summary {
    candidates: Vec<CandidateSummary>,
    modules: Vec<String>,
}

fn summarize(netlist: &Netlist, result: &IdentificationResult) -> Vec<CandidateSummary> {
    let net_name = |n: &xlsynth_modid::netlist::NetId| netlist.net(*n).name.clone();
    result
        .pairs
        .iter()
        .map(|(base, vc)| CandidateSummary {
            base_id: base.id,
            base_gates: base.gates.iter().map(|g| netlist.gate(*g).name.clone()).collect(),
            verified: vc.is_verified(),
            name: vc.name(),
            gate_count: vc.owned_gates().len(),
            operands: vc.operands.iter().map(|op| op.iter().map(net_name).collect()).collect(),
            outputs: vc.output_nets.iter().map(net_name).collect(),
            control_signals: vc.control_signals.iter().map(net_name).collect(),
            operation: vc
                .merged_operation()
                .render(&|n| netlist.net(n).name.clone()),
        })
        .collect()
}

fn resolve_gates(netlist: &Netlist, names: &[String]) -> anyhow::Result<Vec<GateId>> {
    names
        .iter()
        .map(|name| {
            netlist
                .gate_by_name(name)
                .with_context(|| format!("no gate named '{}'", name))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder().try_init();
    let args = Args::parse();

    let text = std::fs::read_to_string(&args.netlist)
        .with_context(|| format!("reading netlist: {}", args.netlist.display()))?;
    let mut netlist = Netlist::from_json(&text)
        .with_context(|| format!("parsing netlist: {}", args.netlist.display()))?;

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config: {}", path.display()))?;
            serde_json::from_str::<Configuration>(&text)
                .with_context(|| format!("parsing config: {}", path.display()))?
        }
        None => Configuration::default(),
    };
    if let Some(threads) = args.threads {
        config.max_thread_count = threads;
    }
    if let Some(priority) = args.priority {
        config.multithreading_priority = match priority {
            PriorityArg::Time => MultithreadingPriority::TimePriority,
            PriorityArg::Memory => MultithreadingPriority::MemoryPriority,
        };
    }

    let result = if args.gates.is_empty() {
        xlsynth_modid::execute(&mut netlist, &config).map_err(|e| anyhow::anyhow!("{}", e))?
    } else {
        let gates = resolve_gates(&netlist, &args.gates)?;
        xlsynth_modid::execute_on_gates(&mut netlist, &gates, &config)
            .map_err(|e| anyhow::anyhow!("{}", e))?
    };

    let candidates = summarize(&netlist, &result);
    let mut modules = Vec::new();
    if args.create_modules {
        let created = result
            .create_modules(&mut netlist)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        for m in created {
            modules.push(netlist.module(m).name.clone());
        }
    }
    let summary = Summary { candidates, modules };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(path) = &args.output {
        std::fs::write(path, netlist.to_json()?)
            .with_context(|| format!("writing netlist: {}", path.display()))?;
    }
    Ok(())
}
