use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pc8086_rs::isa::register::Reg;
use pc8086_rs::{DiagnosticSink, Diagnostics, Machine, MachineConfig, Severity, TracingSink};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a BIOS image or COM program on the pc8086-rs machine model")]
struct Opts {
    /// BIOS image mapped at the top of memory; defaults to a page of HLT
    #[arg(short, long)]
    bios: Option<PathBuf>,
    /// COM program loaded at <SEGMENT>:0100
    #[arg(short, long)]
    program: Option<PathBuf>,
    #[arg(long, default_value = "0x1000", value_parser = parse_u16)]
    segment: u16,
    /// JSON machine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u64,
    /// Print the per-instruction trace
    #[arg(short, long)]
    trace: bool,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let r = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    r.map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let mut cfg = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<MachineConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => MachineConfig::default(),
    };
    cfg.cpu.trace = opts.trace;

    let bios = match &opts.bios {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        None => vec![0xF4; 16],
    };

    // traces are collected and printed; otherwise faults go to the log
    if opts.trace {
        let mut machine = Machine::new(cfg, bios);
        let result = boot(&mut machine, &opts);
        print_diagnostics(&machine.diag);
        result
    } else {
        let mut machine = Machine::with_sink(cfg, bios, TracingSink);
        boot(&mut machine, &opts)
    }
}

fn boot<S: DiagnosticSink>(machine: &mut Machine<S>, opts: &Opts) -> Result<()> {
    if let Some(path) = &opts.program {
        let image = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        machine.load_com(opts.segment, &image);
    }
    let steps = machine.run(opts.max_steps)?;
    println!(
        "{} steps, halted={}, CS:IP={:04X}:{:04X}",
        steps,
        machine.cpu.halted,
        machine.cpu.reg(Reg::CS),
        machine.cpu.ip()
    );
    Ok(())
}

fn print_diagnostics(diag: &Diagnostics) {
    for d in &diag.entries {
        match d.severity {
            Severity::Trace => println!("{}", d.message),
            Severity::Fault => eprintln!("FAULT: {}", d.message),
        }
    }
}
