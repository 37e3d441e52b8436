use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use basalt_runner::{
    find_entry, load_interface, Layout, Runner, RunnerConfig, RunReport, DEFAULT_MAX_STEPS,
};
use basalt_vm::Program;

#[derive(Parser)]
#[command(name = "basalt-runner")]
#[command(about = "Entry-point invocation and relocation driver.", long_about = None)]
struct Cli {
    /// Compiled program document (basalt.program JSON).
    #[arg(long)]
    program: PathBuf,

    /// Interface document with the declared function signatures.
    #[arg(long)]
    interface: PathBuf,

    /// Substring that selects the entry function.
    #[arg(long, default_value = "main")]
    entry_marker: String,

    #[arg(long, value_enum, default_value_t = Layout::Extended)]
    layout: Layout,

    /// Drop unknown or missing builtins instead of failing the run.
    #[arg(long)]
    allow_missing_builtins: bool,

    #[arg(long)]
    disable_trace_padding: bool,

    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    max_steps: u64,

    /// Print the per-segment relocation table to stdout.
    #[arg(long)]
    print_relocation_table: bool,

    /// Print the relocated memory image to stdout.
    #[arg(long)]
    print_memory: bool,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();

    let program_text = std::fs::read_to_string(&cli.program)
        .with_context(|| format!("read program: {}", cli.program.display()))?;
    let program = Program::from_json(&program_text)
        .with_context(|| format!("load program: {}", cli.program.display()))?;
    let interface = load_interface(&cli.interface)?;
    let entry = find_entry(&interface, &cli.entry_marker)?.clone();

    let config = RunnerConfig {
        layout: cli.layout,
        allow_missing_builtins: cli.allow_missing_builtins,
        disable_trace_padding: cli.disable_trace_padding,
        max_steps: cli.max_steps,
    };

    let runner = Runner::new(program, config)?;
    let active = runner.start(&entry)?;

    let report = match active.run() {
        Ok(halted) => {
            let relocated = halted.relocate()?;
            if cli.print_relocation_table {
                for (segment, base) in relocated.table.iter().enumerate() {
                    println!("segment {segment}: base {base}");
                }
            }
            if cli.print_memory {
                for (address, value) in &relocated.memory {
                    println!("{address}\t{value:#x}");
                }
            }
            RunReport::success(&entry, cli.layout, &relocated)
        }
        Err(fault) => {
            eprintln!("run faulted: {fault}");
            RunReport::fault(&entry, cli.layout, fault.to_string())
        }
    };

    let ok = report.ok;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(std::process::ExitCode::from(if ok { 0 } else { 1 }))
}
