use allhigh_board::{CLOCK, PIN_PLAN};
use allhigh_config::{ChipDescriptor, SysclkSource, TestScript, MAX_RESETS};
use allhigh_core::bus::SystemBus;
use allhigh_core::metrics::AccessMetrics;
use allhigh_core::snapshot::BankReport;
use allhigh_core::{Machine, SimResult};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

mod check;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log every register access
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the per-bank pin configuration applied at boot
    Plan {
        #[arg(long)]
        json: bool,
    },
    /// Boot the firmware on the simulated board and report pin states
    Simulate {
        /// Chip descriptor (YAML); built-in STM32F407 map when omitted
        #[arg(long)]
        chip: Option<PathBuf>,

        /// Additional hardware reset cycles after the first power-on
        #[arg(long, default_value = "0")]
        resets: u32,

        /// Write a JSON snapshot of the final board state
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Run a pin-check script and write result.json
    Test {
        #[arg(long)]
        script: PathBuf,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct TestConfig {
    script: String,
    chip: Option<String>,
}

#[derive(Debug, Serialize)]
struct TestResult {
    result_schema_version: &'static str,
    status: &'static str,
    boots: u32,
    resets: u32,
    deterministic: Option<bool>,
    sysclk_source: Option<SysclkSource>,
    state_hash: Option<String>,
    register_writes: u64,
    message: Option<String>,
    assertions: Vec<check::AssertionResult>,
    config: TestConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `plan --json` stays machine-readable.
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    let code = match cli.command {
        Command::Plan { json } => match run_plan(json) {
            Ok(()) => EXIT_PASS,
            Err(e) => {
                error!("{:#}", e);
                EXIT_RUNTIME_ERROR
            }
        },
        Command::Simulate {
            chip,
            resets,
            snapshot,
        } => run_simulate(chip.as_deref(), resets, snapshot.as_deref()),
        Command::Test { script, output_dir } => run_test(&script, output_dir.as_deref()),
    };
    ExitCode::from(code)
}

fn run_plan(json: bool) -> anyhow::Result<()> {
    if json {
        let banks: Vec<_> = PIN_PLAN
            .iter()
            .map(|bank| {
                let config = bank.config();
                serde_json::json!({
                    "port": bank.port.to_string(),
                    "mask": bank.mask().bits(),
                    "reserved": bank.reserved.bits(),
                    "mode": config.mode.as_str(),
                    "output_type": config.output_type.as_str(),
                    "pull": config.pull.as_str(),
                    "speed": config.speed.as_str(),
                })
            })
            .collect();
        let doc = serde_json::json!({
            "sysclk_hz": CLOCK.sysclk_hz(),
            "banks": banks,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!(
        "SYSCLK: {} MHz (hardware default, not reconfigured)",
        CLOCK.sysclk_hz() / 1_000_000
    );
    println!(
        "{:<6} {:<7} {:<10} {:<7} {:<10} {:<5} speed",
        "bank", "mask", "excluded", "mode", "type", "pull"
    );
    for bank in &PIN_PLAN {
        let config = bank.config();
        let excluded: Vec<String> = bank
            .reserved
            .indices()
            .map(|n| format!("P{}{}", bank.port.letter(), n))
            .collect();
        let excluded = if excluded.is_empty() {
            "-".to_string()
        } else {
            excluded.join(",")
        };
        println!(
            "{:<6} {:#06x}  {:<10} {:<7} {:<10} {:<5} {}",
            bank.port.to_string(),
            bank.mask().bits(),
            excluded,
            config.mode.as_str(),
            config.output_type.as_str(),
            config.pull.as_str(),
            config.speed.as_str()
        );
    }
    Ok(())
}

fn load_bus(chip: Option<&Path>) -> anyhow::Result<SystemBus> {
    match chip {
        Some(path) => {
            info!("Loading chip descriptor: {:?}", path);
            let chip = ChipDescriptor::from_file(path)?;
            info!("Chip: {} ({})", chip.name, chip.arch);
            SystemBus::from_config(&chip)
        }
        None => {
            info!("Using default hardware configuration");
            Ok(SystemBus::new())
        }
    }
}

/// Power on, then reset `resets` times. Returns whether every cycle ended in
/// the same pin state as the first boot.
fn boot_and_cycle(machine: &mut Machine, resets: u32) -> SimResult<bool> {
    machine.power_on()?;
    let first = machine.pin_report();
    let mut identical = true;
    for cycle in 1..=resets {
        machine.reset()?;
        if machine.pin_report() != first {
            warn!("Reset cycle {} diverged from the first boot", cycle);
            identical = false;
        }
    }
    Ok(identical)
}

fn state_hash(report: &[BankReport]) -> anyhow::Result<String> {
    let bytes = serde_json::to_vec(report)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

fn print_report(report: &[BankReport]) {
    for bank in report {
        println!(
            "{:<6} configured={:#06x} high={:#06x}",
            bank.port, bank.configured, bank.driven_high
        );
    }
}

fn run_simulate(chip: Option<&Path>, resets: u32, snapshot: Option<&Path>) -> u8 {
    if resets > MAX_RESETS {
        error!("--resets must not exceed {} (got {})", MAX_RESETS, resets);
        return EXIT_CONFIG_ERROR;
    }

    let bus = match load_bus(chip) {
        Ok(bus) => bus,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    let metrics = Arc::new(AccessMetrics::new());
    let mut machine = Machine::with_bus(bus);
    machine.observers.push(metrics.clone());

    let deterministic = match boot_and_cycle(&mut machine, resets) {
        Ok(d) => d,
        Err(e) => {
            error!("Simulation error: {}", e);
            return EXIT_RUNTIME_ERROR;
        }
    };

    let report = machine.pin_report();
    print_report(&report);
    println!(
        "boots={} deterministic={} reads={} writes={}",
        machine.boot_count(),
        deterministic,
        metrics.get_reads(),
        metrics.get_writes()
    );

    if let Some(path) = snapshot {
        let written = serde_json::to_string_pretty(&machine.snapshot())
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(path, json).map_err(anyhow::Error::from));
        if let Err(e) = written {
            error!("Failed to write snapshot to {:?}: {:#}", path, e);
            return EXIT_RUNTIME_ERROR;
        }
        info!("Snapshot written to {:?}", path);
    }

    EXIT_PASS
}

fn write_result(output_dir: Option<&Path>, result: &TestResult) -> anyhow::Result<()> {
    let Some(dir) = output_dir else {
        return Ok(());
    };
    std::fs::create_dir_all(dir)?;
    let path = dir.join("result.json");
    std::fs::write(&path, serde_json::to_string_pretty(result)?)?;
    info!("Result written to {:?}", path);
    Ok(())
}

impl TestResult {
    fn new(script_path: &Path) -> Self {
        Self {
            result_schema_version: "1.0",
            status: "pass",
            boots: 0,
            resets: 0,
            deterministic: None,
            sysclk_source: None,
            state_hash: None,
            register_writes: 0,
            message: None,
            assertions: Vec::new(),
            config: TestConfig {
                script: script_path.display().to_string(),
                chip: None,
            },
        }
    }
}

/// Record an aborted run in result.json and return `code`.
fn fail(
    output_dir: Option<&Path>,
    result: &mut TestResult,
    err: &anyhow::Error,
    code: u8,
) -> u8 {
    error!("{:#}", err);
    result.status = "error";
    result.message = Some(format!("{:#}", err));
    if let Err(e) = write_result(output_dir, result) {
        error!("{:#}", e);
    }
    code
}

fn run_test(script_path: &Path, output_dir: Option<&Path>) -> u8 {
    let mut result = TestResult::new(script_path);

    let script = match TestScript::from_file(script_path) {
        Ok(s) => s,
        Err(e) => return fail(output_dir, &mut result, &e, EXIT_CONFIG_ERROR),
    };
    result.resets = script.limits.resets;

    // Chip paths are relative to the script.
    let chip_path = script.inputs.chip.as_ref().map(|chip| {
        script_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(chip)
    });
    result.config.chip = chip_path.as_ref().map(|p| p.display().to_string());

    let bus = match load_bus(chip_path.as_deref()) {
        Ok(bus) => bus,
        Err(e) => return fail(output_dir, &mut result, &e, EXIT_CONFIG_ERROR),
    };

    let metrics = Arc::new(AccessMetrics::new());
    let mut machine = Machine::with_bus(bus);
    machine.observers.push(metrics.clone());

    let outcome = boot_and_cycle(&mut machine, script.limits.resets);
    result.boots = machine.boot_count();
    result.register_writes = metrics.get_writes();

    let deterministic = match outcome {
        Ok(d) => d,
        Err(e) => {
            let err = anyhow::Error::from(e).context("Simulation error");
            return fail(output_dir, &mut result, &err, EXIT_RUNTIME_ERROR);
        }
    };

    let report = machine.pin_report();
    result.deterministic = Some(deterministic);
    result.sysclk_source = machine.bus.rcc().and_then(|rcc| rcc.sysclk_source());
    result.state_hash = match state_hash(&report) {
        Ok(hash) => Some(hash),
        Err(e) => return fail(output_dir, &mut result, &e, EXIT_RUNTIME_ERROR),
    };

    for assertion in &script.assertions {
        match check::evaluate(assertion, &machine, deterministic) {
            Ok(outcome) => {
                let mark = if outcome.passed { "PASS" } else { "FAIL" };
                println!("{}  {}", mark, outcome.detail);
                if !outcome.passed {
                    result.status = "fail";
                }
                result.assertions.push(outcome);
            }
            Err(e) => return fail(output_dir, &mut result, &e, EXIT_CONFIG_ERROR),
        }
    }

    info!(
        "{} assertion(s), status {}, state hash {}",
        result.assertions.len(),
        result.status,
        result.state_hash.as_deref().unwrap_or("-")
    );

    if let Err(e) = write_result(output_dir, &result) {
        error!("{:#}", e);
        return EXIT_RUNTIME_ERROR;
    }

    if result.status == "pass" {
        EXIT_PASS
    } else {
        EXIT_ASSERT_FAIL
    }
}
