//! CLI entry point for beamline_daq.
//!
//! Provides a command-line interface for:
//! - Running a demonstration sweep against mock hardware (`sweep`)
//! - Building a trigger program and dumping it as JSON for offline
//!   inspection (`program`)
//!
//! The binary never talks to real beamline hardware; it exists so the
//! trigger pipeline (translate, build program, admission gate, arm, motion,
//! disarm, reset) can be exercised and inspected end to end without a
//! beamline.
//!
//! # Usage
//!
//! Run a mock sweep on the sequencer back-end:
//! ```bash
//! beamline_daq sweep --controller sequencer --steps 10 --step-size-mm 0.1
//! ```
//!
//! Dump the gate program for a rotation collection:
//! ```bash
//! beamline_daq program --controller gate --topology rotation
//! ```

use anyhow::{Context, Result};
use beamline_daq::actor::TriggerActor;
use beamline_daq::admission::PeriodicTopupGate;
use beamline_daq::arming::ArmSignals;
use beamline_daq::config::Settings;
use beamline_daq::gate::{configure, DetectorKind, Topology};
use beamline_daq::geometry::{ScanGeometry, SweepDirection};
use beamline_daq::hardware::MockController;
use beamline_daq::logging;
use beamline_daq::messages::SweepCommand;
use beamline_daq::sequencer::build_table;
use beamline_daq::sweep::{run_sweep, SweepPlan, TriggerProgram};
use beamline_daq::timing::translate;
use clap::{Parser, Subcommand, ValueEnum};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "beamline_daq")]
#[command(about = "Hardware trigger sequencing for synchrotron XRD collection", long_about = None)]
struct Cli {
    /// Path to a TOML settings file
    #[arg(long, default_value = "config/beamline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demonstration sweep against mock hardware
    Sweep {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Build a trigger program and print it as JSON
    Program {
        #[command(flatten)]
        scan: ScanArgs,
    },
}

#[derive(clap::Args)]
struct ScanArgs {
    /// Trigger controller back-end
    #[arg(long, value_enum, default_value_t = ControllerArg::Sequencer)]
    controller: ControllerArg,

    /// Experiment topology (gate controller only)
    #[arg(long, value_enum, default_value_t = TopologyArg::ContinuousSweep)]
    topology: TopologyArg,

    /// Detector family
    #[arg(long, value_enum, default_value_t = DetectorArg::Eiger)]
    detector: DetectorArg,

    /// Sweep start position in mm
    #[arg(long, default_value_t = 0.0)]
    start_mm: f64,

    /// Step size in mm
    #[arg(long, default_value_t = 0.1)]
    step_size_mm: f64,

    /// Number of exposure positions
    #[arg(long, default_value_t = 10)]
    steps: u32,

    /// Exposure time per image in seconds
    #[arg(long, default_value_t = 0.01)]
    exposure_s: f64,

    /// Detector dead time in seconds
    #[arg(long, default_value_t = 1e-6)]
    dead_time_s: f64,

    /// Exposures per position
    #[arg(long, default_value_t = 1)]
    exposures: u32,

    /// Stimulus dwell for pump-probe, seconds
    #[arg(long, default_value_t = 0.002)]
    pump_duration_s: f64,

    /// Stimulus-to-probe delay for pump-probe, seconds
    #[arg(long, default_value_t = 0.005)]
    pump_delay_s: f64,
}

#[derive(ValueEnum, Clone, Copy)]
enum ControllerArg {
    Sequencer,
    Gate,
}

#[derive(ValueEnum, Clone, Copy)]
enum TopologyArg {
    StaticShot,
    StepScan,
    ContinuousSweep,
    Rotation,
    PumpProbe,
}

#[derive(ValueEnum, Clone, Copy)]
enum DetectorArg {
    Eiger,
    Pilatus,
}

impl ScanArgs {
    fn topology(&self) -> Topology {
        match self.topology {
            TopologyArg::StaticShot => Topology::StaticShot,
            TopologyArg::StepScan => Topology::StepScan,
            TopologyArg::ContinuousSweep => Topology::ContinuousSweep,
            TopologyArg::Rotation => Topology::Rotation,
            TopologyArg::PumpProbe => Topology::PumpProbe {
                pump_duration_s: self.pump_duration_s,
                pump_to_probe_delay_s: self.pump_delay_s,
            },
        }
    }

    fn detector(&self) -> DetectorKind {
        match self.detector {
            DetectorArg::Eiger => DetectorKind::Eiger,
            DetectorArg::Pilatus => DetectorKind::Pilatus,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config).context("Failed to load settings")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid settings: {e}"))?;
    logging::init_from_settings(&settings).map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Sweep { scan } => run_mock_sweep(&settings, &scan).await,
        Commands::Program { scan } => dump_program(&settings, &scan),
    }
}

fn build_program(settings: &Settings, scan: &ScanArgs) -> Result<(TriggerProgram, f64)> {
    let geometry = ScanGeometry::new(
        scan.start_mm,
        scan.step_size_mm,
        scan.steps,
        scan.exposure_s,
        scan.dead_time_s,
        SweepDirection::Positive,
        settings.encoder.counts_per_mm,
    )?;
    let profile = translate(&geometry, scan.exposures, &settings.timing)?;
    let total_exposure_s = profile.row_duration_s();

    let program = match scan.controller {
        ControllerArg::Sequencer => {
            TriggerProgram::Sequencer(build_table(&geometry, &profile, &settings.sequencer)?)
        }
        ControllerArg::Gate => TriggerProgram::Gate(configure(
            &geometry,
            &profile,
            &scan.topology(),
            scan.detector(),
        )?),
    };
    Ok((program, total_exposure_s))
}

async fn run_mock_sweep(settings: &Settings, scan: &ScanArgs) -> Result<()> {
    let (program, total_exposure_s) = build_program(settings, scan)?;

    let controller = Arc::new(MockController::new());
    let (commands, actor) = TriggerActor::spawn(
        controller.clone(),
        ArmSignals::default(),
        &settings.arming,
        &settings.io,
    );

    let admission = PeriodicTopupGate::new(
        settings.admission.topup_period,
        settings.admission.topup_duration,
    );

    let plan = SweepPlan::with_settings(program, total_exposure_s, settings);

    // Stand-in for the externally driven motion: the mock "row" simply takes
    // as long as the planned exposure.
    let motion = async {
        tokio::time::sleep(Duration::from_secs_f64(total_exposure_s)).await;
        Ok(())
    };

    let report = run_sweep(&commands, &admission, plan, motion).await?;
    info!(run_id = %report.run_id, "mock sweep finished");

    let (cmd, rx) = SweepCommand::status();
    commands.send(cmd).await.context("actor unavailable")?;
    let status = rx.await.context("actor dropped status")?;
    println!(
        "run {} complete: {} hardware writes, final state {}",
        report.run_id, status.writes_issued, status.arm_state
    );

    let (cmd, rx) = SweepCommand::shutdown();
    commands.send(cmd).await.context("actor unavailable")?;
    rx.await.context("actor dropped shutdown ack")?;
    actor.await.context("actor task panicked")?;
    Ok(())
}

fn dump_program(settings: &Settings, scan: &ScanArgs) -> Result<()> {
    let (program, _) = build_program(settings, scan)?;
    let json = match program {
        TriggerProgram::Sequencer(table) => serde_json::to_string_pretty(&table)?,
        TriggerProgram::Gate(config) => serde_json::to_string_pretty(&config)?,
    };
    println!("{json}");
    Ok(())
}
