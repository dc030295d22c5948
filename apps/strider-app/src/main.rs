//! Strider whole-body controller CLI.
//!
//! Provides three modes of operation:
//! - `run`: Close the loop between the controller and the simulated robot
//! - `config`: Print the default configuration as TOML
//! - `info`: Print workspace crate versions

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strider_core::prelude::*;
use strider_sim::{SimConfig, SimRobot};
use strider_wbc::{ControlLoop, Controller, shared};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Strider whole-body velocity controller.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller against the simulated robot and print a summary.
    Run {
        /// Controller configuration (TOML). Defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of control ticks.
        #[arg(short, long, default_value_t = 500)]
        ticks: u64,

        /// Seed of the simulated robot.
        #[arg(short, long, default_value_t = 0)]
        seed: u64,

        /// Support phase, overriding the configuration.
        #[arg(long, value_enum)]
        support: Option<SupportArg>,

        /// Desired CoM displacement along x (m).
        #[arg(long, default_value_t = 0.01)]
        com_offset: f64,

        /// Write one JSON telemetry record per tick to this file.
        #[arg(long)]
        telemetry: Option<PathBuf>,

        /// Tick on the periodic control thread at the configured rate instead
        /// of as fast as possible.
        #[arg(long)]
        realtime: bool,
    },

    /// Print the default configuration as TOML.
    Config,

    /// Print crate information.
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum SupportArg {
    Double,
    Left,
    Right,
}

impl From<SupportArg> for SupportPhase {
    fn from(arg: SupportArg) -> Self {
        match arg {
            SupportArg::Double => Self::Double,
            SupportArg::Left => Self::Left,
            SupportArg::Right => Self::Right,
        }
    }
}

// ---------------------------------------------------------------------------
// JsonLinesTransport
// ---------------------------------------------------------------------------

/// Feeds a constant desired state and writes telemetry as JSON lines.
struct JsonLinesTransport {
    input: StreamInput,
    writer: Option<BufWriter<File>>,
}

impl JsonLinesTransport {
    fn new(input: StreamInput, path: Option<&Path>) -> AppResult<Self> {
        let writer = path.map(File::create).transpose()?.map(BufWriter::new);
        Ok(Self { input, writer })
    }
}

impl StreamTransport for JsonLinesTransport {
    fn read_inputs(&mut self) -> Option<StreamInput> {
        Some(self.input.clone())
    }

    fn publish(&mut self, telemetry: &Telemetry) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let written = serde_json::to_writer(&mut *writer, telemetry)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        if let Err(e) = written {
            warn!("strider: telemetry write failed: {e}");
            self.writer = None;
        }
    }
}

impl Drop for JsonLinesTransport {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("strider: telemetry flush failed: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

struct RunOptions {
    config: Option<PathBuf>,
    ticks: u64,
    seed: u64,
    support: Option<SupportArg>,
    com_offset: f64,
    telemetry: Option<PathBuf>,
    realtime: bool,
}

fn run(opts: RunOptions) -> AppResult<()> {
    let mut config = match &opts.config {
        Some(path) => ControllerConfig::from_file(path).map_err(StriderError::from)?,
        None => ControllerConfig::default(),
    };
    if let Some(support) = opts.support {
        config.support_phase = support.into();
    }
    let dt = config.period_secs();
    let period = Duration::from_millis(config.period_ms);

    let robot = SimRobot::new(SimConfig {
        full_dofs: config.full_dofs,
        seed: opts.seed,
        links: config.links.clone(),
        ..SimConfig::default()
    });
    let mut controller = Controller::new(robot, config).map_err(StriderError::from)?;
    controller.start().map_err(StriderError::from)?;

    let t = controller.telemetry();
    let start_com = t.com;
    let input = StreamInput {
        com: [start_com[0] + opts.com_offset, start_com[1]],
        foot: t.foot,
        posture: controller.desired().posture.as_slice().to_vec(),
    };
    let target = input.com;
    let mut transport = JsonLinesTransport::new(input, opts.telemetry.as_deref())?;

    let (controller, overruns) = if opts.realtime {
        let control = ControlLoop::spawn_with(shared(controller), transport, period, move |c| {
            c.robot_mut().step(dt);
        })?;
        std::thread::sleep(period * u32::try_from(opts.ticks).unwrap_or(u32::MAX));
        let shared = std::sync::Arc::clone(control.controller());
        let summary = control.shutdown();
        if summary.errors > 0 {
            warn!("strider: {} ticks returned errors", summary.errors);
        }
        (shared, summary.overruns)
    } else {
        for _ in 0..opts.ticks {
            let input = transport.read_inputs();
            controller.tick(input).map_err(StriderError::from)?;
            transport.publish(controller.telemetry());
            controller.robot_mut().step(dt);
        }
        controller.stop();
        (shared(controller), 0)
    };

    let c = controller.lock();
    let t = c.telemetry();
    let error = |com: [f64; 2]| (com[0] - target[0]).hypot(com[1] - target[1]);
    println!("ticks:            {}", t.tick);
    println!("support phase:    {:?}", t.support_phase);
    println!("active joints:    {} of {}", t.active_joints, c.dims().full_dofs);
    println!("CoM error:        {:.3e} m (initial {:.3e} m)", error(t.com), error(start_com));
    println!("contact residual: {:.3e}", t.contact_residual);
    println!("degraded reads:   {}", c.degraded_reads());
    println!("overruns:         {overruns}");
    info!("strider: run finished");
    Ok(())
}

fn run_config() -> AppResult<()> {
    print!("{}", toml::to_string_pretty(&ControllerConfig::default())?);
    Ok(())
}

fn run_info() {
    println!("strider v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  strider-core        {}", env!("CARGO_PKG_VERSION"));
    println!("  strider-wbc         {}", env!("CARGO_PKG_VERSION"));
    println!("  strider-sim         {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("edition: 2024");
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            config,
            ticks,
            seed,
            support,
            com_offset,
            telemetry,
            realtime,
        }) => run(RunOptions {
            config,
            ticks,
            seed,
            support,
            com_offset,
            telemetry,
            realtime,
        }),
        Some(Commands::Config) => run_config(),
        Some(Commands::Info) => {
            run_info();
            Ok(())
        }
        None => run(RunOptions {
            config: None,
            ticks: 500,
            seed: 0,
            support: None,
            com_offset: 0.01,
            telemetry: None,
            realtime: false,
        }),
    }
}
