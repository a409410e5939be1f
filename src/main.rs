//! Run a sprinkler program on an I2C relay board.
//!
//! Intended to be started from cron. Use `kill -USR1 <pid>` to log the
//! currently active zone, if any.

use std::{path::PathBuf, process, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn, Level};

use sprinkler::{
    config::Compact, program::Step, signals, telemetry, BusConfig, Error, Program, RelayChannel,
    Supervisor, Timing,
};

#[derive(Parser)]
#[command(name = "sprinkler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sequence irrigation zones on an I2C relay board", long_about = None)]
struct Cli {
    /// I2C bus number
    #[arg(long = "i2c-bus", global = true, default_value_t = 1)]
    bus: u32,

    /// Relay board number (1-8)
    #[arg(long, global = true, default_value_t = 1)]
    board: u8,

    /// Bus device node (default: /dev/i2c-<bus>)
    #[arg(long, global = true)]
    device: Option<PathBuf>,

    /// Pause between zones, also the shortest allowed zone time
    #[arg(long, global = true, default_value = "3s", value_parser = humantime::parse_duration)]
    settling_delay: Duration,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON plans
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program, one zone at a time
    Run {
        /// Comma-separated list of zone:duration
        #[arg(short, long)]
        program: String,

        /// Scale all times by this percentage (use 0 for testing)
        #[arg(short, long, default_value_t = 100)]
        scale: u32,
    },

    /// Print the total duration of a program without touching the board
    TotalTime {
        #[arg(short, long)]
        program: String,

        #[arg(short, long, default_value_t = 100)]
        scale: u32,
    },

    /// Print each step of a program with its scaled duration
    Plan {
        #[arg(short, long)]
        program: String,

        #[arg(short, long, default_value_t = 100)]
        scale: u32,
    },

    /// Print the currently energized relays as a logical mask
    Get,

    /// Energize the relays in MASK (0-255, decimal or 0x hex)
    Set {
        #[arg(value_parser = parse_mask)]
        mask: u8,
    },
}

#[derive(Serialize)]
struct Plan {
    steps: Vec<Step>,
    total: String,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.json, level);

    if let Err(e) = try_main(cli) {
        error!("{:#}", e);
        if e.downcast_ref::<Error>().map_or(false, Error::is_config) {
            info!("see `sprinkler --help` for usage");
        }
        process::exit(1);
    }
}

fn try_main(cli: Cli) -> Result<()> {
    let timing = Timing::new(cli.settling_delay);
    let bus = BusConfig {
        bus: cli.bus,
        board: cli.board,
        device: cli.device,
    };

    match cli.command {
        Commands::Run { program, scale } => {
            // Before any other thread exists, so every thread inherits the mask.
            let signals = signals::listen().context("failed to install signal handling")?;
            let program = Program::parse(&program, &timing)?;
            let relay = open(&bus)?;

            let supervisor = Supervisor::new(relay, timing);
            match supervisor.run(&program, scale, signals, Box::new(|_| process::exit(0))) {
                Ok(()) | Err(Error::Interrupted) => Ok(()),
                Err(e @ Error::AlreadyActive { .. }) => Err(e.into()),
                Err(e) => {
                    if e.is_transport() {
                        warn!("relay state is unknown, check it with `sprinkler get`");
                    }
                    Err(anyhow::Error::new(e).context("failed"))
                }
            }
        }
        Commands::TotalTime { program, scale } => {
            let program = Program::parse(&program, &timing)?;
            println!("{}", Compact(program.total_duration(scale, &timing)));
            Ok(())
        }
        Commands::Plan { program, scale } => {
            let program = Program::parse(&program, &timing)?;
            let plan = Plan {
                steps: program.steps(scale, &timing),
                total: Compact(program.total_duration(scale, &timing)).to_string(),
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                for step in &plan.steps {
                    println!(
                        "zone {} for {}",
                        step.event.zone(),
                        Compact(step.scaled)
                    );
                }
                println!("total {}", plan.total);
            }
            Ok(())
        }
        Commands::Get => {
            let mut relay = open(&bus)?;
            let mask = relay.get().context("can't get value")?;
            relay.close();
            println!("{}", mask);
            Ok(())
        }
        Commands::Set { mask } => {
            let mut relay = open(&bus)?;
            let result = relay.set(mask).context("set error");
            relay.close();
            result
        }
    }
}

fn open(bus: &BusConfig) -> Result<RelayChannel> {
    let relay = match &bus.device {
        Some(path) => RelayChannel::open_path(path, bus.board),
        None => RelayChannel::open(bus.bus, bus.board),
    };
    relay.with_context(|| {
        format!("can't find board {} on {}", bus.board, bus.device_path().display())
    })
}

fn parse_mask(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid mask {:?}: {}", s, e))
}
