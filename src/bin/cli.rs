//! renode-ctl
//!
//! Command-line front end for the Renode external control protocol.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use renode_extctl::protocol::ReturnCodeTable;
use renode_extctl::{AccessWidth, ClientConfig, GpioState, Machine, Session, TimeUnit};
use tracing_subscriber::{fmt, EnvFilter};

/// Renode external control CLI
#[derive(Parser, Debug)]
#[command(name = "renode-ctl")]
#[command(about = "Drive a Renode instance over the external control protocol")]
#[command(version)]
struct Args {
    /// Server address (host:port, [v6]:port or tcp://host:port)
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    server: String,

    /// Machine to operate on
    #[arg(short, long, default_value = "machine-0")]
    machine: String,

    /// Socket read timeout in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    timeout_ms: u64,

    /// Server numbers return codes from 1 instead of 0
    #[arg(long)]
    one_based: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current emulation time
    Time {
        #[arg(short, long, value_enum, default_value = "us")]
        unit: Unit,
    },

    /// Advance emulation
    RunFor {
        duration: u64,

        #[arg(short, long, value_enum, default_value = "ms")]
        unit: Unit,
    },

    /// Look up the machine and print its descriptor
    Machine,

    /// ADC access
    Adc {
        /// Peripheral path, e.g. sysbus.adc1
        path: String,

        #[command(subcommand)]
        op: AdcCommand,
    },

    /// GPIO access
    Gpio {
        /// Peripheral path, e.g. sysbus.gpioPortA
        path: String,

        #[command(subcommand)]
        op: GpioCommand,
    },

    /// System bus access
    Bus {
        /// Initiator node path
        #[arg(long, default_value = "sysbus.cpu")]
        node: String,

        /// System bus path
        #[arg(long, default_value = "sysbus")]
        bus: String,

        #[command(subcommand)]
        op: BusCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AdcCommand {
    /// Print the channel count
    Count,
    /// Print a channel value
    Get { channel: u32 },
    /// Set a channel value
    Set { channel: u32, value: u32 },
}

#[derive(Subcommand, Debug)]
enum GpioCommand {
    /// Print a pin state
    Get { pin: u32 },
    /// Drive a pin
    Set {
        pin: u32,
        #[arg(value_enum)]
        state: Level,
    },
    /// Print state changes of a pin
    Watch {
        pin: u32,

        /// How long to watch, in milliseconds
        #[arg(long, default_value = "10000")]
        duration_ms: u64,
    },
}

#[derive(Subcommand, Debug)]
enum BusCommand {
    /// Read from the bus
    Read {
        #[arg(value_parser = parse_number)]
        address: u64,

        #[arg(short, long, value_enum, default_value = "dword")]
        width: Width,

        /// Read this many bytes instead of one scalar
        #[arg(short, long)]
        count: Option<u32>,
    },
    /// Write one scalar to the bus
    Write {
        #[arg(value_parser = parse_number)]
        address: u64,

        #[arg(value_parser = parse_number)]
        value: u64,

        #[arg(short, long, value_enum, default_value = "dword")]
        width: Width,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Unit {
    Us,
    Ms,
    S,
}

impl From<Unit> for TimeUnit {
    fn from(unit: Unit) -> Self {
        match unit {
            Unit::Us => TimeUnit::Microseconds,
            Unit::Ms => TimeUnit::Milliseconds,
            Unit::S => TimeUnit::Seconds,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Level {
    Low,
    High,
}

impl From<Level> for GpioState {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => GpioState::Low,
            Level::High => GpioState::High,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Width {
    Byte,
    Word,
    Dword,
    Qword,
}

impl From<Width> for AccessWidth {
    fn from(width: Width) -> Self {
        match width {
            Width::Byte => AccessWidth::Byte,
            Width::Word => AccessWidth::Word,
            Width::Dword => AccessWidth::DWord,
            Width::Qword => AccessWidth::QWord,
        }
    }
}

/// Decimal or 0x-prefixed hex
fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,renode_extctl=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("renode-ctl v{}", renode_extctl::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> renode_extctl::Result<()> {
    let mut config = ClientConfig::from_address(&args.server)?;
    config.read_timeout_ms = args.timeout_ms;
    if args.one_based {
        config.return_codes = ReturnCodeTable::one_based();
    }

    tracing::info!("Connecting to {}:{}", config.host, config.port);
    let session = Session::connect_with(config)?;
    session.negotiate()?;

    match args.command {
        Commands::Time { unit } => {
            println!("{}", session.get_time(unit.into())?);
        }
        Commands::RunFor { duration, unit } => {
            session.run_for(duration, unit.into())?;
        }
        Commands::Machine => {
            let machine = session.get_machine(&args.machine)?;
            println!("{} -> {}", machine.name(), machine.descriptor());
        }
        Commands::Adc { path, op } => {
            let machine = session.get_machine(&args.machine)?;
            run_adc(&machine, &path, op)?;
        }
        Commands::Gpio { path, op } => {
            let machine = session.get_machine(&args.machine)?;
            run_gpio(&session, &machine, &path, op)?;
        }
        Commands::Bus { node, bus, op } => {
            let machine = session.get_machine(&args.machine)?;
            let context = machine.get_sys_bus(&bus)?.bus_context(&node)?;
            match op {
                BusCommand::Read { address, count: Some(count), .. } => {
                    let bytes = context.read_bytes(address, count)?;
                    println!("{}", renode_extctl::protocol::hex_dump(&bytes));
                }
                BusCommand::Read { address, width, count: None } => {
                    println!("{:#x}", context.read(address, width.into())?);
                }
                BusCommand::Write { address, value, width } => {
                    context.write(address, width.into(), value)?;
                }
            }
        }
    }

    session.disconnect();
    Ok(())
}

fn run_adc(machine: &Machine, path: &str, op: AdcCommand) -> renode_extctl::Result<()> {
    let adc = machine.get_adc(path)?;
    match op {
        AdcCommand::Count => println!("{}", adc.channel_count()?),
        AdcCommand::Get { channel } => println!("{}", adc.get_channel_value(channel)?),
        AdcCommand::Set { channel, value } => adc.set_channel_value(channel, value)?,
    }
    Ok(())
}

fn run_gpio(
    session: &Arc<Session>,
    machine: &Machine,
    path: &str,
    op: GpioCommand,
) -> renode_extctl::Result<()> {
    let gpio = machine.get_gpio(path)?;
    match op {
        GpioCommand::Get { pin } => println!("{:?}", gpio.get_state(pin)?),
        GpioCommand::Set { pin, state } => gpio.set_state(pin, state.into())?,
        GpioCommand::Watch { pin, duration_ms } => {
            let handle = gpio.register_state_change_callback(pin, |event| {
                println!("{} us: pin {} {:?}", event.timestamp_us, event.pin, event.state);
            })?;
            tracing::info!("Watching pin {} for {} ms", pin, duration_ms);

            let deadline = Instant::now() + Duration::from_millis(duration_ms);
            while let Some(left) = deadline
                .checked_duration_since(Instant::now())
                .filter(|left| !left.is_zero())
            {
                session.poll_events(left.min(Duration::from_millis(100)))?;
            }
            gpio.unregister(handle)?;
        }
    }
    Ok(())
}
