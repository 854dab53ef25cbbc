//! Headless control panel for OpenDPS power supplies.
//!
//! `dps-panel monitor` polls the device and prints every status update;
//! the other subcommands perform one user action and exit.
//!
//! ```bash
//! dps-panel --device /dev/ttyUSB0 monitor
//! dps-panel --mock mode cl
//! dps-panel --device 192.168.1.251 set voltage 3300
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dps_panel::{
    adapters,
    channel::CommandChannel,
    config::{BackendKind, PanelConfig, DEFAULT_CONFIG_PATH},
    error::PanelError,
    protocol::{self, Command, Function, ParameterKind, TargetId},
    session::{
        ChannelObserver, DisplayState, Session, SessionHandle, SessionOptions, StatusUpdate,
    },
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long one-shot commands wait for the first poll.
const FIRST_POLL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "dps-panel", version, about = "Control panel for OpenDPS power supplies")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial port or network address of the device
    #[arg(short, long)]
    device: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baudrate: Option<u32>,

    /// Use the built-in mock power supply instead of dpsctl
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Poll the device and print status updates (default)
    Monitor {
        /// Print updates as JSON lines
        #[arg(long)]
        json: bool,
        /// Stop after this many updates
        #[arg(long)]
        count: Option<usize>,
    },
    /// Check that the device answers
    Ping,
    /// Print one decoded status
    Query {
        #[arg(long)]
        json: bool,
    },
    /// Switch function (output is turned off first)
    Mode { function: Function },
    /// Start or stop the output
    Toggle,
    /// Set a target value in milli-units
    Set {
        parameter: ParameterKind,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Lock the front panel
    Lock,
    /// Unlock the front panel
    Unlock,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PanelConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(device) = &cli.device {
        config.device.target = device.clone();
    }
    if let Some(baudrate) = cli.baudrate {
        config.device.baudrate = baudrate;
    }
    if cli.mock {
        config.device.backend = BackendKind::Mock;
    }
    config.validate()?;

    init_tracing(&config.application.log_level);
    info!(
        target_device = %config.device.target,
        backend = ?config.device.backend,
        "Starting {}",
        config.application.name
    );

    let channel = CommandChannel::new(
        adapters::from_config(&config.device),
        TargetId::new(&config.device.target),
    )
    .with_slow_call_warning(config.polling.slow_call_warning());

    let action = cli.command.unwrap_or(Action::Monitor {
        json: false,
        count: None,
    });
    let result = run(action, channel, &config).await;
    if let Err(error) = &result {
        if error
            .downcast_ref::<PanelError>()
            .is_some_and(PanelError::is_recoverable)
        {
            warn!("The device may answer if the command is repeated");
        }
    }
    result
}

async fn run(action: Action, channel: CommandChannel, config: &PanelConfig) -> Result<()> {
    match action {
        Action::Monitor { json, count } => monitor(channel, config, json, count).await,
        Action::Ping => {
            let text = channel.execute(Command::ping()).await.into_result()?;
            println!("{}", text.trim());
            Ok(())
        }
        Action::Query { json } => {
            let text = channel.execute(Command::query()).await.into_result()?;
            let record = protocol::parse(&text).map_err(PanelError::from)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_update(&StatusUpdate::Record {
                    display: DisplayState::derive(&record),
                    record,
                });
            }
            Ok(())
        }
        Action::Mode { function } => {
            let handle = start_session(channel, config).await?;
            handle.request_mode_change(function).await?;
            println!("Mode set to {}", function.mode());
            Ok(())
        }
        Action::Toggle => {
            let handle = start_session(channel, config).await?;
            handle.toggle_running().await?;
            let running = handle.snapshot().power_on;
            println!("Output {}", if running { "on" } else { "off" });
            Ok(())
        }
        Action::Set { parameter, value } => {
            let handle = start_session(channel, config).await?;
            handle.set_parameter_text(parameter, &value).await?;
            println!("{} set to {}", parameter, value.trim());
            Ok(())
        }
        Action::Lock => set_locked(channel, config, true).await,
        Action::Unlock => set_locked(channel, config, false).await,
        Action::Config => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dps_panel={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn monitor(
    channel: CommandChannel,
    config: &PanelConfig,
    json: bool,
    count: Option<usize>,
) -> Result<()> {
    let (observer, mut updates) = ChannelObserver::new();
    let (_handle, task) = Session::spawn(channel, SessionOptions::from(&config.polling), observer);

    let mut seen = 0usize;
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                if json {
                    println!("{}", serde_json::to_string(&update)?);
                } else {
                    print_update(&update);
                }
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    task.abort();
    Ok(())
}

/// Spawn a session without the startup ping and wait for its first poll.
async fn start_session(channel: CommandChannel, config: &PanelConfig) -> Result<SessionHandle> {
    let options = SessionOptions {
        ping_on_start: false,
        ..SessionOptions::from(&config.polling)
    };
    let (handle, _task) = Session::spawn(channel, options, |_: &StatusUpdate| {});

    let mut snapshots = handle.subscribe();
    let first = tokio::time::timeout(
        FIRST_POLL_TIMEOUT,
        snapshots.wait_for(|s| s.last_good_record.is_some() || s.comm_error.is_some()),
    )
    .await
    .context("Timed out waiting for the device")?
    .context("Session stopped before the first poll")?
    .clone();

    if first.comm_error.is_some() {
        bail!("Device at {} did not answer the status query", config.device.target);
    }
    Ok(handle)
}

async fn set_locked(channel: CommandChannel, config: &PanelConfig, locked: bool) -> Result<()> {
    let handle = start_session(channel, config).await?;
    handle.set_locked(locked).await?;
    println!("Front panel {}", if locked { "locked" } else { "unlocked" });
    Ok(())
}

fn print_update(update: &StatusUpdate) {
    match update {
        StatusUpdate::Record { record, display } => match display {
            Some(display) => println!(
                "{:<5} {:<8} set {:>5} mV {:>5} mA | in {} out {} {}",
                display.mode_label,
                display.running_label,
                record.target_voltage_millivolts,
                record.target_current_milliamps,
                record.input_voltage_text,
                record.output_voltage_text,
                record.output_current_text,
            ),
            None => println!("{} (not supported by this panel)", record.mode),
        },
        StatusUpdate::CommError { at, reason } => {
            println!("[{}] communication error: {}", at.format("%H:%M:%S"), reason)
        }
    }
}
