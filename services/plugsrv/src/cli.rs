//! Command-line interface
//!
//! One-shot device commands plus `run`, which keeps the local scheduler
//! going until SIGINT/SIGTERM.

use crate::client::{DeviceActionClient, PowerState};
use crate::config::AppConfig;
use crate::runtime::SchedulerRunner;
use crate::store::{open_store, set_store_enabled};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use common::{LogConfig, ServiceArgs};
use plug_rules::{Schedule, TimeEvent};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "plugsrv")]
#[command(about = "Control a WeMo-style smart plug and run its schedule locally")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub common: ServiceArgs,

    /// Device address; overrides device.host
    #[arg(long, global = true, env = "PLUGSRV_HOST")]
    pub host: Option<String>,

    /// Basic-control port; overrides device.port
    #[arg(short = 'p', long, global = true)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the local scheduler until interrupted
    Run {
        /// Start even if scheduler.enabled is false
        #[arg(long)]
        scheduler: bool,
    },

    /// Show relay state
    State,

    /// Switch the relay on
    On,

    /// Switch the relay off
    Off,

    /// Invert the relay state
    Toggle,

    /// Show name, signal strength, home id and ports
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the device's friendly name
    Rename {
        /// New name
        name: String,
    },

    /// Read and write the schedule
    #[command(about = "Read and write the on/off schedule")]
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },

    /// Find the port the rules service answers on
    ProbeRulesPort {
        /// Candidate ports (default: device.rules_port_candidates)
        #[arg(long, value_delimiter = ',')]
        ports: Vec<u16>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// Print the stored schedule
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace the schedule with a daily on/off window
    Set {
        /// Switch-on time (HH:MM)
        #[arg(long)]
        start: String,

        /// Switch-off time (HH:MM)
        #[arg(long)]
        stop: Option<String>,

        /// Store the schedule globally disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Enable the schedule globally
    Enable,

    /// Disable the schedule globally
    Disable,

    /// Print the device's raw GetRules response
    Raw,

    /// Print the device's rules database version
    Version,
}

impl Cli {
    /// Config file + env, then command-line overrides, validated
    pub fn load_config(&self) -> crate::Result<AppConfig> {
        let mut config = AppConfig::load(self.common.config.as_deref())?;
        if let Some(host) = &self.host {
            config.device.host = host.clone();
        }
        if let Some(port) = self.port {
            config.device.port = port;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn log_config(&self, config: &AppConfig) -> LogConfig {
        common::init_log_root(config.logging.dir.as_deref());
        let level = self
            .common
            .effective_log_level(config.logging.level.as_deref());
        let service = matches!(self.command, Commands::Run { .. });
        if service || self.common.log_to_file {
            LogConfig {
                service_name: "plugsrv".to_string(),
                log_dir: common::logging::get_log_root(),
                level,
                ..Default::default()
            }
        } else {
            LogConfig::console("plugsrv", level)
        }
    }
}

fn print_state(label: &str, state: PowerState) {
    let shown = match state {
        PowerState::On => "ON".green().bold(),
        PowerState::Off => "OFF".red().bold(),
    };
    println!("{}: {}", label, shown);
}

fn print_schedule(schedule: &Schedule) {
    let status = if schedule.enabled {
        "enabled".green()
    } else {
        "disabled".yellow()
    };
    println!(
        "Schedule for {} ({}), {} rule(s)",
        schedule.device.bold(),
        status,
        schedule.rules.len()
    );
    for rule in &schedule.rules {
        let action = match rule.action {
            plug_rules::RuleAction::On => "on ".green(),
            plug_rules::RuleAction::Off => "off".red(),
        };
        let flag = if rule.enabled { "" } else { " (disabled)" };
        println!(
            "  {}  {}  {:<27}  {}{}",
            rule.time,
            action,
            rule.weekdays.to_string(),
            rule.id.dimmed(),
            flag
        );
    }
}

/// Dispatch a parsed command
pub async fn execute(cli: &Cli, config: AppConfig) -> Result<()> {
    let client = Arc::new(
        config
            .device
            .build_client()
            .context("Failed to create device client")?,
    );

    match &cli.command {
        Commands::Run { scheduler } => {
            if !(config.scheduler.enabled || *scheduler) {
                bail!("Local scheduler is disabled (set scheduler.enabled or pass --scheduler)");
            }
            let store = open_store(&config.store, Arc::clone(&client)).await?;
            let runner = SchedulerRunner::new(
                client.host(),
                store,
                client.clone(),
                &config.scheduler,
            );
            let _signal_task = common::notify_on_shutdown(runner.shutdown_handle());
            runner.run().await;
            info!("plugsrv exited");
        },
        Commands::State => print_state("State", client.get_state().await?),
        Commands::On => print_state("State", client.set_state(PowerState::On).await?),
        Commands::Off => print_state("State", client.set_state(PowerState::Off).await?),
        Commands::Toggle => print_state("State", client.toggle().await?),
        Commands::Info { json } => {
            let info = client.device_info().await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Name:            {}", info.friendly_name.bold());
                println!("Address:         {}:{}", info.host, info.port);
                println!("Rules port:      {}", info.rules_port);
                println!("Signal strength: {}", info.signal_strength);
                println!("Home id:         {}", info.home_id);
            }
        },
        Commands::Rename { name } => {
            client.change_friendly_name(name).await?;
            println!("{} renamed to {}", client.host(), name.bold());
        },
        Commands::Schedule { command } => {
            execute_schedule(command, &config, Arc::clone(&client)).await?;
        },
        Commands::ProbeRulesPort { ports } => {
            let candidates = (!ports.is_empty()).then_some(ports.as_slice());
            match client.probe_rules_port(candidates).await {
                Some(port) => println!("Rules service on port {}", port.to_string().green()),
                None => {
                    warn!("No candidate port answered");
                    bail!("Rules service not found on {}", client.host());
                },
            }
        },
    }
    Ok(())
}

async fn execute_schedule(
    command: &ScheduleCommands,
    config: &AppConfig,
    client: Arc<DeviceActionClient>,
) -> Result<()> {
    let host = client.host().to_string();
    match command {
        ScheduleCommands::Raw => {
            println!("{}", client.get_device_schedule_xml().await?);
            return Ok(());
        },
        ScheduleCommands::Version => {
            println!("{}", client.get_rules_db_version().await?);
            return Ok(());
        },
        _ => {},
    }

    let store = open_store(&config.store, client).await?;
    match command {
        ScheduleCommands::Show { json } => {
            let schedule = store.load(&host).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&schedule)?);
            } else {
                print_schedule(&schedule);
            }
        },
        ScheduleCommands::Set {
            start,
            stop,
            disabled,
        } => {
            let start = TimeEvent::parse_hhmm(start).context("Invalid --start")?;
            let stop = stop
                .as_deref()
                .map(TimeEvent::parse_hhmm)
                .transpose()
                .context("Invalid --stop")?;
            let schedule = Schedule::from_window(host.as_str(), !disabled, start, stop);
            store.save(&schedule).await?;
            print_schedule(&schedule);
        },
        ScheduleCommands::Enable => {
            let schedule = set_store_enabled(store.as_ref(), &host, true).await?;
            print_schedule(&schedule);
        },
        ScheduleCommands::Disable => {
            let schedule = set_store_enabled(store.as_ref(), &host, false).await?;
            print_schedule(&schedule);
        },
        ScheduleCommands::Raw | ScheduleCommands::Version => {},
    }
    Ok(())
}
