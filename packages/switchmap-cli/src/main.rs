//! Switchmap CLI - find which switch port every device is plugged into
//!
//! This binary can:
//! - Run a discovery pass over the configured switches and core devices
//! - Walk a single forwarding or address-resolution table
//! - Query the persisted device directory
//! - Run as a background daemon (for systemd integration)

mod daemon;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use switchmap_core::config::{self, Config, ConfigSource};
use switchmap_core::directory::{
    default_directory_path, DeviceQuery, DirectoryStore, JsonFileStore,
};
use switchmap_core::snmp::{PollingSession, SnmpSession, TableSession};
use switchmap_core::{DiscoveryReport, PollTarget, RunGuard, WalkKind, WalkOutput};

#[derive(Parser)]
#[command(name = "switchmap")]
#[command(author = "Switchmap Team")]
#[command(version)]
#[command(about = "Switch port discovery over SNMP")]
#[command(long_about = "
Switchmap walks the forwarding tables of access switches and the
address-resolution tables of core devices, joins them by MAC and keeps
a directory of where every device is plugged in.

Quick start:
  1. Write a config:    switchmap config --example > ~/.config/switchmap/config.toml
  2. Run a discovery:   switchmap discover
  3. List devices:      switchmap devices --status online
  4. Start daemon:      switchmap daemon
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TableArg {
    /// Bridge forwarding table of an access switch
    Fdb,
    /// Address-resolution table of a core device
    Arp,
}

impl From<TableArg> for WalkKind {
    fn from(table: TableArg) -> Self {
        match table {
            TableArg::Fdb => WalkKind::ForwardingTable,
            TableArg::Arp => WalkKind::AddressResolution,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Online,
    Offline,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one discovery pass and update the device directory
    Discover {
        /// Ignore the cooldown since the last pass
        #[arg(long)]
        force: bool,

        /// Answer SNMP requests from a JSON replay file instead of the network
        #[arg(long, value_name = "FILE")]
        replay: Option<PathBuf>,
    },

    /// Walk one table on one device and print the rows
    Walk {
        table: TableArg,

        address: String,

        /// Table root OID (defaults to the standard table)
        #[arg(long)]
        oid: Option<String>,

        /// Ports that end a forwarding-table walk
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<u32>,

        /// Answer SNMP requests from a JSON replay file instead of the network
        #[arg(long, value_name = "FILE")]
        replay: Option<PathBuf>,
    },

    /// List devices from the directory
    Devices {
        #[command(subcommand)]
        action: Option<DeviceAction>,

        /// Switch address (substring)
        #[arg(long)]
        switch: Option<String>,

        #[arg(long)]
        status: Option<StatusArg>,

        #[arg(long)]
        vlan: Option<u32>,

        /// MAC address (substring, any case)
        #[arg(long)]
        mac: Option<String>,

        /// IP address (substring)
        #[arg(long)]
        ip: Option<String>,

        /// Workplace label (substring)
        #[arg(long)]
        workplace: Option<String>,
    },

    /// Run discovery passes periodically
    Daemon {
        /// Pass interval in minutes (defaults to the configured interval)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show configuration paths and settings
    Config {
        /// Print only an example config file
        #[arg(long)]
        example: bool,
    },
}

#[derive(Subcommand)]
pub enum DeviceAction {
    /// Set or clear the workplace label of one device
    Annotate {
        /// MAC or IPv4 address of the device
        device: String,

        /// Workplace label, unique across devices
        #[arg(long, required_unless_present = "clear", conflicts_with = "clear")]
        workplace: Option<String>,

        /// Remove the current label
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    format!("switchmap={},switchmap_core={}", log_level, log_level).into()
                }),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Example output must not depend on a loadable config
    if let Commands::Config { example: true } = cli.command {
        print!("{}", config::generate_example_config());
        return Ok(());
    }

    let (config, source) = config::load_config()?;

    match cli.command {
        Commands::Discover { force, ref replay } => {
            cmd_discover(&cli, &config, force, replay.as_deref()).await
        }
        Commands::Walk {
            table,
            ref address,
            ref oid,
            ref exclude,
            ref replay,
        } => {
            cmd_walk(&cli, &config, table, address, oid.as_deref(), exclude, replay.as_deref())
                .await
        }
        Commands::Devices {
            action: Some(DeviceAction::Annotate {
                ref device,
                ref workplace,
                ..
            }),
            ..
        } => cmd_annotate(&cli, &config, device, workplace.as_deref()),
        Commands::Devices {
            action: None,
            ref switch,
            status,
            vlan,
            ref mac,
            ref ip,
            ref workplace,
        } => {
            let query = DeviceQuery {
                switch: switch.clone(),
                status: status.map(|s| matches!(s, StatusArg::Online)),
                vlan,
                mac: mac.clone(),
                ip: ip.clone(),
                workplace: workplace.clone(),
            };
            cmd_devices(&cli, &config, &query)
        }
        Commands::Daemon { interval } => {
            let minutes = interval.unwrap_or(config.discovery.interval_minutes).max(1);
            let options = config.snmp.session_options();
            let switches = SnmpSession::new(config.snmp.switch_auth.clone(), options.clone());
            let cores = SnmpSession::new(config.snmp.core_auth.clone(), options);
            daemon::run_daemon(&config, &switches, &cores, &open_store(&config)?, minutes).await
        }
        Commands::Config { .. } => cmd_config(&cli, &config, &source),
    }
}

/// Directory store at the configured path or the platform default
pub fn open_store(config: &Config) -> Result<JsonFileStore> {
    match &config.storage.path {
        Some(path) => Ok(JsonFileStore::new(path)),
        None => JsonFileStore::open_default().context("Could not find data directory"),
    }
}

async fn cmd_discover(
    cli: &Cli,
    config: &Config,
    force: bool,
    replay: Option<&std::path::Path>,
) -> Result<()> {
    match replay {
        Some(path) => {
            let session = TableSession::from_json_file(path)?;
            discover_with(cli, config, force, &session, &session).await
        }
        None => {
            let options = config.snmp.session_options();
            let switches = SnmpSession::new(config.snmp.switch_auth.clone(), options.clone());
            let cores = SnmpSession::new(config.snmp.core_auth.clone(), options);
            discover_with(cli, config, force, &switches, &cores).await
        }
    }
}

async fn discover_with<S: PollingSession, C: PollingSession>(
    cli: &Cli,
    config: &Config,
    force: bool,
    switches: &S,
    cores: &C,
) -> Result<()> {
    let store = open_store(config)?;
    let last_discovery = store.load()?.last_discovery();
    let guard = RunGuard::with_last_run(config.discovery.cooldown()?, last_discovery);

    let now = chrono::Utc::now();
    let permit = if force {
        guard.try_acquire_forced(now)
    } else {
        guard.try_acquire(now)
    }
    .context("Discovery refused, use --force to skip the cooldown")?;

    match cli.format {
        OutputFormat::Text => println!("Running discovery..."),
        OutputFormat::Json => {}
    }

    let report =
        switchmap_core::run_configured(config, switches, cores, &store, permit.started_at()).await?;
    permit.release();

    print_report(cli, &report);
    check_report(&report)
}

/// Fail the command when any target could not be walked
fn check_report(report: &DiscoveryReport) -> Result<()> {
    if !report.success() {
        anyhow::bail!(
            "Discovery finished with {} failed targets",
            report.failed_targets.len()
        );
    }
    Ok(())
}

fn print_report(cli: &Cli, report: &DiscoveryReport) {
    match cli.format {
        OutputFormat::Text => {
            println!();
            println!("Discovery at {}", report.started_at.to_rfc3339());
            println!("  Switches:        {} polled", report.switches_polled);
            println!("  Core devices:    {} polled", report.cores_polled);
            println!(
                "  Rows:            {} forwarding, {} address-resolution, {} with IP",
                report.forwarding_rows, report.arp_rows, report.resolved_rows
            );
            println!(
                "  Devices:         {} new, {} updated, {} went offline",
                report.summary.inserted, report.summary.updated, report.summary.marked_offline
            );

            if !report.success() {
                println!();
                println!("Failed targets:");
                for failure in &report.failed_targets {
                    println!(
                        "  {:15} {:26} {}",
                        failure.address,
                        failure.kind.to_string(),
                        failure.reason
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "success": report.success(),
                "report": report,
            }));
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_walk(
    cli: &Cli,
    config: &Config,
    table: TableArg,
    address: &str,
    oid: Option<&str>,
    exclude: &[u32],
    replay: Option<&std::path::Path>,
) -> Result<()> {
    let kind = WalkKind::from(table);
    let target = PollTarget::new(address, oid.unwrap_or(kind.default_root()))
        .with_excluded_ports(exclude.iter().copied());
    let skip_vlan = config.discovery.settings().skip_vlan;

    let output = match replay {
        Some(path) => {
            let session = TableSession::from_json_file(path)?;
            switchmap_core::walk_kind(&session, kind, &target, skip_vlan).await?
        }
        None => {
            let auth = match kind {
                WalkKind::ForwardingTable => config.snmp.switch_auth.clone(),
                WalkKind::AddressResolution => config.snmp.core_auth.clone(),
            };
            let session = SnmpSession::new(auth, config.snmp.session_options());
            switchmap_core::walk_kind(&session, kind, &target, skip_vlan).await?
        }
    };

    match cli.format {
        OutputFormat::Text => {
            println!("{} rows from the {} of {}:", output.len(), kind, address);
            println!();
            match &output {
                WalkOutput::Forwarding(rows) => {
                    for row in rows {
                        println!("  vlan {:>4}  {}  port {}", row.vlan, row.mac, row.port);
                    }
                }
                WalkOutput::AddressResolution(rows) => {
                    for row in rows {
                        println!("  vlan {:>4}  {}  {}", row.vlan, row.mac, row.ip);
                    }
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "address": address,
                "table": kind,
                "root_oid": target.root_oid,
                "rows": output,
            }));
        }
    }

    Ok(())
}

fn cmd_devices(cli: &Cli, config: &Config, query: &DeviceQuery) -> Result<()> {
    let directory = open_store(config)?.load()?;
    let devices = directory.query(query);
    let switch_address = |device: &switchmap_core::PersistedDevice| {
        directory
            .switch(device.switch_id)
            .map(|s| s.address.clone())
            .unwrap_or_else(|| "-".to_string())
    };

    match cli.format {
        OutputFormat::Text => {
            println!("{} devices:", devices.len());
            println!();
            for device in &devices {
                let status = if device.status { "online" } else { "offline" };
                let vendor = device.vendor.as_deref().unwrap_or("");
                let workplace = device.workplace_number.as_deref().unwrap_or("-");
                println!(
                    "  {:15} port {:>4}  vlan {:>4}  {}  {:15} {:7} {:8} {}",
                    switch_address(device),
                    device.port,
                    device.vlan,
                    device.mac,
                    device.ip_address,
                    status,
                    workplace,
                    vendor
                );
            }
        }
        OutputFormat::Json => {
            let rows: Vec<_> = devices
                .iter()
                .map(|device| {
                    serde_json::json!({
                        "switch": switch_address(device),
                        "device": device,
                    })
                })
                .collect();
            println!("{}", serde_json::json!({
                "devices": rows,
                "last_discovery": directory.last_discovery(),
            }));
        }
    }

    Ok(())
}

fn cmd_annotate(cli: &Cli, config: &Config, key: &str, workplace: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let mut directory = store.load()?;
    let id = directory.annotate(key, workplace)?;
    store.save(&directory)?;

    let device = directory
        .device(id)
        .context("Annotated device missing from directory")?;

    match cli.format {
        OutputFormat::Text => match &device.workplace_number {
            Some(label) => println!("{} is now at workplace {}", device.mac, label),
            None => println!("{} has no workplace", device.mac),
        },
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "device": device }));
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, config: &Config, source: &ConfigSource) -> Result<()> {
    let config_path = config::get_config_file_path_string();
    let directory_path = match &config.storage.path {
        Some(path) => path.display().to_string(),
        None => default_directory_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|e| e.to_string()),
    };
    let inventory = config.inventory();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!("Loaded from:      {}", source);
            println!("Directory file:   {}", directory_path);
            println!(
                "SNMP port:        {} (timeout {}s)",
                config.snmp.port, config.snmp.timeout_secs
            );
            println!("Skip VLAN:        {}", config.discovery.skip_vlan);
            println!("Cooldown:         {} minutes", config.discovery.cooldown_minutes);
            println!("Daemon interval:  {} minutes", config.discovery.interval_minutes);
            match &inventory {
                Ok(inventory) => println!(
                    "Inventory:        {} core devices, {} switches",
                    inventory.cores().len(),
                    inventory.switch_count()
                ),
                Err(e) => println!("Inventory:        invalid ({})", e),
            }
            println!();
            println!("Environment variables:");
            println!("  SWITCHMAP_CONFIG - Path of the config file to use");
            println!();
            println!("Write an example config with: switchmap config --example");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "source": source.to_string(),
                "directory_file": directory_path,
                "snmp": {
                    "port": config.snmp.port,
                    "timeout_secs": config.snmp.timeout_secs,
                },
                "discovery": config.discovery,
                "core_switches": config.core_switches,
                "inventory_error": inventory.err().map(|e| e.to_string()),
            }));
        }
    }

    Ok(())
}
