//! Hearth: command-line client for a Home Assistant instance
//!
//! Speaks the WebSocket API for everything except `probe`, which uses the
//! REST endpoint.
//!
//! Usage:
//!   hearth states                                  # Every entity state
//!   hearth states --domain light                   # Only one domain
//!   hearth watch                                   # Stream state_changed until Ctrl+C
//!   hearth watch automation_triggered              # Any event type
//!   hearth call light turn_on --entity light.desk --data '{"brightness":128}'
//!   hearth areas                                   # Areas grouped by floor
//!   hearth probe                                   # Is the REST API reachable?
//!
//! `--url`/`--token` fall back to `HASS_URL`/`HASS_TOKEN`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use hearth_protocol::{Events, HAEvent, ServiceTarget};
use hearth_services::{HAClient, RestClient};
use hearth_transport::{ConnectionConfig, LifecycleEvent};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hearth", about = "Hearth: Home Assistant WebSocket client")]
struct Cli {
    /// Base URL of the instance, e.g. http://homeassistant.local:8123
    #[arg(long, env = "HASS_URL")]
    url: String,

    /// Long-lived access token
    #[arg(long, env = "HASS_TOKEN", hide_env_values = true)]
    token: String,

    /// Seconds to wait for each command's response
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current state of every entity
    States {
        /// Only entities of this domain
        #[arg(long)]
        domain: Option<String>,
    },
    /// Print pushed events until interrupted
    Watch {
        #[arg(default_value = Events::STATE_CHANGED)]
        event: String,
    },
    /// Call a service
    Call {
        domain: String,
        service: String,
        /// Service data as a JSON object
        #[arg(long)]
        data: Option<String>,
        /// Target entity (repeatable)
        #[arg(long)]
        entity: Vec<String>,
    },
    /// List areas grouped by floor
    Areas,
    /// Check that the REST API answers with the given token
    Probe,
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "warn" })
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (&cli.log_file, cli.json_logs) {
        (Some(path), json) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let writer = std::sync::Mutex::new(file);
            if json {
                builder.json().with_writer(writer).init();
            } else {
                builder.with_writer(writer).with_ansi(false).init();
            }
        }
        (None, true) => builder.json().with_writer(std::io::stderr).init(),
        (None, false) => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = ConnectionConfig::new(&cli.url, &cli.token)
        .with_request_timeout(Duration::from_secs(cli.timeout));
    // Fail on a bad scheme before touching the network.
    config.websocket_url()?;

    if let Command::Probe = cli.command {
        let rest = RestClient::from_config(&config)?;
        return Ok(if rest.check_api().await {
            println!("{}: API reachable", rest.base_url());
            ExitCode::SUCCESS
        } else {
            println!("{}: API unreachable", rest.base_url());
            ExitCode::FAILURE
        });
    }

    let client = HAClient::new(config);
    client
        .connect()
        .await
        .with_context(|| format!("connecting to {}", cli.url))?;

    let outcome = run(&client, cli.command).await;
    client.disconnect();
    outcome.map(|()| ExitCode::SUCCESS)
}

async fn run(client: &HAClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::States { domain } => {
            let mut states = client.get_states().await?;
            states.retain(|e| domain.as_deref().is_none_or(|d| e.domain() == d));
            states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
            for entity in &states {
                println!(
                    "{:<48} {:<16} {}",
                    entity.entity_id,
                    entity.state,
                    entity.friendly_name().unwrap_or_default()
                );
            }
        }

        Command::Watch { event } => watch(client, &event).await?,

        Command::Call {
            domain,
            service,
            data,
            entity,
        } => {
            let data = match data {
                Some(raw) => {
                    let value: Value =
                        serde_json::from_str(&raw).context("--data is not valid JSON")?;
                    if !value.is_object() {
                        bail!("--data must be a JSON object");
                    }
                    Some(value)
                }
                None => None,
            };
            let target = ServiceTarget {
                entity_id: entity,
                ..ServiceTarget::default()
            };
            let result = client
                .call_service(&domain, &service, data, Some(target))
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Areas => {
            let (areas, floors) = tokio::try_join!(client.list_areas(), client.list_floors())?;
            let floor_names: BTreeMap<&str, &str> = floors
                .iter()
                .map(|f| (f.floor_id.as_str(), f.name.as_str()))
                .collect();

            let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for area in &areas {
                let floor = area
                    .floor_id
                    .as_deref()
                    .and_then(|id| floor_names.get(id).copied())
                    .unwrap_or("(no floor)");
                grouped.entry(floor).or_default().push(area.name.as_str());
            }
            for (floor, names) in grouped {
                println!("{floor}");
                for name in names {
                    println!("  {name}");
                }
            }
        }

        // Answered over REST before connecting
        Command::Probe => {}
    }
    Ok(())
}

/// Print events until Ctrl+C, or until the connection gives up.
async fn watch(client: &HAClient, event_type: &str) -> anyhow::Result<()> {
    let mut lifecycle = client.lifecycle();
    let _subscription = client
        .subscribe_events(event_type, print_event)
        .await
        .with_context(|| format!("subscribing to {event_type}"))?;
    info!("Watching {event_type}, Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = lifecycle.recv() => match event {
                Ok(LifecycleEvent::ReconnectExhausted) => bail!("connection lost, retries exhausted"),
                Ok(LifecycleEvent::AuthRejected { message }) => bail!("authentication rejected: {message}"),
                Ok(LifecycleEvent::Disconnected { clean: true }) => return Ok(()),
                Ok(LifecycleEvent::ReconnectScheduled { attempt, delay }) => {
                    warn!("Connection lost, retry {attempt} in {}ms", delay.as_millis());
                }
                Ok(_) => {}
                Err(e) => warn!("Lifecycle stream: {e}"),
            },
        }
    }
}

fn print_event(event: &HAEvent) {
    if event.event_type == Events::STATE_CHANGED {
        let entity = event.data["entity_id"].as_str().unwrap_or("?");
        let old = event.data["old_state"]["state"].as_str().unwrap_or("-");
        let new = event.data["new_state"]["state"].as_str().unwrap_or("-");
        println!("{entity}: {old} -> {new}");
    } else {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Unprintable event: {e}"),
        }
    }
}
