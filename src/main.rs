// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Seatkeeper - seat reservation engine for RFID seat units
//!
//! Listens to the seat units over MQTT, runs the reservation lifecycle and
//! occupancy checks, and sweeps timeouts on a fixed period.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use seatkeeper::streaming::{MqttClient, MqttDispatcher};
use seatkeeper::{Config, Database, Engine, Scheduler, VERSION};

/// Seatkeeper - seat reservation engine
#[derive(Parser, Debug)]
#[command(name = "seatkeeper")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Seat reservation engine for RFID seat units over MQTT")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// MQTT broker address
    #[arg(long)]
    mqtt_broker: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// Database file
    #[arg(long)]
    db: Option<PathBuf>,

    /// Seconds between timeout sweeps
    #[arg(long)]
    sweep_secs: Option<u64>,

    /// Distance below which a seat counts as occupied (mm)
    #[arg(long)]
    threshold_mm: Option<i64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Seatkeeper v{}", VERSION);
    info!("Configuration loaded from {:?}", config_path);

    // Override with command line args
    if let Some(broker) = args.mqtt_broker {
        config.mqtt.broker = broker;
    }
    if let Some(port) = args.mqtt_port {
        config.mqtt.port = port;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }
    if let Some(secs) = args.sweep_secs {
        config.scheduler.sweep_interval_secs = secs;
    }
    if let Some(mm) = args.threshold_mm {
        config.engine.occupied_threshold_mm = mm;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let db = Database::open(&config.database)?;

    let (mqtt, mut inbound) = MqttClient::new(&config.mqtt)?;
    let dispatcher = MqttDispatcher::new(
        mqtt.clone(),
        config.mqtt.command_topic.clone(),
        config.engine.command_type_key.clone(),
    );

    let engine = Arc::new(Engine::new(&config.engine, db, Arc::new(dispatcher)));
    let added = engine.seed(&config.seats, &config.cards, Local::now().naive_local())?;
    info!("{} seats configured ({} new)", config.seats.len(), added);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = Scheduler::new(
        engine.clone(),
        Duration::from_secs(config.scheduler.sweep_interval_secs),
    );
    let sweeper = tokio::spawn(scheduler.run(shutdown_rx));

    info!(
        "Listening on {} (commands to {})",
        config.mqtt.subscribe_topic, config.mqtt.command_topic
    );
    info!("Press Ctrl+C to shutdown");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            message = inbound.recv() => {
                let Some(message) = message else {
                    warn!("MQTT event loop ended");
                    break;
                };
                let engine = engine.clone();
                let now = Local::now().naive_local();
                let handled = tokio::task::spawn_blocking(move || {
                    engine.handle_message(&message.topic, &message.payload, now)
                });
                if let Err(e) = handled.await {
                    warn!("Message handler task failed: {}", e);
                }
            }
            _ = &mut ctrl_c => {
                info!("Shutdown signal received, cleaning up...");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = sweeper.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }
    if let Err(e) = mqtt.disconnect().await {
        warn!("{}", e);
    }

    info!("Seatkeeper shutdown complete");
    Ok(())
}
