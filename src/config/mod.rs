// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Number of seats in the stock layout
const DEFAULT_SEAT_COUNT: usize = 20;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Broker connection and topics
    pub mqtt: MqttConfig,

    /// Reservation and occupancy policy
    pub engine: EngineConfig,

    /// Periodic sweep
    pub scheduler: SchedulerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Seats to create on startup
    pub seats: Vec<SeatSeed>,

    /// Card pre-bindings per user
    pub cards: Vec<CardBinding>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mqtt: MqttConfig::default(),
            engine: EngineConfig::default(),
            scheduler: SchedulerConfig::default(),
            database: DatabaseConfig::default(),
            seats: SeatSeed::stock_layout(DEFAULT_SEAT_COUNT),
            cards: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("seatkeeper"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// MQTT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Filter for everything the seat units publish
    pub subscribe_topic: String,
    /// Single channel all commands go out on
    pub command_topic: String,
    pub qos: u8,
    pub keep_alive_secs: u64,
    /// Pause after a connection error before polling again
    pub reconnect_delay_secs: u64,
    /// Inbound messages buffered between the event loop and the engine
    pub inbound_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "seatkeeper".to_string(),
            username: None,
            password: None,
            subscribe_topic: "server/#".to_string(),
            command_topic: "stm32/cmd".to_string(),
            qos: 0,
            keep_alive_secs: 60,
            reconnect_delay_secs: 5,
            inbound_capacity: 256,
        }
    }
}

/// Reservation lifecycle and occupancy policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A valid distance reading below this means someone is at the seat
    pub occupied_threshold_mm: i64,

    /// Grace period between reserving and presenting a card
    pub checkin_timeout_mins: i64,

    /// How long an in-use seat may stay empty
    pub away_timeout_mins: i64,

    pub default_reservation_mins: i64,
    pub min_reservation_mins: i64,
    pub max_reservation_mins: i64,

    /// Seats whose last telemetry is older than this are reported offline
    pub online_window_secs: i64,

    /// Field carrying the command name in outbound payloads
    pub command_type_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            occupied_threshold_mm: 380,
            checkin_timeout_mins: 15,
            away_timeout_mins: 20,
            default_reservation_mins: 120,
            min_reservation_mins: 10,
            max_reservation_mins: 480,
            online_window_secs: 60,
            command_type_key: "type".to_string(),
        }
    }
}

/// Sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/seatkeeper.db"),
        }
    }
}

/// A seat known to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatSeed {
    pub seat_id: String,
    /// Human label shown on dashboards
    pub display: String,
}

impl SeatSeed {
    /// `A01`..`Ann`, displayed as `A-01`..`A-nn`
    pub fn stock_layout(count: usize) -> Vec<Self> {
        (1..=count)
            .map(|n| Self {
                seat_id: format!("A{:02}", n),
                display: format!("A-{:02}", n),
            })
            .collect()
    }
}

/// A user's registered card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardBinding {
    pub username: String,
    pub uid: String,
}
