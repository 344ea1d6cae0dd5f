use crate::broker::MqttSettings;
use crate::device::DeviceConfig;
use crate::errors::Result;
use crate::fleet::{reference_fleet, synthetic_fleet, StreamSettings};
use crate::scheduler::Schedule;
use crate::topic::TopicLayout;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "simulator")]
#[command(about = "Simulated environmental-sensor fleet publishing telemetry over MQTT")]
#[command(version)]
pub struct SimulatorArgs {
    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    pub broker: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub port: u16,

    /// JSON file listing {device_id, auth_token, sensor_kinds} entries
    #[arg(long, env = "FLEET_FILE")]
    pub fleet_file: Option<PathBuf>,

    /// Auth token for the built-in or generated fleet
    #[arg(long, env = "DEVICE_TOKEN", default_value = "")]
    pub token: String,

    /// Generate this many devices instead of the built-in fleet
    #[arg(long, env = "DEVICES")]
    pub devices: Option<usize>,

    #[arg(long, env = "MEASUREMENTS_PERIOD", default_value = "60s", value_parser = parse_period)]
    pub measurements_period: Duration,

    #[arg(long, env = "INFO_PERIOD", default_value = "5m", value_parser = parse_period)]
    pub info_period: Duration,

    #[arg(long, env = "STATUS_PERIOD", default_value = "2m", value_parser = parse_period)]
    pub status_period: Duration,

    /// Give up on a single publish after this long
    #[arg(long, env = "PUBLISH_TIMEOUT", default_value = "10s", value_parser = parse_period)]
    pub publish_timeout: Duration,

    #[arg(long, env = "MQTT_KEEP_ALIVE", default_value = "30s", value_parser = parse_period)]
    pub keep_alive: Duration,

    /// Seed for client ids, GPS positions and readings
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,

    #[arg(long, env = "TOPIC_LAYOUT", value_enum, default_value_t = TopicLayout::Single)]
    pub topic_layout: TopicLayout,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<String>,
}

impl SimulatorArgs {
    pub fn fleet(&self) -> Result<Vec<DeviceConfig>> {
        if let Some(path) = &self.fleet_file {
            return load_fleet_file(path);
        }
        Ok(match self.devices {
            Some(count) => synthetic_fleet(count, &self.token),
            None => reference_fleet(&self.token),
        })
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            schedule: Schedule {
                measurements: self.measurements_period,
                info: self.info_period,
                status: self.status_period,
            },
            layout: self.topic_layout,
            publish_timeout: self.publish_timeout,
        }
    }

    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.broker.clone(),
            port: self.port,
            keep_alive: self.keep_alive,
            ..MqttSettings::default()
        }
    }
}

pub fn load_fleet_file(path: &Path) -> Result<Vec<DeviceConfig>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Parses a period such as `90`, `90s`, `5m`, `1h` or `5 Minute`.
pub fn parse_period(input: &str) -> std::result::Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (amount, unit) = input.split_at(split);

    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("invalid period '{}': expected a number", input))?;
    let factor = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 60 * 60,
        other => return Err(format!("invalid period unit '{}'", other)),
    };
    if amount == 0 {
        return Err("period must be greater than zero".to_string());
    }

    let seconds = amount
        .checked_mul(factor)
        .ok_or_else(|| format!("period '{}' is too long", input))?;
    Ok(Duration::from_secs(seconds))
}
