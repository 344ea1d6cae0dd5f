use crate::broker::Connector;
use crate::catalog::SensorCatalog;
use crate::device::{Device, DeviceConfig};
use crate::errors::{Error, Result};
use crate::measurement::MeasurementGenerator;
use crate::scheduler::{PublishScheduler, Schedule};
use crate::session::DeviceSession;
use crate::topic::TopicLayout;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

/// How every device in the fleet publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub schedule: Schedule,
    pub layout: TopicLayout,
    pub publish_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            layout: TopicLayout::default(),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetReport {
    pub connected: usize,
    pub failed: usize,
}

struct FleetMember {
    device: Arc<Device>,
    generator_seed: u64,
}

/// Connects every device and runs its streams until cancelled.
pub struct FleetRunner<C> {
    connector: Arc<C>,
    catalog: Arc<SensorCatalog>,
    members: Vec<FleetMember>,
    settings: StreamSettings,
}

impl<C: Connector + 'static> FleetRunner<C> {
    /// Without a seed, identities and readings come from entropy.
    pub fn new(
        connector: C,
        configs: Vec<DeviceConfig>,
        settings: StreamSettings,
        seed: Option<u64>,
    ) -> Result<Self> {
        validate_fleet(&configs)?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let members = configs
            .into_iter()
            .map(|config| {
                let device = Device::new(config, &mut rng);
                FleetMember {
                    device: Arc::new(device),
                    generator_seed: rng.gen(),
                }
            })
            .collect();

        Ok(Self {
            connector: Arc::new(connector),
            catalog: Arc::new(SensorCatalog::default()),
            members,
            settings,
        })
    }

    pub fn with_catalog(mut self, catalog: SensorCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.members.iter().map(|m| m.device.as_ref())
    }

    pub async fn run(self, cancel: CancellationToken) -> FleetReport {
        info!("Starting fleet of {} devices", self.members.len());

        let mut tasks = JoinSet::new();
        for member in self.members {
            let span = info_span!("device", device_id = %member.device.device_id);
            tasks.spawn(
                run_device(
                    self.connector.clone(),
                    self.catalog.clone(),
                    member,
                    self.settings,
                    cancel.clone(),
                )
                .instrument(span),
            );
        }

        let mut report = FleetReport::default();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => report.connected += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    error!("Device task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Fleet stopped: {} devices ran, {} never connected",
            report.connected, report.failed
        );
        report
    }
}

/// Returns whether the device got a session. A refused device still runs its
/// streams; every tick then fails as not connected.
async fn run_device<C: Connector>(
    connector: Arc<C>,
    catalog: Arc<SensorCatalog>,
    member: FleetMember,
    settings: StreamSettings,
    cancel: CancellationToken,
) -> bool {
    let mut session = DeviceSession::new(member.device, settings.layout, settings.publish_timeout);

    let connected = tokio::select! {
        _ = cancel.cancelled() => return false,
        result = session.connect(connector.as_ref()) => result.is_ok(),
    };

    let generator = MeasurementGenerator::new(catalog, StdRng::seed_from_u64(member.generator_seed));
    PublishScheduler::new(Arc::new(session), generator, settings.schedule)
        .run(cancel)
        .await;
    connected
}

pub fn validate_fleet(configs: &[DeviceConfig]) -> Result<()> {
    if configs.is_empty() {
        return Err(Error::Config("Fleet has no devices".to_string()));
    }

    let mut seen = HashSet::new();
    for config in configs {
        if config.device_id.is_empty() {
            return Err(Error::Config("Device ID cannot be empty".to_string()));
        }
        if !seen.insert(config.device_id.as_str()) {
            return Err(Error::Config(format!(
                "Duplicate device ID {}",
                config.device_id
            )));
        }
        if config.sensor_kinds.iter().any(|kind| kind == "timestamp") {
            return Err(Error::Config(format!(
                "Device {} lists reserved sensor kind 'timestamp'",
                config.device_id
            )));
        }
    }

    Ok(())
}

/// The three gas-monitoring devices the simulator runs by default.
pub fn reference_fleet(auth_token: &str) -> Vec<DeviceConfig> {
    [
        ("a16c41bc003e", "ch4"),
        ("55c2f491a374", "nh3"),
        ("af9247e90c34", "h2s"),
    ]
    .into_iter()
    .map(|(device_id, gas)| DeviceConfig {
        device_id: device_id.to_string(),
        auth_token: auth_token.to_string(),
        sensor_kinds: vec![gas.to_string(), "temperature".to_string()],
    })
    .collect()
}

/// `count` devices named `dev-{n}`, rotating through the gas sensors.
pub fn synthetic_fleet(count: usize, auth_token: &str) -> Vec<DeviceConfig> {
    const GASES: [&str; 3] = ["ch4", "nh3", "h2s"];

    (0..count)
        .map(|n| {
            let mut sensor_kinds = vec![GASES[n % GASES.len()].to_string(), "temperature".to_string()];
            if n % 2 == 1 {
                sensor_kinds.push("humidity".to_string());
            }
            DeviceConfig {
                device_id: format!("dev-{}", n),
                auth_token: auth_token.to_string(),
                sensor_kinds,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use tokio::time::sleep;

    #[test]
    fn test_reference_fleet_is_valid() {
        let fleet = reference_fleet("token");
        assert_eq!(fleet.len(), 3);
        assert!(validate_fleet(&fleet).is_ok());
        assert_eq!(fleet[0].sensor_kinds, vec!["ch4", "temperature"]);
    }

    #[test]
    fn test_synthetic_fleet_is_valid() {
        let fleet = synthetic_fleet(10, "token");
        assert_eq!(fleet.len(), 10);
        assert!(validate_fleet(&fleet).is_ok());
        assert_eq!(fleet[3].sensor_kinds, vec!["ch4", "temperature", "humidity"]);
    }

    #[test]
    fn test_duplicate_device_id() {
        let mut fleet = reference_fleet("token");
        fleet[2].device_id = fleet[0].device_id.clone();
        assert!(matches!(validate_fleet(&fleet), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_fleet() {
        assert!(validate_fleet(&[]).is_err());
    }

    #[test]
    fn test_reserved_sensor_kind() {
        let mut fleet = reference_fleet("token");
        fleet[1].sensor_kinds.push("timestamp".to_string());
        assert!(validate_fleet(&fleet).is_err());
    }

    #[test]
    fn test_seeded_identities_are_reproducible() {
        let settings = StreamSettings::default();
        let a = FleetRunner::new(MemoryBroker::new(), reference_fleet("t"), settings, Some(3)).unwrap();
        let b = FleetRunner::new(MemoryBroker::new(), reference_fleet("t"), settings, Some(3)).unwrap();

        let a: Vec<&Device> = a.devices().collect();
        let b: Vec<&Device> = b.devices().collect();
        assert_eq!(a, b);

        let client_ids: HashSet<&str> = a.iter().map(|d| d.client_id.as_str()).collect();
        assert_eq!(client_ids.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_device_does_not_affect_others() {
        let broker = MemoryBroker::new();
        broker.reject_username("revoked");

        let mut fleet = reference_fleet("token");
        fleet[1].auth_token = "revoked".to_string();

        let runner = FleetRunner::new(broker.clone(), fleet, StreamSettings::default(), Some(1)).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(runner.run(cancel.clone()));

        sleep(Duration::from_secs(61)).await;
        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report, FleetReport { connected: 2, failed: 1 });
        // Two devices, three streams, plus one extra measurements tick each
        assert_eq!(broker.published().len(), 8);
        assert!(broker.published_to("/v2.0/devices/55c2f491a374").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fully_refused_fleet_runs_until_cancelled() {
        let broker = MemoryBroker::new();
        broker.reject_username("revoked");

        let runner = FleetRunner::new(
            broker.clone(),
            reference_fleet("revoked"),
            StreamSettings::default(),
            Some(1),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(runner.run(cancel.clone()));

        sleep(Duration::from_secs(600)).await;
        assert!(!handle.is_finished());
        assert!(broker.published().is_empty());

        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report, FleetReport { connected: 0, failed: 3 });
    }
}
