use crate::broker::Credentials;
use crate::model::Location;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Builder;

/// A device as listed in the fleet configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub auth_token: String,
    pub sensor_kinds: Vec<String>,
}

/// A configured device with the identity it uses for this process run.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub device_id: String,
    pub auth_token: String,
    pub client_id: String,
    pub sensor_kinds: Vec<String>,
    pub gps: Location,
}

impl Device {
    pub fn new(config: DeviceConfig, rng: &mut impl Rng) -> Self {
        let client_id = format!("sim-{}", Builder::from_random_bytes(rng.gen()).into_uuid());
        let gps = Location {
            lat: round_coordinate(rng.gen_range(-90.0..=90.0)),
            lng: round_coordinate(rng.gen_range(-180.0..=180.0)),
        };

        Self {
            device_id: config.device_id,
            auth_token: config.auth_token,
            client_id,
            sensor_kinds: config.sensor_kinds,
            gps,
        }
    }

    /// The token authenticates as the username; the password stays empty.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.client_id.clone(),
            username: self.auth_token.clone(),
            password: String::new(),
        }
    }
}

fn round_coordinate(degrees: f64) -> f64 {
    (degrees * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> DeviceConfig {
        DeviceConfig {
            device_id: "a16c41bc003e".to_string(),
            auth_token: "token-1".to_string(),
            sensor_kinds: vec!["ch4".to_string(), "temperature".to_string()],
        }
    }

    #[test]
    fn test_identity_is_reproducible() {
        let a = Device::new(config(), &mut StdRng::seed_from_u64(9));
        let b = Device::new(config(), &mut StdRng::seed_from_u64(9));
        let c = Device::new(config(), &mut StdRng::seed_from_u64(10));

        assert_eq!(a, b);
        assert_ne!(a.client_id, c.client_id);
        assert!(a.client_id.starts_with("sim-"));
    }

    #[test]
    fn test_gps_in_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let device = Device::new(config(), &mut rng);
            assert!((-90.0..=90.0).contains(&device.gps.lat));
            assert!((-180.0..=180.0).contains(&device.gps.lng));
        }
    }

    #[test]
    fn test_credentials() {
        let device = Device::new(config(), &mut StdRng::seed_from_u64(2));
        let credentials = device.credentials();

        assert_eq!(credentials.client_id, device.client_id);
        assert_eq!(credentials.username, "token-1");
        assert!(credentials.password.is_empty());
    }
}
