use crate::errors::{Error, Result};
use std::collections::BTreeMap;

/// Unit and valid range of one sensor kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSpec {
    pub kind: String,
    pub unit: String,
    pub min: f64,
    pub max: f64,
}

impl SensorSpec {
    pub fn new(kind: &str, unit: &str, min: f64, max: f64) -> Self {
        Self {
            kind: kind.to_string(),
            unit: unit.to_string(),
            min,
            max,
        }
    }
}

/// Sensor kinds known to the simulator, keyed by kind.
#[derive(Debug, Clone)]
pub struct SensorCatalog {
    specs: BTreeMap<String, SensorSpec>,
}

impl SensorCatalog {
    pub fn empty() -> Self {
        Self {
            specs: BTreeMap::new(),
        }
    }

    /// Adds a spec, replacing any previous spec of the same kind.
    pub fn with_spec(mut self, spec: SensorSpec) -> Self {
        self.specs.insert(spec.kind.clone(), spec);
        self
    }

    pub fn get(&self, kind: &str) -> Result<&SensorSpec> {
        self.specs
            .get(kind)
            .ok_or_else(|| Error::UnknownSensorKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.specs.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

impl Default for SensorCatalog {
    fn default() -> Self {
        Self::empty()
            .with_spec(SensorSpec::new("nh3", "ppb", 100.0, 600.0))
            .with_spec(SensorSpec::new("ch4", "ppb", 200.0, 1000.0))
            .with_spec(SensorSpec::new("h2s", "ppb", 10.0, 100.0))
            .with_spec(SensorSpec::new("temperature", "C", 20.0, 30.0))
            .with_spec(SensorSpec::new("humidity", "%", 0.0, 100.0))
    }
}
