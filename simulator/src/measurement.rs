use crate::catalog::SensorCatalog;
use crate::errors::{Error, Result};
use crate::metrics::SENSOR_ERRORS_TOTAL;
use crate::model::{now_millis, Measurement, TelemetryFrame};
use rand::Rng;
use std::sync::Arc;
use tracing::warn;

/// Readings are drawn as integers over the range scaled by this factor,
/// so values have one decimal place.
const SCALE: f64 = 10.0;

/// Synthetic readings for the kinds in a [`SensorCatalog`].
pub struct MeasurementGenerator<R> {
    catalog: Arc<SensorCatalog>,
    rng: R,
}

impl<R: Rng> MeasurementGenerator<R> {
    pub fn new(catalog: Arc<SensorCatalog>, rng: R) -> Self {
        Self { catalog, rng }
    }

    pub fn try_sample(&mut self, kind: &str) -> Result<Measurement> {
        let spec = self.catalog.get(kind)?;

        let low = (spec.min * SCALE).round() as i64;
        let high = (spec.max * SCALE).round() as i64;
        if low > high {
            return Err(Error::Config(format!(
                "Sensor {} has an empty range [{}, {}]",
                kind, spec.min, spec.max
            )));
        }

        let raw = self.rng.gen_range(low..=high);
        Ok(Measurement::ok(raw as f64 / SCALE, &spec.unit))
    }

    /// Like [`try_sample`](Self::try_sample), but a failure yields a degraded
    /// reading instead of an error.
    pub fn sample(&mut self, kind: &str) -> Measurement {
        match self.try_sample(kind) {
            Ok(measurement) => measurement,
            Err(e) => {
                warn!("Failed to sample {}: {}", kind, e);
                SENSOR_ERRORS_TOTAL.inc();
                Measurement::degraded()
            }
        }
    }

    pub fn sample_frame(&mut self, kinds: &[String]) -> TelemetryFrame {
        let readings = kinds
            .iter()
            .map(|kind| (kind.clone(), self.sample(kind)))
            .collect();

        TelemetryFrame {
            readings,
            timestamp: now_millis(),
        }
    }
}
