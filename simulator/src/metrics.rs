use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref FRAMES_PUBLISHED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "simulator_frames_published_total",
            "Total frames accepted by the broker client"
        ),
        &["frame"]
    )
    .expect("valid metric definition");
    pub static ref PUBLISH_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "simulator_publish_failures_total",
            "Total frames that failed to publish or timed out"
        ),
        &["frame"]
    )
    .expect("valid metric definition");
    pub static ref SENSOR_ERRORS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "simulator_sensor_errors_total",
        "Total readings replaced by a degraded measurement"
    ))
    .expect("valid metric definition");
    pub static ref CONNECT_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "simulator_connect_failures_total",
        "Total device sessions refused by the broker"
    ))
    .expect("valid metric definition");
    pub static ref CONNECTED_DEVICES: Gauge = Gauge::with_opts(Opts::new(
        "simulator_connected_devices",
        "Devices currently holding a broker session"
    ))
    .expect("valid metric definition");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(FRAMES_PUBLISHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUBLISH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SENSOR_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONNECT_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONNECTED_DEVICES.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
