use crate::measurement::MeasurementGenerator;
use crate::metrics::{FRAMES_PUBLISHED_TOTAL, PUBLISH_FAILURES_TOTAL};
use crate::model::{now_millis, Frame, FrameKind, InfoFrame, StatusFrame};
use crate::session::DeviceSession;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Period of each of a device's streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub measurements: Duration,
    pub info: Duration,
    pub status: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            measurements: Duration::from_secs(60),
            info: Duration::from_secs(300),
            status: Duration::from_secs(120),
        }
    }
}

impl Schedule {
    pub fn period(&self, kind: FrameKind) -> Duration {
        match kind {
            FrameKind::Measurements => self.measurements,
            FrameKind::Info => self.info,
            FrameKind::Status => self.status,
        }
    }
}

/// Drives a connected device's measurement, info and status streams.
///
/// Each stream publishes right away and then once per period, on its own
/// task. Ticks of one stream never overlap; nothing orders ticks of
/// different streams.
pub struct PublishScheduler<R> {
    session: Arc<DeviceSession>,
    generator: MeasurementGenerator<R>,
    schedule: Schedule,
}

impl<R: Rng + Send + 'static> PublishScheduler<R> {
    pub fn new(
        session: Arc<DeviceSession>,
        generator: MeasurementGenerator<R>,
        schedule: Schedule,
    ) -> Self {
        Self {
            session,
            generator,
            schedule,
        }
    }

    pub fn spawn(self, tasks: &mut JoinSet<()>, cancel: &CancellationToken) {
        let Self {
            session,
            mut generator,
            schedule,
        } = self;

        let kinds = session.device().sensor_kinds.clone();
        tasks.spawn(run_stream(
            session.clone(),
            schedule.measurements,
            cancel.clone(),
            move || Frame::Telemetry(generator.sample_frame(&kinds)),
        ));

        let location = session.device().gps;
        tasks.spawn(run_stream(
            session.clone(),
            schedule.info,
            cancel.clone(),
            move || {
                Frame::Info(InfoFrame {
                    location,
                    timestamp: now_millis(),
                })
            },
        ));

        tasks.spawn(run_stream(
            session,
            schedule.status,
            cancel.clone(),
            || Frame::Status(StatusFrame::simulated(now_millis())),
        ));
    }

    /// Runs the streams until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        self.spawn(&mut tasks, &cancel);

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Stream task failed: {}", e);
            }
        }
    }
}

async fn run_stream<F>(
    session: Arc<DeviceSession>,
    period: Duration,
    cancel: CancellationToken,
    mut build: F,
) where
    F: FnMut() -> Frame + Send + 'static,
{
    loop {
        let frame = build();
        let kind = frame.kind();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = session.publish(&frame) => outcome,
        };
        match outcome {
            Ok(()) => {
                FRAMES_PUBLISHED_TOTAL.with_label_values(&[kind.as_str()]).inc();
                debug!("Published {} frame to {}", kind, session.topic(kind));
            }
            Err(e) => {
                // The next tick tries again
                PUBLISH_FAILURES_TOTAL.with_label_values(&[kind.as_str()]).inc();
                warn!("Failed to publish {} frame: {}", kind, e);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
    }

    debug!("Stream stopped for {}", session.device().device_id);
}
