//! Simulated fleet of environmental-sensor devices publishing telemetry to an
//! MQTT broker.
//!
//! Every device holds one broker session and runs three periodic streams
//! (measurements, info, status) that tick independently of each other and of
//! every other device.

pub mod broker;
pub mod catalog;
pub mod config;
pub mod device;
pub mod errors;
pub mod fleet;
pub mod measurement;
pub mod metrics;
pub mod model;
pub mod scheduler;
pub mod session;
pub mod topic;
