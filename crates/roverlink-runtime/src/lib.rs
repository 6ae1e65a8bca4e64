//! `roverlink-runtime` – process-level services of the receiving side.
//!
//! # Modules
//!
//! - [`listener`] – [`RoverListener`][listener::RoverListener]: binds a
//!   rover's pose, LiDAR and telemetry ports, validates every datagram,
//!   feeds chunks to a shared
//!   [`ScanAssembler`][roverlink_perception::ScanAssembler], sweeps stale
//!   partial scans on a timer and forwards decoded records as
//!   [`RoverEvent`][listener::RoverEvent]s.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber, optionally exporting spans over OTLP when
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

pub mod listener;
pub mod telemetry;

pub use listener::{ListenerAddrs, ListenerConfig, ListenerStats, RoverEvent, RoverListener};
pub use telemetry::{TracerProviderGuard, init_tracing};
