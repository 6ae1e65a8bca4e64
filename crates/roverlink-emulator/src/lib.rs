//! `roverlink-emulator` – the rover side of the link.
//!
//! Replays a recorded trajectory as live sensor traffic: every cycle one
//! pose, one fragmented LiDAR scan and one telemetry record go out over
//! UDP, while button commands are drained from an inbound socket without
//! ever stalling the pacing loop.
//!
//! # Modules
//!
//! - [`source`] – [`SampleSource`][source::SampleSource] trait and the
//!   line-oriented [`DatFileSource`][source::DatFileSource] parser.
//! - [`noise`] – [`NoiseInjector`][noise::NoiseInjector]: independent
//!   zero-mean Gaussian perturbation of pose and point fields.
//! - [`fragment`] – [`fragment_scan`][fragment::fragment_scan]: splits a
//!   point cloud into chunks of at most 100 points.
//! - [`link`] – [`RoverLink`][link::RoverLink] trait and the loopback
//!   [`UdpRoverLink`][link::UdpRoverLink].
//! - [`emulator`] – [`Emulator`][emulator::Emulator]: the fixed-rate
//!   pacing loop tying the pieces together.

pub mod emulator;
pub mod fragment;
pub mod link;
pub mod noise;
pub mod source;

pub use emulator::{CycleOutcome, Emulator, EmulatorConfig, RunSummary};
pub use fragment::fragment_scan;
pub use link::{RoverLink, UdpRoverLink};
pub use noise::NoiseInjector;
pub use source::{DatFileSource, Sample, SampleSource};
