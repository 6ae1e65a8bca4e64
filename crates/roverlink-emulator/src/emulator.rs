//! Fixed-rate emulator loop.
//!
//! Each cycle:
//!
//! 1. take the next [`Sample`] (exhausted source → stop; malformed record →
//!    log, skip, no datagrams);
//! 2. optionally add Gaussian noise;
//! 3. stamp it with the elapsed time since the emulator started; the pose,
//!    every chunk and the telemetry of the cycle share this value;
//! 4. send the pose;
//! 5. send the scan as chunks of at most 100 points;
//! 6. take at most one pending command byte and overwrite the button
//!    register with it;
//! 7. send telemetry with the current register;
//! 8. sleep for whatever is left of the cycle interval.
//!
//! Send failures never stop the loop.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use roverlink_emulator::{CycleOutcome, Emulator, EmulatorConfig, Sample};
//! use roverlink_emulator::link::SimLink;
//! use roverlink_types::{LidarPoint, Stream};
//!
//! let samples = vec![Sample {
//!     points: vec![LidarPoint::default(); 250],
//!     ..Default::default()
//! }];
//! let config = EmulatorConfig { noise_stddev: None, ..Default::default() };
//! let mut emu = Emulator::new(samples.into_iter(), SimLink::new(), config);
//!
//! assert!(matches!(emu.step(), CycleOutcome::Emitted { chunks: 3, .. }));
//! assert_eq!(emu.link().sent_on(Stream::Lidar).len(), 3);
//! assert!(matches!(emu.step(), CycleOutcome::Exhausted));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use roverlink_types::{ButtonState, PosePacket, Stream, TelemetryPacket};
use tracing::{debug, info, trace, warn};

use crate::fragment::fragment_scan;
use crate::link::RoverLink;
use crate::noise::{DEFAULT_STDDEV, NoiseInjector};
use crate::source::SampleSource;

/// Default cycle interval (10 Hz).
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_millis(100);

/// Emulator tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct EmulatorConfig {
    pub cycle_interval: Duration,
    /// Gaussian noise standard deviation; `None` disables noise entirely.
    pub noise_stddev: Option<f32>,
    /// Noise RNG seed; 0 draws from OS entropy.
    pub noise_seed: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            noise_stddev: Some(DEFAULT_STDDEV),
            noise_seed: 0,
        }
    }
}

/// Result of a single [`Emulator::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Pose, chunks and telemetry were sent.
    Emitted {
        timestamp: f64,
        chunks: usize,
        /// Command byte applied this cycle, if any.
        command: Option<u8>,
    },
    /// The record was malformed; nothing was sent.
    Skipped,
    /// The source has no more samples.
    Exhausted,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub cycles: u64,
    pub skipped: u64,
    pub commands_applied: u64,
    pub send_failures: u64,
}

/// Replays a [`SampleSource`] over a [`RoverLink`] at a fixed rate.
pub struct Emulator<S, L> {
    source: S,
    link: L,
    noise: Option<NoiseInjector>,
    buttons: ButtonState,
    started: Instant,
    cycle_interval: Duration,
    summary: RunSummary,
}

impl<S: SampleSource, L: RoverLink> Emulator<S, L> {
    /// Build an emulator.  The timestamp clock starts now.
    pub fn new(source: S, link: L, config: EmulatorConfig) -> Self {
        Self {
            source,
            link,
            noise: config
                .noise_stddev
                .map(|stddev| NoiseInjector::new(stddev, config.noise_seed)),
            buttons: ButtonState::default(),
            started: Instant::now(),
            cycle_interval: config.cycle_interval,
            summary: RunSummary::default(),
        }
    }

    /// Current button register.
    pub fn buttons(&self) -> ButtonState {
        self.buttons
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Run one cycle without sleeping (steps 1–7).
    pub fn step(&mut self) -> CycleOutcome {
        let mut sample = match self.source.next_sample() {
            None => return CycleOutcome::Exhausted,
            Some(Err(e)) => {
                warn!(error = %e, "skipping malformed record");
                self.summary.skipped += 1;
                return CycleOutcome::Skipped;
            }
            Some(Ok(sample)) => sample,
        };

        if let Some(noise) = self.noise.as_mut() {
            noise.apply(&mut sample);
        }

        let timestamp = self.started.elapsed().as_secs_f64();

        let [pos_x, pos_y, pos_z] = sample.position;
        let [rot_x_deg, rot_y_deg, rot_z_deg] = sample.rotation_deg;
        let pose = PosePacket {
            timestamp,
            pos_x,
            pos_y,
            pos_z,
            rot_x_deg,
            rot_y_deg,
            rot_z_deg,
        };
        self.transmit(Stream::Pose, &pose.encode());

        let chunks = fragment_scan(timestamp, &sample.points);
        for chunk in &chunks {
            match chunk.encode() {
                Ok(buf) => self.transmit(Stream::Lidar, &buf),
                Err(e) => warn!(error = %e, "cannot encode chunk"),
            }
        }

        let command = self.drain_command();
        let telemetry = TelemetryPacket {
            timestamp,
            buttons: self.buttons,
        };
        self.transmit(Stream::Telemetry, &telemetry.encode());

        self.summary.cycles += 1;
        debug!(
            timestamp,
            points = sample.points.len(),
            chunks = chunks.len(),
            buttons = self.buttons.bits(),
            "cycle emitted"
        );
        CycleOutcome::Emitted {
            timestamp,
            chunks: chunks.len(),
            command,
        }
    }

    /// Loop until the source is exhausted or `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) -> RunSummary {
        info!(interval_ms = self.cycle_interval.as_millis() as u64, "emulator started");
        while !shutdown.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();
            match self.step() {
                CycleOutcome::Exhausted => break,
                CycleOutcome::Skipped => continue,
                CycleOutcome::Emitted { .. } => {
                    thread::sleep(self.cycle_interval.saturating_sub(cycle_start.elapsed()));
                }
            }
        }
        info!(
            cycles = self.summary.cycles,
            skipped = self.summary.skipped,
            commands = self.summary.commands_applied,
            send_failures = self.summary.send_failures,
            "emulator finished"
        );
        self.summary
    }

    fn transmit(&mut self, stream: Stream, payload: &[u8]) {
        if let Err(e) = self.link.send(stream, payload) {
            trace!(%stream, error = %e, "send failed; dropping datagram");
            self.summary.send_failures += 1;
        }
    }

    fn drain_command(&mut self) -> Option<u8> {
        match self.link.poll_command() {
            Ok(Some(byte)) => {
                self.buttons.overwrite(byte);
                self.summary.commands_applied += 1;
                Some(byte)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "command poll failed");
                None
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SimLink;
    use crate::source::{DatFileSource, Sample};
    use roverlink_types::{LidarChunk, LidarPoint, RoverError};
    use std::io::Cursor;

    fn quiet() -> EmulatorConfig {
        EmulatorConfig {
            cycle_interval: Duration::from_millis(10),
            noise_stddev: None,
            noise_seed: 0,
        }
    }

    fn sample(points: usize) -> Sample {
        Sample {
            position: [1.0, 2.0, 3.0],
            rotation_deg: [10.0, 20.0, 30.0],
            points: (0..points).map(|i| LidarPoint::new(i as f32, 0.0, 0.0)).collect(),
        }
    }

    #[test]
    fn noiseless_pose_matches_source_exactly() {
        let data = "0.1,-2.5,3.75,359.9,-0.001,45.125; 1,2,3\n";
        let mut emu = Emulator::new(DatFileSource::new(Cursor::new(data)), SimLink::new(), quiet());
        emu.step();

        let sent = emu.link().sent_on(Stream::Pose);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 32);
        let pose = PosePacket::decode(sent[0]).unwrap();
        assert_eq!(pose.pos_x, "0.1".parse::<f32>().unwrap());
        assert_eq!(pose.pos_y, -2.5);
        assert_eq!(pose.pos_z, 3.75);
        assert_eq!(pose.rot_x_deg, "359.9".parse::<f32>().unwrap());
        assert_eq!(pose.rot_y_deg, "-0.001".parse::<f32>().unwrap());
        assert_eq!(pose.rot_z_deg, 45.125);
    }

    #[test]
    fn cycle_shares_one_timestamp_across_streams() {
        let mut emu = Emulator::new(vec![sample(250)].into_iter(), SimLink::new(), quiet());
        let CycleOutcome::Emitted { timestamp, chunks, command } = emu.step() else {
            panic!("expected an emitted cycle");
        };
        assert_eq!(chunks, 3);
        assert_eq!(command, None);

        let link = emu.link();
        let pose = PosePacket::decode(link.sent_on(Stream::Pose)[0]).unwrap();
        assert_eq!(pose.timestamp.to_bits(), timestamp.to_bits());

        let lidar = link.sent_on(Stream::Lidar);
        let sizes: Vec<usize> = lidar.iter().map(|d| d.len()).collect();
        assert_eq!(sizes, vec![1220, 1220, 620]);
        for (i, d) in lidar.iter().enumerate() {
            let chunk = LidarChunk::decode(d).unwrap();
            assert_eq!(chunk.header.timestamp.to_bits(), timestamp.to_bits());
            assert_eq!(chunk.header.chunk_index, i as u32);
            assert_eq!(chunk.header.total_chunks, 3);
        }

        let telem = link.sent_on(Stream::Telemetry);
        assert_eq!(telem[0].len(), 9);
        assert_eq!(TelemetryPacket::decode(telem[0]).unwrap().timestamp, timestamp);
    }

    #[test]
    fn send_order_is_pose_chunks_telemetry() {
        let mut emu = Emulator::new(vec![sample(120)].into_iter(), SimLink::new(), quiet());
        emu.step();
        let order: Vec<Stream> = emu.link().sent.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            order,
            vec![Stream::Pose, Stream::Lidar, Stream::Lidar, Stream::Telemetry]
        );
    }

    #[test]
    fn empty_scan_sends_no_chunks() {
        let mut emu = Emulator::new(vec![sample(0)].into_iter(), SimLink::new(), quiet());
        assert!(matches!(emu.step(), CycleOutcome::Emitted { chunks: 0, .. }));
        assert!(emu.link().sent_on(Stream::Lidar).is_empty());
        assert_eq!(emu.link().sent_on(Stream::Pose).len(), 1);
        assert_eq!(emu.link().sent_on(Stream::Telemetry).len(), 1);
    }

    #[test]
    fn one_command_per_cycle_and_register_is_sticky() {
        let mut link = SimLink::new();
        link.push_command(0b0011);
        link.push_command(0b0100);
        let samples = vec![sample(1), sample(1), sample(1), sample(1)];
        let mut emu = Emulator::new(samples.into_iter(), link, quiet());

        let commands: Vec<Option<u8>> = (0..4)
            .map(|_| match emu.step() {
                CycleOutcome::Emitted { command, .. } => command,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(commands, vec![Some(0b0011), Some(0b0100), None, None]);

        let buttons: Vec<u8> = emu
            .link()
            .sent_on(Stream::Telemetry)
            .iter()
            .map(|d| TelemetryPacket::decode(d).unwrap().buttons.bits())
            .collect();
        // Wholesale overwrite: 0b0011 does not survive into the second cycle.
        assert_eq!(buttons, vec![0b0011, 0b0100, 0b0100, 0b0100]);
        assert_eq!(emu.buttons(), ButtonState(0b0100));
        assert_eq!(emu.summary().commands_applied, 2);
    }

    #[test]
    fn malformed_record_emits_nothing_and_loop_continues() {
        let data = "not a record\n0,0,0,0,0,0; 1,1,1\n";
        let mut emu = Emulator::new(DatFileSource::new(Cursor::new(data)), SimLink::new(), quiet());

        assert_eq!(emu.step(), CycleOutcome::Skipped);
        assert!(emu.link().sent.is_empty());
        assert!(matches!(emu.step(), CycleOutcome::Emitted { chunks: 1, .. }));
        assert_eq!(emu.step(), CycleOutcome::Exhausted);
        assert_eq!(emu.summary().skipped, 1);
    }

    #[test]
    fn send_failures_are_not_fatal() {
        let link = SimLink {
            fail_sends: true,
            ..Default::default()
        };
        let mut emu = Emulator::new(vec![sample(150)].into_iter(), link, quiet());
        assert!(matches!(emu.step(), CycleOutcome::Emitted { chunks: 2, .. }));
        assert_eq!(emu.summary().send_failures, 4);
    }

    #[test]
    fn noise_perturbs_pose_when_enabled() {
        let config = EmulatorConfig {
            noise_stddev: Some(0.5),
            noise_seed: 11,
            ..quiet()
        };
        let mut emu = Emulator::new(vec![sample(3)].into_iter(), SimLink::new(), config);
        emu.step();
        let pose = PosePacket::decode(emu.link().sent_on(Stream::Pose)[0]).unwrap();
        assert_ne!(pose.pos_x, 1.0);
        assert_ne!(pose.rot_z_deg, 30.0);
    }

    #[test]
    fn run_paces_cycles_and_stops_at_end_of_data() {
        let samples = vec![sample(10), sample(10), sample(10)];
        let mut emu = Emulator::new(samples.into_iter(), SimLink::new(), quiet());
        let shutdown = AtomicBool::new(false);

        let start = Instant::now();
        let summary = emu.run(&shutdown);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(summary.cycles, 3);

        let stamps: Vec<f64> = emu
            .link()
            .sent_on(Stream::Pose)
            .iter()
            .map(|d| PosePacket::decode(d).unwrap().timestamp)
            .collect();
        assert!(stamps.windows(2).all(|w| w[1] - w[0] >= 0.009), "{stamps:?}");
    }

    /// Takes `delay` to produce each sample.
    struct SlowSource {
        remaining: usize,
        delay: Duration,
    }

    impl SampleSource for SlowSource {
        fn next_sample(&mut self) -> Option<Result<Sample, RoverError>> {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            std::thread::sleep(self.delay);
            Some(Ok(sample(5)))
        }
    }

    #[test]
    fn slow_cycles_only_sleep_what_is_left_of_the_interval() {
        let source = SlowSource {
            remaining: 3,
            delay: Duration::from_millis(30),
        };
        let config = EmulatorConfig {
            cycle_interval: Duration::from_millis(40),
            ..quiet()
        };
        let mut emu = Emulator::new(source, SimLink::new(), config);

        let start = Instant::now();
        let summary = emu.run(&AtomicBool::new(false));
        let elapsed = start.elapsed();

        assert_eq!(summary.cycles, 3);
        // Three 40 ms cycles; a full sleep after each slow step would take 210 ms.
        assert!(elapsed >= Duration::from_millis(115), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(170), "{elapsed:?}");
    }

    #[test]
    fn run_honours_shutdown_flag() {
        let mut emu = Emulator::new(vec![sample(1)].into_iter(), SimLink::new(), quiet());
        let shutdown = AtomicBool::new(true);
        let summary = emu.run(&shutdown);
        assert_eq!(summary.cycles, 0);
        assert!(emu.link().sent.is_empty());
    }
}
