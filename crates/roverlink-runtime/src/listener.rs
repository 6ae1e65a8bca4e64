//! Receiving side of a rover link.
//!
//! [`RoverListener`] owns the three inbound sockets of one rover and a
//! shared [`ScanAssembler`].  Its [`run`][RoverListener::run] loop:
//!
//! - decodes pose and telemetry datagrams and forwards them as
//!   [`RoverEvent`]s;
//! - decodes LiDAR chunk datagrams and hands them to the assembler; every
//!   scan the assembler completes is popped in FIFO order and forwarded as
//!   [`RoverEvent::Scan`];
//! - runs [`ScanAssembler::cleanup_stale_scans`] every
//!   [`ListenerConfig::sweep_interval`].
//!
//! Datagrams of the wrong size are logged and dropped; nothing is retried.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use roverlink_perception::{CompleteScan, DEFAULT_MAX_AGE, ScanAssembler};
use roverlink_types::wire::MAX_CHUNK_DATAGRAM_SIZE;
use roverlink_types::{LidarChunk, PosePacket, RoverError, RoverProfile, Stream, TelemetryPacket};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Default period of the staleness sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

// Larger than any valid datagram so oversized ones are seen (and rejected)
// at their real length instead of being silently truncated.
const RECV_BUFFER_SIZE: usize = MAX_CHUNK_DATAGRAM_SIZE + 256;

/// Sweep tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerConfig {
    /// Partial scans idle for longer than this are evicted.
    pub stale_after: Duration,
    pub sweep_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_MAX_AGE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// A decoded record from one of the rover's streams.
#[derive(Debug, Clone, PartialEq)]
pub enum RoverEvent {
    Pose(PosePacket),
    Telemetry(TelemetryPacket),
    Scan(CompleteScan),
}

/// Datagram counters of a listener run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerStats {
    pub poses: u64,
    pub telemetry: u64,
    pub chunks: u64,
    pub scans: u64,
    pub malformed: u64,
    pub evicted: u64,
}

/// Bound addresses of a listener's sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerAddrs {
    pub pose: SocketAddr,
    pub lidar: SocketAddr,
    pub telemetry: SocketAddr,
}

/// Inbound sockets of one rover plus its scan assembler.
pub struct RoverListener {
    pose: UdpSocket,
    lidar: UdpSocket,
    telemetry: UdpSocket,
    assembler: Arc<ScanAssembler>,
    config: ListenerConfig,
}

async fn bind_socket(stream: Stream, addr: SocketAddr) -> Result<UdpSocket, RoverError> {
    UdpSocket::bind(addr)
        .await
        .map_err(|e| RoverError::Io(format!("cannot bind {stream} socket on {addr}: {e}")))
}

impl RoverListener {
    /// Bind the pose, LiDAR and telemetry ports of `profile` on 127.0.0.1.
    pub async fn bind(profile: &RoverProfile, config: ListenerConfig) -> Result<Self, RoverError> {
        let addr = |port| SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        Self::bind_addrs(
            ListenerAddrs {
                pose: addr(profile.pose_port),
                lidar: addr(profile.lidar_port),
                telemetry: addr(profile.telem_port),
            },
            config,
        )
        .await
    }

    /// Bind explicit addresses (port 0 picks an ephemeral port).
    pub async fn bind_addrs(addrs: ListenerAddrs, config: ListenerConfig) -> Result<Self, RoverError> {
        Ok(Self {
            pose: bind_socket(Stream::Pose, addrs.pose).await?,
            lidar: bind_socket(Stream::Lidar, addrs.lidar).await?,
            telemetry: bind_socket(Stream::Telemetry, addrs.telemetry).await?,
            assembler: Arc::new(ScanAssembler::new()),
            config,
        })
    }

    pub fn local_addrs(&self) -> Result<ListenerAddrs, RoverError> {
        Ok(ListenerAddrs {
            pose: self.pose.local_addr()?,
            lidar: self.lidar.local_addr()?,
            telemetry: self.telemetry.local_addr()?,
        })
    }

    /// Shared handle to the assembler, e.g. for reading its stats.
    pub fn assembler(&self) -> Arc<ScanAssembler> {
        Arc::clone(&self.assembler)
    }

    /// Receive until `shutdown` resolves or `events` is closed.
    pub async fn run(
        self,
        events: mpsc::Sender<RoverEvent>,
        shutdown: impl Future<Output = ()>,
    ) -> ListenerStats {
        tokio::pin!(shutdown);

        let mut stats = ListenerStats::default();
        let mut pose_buf = [0u8; RECV_BUFFER_SIZE];
        let mut lidar_buf = [0u8; RECV_BUFFER_SIZE];
        let mut telem_buf = [0u8; RECV_BUFFER_SIZE];

        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(addrs = ?self.local_addrs().ok(), "listener started");

        loop {
            // Unbiased: a busy LiDAR socket must not starve pose and telemetry.
            let event = tokio::select! {
                _ = &mut shutdown => break,
                _ = sweep.tick() => {
                    let evicted = self.assembler.cleanup_stale_scans(self.config.stale_after);
                    stats.evicted += evicted as u64;
                    None
                }
                res = self.lidar.recv_from(&mut lidar_buf) => match res {
                    Ok((n, _)) => self.on_chunk(&lidar_buf[..n], &mut stats),
                    Err(e) => { warn!(error = %e, "lidar receive failed"); None }
                },
                res = self.pose.recv_from(&mut pose_buf) => match res {
                    Ok((n, _)) => match PosePacket::decode(&pose_buf[..n]) {
                        Ok(pose) => { stats.poses += 1; Some(RoverEvent::Pose(pose)) }
                        Err(e) => { stats.malformed += 1; warn!(error = %e, "dropping pose datagram"); None }
                    },
                    Err(e) => { warn!(error = %e, "pose receive failed"); None }
                },
                res = self.telemetry.recv_from(&mut telem_buf) => match res {
                    Ok((n, _)) => match TelemetryPacket::decode(&telem_buf[..n]) {
                        Ok(t) => { stats.telemetry += 1; Some(RoverEvent::Telemetry(t)) }
                        Err(e) => { stats.malformed += 1; warn!(error = %e, "dropping telemetry datagram"); None }
                    },
                    Err(e) => { warn!(error = %e, "telemetry receive failed"); None }
                },
            };

            if let Some(event) = event
                && events.send(event).await.is_err()
            {
                debug!("event consumer gone; stopping listener");
                break;
            }

            // Completed scans queue up in the assembler; forward them all.
            while let Some(scan) = self.assembler.get_complete_scan() {
                stats.scans += 1;
                if events.send(RoverEvent::Scan(scan)).await.is_err() {
                    debug!("event consumer gone; stopping listener");
                    return stats;
                }
            }
        }

        info!(?stats, "listener stopped");
        stats
    }

    fn on_chunk(&self, datagram: &[u8], stats: &mut ListenerStats) -> Option<RoverEvent> {
        match LidarChunk::decode(datagram) {
            Ok(chunk) => {
                stats.chunks += 1;
                self.assembler.add_packet(chunk);
            }
            Err(e) => {
                stats.malformed += 1;
                warn!(error = %e, "dropping lidar datagram");
            }
        }
        None
    }
}
