//! The emulator's network seam.
//!
//! [`RoverLink`] abstracts the three outbound streams and the inbound
//! command channel so the pacing loop can run against real sockets
//! ([`UdpRoverLink`]) or an in-process recorder ([`SimLink`]).

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use roverlink_types::wire::decode_command;
use roverlink_types::{RoverError, RoverProfile, Stream};
use tracing::{debug, warn};

/// Outbound datagram streams plus a non-blocking inbound command poll.
pub trait RoverLink {
    /// Send one datagram on `stream`.  Delivery is best effort.
    fn send(&mut self, stream: Stream, payload: &[u8]) -> Result<(), RoverError>;

    /// Take at most one pending command byte without blocking.
    ///
    /// Returns `Ok(None)` when nothing is queued.
    fn poll_command(&mut self) -> Result<Option<u8>, RoverError>;
}

// ────────────────────────────────────────────────────────────────────────────
// UDP
// ────────────────────────────────────────────────────────────────────────────

/// Loopback UDP implementation: one socket per outbound stream and a
/// non-blocking command socket bound to the rover's command port.
pub struct UdpRoverLink {
    pose: UdpSocket,
    lidar: UdpSocket,
    telemetry: UdpSocket,
    command: UdpSocket,
    pose_target: SocketAddr,
    lidar_target: SocketAddr,
    telemetry_target: SocketAddr,
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

fn ephemeral_socket() -> Result<UdpSocket, RoverError> {
    UdpSocket::bind(loopback(0)).map_err(|e| RoverError::Io(format!("cannot create UDP socket: {e}")))
}

impl UdpRoverLink {
    /// Open the sockets described by `profile` on 127.0.0.1.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Io`] when a socket cannot be created or the
    /// command port cannot be bound.
    pub fn open(profile: &RoverProfile) -> Result<Self, RoverError> {
        Self::bind(
            loopback(profile.pose_port),
            loopback(profile.lidar_port),
            loopback(profile.telem_port),
            loopback(profile.cmd_port),
        )
    }

    /// Open with explicit destination addresses and command bind address.
    pub fn bind(
        pose_target: SocketAddr,
        lidar_target: SocketAddr,
        telemetry_target: SocketAddr,
        command_addr: SocketAddr,
    ) -> Result<Self, RoverError> {
        let command = UdpSocket::bind(command_addr).map_err(|e| {
            RoverError::Io(format!("cannot bind command socket on {command_addr}: {e}"))
        })?;
        command
            .set_nonblocking(true)
            .map_err(|e| RoverError::Io(format!("cannot make command socket non-blocking: {e}")))?;

        Ok(Self {
            pose: ephemeral_socket()?,
            lidar: ephemeral_socket()?,
            telemetry: ephemeral_socket()?,
            command,
            pose_target,
            lidar_target,
            telemetry_target,
        })
    }

    /// Address the command socket is bound to.
    pub fn command_addr(&self) -> Result<SocketAddr, RoverError> {
        Ok(self.command.local_addr()?)
    }
}

impl RoverLink for UdpRoverLink {
    fn send(&mut self, stream: Stream, payload: &[u8]) -> Result<(), RoverError> {
        let (socket, target) = match stream {
            Stream::Pose => (&self.pose, self.pose_target),
            Stream::Lidar => (&self.lidar, self.lidar_target),
            Stream::Telemetry => (&self.telemetry, self.telemetry_target),
        };
        socket.send_to(payload, target)?;
        Ok(())
    }

    fn poll_command(&mut self) -> Result<Option<u8>, RoverError> {
        let mut buf = [0u8; 64];
        match self.command.recv_from(&mut buf) {
            Ok((n, peer)) => match decode_command(&buf[..n]) {
                Ok(byte) => {
                    debug!(%peer, command = byte, "command received");
                    Ok(Some(byte))
                }
                Err(e) => {
                    warn!(%peer, error = %e, "discarding command datagram");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-process link
// ────────────────────────────────────────────────────────────────────────────

/// Records every datagram sent and serves commands from a queue.
#[derive(Debug, Default)]
pub struct SimLink {
    pub sent: Vec<(Stream, Vec<u8>)>,
    pub pending_commands: VecDeque<u8>,
    /// When set, every send fails.
    pub fail_sends: bool,
}

impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command byte for a later [`RoverLink::poll_command`].
    pub fn push_command(&mut self, byte: u8) {
        self.pending_commands.push_back(byte);
    }

    /// Payloads sent on `stream`, in send order.
    pub fn sent_on(&self, stream: Stream) -> Vec<&[u8]> {
        self.sent
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, p)| p.as_slice())
            .collect()
    }
}

impl RoverLink for SimLink {
    fn send(&mut self, stream: Stream, payload: &[u8]) -> Result<(), RoverError> {
        if self.fail_sends {
            return Err(RoverError::Io("simulated send failure".to_string()));
        }
        self.sent.push((stream, payload.to_vec()));
        Ok(())
    }

    fn poll_command(&mut self) -> Result<Option<u8>, RoverError> {
        Ok(self.pending_commands.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn receiver() -> (UdpSocket, SocketAddr) {
        let sock = UdpSocket::bind(loopback(0)).unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = sock.local_addr().unwrap();
        (sock, addr)
    }

    #[test]
    fn udp_link_routes_each_stream_to_its_port() {
        let (pose_rx, pose_addr) = receiver();
        let (lidar_rx, lidar_addr) = receiver();
        let (telem_rx, telem_addr) = receiver();
        let mut link = UdpRoverLink::bind(pose_addr, lidar_addr, telem_addr, loopback(0)).unwrap();

        link.send(Stream::Pose, &[1; 32]).unwrap();
        link.send(Stream::Lidar, &[2; 20]).unwrap();
        link.send(Stream::Telemetry, &[3; 9]).unwrap();

        let mut buf = [0u8; 2048];
        assert_eq!(pose_rx.recv(&mut buf).unwrap(), 32);
        assert_eq!(buf[0], 1);
        assert_eq!(lidar_rx.recv(&mut buf).unwrap(), 20);
        assert_eq!(buf[0], 2);
        assert_eq!(telem_rx.recv(&mut buf).unwrap(), 9);
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn poll_command_is_non_blocking_and_one_per_call() {
        let (_, sink) = receiver();
        let mut link = UdpRoverLink::bind(sink, sink, sink, loopback(0)).unwrap();
        assert_eq!(link.poll_command().unwrap(), None);

        let cmd_addr = link.command_addr().unwrap();
        let tx = UdpSocket::bind(loopback(0)).unwrap();
        tx.send_to(&[0b0001], cmd_addr).unwrap();
        tx.send_to(&[0b0110], cmd_addr).unwrap();

        let first = poll_until_some(&mut link);
        assert_eq!(first, 0b0001);
        let second = poll_until_some(&mut link);
        assert_eq!(second, 0b0110);
        assert_eq!(link.poll_command().unwrap(), None);
    }

    #[test]
    fn oversized_command_is_discarded() {
        let (_, sink) = receiver();
        let mut link = UdpRoverLink::bind(sink, sink, sink, loopback(0)).unwrap();
        let cmd_addr = link.command_addr().unwrap();
        let tx = UdpSocket::bind(loopback(0)).unwrap();
        tx.send_to(&[1, 2, 3], cmd_addr).unwrap();
        tx.send_to(&[9], cmd_addr).unwrap();

        assert_eq!(poll_until_some(&mut link), 9);
    }

    #[test]
    fn binding_a_taken_command_port_fails() {
        let (_, sink) = receiver();
        let taken = UdpSocket::bind(loopback(0)).unwrap();
        let addr = taken.local_addr().unwrap();
        let err = UdpRoverLink::bind(sink, sink, sink, addr).err().unwrap();
        assert!(err.to_string().contains("cannot bind command socket"));
    }

    #[test]
    fn sim_link_records_and_serves_commands() {
        let mut link = SimLink::new();
        link.push_command(4);
        link.send(Stream::Pose, &[0; 32]).unwrap();
        assert_eq!(link.sent_on(Stream::Pose).len(), 1);
        assert_eq!(link.poll_command().unwrap(), Some(4));
        assert_eq!(link.poll_command().unwrap(), None);
    }

    /// Loopback delivery is asynchronous; retry briefly.
    fn poll_until_some(link: &mut UdpRoverLink) -> u8 {
        for _ in 0..200 {
            if let Some(b) = link.poll_command().unwrap() {
                return b;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("no command arrived");
    }
}
