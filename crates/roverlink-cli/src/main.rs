//! `roverlink` – command line entry point for the rover streaming stack.
//!
//! - `roverlink emulate <ROVER_ID>` replays the rover's trajectory file as
//!   pose, LiDAR and telemetry datagrams until the file ends or Ctrl-C.
//! - `roverlink listen <ROVER_ID>` receives the three streams, reassembles
//!   scans and prints what arrives.
//! - `roverlink command <ROVER_ID> <BYTE>` sends one button command to a
//!   running emulator.

mod config;

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use colored::Colorize;
use roverlink_emulator::{DatFileSource, Emulator, UdpRoverLink};
use roverlink_perception::{pose_to_matrix, transform_points};
use roverlink_runtime::{RoverEvent, RoverListener, init_tracing};
use roverlink_types::{PosePacket, RoverError};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "roverlink", about = "Rover sensor-stream emulator and receiver")]
struct Cli {
    /// Configuration file (defaults to ~/.roverlink/config.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream a rover's recorded trajectory over UDP.
    Emulate {
        rover_id: String,
        /// Transmit the recorded values unperturbed.
        #[arg(long)]
        no_noise: bool,
        /// Trajectory file to replay instead of the profile's.
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Receive and print a rover's streams.
    Listen { rover_id: String },
    /// Send a button command byte (decimal, 0x.. or 0b..) to a rover.
    Command {
        rover_id: String,
        #[arg(value_parser = parse_command_byte)]
        byte: u8,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let service = match &cli.command {
        Command::Emulate { .. } => "roverlink-emulate",
        Command::Listen { .. } => "roverlink-listen",
        Command::Command { .. } => "roverlink-command",
    };
    let _guard = init_tracing(service);

    let result = config::load(cli.config.as_deref()).and_then(|cfg| match cli.command {
        Command::Emulate { rover_id, no_noise, data } => emulate(&cfg, &rover_id, !no_noise, data),
        Command::Listen { rover_id } => listen(&cfg, &rover_id),
        Command::Command { rover_id, byte } => send_command(&cfg, &rover_id, byte),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal");
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

fn emulate(
    cfg: &config::Config,
    rover_id: &str,
    noise: bool,
    data: Option<PathBuf>,
) -> Result<(), RoverError> {
    let profile = cfg.profile(rover_id)?;
    let data_path = data.unwrap_or_else(|| cfg.resolve_data_file(&profile.data_file));

    let source = DatFileSource::open(&data_path)?;
    let link = UdpRoverLink::open(&profile)?;
    let emu_cfg = cfg.emulator_config(noise);

    info!(
        rover = rover_id,
        data = %data_path.display(),
        pose_port = profile.pose_port,
        lidar_port = profile.lidar_port,
        telem_port = profile.telem_port,
        cmd_port = profile.cmd_port,
        noise = ?emu_cfg.noise_stddev,
        "emulating rover"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("{}", "Ctrl-C received – stopping emulator".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let summary = Emulator::new(source, link, emu_cfg).run(&shutdown);
    println!(
        "{} rover {}: {} cycles, {} skipped records, {} commands, {} send failures",
        "✓".green().bold(),
        rover_id.bold(),
        summary.cycles,
        summary.skipped,
        summary.commands_applied,
        summary.send_failures
    );
    Ok(())
}

fn listen(cfg: &config::Config, rover_id: &str) -> Result<(), RoverError> {
    let profile = cfg.profile(rover_id)?;
    let listener_cfg = cfg.listener_config();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| RoverError::Io(format!("cannot start async runtime: {e}")))?;

    runtime.block_on(async move {
        let listener = RoverListener::bind(&profile, listener_cfg).await?;
        let assembler = listener.assembler();

        let (stop_tx, mut stop_rx) = watch::channel(false);
        if let Err(e) = ctrlc::set_handler(move || {
            eprintln!("{}", "Ctrl-C received – stopping listener".yellow().bold());
            let _ = stop_tx.send(true);
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }

        let (tx, mut rx) = mpsc::channel(256);
        let task = tokio::spawn(listener.run(tx, async move {
            // Without a handler the sender is gone; run until the process dies.
            if stop_rx.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        }));

        println!("{} listening for rover {}", "●".green(), rover_id.bold());
        let mut last_pose: Option<PosePacket> = None;
        while let Some(event) = rx.recv().await {
            print_event(&event, last_pose.as_ref());
            if let RoverEvent::Pose(pose) = event {
                last_pose = Some(pose);
            }
        }

        let stats = task
            .await
            .map_err(|e| RoverError::Io(format!("listener task failed: {e}")))?;
        let asm = assembler.stats();
        println!(
            "{} {} poses, {} telemetry, {} scans from {} chunks ({} malformed, {} evicted, {} out of range)",
            "✓".green().bold(),
            stats.poses,
            stats.telemetry,
            stats.scans,
            stats.chunks,
            stats.malformed,
            asm.scans_evicted,
            asm.out_of_range_chunks
        );
        Ok(())
    })
}

fn send_command(cfg: &config::Config, rover_id: &str, byte: u8) -> Result<(), RoverError> {
    let profile = cfg.profile(rover_id)?;
    let target = SocketAddr::from((Ipv4Addr::LOCALHOST, profile.cmd_port));
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
    socket.send_to(&[byte], target)?;
    info!(rover = rover_id, %target, command = byte, "command sent");
    println!("{} sent {:#06b} to rover {}", "✓".green().bold(), byte, rover_id.bold());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn print_event(event: &RoverEvent, last_pose: Option<&PosePacket>) {
    match event {
        RoverEvent::Pose(p) => println!(
            "{} t={:.3} pos=({:.2}, {:.2}, {:.2}) rot=({:.1}, {:.1}, {:.1})",
            "pose ".cyan(),
            p.timestamp,
            p.pos_x,
            p.pos_y,
            p.pos_z,
            p.rot_x_deg,
            p.rot_y_deg,
            p.rot_z_deg
        ),
        RoverEvent::Telemetry(t) => println!(
            "{} t={:.3} buttons={:#06b}",
            "telem".magenta(),
            t.timestamp,
            t.buttons.bits()
        ),
        RoverEvent::Scan(scan) => {
            // Same timestamp bits means the scan was taken at that pose.
            let world = last_pose
                .filter(|p| p.timestamp.to_bits() == scan.timestamp.to_bits())
                .map(|p| transform_points(&pose_to_matrix(p), &scan.points));
            let frame = if world.is_some() { "world" } else { "sensor" };
            let points = world.as_deref().unwrap_or(&scan.points);
            match centroid(points) {
                Some([x, y, z]) => println!(
                    "{} t={:.3} {} points in {} chunks, {frame} centroid=({x:.2}, {y:.2}, {z:.2})",
                    "scan ".green(),
                    scan.timestamp,
                    scan.points.len(),
                    scan.total_chunks
                ),
                None => println!("{} t={:.3} empty", "scan ".green(), scan.timestamp),
            }
        }
    }
}

fn centroid(points: &[roverlink_types::LidarPoint]) -> Option<[f32; 3]> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let sum = points.iter().fold([0.0f32; 3], |acc, p| [acc[0] + p.x, acc[1] + p.y, acc[2] + p.z]);
    Some([sum[0] / n, sum[1] / n, sum[2] / n])
}

fn parse_command_byte(s: &str) -> Result<u8, String> {
    let parsed = if let Some(bin) = s.strip_prefix("0b") {
        u8::from_str_radix(bin, 2)
    } else if let Some(hex) = s.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else {
        s.parse::<u8>()
    };
    parsed.map_err(|e| format!("invalid command byte {s:?}: {e}"))
}
