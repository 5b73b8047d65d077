// SPDX-License-Identifier: Apache-2.0 OR MIT

//! dvk-live - Run the live decode/publish pipeline against a real
//! transport, publishing point rows into a shared-memory ring for
//! visualizers to read.
//!
//! Usage:
//!   dvk-live --protocol protocol.json --commands commands.yaml \
//!     --transport serial --serial-port /dev/ttyUSB0 --baud 230400 \
//!     --device-id dev1 --capacity 4096

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use dvk_core::schema::{FrameSpec, ProtocolSchema};
use dvk_pipeline::byte_source::{ByteSource, FileSource, SerialSource, TcpSource, UdpSource};
use dvk_pipeline::live::{LiveConfig, LivePipeline};
use dvk_shm::PointRing;
use dvk_tools::{init_logging, load_command_set, load_protocol, EXIT_ERROR, EXIT_OK};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bytes read ahead of the framer to resolve an `if_bits_v1` frame
/// selector. Large enough to cover any reasonable `if_offset`.
const SELECTOR_PREFIX_LEN: usize = 64;
const SELECTOR_PREFIX_ATTEMPTS: u32 = 20;

/// Pick the frame layout to decode. An explicit `--frame` always wins. With
/// no override and a declared `frame_selector`, read a short prefix off
/// `source` and resolve it, pinning the result for the stream's lifetime
/// ("first frame wins", see `FrameSelector::resolve`). The prefix bytes
/// consumed for resolution are returned so the caller can feed them back
/// into the framer.
fn resolve_frame_spec<S: ByteSource>(
    protocol: &ProtocolSchema,
    frame_arg: &Option<String>,
    source: &mut S,
) -> Result<(FrameSpec, Vec<u8>)> {
    if let Some(name) = frame_arg {
        let spec = protocol.frame(name).ok_or_else(|| anyhow::anyhow!("frame {name:?} not declared in protocol"))?.clone();
        return Ok((spec, Vec::new()));
    }

    if let Some(selector) = &protocol.frame_selector {
        let mut prefix = vec![0u8; SELECTOR_PREFIX_LEN];
        let mut filled = 0;
        for _ in 0..SELECTOR_PREFIX_ATTEMPTS {
            if filled >= prefix.len() {
                break;
            }
            let (n, would_block) = source.read(&mut prefix[filled..])?;
            filled += n;
            if n == 0 && would_block {
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        prefix.truncate(filled);
        if !prefix.is_empty() {
            match selector.resolve(&prefix) {
                Ok(name) => {
                    let spec = protocol
                        .frame(name)
                        .ok_or_else(|| anyhow::anyhow!("frame_selector resolved to undeclared frame {name:?}"))?
                        .clone();
                    return Ok((spec, prefix));
                }
                Err(e) => warn!(error = %e, "frame_selector resolution failed, falling back to first frame"),
            }
        } else {
            warn!("no bytes available to resolve frame_selector, falling back to first frame");
        }
    }

    let spec = protocol.frames.first().expect("validated protocol has at least one frame").clone();
    Ok((spec, Vec::new()))
}

#[derive(Parser, Debug)]
#[command(name = "dvk-live")]
#[command(about = "Run the live decode/publish pipeline against a real transport")]
#[command(version)]
struct Args {
    #[arg(long)]
    protocol: PathBuf,

    #[arg(long)]
    frame: Option<String>,

    #[arg(long)]
    commands: Option<PathBuf>,

    #[arg(long, value_enum)]
    transport: Transport,

    #[arg(long)]
    serial_port: Option<String>,

    #[arg(long, default_value = "115200")]
    baud: u32,

    #[arg(long)]
    tcp_addr: Option<SocketAddr>,

    #[arg(long)]
    udp_bind: Option<SocketAddr>,

    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Base name for the SHM ring (`<base>.ctrl`/`<base>.data`).
    #[arg(long)]
    device_id: String,

    #[arg(long, default_value = "4096")]
    capacity: u32,

    #[arg(long, default_value = "20")]
    fps: f64,

    #[arg(long, default_value = "4096")]
    max_points: usize,

    #[arg(long)]
    no_derive_xy: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Transport {
    Serial,
    Tcp,
    Udp,
    File,
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);
    if let Err(err) = run(&args) {
        eprintln!("dvk-live: {err:#}");
        std::process::exit(EXIT_ERROR);
    }
    std::process::exit(EXIT_OK);
}

fn run(args: &Args) -> Result<()> {
    let protocol = load_protocol(&args.protocol)?;
    let transforms = match &args.commands {
        Some(path) => load_command_set(path)?.telemetry.map(|t| t.transforms).unwrap_or_default(),
        None => Vec::new(),
    };

    let base = format!("dvk.{}", args.device_id);
    let ring = PointRing::create_or_attach(&base, args.capacity).with_context(|| format!("opening shm ring {base}"))?;

    let config = LiveConfig {
        fps: args.fps,
        max_points: args.max_points,
        derive_xy: !args.no_derive_xy,
        ..LiveConfig::default()
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    info!(device_id = %args.device_id, transport = ?args.transport, "starting live pipeline");

    match args.transport {
        Transport::Serial => {
            let port = args.serial_port.as_deref().ok_or_else(|| anyhow::anyhow!("--serial-port is required for serial transport"))?;
            let mut source = SerialSource::open(port, args.baud, Duration::from_millis(500))?;
            let (frame_spec, prefix) = resolve_frame_spec(&protocol, &args.frame, &mut source)?;
            let mut pipeline = LivePipeline::new(source, frame_spec, transforms, ring, config);
            pipeline.seed(&prefix);
            drive(pipeline, &running)
        }
        Transport::Tcp => {
            let addr = args.tcp_addr.ok_or_else(|| anyhow::anyhow!("--tcp-addr is required for tcp transport"))?;
            let mut source = TcpSource::connect(addr, Duration::from_secs(5), Duration::from_millis(500), None)?;
            let (frame_spec, prefix) = resolve_frame_spec(&protocol, &args.frame, &mut source)?;
            let mut pipeline = LivePipeline::new(source, frame_spec, transforms, ring, config);
            pipeline.seed(&prefix);
            drive(pipeline, &running)
        }
        Transport::Udp => {
            let bind = args.udp_bind.ok_or_else(|| anyhow::anyhow!("--udp-bind is required for udp transport"))?;
            let mut source = UdpSource::bind(bind, Duration::from_millis(500), None, None)?;
            let (frame_spec, prefix) = resolve_frame_spec(&protocol, &args.frame, &mut source)?;
            let mut pipeline = LivePipeline::new(source, frame_spec, transforms, ring, config);
            pipeline.seed(&prefix);
            drive(pipeline, &running)
        }
        Transport::File => {
            let path = args.input_file.as_ref().ok_or_else(|| anyhow::anyhow!("--input-file is required for file transport"))?;
            let mut source = FileSource::open(path)?;
            let (frame_spec, prefix) = resolve_frame_spec(&protocol, &args.frame, &mut source)?;
            let mut pipeline = LivePipeline::new(source, frame_spec, transforms, ring, config);
            pipeline.seed(&prefix);
            drive(pipeline, &running)
        }
    }
}

fn drive<S: dvk_pipeline::ByteSource>(mut pipeline: LivePipeline<S>, running: &AtomicBool) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        match pipeline.tick() {
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "pipeline tick failed, terminating");
                bail!(e);
            }
        }
    }
    info!(stats = ?pipeline.framer_stats(), "live pipeline stopped");
    Ok(())
}
