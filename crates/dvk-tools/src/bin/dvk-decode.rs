// SPDX-License-Identifier: Apache-2.0 OR MIT

//! dvk-decode - Offline decode of a captured byte stream into per-field
//! records, optionally expanded into semantic point rows.
//!
//! Usage:
//!   dvk-decode --protocol protocol.json --input capture.bin --output out.csv
//!   dvk-decode --protocol protocol.json --commands commands.yaml --input capture.bin --output out.json --format json

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dvk_core::codec::Value;
use dvk_core::decoder::{decode_frame, Record};
use dvk_core::framer::Framer;
use dvk_core::semantics::apply_semantics;
use dvk_pipeline::byte_source::{ByteSource, FileSource};
use dvk_pipeline::records::{DecodeMetadata, DecodeStatsRecord, SemanticApplication};
use dvk_tools::{init_logging, load_command_set, load_protocol, EXIT_ERROR, EXIT_OK};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dvk-decode")]
#[command(about = "Offline decode of a captured byte stream into records")]
#[command(version)]
struct Args {
    /// Protocol schema file (JSON).
    #[arg(long)]
    protocol: PathBuf,

    /// Which declared frame to decode. Defaults to the first frame in the schema.
    #[arg(long)]
    frame: Option<String>,

    /// Auto-select the frame layout from the protocol's `frame_selector`
    /// (requires the schema to declare one); ignored if `--frame` is set.
    #[arg(long)]
    auto_frame_by_if: bool,

    /// Optional command set (YAML) supplying a telemetry transform.
    #[arg(long)]
    commands: Option<PathBuf>,

    /// Captured byte stream to decode.
    #[arg(long)]
    input: PathBuf,

    /// Output path for decoded records.
    #[arg(long)]
    output: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Metadata output path (JSON). Defaults to `<output>.meta.json`.
    #[arg(long)]
    metadata: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Format {
    Csv,
    Json,
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);
    if let Err(err) = run(&args) {
        eprintln!("dvk-decode: {err:#}");
        std::process::exit(EXIT_ERROR);
    }
    std::process::exit(EXIT_OK);
}

fn value_to_csv_field(value: &Value) -> String {
    match value {
        Value::UInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Bytes(hex) => hex.clone(),
    }
}

fn write_csv(records: &[Record], mut out: impl Write) -> Result<()> {
    let first = match records.first() {
        Some(r) => r,
        None => return Ok(()),
    };
    let headers: Vec<&str> = first.iter().map(|(name, _)| name).collect();
    writeln!(out, "{}", headers.join(","))?;
    for record in records {
        let row: Vec<String> = record.iter().map(|(_, v)| value_to_csv_field(v)).collect();
        writeln!(out, "{}", row.join(","))?;
    }
    Ok(())
}

fn write_json(records: &[Record], mut out: impl Write) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    out.write_all(json.as_bytes())?;
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let protocol = load_protocol(&args.protocol)?;
    let frame_spec = match &args.frame {
        Some(name) => protocol.frame(name).ok_or_else(|| anyhow::anyhow!("frame {name:?} not declared in protocol"))?,
        None if args.auto_frame_by_if => match &protocol.frame_selector {
            Some(selector) => {
                let sample = std::fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
                let head = &sample[..sample.len().min(65535)];
                match selector.resolve(head) {
                    Ok(name) => protocol
                        .frame(name)
                        .ok_or_else(|| anyhow::anyhow!("frame_selector resolved to undeclared frame {name:?}"))?,
                    Err(e) => {
                        warn!(error = %e, "frame_selector resolution failed, falling back to first frame");
                        protocol.frames.first().expect("validated protocol has at least one frame")
                    }
                }
            }
            None => {
                warn!("--auto-frame-by-if set but protocol declares no frame_selector, falling back to first frame");
                protocol.frames.first().expect("validated protocol has at least one frame")
            }
        },
        None => protocol.frames.first().expect("validated protocol has at least one frame"),
    };

    let mut source = FileSource::open(&args.input).with_context(|| format!("opening {}", args.input.display()))?;
    let mut framer = Framer::new(frame_spec);
    let mut buf = vec![0u8; 65536];
    loop {
        let (n, eof) = source.read(&mut buf)?;
        if n > 0 {
            framer.feed(&buf[..n]);
        }
        if eof {
            break;
        }
    }

    let mut records = Vec::new();
    let mut decode_errors: u64 = 0;
    let mut frame_idx: u32 = 0;
    while let Some(raw) = framer.next_frame()? {
        match decode_frame(&raw.bytes, frame_spec) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(error = %e, "frame decode failed");
                decode_errors += 1;
            }
        }
        frame_idx = frame_idx.wrapping_add(1);
    }

    let semantic = if let Some(commands_path) = &args.commands {
        let command_set = load_command_set(commands_path)?;
        match &command_set.telemetry {
            Some(spec) => {
                let mut rows = Vec::new();
                for (idx, record) in records.iter().enumerate() {
                    match apply_semantics(&spec.transforms, idx as u32, &frame_spec.name, record) {
                        Ok(mut r) => rows.append(&mut r),
                        Err(e) => warn!(error = %e, "semantic transform failed for a frame"),
                    }
                }
                let json = serde_json::to_string_pretty(&rows)?;
                let points_path = args.output.with_extension("points.json");
                std::fs::write(&points_path, json).with_context(|| format!("writing {}", points_path.display()))?;
                SemanticApplication { applied: true, reason: None }
            }
            None => SemanticApplication { applied: false, reason: Some("command set declares no telemetry transform".to_string()) },
        }
    } else {
        SemanticApplication { applied: false, reason: Some("no --commands supplied".to_string()) }
    };

    let output_file = std::fs::File::create(&args.output).with_context(|| format!("creating {}", args.output.display()))?;
    match args.format {
        Format::Csv => write_csv(&records, output_file)?,
        Format::Json => write_json(&records, output_file)?,
    }

    let stats = framer.stats();
    let mut stats_record = DecodeStatsRecord::from(stats);
    stats_record.decode_errors = decode_errors;

    let metadata = DecodeMetadata {
        device_id: args.input.display().to_string(),
        protocol: format!("{}/{}", protocol.protocol_id, protocol.protocol_version),
        frame_name: frame_spec.name.clone(),
        input_path: args.input.display().to_string(),
        output_paths: vec![args.output.display().to_string()],
        stats: stats_record,
        semantic,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let metadata_path = args.metadata.clone().unwrap_or_else(|| {
        let mut p = args.output.clone();
        let name = format!("{}.meta.json", p.file_stem().and_then(|s| s.to_str()).unwrap_or("decode"));
        p.set_file_name(name);
        p
    });
    std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?).with_context(|| format!("writing {}", metadata_path.display()))?;

    info!(frames_decoded = records.len(), decode_errors, frames_ok = framer.stats().frames_ok, "decode complete");
    Ok(())
}
