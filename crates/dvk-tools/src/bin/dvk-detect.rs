// SPDX-License-Identifier: Apache-2.0 OR MIT

//! dvk-detect - Identify a device's protocol from a captured sample.
//!
//! Usage:
//!   dvk-detect --protocol protocol.json --sample capture.bin --device-serial SN001
//!   dvk-detect --protocol a.json --protocol b.json --sample capture.bin --allow-ambiguous

use anyhow::{bail, Context, Result};
use clap::Parser;
use dvk_core::detector::{detect, model_file_single, restrict_by_model, DetectionResult, Method, SniffCandidate};
use dvk_tools::{init_logging, load_model, load_protocol, EXIT_AMBIGUOUS, EXIT_ERROR, EXIT_OK};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dvk-detect")]
#[command(about = "Identify a device's protocol from a captured sample")]
#[command(version)]
struct Args {
    /// Protocol schema file(s) (JSON). Pass multiple for sniff-mode candidates.
    #[arg(long = "protocol", required = true)]
    protocols: Vec<PathBuf>,

    /// Captured byte sample to sniff.
    #[arg(long)]
    sample: PathBuf,

    /// Device serial number, recorded in the run record.
    #[arg(long, default_value = "unknown")]
    device_serial: String,

    /// Transport label, recorded in the run record.
    #[arg(long, default_value = "unknown")]
    transport: String,

    /// Optional model descriptor (YAML) restricting sniff candidates.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Accept an ambiguous sniff result instead of exiting with code 2.
    #[arg(long)]
    allow_ambiguous: bool,

    /// Write the run record as JSON to this path instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);
    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("dvk-detect: {err:#}");
            std::process::exit(EXIT_ERROR);
        }
    }
}

fn run(args: &Args) -> Result<i32> {
    let sample = std::fs::read(&args.sample).with_context(|| format!("reading sample {}", args.sample.display()))?;

    let mut candidates = Vec::new();
    for path in &args.protocols {
        let schema = load_protocol(path)?;
        let frame = schema.frames.first().ok_or_else(|| anyhow::anyhow!("protocol {} has no frames", schema.protocol_id))?;
        candidates.push(SniffCandidate {
            protocol_id: schema.protocol_id.clone(),
            protocol_version: schema.protocol_version.clone(),
            frame_spec: frame.clone(),
        });
    }

    let restricted;
    let model_id: Option<String>;
    let candidate_refs: Vec<SniffCandidate> = if let Some(model_path) = &args.model {
        let model = load_model(model_path)?;
        model_id = Some(model.model_id.clone());
        restricted = restrict_by_model(&candidates, &model).into_iter().cloned().collect();
        restricted
    } else {
        model_id = None;
        candidates
    };

    if candidate_refs.is_empty() {
        bail!("no sniff candidates remained after model restriction");
    }

    // If model restriction leaves exactly one candidate, resolve without sniffing.
    let result = if let (1, Some(model_id)) = (candidate_refs.len(), &model_id) {
        model_file_single(&candidate_refs[0], model_id)
    } else {
        let result: DetectionResult = detect(None, None, Some((&candidate_refs, &sample)))?
            .ok_or_else(|| anyhow::anyhow!("detection produced no result"))?;
        result
    };

    let record = dvk_pipeline::records::RunRecord::from_detection(
        args.device_serial.clone(),
        args.transport.clone(),
        format!("sample {} bytes", sample.len()),
        &result,
    );
    let json = serde_json::to_string_pretty(&record)?;
    match &args.output {
        Some(path) => std::fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }

    info!(protocol_id = %result.protocol_id, confidence = result.confidence, method = ?result.method, ambiguous = result.ambiguous, "detection complete");

    if result.ambiguous && result.method == Method::Sniff && !args.allow_ambiguous {
        return Ok(EXIT_AMBIGUOUS);
    }
    Ok(EXIT_OK)
}
