// SPDX-License-Identifier: Apache-2.0 OR MIT

//! dvk-encode - Build a command frame from named parameters and write the
//! encoded bytes to a file (or stdout with `--output -`).
//!
//! Usage:
//!   dvk-encode --protocol protocol.json --commands commands.yaml \
//!     --command set_speed --param speed_rpm=1200 --output cmd.bin

use anyhow::{bail, Context, Result};
use clap::Parser;
use dvk_core::codec::{Value, ValueType};
use dvk_core::decoder::Record;
use dvk_core::encoder::encode_command;
use dvk_tools::{init_logging, load_command_set, load_protocol, EXIT_ERROR, EXIT_OK};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dvk-encode")]
#[command(about = "Build a command frame from named parameters")]
#[command(version)]
struct Args {
    /// Protocol schema file (JSON).
    #[arg(long)]
    protocol: PathBuf,

    /// Command set file (YAML).
    #[arg(long)]
    commands: PathBuf,

    /// Which declared frame the command is encoded into. Defaults to the
    /// first frame in the schema.
    #[arg(long)]
    frame: Option<String>,

    /// Command name from the command set.
    #[arg(long)]
    command: String,

    /// Parameter as `name=value` (repeatable). Values are parsed per the
    /// command's declared payload type.
    #[arg(long = "param")]
    params: Vec<String>,

    /// Output path, or `-` for stdout.
    #[arg(long)]
    output: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_param_value(raw: &str, value_type: ValueType) -> Result<Value> {
    match value_type {
        ValueType::Float32Le | ValueType::Float32Be => Ok(Value::Float(raw.parse::<f64>().with_context(|| format!("parsing float param {raw:?}"))?)),
        ValueType::Int8 | ValueType::Int16Le | ValueType::Int16Be | ValueType::Int32Le | ValueType::Int32Be => {
            Ok(Value::Int(raw.parse::<i64>().with_context(|| format!("parsing int param {raw:?}"))?))
        }
        ValueType::Bytes => Ok(Value::Bytes(raw.to_string())),
        _ => Ok(Value::UInt(raw.parse::<u64>().with_context(|| format!("parsing uint param {raw:?}"))?)),
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);
    if let Err(err) = run(&args) {
        eprintln!("dvk-encode: {err:#}");
        std::process::exit(EXIT_ERROR);
    }
    std::process::exit(EXIT_OK);
}

fn run(args: &Args) -> Result<()> {
    let protocol = load_protocol(&args.protocol)?;
    let frame_spec = match &args.frame {
        Some(name) => protocol.frame(name).ok_or_else(|| anyhow::anyhow!("frame {name:?} not declared in protocol"))?,
        None => protocol.frames.first().expect("validated protocol has at least one frame"),
    };
    let command_set = load_command_set(&args.commands)?;
    let command = command_set.command(&args.command).ok_or_else(|| anyhow::anyhow!("command {:?} not declared in command set", args.command))?;

    let mut record = Record::new();
    for raw in &args.params {
        let (name, value) = raw.split_once('=').ok_or_else(|| anyhow::anyhow!("param {raw:?} must be name=value"))?;
        let field = command
            .payload
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| anyhow::anyhow!("command {:?} has no payload field {name:?}", args.command))?;
        record.insert(name, parse_param_value(value, field.value_type)?);
    }
    if record.len() != command.payload.len() {
        bail!(
            "command {:?} requires {} payload fields, got {}",
            args.command,
            command.payload.len(),
            record.len()
        );
    }

    let bytes = encode_command(frame_spec, command, &record)?;

    if args.output.as_os_str() == "-" {
        std::io::stdout().write_all(&bytes)?;
    } else {
        std::fs::write(&args.output, &bytes).with_context(|| format!("writing {}", args.output.display()))?;
    }

    info!(command = %args.command, bytes = bytes.len(), "command encoded");
    Ok(())
}
