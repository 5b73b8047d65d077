// SPDX-License-Identifier: Apache-2.0 OR MIT

//! dvk-shm-viewer - Inspect DVK point-ring shared memory segments
//!
//! Displays the control header of `dvk.<device_id>.ctrl` segments under
//! `/dev/shm`. Does not depend on `dvk-shm` itself: it hand-reads the
//! bit-exact 32-byte control header layout directly, the same way a
//! third-party debugging tool would.

use clap::Parser;
use colored::*;
use std::ffi::CString;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const CONTROL_VERSION: u32 = 1;
const CONTROL_HEADER_SIZE: usize = 32;

/// Inspect DVK point-ring shared memory segments
#[derive(Parser, Debug)]
#[command(name = "dvk-shm-viewer")]
#[command(version = "0.1.0")]
#[command(about = "Inspect DVK point-ring shared memory segments")]
struct Args {
    /// Show detailed control header information
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Output format: pretty, json
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Show only summary statistics
    #[arg(short, long)]
    summary: bool,

    /// Specific segment base name to inspect (without the `.ctrl` suffix or `/dev/shm` prefix)
    #[arg()]
    segment: Option<String>,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(OutputFormat::Pretty),
            "json" | "j" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Debug)]
struct SegmentInfo {
    base: String,
    ctrl_file_size: u64,
    data_file_size: u64,
    control: Option<ControlInfo>,
    error: Option<String>,
}

#[derive(Debug)]
struct ControlInfo {
    version: u32,
    capacity: u32,
    write_index: u32,
    seq: u64,
    last_write_ns: u64,
    is_valid: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let shm_dir = Path::new("/dev/shm");

    if !shm_dir.exists() {
        return Err("Shared memory directory /dev/shm not found".into());
    }

    let segments = if let Some(ref base) = args.segment {
        vec![inspect_segment(base)]
    } else {
        scan_dvk_segments(shm_dir)?
    };

    match args.format {
        OutputFormat::Pretty => print_pretty(&segments, args),
        OutputFormat::Json => print_json(&segments),
    }

    Ok(())
}

fn scan_dvk_segments(shm_dir: &Path) -> Result<Vec<SegmentInfo>, Box<dyn std::error::Error>> {
    let mut bases = std::collections::BTreeSet::new();

    for entry in fs::read_dir(shm_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = match file_name.to_str() {
            Some(n) => n,
            None => continue,
        };

        if let Some(base) = name.strip_suffix(".ctrl") {
            if base.starts_with("dvk.") {
                bases.insert(base.to_string());
            }
        } else if let Some(base) = name.strip_suffix(".data") {
            if base.starts_with("dvk.") {
                bases.insert(base.to_string());
            }
        }
    }

    Ok(bases.into_iter().map(|b| inspect_segment(&b)).collect())
}

fn inspect_segment(base: &str) -> SegmentInfo {
    let base = base.trim_start_matches('/').to_string();
    let ctrl_path = format!("/dev/shm/{}.ctrl", base);
    let data_path = format!("/dev/shm/{}.data", base);

    let ctrl_file_size = fs::metadata(&ctrl_path).map(|m| m.len()).unwrap_or(0);
    let data_file_size = fs::metadata(&data_path).map(|m| m.len()).unwrap_or(0);

    let shm_name = format!("/{}.ctrl", base);
    match open_and_read_control(&shm_name) {
        Ok(control) => SegmentInfo { base, ctrl_file_size, data_file_size, control: Some(control), error: None },
        Err(e) => SegmentInfo { base, ctrl_file_size, data_file_size, control: None, error: Some(e.to_string()) },
    }
}

fn open_and_read_control(shm_name: &str) -> Result<ControlInfo, Box<dyn std::error::Error>> {
    let c_name = CString::new(shm_name)?;

    // SAFETY: shm_open/mmap/munmap/close are standard POSIX calls; fd and
    // ptr are checked for failure before use, and ptr is unmapped before
    // returning.
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
    if fd < 0 {
        return Err("failed to open segment".into());
    }

    let ptr = unsafe { libc::mmap(std::ptr::null_mut(), CONTROL_HEADER_SIZE, libc::PROT_READ, libc::MAP_SHARED, fd, 0) };

    unsafe { libc::close(fd) };

    if ptr == libc::MAP_FAILED {
        return Err("failed to map segment".into());
    }

    // Layout: version(4) + capacity(4) + write_index(4) + pad(4) + seq(8) + last_write_ns(8)
    let version_ptr = ptr as *const AtomicU32;
    let capacity_ptr = unsafe { (ptr as *const u8).add(4) as *const AtomicU32 };
    let write_index_ptr = unsafe { (ptr as *const u8).add(8) as *const AtomicU32 };
    let seq_ptr = unsafe { (ptr as *const u8).add(16) as *const AtomicU64 };
    let last_write_ns_ptr = unsafe { (ptr as *const u8).add(24) as *const AtomicU64 };

    let version = unsafe { (*version_ptr).load(Ordering::Relaxed) };
    let capacity = unsafe { (*capacity_ptr).load(Ordering::Relaxed) };
    let write_index = unsafe { (*write_index_ptr).load(Ordering::Relaxed) };
    let seq = unsafe { (*seq_ptr).load(Ordering::Relaxed) };
    let last_write_ns = unsafe { (*last_write_ns_ptr).load(Ordering::Relaxed) };

    unsafe { libc::munmap(ptr, CONTROL_HEADER_SIZE) };

    let is_valid = version == CONTROL_VERSION;

    Ok(ControlInfo { version, capacity, write_index, seq, last_write_ns, is_valid })
}

fn print_pretty(segments: &[SegmentInfo], args: &Args) {
    if segments.is_empty() {
        println!("{}", "No DVK shared memory segments found".yellow());
        return;
    }

    if args.summary {
        print_summary(segments);
        return;
    }

    println!();
    println!("{}", "=== DVK Point Ring Segments ===".bold());
    println!();

    let mut total_size: u64 = 0;
    let mut total_points: u64 = 0;

    for seg in segments {
        total_size += seg.ctrl_file_size + seg.data_file_size;

        println!(
            "  {} ({} ctrl, {} data)",
            seg.base.cyan(),
            format_size(seg.ctrl_file_size),
            format_size(seg.data_file_size)
        );

        if let Some(ref ctrl) = seg.control {
            let valid_badge = if ctrl.is_valid { "VALID".green() } else { "INVALID".red() };

            if args.verbose {
                println!("      Version: {} [{}]", ctrl.version, valid_badge);
                println!("      Capacity: {} points", ctrl.capacity);
                println!("      Write index: {}  Seq: {}", ctrl.write_index, ctrl.seq);
                println!("      Last write: {} ns since epoch", ctrl.last_write_ns.to_string().yellow());
            } else {
                println!(
                    "      [{}] cap={} points, write_index={}, seq={}",
                    valid_badge, ctrl.capacity, ctrl.write_index, ctrl.seq
                );
            }

            total_points += ctrl.seq;
        }

        if let Some(ref err) = seg.error {
            println!("      {}: {}", "Error".red(), err);
        }

        println!();
    }

    println!("{}", "--- Summary ---".dimmed());
    println!("  Segments: {}", segments.len());
    println!("  Total size: {}", format_size(total_size));
    println!("  Total points written (sum of seq): {}", total_points);
    println!();
}

fn print_summary(segments: &[SegmentInfo]) {
    let mut total_size: u64 = 0;
    let mut total_points: u64 = 0;
    let mut valid_count = 0;

    for seg in segments {
        total_size += seg.ctrl_file_size + seg.data_file_size;
        if let Some(ref ctrl) = seg.control {
            if ctrl.is_valid {
                valid_count += 1;
            }
            total_points += ctrl.seq;
        }
    }

    println!(
        "segments={} valid={} size={} points={}",
        segments.len(),
        valid_count,
        total_size,
        total_points
    );
}

fn print_json(segments: &[SegmentInfo]) {
    print!("{{\"segments\":[");

    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            print!(",");
        }

        print!(
            "{{\"base\":\"{}\",\"ctrl_size\":{},\"data_size\":{}",
            seg.base, seg.ctrl_file_size, seg.data_file_size
        );

        if let Some(ref ctrl) = seg.control {
            print!(
                ",\"control\":{{\"version\":{},\"capacity\":{},\"write_index\":{},\"seq\":{},\"last_write_ns\":{},\"valid\":{}}}",
                ctrl.version, ctrl.capacity, ctrl.write_index, ctrl.seq, ctrl.last_write_ns, ctrl.is_valid
            );
        }

        if let Some(ref err) = seg.error {
            print!(",\"error\":\"{}\"", err.replace('"', "\\\""));
        }

        print!("}}");
    }

    println!("]}}");
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
