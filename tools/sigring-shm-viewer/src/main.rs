// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! sigring-shm-viewer - Inspect sigring shared memory channels
//!
//! Decodes the ring header of each segment: geometry, indices, queued
//! elements and the waiting flags of both sides.

use clap::Parser;
use colored::*;
use sigring::layout::RingHeader;
use sigring::HEADER_SIZE;
use std::ffi::CString;
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;

/// Prefix of the segments created by sigring-sim
const SIM_PREFIX: &str = "sigring_";

/// Inspect sigring shared memory channels
#[derive(Parser, Debug)]
#[command(name = "sigring-shm-viewer")]
#[command(version)]
#[command(about = "Inspect sigring shared memory channels")]
struct Args {
    /// Only show channels of the kernel with this pid
    #[arg(short, long)]
    kernel: Option<u32>,

    /// Scan every segment in /dev/shm, not only sigring_* names
    #[arg(short, long)]
    all: bool,

    /// Show detailed header information
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Output format: pretty, json
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Show only summary statistics
    #[arg(short, long)]
    summary: bool,

    /// Specific segment name to inspect (without /dev/shm prefix)
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
    name: String,
    file_size: u64,
    role: ChannelRole,
    ring: Option<RingInfo>,
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelRole {
    App,
    Ic,
    Stress,
    Other,
}

impl ChannelRole {
    fn from_name(name: &str) -> Self {
        if name.starts_with("sigring_app") {
            Self::App
        } else if name.starts_with("sigring_ic_") {
            Self::Ic
        } else if name.starts_with("sigring_stress_") {
            Self::Stress
        } else {
            Self::Other
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Ic => "ic",
            Self::Stress => "stress",
            Self::Other => "other",
        }
    }
}

/// Decoded ring header
#[derive(Debug)]
struct RingInfo {
    capacity: u32,
    element_size: u32,
    head: u32,
    tail: u32,
    writer_waiting: bool,
    reader_waiting: bool,
    is_valid: bool,
}

impl RingInfo {
    fn queued(&self) -> u32 {
        if self.capacity == 0 {
            0
        } else if self.tail >= self.head {
            self.tail - self.head
        } else {
            self.capacity - self.head + self.tail
        }
    }
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

    let segments = if let Some(ref name) = args.segment {
        vec![inspect_segment(name)]
    } else {
        scan_segments(shm_dir, args)?
    };

    match args.format {
        OutputFormat::Pretty => print_pretty(&segments, args),
        OutputFormat::Json => print_json(&segments),
    }

    Ok(())
}

fn matches_kernel(name: &str, pid: u32) -> bool {
    name.strip_prefix(SIM_PREFIX)
        .and_then(|rest| rest.rsplit('_').next())
        .is_some_and(|suffix| suffix == pid.to_string())
}

fn scan_segments(shm_dir: &Path, args: &Args) -> Result<Vec<SegmentInfo>, Box<dyn std::error::Error>> {
    let mut segments = Vec::new();

    for entry in fs::read_dir(shm_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = match file_name.to_str() {
            Some(n) => n,
            None => continue,
        };

        if !args.all && !name.starts_with(SIM_PREFIX) {
            continue;
        }

        if let Some(pid) = args.kernel {
            let role = ChannelRole::from_name(name);
            if !matches!(role, ChannelRole::App | ChannelRole::Ic) || !matches_kernel(name, pid) {
                continue;
            }
        }

        segments.push(inspect_segment(name));
    }

    segments.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(segments)
}

fn inspect_segment(name: &str) -> SegmentInfo {
    let display_name = name.trim_start_matches('/').to_string();
    let shm_name = format!("/{}", display_name);
    let file_size = fs::metadata(format!("/dev/shm/{}", display_name))
        .map(|m| m.len())
        .unwrap_or(0);

    let (ring, error) = match read_header(&shm_name, file_size) {
        Ok(ring) => (Some(ring), None),
        Err(e) => (None, Some(e.to_string())),
    };

    SegmentInfo {
        role: ChannelRole::from_name(&display_name),
        name: display_name,
        file_size,
        ring,
        error,
    }
}

fn read_header(shm_name: &str, file_size: u64) -> Result<RingInfo, Box<dyn std::error::Error>> {
    if file_size < HEADER_SIZE as u64 {
        return Err(format!("{} bytes, too small for a ring header", file_size).into());
    }

    let c_name = CString::new(shm_name)?;

    // SAFETY: c_name is a valid NUL-terminated string
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
    if fd < 0 {
        return Err(format!("open failed: {}", std::io::Error::last_os_error()).into());
    }

    // Map just the header, read-only
    // SAFETY: fd is open; the segment is at least HEADER_SIZE bytes
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            HEADER_SIZE,
            libc::PROT_READ,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };

    // SAFETY: fd is open; the mapping stays valid after close
    unsafe { libc::close(fd) };

    if ptr == libc::MAP_FAILED {
        return Err(format!("mmap failed: {}", std::io::Error::last_os_error()).into());
    }

    // SAFETY: ptr maps HEADER_SIZE readable, page-aligned bytes; RingHeader is repr(C)
    // and only read through shared references and atomic loads
    let header = unsafe { &*(ptr as *const RingHeader) };
    let info = RingInfo {
        capacity: header.capacity,
        element_size: header.element_size,
        head: header.head.load(Ordering::Acquire),
        tail: header.tail.load(Ordering::Acquire),
        writer_waiting: header.writer_waiting.load(Ordering::Relaxed) != 0,
        reader_waiting: header.reader_waiting.load(Ordering::Relaxed) != 0,
        is_valid: usize::try_from(file_size).is_ok_and(|size| header.validate(size).is_ok()),
    };

    // SAFETY: ptr/HEADER_SIZE come from the mmap above; header is not used past here
    unsafe { libc::munmap(ptr, HEADER_SIZE) };

    Ok(info)
}

fn print_pretty(segments: &[SegmentInfo], args: &Args) {
    if segments.is_empty() {
        println!("{}", "No sigring channels found".yellow());
        return;
    }

    if args.summary {
        print_summary(segments);
        return;
    }

    println!();
    println!("{}", "=== sigring Shared Memory Channels ===".bold());
    println!();

    let mut total_size: u64 = 0;
    let mut total_queued: u64 = 0;
    let mut blocked = 0;

    for seg in segments {
        total_size += seg.file_size;

        let role_badge = match seg.role {
            ChannelRole::App => "APP".green(),
            ChannelRole::Ic => "IC".blue(),
            ChannelRole::Stress => "STRESS".magenta(),
            ChannelRole::Other => "OTHER".yellow(),
        };

        println!(
            "  {} {} ({})",
            role_badge,
            seg.name.cyan(),
            format_size(seg.file_size)
        );

        if let Some(ref ring) = seg.ring {
            let valid_badge = if ring.is_valid {
                "VALID".green()
            } else {
                "INVALID".red()
            };
            let queued = ring.queued();
            let waiting = match (ring.writer_waiting, ring.reader_waiting) {
                (true, true) => "writer+reader",
                (true, false) => "writer",
                (false, true) => "reader",
                (false, false) => "none",
            };
            if ring.writer_waiting || ring.reader_waiting {
                blocked += 1;
            }

            if args.verbose {
                println!(
                    "      [{}] Capacity: {} slots ({} usable)  Element: {} bytes",
                    valid_badge,
                    ring.capacity,
                    ring.capacity.saturating_sub(1),
                    ring.element_size
                );
                println!("      Head: {}  Tail: {}", ring.head, ring.tail);
                if ring.capacity > 1 {
                    let usage_pct = (queued as f64 / (ring.capacity - 1) as f64) * 100.0;
                    println!(
                        "      Queued: {}/{} ({:.1}%)",
                        queued.to_string().yellow(),
                        ring.capacity - 1,
                        usage_pct
                    );
                }
                println!("      Waiting: {}", waiting);
            } else {
                println!(
                    "      [{}] cap={} elem={}B queued={} waiting={}",
                    valid_badge, ring.capacity, ring.element_size, queued, waiting
                );
            }

            total_queued += u64::from(queued);
        }

        if let Some(ref err) = seg.error {
            println!("      {}: {}", "Error".red(), err);
        }

        println!();
    }

    println!("{}", "--- Summary ---".dimmed());
    println!(
        "  Channels: {} ({} with a blocked side)",
        segments.len(),
        blocked
    );
    println!("  Total size: {}", format_size(total_size));
    println!("  Queued elements: {}", total_queued);
    println!();
}

fn print_summary(segments: &[SegmentInfo]) {
    let mut total_size: u64 = 0;
    let mut total_queued: u64 = 0;
    let mut app_count = 0;
    let mut ic_count = 0;
    let mut valid_count = 0;

    for seg in segments {
        total_size += seg.file_size;

        match seg.role {
            ChannelRole::App => app_count += 1,
            ChannelRole::Ic => ic_count += 1,
            ChannelRole::Stress | ChannelRole::Other => {}
        }

        if let Some(ref ring) = seg.ring {
            if ring.is_valid {
                valid_count += 1;
            }
            total_queued += u64::from(ring.queued());
        }
    }

    println!(
        "channels={} app={} ic={} valid={} size={} queued={}",
        segments.len(),
        app_count,
        ic_count,
        valid_count,
        total_size,
        total_queued
    );
}

fn print_json(segments: &[SegmentInfo]) {
    print!("{{\"channels\":[");

    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            print!(",");
        }

        print!(
            "{{\"name\":\"{}\",\"role\":\"{}\",\"size\":{}",
            seg.name,
            seg.role.label(),
            seg.file_size
        );

        if let Some(ref ring) = seg.ring {
            print!(
                ",\"ring\":{{\"capacity\":{},\"element_size\":{},\"head\":{},\"tail\":{},\"queued\":{},\"writer_waiting\":{},\"reader_waiting\":{},\"valid\":{}}}",
                ring.capacity,
                ring.element_size,
                ring.head,
                ring.tail,
                ring.queued(),
                ring.writer_waiting,
                ring.reader_waiting,
                ring.is_valid
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_name() {
        assert_eq!(ChannelRole::from_name("sigring_app3_100"), ChannelRole::App);
        assert_eq!(ChannelRole::from_name("sigring_ic_100"), ChannelRole::Ic);
        assert_eq!(
            ChannelRole::from_name("sigring_stress_7"),
            ChannelRole::Stress
        );
        assert_eq!(ChannelRole::from_name("app_ring"), ChannelRole::Other);
    }

    #[test]
    fn test_matches_kernel() {
        assert!(matches_kernel("sigring_app2_4321", 4321));
        assert!(matches_kernel("sigring_ic_4321", 4321));
        assert!(!matches_kernel("sigring_ic_43210", 4321));
        assert!(!matches_kernel("other_4321", 4321));
    }

    #[test]
    fn test_queued_wraps() {
        let ring = RingInfo {
            capacity: 4,
            element_size: 12,
            head: 3,
            tail: 1,
            writer_waiting: false,
            reader_waiting: false,
            is_valid: true,
        };
        assert_eq!(ring.queued(), 2);
    }

    #[test]
    fn test_inspect_live_channel() {
        let name = format!("/sigring_viewer_test_{}", std::process::id());
        let channel = sigring::Channel::create(&name, 12, 8).unwrap();
        let info = inspect_segment(&name);
        let ring = info.ring.expect("decoded header");
        assert_eq!(ring.capacity, 8);
        assert_eq!(ring.element_size, 12);
        assert_eq!(ring.queued(), 0);
        assert!(ring.is_valid);
        channel.close();
        sigring::Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
