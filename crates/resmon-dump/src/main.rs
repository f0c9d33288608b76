use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;

use resmon_core::collector::Family;
use resmon_core::trace::{Payload, Record, Timestamp, TraceReader, Value};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "resmon-dump", about = "Inspect resmon trace files")]
struct Cli {
    /// Trace file (`<family>-<host>`) or output directory
    path: Option<PathBuf>,

    /// Family to decode with when the file name does not tell
    /// (proc-stat, proc-meminfo, proc-net-dev, proc-diskstats, nvidia)
    #[arg(long)]
    family: Option<String>,

    /// Only print per-file summaries
    #[arg(long)]
    summary: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let path = cli.path.clone().unwrap_or_else(|| PathBuf::from("."));

    let result = if path.is_dir() {
        dump_directory(&path, &cli)
    } else {
        dump_path(&path, &cli)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn family_for(path: &Path, explicit: Option<&str>) -> Result<Family, String> {
    if let Some(name) = explicit {
        return Family::ALL
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| format!("Unknown family: {name}"));
    }
    path.file_name()
        .and_then(|f| f.to_str())
        .and_then(Family::from_file_name)
        .ok_or_else(|| format!("Unknown file type: {} (use --family)", path.display()))
}

// ── Formatting helpers ───────────────────────────────────────────────────────

fn human_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn fmt_ts(ts: Timestamp) -> String {
    let secs = ts.div_euclid(1_000_000_000);
    let nanos = ts.rem_euclid(1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn fmt_value(value: &Value) -> String {
    match value {
        Value::Unsigned(v) => v.to_string(),
        Value::Signed(v) => format!("{v:+}"),
    }
}

// ── Decoding ─────────────────────────────────────────────────────────────────

struct Decoded {
    records: Vec<Record>,
    /// Set when decoding stopped early.
    error: Option<String>,
    /// Bytes consumed by complete records.
    valid_bytes: usize,
}

fn decode(data: &[u8], family: Family) -> Decoded {
    let mut reader = TraceReader::for_family(data, family);
    let mut records = Vec::new();
    let mut error = None;
    let mut valid_bytes = 0;
    while let Some(item) = reader.next() {
        match item {
            Ok(record) => {
                records.push(record);
                valid_bytes = reader.position();
            }
            Err(e) => error = Some(format!("{e} at byte {valid_bytes}")),
        }
    }
    Decoded {
        records,
        error,
        valid_bytes,
    }
}

#[derive(Debug, Default, PartialEq, Serialize)]
struct Summary {
    device_lists: usize,
    metrics: usize,
    totals: usize,
    first_ts: Option<Timestamp>,
    last_ts: Option<Timestamp>,
    /// Devices in the last announced list.
    devices: Vec<String>,
}

fn summarize(records: &[Record]) -> Summary {
    let mut summary = Summary {
        first_ts: records.first().map(|r| r.timestamp),
        last_ts: records.last().map(|r| r.timestamp),
        ..Summary::default()
    };
    for record in records {
        match &record.payload {
            Payload::DeviceList { devices } => {
                summary.device_lists += 1;
                summary.devices.clone_from(devices);
            }
            Payload::Metrics { .. } => summary.metrics += 1,
            Payload::Totals { .. } => summary.totals += 1,
        }
    }
    summary
}

// ── Output ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FileJson<'a> {
    path: String,
    family: &'static str,
    size: u64,
    summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<&'a [Record]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn dump_path(path: &Path, cli: &Cli) -> Result<(), String> {
    let family = family_for(path, cli.family.as_deref())?;
    let data = fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let decoded = decode(&data, family);

    if cli.json {
        let json = FileJson {
            path: path.display().to_string(),
            family: family.name(),
            size: data.len() as u64,
            summary: summarize(&decoded.records),
            records: (!cli.summary).then_some(decoded.records.as_slice()),
            error: decoded.error.as_deref(),
        };
        let text = serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }

    print_summary(path, family, data.len() as u64, &decoded);
    if !cli.summary {
        print_records(family, &decoded.records);
    }
    Ok(())
}

fn print_summary(path: &Path, family: Family, size: u64, decoded: &Decoded) {
    let summary = summarize(&decoded.records);
    println!("{} ({}, {})", path.display(), family, human_bytes(size));
    println!(
        "  records: {} device lists, {} metrics, {} totals",
        summary.device_lists, summary.metrics, summary.totals
    );
    if let (Some(first), Some(last)) = (summary.first_ts, summary.last_ts) {
        println!("  span:    {} .. {}", fmt_ts(first), fmt_ts(last));
    }
    if !summary.devices.is_empty() {
        println!("  devices: {}", summary.devices.join(", "));
    }
    if let Some(error) = &decoded.error {
        let trailing = size.saturating_sub(decoded.valid_bytes as u64);
        println!("  error:   {error} ({trailing} trailing bytes)");
    }
}

fn print_records(family: Family, records: &[Record]) {
    let fields = family.fields();
    let mut names: Vec<String> = Vec::new();

    for record in records {
        let ts = fmt_ts(record.timestamp);
        match &record.payload {
            Payload::DeviceList { devices } => {
                println!("{ts} DEVICE_LIST [{}] {}", devices.len(), devices.join(" "));
                names.clone_from(devices);
            }
            Payload::Totals {
                mem_total,
                swap_total,
            } => {
                println!("{ts} TOTALS mem_total={mem_total} swap_total={swap_total}");
            }
            Payload::Metrics { devices } => {
                println!("{ts} METRICS [{}]", devices.len());
                for (i, values) in devices.iter().enumerate() {
                    let name = names.get(i).map(String::as_str).unwrap_or(family.name());
                    let line: Vec<String> = fields
                        .iter()
                        .zip(values)
                        .map(|(field, value)| format!("{}={}", field.name, fmt_value(value)))
                        .collect();
                    println!("  {name}: {}", line.join(" "));
                }
            }
        }
    }
}

fn dump_directory(path: &Path, cli: &Cli) -> Result<(), String> {
    let entries =
        fs::read_dir(path).map_err(|e| format!("Error reading directory {}: {e}", path.display()))?;

    let mut trace_files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|f| f.to_str())
                    .and_then(Family::from_file_name)
                    .is_some()
        })
        .collect();
    trace_files.sort();

    if trace_files.is_empty() {
        return Err(format!("No trace files in {}", path.display()));
    }
    for file in &trace_files {
        dump_path(file, cli)?;
    }
    Ok(())
}
