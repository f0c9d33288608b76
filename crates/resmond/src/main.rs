//! resmond - fine-grained resource monitoring daemon.
//!
//! Samples CPU, memory, network, disk and GPU counters at a fixed period and
//! appends them to one binary trace file per metric family.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use resmon_core::agent::build_sources;
use resmon_core::collector::{FileSystem, RealFs};
use resmon_core::config::MonitorConfig;
use resmon_core::scheduler::{Scheduler, now_nanos};

/// Resource monitoring daemon writing fine-grained binary traces.
#[derive(Parser, Debug)]
#[command(name = "resmond", about = "Fine-grained resource monitoring daemon", version)]
struct Args {
    /// Output directory to store resource traces in. Must exist.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Interval between consecutive measurements, in milliseconds.
    #[arg(short = 'i', long, default_value = "100", value_parser = parse_interval)]
    monitor_interval: u64,

    /// File to write the daemon's PID to. Must not exist yet.
    #[arg(short, long, default_value = "/tmp/resource-monitor.pid")]
    pid_file: PathBuf,

    /// Host identifier used in trace file names. Defaults to the hostname.
    #[arg(long)]
    host_id: Option<String>,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// Disable monitoring of CPU resources.
    #[arg(long)]
    no_cpu: bool,

    /// Disable monitoring of memory resources.
    #[arg(long)]
    no_memory: bool,

    /// Disable monitoring of network resources.
    #[arg(long)]
    no_network: bool,

    /// Disable monitoring of disk resources.
    #[arg(long)]
    no_disk: bool,

    /// Disable monitoring of GPU resources.
    #[arg(long)]
    no_gpu: bool,

    /// Also sample GPU PCIe throughput. Each query takes about 20 ms per device.
    #[arg(long)]
    gpu_pcie: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn to_config(&self, host_id: String) -> MonitorConfig {
        MonitorConfig {
            output_dir: self.output_dir.clone(),
            host_id,
            period: Duration::from_millis(self.monitor_interval),
            proc_path: self.proc_path.clone(),
            cpu: !self.no_cpu,
            memory: !self.no_memory,
            network: !self.no_network,
            disk: !self.no_disk,
            gpu: !self.no_gpu,
            gpu_pcie: self.gpu_pcie,
            ..MonitorConfig::default()
        }
    }
}

fn parse_interval(s: &str) -> Result<u64, String> {
    match s.trim().parse::<u64>() {
        Ok(0) => Err("monitoring interval must be a positive integer".to_string()),
        Ok(ms) => Ok(ms),
        Err(e) => Err(format!("invalid interval '{}': {}", s, e)),
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["resmond", "resmon_core"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Picks the host identifier: explicit flag, then system hostname, then the
/// kernel's hostname file.
fn resolve_host_id(
    explicit: Option<&str>,
    system: Option<String>,
    fs: &impl FileSystem,
    proc_path: &Path,
) -> String {
    if let Some(id) = explicit.filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    if let Some(name) = system.filter(|name| !name.is_empty()) {
        return name;
    }
    fs.read_to_string(&proc_path.join("sys/kernel/hostname"))
        .ok()
        .map(|content| content.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// PID file that exists exactly as long as the daemon runs.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Fails if the file already exists, which usually means another
    /// instance is running.
    fn create(path: &Path) -> io::Result<Self> {
        let mut file: File = OpenOptions::new().write(true).create_new(true).open(path)?;
        write!(file, "{}", std::process::id())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove PID file");
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let system_hostname = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok());
    let host_id = resolve_host_id(
        args.host_id.as_deref(),
        system_hostname,
        &RealFs,
        &args.proc_path,
    );
    let config = args.to_config(host_id);
    debug!(?config, "configuration");

    let _pid_file = PidFile::create(&args.pid_file)
        .map_err(|e| format!("failed to create PID file {}: {}", args.pid_file.display(), e))?;

    let sources = build_sources(RealFs, &config, now_nanos())?;
    info!(
        host_id = %config.host_id,
        output_dir = %config.output_dir.display(),
        sources = sources.len(),
        started_at = %Utc::now().to_rfc3339(),
        "resmond started"
    );

    let mut scheduler = Scheduler::new(sources, config.period);
    let stop = scheduler.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        stop.stop();
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let ticks = scheduler.run();
    info!(ticks, "Shutdown complete");
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
