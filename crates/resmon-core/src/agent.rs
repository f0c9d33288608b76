//! Builds the trace sources an agent polls.

use tracing::info;

use crate::collector::traits::FileSystem;
use crate::collector::{
    CpuCollector, DiskCollector, Family, GpuCollector, MemoryCollector, NetDevCollector,
};
use crate::config::MonitorConfig;
use crate::storage::OutputDir;
use crate::trace::{DeviceSource, MemorySource, Timestamp, TraceError, TraceSource};

/// Creates one source per enabled family, in registration order.
///
/// Every output file is created here, so a sink failure surfaces before
/// polling starts. Each device source writes its initial DEVICE_LIST with
/// `timestamp`.
pub fn build_sources<F>(
    fs: F,
    config: &MonitorConfig,
    timestamp: Timestamp,
) -> Result<Vec<Box<dyn TraceSource>>, TraceError>
where
    F: FileSystem + Clone + 'static,
{
    let out = OutputDir::open(&config.output_dir, &config.host_id)?;
    let proc_path = &config.proc_path;
    let buffer_size = config.buffer_size;

    let mut sources: Vec<Box<dyn TraceSource>> = Vec::new();
    for family in config.families() {
        let sink = out.create(family)?;
        let source: Box<dyn TraceSource> = match family {
            Family::Cpu => Box::new(DeviceSource::new(
                CpuCollector::new(fs.clone(), proc_path),
                sink,
                timestamp,
                buffer_size,
            )?),
            Family::Memory => Box::new(MemorySource::new(
                MemoryCollector::new(fs.clone(), proc_path),
                sink,
                buffer_size,
            )),
            Family::Network => Box::new(DeviceSource::new(
                NetDevCollector::new(fs.clone(), proc_path),
                sink,
                timestamp,
                buffer_size,
            )?),
            Family::Disk => Box::new(DeviceSource::new(
                DiskCollector::new(fs.clone(), proc_path),
                sink,
                timestamp,
                buffer_size,
            )?),
            Family::Gpu => Box::new(DeviceSource::new(
                GpuCollector::new(config.gpu_pcie),
                sink,
                timestamp,
                buffer_size,
            )?),
        };
        info!(family = %family, path = %out.path_for(family).display(), "source registered");
        sources.push(source);
    }
    Ok(sources)
}
