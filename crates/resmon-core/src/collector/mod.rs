//! Metric collectors for Linux.
//!
//! Each collector knows how to read one kernel-exposed source and which
//! fields it reports per device. Collectors read through the `FileSystem`
//! trait so they can be exercised against an in-memory `/proc`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DeviceSource<C>                       │
//! │   DeviceTable   SnapshotBuffer   RecordWriter<File>          │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ Collector::read(visit)
//!     ┌───────────────┬───────┴───────┬────────────────┐
//!     │               │               │                │
//! ┌───▼──────┐  ┌─────▼─────┐  ┌──────▼──────┐  ┌──────▼──────┐
//! │ CpuColl. │  │ NetDev    │  │ Diskstats   │  │ Gpu (NVML)  │
//! │ /stat    │  │ /net/dev  │  │ /diskstats  │  │ dlopen      │
//! └───┬──────┘  └─────┬─────┘  └──────┬──────┘  └─────────────┘
//!     └───────────────┼───────────────┘
//!              ┌──────▼──────┐
//!              │ FileSystem  │ (RealFs / MockFs)
//!              └─────────────┘
//! ```
//!
//! Memory has no device list and is driven by `MemorySource` instead.

pub mod gpu;
pub mod mock;
pub mod procfs;
pub mod traits;

use std::ops::ControlFlow;

pub use gpu::GpuCollector;
pub use mock::MockFs;
pub use procfs::{CpuCollector, DiskCollector, MemoryCollector, NetDevCollector};
pub use traits::{FileSystem, RealFs};

/// Error type for collection failures.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("device query failed: {0}")]
    Device(String),
}

/// How a field is turned into a value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Monotonic counter, written as an unsigned delta.
    Counter,
    /// Level that can go down, written as a zigzag-encoded signed delta.
    Gauge,
    /// Instantaneous reading, written as-is.
    Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Counter,
        }
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Gauge,
        }
    }

    pub const fn sample(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Sample,
        }
    }
}

/// Whether the device set of a source may change at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Counted once at startup (CPU cores).
    Fixed,
    /// Names and count are re-checked on every poll.
    Variable,
}

/// Metric families, one trace file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Cpu,
    Memory,
    Network,
    Disk,
    Gpu,
}

impl Family {
    pub const ALL: [Family; 5] = [
        Family::Cpu,
        Family::Memory,
        Family::Network,
        Family::Disk,
        Family::Gpu,
    ];

    /// Output file prefix.
    pub fn name(self) -> &'static str {
        match self {
            Family::Cpu => "proc-stat",
            Family::Memory => "proc-meminfo",
            Family::Network => "proc-net-dev",
            Family::Disk => "proc-diskstats",
            Family::Gpu => "nvidia",
        }
    }

    pub fn fields(self) -> &'static [Field] {
        match self {
            Family::Cpu => procfs::stat::CPU_FIELDS,
            Family::Memory => procfs::meminfo::MEMORY_FIELDS,
            Family::Network => procfs::net_dev::NET_DEV_FIELDS,
            Family::Disk => procfs::diskstats::DISK_FIELDS,
            Family::Gpu => gpu::GPU_FIELDS,
        }
    }

    /// Recognizes a trace file name of the form `<family>-<host>`.
    pub fn from_file_name(file_name: &str) -> Option<Family> {
        Family::ALL.into_iter().find(|family| {
            file_name
                .strip_prefix(family.name())
                .is_some_and(|rest| rest.starts_with('-'))
        })
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A source of per-device readings.
pub trait Collector {
    fn family(&self) -> Family;

    fn cardinality(&self) -> Cardinality;

    /// False when the collector could not start; all polls become no-ops.
    fn is_active(&self) -> bool {
        true
    }

    /// Reads the source once.
    ///
    /// `visit` receives each device's name and raw values in source order,
    /// with exactly `family().fields().len()` values. Reading stops at the
    /// first malformed or short line, or when `visit` breaks.
    fn read(
        &mut self,
        visit: &mut dyn FnMut(&str, &[u64]) -> ControlFlow<()>,
    ) -> Result<(), CollectError>;

    /// Releases resources held by the collector.
    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_file_name() {
        assert_eq!(Family::from_file_name("proc-stat-host1"), Some(Family::Cpu));
        assert_eq!(
            Family::from_file_name("proc-net-dev-my-host"),
            Some(Family::Network)
        );
        assert_eq!(Family::from_file_name("nvidia-gpu01"), Some(Family::Gpu));
        assert_eq!(Family::from_file_name("proc-statx"), None);
        assert_eq!(Family::from_file_name("wal.log"), None);
    }

    #[test]
    fn test_field_counts() {
        assert_eq!(Family::Cpu.fields().len(), 10);
        assert_eq!(Family::Memory.fields().len(), 4);
        assert_eq!(Family::Network.fields().len(), 4);
        assert_eq!(Family::Disk.fields().len(), 7);
        assert_eq!(Family::Gpu.fields().len(), 4);
        assert!(
            Family::Memory
                .fields()
                .iter()
                .all(|f| f.kind == FieldKind::Gauge)
        );
    }
}
