//! System memory from `/proc/meminfo`.

use std::path::{Path, PathBuf};

use crate::collector::procfs::parser::{MemInfo, parse_meminfo};
use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, Family, Field};

/// Memory levels can shrink between polls, so all fields are signed deltas.
pub const MEMORY_FIELDS: &[Field] = &[
    Field::gauge("mem_used"),
    Field::gauge("mem_free"),
    Field::gauge("mem_available"),
    Field::gauge("swap_free"),
];

/// Reads `/proc/meminfo`. Memory is a single device; totals travel in
/// separate TOTALS records.
pub struct MemoryCollector<F: FileSystem> {
    fs: F,
    path: PathBuf,
}

impl<F: FileSystem> MemoryCollector<F> {
    pub fn new(fs: F, proc_path: impl AsRef<Path>) -> Self {
        Self {
            fs,
            path: proc_path.as_ref().join("meminfo"),
        }
    }

    pub fn family(&self) -> Family {
        Family::Memory
    }

    pub fn sample(&mut self) -> Result<MemInfo, CollectError> {
        let content = self.fs.read_to_string(&self.path)?;
        parse_meminfo(&content)
    }
}

/// Field values in `MEMORY_FIELDS` order.
pub fn memory_values(info: &MemInfo) -> [u64; 4] {
    [
        info.mem_used(),
        info.mem_free,
        info.mem_available,
        info.swap_free,
    ]
}
