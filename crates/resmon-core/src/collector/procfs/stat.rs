//! Per-core CPU time counters from `/proc/stat`.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use crate::collector::procfs::parser::parse_cpu_line;
use crate::collector::procfs::visit_lines;
use crate::collector::traits::FileSystem;
use crate::collector::{Cardinality, CollectError, Collector, Family, Field};

/// Fields per core, in jiffies.
pub const CPU_FIELDS: &[Field] = &[
    Field::counter("user"),
    Field::counter("nice"),
    Field::counter("system"),
    Field::counter("idle"),
    Field::counter("iowait"),
    Field::counter("irq"),
    Field::counter("softirq"),
    Field::counter("steal"),
    Field::counter("guest"),
    Field::counter("guest_nice"),
];

/// Reads per-core lines of `/proc/stat`.
///
/// The core count is fixed at startup: the owning source enumerates once and
/// afterwards only consumes as many lines as it has cores.
pub struct CpuCollector<F: FileSystem> {
    fs: F,
    path: PathBuf,
}

impl<F: FileSystem> CpuCollector<F> {
    pub fn new(fs: F, proc_path: impl AsRef<Path>) -> Self {
        Self {
            fs,
            path: proc_path.as_ref().join("stat"),
        }
    }
}

impl<F: FileSystem> Collector for CpuCollector<F> {
    fn family(&self) -> Family {
        Family::Cpu
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::Fixed
    }

    fn read(
        &mut self,
        visit: &mut dyn FnMut(&str, &[u64]) -> ControlFlow<()>,
    ) -> Result<(), CollectError> {
        let content = self.fs.read_to_string(&self.path)?;
        // The aggregate "cpu" line comes first.
        let lines = content
            .lines()
            .skip_while(|line| line.split_whitespace().next() == Some("cpu"));
        visit_lines(lines, parse_cpu_line, visit);
        Ok(())
    }
}
