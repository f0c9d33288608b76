//! Block device counters from `/proc/diskstats`.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use crate::collector::procfs::parser::parse_diskstats_line;
use crate::collector::procfs::visit_lines;
use crate::collector::traits::FileSystem;
use crate::collector::{Cardinality, CollectError, Collector, Family, Field};

pub const DISK_FIELDS: &[Field] = &[
    Field::counter("read_completed"),
    Field::counter("read_sectors"),
    Field::counter("read_time_ms"),
    Field::counter("write_completed"),
    Field::counter("write_sectors"),
    Field::counter("write_time_ms"),
    Field::counter("io_time_ms"),
];

/// Reads every block device listed in `/proc/diskstats`, partitions included.
pub struct DiskCollector<F: FileSystem> {
    fs: F,
    path: PathBuf,
}

impl<F: FileSystem> DiskCollector<F> {
    pub fn new(fs: F, proc_path: impl AsRef<Path>) -> Self {
        Self {
            fs,
            path: proc_path.as_ref().join("diskstats"),
        }
    }
}

impl<F: FileSystem> Collector for DiskCollector<F> {
    fn family(&self) -> Family {
        Family::Disk
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::Variable
    }

    fn read(
        &mut self,
        visit: &mut dyn FnMut(&str, &[u64]) -> ControlFlow<()>,
    ) -> Result<(), CollectError> {
        let content = self.fs.read_to_string(&self.path)?;
        visit_lines(content.lines(), parse_diskstats_line, visit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    #[test]
    fn test_reads_disks_in_file_order() {
        let fs = MockFs::typical_system();
        let mut collector = DiskCollector::new(fs, "/proc");

        let mut disks = Vec::new();
        collector
            .read(&mut |name, values| {
                disks.push((name.to_string(), values.to_vec()));
                ControlFlow::Continue(())
            })
            .unwrap();

        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].0, "sda");
        assert_eq!(disks[0].1, vec![1000, 8000, 500, 250, 2000, 125, 100]);
        assert_eq!(disks[1].0, "sdb");
    }
}
