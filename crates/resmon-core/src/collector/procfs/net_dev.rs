//! Network interface counters from `/proc/net/dev`.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use crate::collector::procfs::parser::parse_net_dev_line;
use crate::collector::procfs::visit_lines;
use crate::collector::traits::FileSystem;
use crate::collector::{Cardinality, CollectError, Collector, Family, Field};

pub const NET_DEV_FIELDS: &[Field] = &[
    Field::counter("recv_bytes"),
    Field::counter("recv_packets"),
    Field::counter("send_bytes"),
    Field::counter("send_packets"),
];

/// Number of header lines at the top of `/proc/net/dev`.
const HEADER_LINES: usize = 2;

pub struct NetDevCollector<F: FileSystem> {
    fs: F,
    path: PathBuf,
}

impl<F: FileSystem> NetDevCollector<F> {
    pub fn new(fs: F, proc_path: impl AsRef<Path>) -> Self {
        Self {
            fs,
            path: proc_path.as_ref().join("net/dev"),
        }
    }
}

impl<F: FileSystem> Collector for NetDevCollector<F> {
    fn family(&self) -> Family {
        Family::Network
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::Variable
    }

    fn read(
        &mut self,
        visit: &mut dyn FnMut(&str, &[u64]) -> ControlFlow<()>,
    ) -> Result<(), CollectError> {
        let content = self.fs.read_to_string(&self.path)?;
        visit_lines(content.lines().skip(HEADER_LINES), parse_net_dev_line, visit);
        Ok(())
    }
}
