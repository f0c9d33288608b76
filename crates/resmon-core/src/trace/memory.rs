//! The memory trace source.
//!
//! Memory is one implicit device, so there is no DEVICE_LIST. Instead a
//! TOTALS record announces `mem_total` and `swap_total` whenever they differ
//! from the last announced pair.

use std::io::{self, Write};

use tracing::debug;

use crate::collector::procfs::meminfo::{MEMORY_FIELDS, memory_values};
use crate::collector::traits::FileSystem;
use crate::collector::{Family, MemoryCollector};
use crate::trace::source::write_metrics;
use crate::trace::{MessageType, RecordWriter, SnapshotBuffer, Timestamp, TraceError, TraceSource};

pub struct MemorySource<F: FileSystem, W: Write> {
    collector: MemoryCollector<F>,
    snapshot: SnapshotBuffer,
    writer: RecordWriter<W>,
    last_totals: Option<(u64, u64)>,
}

impl<F: FileSystem, W: Write> MemorySource<F, W> {
    pub fn new(collector: MemoryCollector<F>, sink: W, buffer_size: usize) -> Self {
        Self {
            collector,
            snapshot: SnapshotBuffer::new(1, MEMORY_FIELDS.len()),
            writer: RecordWriter::with_capacity(sink, buffer_size),
            last_totals: None,
        }
    }

    pub fn writer(&self) -> &RecordWriter<W> {
        &self.writer
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<F: FileSystem, W: Write> TraceSource for MemorySource<F, W> {
    fn family(&self) -> &'static str {
        Family::Memory.name()
    }

    fn poll(&mut self, timestamp: Timestamp) -> Result<(), TraceError> {
        let info = self.collector.sample()?;

        let totals = (info.mem_total, info.swap_total);
        if self.last_totals != Some(totals) {
            debug!(mem_total = totals.0, swap_total = totals.1, "memory totals changed");
            self.writer.write_record(timestamp, MessageType::Totals, |payload| {
                payload.put_u64_le(totals.0);
                payload.put_u64_le(totals.1);
            })?;
            self.last_totals = Some(totals);
        }

        self.snapshot
            .current_mut(0)
            .copy_from_slice(&memory_values(&info));
        write_metrics(&mut self.writer, timestamp, MEMORY_FIELDS, &self.snapshot)?;
        self.snapshot.swap();
        Ok(())
    }

    fn close(&mut self) -> Result<(), TraceError> {
        self.writer.flush()?;
        Ok(())
    }
}
