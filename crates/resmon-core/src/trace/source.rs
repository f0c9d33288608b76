//! Trace sources backed by a device-oriented collector.
//!
//! A `DeviceSource` owns everything one trace file needs: the collector, the
//! current device table, the snapshot pair and the buffered writer. Each poll
//! produces either one METRICS record, or, when the device set changed, a
//! DEVICE_LIST for the new table followed by an all-zero METRICS record.

use std::io::{self, Write};
use std::ops::ControlFlow;

use tracing::{debug, info, warn};

use crate::collector::{Cardinality, CollectError, Collector, Field, FieldKind};
use crate::trace::{
    DeviceTable, MessageType, PayloadBuf, RecordWriter, SnapshotBuffer, Timestamp, TraceError,
    TraceSource,
};

/// Appends one device's field values to a METRICS payload.
///
/// Counters wrap on reset instead of being corrected, so a counter that went
/// backwards shows up as a very large delta.
pub fn put_fields(fields: &[Field], previous: &[u64], current: &[u64], payload: &mut PayloadBuf) {
    for ((field, &prev), &cur) in fields.iter().zip(previous).zip(current) {
        match field.kind {
            FieldKind::Counter => payload.put_uvarint(cur.wrapping_sub(prev)),
            FieldKind::Gauge => payload.put_ivarint((cur as i64).wrapping_sub(prev as i64)),
            FieldKind::Sample => payload.put_uvarint(cur),
        }
    }
}

/// Writes a METRICS record covering every device in `snapshot`.
pub(crate) fn write_metrics<W: Write>(
    writer: &mut RecordWriter<W>,
    timestamp: Timestamp,
    fields: &[Field],
    snapshot: &SnapshotBuffer,
) -> io::Result<()> {
    writer.write_record(timestamp, MessageType::Metrics, |payload| {
        payload.put_uvarint(snapshot.len() as u64);
        for (previous, current) in snapshot.pairs() {
            put_fields(fields, previous, current, payload);
        }
    })
}

fn enumerate<C: Collector>(collector: &mut C) -> Result<Vec<String>, CollectError> {
    let mut names = Vec::new();
    collector.read(&mut |name, _| {
        names.push(name.to_owned());
        ControlFlow::Continue(())
    })?;
    Ok(names)
}

pub struct DeviceSource<C: Collector, W: Write> {
    collector: C,
    fields: &'static [Field],
    table: DeviceTable,
    snapshot: SnapshotBuffer,
    writer: RecordWriter<W>,
    reenumerations: u64,
}

impl<C: Collector, W: Write> DeviceSource<C, W> {
    /// Enumerates the collector's devices and announces them.
    ///
    /// An inactive collector gets an empty table and nothing is written,
    /// now or later. An enumeration failure is not fatal: the source starts
    /// with an empty table.
    pub fn new(
        mut collector: C,
        sink: W,
        timestamp: Timestamp,
        buffer_size: usize,
    ) -> Result<Self, TraceError> {
        let family = collector.family();
        let fields = family.fields();
        let active = collector.is_active();

        let table = if active {
            match enumerate(&mut collector) {
                Ok(names) => DeviceTable::new(names),
                Err(err) => {
                    warn!(family = %family, error = %err, "initial enumeration failed");
                    DeviceTable::default()
                }
            }
        } else {
            DeviceTable::default()
        };

        let mut source = Self {
            snapshot: SnapshotBuffer::new(table.len(), fields.len()),
            collector,
            fields,
            table,
            writer: RecordWriter::with_capacity(sink, buffer_size),
            reenumerations: 0,
        };
        if active {
            source.write_device_list(timestamp)?;
            debug!(family = %family, devices = source.table.len(), "source initialized");
        }
        Ok(source)
    }

    fn write_device_list(&mut self, timestamp: Timestamp) -> io::Result<()> {
        let table = &self.table;
        self.writer
            .write_record(timestamp, MessageType::DeviceList, |payload| {
                payload.put_uvarint(table.len() as u64);
                for name in table.names() {
                    payload.put_name(name);
                }
            })
    }

    fn emit_metrics(&mut self, timestamp: Timestamp) -> io::Result<()> {
        write_metrics(&mut self.writer, timestamp, self.fields, &self.snapshot)?;
        self.snapshot.swap();
        Ok(())
    }

    /// Polls a source whose device count was fixed at startup.
    ///
    /// Devices missing from a short read keep their previous values.
    fn poll_fixed(&mut self, timestamp: Timestamp) -> Result<(), TraceError> {
        let devices = self.table.len();
        let snapshot = &mut self.snapshot;
        let mut filled = 0;
        self.collector.read(&mut |_, values| {
            if filled == devices {
                return ControlFlow::Break(());
            }
            for (slot, value) in snapshot.current_mut(filled).iter_mut().zip(values) {
                *slot = *value;
            }
            filled += 1;
            ControlFlow::Continue(())
        })?;

        for device in filled..devices {
            self.snapshot.carry_forward(device);
        }
        self.emit_metrics(timestamp)?;
        Ok(())
    }

    /// Polls a source whose devices may come and go.
    fn poll_variable(&mut self, timestamp: Timestamp) -> Result<(), TraceError> {
        let table = &self.table;
        let snapshot = &mut self.snapshot;
        let mut matched = 0;
        let mut changed = false;
        let result = self.collector.read(&mut |name, values| {
            if !table.matches(matched, name) {
                changed = true;
                return ControlFlow::Break(());
            }
            for (slot, value) in snapshot.current_mut(matched).iter_mut().zip(values) {
                *slot = *value;
            }
            matched += 1;
            ControlFlow::Continue(())
        });

        if let Err(err) = result {
            // An unreadable source reads as no devices.
            warn!(family = %self.collector.family(), error = %err, "read failed");
            matched = 0;
        }

        if changed || matched != self.table.len() {
            return self.reenumerate(timestamp);
        }
        self.emit_metrics(timestamp)?;
        Ok(())
    }

    /// Replaces the device table and restarts deltas from a zero baseline.
    fn reenumerate(&mut self, timestamp: Timestamp) -> Result<(), TraceError> {
        let family = self.collector.family();
        let names = enumerate(&mut self.collector).unwrap_or_else(|err| {
            warn!(family = %family, error = %err, "re-enumeration failed");
            Vec::new()
        });

        let old_devices = self.table.len();
        self.table = DeviceTable::new(names);
        self.snapshot.reset(self.table.len());
        self.reenumerations += 1;
        info!(
            family = %family,
            old_devices,
            new_devices = self.table.len(),
            "device set changed"
        );

        self.write_device_list(timestamp)?;
        // Both buffers are zeroed, so every delta in this record is zero.
        write_metrics(&mut self.writer, timestamp, self.fields, &self.snapshot)?;
        Ok(())
    }

    pub fn table(&self) -> &DeviceTable {
        &self.table
    }

    pub fn snapshot(&self) -> &SnapshotBuffer {
        &self.snapshot
    }

    pub fn writer(&self) -> &RecordWriter<W> {
        &self.writer
    }

    /// Number of device set changes seen since startup.
    pub fn reenumerations(&self) -> u64 {
        self.reenumerations
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<C: Collector, W: Write> TraceSource for DeviceSource<C, W> {
    fn family(&self) -> &'static str {
        self.collector.family().name()
    }

    fn poll(&mut self, timestamp: Timestamp) -> Result<(), TraceError> {
        if !self.collector.is_active() {
            return Ok(());
        }
        match self.collector.cardinality() {
            Cardinality::Fixed => self.poll_fixed(timestamp),
            Cardinality::Variable => self.poll_variable(timestamp),
        }
    }

    fn close(&mut self) -> Result<(), TraceError> {
        self.collector.close();
        self.writer.flush()?;
        debug!(
            family = self.family(),
            records = self.writer.records(),
            bytes = self.writer.bytes(),
            "source closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CpuCollector, DiskCollector, GpuCollector, MockFs, NetDevCollector};
    use crate::trace::writer::DEFAULT_BUFFER_SIZE;
    use crate::trace::{Payload, Record, TraceReader, Value};
    use crate::collector::Family;

    fn decode(bytes: &[u8], family: Family) -> Vec<Record> {
        TraceReader::for_family(bytes, family)
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn records<C: Collector>(source: &mut DeviceSource<C, Vec<u8>>, family: Family) -> Vec<Record> {
        source.flush().unwrap();
        decode(source.writer().get_ref(), family)
    }

    fn device_list(names: &[&str]) -> Payload {
        Payload::DeviceList {
            devices: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn zero_metrics(devices: usize, fields: usize) -> Payload {
        Payload::Metrics {
            devices: vec![vec![Value::Unsigned(0); fields]; devices],
        }
    }

    fn disk_source(fs: &MockFs) -> DeviceSource<DiskCollector<MockFs>, Vec<u8>> {
        DeviceSource::new(
            DiskCollector::new(fs.clone(), "/proc"),
            Vec::new(),
            1,
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap()
    }

    #[test]
    fn test_startup_announces_devices() {
        let fs = MockFs::typical_system();
        let mut source = disk_source(&fs);

        assert_eq!(source.table().len(), 2);
        let records = records(&mut source, Family::Disk);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 1);
        assert_eq!(records[0].payload, device_list(&["sda", "sdb"]));
    }

    #[test]
    fn test_counter_delta() {
        let fs = MockFs::typical_system();
        fs.add_file("/proc/stat", MockFs::proc_stat(2, 100));
        let mut source = DeviceSource::new(
            CpuCollector::new(fs.clone(), "/proc"),
            Vec::new(),
            1,
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap();

        source.poll(2).unwrap();
        fs.add_file("/proc/stat", MockFs::proc_stat(2, 150));
        source.poll(3).unwrap();

        let records = records(&mut source, Family::Cpu);
        assert_eq!(records[0].payload, device_list(&["cpu0", "cpu1"]));
        let Payload::Metrics { devices } = &records[2].payload else {
            panic!("expected metrics");
        };
        assert_eq!(devices.len(), 2);
        // user went from 100 to 150, system from 50 to 75
        assert_eq!(devices[0][0], Value::Unsigned(50));
        assert_eq!(devices[1][2], Value::Unsigned(25));
        // nice stays at 1
        assert_eq!(devices[0][1], Value::Unsigned(0));
    }

    #[test]
    fn test_stable_cycle_emits_metrics_only() {
        let fs = MockFs::typical_system();
        let mut source = disk_source(&fs);

        source.poll(2).unwrap();
        fs.add_file("/proc/diskstats", MockFs::diskstats(&[("sda", 1100), ("sdb", 2000)]));
        source.poll(3).unwrap();

        let records = records(&mut source, Family::Disk);
        let kinds: Vec<MessageType> = records.iter().map(Record::kind).collect();
        assert_eq!(
            kinds,
            vec![MessageType::DeviceList, MessageType::Metrics, MessageType::Metrics]
        );
        assert_eq!(source.reenumerations(), 0);

        let Payload::Metrics { devices } = &records[2].payload else {
            panic!("expected metrics");
        };
        assert_eq!(devices[0][0], Value::Unsigned(100));
        assert_eq!(devices[1], vec![Value::Unsigned(0); 7]);
    }

    #[test]
    fn test_reenumerates_on_added_device() {
        let fs = MockFs::typical_system();
        let mut source = disk_source(&fs);
        source.poll(2).unwrap();

        fs.add_file(
            "/proc/diskstats",
            MockFs::diskstats(&[("sda", 1000), ("sdb", 2000), ("sdc", 3000)]),
        );
        source.poll(3).unwrap();

        assert_eq!(source.reenumerations(), 1);
        assert_eq!(source.snapshot().len(), 3);
        let records = records(&mut source, Family::Disk);
        assert_eq!(records.len(), 4);
        assert_eq!(records[2].timestamp, 3);
        assert_eq!(records[2].payload, device_list(&["sda", "sdb", "sdc"]));
        assert_eq!(records[3].timestamp, 3);
        assert_eq!(records[3].payload, zero_metrics(3, 7));
    }

    #[test]
    fn test_reenumerates_on_rename_at_same_position() {
        let fs = MockFs::typical_system();
        let mut source = disk_source(&fs);

        fs.add_file("/proc/diskstats", MockFs::diskstats(&[("sda", 1000), ("sdc", 2000)]));
        source.poll(2).unwrap();

        assert_eq!(source.reenumerations(), 1);
        let records = records(&mut source, Family::Disk);
        assert_eq!(records[1].payload, device_list(&["sda", "sdc"]));
        assert_eq!(records[2].payload, zero_metrics(2, 7));
    }

    #[test]
    fn test_reordered_devices_reenumerate() {
        let fs = MockFs::typical_system();
        let mut source = DeviceSource::new(
            NetDevCollector::new(fs.clone(), "/proc"),
            Vec::new(),
            1,
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap();

        fs.add_file("/proc/net/dev", MockFs::net_dev(&[("eth0", 5000), ("lo", 100)]));
        source.poll(2).unwrap();

        assert_eq!(source.reenumerations(), 1);
        assert_eq!(
            source.table().names().collect::<Vec<_>>(),
            vec!["eth0", "lo"]
        );
    }

    #[test]
    fn test_baseline_after_reenumeration_is_zero() {
        let fs = MockFs::typical_system();
        let mut source = disk_source(&fs);

        fs.add_file("/proc/diskstats", MockFs::diskstats(&[("sda", 1000)]));
        source.poll(2).unwrap();
        source.poll(3).unwrap();

        let records = records(&mut source, Family::Disk);
        // The poll after a re-enumeration reports absolute values.
        assert_eq!(
            records[3].payload,
            Payload::Metrics {
                devices: vec![
                    [1000, 8000, 500, 250, 2000, 125, 100]
                        .into_iter()
                        .map(Value::Unsigned)
                        .collect()
                ]
            }
        );
    }

    #[test]
    fn test_unreadable_source_empties_table() {
        let fs = MockFs::typical_system();
        let mut source = disk_source(&fs);

        fs.remove_file("/proc/diskstats");
        source.poll(2).unwrap();
        assert!(source.table().is_empty());

        // Still unreadable: an empty read against an empty table is stable.
        source.poll(3).unwrap();
        assert_eq!(source.reenumerations(), 1);

        fs.add_file("/proc/diskstats", MockFs::diskstats(&[("sda", 1000)]));
        source.poll(4).unwrap();
        assert_eq!(source.reenumerations(), 2);

        let records = records(&mut source, Family::Disk);
        let payloads: Vec<&Payload> = records.iter().map(|r| &r.payload).collect();
        assert_eq!(
            payloads,
            vec![
                &device_list(&["sda", "sdb"]),
                &device_list(&[]),
                &zero_metrics(0, 7),
                &zero_metrics(0, 7),
                &device_list(&["sda"]),
                &zero_metrics(1, 7),
            ]
        );
    }

    #[test]
    fn test_fixed_source_carries_missing_cores_forward() {
        let fs = MockFs::typical_system();
        fs.add_file("/proc/stat", MockFs::proc_stat(4, 100));
        let mut source = DeviceSource::new(
            CpuCollector::new(fs.clone(), "/proc"),
            Vec::new(),
            1,
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap();
        source.poll(2).unwrap();

        fs.add_file("/proc/stat", MockFs::proc_stat(2, 200));
        source.poll(3).unwrap();

        assert_eq!(source.table().len(), 4);
        let records = records(&mut source, Family::Cpu);
        assert_eq!(records.len(), 3);
        let Payload::Metrics { devices } = &records[2].payload else {
            panic!("expected metrics");
        };
        assert_eq!(devices.len(), 4);
        assert_eq!(devices[1][0], Value::Unsigned(100));
        assert_eq!(devices[2], vec![Value::Unsigned(0); 10]);
        assert_eq!(devices[3], vec![Value::Unsigned(0); 10]);
    }

    #[test]
    fn test_fixed_source_skips_unreadable_poll() {
        let fs = MockFs::typical_system();
        let mut source = DeviceSource::new(
            CpuCollector::new(fs.clone(), "/proc"),
            Vec::new(),
            1,
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap();

        fs.remove_file("/proc/stat");
        let err = source.poll(2).unwrap_err();
        assert!(matches!(err, TraceError::Collect(CollectError::Io(_))));
        assert_eq!(records(&mut source, Family::Cpu).len(), 1);
    }

    #[test]
    fn test_inactive_collector_writes_nothing() {
        let mut source = DeviceSource::new(
            GpuCollector::inactive(false),
            Vec::new(),
            1,
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap();
        source.poll(2).unwrap();
        source.close().unwrap();

        assert_eq!(source.family(), "nvidia");
        assert!(source.writer().get_ref().is_empty());
    }

    #[test]
    fn test_put_fields_by_kind() {
        let fields = [
            Field::counter("c"),
            Field::gauge("g"),
            Field::sample("s"),
        ];
        let mut payload = PayloadBuf::default();
        put_fields(&fields, &[100, 10, 99], &[150, 5, 42], &mut payload);
        // 50, zigzag(-5) = 11, 42
        assert_eq!(payload.len(), 3);

        let mut wrapped = PayloadBuf::default();
        put_fields(&fields[..1], &[10], &[4], &mut wrapped);
        assert_eq!(wrapped.len(), crate::trace::varint::MAX_LEN_U64);
    }
}
