//! Decoding of trace streams.
//!
//! A stream can only be decoded with the field layout of the family that
//! wrote it, since METRICS records carry no field count.

use serde::Serialize;

use crate::collector::{Family, Field, FieldKind};
use crate::trace::{DecodeError, MessageType, RECORD_HEADER_LEN, Timestamp, varint};

/// One decoded field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    DeviceList { devices: Vec<String> },
    Metrics { devices: Vec<Vec<Value>> },
    Totals { mem_total: u64, swap_total: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Record {
    pub fn kind(&self) -> MessageType {
        match self.payload {
            Payload::DeviceList { .. } => MessageType::DeviceList,
            Payload::Metrics { .. } => MessageType::Metrics,
            Payload::Totals { .. } => MessageType::Totals,
        }
    }
}

/// Iterates the records of one trace stream.
///
/// Decoding stops after the first error; a truncated tail (for example a
/// file copied while the agent was writing) yields `DecodeError::Truncated`.
pub struct TraceReader<'a> {
    data: &'a [u8],
    pos: usize,
    fields: &'static [Field],
    announced: Option<usize>,
    failed: bool,
}

impl<'a> TraceReader<'a> {
    pub fn new(data: &'a [u8], fields: &'static [Field]) -> Self {
        Self {
            data,
            pos: 0,
            fields,
            announced: None,
            failed: false,
        }
    }

    pub fn for_family(data: &'a [u8], family: Family) -> Self {
        Self::new(data, family.fields())
    }

    /// Byte offset of the next record.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated)?;
        let bytes = self.data.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn uvarint(&mut self) -> Result<u64, DecodeError> {
        let (value, len) = varint::decode_u64(&self.data[self.pos..])?;
        self.pos += len;
        Ok(value)
    }

    fn ivarint(&mut self) -> Result<i64, DecodeError> {
        let (value, len) = varint::decode_i64(&self.data[self.pos..])?;
        self.pos += len;
        Ok(value)
    }

    fn u64_le(&mut self) -> Result<u64, DecodeError> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    fn name(&mut self) -> Result<String, DecodeError> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::Truncated)?;
        let name = std::str::from_utf8(&rest[..end]).map_err(|_| DecodeError::InvalidName)?;
        self.pos += end + 1;
        Ok(name.to_owned())
    }

    fn count(&mut self) -> Result<usize, DecodeError> {
        usize::try_from(self.uvarint()?).map_err(|_| DecodeError::VarintOverflow)
    }

    fn decode_record(&mut self) -> Result<Record, DecodeError> {
        let header = self.take(RECORD_HEADER_LEN)?;
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&header[..8]);
        let timestamp = Timestamp::from_le_bytes(ts);
        let kind = MessageType::from_u8(header[8]).ok_or(DecodeError::UnknownMessageType(header[8]))?;

        let payload = match kind {
            MessageType::DeviceList => {
                let count = self.count()?;
                let mut devices = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    devices.push(self.name()?);
                }
                self.announced = Some(count);
                Payload::DeviceList { devices }
            }
            MessageType::Metrics => {
                let count = self.count()?;
                if let Some(expected) = self.announced
                    && expected != count
                {
                    return Err(DecodeError::DeviceCountMismatch {
                        expected,
                        got: count,
                    });
                }
                let mut devices = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let mut values = Vec::with_capacity(self.fields.len());
                    for field in self.fields {
                        values.push(match field.kind {
                            FieldKind::Counter | FieldKind::Sample => Value::Unsigned(self.uvarint()?),
                            FieldKind::Gauge => Value::Signed(self.ivarint()?),
                        });
                    }
                    devices.push(values);
                }
                Payload::Metrics { devices }
            }
            MessageType::Totals => Payload::Totals {
                mem_total: self.u64_le()?,
                swap_total: self.u64_le()?,
            },
        };
        Ok(Record { timestamp, payload })
    }
}

impl Iterator for TraceReader<'_> {
    type Item = Result<Record, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let result = self.decode_record();
        self.failed = result.is_err();
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::RecordWriter;

    fn disk_stream() -> Vec<u8> {
        let mut writer = RecordWriter::new(Vec::new());
        writer
            .write_record(10, MessageType::DeviceList, |p| {
                p.put_uvarint(1);
                p.put_name("sda");
            })
            .unwrap();
        writer
            .write_record(20, MessageType::Metrics, |p| {
                p.put_uvarint(1);
                for v in [1, 2, 3, 4, 5, 6, 300] {
                    p.put_uvarint(v);
                }
            })
            .unwrap();
        writer.flush().unwrap();
        writer.get_ref().clone()
    }

    #[test]
    fn test_decode_device_list_and_metrics() {
        let data = disk_stream();
        let records: Vec<Record> = TraceReader::for_family(&data, Family::Disk)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            Record {
                timestamp: 10,
                payload: Payload::DeviceList {
                    devices: vec!["sda".to_string()]
                },
            }
        );
        assert_eq!(records[1].timestamp, 20);
        assert_eq!(records[1].kind(), MessageType::Metrics);
        let Payload::Metrics { devices } = &records[1].payload else {
            panic!("expected metrics");
        };
        assert_eq!(devices[0][6], Value::Unsigned(300));
    }

    #[test]
    fn test_decode_memory_gauges_and_totals() {
        let mut writer = RecordWriter::new(Vec::new());
        writer
            .write_record(1, MessageType::Totals, |p| {
                p.put_u64_le(16384000);
                p.put_u64_le(0);
            })
            .unwrap();
        writer
            .write_record(1, MessageType::Metrics, |p| {
                p.put_uvarint(1);
                for v in [-5, 0, 7, -1] {
                    p.put_ivarint(v);
                }
            })
            .unwrap();
        writer.flush().unwrap();

        let records: Vec<Record> = TraceReader::for_family(writer.get_ref(), Family::Memory)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            records[0].payload,
            Payload::Totals {
                mem_total: 16384000,
                swap_total: 0
            }
        );
        assert_eq!(
            records[1].payload,
            Payload::Metrics {
                devices: vec![vec![
                    Value::Signed(-5),
                    Value::Signed(0),
                    Value::Signed(7),
                    Value::Signed(-1)
                ]]
            }
        );
    }

    #[test]
    fn test_truncated_tail_stops_iteration() {
        let mut data = disk_stream();
        data.truncate(data.len() - 1);
        let mut reader = TraceReader::for_family(&data, Family::Disk);
        assert!(reader.next().unwrap().is_ok());
        assert_eq!(reader.next().unwrap(), Err(DecodeError::Truncated));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_unknown_message_type() {
        let mut data = vec![0u8; 8];
        data.push(7);
        let mut reader = TraceReader::for_family(&data, Family::Cpu);
        assert_eq!(reader.next().unwrap(), Err(DecodeError::UnknownMessageType(7)));
    }

    #[test]
    fn test_metrics_count_must_match_announcement() {
        let mut writer = RecordWriter::new(Vec::new());
        writer
            .write_record(1, MessageType::DeviceList, |p| {
                p.put_uvarint(1);
                p.put_name("eth0");
            })
            .unwrap();
        writer
            .write_record(2, MessageType::Metrics, |p| {
                p.put_uvarint(2);
                for _ in 0..8 {
                    p.put_uvarint(0);
                }
            })
            .unwrap();
        writer.flush().unwrap();

        let mut reader = TraceReader::for_family(writer.get_ref(), Family::Network);
        assert!(reader.next().unwrap().is_ok());
        assert_eq!(
            reader.next().unwrap(),
            Err(DecodeError::DeviceCountMismatch {
                expected: 1,
                got: 2
            })
        );
    }
}
