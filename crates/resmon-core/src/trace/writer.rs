//! Buffered record output.
//!
//! Each source owns one `RecordWriter`. A record is assembled in a scratch
//! buffer first and then appended to the write buffer as a whole. If it does
//! not fit in the space left, the write buffer is flushed to the sink before
//! appending, so a flush boundary never falls inside a record.

use std::io::{self, Write};

use crate::trace::varint;
use crate::trace::{MessageType, RECORD_HEADER_LEN, Timestamp};

/// Default write buffer size per source.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 4096;

/// Payload under construction.
#[derive(Debug, Default)]
pub struct PayloadBuf {
    bytes: Vec<u8>,
}

impl PayloadBuf {
    pub fn put_uvarint(&mut self, value: u64) {
        varint::encode_u64(value, &mut self.bytes);
    }

    pub fn put_ivarint(&mut self, value: i64) {
        varint::encode_i64(value, &mut self.bytes);
    }

    pub fn put_u64_le(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a NUL-terminated name.
    pub fn put_name(&mut self, name: &str) {
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub struct RecordWriter<W: Write> {
    sink: W,
    buffer: Vec<u8>,
    capacity: usize,
    scratch: PayloadBuf,
    records: u64,
    bytes: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        Self::with_capacity(sink, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(sink: W, capacity: usize) -> Self {
        let capacity = capacity.max(RECORD_HEADER_LEN);
        Self {
            sink,
            buffer: Vec::with_capacity(capacity),
            capacity,
            scratch: PayloadBuf::default(),
            records: 0,
            bytes: 0,
        }
    }

    /// Builds one record with `fill` and queues it for output.
    pub fn write_record<F>(&mut self, timestamp: Timestamp, kind: MessageType, fill: F) -> io::Result<()>
    where
        F: FnOnce(&mut PayloadBuf),
    {
        self.scratch.bytes.clear();
        self.scratch.bytes.extend_from_slice(&timestamp.to_le_bytes());
        self.scratch.bytes.push(kind as u8);
        fill(&mut self.scratch);
        self.commit()
    }

    fn commit(&mut self) -> io::Result<()> {
        let len = self.scratch.bytes.len();
        if self.buffer.len() + len > self.capacity {
            self.drain()?;
        }
        if len > self.capacity {
            // Larger than the whole buffer: hand it to the sink in one piece.
            self.sink.write_all(&self.scratch.bytes)?;
        } else {
            self.buffer.extend_from_slice(&self.scratch.bytes);
        }
        self.records += 1;
        self.bytes += len as u64;
        Ok(())
    }

    fn drain(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            self.sink.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Writes out everything buffered and flushes the sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.sink.flush()
    }

    /// Bytes waiting in the write buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Records written since creation.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Record bytes written since creation.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }
}
