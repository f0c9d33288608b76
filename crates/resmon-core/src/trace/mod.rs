//! Trace file format and the sources that produce it.
//!
//! Every source writes an append-only stream of records:
//!
//! ```text
//! record      := timestamp (i64 LE, ns since epoch) | type (u8) | payload
//! DEVICE_LIST := varint(count) | count × (name bytes | 0x00)
//! METRICS     := varint(count) | count × (field list, varint or zigzag varint)
//! TOTALS      := mem_total (u64 LE) | swap_total (u64 LE)
//! ```
//!
//! A METRICS record always carries the device count most recently announced
//! through DEVICE_LIST. When the device set changes, the DEVICE_LIST and the
//! METRICS record that follows it are written within the same poll.

pub mod device;
pub mod memory;
pub mod reader;
pub mod snapshot;
pub mod source;
pub mod varint;
pub mod writer;

use crate::collector::CollectError;

pub use device::{Device, DeviceTable};
pub use memory::MemorySource;
pub use reader::{Payload, Record, TraceReader, Value};
pub use snapshot::SnapshotBuffer;
pub use source::DeviceSource;
pub use writer::{PayloadBuf, RecordWriter};

/// Nanoseconds since the Unix epoch.
pub type Timestamp = i64;

/// Size of the fixed record header: timestamp plus message type.
pub const RECORD_HEADER_LEN: usize = 9;

/// Kind of record in a trace stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    DeviceList = 0,
    Metrics = 1,
    Totals = 2,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::DeviceList),
            1 => Some(Self::Metrics),
            2 => Some(Self::Totals),
            _ => None,
        }
    }
}

/// Errors raised while producing trace records.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("collect error: {0}")]
    Collect(#[from] CollectError),

    #[error("cannot open output {path}: {source}")]
    SinkOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while decoding a trace stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of data")]
    Truncated,

    #[error("varint does not fit the target integer")]
    VarintOverflow,

    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("device name is not valid UTF-8")]
    InvalidName,

    #[error("metrics record for {got} devices, {expected} announced")]
    DeviceCountMismatch { expected: usize, got: usize },
}

/// A unit the scheduler drives: one metric family writing one trace file.
pub trait TraceSource {
    /// Name of the metric family, also the output file prefix.
    fn family(&self) -> &'static str;

    /// Samples the underlying source once and appends the resulting records.
    fn poll(&mut self, timestamp: Timestamp) -> Result<(), TraceError>;

    /// Flushes buffered records and releases the source.
    fn close(&mut self) -> Result<(), TraceError>;
}

impl<T: TraceSource + ?Sized> TraceSource for Box<T> {
    fn family(&self) -> &'static str {
        (**self).family()
    }

    fn poll(&mut self, timestamp: Timestamp) -> Result<(), TraceError> {
        (**self).poll(timestamp)
    }

    fn close(&mut self) -> Result<(), TraceError> {
        (**self).close()
    }
}
