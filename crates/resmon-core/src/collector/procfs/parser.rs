//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions over file content, designed to be easily
//! testable with string inputs. Line parsers return `None` for a malformed
//! or short line; callers treat that as the end of the data.

use crate::collector::CollectError;

/// Parses one per-core line of `/proc/stat`.
///
/// Format: `cpuN user nice system idle iowait irq softirq steal guest guest_nice`.
/// The aggregate `cpu` line (no core number) is rejected.
pub fn parse_cpu_line(line: &str) -> Option<(&str, [u64; 10])> {
    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    let core = name.strip_prefix("cpu")?;
    if core.is_empty() || !core.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut values = [0u64; 10];
    for value in &mut values {
        *value = parts.next()?.parse().ok()?;
    }
    Some((name, values))
}

/// Parses one line of `/proc/diskstats` into
/// `[reads, read_sectors, read_ms, writes, write_sectors, write_ms, io_ms]`.
///
/// Format: major minor name reads r_merged r_sectors r_time writes w_merged
/// w_sectors w_time io_pending io_time w_io_time [discard and flush fields]
pub fn parse_diskstats_line(line: &str) -> Option<(&str, [u64; 7])> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 14 {
        return None;
    }

    let get = |idx: usize| -> Option<u64> { parts[idx].parse().ok() };
    Some((
        parts[2],
        [
            get(3)?,
            get(5)?,
            get(6)?,
            get(7)?,
            get(9)?,
            get(10)?,
            get(12)?,
        ],
    ))
}

/// Parses one interface line of `/proc/net/dev` into
/// `[rx_bytes, rx_packets, tx_bytes, tx_packets]`.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
pub fn parse_net_dev_line(line: &str) -> Option<(&str, [u64; 4])> {
    let (name, rest) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let values: Vec<&str> = rest.split_whitespace().collect();
    if values.len() < 16 {
        return None;
    }

    let get = |idx: usize| -> Option<u64> { values[idx].parse().ok() };
    Some((name, [get(0)?, get(1)?, get(8)?, get(9)?]))
}

/// Parsed data from `/proc/meminfo`, in kB as reported by the kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub s_reclaimable: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

impl MemInfo {
    /// Memory in use: total minus free minus buffers, page cache and
    /// reclaimable slab.
    pub fn mem_used(&self) -> u64 {
        self.mem_total
            .saturating_sub(self.mem_free)
            .saturating_sub(self.buffers + self.cached + self.s_reclaimable)
    }
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, CollectError> {
    let mut info = MemInfo::default();
    let mut seen_total = false;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };

        match key {
            "MemTotal:" => {
                info.mem_total = value;
                seen_total = true;
            }
            "MemFree:" => info.mem_free = value,
            "MemAvailable:" => info.mem_available = value,
            "Buffers:" => info.buffers = value,
            "Cached:" => info.cached = value,
            "SReclaimable:" => info.s_reclaimable = value,
            "SwapTotal:" => info.swap_total = value,
            "SwapFree:" => info.swap_free = value,
            _ => {}
        }
    }

    if !seen_total {
        return Err(CollectError::Parse("missing MemTotal in meminfo".to_string()));
    }
    Ok(info)
}
