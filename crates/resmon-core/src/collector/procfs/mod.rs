//! Collectors for the Linux `/proc` filesystem.
//!
//! Each collector reads one file per poll through the `FileSystem` trait and
//! hands its per-device values to the caller in file order.

pub mod diskstats;
pub mod meminfo;
pub mod net_dev;
pub mod parser;
pub mod stat;

use std::ops::ControlFlow;

pub use diskstats::DiskCollector;
pub use meminfo::MemoryCollector;
pub use net_dev::NetDevCollector;
pub use parser::MemInfo;
pub use stat::CpuCollector;

/// Feeds parsed lines to `visit` until a line fails to parse or `visit`
/// breaks.
fn visit_lines<'a, const N: usize>(
    lines: impl Iterator<Item = &'a str>,
    parse: fn(&'a str) -> Option<(&'a str, [u64; N])>,
    visit: &mut dyn FnMut(&str, &[u64]) -> ControlFlow<()>,
) {
    for line in lines {
        let Some((name, values)) = parse(line) else {
            break;
        };
        if visit(name, &values).is_break() {
            break;
        }
    }
}
