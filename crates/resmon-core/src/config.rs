//! Agent configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::collector::Family;
use crate::trace::writer::DEFAULT_BUFFER_SIZE;

/// Default poll period.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Directory receiving `<family>-<host_id>` files. Must already exist.
    pub output_dir: PathBuf,
    pub host_id: String,
    pub period: Duration,
    /// Root of the proc filesystem, `/proc` outside of tests.
    pub proc_path: PathBuf,
    pub cpu: bool,
    pub memory: bool,
    pub network: bool,
    pub disk: bool,
    pub gpu: bool,
    /// PCIe throughput queries are slow, so they are off unless asked for.
    pub gpu_pcie: bool,
    pub buffer_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            host_id: "unknown".to_string(),
            period: DEFAULT_PERIOD,
            proc_path: PathBuf::from("/proc"),
            cpu: true,
            memory: true,
            network: true,
            disk: true,
            gpu: true,
            gpu_pcie: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl MonitorConfig {
    pub fn is_enabled(&self, family: Family) -> bool {
        match family {
            Family::Cpu => self.cpu,
            Family::Memory => self.memory,
            Family::Network => self.network,
            Family::Disk => self.disk,
            Family::Gpu => self.gpu,
        }
    }

    /// Enabled families in registration order.
    pub fn families(&self) -> impl Iterator<Item = Family> + '_ {
        Family::ALL
            .into_iter()
            .filter(|family| self.is_enabled(*family))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.period, Duration::from_millis(100));
        assert_eq!(config.proc_path, PathBuf::from("/proc"));
        assert_eq!(config.buffer_size, 16384);
        assert!(!config.gpu_pcie);
        assert_eq!(config.families().count(), 5);
    }

    #[test]
    fn test_disabled_families_are_skipped() {
        let config = MonitorConfig {
            network: false,
            gpu: false,
            ..Default::default()
        };
        assert_eq!(
            config.families().collect::<Vec<_>>(),
            vec![Family::Cpu, Family::Memory, Family::Disk]
        );
    }
}
