//! NVIDIA GPU utilization through NVML.
//!
//! NVML is opened at runtime. When the library or the driver is missing the
//! collector starts inactive: it reports no devices and its source writes
//! nothing, without failing the agent.

#[cfg(feature = "gpu")]
mod nvml;

use std::ops::ControlFlow;

use tracing::{debug, warn};

use crate::collector::{Cardinality, CollectError, Collector, Family, Field};

/// Raw utilization readings; they are not deltas.
pub const GPU_FIELDS: &[Field] = &[
    Field::sample("gpu_utilization"),
    Field::sample("memory_utilization"),
    Field::sample("pcie_tx_kbps"),
    Field::sample("pcie_rx_kbps"),
];

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[cfg(feature = "gpu")]
    #[error("cannot load NVML: {0}")]
    Load(#[from] libloading::Error),

    #[error("{call} failed with NVML code {code}")]
    Nvml { call: &'static str, code: i32 },

    #[error("built without GPU support")]
    Unsupported,
}

impl From<GpuError> for CollectError {
    fn from(err: GpuError) -> Self {
        CollectError::Device(err.to_string())
    }
}

pub struct GpuCollector {
    #[cfg(feature = "gpu")]
    nvml: Option<nvml::Nvml>,
    sample_pcie: bool,
}

impl GpuCollector {
    /// Opens NVML. On failure the collector is inactive and a single warning
    /// is logged.
    pub fn new(sample_pcie: bool) -> Self {
        match Self::open(sample_pcie) {
            Ok(collector) => collector,
            Err(err) => {
                warn!(error = %err, "GPU monitoring unavailable, nvidia trace stays empty");
                Self::inactive(sample_pcie)
            }
        }
    }

    #[cfg(feature = "gpu")]
    fn open(sample_pcie: bool) -> Result<Self, GpuError> {
        let nvml = nvml::Nvml::load()?;
        debug!(devices = nvml.device_count()?, "NVML initialized");
        Ok(Self {
            nvml: Some(nvml),
            sample_pcie,
        })
    }

    #[cfg(not(feature = "gpu"))]
    fn open(_sample_pcie: bool) -> Result<Self, GpuError> {
        debug!("GPU support not compiled in");
        Err(GpuError::Unsupported)
    }

    /// A collector that never reports devices.
    pub fn inactive(sample_pcie: bool) -> Self {
        Self {
            #[cfg(feature = "gpu")]
            nvml: None,
            sample_pcie,
        }
    }

    pub fn samples_pcie(&self) -> bool {
        self.sample_pcie
    }
}

impl Collector for GpuCollector {
    fn family(&self) -> Family {
        Family::Gpu
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::Variable
    }

    #[cfg(feature = "gpu")]
    fn is_active(&self) -> bool {
        self.nvml.is_some()
    }

    #[cfg(not(feature = "gpu"))]
    fn is_active(&self) -> bool {
        false
    }

    #[cfg(feature = "gpu")]
    fn read(
        &mut self,
        visit: &mut dyn FnMut(&str, &[u64]) -> ControlFlow<()>,
    ) -> Result<(), CollectError> {
        let Some(nvml) = &self.nvml else {
            return Ok(());
        };

        for index in 0..nvml.device_count()? {
            let device = nvml.device(index)?;
            // The index keeps identical models distinct.
            let name = format!("nvidia{index}:{}", device.name()?);
            let utilization = device.utilization()?;
            let (tx, rx) = if self.sample_pcie {
                device.pcie_throughput()?
            } else {
                (0, 0)
            };
            let values = [
                u64::from(utilization.gpu),
                u64::from(utilization.memory),
                u64::from(tx),
                u64::from(rx),
            ];
            if visit(&name, &values).is_break() {
                break;
            }
        }
        Ok(())
    }

    #[cfg(not(feature = "gpu"))]
    fn read(
        &mut self,
        _visit: &mut dyn FnMut(&str, &[u64]) -> ControlFlow<()>,
    ) -> Result<(), CollectError> {
        Ok(())
    }

    fn close(&mut self) {
        #[cfg(feature = "gpu")]
        if self.nvml.take().is_some() {
            debug!("NVML shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_collector_reports_nothing() {
        let mut collector = GpuCollector::inactive(true);
        assert!(!collector.is_active());
        assert!(collector.samples_pcie());

        let mut seen = 0;
        collector
            .read(&mut |_, _| {
                seen += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(seen, 0);
        collector.close();
    }

    #[test]
    fn test_gpu_error_maps_to_device_error() {
        let err: CollectError = GpuError::Nvml {
            call: "nvmlDeviceGetName",
            code: 3,
        }
        .into();
        assert!(matches!(err, CollectError::Device(msg) if msg.contains("nvmlDeviceGetName")));
    }
}
