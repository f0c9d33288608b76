// NVML bindings resolved at runtime, so the agent runs on hosts without the driver.

use std::ffi::{CStr, c_char, c_int, c_uint, c_void};

use libloading::{Library, Symbol};

use super::GpuError;

const LIBRARY_NAME: &str = "libnvidia-ml.so.1";
const NVML_SUCCESS: c_int = 0;
const NAME_BUFFER_SIZE: usize = 96;
const PCIE_UTIL_TX_BYTES: c_int = 0;
const PCIE_UTIL_RX_BYTES: c_int = 1;

type DeviceHandle = *mut c_void;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Utilization {
    pub gpu: c_uint,
    pub memory: c_uint,
}

type InitFn = unsafe extern "C" fn() -> c_int;
type ShutdownFn = unsafe extern "C" fn() -> c_int;
type GetCountFn = unsafe extern "C" fn(*mut c_uint) -> c_int;
type GetHandleFn = unsafe extern "C" fn(c_uint, *mut DeviceHandle) -> c_int;
type GetNameFn = unsafe extern "C" fn(DeviceHandle, *mut c_char, c_uint) -> c_int;
type GetUtilizationFn = unsafe extern "C" fn(DeviceHandle, *mut Utilization) -> c_int;
type GetPcieFn = unsafe extern "C" fn(DeviceHandle, c_int, *mut c_uint) -> c_int;

/// An initialized NVML session. Shut down on drop.
pub struct Nvml {
    shutdown: ShutdownFn,
    get_count: GetCountFn,
    get_handle: GetHandleFn,
    get_name: GetNameFn,
    get_utilization: GetUtilizationFn,
    get_pcie: GetPcieFn,
    // Keeps the function pointers above valid.
    _library: Library,
}

fn check(call: &'static str, code: c_int) -> Result<(), GpuError> {
    if code == NVML_SUCCESS {
        Ok(())
    } else {
        Err(GpuError::Nvml { call, code })
    }
}

/// Resolves `name` and copies the function pointer out of the symbol.
///
/// # Safety
/// `T` must match the C signature of the exported function.
unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T, GpuError> {
    let symbol: Symbol<T> = unsafe { library.get(name) }?;
    Ok(*symbol)
}

impl Nvml {
    pub fn load() -> Result<Self, GpuError> {
        // SAFETY: loading the vendor library runs its initializers, which
        // have no preconditions on our side. All signatures below follow
        // nvml.h.
        unsafe {
            let library = Library::new(LIBRARY_NAME)?;
            let init: InitFn = symbol(&library, b"nvmlInit_v2\0")?;
            let shutdown = symbol(&library, b"nvmlShutdown\0")?;
            let get_count = symbol(&library, b"nvmlDeviceGetCount_v2\0")?;
            let get_handle = symbol(&library, b"nvmlDeviceGetHandleByIndex_v2\0")?;
            let get_name = symbol(&library, b"nvmlDeviceGetName\0")?;
            let get_utilization = symbol(&library, b"nvmlDeviceGetUtilizationRates\0")?;
            let get_pcie = symbol(&library, b"nvmlDeviceGetPcieThroughput\0")?;
            check("nvmlInit_v2", init())?;
            let nvml = Self {
                shutdown,
                get_count,
                get_handle,
                get_name,
                get_utilization,
                get_pcie,
                _library: library,
            };
            Ok(nvml)
        }
    }

    pub fn device_count(&self) -> Result<u32, GpuError> {
        let mut count: c_uint = 0;
        // SAFETY: out-pointer to a live local.
        check("nvmlDeviceGetCount_v2", unsafe { (self.get_count)(&mut count) })?;
        Ok(count)
    }

    pub fn device(&self, index: u32) -> Result<Device<'_>, GpuError> {
        let mut handle: DeviceHandle = std::ptr::null_mut();
        // SAFETY: out-pointer to a live local.
        check("nvmlDeviceGetHandleByIndex_v2", unsafe {
            (self.get_handle)(index, &mut handle)
        })?;
        Ok(Device { nvml: self, handle })
    }
}

impl Drop for Nvml {
    fn drop(&mut self) {
        // SAFETY: only reachable after a successful nvmlInit_v2.
        unsafe {
            (self.shutdown)();
        }
    }
}

/// A device handle, valid while the session lives.
pub struct Device<'a> {
    nvml: &'a Nvml,
    handle: DeviceHandle,
}

impl Device<'_> {
    pub fn name(&self) -> Result<String, GpuError> {
        let mut buffer = [0 as c_char; NAME_BUFFER_SIZE];
        // SAFETY: the buffer length passed matches the buffer.
        check("nvmlDeviceGetName", unsafe {
            (self.nvml.get_name)(self.handle, buffer.as_mut_ptr(), NAME_BUFFER_SIZE as c_uint)
        })?;
        // SAFETY: NVML always NUL-terminates within the given length.
        let name = unsafe { CStr::from_ptr(buffer.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }

    pub fn utilization(&self) -> Result<Utilization, GpuError> {
        let mut utilization = Utilization::default();
        // SAFETY: out-pointer to a live, correctly laid out local.
        check("nvmlDeviceGetUtilizationRates", unsafe {
            (self.nvml.get_utilization)(self.handle, &mut utilization)
        })?;
        Ok(utilization)
    }

    /// PCIe throughput as `(tx, rx)` in KB/s over the last 20 ms.
    pub fn pcie_throughput(&self) -> Result<(u32, u32), GpuError> {
        let mut tx: c_uint = 0;
        let mut rx: c_uint = 0;
        // SAFETY: out-pointers to live locals.
        unsafe {
            check(
                "nvmlDeviceGetPcieThroughput",
                (self.nvml.get_pcie)(self.handle, PCIE_UTIL_TX_BYTES, &mut tx),
            )?;
            check(
                "nvmlDeviceGetPcieThroughput",
                (self.nvml.get_pcie)(self.handle, PCIE_UTIL_RX_BYTES, &mut rx),
            )?;
        }
        Ok((tx, rx))
    }
}
