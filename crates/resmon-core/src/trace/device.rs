//! Device tables: the ordered set of devices a source reports on.
//!
//! A table is immutable. When the underlying enumeration changes, the owning
//! source builds a new table (a new epoch) and announces it with a
//! DEVICE_LIST record.

/// A single named unit a collector reports metrics for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub ordinal: usize,
}

/// Ordered list of devices, indexed by ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTable {
    devices: Vec<Device>,
}

impl DeviceTable {
    /// Builds a table from names in enumeration order.
    ///
    /// Names are expected to be unique; kernel listings never repeat a device.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices: Vec<Device> = names
            .into_iter()
            .enumerate()
            .map(|(ordinal, name)| Device {
                name: name.into(),
                ordinal,
            })
            .collect();
        debug_assert!(
            devices
                .iter()
                .enumerate()
                .all(|(i, d)| devices[..i].iter().all(|o| o.name != d.name)),
            "duplicate device name in table"
        );
        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&Device> {
        self.devices.get(ordinal)
    }

    /// Returns true when `name` is the device at `ordinal`.
    ///
    /// This positional check is what drives re-enumeration: a device that
    /// moved to a different position counts as a change.
    pub fn matches(&self, ordinal: usize, name: &str) -> bool {
        self.devices
            .get(ordinal)
            .is_some_and(|device| device.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Device> {
        self.devices.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name.as_str())
    }
}

impl<'a> IntoIterator for &'a DeviceTable {
    type Item = &'a Device;
    type IntoIter = std::slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
