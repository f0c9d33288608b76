//! Double-buffered metric storage.
//!
//! Records are stored flat: device `i` owns `fields` consecutive counters
//! starting at `i * fields`. The two buffers trade places after every
//! emitted METRICS record, so steady-state polling never allocates.

#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    fields: usize,
    previous: Vec<u64>,
    current: Vec<u64>,
}

impl SnapshotBuffer {
    /// Allocates zeroed buffers for `devices` records of `fields` counters.
    pub fn new(devices: usize, fields: usize) -> Self {
        Self {
            fields,
            previous: vec![0; devices * fields],
            current: vec![0; devices * fields],
        }
    }

    /// Number of device records held by each buffer.
    pub fn len(&self) -> usize {
        if self.fields == 0 {
            0
        } else {
            self.current.len() / self.fields
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn fields(&self) -> usize {
        self.fields
    }

    /// Replaces both buffers with zeroed ones sized for `devices` records.
    pub fn reset(&mut self, devices: usize) {
        self.previous = vec![0; devices * self.fields];
        self.current = vec![0; devices * self.fields];
    }

    pub fn previous(&self, device: usize) -> &[u64] {
        let start = device * self.fields;
        &self.previous[start..start + self.fields]
    }

    pub fn current(&self, device: usize) -> &[u64] {
        let start = device * self.fields;
        &self.current[start..start + self.fields]
    }

    pub fn current_mut(&mut self, device: usize) -> &mut [u64] {
        let start = device * self.fields;
        &mut self.current[start..start + self.fields]
    }

    /// Copies the previous record of `device` into the current buffer, so
    /// that its next delta is zero.
    pub fn carry_forward(&mut self, device: usize) {
        let start = device * self.fields;
        let end = start + self.fields;
        self.current[start..end].copy_from_slice(&self.previous[start..end]);
    }

    /// Iterates `(previous, current)` record pairs in device order.
    pub fn pairs(&self) -> impl Iterator<Item = (&[u64], &[u64])> {
        self.previous
            .chunks_exact(self.fields.max(1))
            .zip(self.current.chunks_exact(self.fields.max(1)))
    }

    /// Makes the newest snapshot the baseline for the next poll.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);
    }
}
