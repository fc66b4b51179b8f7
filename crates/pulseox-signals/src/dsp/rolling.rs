//! Rolling median smoothing
//!
//! Batch estimates jump around with detector jitter; the published number is
//! the median of the last few batches instead.

/// Median of a slice, averaging the middle pair for even lengths.
///
/// Returns `None` for an empty slice or when every value is NaN.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Fixed-capacity round-robin history with a median readout.
#[derive(Debug, Clone)]
pub struct RollingMedian {
    slots: Vec<f64>,
    capacity: usize,
    /// Slot the next push overwrites (the oldest once full)
    next: usize,
}

impl RollingMedian {
    /// Empty history; the median covers however many values were pushed.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    /// History pre-filled with `seed`, so the median always spans exactly
    /// `capacity` values.
    pub fn seeded(capacity: usize, seed: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![seed; capacity],
            capacity,
            next: 0,
        }
    }

    /// Record a value, overwriting the oldest slot once full.
    pub fn push(&mut self, value: f64) {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
        } else {
            self.slots[self.next] = value;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn median(&self) -> Option<f64> {
        median(&self.slots)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Raw slot contents in storage order (not chronological).
    pub fn values(&self) -> &[f64] {
        &self.slots
    }
}
