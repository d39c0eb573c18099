//! Round-robin choice of the next channel to measure.

use crate::error::CombError;

#[derive(Debug, Clone)]
pub struct MeasurementScheduler {
    current: usize,
    active: Vec<bool>,
}

impl MeasurementScheduler {
    /// Start on the first active channel, or index 0 when none is active.
    pub fn new(active: Vec<bool>) -> Self {
        let current = active.iter().position(|a| *a).unwrap_or(0);
        Self { current, active }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    pub fn any_active(&self) -> bool {
        self.active.iter().any(|a| *a)
    }

    /// Move to the next active channel after `current`, wrapping around.
    ///
    /// Tries at most N candidates. With no active channel the index is left
    /// unchanged and returned as-is; the caller should stop ticking.
    pub fn advance(&mut self) -> usize {
        let n = self.active.len();
        let mut candidate = self.current;
        for _ in 0..n {
            candidate = (candidate + 1) % n;
            if self.active[candidate] {
                self.current = candidate;
                return candidate;
            }
        }
        self.current
    }

    /// Activating a channel makes it current so it is sampled next.
    /// Deactivating leaves the pointer where it is.
    pub fn set_active(&mut self, index: usize, active: bool) -> Result<(), CombError> {
        let slot = self
            .active
            .get_mut(index)
            .ok_or(CombError::UnknownChannel(index))?;
        *slot = active;
        if active {
            self.current = index;
        }
        Ok(())
    }
}
