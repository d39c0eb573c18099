//! Beat note between the two combs and its running ratio.

/// `delta_f = |f1 - f0|` and the running mean of `min(f0, f1) / delta_f`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatStats {
    delta_f: f64,
    nq: f64,
    samples: u64,
}

impl BeatStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one pair of repetition rates. A zero beat leaves the mean unchanged.
    pub fn update(&mut self, f0: f64, f1: f64) {
        self.delta_f = (f1 - f0).abs();
        let ratio = f0.min(f1) / self.delta_f;
        if !ratio.is_finite() {
            return;
        }
        let n = self.samples as f64;
        self.nq = (self.nq * n + ratio) / (n + 1.0);
        self.samples += 1;
    }

    pub fn reset(&mut self) {
        self.nq = 0.0;
        self.samples = 0;
    }

    #[inline]
    pub fn delta_f(&self) -> f64 {
        self.delta_f
    }

    /// Mean Nyquist ratio since the last reset.
    #[inline]
    pub fn nq(&self) -> f64 {
        self.nq
    }

    #[inline]
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_mean() {
        let mut b = BeatStats::new();
        b.update(1000.0, 1010.0);
        assert_eq!(b.delta_f(), 10.0);
        assert_eq!(b.nq(), 100.0);
        b.update(1020.0, 1000.0);
        assert_eq!(b.delta_f(), 20.0);
        assert_eq!(b.nq(), 75.0);
        assert_eq!(b.samples(), 2);
    }

    #[test]
    fn zero_beat_skipped_and_reset() {
        let mut b = BeatStats::new();
        b.update(1000.0, 1010.0);
        b.update(5.0, 5.0);
        assert_eq!(b.delta_f(), 0.0);
        assert_eq!(b.nq(), 100.0);
        assert_eq!(b.samples(), 1);
        b.reset();
        assert_eq!(b.nq(), 0.0);
        assert_eq!(b.samples(), 0);
    }
}
