//! Rational (IIR) transfer-function filter with persistent history.

use crate::error::BuildError;

/// `y[n] = (Σ b_k x[n-k]) / a0 − (Σ_{k≥1} a_k y[n-k]) / a0`
///
/// Histories are newest-first and keep the tap counts given at construction.
#[derive(Debug, Clone)]
pub struct DigitalFilter {
    num: Vec<f64>,
    den: Vec<f64>,
    inputs: Vec<f64>,
    outputs: Vec<f64>,
}

impl DigitalFilter {
    /// Build a filter whose histories are primed with `initial`, so a constant
    /// input equal to `initial` produces no startup transient.
    pub fn new(num: Vec<f64>, den: Vec<f64>, initial: f64) -> Result<Self, BuildError> {
        if num.is_empty() {
            return Err(BuildError::InvalidFilterConfig("numerator has no taps"));
        }
        if den.is_empty() {
            return Err(BuildError::InvalidFilterConfig("denominator has no taps"));
        }
        if den[0] == 0.0 {
            return Err(BuildError::InvalidFilterConfig("denominator a0 must be non-zero"));
        }
        if num.iter().chain(den.iter()).any(|t| !t.is_finite()) {
            return Err(BuildError::InvalidFilterConfig("taps must be finite"));
        }
        let inputs = vec![initial; num.len()];
        let outputs = vec![initial; den.len()];
        Ok(Self {
            num,
            den,
            inputs,
            outputs,
        })
    }

    /// Identity filter (`b=[1]`, `a=[1]`).
    pub fn pass_through(initial: f64) -> Self {
        Self {
            num: vec![1.0],
            den: vec![1.0],
            inputs: vec![initial],
            outputs: vec![initial],
        }
    }

    pub fn step(&mut self, x: f64) -> f64 {
        self.inputs.rotate_right(1);
        self.inputs[0] = x;
        self.outputs.rotate_right(1);

        let a0 = self.den[0];
        let mut y = 0.0;
        for (b, xk) in self.num.iter().zip(&self.inputs) {
            y += b * xk / a0;
        }
        for (a, yk) in self.den.iter().zip(&self.outputs).skip(1) {
            y -= a * yk / a0;
        }
        self.outputs[0] = y;
        y
    }

    /// Re-prime both histories with `value`.
    pub fn reset(&mut self, value: f64) {
        self.inputs.fill(value);
        self.outputs.fill(value);
    }

    pub fn taps(&self) -> (usize, usize) {
        (self.num.len(), self.den.len())
    }
}
