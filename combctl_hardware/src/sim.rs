//! Simulated instruments for running the controller without a lab.
use crate::error::HwError;
use combctl_traits::{AnalogInput, AnalogOutput, DeviceError, DigitalOutput, FrequencyCounter};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Counter that reports a noisy, slowly drifting frequency per channel.
pub struct SimulatedCounter {
    base_hz: BTreeMap<u8, f64>,
    noise_hz: f64,
    drift_hz: f64,
    gate_time: f64,
    armed: Option<u8>,
    rng: u64,
}

impl SimulatedCounter {
    pub fn new(base_hz: impl IntoIterator<Item = (u8, f64)>) -> Self {
        Self {
            base_hz: base_hz.into_iter().collect(),
            noise_hz: 0.5,
            drift_hz: 0.0,
            gate_time: 0.1,
            armed: None,
            rng: 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Peak noise amplitude added to every reading.
    pub fn with_noise(mut self, hz: f64) -> Self {
        self.noise_hz = hz.abs();
        self
    }

    /// Frequency change applied to a channel after every reading.
    pub fn with_drift(mut self, hz_per_reading: f64) -> Self {
        self.drift_hz = hz_per_reading;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = seed.max(1);
        self
    }

    // xorshift64*, mapped to [-1, 1)
    fn next_unit(&mut self) -> f64 {
        self.rng ^= self.rng >> 12;
        self.rng ^= self.rng << 25;
        self.rng ^= self.rng >> 27;
        let bits = self.rng.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        (bits as f64 / (1u64 << 53) as f64).mul_add(2.0, -1.0)
    }
}

impl FrequencyCounter for SimulatedCounter {
    fn begin_measurement(&mut self, channel: u8) -> Result<(), DeviceError> {
        if !self.base_hz.contains_key(&channel) {
            return Err(HwError::Injected(format!("no signal on counter channel {channel}")).into());
        }
        self.armed = Some(channel);
        Ok(())
    }

    fn get_result(&mut self) -> Result<f64, DeviceError> {
        let channel = self.armed.take().ok_or(HwError::Timeout)?;
        let noise = self.noise_hz * self.next_unit();
        let drift = self.drift_hz;
        let base = self.base_hz.get_mut(&channel).ok_or(HwError::Timeout)?;
        let reading = *base + noise;
        *base += drift;
        tracing::trace!(channel, reading, "simulated counter reading");
        Ok(reading)
    }

    fn set_gate_time(&mut self, seconds: f64) -> Result<(), DeviceError> {
        self.gate_time = seconds;
        Ok(())
    }

    fn gate_time(&self) -> f64 {
        self.gate_time
    }
}

struct Plant {
    /// Voltage across each thermistor.
    actual: Vec<f64>,
    /// Last commanded output per loop.
    commanded: Vec<f64>,
    enabled: Vec<bool>,
    /// Fraction of the remaining error closed per read.
    response: f64,
    fail_reads: bool,
}

/// DAQ card driving a first-order thermal plant in the voltage domain.
///
/// Analog input `2i` is loop `i`'s thermistor voltage, `2i + 1` the set-point
/// readback. While a loop's enable line is high its voltage relaxes toward
/// the last written output.
#[derive(Clone)]
pub struct SimulatedDaq {
    plant: Rc<RefCell<Plant>>,
}

impl SimulatedDaq {
    pub fn new(initial_volts: Vec<f64>, response: f64) -> Self {
        let loops = initial_volts.len();
        Self {
            plant: Rc::new(RefCell::new(Plant {
                commanded: initial_volts.clone(),
                actual: initial_volts,
                enabled: vec![false; loops],
                response: response.clamp(0.0, 1.0),
                fail_reads: false,
            })),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.plant.borrow_mut().fail_reads = fail;
    }

    pub fn thermistor_volts(&self) -> Vec<f64> {
        self.plant.borrow().actual.clone()
    }

    pub fn enabled(&self) -> Vec<bool> {
        self.plant.borrow().enabled.clone()
    }

    pub fn analog_in(&self) -> SimulatedAnalogIn {
        SimulatedAnalogIn(self.clone())
    }

    pub fn analog_out(&self) -> SimulatedAnalogOut {
        SimulatedAnalogOut(self.clone())
    }

    pub fn digital_out(&self) -> SimulatedDigitalOut {
        SimulatedDigitalOut(self.clone())
    }
}

pub struct SimulatedAnalogIn(SimulatedDaq);
pub struct SimulatedAnalogOut(SimulatedDaq);
pub struct SimulatedDigitalOut(SimulatedDaq);

impl AnalogInput for SimulatedAnalogIn {
    fn read_values(&mut self) -> Result<Vec<f64>, DeviceError> {
        let mut plant = self.0.plant.borrow_mut();
        if plant.fail_reads {
            return Err(HwError::Injected("analog input read".into()).into());
        }
        let response = plant.response;
        let Plant {
            actual,
            commanded,
            enabled,
            ..
        } = &mut *plant;
        let mut volts = Vec::with_capacity(actual.len() * 2);
        for ((v, target), on) in actual.iter_mut().zip(commanded.iter()).zip(enabled.iter()) {
            if *on {
                *v += (target - *v) * response;
            }
            volts.push(*v);
            volts.push(*target);
        }
        Ok(volts)
    }
}

impl AnalogOutput for SimulatedAnalogOut {
    fn write_values(&mut self, values: &[f64]) -> Result<(), DeviceError> {
        let mut plant = self.0.plant.borrow_mut();
        if values.len() != plant.commanded.len() {
            return Err(HwError::Injected(format!(
                "expected {} output values, got {}",
                plant.commanded.len(),
                values.len()
            ))
            .into());
        }
        plant.commanded.copy_from_slice(values);
        Ok(())
    }
}

impl DigitalOutput for SimulatedDigitalOut {
    fn write_line(&mut self, index: usize, level: bool) -> Result<(), DeviceError> {
        let mut plant = self.0.plant.borrow_mut();
        let line = plant
            .enabled
            .get_mut(index)
            .ok_or_else(|| HwError::Injected(format!("no digital line {index}")))?;
        *line = level;
        tracing::debug!(line = index, level, "simulated digital line");
        Ok(())
    }
}
