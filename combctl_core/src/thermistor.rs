//! Steinhart-Hart conversion between thermistor bias voltage and temperature.

const KELVIN_OFFSET: f64 = 273.15;

/// Steinhart-Hart coefficients: `1/T = A + B ln R + C (ln R)^3`, T in kelvin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteinhartHart {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// A thermistor read out through a constant bias current.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thermistor {
    pub coefs: SteinhartHart,
    /// Bias current in amperes.
    pub bias_current: f64,
}

impl Thermistor {
    pub fn new(coefs: SteinhartHart, bias_current: f64) -> Self {
        Self {
            coefs,
            bias_current,
        }
    }

    /// Voltage to °C. Non-positive voltages are a sensor fault and map to NaN.
    pub fn volt_to_temp(&self, volts: f64) -> f64 {
        if volts.is_nan() || volts <= 0.0 {
            return f64::NAN;
        }
        let ln_r = (volts / self.bias_current).ln();
        let SteinhartHart { a, b, c } = self.coefs;
        1.0 / (a + b * ln_r + c * ln_r.powi(3)) - KELVIN_OFFSET
    }

    /// °C to voltage, solving the Steinhart-Hart cubic in `ln R` with Cardano's formula.
    pub fn temp_to_volt(&self, celsius: f64) -> f64 {
        let SteinhartHart { a, b, c } = self.coefs;
        let y = (a - 1.0 / (celsius + KELVIN_OFFSET)) / (2.0 * c);
        let x = ((b / (3.0 * c)).powi(3) + y * y).sqrt();
        let resistance = ((x - y).cbrt() - (x + y).cbrt()).exp();
        self.bias_current * resistance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab_thermistor() -> Thermistor {
        Thermistor::new(
            SteinhartHart {
                a: 1.129_148e-3,
                b: 2.341_25e-4,
                c: 8.767_41e-8,
            },
            100e-6,
        )
    }

    #[test]
    fn ten_k_at_room_temperature() {
        let t = lab_thermistor();
        // 10 kΩ at 100 µA reads 1 V, close to 25 °C for this curve
        let c = t.volt_to_temp(1.0);
        assert!((c - 25.0).abs() < 0.05, "got {c}");
    }

    #[test]
    fn non_positive_voltage_is_nan() {
        let t = lab_thermistor();
        assert!(t.volt_to_temp(0.0).is_nan());
        assert!(t.volt_to_temp(-0.2).is_nan());
        assert!(t.volt_to_temp(f64::NAN).is_nan());
    }

    #[test]
    fn round_trip_across_range() {
        let t = lab_thermistor();
        let mut celsius = -10.0;
        while celsius <= 80.0 {
            let back = t.volt_to_temp(t.temp_to_volt(celsius));
            assert!((back - celsius).abs() < 1e-6, "{celsius} -> {back}");
            celsius += 0.5;
        }
    }

    #[test]
    fn voltage_falls_as_temperature_rises() {
        let t = lab_thermistor();
        assert!(t.temp_to_volt(30.0) < t.temp_to_volt(20.0));
    }
}
