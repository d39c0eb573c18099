//! Instrument assembly: serial devices with the `hardware` feature and a
//! configured port, simulators otherwise.

use combctl_config::Config;
use combctl_core::ControlLoopCfg;
use combctl_core::counters::CounterBank;
use combctl_core::mocks::SimulatedOrionLink;
use combctl_core::orion::OrionLaser;
use combctl_hardware::{SimulatedCounter, SimulatedDaq};
use combctl_traits::ReferenceLaser;

/// Per-reading drift of the simulated combs, Hz (`COMBCTL_SIM_DRIFT_HZ`).
fn sim_drift_hz() -> f64 {
    std::env::var("COMBCTL_SIM_DRIFT_HZ")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0)
}

/// Make every simulated DAQ read fail (`COMBCTL_SIM_DAQ_FAULT=1`).
fn sim_daq_fault() -> bool {
    std::env::var("COMBCTL_SIM_DAQ_FAULT").is_ok_and(|v| v == "1")
}

/// One instrument per channel, routed by physical input.
pub fn counter(cfg: &Config) -> eyre::Result<CounterBank> {
    let mut bank = CounterBank::new(cfg.counter.gate_time_s);
    #[cfg(feature = "hardware")]
    {
        bank = hw::route_serial_counters(cfg, bank)?;
    }
    let served = bank.channels();
    for (i, ch) in cfg.channels.iter().enumerate() {
        if served.contains(&ch.counter_channel) {
            continue;
        }
        tracing::info!(channel = i, name = %ch.name, "using simulated counter");
        let sim = SimulatedCounter::new([(ch.counter_channel, ch.target_hz)])
            .with_drift(sim_drift_hz())
            .with_seed(0x5EED + i as u64);
        bank = bank.route(ch.counter_channel, Box::new(sim));
    }
    Ok(bank)
}

/// The reference laser, or `None` when `[laser].connect` is off.
pub fn laser(cfg: &Config) -> eyre::Result<Option<Box<dyn ReferenceLaser>>> {
    if !cfg.laser.connect {
        return Ok(None);
    }
    let limits = (
        (cfg.laser.current_min, cfg.laser.current_max),
        (cfg.laser.temp_min, cfg.laser.temp_max),
    );
    #[cfg(feature = "hardware")]
    {
        if let Some(mut laser) = hw::open_laser(cfg)? {
            laser.set_limits(limits.0, limits.1);
            return Ok(Some(Box::new(laser)));
        }
    }
    let mut laser = sim_laser()?;
    laser.set_limits(limits.0, limits.1);
    Ok(Some(Box::new(laser)))
}

pub fn sim_laser() -> eyre::Result<OrionLaser<SimulatedOrionLink>> {
    Ok(OrionLaser::connect(SimulatedOrionLink::default(), "sim")?)
}

/// Simulated DAQ card whose thermistors start at each loop's default temperature.
pub fn daq(cfg: &Config) -> SimulatedDaq {
    let volts = cfg
        .daq
        .loops
        .iter()
        .map(|l| {
            let core = ControlLoopCfg::from(l);
            core.thermistor.temp_to_volt(core.temperature_default)
        })
        .collect();
    let daq = SimulatedDaq::new(volts, 0.2);
    if sim_daq_fault() {
        daq.fail_reads(true);
    }
    daq
}

/// ORION transport for one-shot commands: the serial port under `hardware`
/// when configured, the register simulator otherwise.
pub fn with_orion<T>(
    cfg: &Config,
    f: impl FnOnce(&mut dyn OrionCommands) -> eyre::Result<T>,
) -> eyre::Result<T> {
    #[cfg(feature = "hardware")]
    {
        if let Some(mut laser) = hw::open_laser(cfg)? {
            laser.set_limits(
                (cfg.laser.current_min, cfg.laser.current_max),
                (cfg.laser.temp_min, cfg.laser.temp_max),
            );
            return f(&mut laser);
        }
    }
    let mut laser = sim_laser()?;
    laser.set_limits(
        (cfg.laser.current_min, cfg.laser.current_max),
        (cfg.laser.temp_min, cfg.laser.temp_max),
    );
    f(&mut laser)
}

/// Ports answering as an ORION laser. Without the `hardware` feature only the
/// register simulator (`sim`) is tried.
pub fn find_lasers(cfg: &Config, serial_number: Option<u64>) -> eyre::Result<Vec<String>> {
    #[cfg(feature = "hardware")]
    {
        return hw::find_lasers(cfg, serial_number);
    }
    #[cfg(not(feature = "hardware"))]
    {
        let _ = cfg;
        Ok(combctl_core::orion::find(
            ["sim".to_string()],
            |_| Ok(SimulatedOrionLink::default()),
            serial_number,
        ))
    }
}

/// The ORION operations the `orion` subcommand needs, independent of transport.
pub trait OrionCommands {
    fn name(&self) -> &str;
    fn execute_enabled(
        &mut self,
        command: combctl_core::orion::Command,
        value: Option<u64>,
    ) -> Result<Option<u64>, combctl_core::CombError>;
}

impl<P: std::io::Read + std::io::Write> OrionCommands for OrionLaser<P> {
    fn name(&self) -> &str {
        OrionLaser::name(self)
    }

    fn execute_enabled(
        &mut self,
        command: combctl_core::orion::Command,
        value: Option<u64>,
    ) -> Result<Option<u64>, combctl_core::CombError> {
        OrionLaser::execute_enabled(self, command, value)
    }
}

#[cfg(feature = "hardware")]
mod hw {
    use super::*;
    use combctl_config::CounterKind;
    use combctl_core::counters::{EconomicalCounter, MirrorCorrection, ScpiCounter};
    use combctl_core::hw_error::map_hw_error;
    use combctl_hardware::serial::{self, Port};
    use eyre::WrapErr;
    use std::time::Duration;

    const COUNTER_BAUD: u32 = 9600;

    fn open(name: &str, baud: u32, timeout: Duration) -> eyre::Result<Port> {
        serial::open(name, baud, timeout)
            .map_err(|e| map_hw_error(&e))
            .wrap_err_with(|| format!("opening serial port {name}"))
    }

    pub(super) fn route_serial_counters(cfg: &Config, mut bank: CounterBank) -> eyre::Result<CounterBank> {
        let timeout = Duration::from_secs_f64(cfg.counter.gate_time_s * 2.0 + 0.5);
        let inputs = |kind: CounterKind| -> Vec<u8> {
            cfg.channels
                .iter()
                .filter(|c| c.counter == kind)
                .map(|c| c.counter_channel)
                .collect()
        };

        let scpi_inputs = inputs(CounterKind::Scpi);
        if let (Some(port), false) = (&cfg.counter.scpi_port, scpi_inputs.is_empty()) {
            let mut counter = ScpiCounter::new(
                open(port.as_str(), COUNTER_BAUD, timeout)?,
                cfg.counter.gate_time_s,
                cfg.counter.external_clock,
            )
            .wrap_err("configuring SCPI counter")?;
            for &input in &scpi_inputs {
                counter
                    .set_approx_frequency(input, cfg.counter.approx_frequency_hz)
                    .wrap_err("configuring SCPI counter")?;
            }
            bank = bank.route_all(&scpi_inputs, Box::new(counter));
        }

        let eco_inputs = inputs(CounterKind::Economical);
        if let (Some(port), false) = (&cfg.counter.economical_port, eco_inputs.is_empty()) {
            let mirror = cfg.counter.mirror_hz.map(|mirror_hz| MirrorCorrection {
                mirror_hz,
                offset_hz: cfg.counter.mirror_offset_hz,
            });
            let mut counter = EconomicalCounter::new(
                open(port.as_str(), COUNTER_BAUD, timeout)?,
                mirror,
                cfg.counter.gate_time_s,
            );
            counter
                .select_high_speed()
                .wrap_err("configuring economical counter")?;
            bank = bank.route_all(&eco_inputs, Box::new(counter));
        }
        Ok(bank)
    }

    pub(super) fn find_lasers(cfg: &Config, serial_number: Option<u64>) -> eyre::Result<Vec<String>> {
        let ports = serial::available_ports()
            .map_err(|e| map_hw_error(&e))
            .wrap_err("listing serial ports")?;
        let timeout = Duration::from_millis(cfg.laser.timeout_ms);
        Ok(combctl_core::orion::find(
            ports,
            |name| serial::open(name, cfg.laser.baud_rate, timeout).map_err(|e| map_hw_error(&e)),
            serial_number,
        ))
    }

    pub(super) fn open_laser(cfg: &Config) -> eyre::Result<Option<OrionLaser<Port>>> {
        let Some(port) = &cfg.laser.port else {
            return Ok(None);
        };
        let serial = open(
            port.as_str(),
            cfg.laser.baud_rate,
            Duration::from_millis(cfg.laser.timeout_ms),
        )?;
        let laser = OrionLaser::connect(serial, port.as_str())
            .wrap_err_with(|| format!("connecting to the reference laser on {port}"))?;
        Ok(Some(laser))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use combctl_traits::FrequencyCounter;

    #[test]
    fn simulated_bank_serves_every_channel() {
        let cfg = Config::default();
        let mut bank = counter(&cfg).unwrap();
        assert_eq!(bank.channels(), vec![1, 2]);
        bank.begin_measurement(2).unwrap();
        let f = bank.get_result().unwrap();
        assert!((f - cfg.channels[1].target_hz).abs() < 1.0);
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn simulated_laser_is_found_by_serial_number() {
        let cfg = Config::default();
        assert_eq!(find_lasers(&cfg, None).unwrap(), vec!["sim"]);
        assert_eq!(find_lasers(&cfg, Some(31_337)).unwrap(), vec!["sim"]);
        assert!(find_lasers(&cfg, Some(1)).unwrap().is_empty());
    }

    #[test]
    fn laser_is_skipped_when_connect_is_off() {
        let mut cfg = Config::default();
        cfg.laser.connect = false;
        assert!(laser(&cfg).unwrap().is_none());
        cfg.laser.connect = true;
        assert!(laser(&cfg).unwrap().is_some());
    }
}
