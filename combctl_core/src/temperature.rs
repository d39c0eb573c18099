//! DAQ-side temperature controller: all control loops, their remote adjusts and
//! the analog/digital I/O, advanced one tick at a time.

use combctl_traits::{AnalogInput, AnalogOutput, DigitalOutput, LineSource};
use tracing::{debug, info, warn};

use crate::config::TemperatureControllerCfg;
use crate::control_loop::ControlLoop;
use crate::error::{BuildError, CombError};
use crate::feedback::COMMIT_ADJUST;
use crate::hw_error::map_hw_error;
use crate::limits::Limits;
use crate::safety::{StrikeCounter, StrikeOutcome};
use crate::status::{LoopReading, TempTickReport, TickEvent};

struct LoopSlot {
    control: ControlLoop,
    strikes: StrikeCounter,
    source: Option<Box<dyn LineSource>>,
    /// Received over the link, already clamped.
    remote_adjust: f64,
    use_adjust: bool,
    last_digital: Option<bool>,
    reading: Option<LoopReading>,
}

pub struct TemperatureController<I, O, D>
where
    I: AnalogInput,
    O: AnalogOutput,
    D: DigitalOutput,
{
    analog_in: I,
    analog_out: O,
    digital_out: D,
    loops: Vec<LoopSlot>,
    adjust_limits: Limits,
    period_ms: u64,
}

impl<I, O, D> TemperatureController<I, O, D>
where
    I: AnalogInput,
    O: AnalogOutput,
    D: DigitalOutput,
{
    pub fn new(
        cfg: &TemperatureControllerCfg,
        analog_in: I,
        analog_out: O,
        digital_out: D,
    ) -> Result<Self, BuildError> {
        if cfg.loops.is_empty() {
            return Err(BuildError::InvalidConfig(
                "temperature controller needs at least one loop".into(),
            ));
        }
        if cfg.strike_limit == 0 {
            return Err(BuildError::InvalidConfig("strike_limit must be >= 1".into()));
        }
        let adjust_limits = Limits::symmetric(cfg.setpoint_max_adjust)?;
        let loops = cfg
            .loops
            .iter()
            .map(|l| {
                Ok(LoopSlot {
                    control: ControlLoop::new(l)?,
                    strikes: StrikeCounter::new(cfg.strike_limit, cfg.strike_policy),
                    source: None,
                    remote_adjust: 0.0,
                    use_adjust: false,
                    last_digital: None,
                    reading: None,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok(Self {
            analog_in,
            analog_out,
            digital_out,
            loops,
            adjust_limits,
            period_ms: cfg.period_ms,
        })
    }

    /// Attach the line source that feeds remote adjusts to loop `index`.
    pub fn attach_source(
        &mut self,
        index: usize,
        source: Box<dyn LineSource>,
    ) -> Result<(), CombError> {
        self.slot_mut(index)?.source = Some(source);
        Ok(())
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut LoopSlot, CombError> {
        self.loops
            .get_mut(index)
            .ok_or(CombError::UnknownChannel(index))
    }

    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    pub fn control_loop(&self, index: usize) -> Option<&ControlLoop> {
        self.loops.get(index).map(|s| &s.control)
    }

    pub fn remote_adjust(&self, index: usize) -> Option<f64> {
        self.loops.get(index).map(|s| s.remote_adjust)
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Values from the last tick, one per loop; `None` before the first.
    pub fn readings(&self) -> Vec<Option<LoopReading>> {
        self.loops.iter().map(|s| s.reading).collect()
    }

    pub fn set_setpoint(&mut self, index: usize, celsius: f64) -> Result<(), CombError> {
        let slot = self.slot_mut(index)?;
        slot.control.set_setpoint(celsius)?;
        info!(control_loop = slot.control.name(), setpoint = celsius, "setpoint changed");
        Ok(())
    }

    pub fn set_enable(&mut self, index: usize, enable: bool) -> Result<(), CombError> {
        let slot = self.slot_mut(index)?;
        slot.control.set_enable(enable);
        info!(control_loop = slot.control.name(), enable, "temperature control enable set");
        Ok(())
    }

    /// Whether the remote adjust is applied to loop `index`. While off the loop
    /// runs on its setpoint alone, but adjust lines are still accumulated.
    pub fn set_use_adjust(&mut self, index: usize, use_adjust: bool) -> Result<(), CombError> {
        self.slot_mut(index)?.use_adjust = use_adjust;
        Ok(())
    }

    fn disable_all(&mut self) {
        for slot in &mut self.loops {
            slot.control.set_enable(false);
        }
    }

    /// Handle at most one pending line per loop.
    fn poll_adjusts(&mut self, events: &mut Vec<TickEvent>) {
        let adjust_limits = self.adjust_limits;
        for (i, slot) in self.loops.iter_mut().enumerate() {
            let Some(line) = slot.source.as_mut().and_then(|s| s.poll_line()) else {
                continue;
            };
            let line = line.trim();
            if line == COMMIT_ADJUST {
                let setpoint = slot.control.setpoint() + slot.remote_adjust;
                slot.remote_adjust = 0.0;
                match slot.control.set_setpoint(setpoint) {
                    Ok(()) => {
                        info!(control_loop = slot.control.name(), setpoint, "adjust committed");
                        events.push(TickEvent::SetpointCommitted {
                            control_loop: i,
                            setpoint,
                        });
                    }
                    Err(e) => {
                        warn!(control_loop = slot.control.name(), error = %e, "adjust commit rejected");
                        events.push(TickEvent::SetpointRejected {
                            control_loop: i,
                            setpoint,
                        });
                    }
                }
                continue;
            }
            let raw = match line.parse::<f64>() {
                Ok(v) if v.is_finite() => slot.remote_adjust + v,
                _ => {
                    warn!(control_loop = slot.control.name(), line, "unparseable adjust, reset to 0");
                    0.0
                }
            };
            let adjust = adjust_limits.clamp(raw);
            let clamped = adjust != raw;
            if clamped {
                warn!(control_loop = slot.control.name(), adjust, "clamped setpoint adjust");
            }
            debug!(control_loop = slot.control.name(), adjust, "setpoint adjust");
            slot.remote_adjust = adjust;
            events.push(TickEvent::AdjustReceived {
                control_loop: i,
                adjust,
                clamped,
            });
        }
    }

    /// One control period: remote adjusts, ADC read, loop steps, panic
    /// strikes, DAC write, then changed enable lines.
    ///
    /// A failed read disables every loop before the error is returned.
    pub fn tick(&mut self) -> Result<TempTickReport, CombError> {
        let mut events = Vec::new();
        self.poll_adjusts(&mut events);
        for slot in &mut self.loops {
            let adjust = if slot.use_adjust { slot.remote_adjust } else { 0.0 };
            slot.control.set_adjust(adjust);
        }

        let volts = match self.analog_in.read_values() {
            Ok(v) if v.len() >= 2 * self.loops.len() => v,
            Ok(v) => {
                self.disable_all();
                return Err(CombError::InstrumentFault(format!(
                    "analog input returned {} values, expected {}",
                    v.len(),
                    2 * self.loops.len()
                )));
            }
            Err(e) => {
                self.disable_all();
                let err = map_hw_error(e.as_ref());
                warn!(error = %err, "analog read failed; all loops disabled");
                return Err(err);
            }
        };

        let mut voltages_out = Vec::with_capacity(self.loops.len());
        for (i, slot) in self.loops.iter_mut().enumerate() {
            let out = slot.control.do_step(volts[2 * i], volts[2 * i + 1]);
            let actual = slot.control.read_actual();
            match slot
                .strikes
                .record(out.panic && slot.control.is_enabled())
            {
                StrikeOutcome::Clear => {}
                StrikeOutcome::Strike(strikes) => {
                    let limits = slot.control.limits();
                    warn!(
                        control_loop = slot.control.name(),
                        temperature = actual,
                        min = limits.min(),
                        max = limits.max(),
                        strikes,
                        limit = slot.strikes.limit(),
                        "temperature outside limits"
                    );
                    events.push(TickEvent::PanicStrike {
                        control_loop: i,
                        temperature: actual,
                        strikes,
                    });
                }
                StrikeOutcome::Shutoff => {
                    warn!(
                        control_loop = slot.control.name(),
                        temperature = actual,
                        "panic strike limit reached; temperature control disabled"
                    );
                    slot.control.set_enable(false);
                    events.push(TickEvent::LoopForcedOff { control_loop: i });
                }
            }
            slot.reading = Some(LoopReading {
                actual,
                setpoint_readback: slot.control.read_setpoint(),
                voltage_out: out.voltage,
                digital_enable: out.digital_enable,
                panic: out.panic,
                adjust: slot.remote_adjust,
            });
            voltages_out.push(out.voltage);
        }

        self.analog_out
            .write_values(&voltages_out)
            .map_err(|e| map_hw_error(e.as_ref()))?;

        for (i, slot) in self.loops.iter_mut().enumerate() {
            let Some(level) = slot.reading.map(|r| r.digital_enable) else {
                continue;
            };
            if slot.last_digital != Some(level) {
                self.digital_out
                    .write_line(i, level)
                    .map_err(|e| map_hw_error(e.as_ref()))?;
                slot.last_digital = Some(level);
            }
        }

        Ok(TempTickReport {
            readings: self.loops.iter().filter_map(|s| s.reading).collect(),
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{ScriptedDaq, ScriptedSource};
    use crate::mocks::{ScriptedAnalogIn, ScriptedAnalogOut, ScriptedDigitalOut};

    type Ctl = TemperatureController<ScriptedAnalogIn, ScriptedAnalogOut, ScriptedDigitalOut>;

    fn controller(daq: &ScriptedDaq) -> Ctl {
        let mut cfg = TemperatureControllerCfg::default();
        cfg.loops.truncate(1);
        TemperatureController::new(&cfg, daq.analog_in(), daq.analog_out(), daq.digital_out())
            .unwrap()
    }

    fn volts_at(ctl: &Ctl, celsius: f64) -> f64 {
        ctl.control_loop(0).unwrap().thermistor().temp_to_volt(celsius)
    }

    #[test]
    fn adjust_lines_accumulate_and_clamp() {
        let daq = ScriptedDaq::default();
        let mut ctl = controller(&daq);
        let v = volts_at(&ctl, 30.0);
        daq.set_inputs(vec![v, v]);
        let src = ScriptedSource::default();
        ctl.attach_source(0, Box::new(src.clone())).unwrap();

        for line in ["3.0", "1.5", "1.0"] {
            src.push(line);
        }
        ctl.tick().unwrap();
        ctl.tick().unwrap();
        assert_eq!(ctl.remote_adjust(0), Some(4.5));
        let r = ctl.tick().unwrap();
        assert_eq!(ctl.remote_adjust(0), Some(5.0));
        assert!(r.events.contains(&TickEvent::AdjustReceived {
            control_loop: 0,
            adjust: 5.0,
            clamped: true
        }));

        src.push("garbage");
        ctl.tick().unwrap();
        assert_eq!(ctl.remote_adjust(0), Some(0.0));
    }

    #[test]
    fn commit_folds_adjust_into_setpoint() {
        let daq = ScriptedDaq::default();
        let mut ctl = controller(&daq);
        let v = volts_at(&ctl, 30.0);
        daq.set_inputs(vec![v, v]);
        let src = ScriptedSource::default();
        ctl.attach_source(0, Box::new(src.clone())).unwrap();

        src.push("2.0\n");
        src.push("COMMITADJUST\n");
        ctl.tick().unwrap();
        let r = ctl.tick().unwrap();
        assert_eq!(
            r.events,
            vec![TickEvent::SetpointCommitted {
                control_loop: 0,
                setpoint: 32.0
            }]
        );
        assert_eq!(ctl.control_loop(0).unwrap().setpoint(), 32.0);
        assert_eq!(ctl.remote_adjust(0), Some(0.0));
    }

    #[test]
    fn commit_out_of_limits_keeps_setpoint_and_drops_adjust() {
        let daq = ScriptedDaq::default();
        let mut ctl = controller(&daq);
        let v = volts_at(&ctl, 30.0);
        daq.set_inputs(vec![v, v]);
        ctl.set_setpoint(0, 44.0).unwrap();
        let src = ScriptedSource::default();
        ctl.attach_source(0, Box::new(src.clone())).unwrap();
        src.push("4.0");
        src.push("COMMITADJUST");
        ctl.tick().unwrap();
        let r = ctl.tick().unwrap();
        assert!(matches!(
            r.events[0],
            TickEvent::SetpointRejected { control_loop: 0, .. }
        ));
        assert_eq!(ctl.control_loop(0).unwrap().setpoint(), 44.0);
        assert_eq!(ctl.remote_adjust(0), Some(0.0));
    }

    #[test]
    fn adjust_applies_only_when_enabled() {
        let daq = ScriptedDaq::default();
        let mut ctl = controller(&daq);
        let v = volts_at(&ctl, 30.0);
        daq.set_inputs(vec![v, v]);
        let src = ScriptedSource::default();
        ctl.attach_source(0, Box::new(src.clone())).unwrap();
        src.push("2.0");
        ctl.tick().unwrap();
        assert!((daq.outputs()[0][0] - volts_at(&ctl, 30.0)).abs() < 1e-9);
        ctl.set_use_adjust(0, true).unwrap();
        ctl.tick().unwrap();
        assert!((daq.outputs()[1][0] - volts_at(&ctl, 32.0)).abs() < 1e-9);
    }

    #[test]
    fn digital_line_written_on_first_tick_and_changes() {
        let daq = ScriptedDaq::default();
        let mut ctl = controller(&daq);
        let v = volts_at(&ctl, 30.0);
        daq.set_inputs(vec![v, v]);
        ctl.tick().unwrap();
        ctl.tick().unwrap();
        assert_eq!(daq.digital_writes(), vec![(0, false)]);
        ctl.set_enable(0, true).unwrap();
        ctl.tick().unwrap();
        ctl.tick().unwrap();
        assert_eq!(daq.digital_writes(), vec![(0, false), (0, true)]);
    }

    #[test]
    fn read_failure_disables_every_loop() {
        let daq = ScriptedDaq::default();
        let mut ctl = controller(&daq);
        ctl.set_enable(0, true).unwrap();
        daq.fail_reads(true);
        assert!(matches!(ctl.tick(), Err(CombError::InstrumentIo(_))));
        assert!(!ctl.control_loop(0).unwrap().is_enabled());
        assert!(daq.outputs().is_empty());
    }

    #[test]
    fn write_failure_is_an_instrument_error() {
        let daq = ScriptedDaq::default();
        let mut ctl = controller(&daq);
        let v = volts_at(&ctl, 30.0);
        daq.set_inputs(vec![v, v]);
        daq.fail_writes(true);
        assert!(matches!(ctl.tick(), Err(CombError::InstrumentIo(_))));
        daq.fail_writes(false);
        ctl.tick().unwrap();
        assert_eq!(daq.digital_writes(), vec![(0, false)]);
    }

    #[test]
    fn short_read_is_a_fault() {
        let daq = ScriptedDaq::new(vec![1.0]);
        let mut ctl = controller(&daq);
        assert!(matches!(ctl.tick(), Err(CombError::InstrumentFault(_))));
    }

    #[test]
    fn unknown_loop_is_reported() {
        let daq = ScriptedDaq::default();
        let mut ctl = controller(&daq);
        assert_eq!(ctl.set_enable(4, true), Err(CombError::UnknownChannel(4)));
        assert_eq!(ctl.set_setpoint(4, 30.0), Err(CombError::UnknownChannel(4)));
    }
}
