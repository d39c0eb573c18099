//! Counter tick handler: round-robin measurement with laser and temperature feedback.
//!
//! Each tick collects the measurement armed on the previous tick, arms the next
//! active channel, and then runs logging and both feedbacks for the channel
//! that was read. Operator calls happen between ticks.

use std::time::Instant;

use combctl_traits::{Clock, DeviceError, FrequencyCounter, LineConnector, LineLink, ReferenceLaser};
use tracing::{debug, info, warn};

use crate::beat::BeatStats;
use crate::channel::Channel;
use crate::config::{CounterCfg, LaserActuator, LaserFeedbackCfg, TempFeedbackCfg};
use crate::error::{BuildError, CombError};
use crate::feedback::{
    COMMIT_ADJUST, LaserDecision, LaserFeedback, TempDecision, TemperatureFeedback, format_adjust,
};
use crate::freq_log::FrequencySink;
use crate::hw_error::map_hw_error;
use crate::scheduler::MeasurementScheduler;
use crate::status::{TickEvent, TickReport};
use crate::util::timer_period_ms;

/// Connector used until one is supplied; every connection attempt fails.
struct NoConnector;

impl LineConnector for NoConnector {
    fn connect(&mut self, port: u16) -> Result<Box<dyn LineLink>, DeviceError> {
        Err(format!("no line connector configured for port {port}").into())
    }
}

fn mapped(e: DeviceError) -> CombError {
    map_hw_error(e.as_ref())
}

pub struct CounterSession<C: FrequencyCounter, K: Clock> {
    counter: C,
    clock: K,
    epoch: Instant,
    gate_time_s: f64,

    channels: Vec<Channel>,
    scheduler: MeasurementScheduler,
    laser_feedback: LaserFeedback,
    temp_feedback: TemperatureFeedback,
    /// Shared across channels: only one channel drives the laser at a time.
    last_laser_feedback_ms: Option<u64>,

    laser: Option<Box<dyn ReferenceLaser>>,
    connector: Box<dyn LineConnector>,
    sink: Option<Box<dyn FrequencySink>>,
    beat: BeatStats,
    armed: bool,
}

impl<C: FrequencyCounter, K: Clock> CounterSession<C, K> {
    pub fn new(
        cfg: &CounterCfg,
        laser_cfg: LaserFeedbackCfg,
        temp_cfg: TempFeedbackCfg,
        counter: C,
        clock: K,
    ) -> Result<Self, BuildError> {
        if cfg.channels.is_empty() {
            return Err(BuildError::InvalidConfig("at least one channel is required".into()));
        }
        if !(cfg.gate_time_s.is_finite() && cfg.gate_time_s > 0.0) {
            return Err(BuildError::InvalidConfig(format!(
                "gate time must be > 0, got {}",
                cfg.gate_time_s
            )));
        }
        let laser_feedback = LaserFeedback::new(laser_cfg);
        let channels = cfg
            .channels
            .iter()
            .enumerate()
            .map(|(i, c)| Channel::new(i, c, laser_feedback.new_strike_counter(), cfg.log_period_ms))
            .collect::<Result<Vec<_>, _>>()?;
        let scheduler = MeasurementScheduler::new(channels.iter().map(Channel::is_active).collect());
        let epoch = clock.now();
        Ok(Self {
            counter,
            clock,
            epoch,
            gate_time_s: cfg.gate_time_s,
            channels,
            scheduler,
            laser_feedback,
            temp_feedback: TemperatureFeedback::new(temp_cfg),
            last_laser_feedback_ms: None,
            laser: None,
            connector: Box::new(NoConnector),
            sink: None,
            beat: BeatStats::new(),
            armed: false,
        })
    }

    pub fn with_connector(mut self, connector: Box<dyn LineConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn FrequencySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    fn channel_mut(&mut self, index: usize) -> Result<&mut Channel, CombError> {
        self.channels
            .get_mut(index)
            .ok_or(CombError::UnknownChannel(index))
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn beat(&self) -> &BeatStats {
        &self.beat
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }

    /// Tick period: 1.5 gate times, the fastest the counter can deliver.
    pub fn timer_period_ms(&self) -> u64 {
        timer_period_ms(self.gate_time_s)
    }

    /// `false` once every channel is inactive; the caller stops ticking.
    pub fn should_run(&self) -> bool {
        self.scheduler.any_active()
    }

    pub fn laser_connected(&self) -> bool {
        self.laser.is_some()
    }

    /// Arm the counter on the current channel. Call once before the first tick.
    pub fn start(&mut self) -> Result<(), CombError> {
        self.counter
            .set_gate_time(self.gate_time_s)
            .map_err(mapped)?;
        let index = self.scheduler.current();
        if self.scheduler.is_active(index) {
            self.arm(index)?;
        }
        info!(
            channels = self.channels.len(),
            period_ms = self.timer_period_ms(),
            "counter session started"
        );
        Ok(())
    }

    fn arm(&mut self, index: usize) -> Result<(), CombError> {
        let physical = self.channels[index].counter_channel();
        self.armed = false;
        self.counter.begin_measurement(physical).map_err(mapped)?;
        self.armed = true;
        Ok(())
    }

    /// Arm whatever channel the scheduler points at; a failed arm takes that channel out.
    fn arm_current(&mut self, events: &mut Vec<TickEvent>) {
        let mut attempts = self.channels.len();
        while attempts > 0 && self.scheduler.any_active() {
            attempts -= 1;
            let next = self.scheduler.current();
            if !self.scheduler.is_active(next) {
                self.scheduler.advance();
                continue;
            }
            match self.arm(next) {
                Ok(()) => return,
                Err(error) => {
                    warn!(channel = next, %error, "failed to arm counter");
                    self.deactivate(next);
                    events.push(TickEvent::ReadFailed {
                        channel: next,
                        error,
                    });
                    self.scheduler.advance();
                }
            }
        }
    }

    pub fn tick(&mut self) -> TickReport {
        let now = self.now_ms();
        let index = self.scheduler.current();
        let mut events = Vec::new();

        if !self.scheduler.is_active(index) || !self.armed {
            // Nothing valid to collect; arm the next active channel instead.
            self.arm_current(&mut events);
            return TickReport {
                index,
                frequency: None,
                events,
            };
        }

        self.scheduler.advance();
        let read = self.counter.get_result().map_err(mapped).and_then(|f| {
            if f.is_finite() {
                Ok(f)
            } else {
                Err(CombError::InstrumentIo(format!("non-finite reading {f}")))
            }
        });
        self.armed = false;

        let frequency = match read {
            Ok(f) => f,
            Err(error) => {
                warn!(channel = index, %error, "read failed; channel deactivated");
                self.deactivate(index);
                events.push(TickEvent::ReadFailed {
                    channel: index,
                    error,
                });
                self.arm_current(&mut events);
                return TickReport {
                    index,
                    frequency: None,
                    events,
                };
            }
        };

        self.channels[index].measured = Some(frequency);
        self.arm_current(&mut events);
        debug!(
            channel = index,
            frequency,
            error_hz = frequency - self.channels[index].target(),
            "measured"
        );

        if let [a, b, ..] = self.channels.as_slice()
            && let (Some(f0), Some(f1)) = (a.measured(), b.measured())
        {
            self.beat.update(f0, f1);
        }

        self.log_sample(index, frequency, now, &mut events);
        self.laser_step(index, frequency, now, &mut events);
        self.temp_step(index, frequency, now, &mut events);

        TickReport {
            index,
            frequency: Some(frequency),
            events,
        }
    }

    fn log_sample(&mut self, index: usize, frequency: f64, now: u64, events: &mut Vec<TickEvent>) {
        let ch = &mut self.channels[index];
        if !ch.logging_enabled || !ch.log_gate.should_log(now) {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let elapsed = ch.log_gate.elapsed_s(now);
        match sink.record(index, elapsed, frequency) {
            Ok(()) => {
                ch.log_gate.advance(now);
                events.push(TickEvent::Logged { channel: index });
            }
            Err(e) => {
                let error = mapped(e);
                warn!(channel = index, %error, "frequency log write failed; logging stopped");
                ch.logging_enabled = false;
                events.push(TickEvent::LogFailed {
                    channel: index,
                    error,
                });
            }
        }
    }

    fn laser_step(&mut self, index: usize, frequency: f64, now: u64, events: &mut Vec<TickEvent>) {
        if !self.channels[index].laser_feedback_enabled {
            return;
        }
        let elapsed = self.last_laser_feedback_ms.map(|t| now.saturating_sub(t));
        let target = self.channels[index].target();
        let decision = self.laser_feedback.evaluate(
            &mut self.channels[index].laser_strikes,
            frequency,
            target,
            elapsed,
        );
        match decision {
            LaserDecision::NotDue | LaserDecision::InBound => {}
            LaserDecision::Strike { strikes, detune_hz } => {
                warn!(
                    channel = index,
                    detune_hz,
                    allowed_hz = self.laser_feedback.cfg().allowed_detune_hz,
                    strikes,
                    limit = self.laser_feedback.cfg().strike_limit,
                    "frequency outside allowed detune; strike recorded"
                );
                events.push(TickEvent::LaserStrike {
                    channel: index,
                    strikes,
                    detune_hz,
                });
            }
            LaserDecision::Shutoff { detune_hz } => {
                warn!(channel = index, detune_hz, "strike limit exceeded; laser feedback disabled");
                self.clear_laser_flags();
                events.push(TickEvent::LaserFeedbackShutoff {
                    channel: index,
                    detune_hz,
                });
            }
            LaserDecision::Step { actuator, delta } => {
                let result = match self.laser.as_mut() {
                    None => Err(CombError::State("reference laser not connected".into())),
                    Some(laser) => {
                        let stepped = match actuator {
                            LaserActuator::Current => laser.change_current(delta),
                            LaserActuator::Temperature => laser.change_temperature(delta),
                        };
                        stepped.map_err(mapped)
                    }
                };
                match result {
                    Ok(new_value) => {
                        info!(channel = index, ?actuator, delta, new_value, "reference laser stepped");
                        events.push(TickEvent::LaserCorrection {
                            channel: index,
                            delta,
                            new_value,
                        });
                    }
                    Err(error) => {
                        warn!(channel = index, %error, "failed to communicate with reference laser; feedback disabled");
                        self.clear_laser_flags();
                        events.push(TickEvent::LaserWriteFailed {
                            channel: index,
                            error,
                        });
                    }
                }
            }
        }
        if decision.refreshes_timer() {
            self.last_laser_feedback_ms = Some(now);
        }
    }

    fn temp_step(&mut self, index: usize, frequency: f64, now: u64, events: &mut Vec<TickEvent>) {
        let ch = &mut self.channels[index];
        if !ch.temp_feedback_enabled {
            return;
        }
        let elapsed = ch.last_temp_feedback_ms.map(|t| now.saturating_sub(t));
        let target = ch.target();
        let TempDecision::Adjust { value, clamped } =
            self.temp_feedback
                .evaluate(&mut ch.cumulative_adjust, frequency, target, elapsed)
        else {
            return;
        };
        if clamped {
            warn!(channel = index, adjust = value, "temperature adjust at limit");
        }
        let sent = match ch.temp_link.as_mut() {
            Some(link) => link.send_line(&format_adjust(value)).map_err(mapped),
            None => Err(CombError::State("no temperature link".into())),
        };
        match sent {
            Ok(()) => {
                info!(channel = index, adjust = value, "temperature adjusted");
                ch.last_temp_feedback_ms = Some(now);
                events.push(TickEvent::TempAdjustSent {
                    channel: index,
                    value,
                    clamped,
                });
            }
            Err(error) => {
                warn!(
                    channel = index,
                    port = ch.temp_port(),
                    %error,
                    "unable to reach temperature controller; temperature feedback disabled"
                );
                ch.clear_temp_feedback();
                events.push(TickEvent::TempLinkFailed {
                    channel: index,
                    error,
                });
            }
        }
    }

    fn clear_laser_flags(&mut self) {
        for ch in &mut self.channels {
            ch.clear_laser_feedback();
        }
    }

    /// Take a channel out of the rotation along with its logging and feedbacks.
    fn deactivate(&mut self, index: usize) {
        self.stop_logging(index);
        let ch = &mut self.channels[index];
        ch.is_active = false;
        ch.clear_laser_feedback();
        ch.clear_temp_feedback();
        // Index is known valid here.
        let _ = self.scheduler.set_active(index, false);
    }

    fn stop_logging(&mut self, index: usize) {
        if !self.channels[index].logging_enabled {
            return;
        }
        self.channels[index].logging_enabled = false;
        if let Some(sink) = self.sink.as_mut()
            && let Err(e) = sink.stop(index)
        {
            warn!(channel = index, error = %mapped(e), "closing frequency log failed");
        }
        info!(channel = index, "logging stopped");
    }

    // ── Operator operations ──────────────────────────────────────────────────

    pub fn set_channel_active(&mut self, index: usize, active: bool) -> Result<(), CombError> {
        self.channel_mut(index)?;
        if active {
            self.channels[index].is_active = true;
            self.scheduler.set_active(index, true)?;
            info!(channel = index, "channel activated");
            // The activated channel is sampled next; any pending arm is discarded.
            self.arm(index)?;
        } else {
            let current = self.scheduler.current();
            self.deactivate(index);
            info!(channel = index, "channel deactivated");
            if current == index && self.scheduler.any_active() {
                self.scheduler.advance();
                let mut events = Vec::new();
                self.arm_current(&mut events);
            }
        }
        Ok(())
    }

    pub fn set_target(&mut self, index: usize, hz: f64) -> Result<(), CombError> {
        let ch = self.channel_mut(index)?;
        if let Err(e) = ch.set_target(hz) {
            warn!(channel = index, requested = hz, kept = ch.target(), "invalid target rejected");
            return Err(e);
        }
        info!(channel = index, target_hz = hz, "target set");
        Ok(())
    }

    /// Give `index` the reference laser. Clears the flag on every other channel.
    pub fn enable_laser_feedback(&mut self, index: usize) -> Result<(), CombError> {
        self.channel_mut(index)?;
        if self.laser.is_none() {
            return Err(CombError::State(
                "reference laser must be connected before enabling feedback".into(),
            ));
        }
        if !self.channels[index].is_active {
            return Err(CombError::State(format!("channel {index} is not active")));
        }
        self.clear_laser_flags();
        self.channels[index].laser_feedback_enabled = true;
        self.last_laser_feedback_ms = None;
        info!(channel = index, "feedback to reference laser enabled");
        Ok(())
    }

    pub fn disable_laser_feedback(&mut self, index: usize) -> Result<(), CombError> {
        self.channel_mut(index)?;
        self.clear_laser_flags();
        info!(channel = index, "feedback to reference laser disabled");
        Ok(())
    }

    /// Open the IPC link to the channel's temperature controller. On failure the
    /// feedback stays off.
    pub fn enable_temp_feedback(&mut self, index: usize) -> Result<(), CombError> {
        let port = self.channel_mut(index)?.temp_port();
        if !self.channels[index].is_active {
            return Err(CombError::State(format!("channel {index} is not active")));
        }
        match self.connector.connect(port) {
            Ok(link) => {
                let ch = &mut self.channels[index];
                ch.temp_link = Some(link);
                ch.temp_feedback_enabled = true;
                ch.last_temp_feedback_ms = None;
                info!(channel = index, port, "temperature controller connected; temperature feedback enabled");
                Ok(())
            }
            Err(e) => {
                let error = mapped(e);
                warn!(channel = index, port, %error, "no server detected; cannot start temperature feedback");
                self.channels[index].clear_temp_feedback();
                Err(error)
            }
        }
    }

    pub fn disable_temp_feedback(&mut self, index: usize) -> Result<(), CombError> {
        let ch = self.channel_mut(index)?;
        ch.clear_temp_feedback();
        info!(channel = index, "temperature feedback disabled");
        Ok(())
    }

    /// Ask the controller to fold the adjust into its setpoint, then stop
    /// feedback and zero the adjust whether or not the line got through.
    pub fn commit_to_temp_adjustment(&mut self, index: usize) -> Result<(), CombError> {
        let ch = self.channel_mut(index)?;
        if ch.temp_feedback_enabled
            && let Some(link) = ch.temp_link.as_mut()
        {
            let line = format!("{COMMIT_ADJUST}\n");
            match link.send_line(&line) {
                Ok(()) => info!(
                    channel = index,
                    adjust = ch.cumulative_adjust,
                    "temperature adjust committed to setpoint"
                ),
                Err(e) => warn!(
                    channel = index,
                    port = ch.temp_port(),
                    error = %mapped(e),
                    "unable to reach temperature controller for commit"
                ),
            }
        }
        ch.clear_temp_feedback();
        Ok(())
    }

    /// Port used the next time temperature feedback is enabled.
    pub fn set_temp_port(&mut self, index: usize, port: u16) -> Result<(), CombError> {
        if port == 0 {
            return Err(CombError::ValidationRejected {
                value: 0.0,
                min: 1.0,
                max: f64::from(u16::MAX),
            });
        }
        self.channel_mut(index)?.set_temp_port(port);
        Ok(())
    }

    pub fn connect_laser(&mut self, laser: Box<dyn ReferenceLaser>) {
        self.laser = Some(laser);
        info!("reference laser connected");
    }

    /// Release the laser. Every laser-feedback flag is cleared first.
    pub fn disconnect_laser(&mut self) -> Option<Box<dyn ReferenceLaser>> {
        self.clear_laser_flags();
        let laser = self.laser.take();
        if laser.is_some() {
            info!("reference laser disconnected");
        }
        laser
    }

    /// Clear every laser-feedback flag and restore the laser's power-on set-points.
    pub fn reset_laser(&mut self) -> Result<(), CombError> {
        let Some(laser) = self.laser.as_mut() else {
            return Err(CombError::State("reference laser not connected".into()));
        };
        for ch in &mut self.channels {
            ch.clear_laser_feedback();
        }
        laser.restore_defaults().map_err(mapped)?;
        info!("reference laser restored to defaults");
        Ok(())
    }

    /// Thermistor set-point of the reference laser, in ohms.
    pub fn laser_temperature(&mut self) -> Result<u64, CombError> {
        let Some(laser) = self.laser.as_mut() else {
            return Err(CombError::State("reference laser not connected".into()));
        };
        laser.temperature().map_err(mapped)
    }

    /// Write the laser's thermistor set-point. Range checks are the laser driver's.
    pub fn set_laser_temperature(&mut self, ohms: u64) -> Result<(), CombError> {
        let Some(laser) = self.laser.as_mut() else {
            return Err(CombError::State("reference laser not connected".into()));
        };
        if let Err(e) = laser.set_temperature(ohms).map_err(mapped) {
            warn!(requested = ohms, error = %e, "laser temperature not set");
            return Err(e);
        }
        info!(temp_ohms = ohms, "laser temperature set");
        Ok(())
    }

    pub fn laser_feedback_cfg(&self) -> &LaserFeedbackCfg {
        self.laser_feedback.cfg()
    }

    pub fn temp_feedback_cfg(&self) -> &TempFeedbackCfg {
        self.temp_feedback.cfg()
    }

    /// Retune laser feedback. A rejected config leaves the running one in place;
    /// an accepted one restarts every channel's strike count.
    pub fn set_laser_feedback_cfg(&mut self, cfg: LaserFeedbackCfg) -> Result<(), CombError> {
        if let Err(e) = cfg.validate() {
            warn!(error = %e, "laser feedback parameters rejected");
            return Err(e);
        }
        info!(
            period_ms = cfg.period_ms,
            threshold_hz = cfg.threshold_hz,
            allowed_detune_hz = cfg.allowed_detune_hz,
            "laser feedback parameters updated"
        );
        self.laser_feedback = LaserFeedback::new(cfg);
        for ch in &mut self.channels {
            ch.laser_strikes = self.laser_feedback.new_strike_counter();
        }
        Ok(())
    }

    /// Retune temperature feedback. Cumulative adjusts are kept; a smaller
    /// `max_adjust` takes effect on the next adjust.
    pub fn set_temp_feedback_cfg(&mut self, cfg: TempFeedbackCfg) -> Result<(), CombError> {
        if let Err(e) = cfg.validate() {
            warn!(error = %e, "temperature feedback parameters rejected");
            return Err(e);
        }
        info!(
            period_ms = cfg.period_ms,
            threshold_hz = cfg.threshold_hz,
            step = cfg.step,
            "temperature feedback parameters updated"
        );
        self.temp_feedback = TemperatureFeedback::new(cfg);
        Ok(())
    }

    pub fn enable_logging(&mut self, index: usize, enable: bool) -> Result<(), CombError> {
        self.channel_mut(index)?;
        if !enable {
            self.stop_logging(index);
            return Ok(());
        }
        if !self.channels[index].is_active {
            return Err(CombError::State(format!("channel {index} is not active")));
        }
        let now = self.now_ms();
        let Some(sink) = self.sink.as_mut() else {
            return Err(CombError::State("no frequency log sink configured".into()));
        };
        if self.channels[index].logging_enabled {
            // Restart: close the previous stream before opening a new one.
            if let Err(e) = sink.stop(index) {
                warn!(channel = index, error = %mapped(e), "closing frequency log failed");
            }
        }
        let ch = &mut self.channels[index];
        sink.start(index, ch.name()).map_err(mapped)?;
        ch.logging_enabled = true;
        ch.log_gate.start(now);
        info!(channel = index, "logging started");
        Ok(())
    }

    /// Toggle logging on every active channel. Stops at the first failure.
    pub fn enable_all_logs(&mut self, enable: bool) -> Result<(), CombError> {
        for index in 0..self.channels.len() {
            if self.channels[index].is_active {
                self.enable_logging(index, enable)?;
            }
        }
        Ok(())
    }

    pub fn reset_beat_stats(&mut self) {
        self.beat.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{RecordingConnector, ScriptedCounter, ScriptedLaser};
    use combctl_traits::clock::test_clock::TestClock;

    fn session(
        readings: Vec<Result<f64, &'static str>>,
    ) -> CounterSession<ScriptedCounter, TestClock> {
        let mut cfg = CounterCfg::default();
        cfg.channels.truncate(1);
        let mut s = CounterSession::new(
            &cfg,
            LaserFeedbackCfg::default(),
            TempFeedbackCfg::default(),
            ScriptedCounter::new(readings),
            TestClock::new(),
        )
        .unwrap();
        s.start().unwrap();
        s
    }

    #[test]
    fn tick_reads_and_rearms() {
        let mut s = session(vec![Ok(199_869_970.0), Ok(199_869_971.0)]);
        let r = s.tick();
        assert_eq!(r.index, 0);
        assert_eq!(r.frequency, Some(199_869_970.0));
        assert_eq!(s.counter().armed(), vec![1, 1]);
        assert_eq!(s.channel(0).unwrap().measured(), Some(199_869_970.0));
    }

    #[test]
    fn read_failure_deactivates_channel() {
        let mut s = session(vec![Err("no signal")]);
        s.enable_laser_feedback(0).unwrap_err();
        s.connect_laser(Box::new(ScriptedLaser::default()));
        s.enable_laser_feedback(0).unwrap();
        let r = s.tick();
        assert!(matches!(r.events[0], TickEvent::ReadFailed { channel: 0, .. }));
        let ch = s.channel(0).unwrap();
        assert!(!ch.is_active());
        assert!(!ch.laser_feedback_enabled());
        assert!(!s.should_run());
    }

    #[test]
    fn laser_feedback_is_exclusive() {
        let mut s = CounterSession::new(
            &CounterCfg::default(),
            LaserFeedbackCfg::default(),
            TempFeedbackCfg::default(),
            ScriptedCounter::new(vec![]),
            TestClock::new(),
        )
        .unwrap();
        s.connect_laser(Box::new(ScriptedLaser::default()));
        s.enable_laser_feedback(0).unwrap();
        s.enable_laser_feedback(1).unwrap();
        assert!(!s.channel(0).unwrap().laser_feedback_enabled());
        assert!(s.channel(1).unwrap().laser_feedback_enabled());
        assert!(s.disconnect_laser().is_some());
        assert!(!s.channel(1).unwrap().laser_feedback_enabled());
    }

    #[test]
    fn temp_feedback_needs_a_server() {
        let mut s = session(vec![]);
        let err = s.enable_temp_feedback(0).unwrap_err();
        assert!(matches!(err, CombError::InstrumentIo(_)));
        assert!(!s.channel(0).unwrap().temp_feedback_enabled());

        let connector = RecordingConnector::default();
        let mut s = session(vec![]).with_connector(Box::new(connector.clone()));
        s.enable_temp_feedback(0).unwrap();
        s.commit_to_temp_adjustment(0).unwrap();
        assert_eq!(connector.lines(60002), vec!["COMMITADJUST\n".to_string()]);
        assert!(!s.channel(0).unwrap().temp_feedback_enabled());
        assert_eq!(s.channel(0).unwrap().cumulative_adjust(), 0.0);
    }

    #[test]
    fn unknown_channel_is_reported() {
        let mut s = session(vec![]);
        assert_eq!(s.set_target(9, 200e6), Err(CombError::UnknownChannel(9)));
        assert_eq!(
            s.set_channel_active(9, true),
            Err(CombError::UnknownChannel(9))
        );
    }

    #[test]
    fn tick_period_follows_gate_time() {
        let s = session(vec![]);
        assert_eq!(s.timer_period_ms(), 150);
    }
}
