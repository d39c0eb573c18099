//! Per-comb measurement state owned by `CounterSession`.

use crate::config::ChannelCfg;
use crate::error::{BuildError, CombError};
use crate::freq_log::FrequencyLogGate;
use crate::limits::Limits;
use crate::safety::StrikeCounter;
use combctl_traits::LineLink;

pub struct Channel {
    index: usize,
    name: String,
    counter_channel: u8,
    pub(crate) is_active: bool,
    pub(crate) measured: Option<f64>,
    target: f64,
    target_limits: Limits,

    pub(crate) laser_feedback_enabled: bool,
    pub(crate) laser_strikes: StrikeCounter,

    pub(crate) temp_feedback_enabled: bool,
    pub(crate) cumulative_adjust: f64,
    /// `None` until the first adjust after enabling, so that one is due at once.
    pub(crate) last_temp_feedback_ms: Option<u64>,
    temp_port: u16,
    pub(crate) temp_link: Option<Box<dyn LineLink>>,

    pub(crate) logging_enabled: bool,
    pub(crate) log_gate: FrequencyLogGate,
}

impl Channel {
    pub fn new(
        index: usize,
        cfg: &ChannelCfg,
        strikes: StrikeCounter,
        log_period_ms: u64,
    ) -> Result<Self, BuildError> {
        let target_limits = Limits::new(cfg.target_min_hz, cfg.target_max_hz)?;
        if !target_limits.contains(cfg.target_hz) {
            return Err(BuildError::InvalidConfig(format!(
                "{}: target {} Hz outside [{}, {}]",
                cfg.name, cfg.target_hz, cfg.target_min_hz, cfg.target_max_hz
            )));
        }
        Ok(Self {
            index,
            name: cfg.name.clone(),
            counter_channel: cfg.counter_channel,
            is_active: cfg.active,
            measured: None,
            target: cfg.target_hz,
            target_limits,
            laser_feedback_enabled: false,
            laser_strikes: strikes,
            temp_feedback_enabled: false,
            cumulative_adjust: 0.0,
            last_temp_feedback_ms: None,
            temp_port: cfg.temp_port,
            temp_link: None,
            logging_enabled: false,
            log_gate: FrequencyLogGate::new(log_period_ms),
        })
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn counter_channel(&self) -> u8 {
        self.counter_channel
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Last measured frequency, Hz.
    #[inline]
    pub fn measured(&self) -> Option<f64> {
        self.measured
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn target_limits(&self) -> Limits {
        self.target_limits
    }

    /// Measured minus target, once a measurement exists.
    pub fn error_hz(&self) -> Option<f64> {
        self.measured.map(|m| m - self.target)
    }

    /// Accept a new target or leave the old one; the error carries the rejected value.
    pub fn set_target(&mut self, hz: f64) -> Result<(), CombError> {
        self.target = self.target_limits.check(hz)?;
        Ok(())
    }

    #[inline]
    pub fn laser_feedback_enabled(&self) -> bool {
        self.laser_feedback_enabled
    }

    pub fn laser_strikes(&self) -> u32 {
        self.laser_strikes.strikes()
    }

    #[inline]
    pub fn temp_feedback_enabled(&self) -> bool {
        self.temp_feedback_enabled
    }

    #[inline]
    pub fn cumulative_adjust(&self) -> f64 {
        self.cumulative_adjust
    }

    #[inline]
    pub fn temp_port(&self) -> u16 {
        self.temp_port
    }

    pub(crate) fn set_temp_port(&mut self, port: u16) {
        self.temp_port = port;
    }

    #[inline]
    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    pub(crate) fn clear_laser_feedback(&mut self) {
        self.laser_feedback_enabled = false;
        self.laser_strikes.reset();
    }

    /// Drops the link and forgets the adjust that was sent over it.
    pub(crate) fn clear_temp_feedback(&mut self) {
        self.temp_feedback_enabled = false;
        self.temp_link = None;
        self.cumulative_adjust = 0.0;
        self.last_temp_feedback_ms = None;
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("counter_channel", &self.counter_channel)
            .field("is_active", &self.is_active)
            .field("measured", &self.measured)
            .field("target", &self.target)
            .field("laser_feedback_enabled", &self.laser_feedback_enabled)
            .field("temp_feedback_enabled", &self.temp_feedback_enabled)
            .field("cumulative_adjust", &self.cumulative_adjust)
            .field("logging_enabled", &self.logging_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::StrikePolicy;

    fn cfg() -> ChannelCfg {
        ChannelCfg {
            name: "comb 1".into(),
            counter_channel: 1,
            active: true,
            target_hz: 199_869_965.598,
            target_min_hz: 199.0e6,
            target_max_hz: 201.0e6,
            temp_port: 60002,
        }
    }

    fn channel() -> Channel {
        Channel::new(0, &cfg(), StrikeCounter::new(3, StrikePolicy::Exceeds), 1000).unwrap()
    }

    #[test]
    fn rejected_target_keeps_previous() {
        let mut ch = channel();
        let err = ch.set_target(1.0e9).unwrap_err();
        assert_eq!(
            err,
            CombError::ValidationRejected {
                value: 1.0e9,
                min: 199.0e6,
                max: 201.0e6
            }
        );
        assert_eq!(ch.target(), 199_869_965.598);
        ch.set_target(200.0e6).unwrap();
        assert_eq!(ch.target(), 200.0e6);
    }

    #[test]
    fn error_needs_a_measurement() {
        let mut ch = channel();
        assert_eq!(ch.error_hz(), None);
        ch.measured = Some(199_869_975.598);
        assert!((ch.error_hz().unwrap() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn target_outside_limits_fails_to_build() {
        let mut c = cfg();
        c.target_hz = 10.0;
        assert!(matches!(
            Channel::new(0, &c, StrikeCounter::new(3, StrikePolicy::Exceeds), 1000),
            Err(BuildError::InvalidConfig(_))
        ));
    }
}
