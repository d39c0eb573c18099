use std::time::Duration;

use combctl_core::config::{CounterCfg, LaserActuator, LaserFeedbackCfg, TempFeedbackCfg};
use combctl_core::freq_log::FrequencySink;
use combctl_core::mocks::{RecordingConnector, ScriptedCounter, ScriptedLaser};
use combctl_core::mocks::{OrionRegisters, SimulatedOrionLink};
use combctl_core::orion::OrionLaser;
use combctl_core::{CombError, CounterSession, TickEvent};
use rstest::rstest;
use combctl_traits::DeviceError;
use combctl_traits::clock::test_clock::TestClock;
use std::sync::{Arc, Mutex};

const TARGET: f64 = 199_869_965.598;

fn one_channel_session(
    readings: Vec<Result<f64, &'static str>>,
    laser_cfg: LaserFeedbackCfg,
) -> (CounterSession<ScriptedCounter, TestClock>, TestClock) {
    let mut cfg = CounterCfg::default();
    cfg.channels.truncate(1);
    let clock = TestClock::new();
    let mut s = CounterSession::new(
        &cfg,
        laser_cfg,
        TempFeedbackCfg::default(),
        ScriptedCounter::new(readings),
        clock.clone(),
    )
    .unwrap();
    s.start().unwrap();
    (s, clock)
}

#[test]
fn laser_feedback_strikes_then_shuts_off() {
    let readings = [199_869_966.0, 199_870_100.0, 199_870_100.0, 199_870_100.0, 199_870_100.0];
    let (mut s, clock) = one_channel_session(
        readings.iter().map(|f| Ok(*f)).collect(),
        LaserFeedbackCfg::default(),
    );
    let laser = ScriptedLaser::default();
    s.connect_laser(Box::new(laser.clone()));
    s.enable_laser_feedback(0).unwrap();

    let mut per_tick = Vec::new();
    for _ in 0..readings.len() {
        per_tick.push(s.tick().events);
        clock.advance(Duration::from_millis(2_100));
    }

    // |dF| = 0.4 Hz: inside the threshold, nothing happens.
    assert!(per_tick[0].is_empty());
    for (tick, strikes) in [(1, 1), (2, 2), (3, 3)] {
        assert!(matches!(
            per_tick[tick][..],
            [TickEvent::LaserStrike { channel: 0, strikes: n, .. }] if n == strikes
        ));
    }
    assert!(matches!(
        per_tick[4][..],
        [TickEvent::LaserFeedbackShutoff { channel: 0, .. }]
    ));
    let ch = s.channel(0).unwrap();
    assert!(!ch.laser_feedback_enabled());
    assert_eq!(ch.laser_strikes(), 0);
    assert!(laser.steps().is_empty());
}

#[test]
fn laser_feedback_steps_once_per_period() {
    let (mut s, clock) = one_channel_session(
        vec![Ok(TARGET + 20.0), Ok(TARGET + 20.0), Ok(TARGET - 20.0)],
        LaserFeedbackCfg::default(),
    );
    let laser = ScriptedLaser::new(1000, 10_000);
    s.connect_laser(Box::new(laser.clone()));
    s.enable_laser_feedback(0).unwrap();

    let first = s.tick();
    assert_eq!(
        first.events,
        vec![TickEvent::LaserCorrection {
            channel: 0,
            delta: -1,
            new_value: 999
        }]
    );
    clock.advance(Duration::from_millis(150));
    assert!(s.tick().events.is_empty(), "period not elapsed");
    clock.advance(Duration::from_millis(2_000));
    s.tick();
    assert_eq!(
        laser.steps(),
        vec![(LaserActuator::Current, -1), (LaserActuator::Current, 1)]
    );
    assert_eq!(laser.current(), 1000);
}

#[test]
fn temperature_actuator_lowers_setpoint_when_fast() {
    let cfg = LaserFeedbackCfg {
        actuator: LaserActuator::Temperature,
        ..LaserFeedbackCfg::default()
    };
    let (mut s, _clock) = one_channel_session(vec![Ok(TARGET + 50.0)], cfg);
    let laser = ScriptedLaser::new(1000, 10_000);
    s.connect_laser(Box::new(laser.clone()));
    s.enable_laser_feedback(0).unwrap();
    s.tick();
    assert_eq!(laser.steps(), vec![(LaserActuator::Temperature, -1)]);
    assert_eq!(laser.temperature(), 9_999);
}

#[test]
fn laser_write_failure_disables_feedback() {
    let (mut s, _clock) =
        one_channel_session(vec![Ok(TARGET + 50.0)], LaserFeedbackCfg::default());
    let laser = ScriptedLaser::default();
    laser.set_failing(true);
    s.connect_laser(Box::new(laser));
    s.enable_laser_feedback(0).unwrap();
    let r = s.tick();
    assert!(matches!(
        r.events[..],
        [TickEvent::LaserWriteFailed { channel: 0, .. }]
    ));
    assert!(!s.channel(0).unwrap().laser_feedback_enabled());
    assert!(s.channel(0).unwrap().is_active(), "the channel keeps measuring");
}

#[test]
fn temperature_adjust_saturates_at_exactly_five() {
    let ticks = 70;
    let (s, clock) = one_channel_session(
        vec![Ok(TARGET + 500.0); ticks],
        LaserFeedbackCfg::default(),
    );
    let connector = RecordingConnector::default();
    let mut s = s.with_connector(Box::new(connector.clone()));
    s.enable_temp_feedback(0).unwrap();

    let mut clamped_events = 0;
    for _ in 0..ticks {
        for e in s.tick().events {
            if let TickEvent::TempAdjustSent { clamped: true, .. } = e {
                clamped_events += 1;
            }
        }
        clock.advance(Duration::from_millis(10_000));
    }

    let lines = connector.lines(60_002);
    assert_eq!(lines.len(), ticks);
    assert_eq!(lines[0], "0.080000\n");
    assert_eq!(lines.last().map(String::as_str), Some("5.000000\n"));
    assert_eq!(s.channel(0).unwrap().cumulative_adjust(), 5.0);
    // 0.08 * 62 = 4.96, so the 63rd and later adjusts hit the limit.
    assert_eq!(clamped_events, ticks - 62);
}

#[test]
fn broken_temperature_link_disables_feedback() {
    let (s, _clock) = one_channel_session(vec![Ok(TARGET - 500.0)], LaserFeedbackCfg::default());
    let connector = RecordingConnector::default();
    let mut s = s.with_connector(Box::new(connector.clone()));
    s.enable_temp_feedback(0).unwrap();
    connector.break_link(60_002);
    let r = s.tick();
    assert!(matches!(
        r.events[..],
        [TickEvent::TempLinkFailed { channel: 0, .. }]
    ));
    let ch = s.channel(0).unwrap();
    assert!(!ch.temp_feedback_enabled());
    assert_eq!(ch.cumulative_adjust(), 0.0);
}

#[test]
fn refused_connection_leaves_feedback_off() {
    let (s, _clock) = one_channel_session(vec![], LaserFeedbackCfg::default());
    let connector = RecordingConnector::default();
    connector.refuse(60_002);
    let mut s = s.with_connector(Box::new(connector));
    assert!(s.enable_temp_feedback(0).is_err());
    assert!(!s.channel(0).unwrap().temp_feedback_enabled());
}

#[derive(Clone, Default)]
struct MemorySink(Arc<Mutex<Vec<(usize, f64, f64)>>>);

impl FrequencySink for MemorySink {
    fn start(&mut self, _channel: usize, _name: &str) -> Result<(), DeviceError> {
        Ok(())
    }
    fn record(&mut self, channel: usize, elapsed_s: f64, hz: f64) -> Result<(), DeviceError> {
        self.0.lock().unwrap().push((channel, elapsed_s, hz));
        Ok(())
    }
    fn stop(&mut self, _channel: usize) -> Result<(), DeviceError> {
        Ok(())
    }
}

#[test]
fn logging_is_paced_by_log_period() {
    let (s, clock) = one_channel_session(vec![Ok(TARGET); 8], LaserFeedbackCfg::default());
    let sink = MemorySink::default();
    let mut s = s.with_sink(Box::new(sink.clone()));
    s.enable_logging(0, true).unwrap();
    for _ in 0..8 {
        s.tick();
        clock.advance(Duration::from_millis(300));
    }
    let rows = sink.0.lock().unwrap().clone();
    // Ticks at 0, 300, .., 2100 ms with a 1000 ms period: 0, 1200, 2100.
    let times: Vec<f64> = rows.iter().map(|r| r.1).collect();
    assert_eq!(times, vec![0.0, 1.2, 2.1]);
    assert!(rows.iter().all(|r| r.0 == 0 && r.2 == TARGET));
}

#[test]
fn beat_follows_both_channels() {
    let f0 = 199_869_965.0;
    let f1 = 199_870_591.0;
    let clock = TestClock::new();
    let mut s = CounterSession::new(
        &CounterCfg::default(),
        LaserFeedbackCfg::default(),
        TempFeedbackCfg::default(),
        ScriptedCounter::new(vec![Ok(f0), Ok(f1), Ok(f0), Ok(f1)]),
        clock,
    )
    .unwrap();
    s.start().unwrap();
    let order: Vec<usize> = (0..4).map(|_| s.tick().index).collect();
    assert_eq!(order, vec![0, 1, 0, 1]);
    assert_eq!(s.counter().armed(), vec![1, 2, 1, 2, 1]);
    assert_eq!(s.beat().delta_f(), f1 - f0);
    assert_eq!(s.beat().samples(), 3);
}

#[test]
fn retuned_threshold_applies_on_next_tick() {
    let (mut s, clock) = one_channel_session(
        vec![Ok(TARGET + 20.0), Ok(TARGET + 20.0)],
        LaserFeedbackCfg::default(),
    );
    let laser = ScriptedLaser::default();
    s.connect_laser(Box::new(laser.clone()));
    s.enable_laser_feedback(0).unwrap();
    s.tick();
    assert_eq!(laser.steps(), vec![(LaserActuator::Current, -1)]);

    s.set_laser_feedback_cfg(LaserFeedbackCfg {
        threshold_hz: 50.0,
        period_ms: 500,
        ..LaserFeedbackCfg::default()
    })
    .unwrap();
    clock.advance(Duration::from_millis(600));
    assert!(s.tick().events.is_empty());
    assert_eq!(laser.steps().len(), 1);
    assert_eq!(s.laser_feedback_cfg().threshold_hz, 50.0);
}

#[test]
fn retune_restarts_strike_count() {
    let (mut s, clock) = one_channel_session(
        vec![Ok(TARGET + 500.0), Ok(TARGET + 500.0), Ok(TARGET + 500.0)],
        LaserFeedbackCfg::default(),
    );
    s.connect_laser(Box::new(ScriptedLaser::default()));
    s.enable_laser_feedback(0).unwrap();
    s.tick();
    clock.advance(Duration::from_millis(2_100));
    s.tick();
    assert_eq!(s.channel(0).unwrap().laser_strikes(), 2);

    s.set_laser_feedback_cfg(LaserFeedbackCfg::default()).unwrap();
    assert_eq!(s.channel(0).unwrap().laser_strikes(), 0);
    clock.advance(Duration::from_millis(2_100));
    assert!(matches!(
        s.tick().events[..],
        [TickEvent::LaserStrike { strikes: 1, .. }]
    ));
}

#[rstest]
#[case::zero_period(LaserFeedbackCfg { period_ms: 0, ..LaserFeedbackCfg::default() })]
#[case::negative_threshold(LaserFeedbackCfg { threshold_hz: -1.0, ..LaserFeedbackCfg::default() })]
#[case::nan_detune(LaserFeedbackCfg { allowed_detune_hz: f64::NAN, ..LaserFeedbackCfg::default() })]
#[case::no_strikes(LaserFeedbackCfg { strike_limit: 0, ..LaserFeedbackCfg::default() })]
fn rejected_laser_retune_keeps_previous_config(#[case] cfg: LaserFeedbackCfg) {
    let (mut s, _clock) = one_channel_session(vec![], LaserFeedbackCfg::default());
    assert!(matches!(
        s.set_laser_feedback_cfg(cfg),
        Err(CombError::ValidationRejected { .. })
    ));
    assert_eq!(s.laser_feedback_cfg().period_ms, 2_000);
    assert_eq!(s.laser_feedback_cfg().threshold_hz, 5.0);
    assert_eq!(s.laser_feedback_cfg().strike_limit, 3);
}

#[rstest]
#[case::zero_period(TempFeedbackCfg { period_ms: 0, ..TempFeedbackCfg::default() })]
#[case::negative_threshold(TempFeedbackCfg { threshold_hz: -0.5, ..TempFeedbackCfg::default() })]
#[case::zero_step(TempFeedbackCfg { step: 0.0, ..TempFeedbackCfg::default() })]
fn rejected_temperature_retune_keeps_previous_config(#[case] cfg: TempFeedbackCfg) {
    let (mut s, _clock) = one_channel_session(vec![], LaserFeedbackCfg::default());
    assert!(s.set_temp_feedback_cfg(cfg).is_err());
    assert_eq!(s.temp_feedback_cfg().period_ms, 10_000);
    assert_eq!(s.temp_feedback_cfg().step, 0.08);
}

#[test]
fn retuned_temperature_step_is_sent() {
    let (s, clock) = one_channel_session(
        vec![Ok(TARGET + 500.0), Ok(TARGET + 500.0)],
        LaserFeedbackCfg::default(),
    );
    let connector = RecordingConnector::default();
    let mut s = s.with_connector(Box::new(connector.clone()));
    s.enable_temp_feedback(0).unwrap();
    s.tick();
    s.set_temp_feedback_cfg(TempFeedbackCfg {
        step: 0.5,
        period_ms: 1_000,
        ..TempFeedbackCfg::default()
    })
    .unwrap();
    clock.advance(Duration::from_millis(1_000));
    s.tick();
    assert_eq!(connector.lines(60_002), vec!["0.080000\n", "0.580000\n"]);
}

#[test]
fn laser_temperature_goes_through_the_session() {
    let (mut s, _clock) = one_channel_session(vec![], LaserFeedbackCfg::default());
    assert!(matches!(s.laser_temperature(), Err(CombError::State(_))));
    assert!(matches!(s.set_laser_temperature(9_000), Err(CombError::State(_))));

    let laser = ScriptedLaser::new(1000, 10_000);
    s.connect_laser(Box::new(laser.clone()));
    assert_eq!(s.laser_temperature().unwrap(), 10_000);
    s.set_laser_temperature(9_500).unwrap();
    assert_eq!(laser.temperature(), 9_500);
}

#[test]
fn out_of_range_laser_temperature_is_rejected() {
    let (mut s, _clock) = one_channel_session(vec![], LaserFeedbackCfg::default());
    let link = SimulatedOrionLink::new(OrionRegisters::default());
    let laser = OrionLaser::connect(link.clone(), "sim").unwrap();
    s.connect_laser(Box::new(laser));
    assert_eq!(
        s.set_laser_temperature(20_000),
        Err(CombError::ValidationRejected {
            value: 20_000.0,
            min: 6_500.0,
            max: 15_000.0
        })
    );
    assert_eq!(link.registers().volatile_temp, 10_000);
    s.set_laser_temperature(12_000).unwrap();
    assert_eq!(s.laser_temperature().unwrap(), 12_000);
}

#[derive(Clone, Default)]
struct StubbornSink(Arc<Mutex<u32>>);

impl FrequencySink for StubbornSink {
    fn start(&mut self, _channel: usize, _name: &str) -> Result<(), DeviceError> {
        *self.0.lock().unwrap() += 1;
        Ok(())
    }
    fn record(&mut self, _channel: usize, _elapsed_s: f64, _hz: f64) -> Result<(), DeviceError> {
        Ok(())
    }
    fn stop(&mut self, _channel: usize) -> Result<(), DeviceError> {
        Err("file already closed".into())
    }
}

#[test]
fn restarting_a_log_survives_a_failed_close() {
    let (s, _clock) = one_channel_session(vec![], LaserFeedbackCfg::default());
    let sink = StubbornSink::default();
    let mut s = s.with_sink(Box::new(sink.clone()));
    s.enable_logging(0, true).unwrap();
    s.enable_logging(0, true).unwrap();
    assert_eq!(*sink.0.lock().unwrap(), 2);
    assert!(s.channel(0).unwrap().logging_enabled());
}
