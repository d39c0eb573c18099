use combctl_core::mocks::{ScriptedCounter, ScriptedDaq};
use combctl_core::{build_counter_session, build_temperature_controller};
use combctl_traits::clock::test_clock::TestClock;

const LAB: &str = r#"
[counter]
gate_time_s = 0.5

[[channels]]
name = "comb 1"
counter_channel = 1
target_hz = 199869965.598
target_min_hz = 199e6
target_max_hz = 201e6
temp_port = 60002

[[channels]]
name = "comb 2"
counter_channel = 2
counter = "economical"
active = false
target_hz = 199870591.41
target_min_hz = 199e6
target_max_hz = 201e6
temp_port = 60003

[daq]
period_ms = 500

[[daq.loops]]
name = "Oscillator"
steinhart = [1.129148e-3, 2.34125e-4, 8.76741e-8]
bias_current = 100e-6
temperature_default = 31.0
temperature_min = 15.0
temperature_max = 45.0
adjust_port = 60002
"#;

#[test]
fn sessions_build_from_config() {
    let cfg: combctl_config::Config = toml::from_str(LAB).unwrap();
    cfg.validate().unwrap();

    let s = build_counter_session(&cfg, ScriptedCounter::new(vec![]), TestClock::new()).unwrap();
    assert_eq!(s.timer_period_ms(), 750);
    assert_eq!(s.channels().len(), 2);
    assert!(!s.channel(1).unwrap().is_active());

    let daq = ScriptedDaq::default();
    let ctl = build_temperature_controller(&cfg, daq.analog_in(), daq.analog_out(), daq.digital_out())
        .unwrap();
    assert_eq!(ctl.loop_count(), 1);
    assert_eq!(ctl.period_ms(), 500);
    assert_eq!(ctl.control_loop(0).unwrap().setpoint(), 31.0);
    assert_eq!(ctl.control_loop(0).unwrap().adjust_port(), Some(60002));
}

#[test]
fn bad_loop_surfaces_as_report() {
    let mut cfg: combctl_config::Config = toml::from_str(LAB).unwrap();
    cfg.daq.loops[0].den = vec![0.0];
    let daq = ScriptedDaq::default();
    let err = build_temperature_controller(&cfg, daq.analog_in(), daq.analog_out(), daq.digital_out())
        .err()
        .unwrap();
    let chain = format!("{err:#}");
    assert!(chain.contains("building temperature controller"), "{chain}");
    assert!(chain.contains("a0 must be non-zero"), "{chain}");
}
