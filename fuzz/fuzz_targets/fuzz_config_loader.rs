#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    let Ok(cfg) = combctl_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    // A validated config must convert and build without panicking.
    let daq = combctl_core::TemperatureControllerCfg::from(&cfg.daq);
    for l in &daq.loops {
        let _ = combctl_core::control_loop::ControlLoop::new(l);
    }
    let counter = combctl_core::CounterCfg::from(&cfg);
    assert_eq!(counter.channels.len(), cfg.channels.len());
});
