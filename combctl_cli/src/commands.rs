//! Subcommand handlers. Each returns `eyre::Result` and leaves error
//! presentation to `main`.

use crate::devices;
use crate::freq_csv::CsvFrequencySink;
use crate::report;
use combctl_config::Config;
use combctl_core::hw_error::map_hw_error;
use combctl_core::orion::Command;
use combctl_core::runner::{self, RunLimits};
use combctl_hardware::{LineServer, TcpConnector};
use combctl_traits::MonotonicClock;
use eyre::{WrapErr, eyre};
use serde_json::json;
use std::sync::atomic::AtomicBool;

pub fn counter(
    cfg: &Config,
    ticks: Option<u64>,
    laser_feedback: Option<usize>,
    temp_feedback: Option<usize>,
    shutdown: &AtomicBool,
    json_out: bool,
) -> eyre::Result<()> {
    let bank = devices::counter(cfg)?;
    let mut session = combctl_core::build_counter_session(cfg, bank, MonotonicClock::new())?
        .with_connector(Box::new(TcpConnector::default()));
    if let Some(dir) = cfg.logging.freq_log_dir.as_deref() {
        session = session.with_sink(Box::new(CsvFrequencySink::new(dir)));
        session
            .enable_all_logs(true)
            .wrap_err("starting frequency logs")?;
    }
    if let Some(laser) = devices::laser(cfg)? {
        session.connect_laser(laser);
    }
    if let Some(i) = laser_feedback {
        session
            .enable_laser_feedback(i)
            .wrap_err_with(|| format!("enabling laser feedback on channel {i}"))?;
    }
    if let Some(i) = temp_feedback {
        session
            .enable_temp_feedback(i)
            .wrap_err_with(|| format!("enabling temperature feedback on channel {i}"))?;
    }

    let names: Vec<String> = session.channels().iter().map(|c| c.name().to_string()).collect();
    let summary = runner::run_counter(
        &mut session,
        RunLimits {
            shutdown,
            max_ticks: ticks,
        },
        |r| report::counter_tick(r, names.get(r.index).map_or("", String::as_str), json_out),
    )?;

    // Leave the DAQ side holding its last adjust; close logs and the laser.
    for i in 0..session.channels().len() {
        if session.channels()[i].temp_feedback_enabled() {
            session.disable_temp_feedback(i)?;
        }
        if session.channels()[i].logging_enabled() {
            session.enable_logging(i, false)?;
        }
    }
    session.disconnect_laser();

    let channels: Vec<serde_json::Value> = session
        .channels()
        .iter()
        .map(|c| {
            json!({
                "name": c.name(),
                "active": c.is_active(),
                "frequency_hz": c.measured(),
                "target_hz": c.target(),
                "error_hz": c.error_hz(),
                "cumulative_adjust_c": c.cumulative_adjust(),
            })
        })
        .collect();
    let beat = session.beat();
    report::summary(
        "counter",
        &summary,
        json!({
            "channels": channels,
            "beat_hz": (beat.samples() > 0).then(|| beat.delta_f()),
        }),
        json_out,
    );
    Ok(())
}

pub fn temperature(
    cfg: &Config,
    ticks: Option<u64>,
    enable: bool,
    shutdown: &AtomicBool,
    json_out: bool,
) -> eyre::Result<()> {
    let daq = devices::daq(cfg);
    let mut controller = combctl_core::build_temperature_controller(
        cfg,
        daq.analog_in(),
        daq.analog_out(),
        daq.digital_out(),
    )?;
    for i in 0..controller.loop_count() {
        let Some(port) = controller.control_loop(i).and_then(|l| l.adjust_port()) else {
            continue;
        };
        let server = LineServer::bind(port)
            .map_err(|e| map_hw_error(&e))
            .wrap_err_with(|| format!("listening for adjusts on port {port}"))?;
        controller.attach_source(i, Box::new(server))?;
    }
    if enable {
        for i in 0..controller.loop_count() {
            controller.set_enable(i, true)?;
        }
    }

    let names: Vec<String> = (0..controller.loop_count())
        .filter_map(|i| controller.control_loop(i).map(|l| l.name().to_string()))
        .collect();
    let summary = runner::run_temperature(
        &mut controller,
        &MonotonicClock::new(),
        RunLimits {
            shutdown,
            max_ticks: ticks,
        },
        |r| report::temperature_tick(r, &names, json_out),
    )
    .wrap_err("running temperature controller")?;

    let loops: Vec<serde_json::Value> = (0..controller.loop_count())
        .filter_map(|i| controller.control_loop(i))
        .map(|l| json!({ "name": l.name(), "setpoint_c": l.setpoint(), "enabled": l.is_enabled() }))
        .collect();
    report::summary("temperature", &summary, json!({ "loops": loops }), json_out);
    Ok(())
}

pub fn orion(cfg: &Config, name: &str, value: Option<u64>, json_out: bool) -> eyre::Result<()> {
    let command =
        Command::from_name(name).ok_or_else(|| eyre!("unknown ORION command '{name}'"))?;
    devices::with_orion(cfg, |laser| {
        let reply = laser
            .execute_enabled(command, value)
            .wrap_err_with(|| format!("sending {command} to {}", laser.name()))?;
        if json_out {
            println!(
                "{}",
                json!({ "command": command.name(), "id": command.id(), "value": reply })
            );
        } else {
            match reply {
                Some(v) => println!("{command} -> {v}"),
                None => println!("{command} -> ok"),
            }
        }
        Ok(())
    })
}

pub fn find_laser(cfg: &Config, serial_number: Option<u64>, json_out: bool) -> eyre::Result<()> {
    let ports = devices::find_lasers(cfg, serial_number)?;
    if json_out {
        println!("{}", json!({ "ports": ports }));
    } else if ports.is_empty() {
        println!("no ORION laser found");
    } else {
        for port in &ports {
            println!("{port}");
        }
    }
    Ok(())
}

pub fn self_check(cfg: &Config, json_out: bool) -> eyre::Result<()> {
    let session = combctl_core::build_counter_session(
        cfg,
        devices::counter(cfg)?,
        MonotonicClock::new(),
    )?;
    let laser = devices::laser(cfg)?;
    let daq = devices::daq(cfg);
    let controller = combctl_core::build_temperature_controller(
        cfg,
        daq.analog_in(),
        daq.analog_out(),
        daq.digital_out(),
    )?;

    let channels: Vec<String> = session.channels().iter().map(|c| c.name().to_string()).collect();
    let loops: Vec<String> = (0..controller.loop_count())
        .filter_map(|i| controller.control_loop(i).map(|l| l.name().to_string()))
        .collect();
    if json_out {
        println!(
            "{}",
            json!({
                "status": "ok",
                "channels": channels,
                "loops": loops,
                "laser": laser.is_some(),
                "timer_period_ms": session.timer_period_ms(),
            })
        );
    } else {
        for (i, name) in channels.iter().enumerate() {
            println!("channel {i}: {name}");
        }
        for (i, name) in loops.iter().enumerate() {
            println!("loop {i}: {name}");
        }
        println!("ok");
    }
    Ok(())
}
