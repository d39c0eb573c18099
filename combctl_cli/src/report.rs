//! Operator-facing output: one line per tick, a summary at the end.
//! JSON mode prints one object per line on stdout.

use combctl_core::runner::{RunSummary, StopReason};
use combctl_core::{LoopReading, TempTickReport, TickEvent, TickReport};
use serde_json::{Value, json};

pub fn stop_reason_name(r: StopReason) -> &'static str {
    match r {
        StopReason::Shutdown => "Shutdown",
        StopReason::TickLimit => "TickLimit",
        StopReason::NothingActive => "NothingActive",
    }
}

pub fn event_name(e: &TickEvent) -> &'static str {
    match e {
        TickEvent::ReadFailed { .. } => "ReadFailed",
        TickEvent::Logged { .. } => "Logged",
        TickEvent::LogFailed { .. } => "LogFailed",
        TickEvent::LaserStrike { .. } => "LaserStrike",
        TickEvent::LaserFeedbackShutoff { .. } => "LaserFeedbackShutoff",
        TickEvent::LaserCorrection { .. } => "LaserCorrection",
        TickEvent::LaserWriteFailed { .. } => "LaserWriteFailed",
        TickEvent::TempAdjustSent { .. } => "TempAdjustSent",
        TickEvent::TempLinkFailed { .. } => "TempLinkFailed",
        TickEvent::PanicStrike { .. } => "PanicStrike",
        TickEvent::LoopForcedOff { .. } => "LoopForcedOff",
        TickEvent::SetpointCommitted { .. } => "SetpointCommitted",
        TickEvent::SetpointRejected { .. } => "SetpointRejected",
        TickEvent::AdjustReceived { .. } => "AdjustReceived",
    }
}

/// Short text for the events an operator should see; routine ones are skipped.
fn event_text(e: &TickEvent) -> Option<String> {
    Some(match e {
        TickEvent::Logged { .. } => return None,
        TickEvent::ReadFailed { channel, error } => {
            format!("channel {channel} read failed ({error}); channel stopped")
        }
        TickEvent::LogFailed { channel, error } => {
            format!("channel {channel} log write failed ({error}); logging stopped")
        }
        TickEvent::LaserStrike {
            channel,
            strikes,
            detune_hz,
        } => format!("channel {channel} detuned by {detune_hz:.1} Hz (strike {strikes})"),
        TickEvent::LaserFeedbackShutoff { channel, detune_hz } => format!(
            "channel {channel} detuned by {detune_hz:.1} Hz too long; laser feedback off"
        ),
        TickEvent::LaserCorrection {
            channel,
            delta,
            new_value,
        } => format!("channel {channel} laser step {delta:+} -> {new_value}"),
        TickEvent::LaserWriteFailed { channel, error } => {
            format!("channel {channel} laser write failed ({error}); laser feedback off")
        }
        TickEvent::TempAdjustSent {
            channel,
            value,
            clamped,
        } => format!(
            "channel {channel} temperature adjust {value:+.3} C{}",
            if *clamped { " (at limit)" } else { "" }
        ),
        TickEvent::TempLinkFailed { channel, error } => {
            format!("channel {channel} temperature link failed ({error}); feedback off")
        }
        TickEvent::PanicStrike {
            control_loop,
            temperature,
            strikes,
        } => format!("loop {control_loop} out of limits at {temperature:.3} C (strike {strikes})"),
        TickEvent::LoopForcedOff { control_loop } => {
            format!("loop {control_loop} forced off")
        }
        TickEvent::SetpointCommitted {
            control_loop,
            setpoint,
        } => format!("loop {control_loop} setpoint committed: {setpoint:.3} C"),
        TickEvent::SetpointRejected {
            control_loop,
            setpoint,
        } => format!("loop {control_loop} commit rejected; setpoint stays {setpoint:.3} C"),
        TickEvent::AdjustReceived {
            control_loop,
            adjust,
            clamped,
        } => format!(
            "loop {control_loop} remote adjust {adjust:+.3} C{}",
            if *clamped { " (at limit)" } else { "" }
        ),
    })
}

fn events_json(events: &[TickEvent]) -> Value {
    Value::from(events.iter().map(event_name).collect::<Vec<_>>())
}

pub fn counter_tick(report: &TickReport, name: &str, json: bool) {
    if json {
        println!(
            "{}",
            json!({
                "type": "tick",
                "channel": report.index,
                "name": name,
                "frequency_hz": report.frequency,
                "events": events_json(&report.events),
            })
        );
        return;
    }
    if let Some(hz) = report.frequency {
        println!("{name}: {hz:.3} Hz");
    }
    for text in report.events.iter().filter_map(event_text) {
        println!("  {text}");
    }
}

fn loop_json(name: &str, r: &LoopReading) -> Value {
    json!({
        "name": name,
        "actual_c": r.actual,
        "setpoint_c": r.setpoint_readback,
        "voltage_out": r.voltage_out,
        "enabled": r.digital_enable,
        "panic": r.panic,
        "adjust_c": r.adjust,
    })
}

pub fn temperature_tick(report: &TempTickReport, names: &[String], json: bool) {
    if json {
        let loops: Vec<Value> = names
            .iter()
            .zip(&report.readings)
            .map(|(n, r)| loop_json(n, r))
            .collect();
        println!(
            "{}",
            json!({ "type": "tick", "loops": loops, "events": events_json(&report.events) })
        );
        return;
    }
    for (name, r) in names.iter().zip(&report.readings) {
        println!(
            "{name}: {:.3} C (set {:.3} C, out {:.4} V, {}{})",
            r.actual,
            r.setpoint_readback,
            r.voltage_out,
            if r.digital_enable { "on" } else { "off" },
            if r.panic { ", PANIC" } else { "" }
        );
    }
    for text in report.events.iter().filter_map(event_text) {
        println!("  {text}");
    }
}

pub fn summary(command: &str, summary: &RunSummary, extra: Value, json: bool) {
    if json {
        let mut obj = json!({
            "type": "summary",
            "command": command,
            "ticks": summary.ticks,
            "stop": stop_reason_name(summary.stop),
        });
        if let (Some(map), Value::Object(more)) = (obj.as_object_mut(), extra) {
            map.extend(more);
        }
        println!("{obj}");
    } else {
        println!(
            "{command} stopped after {} ticks ({})",
            summary.ticks,
            stop_reason_name(summary.stop)
        );
    }
}
