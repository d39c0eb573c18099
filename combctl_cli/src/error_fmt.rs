//! Human-readable error descriptions and structured JSON error formatting.

use combctl_core::error::{BuildError, CombError, ProtocolError};

/// Find the first typed core error anywhere in the report chain.
fn comb_error(err: &eyre::Report) -> Option<&CombError> {
    err.chain().find_map(|e| e.downcast_ref::<CombError>())
}

fn protocol_error(err: &eyre::Report) -> Option<&ProtocolError> {
    err.chain().find_map(|e| {
        e.downcast_ref::<ProtocolError>().or_else(|| match e.downcast_ref::<CombError>() {
            Some(CombError::Protocol(p)) => Some(p),
            _ => None,
        })
    })
}

fn is_config_error(err: &eyre::Report) -> bool {
    if err.chain().any(|e| {
        e.downcast_ref::<BuildError>().is_some() || e.downcast_ref::<toml::de::Error>().is_some()
    }) {
        return true;
    }
    let lower = err.to_string().to_ascii_lowercase();
    lower.contains("invalid configuration") || lower.contains("config file")
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(pe) = protocol_error(err) {
        return match pe {
            ProtocolError::MalformedPacket(check) => format!(
                "What happened: The laser reply failed the {check} check.\nLikely causes: Line noise, a wrong baud rate, or another program talking to the port.\nHow to fix: Check [laser] port and baud_rate, close other serial clients, and retry."
            ),
            ProtocolError::InvalidCommand(id) => format!(
                "What happened: Unknown ORION command id 0x{id:02X}.\nLikely causes: Firmware mismatch or a corrupted reply.\nHow to fix: Re-run with --log-level=trace to see the raw packets."
            ),
            ProtocolError::Stream(msg) => format!(
                "What happened: The laser link stopped mid-packet ({msg}).\nLikely causes: Cable unplugged or the laser is powered off.\nHow to fix: Check the serial connection and laser power, then retry."
            ),
        };
    }

    if let Some(ce) = comb_error(err) {
        return match ce {
            CombError::Timeout => "What happened: An instrument did not answer in time.\nLikely causes: Wrong serial port, instrument powered off, or timeout too low.\nHow to fix: Verify the port names in the config and raise laser.timeout_ms if needed.".to_string(),
            CombError::InstrumentIo(msg) | CombError::InstrumentFault(msg) => format!(
                "What happened: Instrument communication failed ({msg}).\nLikely causes: Device unplugged, port in use, or no temperature controller listening.\nHow to fix: Check cables and ports; start `combctl temperature` before enabling temperature feedback."
            ),
            CombError::ValidationRejected { value, min, max } => format!(
                "What happened: Value {value} is outside the accepted range [{min}, {max}].\nLikely causes: A typo in the command line or config.\nHow to fix: Pass a value inside the range."
            ),
            CombError::UnknownChannel(i) => format!(
                "What happened: There is no channel or loop with index {i}.\nLikely causes: Indices start at 0 and follow the order in the config.\nHow to fix: Use an index listed by `combctl self-check`."
            ),
            CombError::State(msg) => format!(
                "What happened: The request does not fit the current state ({msg}).\nLikely causes: A prerequisite (laser connection, active channel) is missing.\nHow to fix: Enable the prerequisite first, then retry."
            ),
            CombError::Protocol(pe) => format!(
                "What happened: Laser protocol error ({pe}).\nHow to fix: Re-run with --log-level=trace to see the raw packets."
            ),
        };
    }

    if is_config_error(err) {
        let mut detail = err.to_string();
        if let Some(src) = err.chain().last() {
            detail = src.to_string();
        }
        return format!(
            "What happened: Invalid configuration ({detail}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `combctl self-check`."
        );
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 configuration, 3 instrument I/O, 4 protocol, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if protocol_error(err).is_some() {
        return 4;
    }
    if let Some(ce) = comb_error(err) {
        return match ce {
            CombError::InstrumentIo(_) | CombError::InstrumentFault(_) | CombError::Timeout => 3,
            _ => 1,
        };
    }
    if is_config_error(err) {
        return 2;
    }
    1
}

/// Short stable name for the error class, used as the JSON `reason`.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        2 => "Config",
        3 => "Instrument",
        4 => "Protocol",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
