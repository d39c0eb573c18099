//! Maps `Box<dyn Error>` from trait boundaries to typed `CombError`.
//!
//! The traits in `combctl_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path
//! for `combctl_hardware::HwError` downcasting.

use crate::error::CombError;

/// Map a trait-boundary error to a typed `CombError`.
///
/// Attempts to downcast known error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> CombError {
    if let Some(own) = e.downcast_ref::<CombError>() {
        return own.clone();
    }

    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        use combctl_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => CombError::Timeout,
                HwError::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => CombError::Timeout,
                HwError::Injected(_) => CombError::InstrumentFault(hw.to_string()),
                other => CombError::InstrumentIo(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>()
        && io.kind() == std::io::ErrorKind::TimedOut
    {
        return CombError::Timeout;
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        CombError::Timeout
    } else {
        CombError::InstrumentIo(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use combctl_traits::DeviceError;

    #[test]
    fn string_fallback() {
        let e: DeviceError = "read timeout on channel 2".into();
        assert_eq!(map_hw_error(e.as_ref()), CombError::Timeout);
        let e: DeviceError = "no signal".into();
        assert_eq!(
            map_hw_error(e.as_ref()),
            CombError::InstrumentIo("no signal".into())
        );
    }

    #[test]
    fn own_errors_pass_through() {
        let e: DeviceError = Box::new(CombError::UnknownChannel(4));
        assert_eq!(map_hw_error(e.as_ref()), CombError::UnknownChannel(4));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_timeout_maps_to_timeout() {
        use combctl_hardware::error::HwError;
        let e: DeviceError = Box::new(HwError::Timeout);
        assert_eq!(map_hw_error(e.as_ref()), CombError::Timeout);
        let e: DeviceError = Box::new(HwError::Disconnected("port 60002".into()));
        assert!(matches!(map_hw_error(e.as_ref()), CombError::InstrumentIo(_)));
    }
}
