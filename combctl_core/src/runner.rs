use crate::counter_session::CounterSession;
use crate::error::CombError;
use crate::status::{TempTickReport, TickReport};
use crate::temperature::TemperatureController;
use combctl_traits::{AnalogInput, AnalogOutput, Clock, DigitalOutput, FrequencyCounter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Why a run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown flag was raised.
    Shutdown,
    /// `max_ticks` ticks were run.
    TickLimit,
    /// Every counter channel is inactive.
    NothingActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub stop: StopReason,
}

/// Stop conditions checked before every tick.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits<'a> {
    pub shutdown: &'a AtomicBool,
    pub max_ticks: Option<u64>,
}

impl RunLimits<'_> {
    fn stop(&self, ticks: u64) -> Option<StopReason> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Some(StopReason::Shutdown);
        }
        match self.max_ticks {
            Some(max) if ticks >= max => Some(StopReason::TickLimit),
            _ => None,
        }
    }
}

/// Sleep what is left of `period` after a tick that started at `started`.
fn sleep_rest<K: Clock>(clock: &K, started: std::time::Instant, period: Duration) {
    let spent = clock.now().saturating_duration_since(started);
    clock.sleep(period.saturating_sub(spent));
}

/// Drive a counter session at its timer period until a stop condition holds.
pub fn run_counter<C, K, F>(
    session: &mut CounterSession<C, K>,
    limits: RunLimits<'_>,
    mut on_tick: F,
) -> Result<RunSummary, CombError>
where
    C: FrequencyCounter,
    K: Clock,
    F: FnMut(&TickReport),
{
    session.start()?;
    let period = Duration::from_millis(session.timer_period_ms());
    tracing::info!(period_ms = period.as_millis() as u64, "counter session start");
    let mut ticks = 0u64;
    let stop = loop {
        if let Some(reason) = limits.stop(ticks) {
            break reason;
        }
        if !session.should_run() {
            break StopReason::NothingActive;
        }
        let started = session.clock().now();
        let report = session.tick();
        ticks += 1;
        on_tick(&report);
        sleep_rest(session.clock(), started, period);
    };
    tracing::info!(ticks, ?stop, "counter session stopped");
    Ok(RunSummary { ticks, stop })
}

/// Drive the DAQ controller every `period_ms`. A tick error ends the run
/// (the controller has already disabled its loops).
pub fn run_temperature<I, O, D, K, F>(
    controller: &mut TemperatureController<I, O, D>,
    clock: &K,
    limits: RunLimits<'_>,
    mut on_tick: F,
) -> Result<RunSummary, CombError>
where
    I: AnalogInput,
    O: AnalogOutput,
    D: DigitalOutput,
    K: Clock,
    F: FnMut(&TempTickReport),
{
    let period = Duration::from_millis(controller.period_ms().max(1));
    tracing::info!(
        period_ms = period.as_millis() as u64,
        loops = controller.loop_count(),
        "temperature controller start"
    );
    let mut ticks = 0u64;
    let stop = loop {
        if let Some(reason) = limits.stop(ticks) {
            break reason;
        }
        let started = clock.now();
        let report = controller.tick().inspect_err(|e| {
            tracing::error!(error = %e, ticks, "temperature controller tick failed");
        })?;
        ticks += 1;
        on_tick(&report);
        sleep_rest(clock, started, period);
    };
    tracing::info!(ticks, ?stop, "temperature controller stopped");
    Ok(RunSummary { ticks, stop })
}
