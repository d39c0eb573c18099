//! Consecutive-violation strike counting.
//!
//! The counter path shuts off once strikes exceed the limit; the DAQ path shuts
//! off once strikes reach it. Both comparisons are kept as separate policies.

/// How the strike count is compared against its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikePolicy {
    /// Trip when `strikes > limit`.
    Exceeds,
    /// Trip when `strikes >= limit`.
    Reaches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeOutcome {
    /// No violation this step; count reset.
    Clear,
    /// Violation recorded; holds the running count.
    Strike(u32),
    /// Limit tripped; count already reset to 0.
    Shutoff,
}

#[derive(Debug, Clone)]
pub struct StrikeCounter {
    limit: u32,
    policy: StrikePolicy,
    strikes: u32,
}

impl StrikeCounter {
    pub fn new(limit: u32, policy: StrikePolicy) -> Self {
        Self {
            limit,
            policy,
            strikes: 0,
        }
    }

    pub fn record(&mut self, violation: bool) -> StrikeOutcome {
        if !violation {
            self.strikes = 0;
            return StrikeOutcome::Clear;
        }
        self.strikes = self.strikes.saturating_add(1);
        let tripped = match self.policy {
            StrikePolicy::Exceeds => self.strikes > self.limit,
            StrikePolicy::Reaches => self.strikes >= self.limit,
        };
        if tripped {
            self.strikes = 0;
            StrikeOutcome::Shutoff
        } else {
            StrikeOutcome::Strike(self.strikes)
        }
    }

    #[inline]
    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    #[inline]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn reset(&mut self) {
        self.strikes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn exceeds_trips_on_fourth_violation() {
        let mut c = StrikeCounter::new(3, StrikePolicy::Exceeds);
        assert_eq!(c.record(true), StrikeOutcome::Strike(1));
        assert_eq!(c.record(true), StrikeOutcome::Strike(2));
        assert_eq!(c.record(true), StrikeOutcome::Strike(3));
        assert_eq!(c.record(true), StrikeOutcome::Shutoff);
        assert_eq!(c.strikes(), 0);
    }

    #[test]
    fn reaches_trips_on_third_violation() {
        let mut c = StrikeCounter::new(3, StrikePolicy::Reaches);
        assert_eq!(c.record(true), StrikeOutcome::Strike(1));
        assert_eq!(c.record(true), StrikeOutcome::Strike(2));
        assert_eq!(c.record(true), StrikeOutcome::Shutoff);
        assert_eq!(c.strikes(), 0);
    }

    #[rstest]
    #[case(StrikePolicy::Exceeds)]
    #[case(StrikePolicy::Reaches)]
    fn clear_step_resets_count(#[case] policy: StrikePolicy) {
        let mut c = StrikeCounter::new(3, policy);
        c.record(true);
        c.record(true);
        assert_eq!(c.record(false), StrikeOutcome::Clear);
        assert_eq!(c.strikes(), 0);
        assert_eq!(c.record(true), StrikeOutcome::Strike(1));
    }
}
