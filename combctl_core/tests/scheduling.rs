use combctl_core::limits::{Limits, clamp};
use combctl_core::scheduler::MeasurementScheduler;
use proptest::prelude::*;

proptest! {
    #[test]
    fn active_channels_are_visited_equally(active in proptest::collection::vec(any::<bool>(), 1..6)) {
        let mut s = MeasurementScheduler::new(active.clone());
        let n_active = active.iter().filter(|a| **a).count();
        prop_assume!(n_active > 0);
        let rounds = 5;
        let mut visits = vec![0usize; active.len()];
        for _ in 0..rounds * n_active {
            visits[s.current()] += 1;
            s.advance();
        }
        for (i, a) in active.iter().enumerate() {
            prop_assert_eq!(visits[i], if *a { rounds } else { 0 });
        }
    }

    #[test]
    fn clamp_is_idempotent(v in -1e6f64..1e6, lo in -1e3f64..0.0, hi in 0.0f64..1e3) {
        let once = clamp(v, lo, hi);
        prop_assert_eq!(clamp(once, lo, hi), once);
        prop_assert!((lo..=hi).contains(&once));
        let limits = Limits::new(lo, hi).unwrap();
        prop_assert_eq!(limits.clamp(v), once);
    }
}

#[test]
fn all_inactive_is_a_no_op() {
    let mut s = MeasurementScheduler::new(vec![false, false]);
    assert_eq!(s.advance(), 0);
    assert_eq!(s.advance(), 0);
    assert!(!s.any_active());
}

#[test]
fn deactivated_channel_is_skipped() {
    let mut s = MeasurementScheduler::new(vec![true, true, true]);
    s.set_active(1, false).unwrap();
    let seq: Vec<usize> = (0..4).map(|_| s.advance()).collect();
    assert_eq!(seq, vec![2, 0, 2, 0]);
    s.set_active(1, true).unwrap();
    assert_eq!(s.current(), 1);
}
