//! Consecutive-workable streak tracking.
//!
//! Pure decision logic: given the counters persisted by the previous cycle
//! and the workable statuses observed now, produce the next counters and the
//! keys whose streak has reached the alert threshold. No I/O happens here.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Outcome of advancing the counters by one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance<K> {
    /// Counters to persist. Keys not observed this cycle are carried through.
    pub streaks: BTreeMap<K, u64>,
    /// Keys at or above the threshold, with their new streak, in
    /// observation order.
    pub crossed: Vec<(K, u64)>,
}

/// Applies one cycle of observations against a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakTracker {
    threshold: u64,
}

impl StreakTracker {
    /// Create a tracker. A zero threshold is a caller bug and is rejected.
    pub fn new(threshold: u64) -> Result<Self> {
        if threshold == 0 {
            return Err(Error::InvalidArgument(
                "threshold must be a positive number of cycles".to_string(),
            ));
        }
        Ok(Self { threshold })
    }

    /// Advance `prior` by one observation.
    ///
    /// A workable key increments by one (missing counts as zero) and is
    /// reported as crossed whenever the result is at or above the threshold,
    /// every cycle it stays there. A non-workable key resets to zero only if
    /// it was positive, so keys already at zero cause no write.
    pub fn advance<K>(&self, prior: &BTreeMap<K, u64>, workable: &[(K, bool)]) -> Advance<K>
    where
        K: Ord + Clone,
    {
        let mut streaks = prior.clone();
        let mut crossed = Vec::new();

        for (key, can_work) in workable {
            let current = streaks.get(key).copied().unwrap_or(0);
            if *can_work {
                let next = current.saturating_add(1);
                streaks.insert(key.clone(), next);
                if next >= self.threshold {
                    crossed.push((key.clone(), next));
                }
            } else if current > 0 {
                streaks.insert(key.clone(), 0);
            }
        }

        Advance { streaks, crossed }
    }
}
