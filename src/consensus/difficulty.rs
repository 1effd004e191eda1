//! Proof-of-work difficulty retargeting.
//!
//! Difficulty adjusts once per window so that the observed block interval
//! converges on the configured target. A single adjustment is clamped to the
//! configured factor in both directions, which bounds how fast an attacker
//! with a timestamp-skewing majority can drag difficulty down.

use crate::core::params::PowParams;

/// Computes the expected difficulty for each height of a branch.
pub struct DifficultyAdjuster {
    params: PowParams,
}

impl DifficultyAdjuster {
    pub fn new(params: &PowParams) -> Self {
        Self {
            params: params.clone(),
        }
    }

    /// Returns the difficulty a block at `height` must seal.
    ///
    /// Off window boundaries this is the parent's difficulty unchanged.
    /// On a boundary it is the parent difficulty retargeted against
    /// `window_timestamps`, the timestamps of the last window of blocks on
    /// the branch ending at the parent, oldest first.
    pub fn expected_for(&self, height: u64, parent_difficulty: u64, window_timestamps: &[u64]) -> u64 {
        if height == 0 {
            return self.params.initial_difficulty;
        }
        if self.params.adjustment_window == 0 || height % self.params.adjustment_window != 0 {
            return parent_difficulty;
        }
        self.retarget(parent_difficulty, window_timestamps)
    }

    fn retarget(&self, parent_difficulty: u64, window_timestamps: &[u64]) -> u64 {
        if window_timestamps.len() < 2 {
            return parent_difficulty;
        }

        let first = window_timestamps[0];
        let last = window_timestamps[window_timestamps.len() - 1];
        let intervals = (window_timestamps.len() - 1) as u64;
        let expected_span = self.params.target_block_time_secs * intervals;
        // Non-monotonic or identical timestamps count as the fastest
        // possible window rather than dividing by zero.
        let actual_span = last.saturating_sub(first).max(1);

        let scaled = (parent_difficulty as u128) * (expected_span as u128) / (actual_span as u128);

        let factor = self.params.max_adjustment_factor.max(1);
        let ceiling = (parent_difficulty as u128).saturating_mul(factor as u128);
        let floor = ((parent_difficulty / factor) as u128).max(1);
        let clamped = scaled.clamp(floor, ceiling);

        (clamped.min(u64::MAX as u128) as u64)
            .clamp(self.params.min_difficulty, self.params.max_difficulty)
    }
}
