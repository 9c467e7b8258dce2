//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use derive_new::new;

/// Exponential backoff schedule used between connection attempts.
///
/// The first delay is `initial`, every following delay is multiplied by
/// `factor` and capped at `max`. A `max_attempts` of zero retries forever.
#[derive(Clone, Debug, new)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    max_attempts: u32,
    #[new(default)]
    attempts: u32,
    #[new(default)]
    current: Option<Duration>,
}

// ===== impl Backoff =====

impl Backoff {
    /// Registers a failed attempt and returns how long to wait before the
    /// next one, or `None` once all attempts were used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.max_attempts != 0 && self.attempts >= self.max_attempts {
            return None;
        }

        let delay = match self.current {
            None => self.initial,
            Some(current) => {
                let factor = self.factor.max(1.0);
                current.mul_f64(factor).min(self.max)
            }
        };
        let delay = delay.min(self.max);
        self.current = Some(delay);
        Some(delay)
    }

    /// Number of failed attempts since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Starts over after a successful attempt.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = None;
    }
}
