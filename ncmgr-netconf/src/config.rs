//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::time::Duration;

use ncmgr_utils::backoff::Backoff;
use serde::{Deserialize, Serialize};

// Per-device settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    // Maximum number of in-flight requests (0 means unlimited).
    pub max_concurrent_rpcs: usize,
    pub lock_datastore: bool,
    // Seconds (0 disables the timeout).
    pub request_timeout: u64,
    pub reconnect: Reconnect,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Reconnect {
    pub enabled: bool,
    // 0 means retry forever.
    pub max_attempts: u32,
    // Milliseconds.
    pub initial_delay: u64,
    pub max_delay: u64,
    pub backoff_factor: f64,
}

// ===== impl DeviceConfig =====

impl DeviceConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout != 0)
            .then(|| Duration::from_secs(self.request_timeout))
    }
}

impl Default for DeviceConfig {
    fn default() -> DeviceConfig {
        DeviceConfig {
            max_concurrent_rpcs: 0,
            lock_datastore: true,
            request_timeout: 60,
            reconnect: Default::default(),
        }
    }
}

// ===== impl Reconnect =====

impl Reconnect {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_delay),
            Duration::from_millis(self.max_delay),
            self.backoff_factor,
            self.max_attempts,
        )
    }
}

impl Default for Reconnect {
    fn default() -> Reconnect {
        Reconnect {
            enabled: true,
            max_attempts: 0,
            initial_delay: 2000,
            max_delay: 60000,
            backoff_factor: 1.5,
        }
    }
}
