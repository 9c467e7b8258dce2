//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod stub;

use std::sync::Once;

use tracing::info;

static INIT: Once = Once::new();

// ===== helper functions =====

// Initializes tracing subscriber.
fn init_tracing() {
    let _ = tracing_subscriber::fmt::Subscriber::builder()
        .with_target(false)
        .with_ansi(false)
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();

    info!("starting");
}

// ===== global functions =====

// Prepares the test environment. Safe to call from every test.
pub fn setup() {
    INIT.call_once(|| {
        init_tracing();
    });
}
