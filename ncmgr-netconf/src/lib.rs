//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod capabilities;
pub mod changes;
pub mod config;
pub mod correlator;
pub mod data;
pub mod debug;
pub mod device;
pub mod error;
pub mod message;
pub mod schema;
pub mod session;
#[cfg(feature = "testing")]
pub mod test;
pub mod transaction;
pub mod transport;
