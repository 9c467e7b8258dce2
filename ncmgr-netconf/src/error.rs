//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use tracing::warn;

use crate::data::{EditOperation, InstancePath};
use crate::message::{Datastore, RpcError, format_rpc_errors};
use crate::transport::TransportError;

// NETCONF engine errors.
#[derive(Debug)]
pub enum Error {
    // Session
    SessionDown(Option<String>),
    ResourceExhausted(usize),
    ProtocolMismatch(String, Option<String>),
    Transport(TransportError),
    Timeout(Duration),
    Rpc(Vec<RpcError>),
    // Write preconditions
    DataExists(InstancePath),
    DataMissing(InstancePath),
    // Transaction
    LockFailed(Datastore, Box<Error>),
    LockLeaked(Datastore, Box<Error>),
    Tainted,
    TransactionClosed,
    NoWritableDatastore,
    // Edit intent parsing
    UnknownOperation(String),
    UnknownElement(String),
    MissingListKey(String, String),
    KeyOperation(String, EditOperation),
    InvalidPath(String),
    PayloadMismatch(InstancePath, String),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::SessionDown(reason) => {
                warn!(reason = reason.as_deref().unwrap_or("-"), "{}", self);
            }
            Error::ResourceExhausted(limit) => {
                warn!(%limit, "{}", self);
            }
            Error::ProtocolMismatch(expected, received) => {
                warn!(%expected, ?received, "{}", self);
            }
            Error::Transport(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
            Error::Timeout(timeout) => {
                warn!(?timeout, "{}", self);
            }
            Error::Rpc(errors) => {
                warn!(errors = %format_rpc_errors(errors), "{}", self);
            }
            Error::DataExists(path) | Error::DataMissing(path) => {
                warn!(%path, "{}", self);
            }
            Error::LockFailed(datastore, error)
            | Error::LockLeaked(datastore, error) => {
                warn!(%datastore, error = %with_source(error.as_ref()), "{}", self);
            }
            Error::Tainted
            | Error::TransactionClosed
            | Error::NoWritableDatastore => {
                warn!("{}", self);
            }
            Error::UnknownOperation(operation) => {
                warn!(%operation, "{}", self);
            }
            Error::UnknownElement(name) => {
                warn!(%name, "{}", self);
            }
            Error::MissingListKey(list, key) => {
                warn!(%list, %key, "{}", self);
            }
            Error::KeyOperation(key, operation) => {
                warn!(%key, %operation, "{}", self);
            }
            Error::InvalidPath(path) => {
                warn!(%path, "{}", self);
            }
            Error::PayloadMismatch(path, name) => {
                warn!(%path, %name, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SessionDown(reason) => match reason {
                Some(reason) => write!(f, "session is down: {}", reason),
                None => write!(f, "session disconnected"),
            },
            Error::ResourceExhausted(..) => {
                write!(f, "too many outstanding requests")
            }
            Error::ProtocolMismatch(..) => {
                write!(f, "reply doesn't match the oldest outstanding request")
            }
            Error::Transport(..) => {
                write!(f, "failed to transmit request")
            }
            Error::Timeout(..) => {
                write!(f, "request timed out")
            }
            Error::Rpc(errors) => {
                write!(f, "device returned error: {}", format_rpc_errors(errors))
            }
            Error::DataExists(path) => {
                write!(f, "data already exists: {}", path)
            }
            Error::DataMissing(path) => {
                write!(f, "data is missing: {}", path)
            }
            Error::LockFailed(datastore, ..) => {
                write!(f, "failed to lock {} datastore", datastore)
            }
            Error::LockLeaked(datastore, ..) => {
                write!(
                    f,
                    "changes committed but failed to unlock {} datastore",
                    datastore
                )
            }
            Error::Tainted => {
                write!(f, "datastores diverged, transaction was discarded")
            }
            Error::TransactionClosed => {
                write!(f, "transaction is closed")
            }
            Error::NoWritableDatastore => {
                write!(f, "device has no writable datastore")
            }
            Error::UnknownOperation(operation) => {
                write!(f, "unknown edit operation: {}", operation)
            }
            Error::UnknownElement(name) => {
                write!(f, "unknown element: {}", name)
            }
            Error::MissingListKey(list, key) => {
                write!(f, "list entry {} is missing key {}", list, key)
            }
            Error::KeyOperation(key, operation) => {
                write!(f, "list key {} can't be the target of {}", key, operation)
            }
            Error::InvalidPath(path) => {
                write!(f, "invalid instance path: {}", path)
            }
            Error::PayloadMismatch(..) => {
                write!(f, "payload doesn't match the target path")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(error) => Some(error),
            Error::LockFailed(_, error) | Error::LockLeaked(_, error) => {
                Some(error.as_ref())
            }
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Error {
        Error::Transport(error)
    }
}

// ===== helper functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
