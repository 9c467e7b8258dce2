//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span, trace};

use crate::changes::ChangeRecord;
use crate::data::InstancePath;
use crate::message::{Datastore, Operation, RpcReply};
use crate::transaction::TxState;

// NETCONF engine debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Sessions
    SessionUp(&'a str, u32),
    SessionDown(&'a str, Option<&'a str>),
    ReconnectWait(&'a str, std::time::Duration),
    RequestTx(&'a str, &'a str, &'a Operation),
    ReplyRx(&'a str, &'a str, &'a RpcReply),
    ReplyUnmatched(&'a str, &'a RpcReply),
    NotificationRx(&'a str),
    // Transactions
    ChangeRecord(u64, &'a ChangeRecord),
    TxStateChange(u64, TxState, TxState),
    TxParentMaterialize(u64, &'a InstancePath),
    TxTainted(u64, Datastore),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::SessionUp(device, session_id) => {
                debug_span!("session", %device).in_scope(|| {
                    debug!(%session_id, "{}", self);
                });
            }
            Debug::SessionDown(device, reason) => {
                debug_span!("session", %device).in_scope(|| {
                    debug!(reason = reason.unwrap_or("-"), "{}", self);
                });
            }
            Debug::ReconnectWait(device, delay) => {
                debug_span!("session", %device).in_scope(|| {
                    debug!(?delay, "{}", self);
                });
            }
            Debug::RequestTx(device, message_id, operation) => {
                debug_span!("session", %device).in_scope(|| {
                    trace!(%message_id, %operation, "{}", self);
                });
            }
            Debug::ReplyRx(device, operation, reply) => {
                debug_span!("session", %device).in_scope(|| {
                    trace!(message_id = ?reply.message_id, %operation, "{}", self);
                });
            }
            Debug::ReplyUnmatched(device, reply) => {
                debug_span!("session", %device).in_scope(|| {
                    trace!(message_id = ?reply.message_id, "{}", self);
                });
            }
            Debug::NotificationRx(device) => {
                debug_span!("session", %device).in_scope(|| {
                    trace!("{}", self);
                });
            }
            Debug::ChangeRecord(tx_id, record) => {
                debug_span!("transaction", id = %tx_id).in_scope(|| {
                    debug!(path = %record.path, operation = %record.operation, "{}", self);
                });
            }
            Debug::TxStateChange(tx_id, old_state, new_state) => {
                debug_span!("transaction", id = %tx_id).in_scope(|| {
                    debug!(?old_state, ?new_state, "{}", self);
                });
            }
            Debug::TxParentMaterialize(tx_id, path) => {
                debug_span!("transaction", id = %tx_id).in_scope(|| {
                    debug!(%path, "{}", self);
                });
            }
            Debug::TxTainted(tx_id, datastore) => {
                debug_span!("transaction", id = %tx_id).in_scope(|| {
                    debug!(%datastore, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::SessionUp(..) => {
                write!(f, "session established")
            }
            Debug::SessionDown(..) => {
                write!(f, "session torn down")
            }
            Debug::ReconnectWait(..) => {
                write!(f, "waiting before reconnecting")
            }
            Debug::RequestTx(..) => {
                write!(f, "sending request")
            }
            Debug::ReplyRx(..) => {
                write!(f, "received reply")
            }
            Debug::ReplyUnmatched(..) => {
                write!(f, "received reply matching no outstanding request")
            }
            Debug::NotificationRx(..) => {
                write!(f, "received notification")
            }
            Debug::ChangeRecord(..) => {
                write!(f, "change record")
            }
            Debug::TxStateChange(..) => {
                write!(f, "state transition")
            }
            Debug::TxParentMaterialize(..) => {
                write!(f, "materializing missing parent")
            }
            Debug::TxTainted(..) => {
                write!(f, "datastores diverged")
            }
        }
    }
}
