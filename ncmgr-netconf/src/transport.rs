//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use futures::future::BoxFuture;
use ncmgr_utils::UnboundedReceiver;

use crate::message::{Message, Request};

// Framed, ordered request/reply channel to a device.
//
// Implementations handle the NETCONF framing and XML encoding. Inbound
// messages and the session-down event are delivered through the event
// channel returned by the `Connector`.
pub trait Transport: Send + Sync + std::fmt::Debug {
    // Queues the request for transmission.
    //
    // This method must not block: requests are written to the wire in the
    // order `send` is called. The returned future resolves once the request
    // was handed to the network (or failed to).
    fn send(
        &self,
        request: Request,
    ) -> BoxFuture<'static, Result<(), TransportError>>;

    // Tears down the underlying connection. A `TransportEvent::Down` is still
    // expected on the event channel.
    fn disconnect(&self);
}

// Establishes transport sessions (TCP/SSH/TLS handshake, hello exchange).
pub trait Connector: Send + Sync + std::fmt::Debug {
    fn connect(
        &self,
    ) -> BoxFuture<'static, Result<TransportSession, TransportError>>;
}

// Established transport session, as returned by a successful handshake.
#[derive(Debug)]
pub struct TransportSession {
    pub transport: std::sync::Arc<dyn Transport>,
    pub session_id: u32,
    pub capabilities: Vec<String>,
    pub events: UnboundedReceiver<TransportEvent>,
}

// Events delivered by the transport.
#[derive(Debug)]
pub enum TransportEvent {
    Message(Message),
    Down(Option<String>),
}

// Transport errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportError {
    Closed,
    Io(String),
    Handshake(String),
    Timeout,
}

// ===== impl TransportError =====

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Closed => {
                write!(f, "transport closed")
            }
            TransportError::Io(error) => {
                write!(f, "I/O error: {}", error)
            }
            TransportError::Handshake(error) => {
                write!(f, "handshake failed: {}", error)
            }
            TransportError::Timeout => {
                write!(f, "connection timed out")
            }
        }
    }
}

impl std::error::Error for TransportError {}
