//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::capabilities::Capabilities;
use crate::correlator::Correlator;
use crate::data::DataNode;
use crate::error::Error;
use crate::message::{Operation, Request, RpcReply};

// Live NETCONF session with a device.
#[derive(Debug)]
pub struct Session {
    device: String,
    session_id: u32,
    capabilities: Capabilities,
    correlator: Correlator,
    request_timeout: Option<Duration>,
    next_message_id: AtomicU64,
    next_tx_id: AtomicU64,
}

// ===== impl Session =====

impl Session {
    pub fn new(
        device: String,
        session_id: u32,
        capabilities: Capabilities,
        correlator: Correlator,
        request_timeout: Option<Duration>,
    ) -> Session {
        Session {
            device,
            session_id,
            capabilities,
            correlator,
            request_timeout,
            next_message_id: AtomicU64::new(1),
            next_tx_id: AtomicU64::new(1),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn is_up(&self) -> bool {
        self.correlator.is_up()
    }

    // Issues an RPC and waits for its reply.
    //
    // On timeout the request stays queued: its eventual reply still has to
    // be consumed to keep the remaining replies correlated.
    pub async fn rpc(&self, operation: Operation) -> Result<RpcReply, Error> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(format!("m-{}", message_id), operation);
        let reply = self.correlator.send(request);

        match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, reply)
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => reply.await,
        }
    }

    // Issues an RPC whose reply is expected to carry no data.
    pub async fn rpc_ok(&self, operation: Operation) -> Result<(), Error> {
        self.rpc(operation).await?.into_result().map(|_| ())
    }

    pub async fn rpc_data(
        &self,
        operation: Operation,
    ) -> Result<Vec<DataNode>, Error> {
        self.rpc(operation).await?.into_result()
    }

    pub fn close(&self) {
        self.correlator.close();
    }

    pub(crate) fn next_tx_id(&self) -> u64 {
        self.next_tx_id.fetch_add(1, Ordering::Relaxed)
    }
}
