//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use ncmgr_utils::task::Task;
use ncmgr_utils::{Responder, UnboundedSender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};

use crate::debug::Debug;
use crate::error::Error;
use crate::message::{Message, Notification, Request, RpcReply};
use crate::transport::{Transport, TransportError};

// Multiplexes concurrent requests over one ordered transport session.
//
// NETCONF replies carry no ordering guarantee other than the one provided by
// the transport itself: every reply answers the oldest request that is
// still outstanding. The correlator keeps outstanding requests in a FIFO
// queue that mirrors the wire order.
#[derive(Debug)]
pub struct Correlator {
    device: String,
    inner: Arc<Mutex<Inner>>,
    limiter: Option<Arc<Semaphore>>,
    max_concurrent: usize,
    notif_tx: Option<UnboundedSender<Notification>>,
}

#[derive(Debug)]
struct Inner {
    // `None` once the session was torn down.
    transport: Option<Arc<dyn Transport>>,
    queue: VecDeque<Outstanding>,
    next_seq: u64,
}

// Issued request that wasn't answered yet.
#[derive(Debug)]
struct Outstanding {
    seq: u64,
    message_id: String,
    operation: &'static str,
    responder: Responder<Result<RpcReply, Error>>,
    permit: Option<OwnedSemaphorePermit>,
}

// ===== impl Correlator =====

impl Correlator {
    // Creates a correlator for a freshly established session. A
    // `max_concurrent` of zero disables the concurrency limit.
    pub fn new(
        device: String,
        transport: Arc<dyn Transport>,
        max_concurrent: usize,
        notif_tx: Option<UnboundedSender<Notification>>,
    ) -> Correlator {
        let limiter =
            (max_concurrent != 0).then(|| Arc::new(Semaphore::new(max_concurrent)));
        Correlator {
            device,
            inner: Arc::new(Mutex::new(Inner {
                transport: Some(transport),
                queue: Default::default(),
                next_seq: 0,
            })),
            limiter,
            max_concurrent,
            notif_tx,
        }
    }

    // Sends a request and waits for the matching reply.
    pub async fn send(&self, request: Request) -> Result<RpcReply, Error> {
        let (responder, reply_rx) = oneshot::channel();

        let (seq, mut completion) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(transport) = inner.transport.clone() else {
                return Err(Error::SessionDown(None));
            };

            // Reserve one in-flight slot, without waiting for it.
            let permit = match &self.limiter {
                Some(limiter) => Some(
                    limiter
                        .clone()
                        .try_acquire_owned()
                        .map_err(|_| Error::ResourceExhausted(self.max_concurrent))?,
                ),
                None => None,
            };

            let seq = inner.next_seq;
            inner.next_seq += 1;
            Debug::RequestTx(&self.device, &request.message_id, &request.operation)
                .log();
            inner.queue.push_back(Outstanding {
                seq,
                message_id: request.message_id.clone(),
                operation: request.operation.name(),
                responder,
                permit,
            });

            // The transport only queues the request here, so wire order
            // matches queue order.
            (seq, transport.send(request))
        };

        // Transport failures are delivered through the responder, so the
        // request is cleaned up even if the caller stops waiting.
        match (&mut completion).now_or_never() {
            Some(Ok(())) => (),
            Some(Err(error)) => on_send_failure(&self.inner, seq, error),
            None => {
                let inner = self.inner.clone();
                let mut task = Task::spawn(async move {
                    if let Err(error) = completion.await {
                        on_send_failure(&inner, seq, error);
                    }
                });
                task.detach();
            }
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::SessionDown(None)),
        }
    }

    // Processes a message received from the transport.
    pub fn on_message(&self, message: Message) {
        match message {
            Message::Notification(notification) => {
                Debug::NotificationRx(&self.device).log();
                if let Some(notif_tx) = &self.notif_tx {
                    let _ = notif_tx.send(notification);
                }
            }
            Message::Reply(reply) => self.on_reply(reply),
        }
    }

    fn on_reply(&self, reply: RpcReply) {
        let mut completed = vec![];
        let mut reply = Some(reply);

        {
            let mut inner = self.inner.lock().unwrap();
            while let Some(received) = reply.take() {
                let Some(entry) = inner.queue.pop_front() else {
                    Debug::ReplyUnmatched(&self.device, &received).log();
                    break;
                };

                // A reply without message-id (e.g. malformed-message error)
                // can only be answering the oldest request.
                match &received.message_id {
                    Some(message_id) if *message_id != entry.message_id => {
                        let error = Error::ProtocolMismatch(
                            entry.message_id.clone(),
                            Some(message_id.clone()),
                        );
                        completed.push((entry, Err(error)));
                        reply = Some(received);
                    }
                    _ => {
                        Debug::ReplyRx(&self.device, entry.operation, &received)
                            .log();
                        completed.push((entry, Ok(received)));
                    }
                }
            }
        }

        for (entry, result) in completed {
            if let Err(error) = &result {
                error.log();
            }
            entry.complete(result);
        }
    }

    // Tears down the session, failing all outstanding requests.
    pub fn on_session_down(&self, reason: Option<String>) {
        let drained = {
            let mut inner = self.inner.lock().unwrap();
            if inner.transport.take().is_none() {
                return;
            }
            std::mem::take(&mut inner.queue)
        };

        Debug::SessionDown(&self.device, reason.as_deref()).log();
        for entry in drained {
            entry.complete(Err(Error::SessionDown(reason.clone())));
        }
    }

    // Disconnects the transport and tears down the session locally.
    pub fn close(&self) {
        let transport = self.inner.lock().unwrap().transport.clone();
        if let Some(transport) = transport {
            transport.disconnect();
        }
        self.on_session_down(None);
    }

    pub fn is_up(&self) -> bool {
        self.inner.lock().unwrap().transport.is_some()
    }

    // Number of requests waiting for a reply.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

// ===== impl Outstanding =====

impl Outstanding {
    fn complete(self, result: Result<RpcReply, Error>) {
        let Outstanding {
            responder, permit, ..
        } = self;

        // Release the in-flight slot before waking up the caller.
        drop(permit);

        // The caller might have given up waiting.
        let _ = responder.send(result);
    }
}

// ===== helper functions =====

// Fails the request whose transport send failed, unless a reply or the
// session teardown completed it already.
fn on_send_failure(inner: &Mutex<Inner>, seq: u64, error: TransportError) {
    let entry = {
        let mut inner = inner.lock().unwrap();
        inner
            .queue
            .iter()
            .position(|entry| entry.seq == seq)
            .and_then(|pos| inner.queue.remove(pos))
    };
    if let Some(entry) = entry {
        let error = Error::Transport(error);
        error.log();
        entry.complete(Err(error));
    }
}
