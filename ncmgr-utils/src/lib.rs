//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod backoff;
pub mod task;

pub type Sender<T> = tokio::sync::mpsc::Sender<T>;
pub type Receiver<T> = tokio::sync::mpsc::Receiver<T>;
pub type Responder<T> = tokio::sync::oneshot::Sender<T>;
pub type UnboundedSender<T> = tokio::sync::mpsc::UnboundedSender<T>;
pub type UnboundedReceiver<T> = tokio::sync::mpsc::UnboundedReceiver<T>;
