//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;

use tokio::task;
use tracing::Instrument;

/// A handle to a task created by [`Task::spawn`].
///
/// Dropping the handle aborts the task unless [`Task::detach`] was called.
/// Device connection loops rely on this: dropping the handle is how an
/// in-progress (re)connection attempt gets cancelled.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
    detached: bool,
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task in the current tracing span.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future.in_current_span()),
            detached: false,
        }
    }

    /// Detaches the task, meaning it will keep running after its handle is
    /// dropped.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    /// Returns whether the task has run to completion (or was aborted).
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Aborts the task right away, regardless of the detached flag.
    pub fn abort(&self) {
        self.join_handle.abort();
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, task::JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.join_handle.abort();
        }
    }
}
