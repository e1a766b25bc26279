//! Retry ticket queue
//!
//! FIFO store of suspended requests. Each ticket captures the original
//! request config, the error it failed with, and a oneshot responder that
//! settles the suspended caller exactly once. The queue only stores and
//! drains; replaying is the pipeline's job, since replay needs the freshest
//! adapter headers and the authorization exemption sets.
//!
//! Draining takes the whole queue in a single lock acquisition, so tickets
//! enqueued while a flush is running wait for the next flush command instead
//! of being processed by the current one.

use std::collections::VecDeque;

use tokio::sync::{Mutex, oneshot};
use tracing::debug;
use uuid::Uuid;

use transport::{RequestConfig, TransportResponse};

use crate::error::{Error, Result};

/// What to do with the queued tickets on a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushCommand {
    /// Re-issue each original request with the freshest headers
    Retry,
    /// Reject each ticket with its original captured error
    Cancel,
}

impl FlushCommand {
    pub fn label(&self) -> &'static str {
        match self {
            FlushCommand::Retry => "retry",
            FlushCommand::Cancel => "cancel",
        }
    }
}

/// A suspended request awaiting an external resolution.
pub(crate) struct RetryTicket {
    pub id: Uuid,
    pub config: RequestConfig,
    /// The error captured at suspension time, returned on a cancel flush
    pub error: Error,
    pub responder: oneshot::Sender<Result<TransportResponse>>,
}

impl RetryTicket {
    /// Create a ticket and the receiver its caller suspends on.
    pub fn new(
        config: RequestConfig,
        error: Error,
    ) -> (Self, oneshot::Receiver<Result<TransportResponse>>) {
        let (responder, receiver) = oneshot::channel();
        (
            Self {
                id: Uuid::new_v4(),
                config,
                error,
                responder,
            },
            receiver,
        )
    }
}

/// FIFO queue of suspended requests, owned exclusively by the pipeline.
pub(crate) struct RetryQueue {
    tickets: Mutex<VecDeque<RetryTicket>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self {
            tickets: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn enqueue(&self, ticket: RetryTicket) {
        let mut tickets = self.tickets.lock().await;
        debug!(
            ticket_id = %ticket.id,
            url = %ticket.config.url,
            queued = tickets.len() + 1,
            "suspended request enqueued"
        );
        tickets.push_back(ticket);
    }

    /// Take every currently queued ticket, leaving the queue empty.
    pub async fn drain(&self) -> VecDeque<RetryTicket> {
        std::mem::take(&mut *self.tickets.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }
}
