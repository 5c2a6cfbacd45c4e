use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::oneshot::{Receiver, Sender};

use crate::ledger::store::WebhookCall;

/// How a lane finished one delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    Processed,
    Failed { reason: String },
}

/// A recorded call on its way to a lane, with an optional completion signal.
#[derive(Debug)]
pub struct Delivery {
    pub call: WebhookCall,
    pub ack: Option<Sender<DeliveryStatus>>,
}

impl Delivery {
    pub fn new(call: WebhookCall) -> Self {
        Self { call, ack: None }
    }

    pub fn with_ack(call: WebhookCall) -> (Self, Receiver<DeliveryStatus>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        (
            Self {
                call,
                ack: Some(tx),
            },
            rx,
        )
    }

    /// Reports the outcome to whoever is waiting; nobody listening is fine.
    pub fn acknowledge(self, status: DeliveryStatus) {
        if let Some(ack) = self.ack {
            let _ = ack.send(status);
        }
    }
}

/// FIFO handoff between the dispatcher and one worker lane.
pub trait DeliveryQueue: Send + Sync {
    fn push(&self, item: Delivery) -> Result<(), QueueError>;
    fn pop(&self) -> Receiver<Delivery>;
    fn len(&self) -> usize;
    fn close(&self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,
}

pub struct FifoDeliveryQueue {
    state: Mutex<QueueState>,
}

struct QueueState {
    items: VecDeque<Delivery>,
    waiters: VecDeque<Sender<Delivery>>,
    closed: bool,
}

impl FifoDeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                waiters: VecDeque::new(),
                closed: false,
            }),
        }
    }

    fn close_inner(&self) {
        let mut state = self.state.lock().expect("delivery queue poisoned");
        if state.closed {
            return;
        }
        state.closed = true;
        state.waiters.clear();
        state.items.clear();
    }
}

impl DeliveryQueue for FifoDeliveryQueue {
    fn push(&self, item: Delivery) -> Result<(), QueueError> {
        let mut pending = item;

        loop {
            let waiter = {
                let mut state = self.state.lock().expect("delivery queue poisoned");
                if state.closed {
                    return Err(QueueError::Closed);
                }
                match state.waiters.pop_front() {
                    Some(waiter) => waiter,
                    None => {
                        state.items.push_back(pending);
                        return Ok(());
                    }
                }
            };

            // A waiter whose receiver was dropped hands the item back.
            match waiter.send(pending) {
                Ok(()) => return Ok(()),
                Err(value) => pending = value,
            }
        }
    }

    fn pop(&self) -> Receiver<Delivery> {
        let (tx, rx) = tokio::sync::oneshot::channel();

        let mut state = self.state.lock().expect("delivery queue poisoned");
        if state.closed {
            drop(tx);
            return rx;
        }

        if let Some(item) = state.items.pop_front() {
            drop(state);
            if let Err(item) = tx.send(item) {
                let mut state = self.state.lock().expect("delivery queue poisoned");
                state.items.push_front(item);
            }
        } else {
            state.waiters.push_back(tx);
        }

        rx
    }

    fn len(&self) -> usize {
        let state = self.state.lock().expect("delivery queue poisoned");
        state.items.len()
    }

    fn close(&self) {
        self.close_inner();
    }
}

impl Drop for FifoDeliveryQueue {
    fn drop(&mut self) {
        self.close_inner();
    }
}

impl fmt::Debug for FifoDeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.lock() {
            Ok(state) => f
                .debug_struct("FifoDeliveryQueue")
                .field("pending_items", &state.items.len())
                .field("waiting_receivers", &state.waiters.len())
                .finish(),
            Err(_) => f
                .debug_struct("FifoDeliveryQueue")
                .field("poisoned", &true)
                .finish(),
        }
    }
}
