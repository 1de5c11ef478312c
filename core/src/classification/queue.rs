use crate::targets::TargetId;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Default)]
struct QueueState {
    stack: Vec<TargetId>,
    closed: bool,
}

/// Single-consumer LIFO queue of targets awaiting classification.
///
/// Producers never block. The consumer parks on a [`Notify`] while the stack
/// is empty and is woken by the next push or by [`close`](Self::close).
#[derive(Default)]
pub struct ClassificationQueue {
    state: Mutex<QueueState>,
    ready: Notify,
}

impl ClassificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns false once the queue has been closed.
    pub fn push(&self, id: TargetId) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.stack.push(id);
        }
        self.ready.notify_one();
        true
    }

    /// Most recently pushed target, if any.
    pub fn try_pop(&self) -> Option<TargetId> {
        self.lock().stack.pop()
    }

    /// Waits for the next target. Resolves to `None` once closed.
    pub async fn pop(&self) -> Option<TargetId> {
        loop {
            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(id) = state.stack.pop() {
                    return Some(id);
                }
            }
            self.ready.notified().await;
        }
    }

    /// Stops accepting work and hands back whatever was still queued.
    pub fn close(&self) -> Vec<TargetId> {
        let drained = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.stack)
        };
        self.ready.notify_waiters();
        self.ready.notify_one();
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
