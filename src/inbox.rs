//! The cross-thread hand-off into the loop
//!
//! A mutex-guarded FIFO paired with a counting semaphore. The mutex is only
//! held to push or pop, never while waiting, and the semaphore's count
//! always equals the number of queued events: it is signalled after a push
//! lands and consumed by the wait that precedes every pop.

use std::collections::VecDeque;
use std::sync::PoisonError;

use crate::sys;
use crate::sys::Mutex;
use crate::sys::SysSema;
use crate::traits::*;
use crate::Delta;
use crate::Error;
use crate::EventHandle;


/// An event waiting for the loop, the payload is owned, never borrowed
#[derive(Debug)]
pub(crate) struct QueuedEvent {
    pub(crate) target: EventHandle,
    pub(crate) data: Vec<u8>,
}

#[derive(Debug)]
struct Fifo {
    queue: VecDeque<QueuedEvent>,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct Inbox {
    fifo: Mutex<Fifo>,
    sema: SysSema,
    limit: Option<usize>,
}

impl Inbox {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            fifo: Mutex::new(Fifo {
                queue: VecDeque::new(),
                closed: false,
            }),
            sema: SysSema::new(),
            limit,
        }
    }

    /// Number of events not yet taken by the loop
    pub(crate) fn len(&self) -> usize {
        self.fifo.lock().unwrap_or_else(PoisonError::into_inner)
            .queue.len()
    }

    /// Copy data and queue it for target, callable from any thread that is
    /// not an interrupt
    pub(crate) fn push(&self, target: EventHandle, data: &[u8]) -> Result<(), Error> {
        // the semaphore may block internally, which interrupts can't do
        if sys::in_isr() {
            log::warn!("tev: refusing to send event to {:?} from interrupt context", target);
            return Err(Error::Isr);
        }

        // copy before taking the lock, so the lock only covers the push
        let mut copy = Vec::new();
        copy.try_reserve_exact(data.len()).map_err(|_| Error::NoMem)?;
        copy.extend_from_slice(data);

        let mut fifo = self.fifo.lock().unwrap_or_else(PoisonError::into_inner);
        if fifo.closed {
            drop(fifo);
            log::warn!("tev: refusing to send event to {:?}, loop is gone", target);
            return Err(Error::Closed);
        }
        if self.limit.map_or(false, |limit| fifo.queue.len() >= limit) {
            return Err(Error::NoMem);
        }
        fifo.queue.try_reserve(1).map_err(|_| Error::NoMem)?;
        fifo.queue.push_back(QueuedEvent { target, data: copy });
        drop(fifo);

        self.sema.signal();
        Ok(())
    }

    /// Wait up to timeout (None = forever) for the next event
    pub(crate) fn pop(&self, timeout: Option<Delta>) -> Option<QueuedEvent> {
        let signaled = match timeout {
            Some(delta) => self.sema.wait_timeout(delta),
            None => {
                self.sema.wait();
                true
            }
        };

        if !signaled {
            return None;
        }

        let event = self.fifo.lock().unwrap_or_else(PoisonError::into_inner)
            .queue.pop_front();
        debug_assert!(event.is_some(), "semaphore count ran ahead of the fifo");
        event
    }

    /// Refuse any further events and release the ones still queued,
    /// returns how many were released
    pub(crate) fn close(&self) -> usize {
        let mut fifo = self.fifo.lock().unwrap_or_else(PoisonError::into_inner);
        fifo.closed = true;
        let queue = core::mem::take(&mut fifo.queue);
        drop(fifo);

        // drop payloads outside of the lock
        queue.len()
    }
}
