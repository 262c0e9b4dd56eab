// sys/loom.rs swaps the std primitives for loom's, so the inbox hand-off
// can be model checked
//

use core::time::Duration;

use std::sync::PoisonError;

use loom::sync::Condvar;
use loom::sync::atomic::AtomicU64;
use loom::sync::atomic::Ordering;

use crate::traits::*;
use crate::Delta;
use crate::DeltaError;
use crate::itick;
use crate::utick;

// Sharing primitives, the inbox is the only thing that crosses threads
pub(crate) use loom::sync::Arc;
pub(crate) use loom::sync::Mutex;


// Delta conversions
impl TryIntoDelta for Duration {
    #[inline]
    fn try_into_delta(self) -> Result<Delta, DeltaError> {
        itick::try_from(self.as_millis()).ok()
            .map(Delta::new)
            .ok_or(DeltaError::Overflow)
    }
}

impl TryFromDelta for Duration {
    #[inline]
    fn try_from_delta(delta: Delta) -> Result<Self, DeltaError> {
        u64::try_from(delta.uticks()).ok()
            .map(Duration::from_millis)
            .ok_or(DeltaError::Overflow)
    }
}


// Time primitive
#[derive(Debug)]
pub struct SysClock();

loom::lazy_static! {
    static ref TEV_TICK: AtomicU64 = AtomicU64::new(0);
}

impl SysClock {
    pub fn new() -> Self {
        Self()
    }

    // In order for loom to work, we need to constrain our clock to be
    // deterministic, instead of actually tracking time we open this up
    // to let the tests set the time artificially.
    pub fn set_now(now: utick) {
        TEV_TICK.store(now as u64, Ordering::SeqCst);
    }
}

impl Default for SysClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SysClock {
    fn now(&self) -> utick {
        TEV_TICK.load(Ordering::SeqCst) as utick
    }
}


// Semaphore primitive
#[derive(Debug)]
pub struct SysSema {
    count: Mutex<usize>,
    cond: Condvar,
}

impl SysSema {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }
}

impl Default for SysSema {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal for SysSema {
    fn signal(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        drop(count);

        self.cond.notify_one();
    }
}

impl Sema for SysSema {
    fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count == 0 {
            count = self.cond
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }

        *count -= 1;
    }

    fn wait_timeout(&self, _delta: Delta) -> bool {
        // loom has no notion of time passing, so any timeout expires
        // immediately unless a signal is already pending
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }
}


// Interrupt-context detection, loom threads are never interrupts
pub fn in_isr() -> bool {
    false
}

pub fn isr<R>(f: impl FnOnce() -> R) -> R {
    f()
}
