// sys/std.rs provides clock, semaphore and interrupt-context integration
// with std
//

use core::cell::Cell;
use core::time::Duration;

use cfg_if::cfg_if;

use std::time::Instant;
use std::sync::Condvar;
use std::sync::PoisonError;

use crate::traits::*;
use crate::Delta;
use crate::DeltaError;
use crate::itick;
use crate::utick;

// Sharing primitives, the inbox is the only thing that crosses threads
pub(crate) use std::sync::Arc;
pub(crate) use std::sync::Mutex;


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

cfg_if! {
    if #[cfg(feature="embedded-time")] {
        use embedded_time::duration::Generic;
        use embedded_time::duration::Milliseconds;
        use embedded_time::duration::Seconds;
        use embedded_time::fraction::Fraction;

        impl<T: embedded_time::TimeInt + TryInto<utick>> TryIntoDelta for Generic<T> {
            #[inline]
            fn try_into_delta(self) -> Result<Delta, DeltaError> {
                // scale to milliseconds, checked all the way
                let fraction = Fraction::new(1000, 1);
                fraction.checked_mul(self.scaling_factor())
                    .and_then(|fraction|
                        utick::try_from(*fraction.numerator()).ok()
                            .zip(utick::try_from(*fraction.denominator()).ok())
                    )
                    .and_then(|(num, den)|
                        self.integer().try_into().ok()
                            .and_then(|ticks| num.checked_mul(ticks))
                            .map(|ticks| ticks / den)
                            .and_then(|ticks| itick::try_from(ticks).ok())
                            .map(Delta::new)
                    )
                    .ok_or(DeltaError::Overflow)
            }
        }

        impl<T: embedded_time::TimeInt> TryIntoDelta for Milliseconds<T>
        where
            utick: TryFrom<T>
        {
            #[inline]
            fn try_into_delta(self) -> Result<Delta, DeltaError> {
                utick::try_from(self.0).ok()
                    .and_then(|ticks| itick::try_from(ticks).ok())
                    .map(Delta::new)
                    .ok_or(DeltaError::Overflow)
            }
        }

        impl<T: embedded_time::TimeInt> TryIntoDelta for Seconds<T>
        where
            utick: TryFrom<T>
        {
            #[inline]
            fn try_into_delta(self) -> Result<Delta, DeltaError> {
                utick::try_from(self.0).ok()
                    .and_then(|secs| secs.checked_mul(1000))
                    .and_then(|ticks| itick::try_from(ticks).ok())
                    .map(Delta::new)
                    .ok_or(DeltaError::Overflow)
            }
        }

        impl<T: embedded_time::TimeInt> TryFromDelta for Milliseconds<T>
        where
            T: TryFrom<utick>
        {
            #[inline]
            fn try_from_delta(delta: Delta) -> Result<Self, DeltaError> {
                T::try_from(delta.uticks()).ok()
                    .map(Milliseconds)
                    .ok_or(DeltaError::Overflow)
            }
        }
    }
}


// Time primitive
#[derive(Debug)]
pub struct SysClock {
    instant: Instant,
}

impl SysClock {
    pub fn new() -> Self {
        Self {
            instant: Instant::now(),
        }
    }
}

impl Default for SysClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SysClock {
    fn now(&self) -> utick {
        // truncating is fine, ticks are compared with wrapping arithmetic
        self.instant
            .elapsed()
            .as_millis()
            as utick
    }
}


// Semaphore primitive
//
// Unlike a condvar on its own this counts, so signals that arrive while
// nobody is waiting are not lost, and every signal wakes exactly one wait.
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

    fn wait_timeout(&self, delta: Delta) -> bool {
        // a deadline we can't represent is as good as forever
        let deadline = match Duration::try_from_delta(delta).ok()
            .and_then(|d| Instant::now().checked_add(d))
        {
            Some(deadline) => deadline,
            None => {
                self.wait();
                return true;
            }
        };

        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if *count > 0 {
                *count -= 1;
                return true;
            }

            // condvars may wake spuriously, so recompute what is left
            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            count = self.cond
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}


// Interrupt-context detection
//
// std has no interrupts, but hosts that emulate interrupt handlers on a
// thread (simulators, signal trampolines) can mark that code with isr, and
// sends from inside it are refused the same way they would be on target.
std::thread_local! {
    static IN_ISR: Cell<bool> = const { Cell::new(false) };
}

/// Are we running in an interrupt-equivalent context?
pub fn in_isr() -> bool {
    IN_ISR.with(|in_isr| in_isr.get())
}

/// Run f as if it were an interrupt handler
pub fn isr<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            IN_ISR.with(|in_isr| in_isr.set(self.0));
        }
    }

    let _restore = Restore(IN_ISR.with(|in_isr| in_isr.replace(true)));
    f()
}
