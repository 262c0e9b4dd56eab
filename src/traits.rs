
use core::fmt::Debug;

use crate::Delta;
use crate::DeltaError;
use crate::utick;


//// Into/From delta traits ////

/// A trait for converting to a delta, in milliseconds
pub trait TryIntoDelta {
    fn try_into_delta(self) -> Result<Delta, DeltaError>;
}

/// A trait for converting from a delta
pub trait TryFromDelta: Sized {
    fn try_from_delta(delta: Delta) -> Result<Self, DeltaError>;
}


//// System level traits ////

/// Some way to get the time, monotonic milliseconds
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> utick;
}

/// Signalling half of a semaphore, safe to call from any thread that is not
/// an interrupt
pub trait Signal: Send + Sync + Debug {
    fn signal(&self);
}

/// Counting semaphore, each signal is consumed by exactly one wait
pub trait Sema: Signal {
    fn wait(&self);

    /// Returns false if the delta expired before a signal was consumed
    fn wait_timeout(&self, delta: Delta) -> bool;
}
