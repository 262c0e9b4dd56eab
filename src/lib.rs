//! A tiny, single-threaded event loop
//!
//! Two kinds of work are multiplexed onto the thread that runs the loop:
//! timeouts, which fire in order of their deadlines, and events, byte
//! payloads that any thread may send to a registered handler. Callbacks
//! never overlap, they all run to completion on the loop thread.
//!
//! Only sending events is thread-safe, through a [`Sender`]. Everything else
//! takes `&mut Tev`, and `Tev` is neither `Send` nor `Sync`, so the loop's
//! structures need no locks.
//!
//! The loop returns once nothing could ever happen again: no timers are
//! pending and no event handlers are registered. A registered handler keeps
//! the loop alive even with nothing queued, that's how a loop waits for
//! events from other threads indefinitely.
//!
//! ``` rust
//! use std::cell::Cell;
//! use std::thread;
//! use tev::EventHandle;
//! use tev::Tev;
//!
//! let me = Cell::new(None::<EventHandle>);
//! let mut tev = Tev::new();
//! let handle = tev.set_event_handler(|tev, data| {
//!     assert_eq!(data, b"hi");
//!     // one event is all we wanted, let the loop finish
//!     tev.clear_event_handler(me.get().unwrap());
//! }).unwrap();
//! me.set(Some(handle));
//!
//! let sender = tev.sender();
//! thread::spawn(move || sender.send(handle, b"hi").unwrap());
//!
//! tev.run();
//! ```

#![deny(missing_debug_implementations)]

use core::fmt;
use core::num::NonZeroUsize;

use std::collections::VecDeque;

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature="loom")] {
        #[path="../sys/loom.rs"]
        pub mod sys;
    } else if #[cfg(feature="std")] {
        #[path="../sys/std.rs"]
        pub mod sys;
    } else {
        compile_error!("tev needs either the std or loom feature");
    }
}

pub mod traits;
mod util;
mod timer;
mod slab;
mod inbox;

use traits::*;
use util::*;
use timer::Timer;
use timer::TimerHeap;
use slab::Slab;
use inbox::Inbox;
use inbox::QueuedEvent;
use sys::Arc;
use sys::SysClock;


// Time primitives, milliseconds
cfg_if! {
    if #[cfg(tev_utick_width="128")] {
        #[allow(non_camel_case_types)] pub type utick = u128;
        #[allow(non_camel_case_types)] pub type itick = i128;
    } else if #[cfg(tev_utick_width="32")] {
        #[allow(non_camel_case_types)] pub type utick = u32;
        #[allow(non_camel_case_types)] pub type itick = i32;
    } else {
        #[allow(non_camel_case_types)] pub type utick = u64;
        #[allow(non_camel_case_types)] pub type itick = i64;
    }
}


/// Event loop errors
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// Out of memory, or a configured limit was reached
    NoMem,
    /// The loop this was sent to no longer exists
    Closed,
    /// Called from an interrupt context
    Isr,
    /// A delay too large to represent
    Overflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoMem    => write!(f, "Out of memory"),
            Error::Closed   => write!(f, "Event loop closed"),
            Error::Isr      => write!(f, "Not allowed in interrupt context"),
            Error::Overflow => write!(f, "Delay overflow"),
        }
    }
}

impl std::error::Error for Error {}


/// Delta conversion errors
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeltaError {
    Overflow
}

impl fmt::Display for DeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaError::Overflow => write!(f, "Delta overflow"),
        }
    }
}

impl std::error::Error for DeltaError {}

impl From<DeltaError> for Error {
    fn from(err: DeltaError) -> Error {
        match err {
            DeltaError::Overflow => Error::Overflow,
        }
    }
}


/// A relative amount of time, in milliseconds
///
/// Negative deltas are allowed, a timeout with a negative delay is simply
/// already due.
///
/// Timeouts can be at most Delta::MAX out, a quarter of the tick range.
/// Deadlines are compared with wrapping arithmetic, which only orders them
/// correctly while they sit within half the range of each other, so this
/// leaves as much room again for timers that are overdue because the loop
/// hasn't been stepped.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Delta(itick);

impl Delta {
    pub const ZERO: Delta = Delta(0);
    pub const MAX: Delta = Delta(itick::MAX/2);

    pub const fn new(ticks: itick) -> Delta {
        Delta(ticks)
    }

    pub const fn ticks(self) -> itick {
        self.0
    }

    /// Ticks, clamped to zero
    pub const fn uticks(self) -> utick {
        if self.0 < 0 { 0 } else { self.0 as utick }
    }
}

impl TryIntoDelta for Delta {
    #[inline]
    fn try_into_delta(self) -> Result<Delta, DeltaError> {
        Ok(self)
    }
}

macro_rules! int_into_delta {
    ($($t:ty),*) => {
        $(
            impl TryIntoDelta for $t {
                #[inline]
                fn try_into_delta(self) -> Result<Delta, DeltaError> {
                    itick::try_from(self).ok()
                        .map(Delta::new)
                        .ok_or(DeltaError::Overflow)
                }
            }
        )*
    }
}

int_into_delta!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);


/// Identifies a pending timeout
///
/// Handles come from a per-loop counter. After the counter wraps around a
/// handle value may be issued again, though never one that is still pending.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimerHandle(NonZeroUsize);

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimerHandle({})", self.0)
    }
}

/// Identifies a registered event handler, and is where events are sent
///
/// Handles are safe to copy to other threads. A handle to a cleared handler
/// never resolves again, even if its storage is reused.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct EventHandle(slab::Key);

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandle({:?})", self.0)
    }
}


type TimeoutCallback<'a> = Box<dyn FnOnce(&mut Tev<'a>) + 'a>;
type EventCallback<'a> = Box<dyn FnMut(&mut Tev<'a>, &[u8]) + 'a>;


/// Limits on what a loop may hold at once
///
/// Going over a limit fails the same way running out of memory does, with
/// Error::NoMem. None means unbounded.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Config {
    pub max_timers: Option<usize>,
    pub max_handlers: Option<usize>,
    pub max_events: Option<usize>,
}


/// What the loop is doing after a step
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    /// There may be more work, step again
    Running,
    /// No timers and no handlers, nothing can ever happen
    Terminated,
}


/// Snapshot of what a loop is holding
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Usage {
    pub timers: usize,
    pub handlers: usize,
    pub events: usize,
    pub timer_capacity: usize,
    pub handler_capacity: usize,
}


/// Event loop context
pub struct Tev<'a> {
    clock: SysClock,
    timers: TimerHeap<TimeoutCallback<'a>>,
    // a None callback is one detached while it runs
    handlers: Slab<Option<EventCallback<'a>>>,
    inbox: Arc<Inbox>,
    // events taken from the inbox while their handler was running, only
    // happens when a callback steps the loop itself
    deferred: VecDeque<QueuedEvent>,
    timer_seed: usize,
}

impl fmt::Debug for Tev<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tev")
            .field("clock", &self.clock)
            .field("timers", &self.timers)
            .field("handlers", &self.handlers)
            .field("inbox", &self.inbox)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

impl<'a> Tev<'a> {
    pub fn new() -> Tev<'a> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Tev<'a> {
        log::debug!("tev: new loop, {:?}", config);
        Tev {
            clock: SysClock::new(),
            timers: TimerHeap::new(config.max_timers),
            handlers: Slab::new(config.max_handlers),
            inbox: Arc::new(Inbox::new(config.max_events)),
            deferred: VecDeque::new(),
            timer_seed: 0,
        }
    }

    /// Milliseconds since the loop was created
    pub fn now(&self) -> utick {
        self.clock.now()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn handlers(&self) -> usize {
        self.handlers.len()
    }

    /// Events sent but not yet delivered
    pub fn pending_events(&self) -> usize {
        self.inbox.len() + self.deferred.len()
    }

    pub fn usage(&self) -> Usage {
        Usage {
            timers: self.timers.len(),
            handlers: self.handlers.len(),
            events: self.pending_events(),
            timer_capacity: self.timers.capacity(),
            handler_capacity: self.handlers.capacity(),
        }
    }
}


// Dispatch
impl<'a> Tev<'a> {
    /// Run until there is nothing left that could happen
    pub fn run(&mut self) {
        while self.step() == State::Running {}
    }

    /// One pass of the loop
    ///
    /// Fires every timer that is due, then sleeps until either the next
    /// timer is due or an event arrives, and delivers at most one event.
    /// Returns Terminated without sleeping if there are no timers and no
    /// handlers left.
    pub fn step(&mut self) -> State {
        // fire due timers, now is sampled once per pass, so a timer that
        // keeps rescheduling itself with no delay holds us for at most the
        // current tick
        let now = self.clock.now();
        while let Some(timer) = self.timers.pop_due(now) {
            log::trace!("tev: firing {:?}", timer.handle);
            (timer.cb)(self);
        }

        // events held back for a handler that has since returned go first,
        // they were taken from the inbox before anything still in it
        let ready = self.deferred.iter()
            .position(|event| !self.is_running(event.target));
        if let Some(event) = ready.and_then(|i| self.deferred.remove(i)) {
            self.deliver(event);
            return State::Running;
        }

        // how long can we sleep?
        let timeout = match self.timers.peek() {
            Some(timer) => Some(Delta::new(
                max(sdiff(timer.target, self.clock.now()), 0)
            )),
            None if self.handlers.len() > 0 => None,
            None => {
                log::debug!("tev: no timers or handlers left, terminating");
                return State::Terminated;
            }
        };

        if let Some(event) = self.inbox.pop(timeout) {
            self.deliver(event);
        }

        State::Running
    }

    // a handler is detached from its slot while it runs
    fn is_running(&self, handle: EventHandle) -> bool {
        matches!(self.handlers.get(handle.0), Some(None))
    }

    fn deliver(&mut self, event: QueuedEvent) {
        let handle = event.target;

        // detach the callback while it runs, it gets a &mut Tev and may
        // clear itself or register other handlers
        let cb = match self.handlers.get_mut(handle.0) {
            Some(slot) => slot.take(),
            None => {
                log::trace!("tev: dropping event for {:?}, no handler", handle);
                return;
            }
        };
        let mut cb = match cb {
            Some(cb) => cb,
            None => {
                // the handler is further up the stack, hold the event until
                // it returns
                if self.deferred.try_reserve(1).is_err() {
                    log::warn!("tev: dropping event for {:?}, out of memory", handle);
                    return;
                }
                log::trace!("tev: deferring event for running {:?}", handle);
                self.deferred.push_back(event);
                return;
            }
        };

        log::trace!("tev: delivering {} bytes to {:?}", event.data.len(), handle);
        cb(self, &event.data);

        // put it back, unless it was cleared in the meantime
        if let Some(slot) = self.handlers.get_mut(handle.0) {
            if slot.is_none() {
                *slot = Some(cb);
            }
        }
    }
}


// Timeouts
impl<'a> Tev<'a> {
    fn next_timer_handle(&mut self) -> TimerHandle {
        // 0 is never a handle, and a handle still pending after the counter
        // wraps around is skipped
        loop {
            self.timer_seed = self.timer_seed.wrapping_add(1);
            if let Some(seed) = NonZeroUsize::new(self.timer_seed) {
                let handle = TimerHandle(seed);
                if !self.timers.contains(handle) {
                    return handle;
                }
            }
        }
    }

    /// Call cb once, after delay milliseconds
    ///
    /// Negative delays are treated as 0, delays past Delta::MAX fail with
    /// Error::Overflow.
    pub fn set_timeout<D, F>(&mut self, delay: D, cb: F) -> Result<TimerHandle, Error>
    where
        D: TryIntoDelta,
        F: FnOnce(&mut Tev<'a>) + 'a
    {
        let delay = delay.try_into_delta()?;
        if delay > Delta::MAX {
            return Err(Error::Overflow);
        }
        let target = self.clock.now()
            .wrapping_add(delay.uticks());

        let handle = self.next_timer_handle();
        self.timers.insert(Timer {
            target,
            handle,
            cb: Box::new(cb),
        })?;

        log::trace!("tev: {:?} due at {}", handle, target);
        Ok(handle)
    }

    /// Cancel a pending timeout
    ///
    /// Returns false if there was nothing to cancel, which is not an error,
    /// the timeout may have fired or been cleared already.
    pub fn clear_timeout(&mut self, handle: TimerHandle) -> bool {
        self.timers.remove(handle).is_some()
    }
}


// Events
impl<'a> Tev<'a> {
    /// Register cb to receive events sent to the returned handle
    ///
    /// While any handler is registered the loop keeps running, waiting for
    /// events if it has nothing else to do.
    pub fn set_event_handler<F>(&mut self, cb: F) -> Result<EventHandle, Error>
    where
        F: FnMut(&mut Tev<'a>, &[u8]) + 'a
    {
        let key = self.handlers.insert(Some(Box::new(cb)))?;
        log::trace!("tev: registered {:?}", EventHandle(key));
        Ok(EventHandle(key))
    }

    /// Unregister a handler
    ///
    /// Events already queued for it are dropped when they come up. Returns
    /// false if there was nothing to clear, which is not an error.
    pub fn clear_event_handler(&mut self, handle: EventHandle) -> bool {
        self.handlers.remove(handle.0).is_some()
    }

    /// Send an event from the loop thread, see Sender::send
    pub fn send_event(&self, handle: EventHandle, data: &[u8]) -> Result<(), Error> {
        self.inbox.push(handle, data)
    }

    /// A handle other threads can send events through
    pub fn sender(&self) -> Sender {
        Sender {
            inbox: self.inbox.clone(),
        }
    }
}

impl Default for Tev<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Tev<'_> {
    fn drop(&mut self) {
        let events = self.inbox.close() + self.deferred.len();
        log::debug!(
            "tev: releasing {} timers, {} handlers, {} events",
            self.timers.len(),
            self.handlers.len(),
            events,
        );
    }
}


/// Sends events into a loop from any thread
///
/// Cheap to clone. Outlives the loop harmlessly, sends just fail with
/// Error::Closed once the loop is dropped.
#[derive(Debug, Clone)]
pub struct Sender {
    inbox: Arc<Inbox>,
}

impl Sender {
    /// Queue a copy of data for the handler at handle
    ///
    /// data is copied before this returns, so the buffer can be reused
    /// right away. Must not be called from an interrupt context, which
    /// fails with Error::Isr. Events for a handler that is cleared before
    /// they are delivered are silently dropped.
    pub fn send(&self, handle: EventHandle, data: &[u8]) -> Result<(), Error> {
        self.inbox.push(handle, data)
    }
}
