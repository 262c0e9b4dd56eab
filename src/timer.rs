//! Pending timeouts, a binary min-heap ordered by fire time
//!
//! The heap owns every timer record. Alongside it a handle index maps each
//! live TimerHandle to the record's current slot in the heap, which is what
//! lets cancellation pull an arbitrary timer out in O(log n). The two always
//! agree on membership, every path that moves a record updates the index.

use core::cmp::Ordering;
use core::fmt;

use std::collections::HashMap;

use crate::util::*;
use crate::Error;
use crate::TimerHandle;
use crate::utick;


/// A pending timeout, T is whatever the timer runs when it fires
pub(crate) struct Timer<T> {
    pub(crate) target: utick,
    pub(crate) handle: TimerHandle,
    pub(crate) cb: T,
}

impl<T> fmt::Debug for Timer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("target", &self.target)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<T> Timer<T> {
    // fire time first, equal fire times fall back to the handle so the
    // order is at least consistent, and follows submission order until
    // the handle counter wraps
    fn precedes(&self, other: &Timer<T>) -> bool {
        match scmp(self.target, other.target) {
            Ordering::Equal => self.handle < other.handle,
            ord => ord == Ordering::Less,
        }
    }
}

pub(crate) struct TimerHeap<T> {
    heap: Vec<Timer<T>>,
    index: HashMap<TimerHandle, usize>,
    limit: Option<usize>,
}

impl<T> fmt::Debug for TimerHeap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHeap")
            .field("len", &self.heap.len())
            .field("limit", &self.limit)
            .field("next", &self.heap.first())
            .finish()
    }
}

impl<T> TimerHeap<T> {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            heap: Vec::new(),
            index: HashMap::new(),
            limit,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.heap.capacity()
    }

    pub(crate) fn contains(&self, handle: TimerHandle) -> bool {
        self.index.contains_key(&handle)
    }

    pub(crate) fn peek(&self) -> Option<&Timer<T>> {
        self.heap.first()
    }

    /// Insert a timer, on failure nothing changes
    pub(crate) fn insert(&mut self, timer: Timer<T>) -> Result<(), Error> {
        debug_assert!(!self.index.contains_key(&timer.handle));

        // reserve room in both structures before touching either, past this
        // point nothing can fail, so a timer is never half-registered
        if self.limit.map_or(false, |limit| self.heap.len() >= limit) {
            return Err(Error::NoMem);
        }
        self.heap.try_reserve(1).map_err(|_| Error::NoMem)?;
        self.index.try_reserve(1).map_err(|_| Error::NoMem)?;

        let i = self.heap.len();
        self.index.insert(timer.handle, i);
        self.heap.push(timer);
        self.sift_up(i);
        Ok(())
    }

    /// Pop the earliest timer, if it is due at now
    pub(crate) fn pop_due(&mut self, now: utick) -> Option<Timer<T>> {
        match self.heap.first() {
            Some(timer) if scmp(timer.target, now) != Ordering::Greater => {
                self.remove_at(0)
            }
            _ => None,
        }
    }

    /// Pop the earliest timer, due or not
    #[cfg(test)]
    pub(crate) fn pop(&mut self) -> Option<Timer<T>> {
        self.remove_at(0)
    }

    /// Remove an arbitrary timer by its handle
    pub(crate) fn remove(&mut self, handle: TimerHandle) -> Option<Timer<T>> {
        let i = *self.index.get(&handle)?;
        self.remove_at(i)
    }

    fn remove_at(&mut self, i: usize) -> Option<Timer<T>> {
        if i >= self.heap.len() {
            return None;
        }

        let timer = self.heap.swap_remove(i);
        self.index.remove(&timer.handle);

        // whatever was last now sits in the hole, it may need to move
        // either way
        if i < self.heap.len() {
            self.index.insert(self.heap[i].handle, i);
            let i = self.sift_down(i);
            self.sift_up(i);
        }

        Some(timer)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].handle, a);
        self.index.insert(self.heap[b].handle, b);
    }

    fn sift_up(&mut self, mut i: usize) -> usize {
        while i > 0 {
            let parent = (i-1) / 2;
            if !self.heap[i].precedes(&self.heap[parent]) {
                break;
            }

            self.swap(i, parent);
            i = parent;
        }

        i
    }

    fn sift_down(&mut self, mut i: usize) -> usize {
        loop {
            let left = 2*i + 1;
            let right = 2*i + 2;

            let mut min = i;
            if left < self.heap.len() && self.heap[left].precedes(&self.heap[min]) {
                min = left;
            }
            if right < self.heap.len() && self.heap[right].precedes(&self.heap[min]) {
                min = right;
            }

            if min == i {
                return i;
            }

            self.swap(i, min);
            i = min;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use core::num::NonZeroUsize;

    fn timer(target: utick, handle: usize) -> Timer<usize> {
        Timer {
            target,
            handle: TimerHandle(NonZeroUsize::new(handle).unwrap()),
            cb: handle,
        }
    }

    fn handle(h: usize) -> TimerHandle {
        TimerHandle(NonZeroUsize::new(h).unwrap())
    }

    fn check_index<T>(heap: &TimerHeap<T>) {
        assert_eq!(heap.heap.len(), heap.index.len());
        for (i, timer) in heap.heap.iter().enumerate() {
            assert_eq!(heap.index[&timer.handle], i);
            if i > 0 {
                assert!(!timer.precedes(&heap.heap[(i-1)/2]));
            }
        }
    }

    #[test]
    fn test_heap_order() {
        let mut heap = TimerHeap::new(None);
        let targets = [50, 10, 90, 30, 70, 20, 80, 60, 40, 0];
        for (i, &target) in targets.iter().enumerate() {
            heap.insert(timer(target, i+1)).unwrap();
            check_index(&heap);
        }

        let mut fired = vec![];
        while let Some(timer) = heap.pop() {
            check_index(&heap);
            fired.push(timer.target);
        }

        assert_eq!(fired, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }

    #[test]
    fn test_heap_ties_follow_handles() {
        let mut heap = TimerHeap::new(None);
        for h in [3, 1, 4, 2] {
            heap.insert(timer(100, h)).unwrap();
        }

        let order = core::iter::from_fn(|| heap.pop())
            .map(|timer| timer.cb)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_heap_pop_due() {
        let mut heap = TimerHeap::new(None);
        heap.insert(timer(100, 1)).unwrap();
        heap.insert(timer(200, 2)).unwrap();

        assert!(heap.pop_due(99).is_none());
        assert_eq!(heap.pop_due(100).map(|t| t.cb), Some(1));
        assert!(heap.pop_due(150).is_none());
        assert_eq!(heap.pop_due(1000).map(|t| t.cb), Some(2));
        assert!(heap.pop_due(1000).is_none());
    }

    #[test]
    fn test_heap_remove_arbitrary() {
        let mut heap = TimerHeap::new(None);
        for h in 1..=100 {
            heap.insert(timer((h as utick * 37) % 101, h)).unwrap();
        }

        // remove every third timer from wherever it sits
        for h in (1..=100).step_by(3) {
            assert_eq!(heap.remove(handle(h)).map(|t| t.cb), Some(h));
            assert!(!heap.contains(handle(h)));
            check_index(&heap);
        }
        assert!(heap.remove(handle(1)).is_none());

        let mut last = 0;
        while let Some(timer) = heap.pop() {
            assert!(timer.target >= last);
            assert!(timer.cb % 3 != 1);
            last = timer.target;
        }
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_heap_limit() {
        let mut heap = TimerHeap::new(Some(2));
        heap.insert(timer(10, 1)).unwrap();
        heap.insert(timer(20, 2)).unwrap();
        assert_eq!(heap.insert(timer(5, 3)).unwrap_err(), Error::NoMem);

        // a failed insert leaves no trace
        assert_eq!(heap.len(), 2);
        assert!(!heap.contains(handle(3)));
        check_index(&heap);
        assert_eq!(heap.peek().map(|t| t.cb), Some(1));
    }

    #[test]
    fn test_heap_wrapping_targets() {
        let mut heap = TimerHeap::new(None);
        heap.insert(timer(5, 1)).unwrap();
        heap.insert(timer(utick::MAX - 5, 2)).unwrap();

        // just before the wrap comes first
        assert_eq!(heap.pop().map(|t| t.cb), Some(2));
        assert_eq!(heap.pop().map(|t| t.cb), Some(1));
    }
}
