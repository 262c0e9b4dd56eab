//! A generation-checked slot arena
//!
//! Values live in slots addressed by Key, an index plus the generation the
//! slot had when the value went in. Releasing a slot bumps its generation,
//! so a stale key never resolves to whatever reuses the slot later. A slot
//! whose generation runs out is retired instead of wrapping.

use core::fmt;

use crate::Error;


/// Slot index + generation
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) struct Key {
    index: u32,
    gen: u32,
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.gen)
    }
}

#[derive(Debug)]
struct Slot<T> {
    gen: u32,
    value: Option<T>,
}

pub(crate) struct Slab<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    limit: Option<usize>,
}

impl<T> fmt::Debug for Slab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T> Slab<T> {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            limit,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Insert a value, on failure nothing changes and the value is dropped
    pub(crate) fn insert(&mut self, value: T) -> Result<Key, Error> {
        if self.limit.map_or(false, |limit| self.len >= limit) {
            return Err(Error::NoMem);
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| Error::NoMem)?;

                // the free list must always be able to take back every
                // slot, so removal never needs to allocate
                self.slots.try_reserve(1).map_err(|_| Error::NoMem)?;
                self.free.try_reserve(self.slots.len()+1 - self.free.len())
                    .map_err(|_| Error::NoMem)?;

                self.slots.push(Slot { gen: 0, value: None });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        self.len += 1;

        Ok(Key { index, gen: slot.gen })
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        self.slots.get(key.index as usize)
            .filter(|slot| slot.gen == key.gen)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.slots.get_mut(key.index as usize)
            .filter(|slot| slot.gen == key.gen)
            .and_then(|slot| slot.value.as_mut())
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// Remove a value, giving it back so the caller decides when it drops
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)
            .filter(|slot| slot.gen == key.gen)?;
        let value = slot.value.take()?;

        self.len -= 1;

        // out of generations, never hand this slot out again
        if slot.gen == u32::MAX {
            return Some(value);
        }

        slot.gen += 1;
        self.free.push(key.index);

        Some(value)
    }
}
