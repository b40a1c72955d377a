use std::collections::TryReserveError;

/// Stable key into a [`Slab`]: slot index plus the generation the slot had
/// when the value was inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Key {
    pub(crate) fn to_token(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub(crate) fn from_token(token: u64) -> Self {
        Self {
            index: token as u32,
            generation: (token >> 32) as u32,
        }
    }
}

enum Slot<T> {
    Vacant,
    Occupied(T),
    // Value is temporarily owned by someone else (see `take`).
    Taken,
}

struct Entry<T> {
    generation: u32,
    slot: Slot<T>,
}

/// What `remove` found at a key.
pub(crate) enum Removed<T> {
    Value(T),
    /// The value was out on loan; the slot is freed and `restore` will refuse it.
    Taken,
    Missing,
}

pub(crate) struct Slab<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Slab<T> {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            entries: Vec::with_capacity(size),
            free: Vec::with_capacity(size),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn insert(&mut self, item: T) -> Result<Key, TryReserveError> {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.slot = Slot::Occupied(item);
            self.len += 1;

            return Ok(Key {
                index,
                generation: entry.generation,
            });
        }

        self.entries.try_reserve(1)?;
        self.free.try_reserve(1)?;

        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            slot: Slot::Occupied(item),
        });
        self.len += 1;

        Ok(Key {
            index,
            generation: 0,
        })
    }

    fn entry(&self, key: Key) -> Option<&Entry<T>> {
        self.entries
            .get(key.index as usize)
            .filter(|entry| entry.generation == key.generation)
    }

    fn entry_mut(&mut self, key: Key) -> Option<&mut Entry<T>> {
        self.entries
            .get_mut(key.index as usize)
            .filter(|entry| entry.generation == key.generation)
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.entry(key)?.slot {
            Slot::Occupied(ref item) => Some(item),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.entry_mut(key)?.slot {
            Slot::Occupied(ref mut item) => Some(item),
            _ => None,
        }
    }

    /// Moves the value out while keeping its slot reserved.
    pub(crate) fn take(&mut self, key: Key) -> Option<T> {
        let entry = self.entry_mut(key)?;
        if !matches!(entry.slot, Slot::Occupied(_)) {
            return None;
        }

        match std::mem::replace(&mut entry.slot, Slot::Taken) {
            Slot::Occupied(item) => Some(item),
            _ => None,
        }
    }

    /// Puts back a value moved out with `take`. Hands the value back if the
    /// slot was removed in the meantime.
    pub(crate) fn restore(&mut self, key: Key, item: T) -> Result<(), T> {
        match self.entry_mut(key) {
            Some(entry) if matches!(entry.slot, Slot::Taken) => {
                entry.slot = Slot::Occupied(item);
                Ok(())
            }
            _ => Err(item),
        }
    }

    pub(crate) fn remove(&mut self, key: Key) -> Removed<T> {
        let Some(entry) = self.entry_mut(key) else {
            return Removed::Missing;
        };

        let removed = match std::mem::replace(&mut entry.slot, Slot::Vacant) {
            Slot::Vacant => return Removed::Missing,
            Slot::Occupied(item) => Removed::Value(item),
            Slot::Taken => Removed::Taken,
        };

        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;

        removed
    }

    /// Removes every stored value. Values out on loan are forgotten.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len);

        for (index, entry) in self.entries.iter_mut().enumerate() {
            match std::mem::replace(&mut entry.slot, Slot::Vacant) {
                Slot::Vacant => continue,
                Slot::Occupied(item) => items.push(item),
                Slot::Taken => {}
            }

            entry.generation = entry.generation.wrapping_add(1);
            self.free.push(index as u32);
        }

        self.len = 0;
        items
    }
}
