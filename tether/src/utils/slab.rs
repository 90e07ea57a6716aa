/// A key into a [`Slab`].
///
/// A key pairs a slot index with the generation the slot had when the
/// value was inserted. Once the value is removed the slot's generation
/// advances, so a stale key never resolves to a newer occupant.
///
/// Keys round-trip through `u64` so they can travel as poller tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    /// Packs the key into a poller token.
    pub(crate) fn to_token(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Unpacks a poller token produced by [`to_token`](Self::to_token).
    pub(crate) fn from_token(token: u64) -> Self {
        Self {
            index: token as u32,
            generation: (token >> 32) as u32,
        }
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// A slab allocator with generation-checked keys.
///
/// A `Slab` stores values in a contiguous vector and hands out [`Key`]s
/// that stay valid until the value is removed. Freed slots are reused,
/// but with a bumped generation.
///
/// The reactor keeps its readiness registrations and pending lookups here:
/// a readiness event or timer that outlives its registration simply fails
/// to resolve instead of firing the wrong callback.
pub(crate) struct Slab<T> {
    /// Storage for values; vacant slots remember their next generation.
    slots: Vec<Slot<T>>,
    /// Stack of vacant slot indices that can be reused.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates an empty `Slab` with room for `capacity` values.
    ///
    /// Slots are only materialized as values are inserted; `capacity` just
    /// reserves the backing vector.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of values the slab can hold before growing.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let slab = Slab::<u32>::with_capacity(64);
    /// assert!(slab.is_empty());
    /// ```
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value and returns its key.
    ///
    /// A vacant slot is reused when available; otherwise the slab grows.
    ///
    /// # Returns
    ///
    /// A [`Key`] carrying the slot index and its current generation. It
    /// resolves until the value is removed.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let mut slab = Slab::with_capacity(1);
    /// let key = slab.insert("waiter");
    /// assert_eq!(slab.get(key), Some(&"waiter"));
    /// ```
    pub(crate) fn insert(&mut self, value: T) -> Key {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let generation = match self.slots[index] {
                Slot::Vacant { generation } => generation,
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };

            self.slots[index] = Slot::Occupied { generation, value };

            return Key {
                index: index as u32,
                generation,
            };
        }

        let index = self.slots.len();
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });

        Key {
            index: index as u32,
            generation: 0,
        }
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// The slot's generation is bumped, so `key` and every copy of it stop
    /// resolving.
    ///
    /// # Returns
    ///
    /// The value, or `None` if the key is stale or was never issued.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let index = key.index as usize;

        match self.slots.get(index) {
            Some(Slot::Occupied { generation, .. }) if *generation == key.generation => {}
            _ => return None,
        }

        let next = Slot::Vacant {
            generation: key.generation.wrapping_add(1),
        };

        match std::mem::replace(&mut self.slots[index], next) {
            Slot::Occupied { value, .. } => {
                self.free.push(index);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }

    /// Returns a reference to the value stored under `key`, if it is live.
    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.slots.get(key.index as usize) {
            Some(Slot::Occupied { generation, value }) if *generation == key.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Returns `true` if `key` still refers to a live value.
    #[cfg(test)]
    pub(crate) fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of live values.
    ///
    /// Vacant slots waiting for reuse are not counted.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the slab holds no live values.
    ///
    /// The reactor uses this to decide whether the loop has anything left
    /// to wait for.
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every live value, returning them in slot order.
    ///
    /// Keys issued before the drain are invalidated.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);

        for index in 0..self.slots.len() {
            if let Slot::Occupied { generation, .. } = self.slots[index] {
                let key = Key {
                    index: index as u32,
                    generation,
                };

                if let Some(value) = self.remove(key) {
                    values.push(value);
                }
            }
        }

        values
    }
}
