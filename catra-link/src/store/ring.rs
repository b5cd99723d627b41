//! Fixed-capacity FIFO ring
//!
//! Push is O(1) and never allocates once the ring is full: the slot holding the
//! oldest element is overwritten in place.

/// Fixed-capacity ring that evicts its oldest element on overflow
#[derive(Debug, Clone)]
pub struct SampleRing<T> {
    data: Vec<T>,
    /// Index of the oldest element once the ring has wrapped
    head: usize,
    capacity: usize,
}

impl<T> SampleRing<T> {
    /// Create an empty ring
    ///
    /// A zero capacity is raised to one so the ring can always hold the
    /// latest element.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Append at the tail, returning the evicted element if the ring was full
    #[inline]
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.data.len() < self.capacity {
            self.data.push(value);
            None
        } else {
            let evicted = std::mem::replace(&mut self.data[self.head], value);
            self.head = (self.head + 1) % self.capacity;
            Some(evicted)
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Element at logical index (0 = oldest)
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.data.len() {
            Some(&self.data[(self.head + index) % self.data.len()])
        } else {
            None
        }
    }

    /// Most recently pushed element
    pub fn last(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (newer, older) = self.data.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Remove every element, returning them oldest first
    pub fn take(&mut self) -> Vec<T> {
        let mut out = std::mem::replace(&mut self.data, Vec::with_capacity(self.capacity));
        // head is non-zero only once the ring is full
        out.rotate_left(self.head);
        self.head = 0;
        out
    }

    /// Drop every element, keeping the capacity
    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }
}

impl<T: Clone> SampleRing<T> {
    /// Copy of the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.data.len());
        out.extend(self.iter().cloned());
        out
    }
}
