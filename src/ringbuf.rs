//! Fixed-capacity ring of byte records.
//!
//! A bounded history structure: records are kept in arrival order, and once
//! the ring is full each new record displaces the oldest one. The ring has
//! no locking of its own; callers are responsible for serializing access.

/// Circular buffer of owned byte records with overwrite-on-full semantics.
#[derive(Debug)]
pub struct RecordRing {
    entries: Vec<Vec<u8>>,
    /// Next slot to write.
    in_pos: usize,
    /// Oldest stored record.
    out_pos: usize,
    full: bool,
}

impl RecordRing {
    /// Create an empty ring holding at most `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be nonzero");
        Self {
            entries: vec![Vec::new(); capacity],
            in_pos: 0,
            out_pos: 0,
            full: false,
        }
    }

    /// Maximum number of records the ring can hold.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        if self.full {
            self.capacity()
        } else if self.in_pos >= self.out_pos {
            self.in_pos - self.out_pos
        } else {
            self.in_pos + self.capacity() - self.out_pos
        }
    }

    /// Check if the ring holds no records.
    pub fn is_empty(&self) -> bool {
        !self.full && self.in_pos == self.out_pos
    }

    /// Check if the next push will displace the oldest record.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Total byte count across all stored records.
    pub fn total_bytes(&self) -> usize {
        self.iter().map(|record| record.len()).sum()
    }

    /// Store a record at the write position.
    ///
    /// When the ring is full the oldest record is displaced and returned,
    /// so the caller decides what happens to it.
    pub fn push(&mut self, record: Vec<u8>) -> Option<Vec<u8>> {
        let displaced = if self.full {
            // in_pos == out_pos while full, so this slot holds the oldest
            Some(std::mem::replace(&mut self.entries[self.in_pos], record))
        } else {
            self.entries[self.in_pos] = record;
            None
        };

        self.in_pos = (self.in_pos + 1) % self.capacity();
        if self.full {
            self.out_pos = self.in_pos;
        }
        self.full = self.in_pos == self.out_pos;

        displaced
    }

    /// Locate the record containing byte `offset` of the concatenation of
    /// all stored records, oldest first.
    ///
    /// Returns the record and the position inside it, or `None` when
    /// `offset` is past the end of the stored content.
    pub fn find(&self, offset: usize) -> Option<(&[u8], usize)> {
        let mut skipped = 0;
        for record in self.iter() {
            if offset < skipped + record.len() {
                return Some((record, offset - skipped));
            }
            skipped += record.len();
        }
        None
    }

    /// Iterate over stored records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.len()).map(move |i| {
            let idx = (self.out_pos + i) % self.capacity();
            self.entries[idx].as_slice()
        })
    }
}
