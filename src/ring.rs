//! Fixed-capacity ring buffer
//!
//! Backed by an array with a head index and a count; pushing into a full
//! buffer overwrites the oldest entry. Nothing outside this module touches the
//! wraparound arithmetic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T: Copy + Default, const N: usize> {
    items: [T; N],
    head: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        Self {
            items: [T::default(); N],
            head: 0,
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Append, overwriting the oldest entry when full
    pub fn push(&mut self, item: T) {
        if N == 0 {
            return;
        }
        self.items[self.head] = item;
        self.head = (self.head + 1) % N;
        if self.len < N {
            self.len += 1;
        }
    }

    /// Current window, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> + Clone + '_ {
        let start = (self.head + N - self.len) % N.max(1);
        (0..self.len).map(move |i| &self.items[(start + i) % N])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl<T, const N: usize> Serialize for RingBuffer<T, N>
where
    T: Copy + Default + Serialize,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, T, const N: usize> Deserialize<'de> for RingBuffer<T, N>
where
    T: Copy + Default + Deserialize<'de>,
{
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        let mut buffer = Self::new();
        for item in items {
            buffer.push(item);
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut ring: RingBuffer<u32, 3> = RingBuffer::new();
        assert!(ring.is_empty());
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.len(), 2);
        assert!(!ring.is_full());
        ring.push(3);
        assert!(ring.is_full());
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut ring: RingBuffer<u32, 3> = RingBuffer::new();
        for v in 1..=5 {
            ring.push(v);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_clear_resets_window() {
        let mut ring: RingBuffer<u32, 2> = RingBuffer::new();
        ring.push(7);
        ring.push(8);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.iter().count(), 0);
        ring.push(9);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![9]);
    }

    #[test]
    fn test_serde_keeps_order() {
        let mut ring: RingBuffer<u32, 3> = RingBuffer::new();
        for v in 1..=4 {
            ring.push(v);
        }
        let json = serde_json::to_string(&ring).unwrap();
        assert_eq!(json, "[2,3,4]");
        let back: RingBuffer<u32, 3> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }
}
