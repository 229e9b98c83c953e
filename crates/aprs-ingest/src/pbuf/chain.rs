// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Intrusive singly linked list of packet buffers.
//!
//! Used for every free list (worker cache, global arena) and every queue
//! (worker pending queue, inbox). Links live inside the buffers, so moving a
//! packet between lists never allocates.
//!
//! # Performance
//!
//! - push_front / push_back / pop_front: O(1)
//! - append (splice another chain at the tail): O(1)

use super::PacketBuffer;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Owning list of boxed [`PacketBuffer`]s.
///
/// Nodes are leaked boxes; the chain owns them and turns them back into
/// `Box<PacketBuffer>` when they leave. FIFO order is `pop_front` order.
pub struct PacketChain {
    head: Option<NonNull<PacketBuffer>>,
    tail: Option<NonNull<PacketBuffer>>,
    len: usize,
    _owns: PhantomData<Box<PacketBuffer>>,
}

// SAFETY: the chain uniquely owns every node it points to; PacketBuffer is Send.
unsafe impl Send for PacketChain {}

impl PacketChain {
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _owns: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append one buffer at the tail.
    pub fn push_back(&mut self, mut buf: Box<PacketBuffer>) {
        buf.link = None;
        let node = NonNull::from(Box::leak(buf));
        match self.tail {
            // SAFETY: tail is a live node owned by this chain.
            Some(tail) => unsafe { (*tail.as_ptr()).link = Some(node) },
            None => self.head = Some(node),
        }
        self.tail = Some(node);
        self.len += 1;
    }

    /// Insert one buffer at the head (free-list push).
    pub fn push_front(&mut self, mut buf: Box<PacketBuffer>) {
        buf.link = self.head;
        let node = NonNull::from(Box::leak(buf));
        if self.tail.is_none() {
            self.tail = Some(node);
        }
        self.head = Some(node);
        self.len += 1;
    }

    /// Remove the head buffer.
    pub fn pop_front(&mut self) -> Option<Box<PacketBuffer>> {
        let node = self.head?;
        // SAFETY: node came from Box::leak in push_*/append and is owned by
        // this chain; after unlinking, nothing else refers to it.
        let mut buf = unsafe { Box::from_raw(node.as_ptr()) };
        self.head = buf.link.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(buf)
    }

    /// Move every buffer of `other` to the tail of `self`, leaving `other` empty.
    pub fn append(&mut self, other: &mut PacketChain) {
        let Some(other_head) = other.head.take() else {
            return;
        };
        match self.tail {
            // SAFETY: tail is a live node owned by this chain.
            Some(tail) => unsafe { (*tail.as_ptr()).link = Some(other_head) },
            None => self.head = Some(other_head),
        }
        self.tail = other.tail.take();
        self.len += other.len;
        other.len = 0;
    }

    /// Take the whole chain, leaving `self` empty.
    #[inline]
    pub fn take(&mut self) -> PacketChain {
        std::mem::take(self)
    }

    /// Split off up to `n` buffers from the front.
    pub fn split_front(&mut self, n: usize) -> PacketChain {
        let mut front = PacketChain::new();
        for _ in 0..n {
            match self.pop_front() {
                Some(buf) => front.push_back(buf),
                None => break,
            }
        }
        front
    }

    /// Borrowing iterator in chain order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head,
            remaining: self.len,
            _chain: PhantomData,
        }
    }
}

impl Default for PacketChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PacketChain {
    fn drop(&mut self) {
        while self.pop_front().is_some() {}
    }
}

impl std::fmt::Debug for PacketChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketChain").field("len", &self.len).finish()
    }
}

impl Extend<Box<PacketBuffer>> for PacketChain {
    fn extend<I: IntoIterator<Item = Box<PacketBuffer>>>(&mut self, iter: I) {
        for buf in iter {
            self.push_back(buf);
        }
    }
}

impl FromIterator<Box<PacketBuffer>> for PacketChain {
    fn from_iter<I: IntoIterator<Item = Box<PacketBuffer>>>(iter: I) -> Self {
        let mut chain = PacketChain::new();
        chain.extend(iter);
        chain
    }
}

/// Borrowing iterator over a [`PacketChain`].
pub struct Iter<'a> {
    next: Option<NonNull<PacketBuffer>>,
    remaining: usize,
    _chain: PhantomData<&'a PacketBuffer>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a PacketBuffer;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        // SAFETY: the chain is borrowed for 'a, so its nodes stay alive and unmodified.
        let buf = unsafe { &*node.as_ptr() };
        self.next = buf.link;
        self.remaining -= 1;
        Some(buf)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> IntoIterator for &'a PacketChain {
    type Item = &'a PacketBuffer;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Owning iterator; yields buffers in chain order.
pub struct IntoIter(PacketChain);

impl Iterator for IntoIter {
    type Item = Box<PacketBuffer>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.0.len, Some(self.0.len))
    }
}

impl IntoIterator for PacketChain {
    type Item = Box<PacketBuffer>;
    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbuf::Tier;

    fn tagged(tag: u8) -> Box<PacketBuffer> {
        let mut buf = PacketBuffer::new(Tier::Small, 16);
        buf.fill(&[&[tag]]).expect("fits");
        buf
    }

    fn tags(chain: &PacketChain) -> Vec<u8> {
        chain.iter().map(|b| b.as_bytes()[0]).collect()
    }

    #[test]
    fn test_push_back_is_fifo() {
        let mut chain = PacketChain::new();
        for tag in 1..=3 {
            chain.push_back(tagged(tag));
        }
        assert_eq!(chain.len(), 3);
        assert_eq!(tags(&chain), vec![1, 2, 3]);
        let first = chain.pop_front().expect("non-empty");
        assert_eq!(first.as_bytes(), &[1]);
        assert!(first.link.is_none());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_push_front_is_lifo() {
        let mut chain = PacketChain::new();
        chain.push_front(tagged(1));
        chain.push_front(tagged(2));
        assert_eq!(tags(&chain), vec![2, 1]);
        // tail stays valid after push_front on an empty chain
        chain.push_back(tagged(3));
        assert_eq!(tags(&chain), vec![2, 1, 3]);
    }

    #[test]
    fn test_append_splices_and_empties_source() {
        let mut a: PacketChain = (1..=2).map(tagged).collect();
        let mut b: PacketChain = (3..=5).map(tagged).collect();
        a.append(&mut b);
        assert!(b.is_empty());
        assert_eq!(b.len(), 0);
        assert_eq!(a.len(), 5);
        assert_eq!(tags(&a), vec![1, 2, 3, 4, 5]);

        // appending onto an empty chain adopts head and tail
        let mut empty = PacketChain::new();
        empty.append(&mut a);
        empty.push_back(tagged(6));
        assert_eq!(tags(&empty), vec![1, 2, 3, 4, 5, 6]);

        // appending an empty chain is a no-op
        let mut nothing = PacketChain::new();
        empty.append(&mut nothing);
        assert_eq!(empty.len(), 6);
    }

    #[test]
    fn test_pop_to_empty_resets_tail() {
        let mut chain: PacketChain = (1..=2).map(tagged).collect();
        assert!(chain.pop_front().is_some());
        assert!(chain.pop_front().is_some());
        assert!(chain.pop_front().is_none());
        chain.push_back(tagged(9));
        assert_eq!(tags(&chain), vec![9]);
    }

    #[test]
    fn test_split_front() {
        let mut chain: PacketChain = (1..=5).map(tagged).collect();
        let front = chain.split_front(2);
        assert_eq!(tags(&front), vec![1, 2]);
        assert_eq!(tags(&chain), vec![3, 4, 5]);
        let rest = chain.split_front(10);
        assert_eq!(rest.len(), 3);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_into_iter_drains_in_order() {
        let chain: PacketChain = (1..=4).map(tagged).collect();
        let out: Vec<u8> = chain.into_iter().map(|b| b.as_bytes()[0]).collect();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_drop_long_chain() {
        let chain: PacketChain = (0..100_000).map(|i| tagged(i as u8)).collect();
        assert_eq!(chain.len(), 100_000);
        drop(chain);
    }
}
