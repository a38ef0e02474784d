//! Sorted intrusive queue.
//!
//! Every scheduler list is the same structure: a doubly-linked list whose
//! links are embedded in the member records and whose ends meet at a sentinel
//! (`None` in a link). Members are kept in non-increasing `value` order; a new
//! member is placed behind every member of equal value, which gives FIFO
//! order among equals.
//!
//! A record can sit in several queues at once by embedding one [`Link`] per
//! role. The role type selects which link a queue uses and which end it
//! serves first:
//!
//! | role       | key                | front |
//! |------------|--------------------|-------|
//! | readiness  | priority           | head  |
//! | delay      | absolute wake tick | tail  |
//! | timer      | absolute expiry    | tail  |
//! | chain      | requester priority | head  |
//!
//! Serving deadline queues from the tail yields the smallest (soonest) key
//! first even though the list itself is sorted descending.

use core::marker::PhantomData;

use crate::errors::{KernelResult, PreconditionViolation};
use crate::mem::Arena;

/// Ordering key stored in a link.
pub type Key = u64;

/// Embedded queue node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Link {
    next: Option<usize>,
    prev: Option<usize>,
    value: Key,
}

impl Link {
    pub const fn new() -> Self {
        Self {
            next: None,
            prev: None,
            value: 0,
        }
    }

    pub fn value(&self) -> Key {
        self.value
    }

    /// Set the ordering key. Only valid while the owner is not queued on
    /// this link.
    pub fn set_value(&mut self, value: Key) {
        self.value = value;
    }
}

/// End of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Head,
    Tail,
}

/// A queue role: which end is served first.
pub trait Role {
    const FRONT: End;
}

/// A record that embeds a link for role `R`.
pub trait Member<R: Role> {
    fn link(&self) -> &Link;
    fn link_mut(&mut self) -> &mut Link;
}

fn link<R: Role, T: Member<R>>(nodes: &Arena<T>, ix: usize) -> &Link {
    <T as Member<R>>::link(&nodes[ix])
}

fn link_mut<R: Role, T: Member<R>>(nodes: &mut Arena<T>, ix: usize) -> &mut Link {
    <T as Member<R>>::link_mut(&mut nodes[ix])
}

/// Sentinel of a sorted queue of arena members.
#[derive(Debug)]
pub struct SortedQueue<R> {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    _role: PhantomData<fn() -> R>,
}

impl<R: Role> SortedQueue<R> {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _role: PhantomData,
        }
    }

    /// Reset to empty without touching former members.
    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    /// The member this role serves first.
    pub fn front(&self) -> Option<usize> {
        match R::FRONT {
            End::Head => self.head,
            End::Tail => self.tail,
        }
    }

    /// Member following `ix`, or `None` at the end.
    pub fn next<T: Member<R>>(&self, nodes: &Arena<T>, ix: usize) -> Option<usize> {
        link::<R, T>(nodes, ix).next
    }

    pub fn pop_head<T: Member<R>>(&mut self, nodes: &mut Arena<T>) -> KernelResult<usize> {
        let ix = self.head.ok_or(PreconditionViolation::EmptyQueue)?;
        self.unlink(nodes, ix);
        Ok(ix)
    }

    pub fn pop_tail<T: Member<R>>(&mut self, nodes: &mut Arena<T>) -> KernelResult<usize> {
        let ix = self.tail.ok_or(PreconditionViolation::EmptyQueue)?;
        self.unlink(nodes, ix);
        Ok(ix)
    }

    pub fn pop_front<T: Member<R>>(&mut self, nodes: &mut Arena<T>) -> KernelResult<usize> {
        match R::FRONT {
            End::Head => self.pop_head(nodes),
            End::Tail => self.pop_tail(nodes),
        }
    }

    /// Unlink a member from anywhere in the queue.
    pub fn remove<T: Member<R>>(&mut self, nodes: &mut Arena<T>, ix: usize) {
        self.unlink(nodes, ix);
    }

    /// Insert behind every member whose value is greater than or equal to
    /// the new member's value.
    pub fn insert<T: Member<R>>(&mut self, nodes: &mut Arena<T>, ix: usize) {
        let value = link::<R, T>(nodes, ix).value;

        let mut cursor = self.head;
        while let Some(c) = cursor {
            let l = link::<R, T>(nodes, c);
            if l.value < value {
                break;
            }
            cursor = l.next;
        }

        let prev = match cursor {
            Some(c) => link::<R, T>(nodes, c).prev,
            None => self.tail,
        };
        {
            let l = link_mut::<R, T>(nodes, ix);
            l.next = cursor;
            l.prev = prev;
        }
        match cursor {
            Some(c) => link_mut::<R, T>(nodes, c).prev = Some(ix),
            None => self.tail = Some(ix),
        }
        match prev {
            Some(p) => link_mut::<R, T>(nodes, p).next = Some(ix),
            None => self.head = Some(ix),
        }
        self.len += 1;
    }

    /// Move the whole membership to `dst` in O(1). `self` is left empty.
    ///
    /// Boundary links name the sentinel rather than a particular queue, so
    /// no member needs relinking.
    pub fn copy_into(&mut self, dst: &mut SortedQueue<R>) {
        debug_assert!(dst.is_empty(), "copy target must be empty");
        dst.head = self.head;
        dst.tail = self.tail;
        dst.len = self.len;
        self.init();
    }

    /// Visit members head to tail and return the first one `pred` accepts.
    pub fn traverse<T, F>(&self, nodes: &Arena<T>, mut pred: F) -> Option<usize>
    where
        T: Member<R>,
        F: FnMut(usize, &T) -> bool,
    {
        let mut cursor = self.head;
        while let Some(ix) = cursor {
            if pred(ix, &nodes[ix]) {
                return Some(ix);
            }
            cursor = link::<R, T>(nodes, ix).next;
        }
        None
    }

    /// Iterate member indices head to tail.
    pub fn iter<'a, T: Member<R>>(&self, nodes: &'a Arena<T>) -> Iter<'a, R, T> {
        Iter {
            nodes,
            cursor: self.head,
            _role: PhantomData,
        }
    }

    fn unlink<T: Member<R>>(&mut self, nodes: &mut Arena<T>, ix: usize) {
        let Link { next, prev, .. } = *link::<R, T>(nodes, ix);
        match prev {
            Some(p) => link_mut::<R, T>(nodes, p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => link_mut::<R, T>(nodes, n).prev = prev,
            None => self.tail = prev,
        }
        let l = link_mut::<R, T>(nodes, ix);
        l.next = None;
        l.prev = None;
        self.len -= 1;
    }
}

impl<R: Role> Default for SortedQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Head-to-tail iterator over queue members.
pub struct Iter<'a, R, T> {
    nodes: &'a Arena<T>,
    cursor: Option<usize>,
    _role: PhantomData<fn() -> R>,
}

impl<'a, R: Role, T: Member<R>> Iterator for Iter<'a, R, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let ix = self.cursor?;
        self.cursor = link::<R, T>(self.nodes, ix).next;
        Some(ix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    struct ByRank;
    struct ByDeadline;

    impl Role for ByRank {
        const FRONT: End = End::Head;
    }
    impl Role for ByDeadline {
        const FRONT: End = End::Tail;
    }

    #[derive(Default)]
    struct Item {
        id: u32,
        rank: Link,
        deadline: Link,
    }

    impl Member<ByRank> for Item {
        fn link(&self) -> &Link {
            &self.rank
        }
        fn link_mut(&mut self) -> &mut Link {
            &mut self.rank
        }
    }

    impl Member<ByDeadline> for Item {
        fn link(&self) -> &Link {
            &self.deadline
        }
        fn link_mut(&mut self) -> &mut Link {
            &mut self.deadline
        }
    }

    fn add(arena: &mut Arena<Item>, id: u32, rank: Key, deadline: Key) -> usize {
        let mut item = Item {
            id,
            ..Default::default()
        };
        item.rank.set_value(rank);
        item.deadline.set_value(deadline);
        arena.insert(item).index()
    }

    fn ids<R: Role>(q: &SortedQueue<R>, arena: &Arena<Item>) -> Vec<u32>
    where
        Item: Member<R>,
    {
        q.iter(arena).map(|ix| arena[ix].id).collect()
    }

    /// Seeded LCG, enough to shuffle insert orders deterministically.
    struct SimpleRng {
        state: u64,
    }

    impl SimpleRng {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            self.state = self
                .state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            min + ((self.state >> 33) % (max - min))
        }
    }

    #[test]
    fn empty_queue() {
        let mut arena: Arena<Item> = Arena::new();
        let mut q: SortedQueue<ByRank> = SortedQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.head(), None);
        assert_eq!(q.tail(), None);
        assert_eq!(
            q.pop_head(&mut arena),
            Err(PreconditionViolation::EmptyQueue.into())
        );
        assert_eq!(
            q.pop_tail(&mut arena),
            Err(PreconditionViolation::EmptyQueue.into())
        );
    }

    #[test]
    fn insert_is_descending_with_fifo_ties() {
        let mut arena = Arena::new();
        let mut q: SortedQueue<ByRank> = SortedQueue::new();
        for (id, rank) in [(1, 5), (2, 9), (3, 5), (4, 1), (5, 9), (6, 5)] {
            let ix = add(&mut arena, id, rank, 0);
            q.insert(&mut arena, ix);
        }
        assert_eq!(ids(&q, &arena), [2, 5, 1, 3, 6, 4]);
        assert_eq!(q.len(), 6);
    }

    #[test]
    fn head_and_tail_pops_never_collide() {
        let mut arena = Arena::new();
        let mut q: SortedQueue<ByRank> = SortedQueue::new();
        for id in 0..2 {
            let ix = add(&mut arena, id, 3, 0);
            q.insert(&mut arena, ix);
        }
        let first = q.pop_head(&mut arena).unwrap();
        let second = q.pop_tail(&mut arena).unwrap();
        assert_ne!(first, second);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_from_middle_and_next() {
        let mut arena = Arena::new();
        let mut q: SortedQueue<ByRank> = SortedQueue::new();
        let a = add(&mut arena, 1, 30, 0);
        let b = add(&mut arena, 2, 20, 0);
        let c = add(&mut arena, 3, 10, 0);
        for ix in [c, a, b] {
            q.insert(&mut arena, ix);
        }
        assert_eq!(q.next(&arena, a), Some(b));
        assert_eq!(q.next(&arena, c), None);

        q.remove(&mut arena, b);
        assert_eq!(ids(&q, &arena), [1, 3]);
        assert_eq!(q.next(&arena, a), Some(c));

        // Reinsertion after removal goes behind equals again.
        let d = add(&mut arena, 4, 30, 0);
        q.insert(&mut arena, d);
        q.remove(&mut arena, a);
        q.insert(&mut arena, a);
        assert_eq!(ids(&q, &arena), [4, 1, 3]);
    }

    #[test]
    fn deadline_role_serves_soonest_first() {
        let mut arena = Arena::new();
        let mut q: SortedQueue<ByDeadline> = SortedQueue::new();
        for (id, deadline) in [(50, 50), (10, 10), (30, 30)] {
            let ix = add(&mut arena, id, 0, deadline);
            q.insert(&mut arena, ix);
        }
        let mut order = Vec::new();
        while let Some(ix) = q.front() {
            assert_eq!(q.pop_front(&mut arena).unwrap(), ix);
            order.push(arena[ix].id);
        }
        assert_eq!(order, [10, 30, 50]);
    }

    #[test]
    fn one_record_in_two_roles() {
        let mut arena = Arena::new();
        let mut by_rank: SortedQueue<ByRank> = SortedQueue::new();
        let mut by_deadline: SortedQueue<ByDeadline> = SortedQueue::new();
        let a = add(&mut arena, 1, 1, 100);
        let b = add(&mut arena, 2, 2, 200);
        for ix in [a, b] {
            by_rank.insert(&mut arena, ix);
            by_deadline.insert(&mut arena, ix);
        }
        by_rank.remove(&mut arena, b);
        assert_eq!(ids(&by_rank, &arena), [1]);
        assert_eq!(ids(&by_deadline, &arena), [2, 1]);
    }

    #[test]
    fn copy_moves_membership() {
        let mut arena = Arena::new();
        let mut src: SortedQueue<ByRank> = SortedQueue::new();
        for (id, rank) in [(1, 3), (2, 7), (3, 3)] {
            let ix = add(&mut arena, id, rank, 0);
            src.insert(&mut arena, ix);
        }
        let (head, tail) = (src.head(), src.tail());

        let mut dst = SortedQueue::new();
        src.copy_into(&mut dst);

        assert!(src.is_empty());
        assert_eq!(src.len(), 0);
        assert_eq!(dst.head(), head);
        assert_eq!(dst.tail(), tail);
        assert_eq!(ids(&dst, &arena), [2, 1, 3]);

        // The moved queue stays fully operational.
        let t = dst.pop_tail(&mut arena).unwrap();
        assert_eq!(arena[t].id, 3);
        assert_eq!(ids(&dst, &arena), [2, 1]);

        let mut empty: SortedQueue<ByRank> = SortedQueue::new();
        let mut other = SortedQueue::new();
        empty.copy_into(&mut other);
        assert!(other.is_empty());
    }

    #[test]
    fn traverse_stops_at_first_match() {
        let mut arena = Arena::new();
        let mut q: SortedQueue<ByRank> = SortedQueue::new();
        for (id, rank) in [(1, 9), (2, 5), (3, 5)] {
            let ix = add(&mut arena, id, rank, 0);
            q.insert(&mut arena, ix);
        }
        let mut visited = 0;
        let hit = q.traverse(&arena, |_, item| {
            visited += 1;
            item.rank.value() == 5
        });
        assert_eq!(hit.map(|ix| arena[ix].id), Some(2));
        assert_eq!(visited, 2);
        assert_eq!(q.traverse(&arena, |_, item| item.id == 42), None);
        assert_eq!(ids(&q, &arena), [1, 2, 3]);
    }

    #[test]
    fn property_random_inserts_stay_sorted_and_stable() {
        let mut rng = SimpleRng::new(0x5eed_1234);
        for _round in 0..20 {
            let mut arena = Arena::new();
            let mut q: SortedQueue<ByRank> = SortedQueue::new();
            let count = rng.gen_range(1, 40) as u32;
            for id in 0..count {
                let ix = add(&mut arena, id, rng.gen_range(0, 6), 0);
                q.insert(&mut arena, ix);
            }

            let walk: Vec<usize> = q.iter(&arena).collect();
            assert_eq!(walk.len(), count as usize);
            for pair in walk.windows(2) {
                let (a, b) = (&arena[pair[0]], &arena[pair[1]]);
                assert!(a.rank.value() >= b.rank.value());
                if a.rank.value() == b.rank.value() {
                    assert!(a.id < b.id, "equal keys must keep insertion order");
                }
            }

            // Backward walk from the tail mirrors the forward walk.
            let mut back = Vec::new();
            let mut cursor = q.tail();
            while let Some(ix) = cursor {
                back.push(ix);
                cursor = arena[ix].rank.prev;
            }
            back.reverse();
            assert_eq!(back, walk);
        }
    }
}
