//! Treap of demand-change events with prefix-sum aggregates.
//!
//! Each placed job contributes a `+weight` event at its start and a
//! `-weight` event at its finish. Events are ordered by time, ends before
//! starts at equal times, so the running prefix sum after the last event at
//! `t` is the level during `[t, t + 1)`. Every node caches the sum, the
//! largest and smallest prefix of its subtree and the key span it covers;
//! that is enough to answer peak and first-crossing queries on a range
//! without visiting whole subtrees.

use super::{EventKind, SkylineEvent, TimeRange, EPSILON};
use crate::problem::{JobId, Time};

const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    time: Time,
    kind: EventKind,
    job: JobId,
}

impl EventKey {
    /// Smallest key at `time`.
    fn at(time: Time) -> Self {
        Self {
            time,
            kind: EventKind::End,
            job: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    key: EventKey,
    delta: f64,
    priority: u64,
    left: usize,
    right: usize,
    sum: f64,
    max_prefix: f64,
    min_prefix: f64,
    min_key: EventKey,
    max_key: EventKey,
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[derive(Debug, Clone)]
pub struct ProfileTree {
    /// Slot `2j` holds the start event of job `j`, `2j + 1` its end event.
    nodes: Vec<Node>,
    root: usize,
    starts: Vec<Option<Time>>,
    durations: Vec<Time>,
    weights: Vec<f64>,
}

impl ProfileTree {
    pub fn new(durations: Vec<Time>, weights: Vec<f64>) -> Self {
        debug_assert_eq!(durations.len(), weights.len());
        let nodes = (0..2 * durations.len())
            .map(|slot| Node {
                key: EventKey::at(0),
                delta: 0.0,
                priority: splitmix64(slot as u64),
                left: NIL,
                right: NIL,
                sum: 0.0,
                max_prefix: 0.0,
                min_prefix: 0.0,
                min_key: EventKey::at(0),
                max_key: EventKey::at(0),
            })
            .collect();
        Self {
            nodes,
            root: NIL,
            starts: vec![None; durations.len()],
            durations,
            weights,
        }
    }

    /// Jobs without duration or weight never change the level.
    fn tracked(&self, job: JobId) -> bool {
        self.durations[job] > 0 && self.weights[job] > 0.0
    }

    pub fn start_of(&self, job: JobId) -> Option<Time> {
        self.starts[job]
    }

    pub fn insert(&mut self, job: JobId, start: Time) {
        debug_assert!(self.starts[job].is_none(), "job {job} placed twice");
        self.starts[job] = Some(start);
        if !self.tracked(job) {
            return;
        }
        let events = [
            (2 * job, EventKind::Start, start, self.weights[job]),
            (
                2 * job + 1,
                EventKind::End,
                start + self.durations[job],
                -self.weights[job],
            ),
        ];
        for (slot, kind, time, delta) in events {
            let key = EventKey { time, kind, job };
            let node = &mut self.nodes[slot];
            node.key = key;
            node.delta = delta;
            node.left = NIL;
            node.right = NIL;
            self.pull(slot);
            let (less, rest) = self.split(self.root, key, false);
            let joined = self.merge(less, slot);
            self.root = self.merge(joined, rest);
        }
    }

    pub fn remove(&mut self, job: JobId) {
        let Some(start) = self.starts[job].take() else {
            return;
        };
        if !self.tracked(job) {
            return;
        }
        let keys = [
            EventKey {
                time: start,
                kind: EventKind::Start,
                job,
            },
            EventKey {
                time: start + self.durations[job],
                kind: EventKind::End,
                job,
            },
        ];
        for key in keys {
            let (less, rest) = self.split(self.root, key, false);
            let (_removed, greater) = self.split(rest, key, true);
            self.root = self.merge(less, greater);
        }
    }

    pub fn reposition(&mut self, job: JobId, start: Time) {
        if self.starts[job] == Some(start) {
            return;
        }
        self.remove(job);
        self.insert(job, start);
    }

    /// Largest level over all time, never below zero.
    pub fn max_level(&self) -> f64 {
        if self.root == NIL {
            0.0
        } else {
            self.nodes[self.root].max_prefix.max(0.0)
        }
    }

    /// Level during `[time, time + 1)`.
    pub fn level_at(&self, time: Time) -> f64 {
        self.prefix_before(EventKey::at(time + 1))
    }

    /// Largest level at any time in `range`.
    pub fn max_level_in(&self, range: TimeRange) -> f64 {
        if range.is_empty() {
            return 0.0;
        }
        let inside = self.range_max(
            self.root,
            EventKey::at(range.lo + 1),
            EventKey::at(range.hi),
            0.0,
        );
        self.level_at(range.lo).max(inside)
    }

    /// Leftmost maximal interval inside `range` where the level is at its
    /// peak for that range.
    pub fn max_level_range(&self, range: TimeRange) -> TimeRange {
        let peak = self.max_level_in(range);
        if range.is_empty() || peak <= EPSILON {
            return range;
        }
        let threshold = peak - EPSILON;

        let lo = if self.level_at(range.lo) >= threshold {
            range.lo
        } else {
            match self.find_first(self.root, EventKey::at(range.lo + 1), 0.0, threshold, true) {
                Some(key) if key.time < range.hi => key.time,
                _ => range.lo,
            }
        };

        let mut from = lo + 1;
        let hi = loop {
            match self.find_first(self.root, EventKey::at(from), 0.0, threshold, false) {
                None => break range.hi,
                Some(key) if key.time >= range.hi => break range.hi,
                // Same-time end/start pairs can dip below the peak mid-step
                Some(key) if self.level_at(key.time) >= threshold => from = key.time + 1,
                Some(key) => break key.time,
            }
        };
        TimeRange::new(lo, hi)
    }

    /// In-order events, ends before starts at equal times.
    pub fn events(&self) -> EventIter<'_> {
        let mut iter = EventIter {
            tree: self,
            stack: Vec::new(),
        };
        iter.push_left(self.root);
        iter
    }

    fn prefix_before(&self, key: EventKey) -> f64 {
        let mut acc = 0.0;
        let mut n = self.root;
        while n != NIL {
            let node = &self.nodes[n];
            if node.key < key {
                acc += self.sum(node.left) + node.delta;
                n = node.right;
            } else {
                n = node.left;
            }
        }
        acc
    }

    fn range_max(&self, n: usize, lo: EventKey, hi: EventKey, offset: f64) -> f64 {
        if n == NIL {
            return f64::NEG_INFINITY;
        }
        let node = &self.nodes[n];
        if node.max_key < lo || node.min_key >= hi {
            return f64::NEG_INFINITY;
        }
        if node.min_key >= lo && node.max_key < hi {
            return offset + node.max_prefix;
        }
        let mut best = self.range_max(node.left, lo, hi, offset);
        let own = offset + self.sum(node.left) + node.delta;
        if node.key >= lo && node.key < hi {
            best = best.max(own);
        }
        best.max(self.range_max(node.right, lo, hi, own))
    }

    /// First event at or after `from` whose prefix is `>= threshold`
    /// (`above`) or `< threshold` (`!above`).
    fn find_first(
        &self,
        n: usize,
        from: EventKey,
        offset: f64,
        threshold: f64,
        above: bool,
    ) -> Option<EventKey> {
        if n == NIL {
            return None;
        }
        let node = &self.nodes[n];
        if node.max_key < from {
            return None;
        }
        if node.min_key >= from {
            let hopeless = if above {
                offset + node.max_prefix < threshold
            } else {
                offset + node.min_prefix >= threshold
            };
            if hopeless {
                return None;
            }
        }
        if let Some(key) = self.find_first(node.left, from, offset, threshold, above) {
            return Some(key);
        }
        let own = offset + self.sum(node.left) + node.delta;
        let hit = if above { own >= threshold } else { own < threshold };
        if node.key >= from && hit {
            return Some(node.key);
        }
        self.find_first(node.right, from, own, threshold, above)
    }

    fn sum(&self, n: usize) -> f64 {
        if n == NIL {
            0.0
        } else {
            self.nodes[n].sum
        }
    }

    fn pull(&mut self, n: usize) {
        let Node {
            key,
            delta,
            left,
            right,
            ..
        } = self.nodes[n];

        let (left_sum, mut max_prefix, mut min_prefix, min_key) = if left == NIL {
            (0.0, f64::NEG_INFINITY, f64::INFINITY, key)
        } else {
            let l = &self.nodes[left];
            (l.sum, l.max_prefix, l.min_prefix, l.min_key)
        };
        let own = left_sum + delta;
        max_prefix = max_prefix.max(own);
        min_prefix = min_prefix.min(own);

        let (sum, max_key) = if right == NIL {
            (own, key)
        } else {
            let r = &self.nodes[right];
            max_prefix = max_prefix.max(own + r.max_prefix);
            min_prefix = min_prefix.min(own + r.min_prefix);
            (own + r.sum, r.max_key)
        };

        let node = &mut self.nodes[n];
        node.sum = sum;
        node.max_prefix = max_prefix;
        node.min_prefix = min_prefix;
        node.min_key = min_key;
        node.max_key = max_key;
    }

    /// Split into keys `< key` (`<= key` if inclusive) and the rest.
    fn split(&mut self, n: usize, key: EventKey, inclusive: bool) -> (usize, usize) {
        if n == NIL {
            return (NIL, NIL);
        }
        let node_key = self.nodes[n].key;
        let goes_left = if inclusive {
            node_key <= key
        } else {
            node_key < key
        };
        if goes_left {
            let (l, r) = self.split(self.nodes[n].right, key, inclusive);
            self.nodes[n].right = l;
            self.pull(n);
            (n, r)
        } else {
            let (l, r) = self.split(self.nodes[n].left, key, inclusive);
            self.nodes[n].left = r;
            self.pull(n);
            (l, n)
        }
    }

    /// Join two treaps where every key of `a` is below every key of `b`.
    fn merge(&mut self, a: usize, b: usize) -> usize {
        if a == NIL {
            return b;
        }
        if b == NIL {
            return a;
        }
        if self.nodes[a].priority > self.nodes[b].priority {
            let r = self.merge(self.nodes[a].right, b);
            self.nodes[a].right = r;
            self.pull(a);
            a
        } else {
            let l = self.merge(a, self.nodes[b].left);
            self.nodes[b].left = l;
            self.pull(b);
            b
        }
    }
}

/// In-order walk over the event treap.
pub struct EventIter<'a> {
    tree: &'a ProfileTree,
    stack: Vec<usize>,
}

impl EventIter<'_> {
    fn push_left(&mut self, mut n: usize) {
        while n != NIL {
            self.stack.push(n);
            n = self.tree.nodes[n].left;
        }
    }
}

impl Iterator for EventIter<'_> {
    type Item = SkylineEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.stack.pop()?;
        let node = &self.tree.nodes[n];
        let right = node.right;
        let event = SkylineEvent {
            time: node.key.time,
            job: node.key.job,
            kind: node.key.kind,
        };
        self.push_left(right);
        Some(event)
    }
}
