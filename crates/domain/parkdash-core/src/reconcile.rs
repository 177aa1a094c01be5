//! Keyed list diffing.
//!
//! Given the key order currently on screen and the key order wanted next,
//! compute removals, moves and inserts. Elements on the longest increasing
//! subsequence of their old positions stay put, so a rotation such as
//! `[A, B, C] -> [B, C, A]` costs a single move.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOp<K> {
    /// Create the element for `key` directly before `before` (at the end when `None`).
    Insert { key: K, before: Option<K> },
    /// Relocate an existing element directly before `before`.
    Move { key: K, before: Option<K> },
}

impl<K> OrderOp<K> {
    pub fn key(&self) -> &K {
        match self {
            OrderOp::Insert { key, .. } | OrderOp::Move { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlan<K> {
    pub removes: Vec<K>,
    /// Applied after `removes`, in order. Anchors always refer to elements
    /// that already sit in their final position.
    pub ops: Vec<OrderOp<K>>,
    /// Keys present both before and after, in desired order.
    pub retained: Vec<K>,
}

impl<K: Clone + Eq + Hash> OrderPlan<K> {
    pub fn is_noop(&self) -> bool {
        self.removes.is_empty() && self.ops.is_empty()
    }

    pub fn moves(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, OrderOp::Move { .. }))
            .count()
    }

    pub fn inserts(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, OrderOp::Insert { .. }))
            .count()
    }

    /// Replays the plan over `items`, calling `create` for inserted keys.
    pub fn apply_to<T>(
        &self,
        items: &mut Vec<T>,
        key_of: impl Fn(&T) -> &K,
        mut create: impl FnMut(&K) -> T,
    ) {
        let removed: HashSet<&K> = self.removes.iter().collect();
        items.retain(|item| !removed.contains(key_of(item)));

        for op in &self.ops {
            let (item, before) = match op {
                OrderOp::Insert { key, before } => (create(key), before),
                OrderOp::Move { key, before } => {
                    let Some(from) = items.iter().position(|i| key_of(i) == key) else {
                        continue;
                    };
                    (items.remove(from), before)
                }
            };
            let at = before
                .as_ref()
                .and_then(|anchor| items.iter().position(|i| key_of(i) == anchor))
                .unwrap_or(items.len());
            items.insert(at, item);
        }
    }
}

/// Keys are expected to be unique within each slice.
pub fn diff_order<K: Clone + Eq + Hash>(current: &[K], desired: &[K]) -> OrderPlan<K> {
    let desired_set: HashSet<&K> = desired.iter().collect();

    let removes: Vec<K> = current
        .iter()
        .filter(|k| !desired_set.contains(k))
        .cloned()
        .collect();

    // Positions among survivors only, so removals do not count as displacement.
    let old_index: HashMap<&K, usize> = current
        .iter()
        .filter(|k| desired_set.contains(k))
        .enumerate()
        .map(|(ix, k)| (k, ix))
        .collect();

    let sources: Vec<Option<usize>> = desired
        .iter()
        .map(|k| old_index.get(k).copied())
        .collect();
    let stable = longest_increasing_subsequence(&sources);

    let mut ops = Vec::new();
    let mut anchor: Option<K> = None;
    for (ix, key) in desired.iter().enumerate().rev() {
        match sources[ix] {
            None => ops.push(OrderOp::Insert {
                key: key.clone(),
                before: anchor.clone(),
            }),
            Some(_) if !stable[ix] => ops.push(OrderOp::Move {
                key: key.clone(),
                before: anchor.clone(),
            }),
            Some(_) => {}
        }
        anchor = Some(key.clone());
    }

    let retained = desired
        .iter()
        .zip(&sources)
        .filter(|(_, src)| src.is_some())
        .map(|(k, _)| k.clone())
        .collect();

    OrderPlan {
        removes,
        ops,
        retained,
    }
}

/// Marks the entries of the longest strictly increasing subsequence of the
/// `Some` values. `None` entries are never marked.
fn longest_increasing_subsequence(sources: &[Option<usize>]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; sources.len()];

    for (ix, src) in sources.iter().enumerate() {
        if src.is_none() {
            continue;
        }
        let pos = tails.partition_point(|&t| sources[t] < *src);
        if pos > 0 {
            prev[ix] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(ix);
        } else {
            tails[pos] = ix;
        }
    }

    let mut stable = vec![false; sources.len()];
    let mut cursor = tails.last().copied();
    while let Some(ix) = cursor {
        stable[ix] = true;
        cursor = prev[ix];
    }
    stable
}
