//! Skip-list memtable.
//!
//! Nodes live in an arena (`Vec`) and link to each other by index, so the
//! structure needs no unsafe pointer juggling. Level 0 is a sorted linked
//! list over every node; higher levels skip ahead, giving O(log n)
//! expected search and insert.

use crate::Memtable;
use codec::Position;
use rand::Rng;
use std::cmp::Ordering;
use std::sync::RwLock;

const MAX_LEVEL: usize = 16;
const BRANCHING: u32 = 4;

struct SkipNode {
    key: Vec<u8>,
    pos: Position,
    /// Next-node arena index per level; `forward.len()` is this node's height.
    forward: Vec<Option<usize>>,
}

struct Core {
    arena: Vec<SkipNode>,
    /// Head forward pointers, one per level.
    head: Vec<Option<usize>>,
    /// Highest level currently in use.
    level: usize,
    len: u32,
}

impl Core {
    fn new() -> Self {
        Self {
            arena: Vec::new(),
            head: vec![None; MAX_LEVEL],
            level: 1,
            len: 0,
        }
    }

    /// Successor of `node` at `lvl`; `None` as `node` means the head.
    fn next(&self, node: Option<usize>, lvl: usize) -> Option<usize> {
        match node {
            None => self.head[lvl],
            Some(ix) => self.arena[ix].forward.get(lvl).copied().flatten(),
        }
    }

    fn set_next(&mut self, node: Option<usize>, lvl: usize, target: Option<usize>) {
        match node {
            None => self.head[lvl] = target,
            Some(ix) => self.arena[ix].forward[lvl] = target,
        }
    }

    /// Walks down from the top level, recording the rightmost node whose
    /// key is still `< key` at every level.
    fn predecessors(&self, key: &[u8]) -> [Option<usize>; MAX_LEVEL] {
        let mut preds: [Option<usize>; MAX_LEVEL] = [None; MAX_LEVEL];
        let mut current: Option<usize> = None;
        for lvl in (0..self.level).rev() {
            while let Some(next_ix) = self.next(current, lvl) {
                if self.arena[next_ix].key.as_slice() < key {
                    current = Some(next_ix);
                } else {
                    break;
                }
            }
            preds[lvl] = current;
        }
        preds
    }

    fn find(&self, key: &[u8]) -> Option<&SkipNode> {
        let mut current: Option<usize> = None;
        for lvl in (0..self.level).rev() {
            while let Some(next_ix) = self.next(current, lvl) {
                match self.arena[next_ix].key.as_slice().cmp(key) {
                    Ordering::Less => current = Some(next_ix),
                    Ordering::Equal => return Some(&self.arena[next_ix]),
                    Ordering::Greater => break,
                }
            }
        }
        None
    }

    fn insert(&mut self, key: &[u8], pos: Position) {
        let preds = self.predecessors(key);

        // Key already present: overwrite in place.
        if let Some(cand) = self.next(preds[0], 0) {
            if self.arena[cand].key.as_slice() == key {
                self.arena[cand].pos = pos;
                return;
            }
        }

        let height = random_height();
        if height > self.level {
            self.level = height;
        }

        let new_ix = self.arena.len();
        let mut forward = Vec::with_capacity(height);
        for lvl in 0..height {
            forward.push(self.next(preds[lvl], lvl));
        }
        self.arena.push(SkipNode {
            key: key.to_vec(),
            pos,
            forward,
        });
        for lvl in 0..height {
            self.set_next(preds[lvl], lvl, Some(new_ix));
        }
        self.len += 1;
    }
}

/// Coin-flip level assignment: each extra level has a 1-in-`BRANCHING`
/// chance, capped at `MAX_LEVEL`.
fn random_height() -> usize {
    let mut rng = rand::thread_rng();
    let mut height = 1;
    while height < MAX_LEVEL && rng.gen_ratio(1, BRANCHING) {
        height += 1;
    }
    height
}

/// Skip-list memtable.
pub struct SkipListMemtable {
    inner: RwLock<Core>,
}

impl SkipListMemtable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Core::new()),
        }
    }
}

impl Default for SkipListMemtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Memtable for SkipListMemtable {
    fn set(&self, key: &[u8], pos: Position) {
        let mut core = self.inner.write().unwrap_or_else(|e| e.into_inner());
        core.insert(key, pos);
    }

    fn get(&self, key: &[u8]) -> Position {
        let core = self.inner.read().unwrap_or_else(|e| e.into_inner());
        core.find(key).map_or(Position::default(), |n| n.pos)
    }

    fn contains(&self, key: &[u8]) -> bool {
        let core = self.inner.read().unwrap_or_else(|e| e.into_inner());
        core.find(key).is_some()
    }

    fn items(&self) -> Vec<(Vec<u8>, Position)> {
        let core = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::with_capacity(core.len as usize);
        let mut current = core.head[0];
        while let Some(ix) = current {
            let node = &core.arena[ix];
            out.push((node.key.clone(), node.pos));
            current = node.forward[0];
        }
        out
    }

    fn len(&self) -> u32 {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len
    }

    fn reset(&self) {
        let mut core = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *core = Core::new();
    }
}
