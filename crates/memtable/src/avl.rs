//! Height-balanced binary search tree memtable.

use crate::Memtable;
use codec::Position;
use std::cmp::Ordering;
use std::sync::RwLock;

struct Node {
    key: Vec<u8>,
    pos: Position,
    height: i32,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn leaf(key: Vec<u8>, pos: Position) -> Box<Node> {
        Box::new(Node {
            key,
            pos,
            height: 1,
            left: None,
            right: None,
        })
    }
}

#[derive(Default)]
struct Tree {
    root: Option<Box<Node>>,
    len: u32,
}

/// AVL-tree memtable. Insert, lookup, and membership are O(log n);
/// iteration is an in-order walk.
pub struct AvlMemtable {
    inner: RwLock<Tree>,
}

impl AvlMemtable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Tree::default()),
        }
    }
}

impl Default for AvlMemtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Memtable for AvlMemtable {
    fn set(&self, key: &[u8], pos: Position) {
        let mut tree = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let root = tree.root.take();
        let mut inserted = false;
        tree.root = Some(insert(root, key, pos, &mut inserted));
        if inserted {
            tree.len += 1;
        }
    }

    fn get(&self, key: &[u8]) -> Position {
        let tree = self.inner.read().unwrap_or_else(|e| e.into_inner());
        find(&tree.root, key).map_or(Position::default(), |n| n.pos)
    }

    fn contains(&self, key: &[u8]) -> bool {
        let tree = self.inner.read().unwrap_or_else(|e| e.into_inner());
        find(&tree.root, key).is_some()
    }

    fn items(&self) -> Vec<(Vec<u8>, Position)> {
        let tree = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::with_capacity(tree.len as usize);
        in_order(&tree.root, &mut out);
        out
    }

    fn len(&self) -> u32 {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len
    }

    fn reset(&self) {
        let mut tree = self.inner.write().unwrap_or_else(|e| e.into_inner());
        tree.root = None;
        tree.len = 0;
    }
}

fn height(node: &Option<Box<Node>>) -> i32 {
    node.as_ref().map_or(0, |n| n.height)
}

fn update_height(node: &mut Node) {
    node.height = 1 + height(&node.left).max(height(&node.right));
}

fn balance_factor(node: &Node) -> i32 {
    height(&node.left) - height(&node.right)
}

fn rotate_right(mut y: Box<Node>) -> Box<Node> {
    let mut x = y.left.take().expect("rotate_right requires a left child");
    y.left = x.right.take();
    update_height(&mut y);
    x.right = Some(y);
    update_height(&mut x);
    x
}

fn rotate_left(mut x: Box<Node>) -> Box<Node> {
    let mut y = x.right.take().expect("rotate_left requires a right child");
    x.right = y.left.take();
    update_height(&mut x);
    y.left = Some(x);
    update_height(&mut y);
    y
}

fn rebalance(mut node: Box<Node>) -> Box<Node> {
    update_height(&mut node);
    let balance = balance_factor(&node);

    if balance > 1 {
        // left-heavy; convert a left-right shape into left-left first
        let left = node.left.take().expect("left-heavy node has a left child");
        node.left = Some(if balance_factor(&left) < 0 {
            rotate_left(left)
        } else {
            left
        });
        return rotate_right(node);
    }

    if balance < -1 {
        let right = node.right.take().expect("right-heavy node has a right child");
        node.right = Some(if balance_factor(&right) > 0 {
            rotate_right(right)
        } else {
            right
        });
        return rotate_left(node);
    }

    node
}

fn insert(node: Option<Box<Node>>, key: &[u8], pos: Position, inserted: &mut bool) -> Box<Node> {
    let mut node = match node {
        None => {
            *inserted = true;
            return Node::leaf(key.to_vec(), pos);
        }
        Some(n) => n,
    };

    match key.cmp(&node.key) {
        Ordering::Less => {
            node.left = Some(insert(node.left.take(), key, pos, inserted));
        }
        Ordering::Greater => {
            node.right = Some(insert(node.right.take(), key, pos, inserted));
        }
        Ordering::Equal => {
            node.pos = pos;
            return node;
        }
    }

    rebalance(node)
}

fn find<'a>(node: &'a Option<Box<Node>>, key: &[u8]) -> Option<&'a Node> {
    let mut current = node.as_deref();
    while let Some(n) = current {
        current = match key.cmp(&n.key) {
            Ordering::Less => n.left.as_deref(),
            Ordering::Greater => n.right.as_deref(),
            Ordering::Equal => return Some(n),
        };
    }
    None
}

fn in_order(node: &Option<Box<Node>>, out: &mut Vec<(Vec<u8>, Position)>) {
    if let Some(n) = node {
        in_order(&n.left, out);
        out.push((n.key.clone(), n.pos));
        in_order(&n.right, out);
    }
}
