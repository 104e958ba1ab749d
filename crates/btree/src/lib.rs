//! In-memory B-tree used for secondary indexes.
//!
//! Order 3: every node holds at most two entries, internal nodes hold
//! `entries.len() + 1` children, and every leaf sits at the same
//! depth. Insertion recurses down the search path and propagates an
//! optional split (promoted entry plus right sibling) back up, so
//! nodes never need parent pointers. The whole tree serializes as one
//! opaque bincode blob.


use std::io::Read;

use bincode::config::{self, Config};
use common::{DbError, DbResult, DiskRead, DiskWrite};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tuple::Tuple;

/// Maximum number of children per node.
const ORDER: usize = 3;
const MAX_ENTRIES: usize = ORDER - 1;
const MIDDLE: usize = MAX_ENTRIES / 2;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Index key; a given index holds keys of a single variant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    Int(i64),
    Text(String),
}

/// The secondary-index shape the engine works with: the payload is the
/// whole row, clustered-style.
pub type TupleIndex = BTree<Key, Tuple>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Entry<K, V> {
    key: K,
    value: V,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node<K, V> {
    entries: Vec<Entry<K, V>>,
    children: Vec<Node<K, V>>,
}

impl<K, V> Node<K, V> {
    fn leaf(entry: Entry<K, V>) -> Node<K, V> {
        Node {
            entries: vec![entry],
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|e| &e.key)
    }

    pub fn children(&self) -> &[Node<K, V>] {
        &self.children
    }
}

impl<K: Ord, V> Node<K, V> {
    /// Inserts below this node. Returns whether the key was new, and
    /// the promoted entry plus right sibling when this node split.
    #[allow(clippy::type_complexity)]
    fn insert(&mut self, entry: Entry<K, V>) -> (bool, Option<(Entry<K, V>, Node<K, V>)>) {
        match self.entries.binary_search_by(|e| e.key.cmp(&entry.key)) {
            Ok(at) => {
                self.entries[at] = entry;
                (false, None)
            }
            Err(at) if self.is_leaf() => {
                self.entries.insert(at, entry);
                (true, self.split_if_needed())
            }
            Err(at) => {
                let (inserted, split) = self.children[at].insert(entry);
                if let Some((promoted, right)) = split {
                    self.entries.insert(at, promoted);
                    self.children.insert(at + 1, right);
                }
                (inserted, self.split_if_needed())
            }
        }
    }

    /// Splits an overflowing node at the middle entry: the left half
    /// stays in place, the middle is promoted, the right half moves
    /// into a new sibling. Children (if any) split at `MIDDLE + 1`.
    fn split_if_needed(&mut self) -> Option<(Entry<K, V>, Node<K, V>)> {
        if self.entries.len() <= MAX_ENTRIES {
            return None;
        }

        let right_entries = self.entries.split_off(MIDDLE + 1);
        let promoted = self.entries.remove(MIDDLE);
        let right_children = if self.is_leaf() {
            Vec::new()
        } else {
            self.children.split_off(MIDDLE + 1)
        };

        Some((
            promoted,
            Node {
                entries: right_entries,
                children: right_children,
            },
        ))
    }

    fn find(&self, key: &K) -> Option<&V> {
        match self.entries.binary_search_by(|e| e.key.cmp(key)) {
            Ok(at) => Some(&self.entries[at].value),
            Err(at) => self.children.get(at).and_then(|child| child.find(key)),
        }
    }

    fn walk<'a>(&'a self, out: &mut Vec<(&'a K, &'a V)>) {
        for (i, entry) in self.entries.iter().enumerate() {
            if let Some(child) = self.children.get(i) {
                child.walk(out);
            }
            out.push((&entry.key, &entry.value));
        }
        if let Some(last) = self.children.last() {
            last.walk(out);
        }
    }
}

/// An ordered map with overwrite-on-duplicate `put`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BTree<K, V> {
    root: Option<Node<K, V>>,
    size: usize,
}

impl<K, V> Default for BTree<K, V> {
    fn default() -> Self {
        BTree { root: None, size: 0 }
    }
}

impl<K: Ord, V> BTree<K, V> {
    pub fn new() -> BTree<K, V> {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn root(&self) -> Option<&Node<K, V>> {
        self.root.as_ref()
    }

    /// Inserts or overwrites; overwriting leaves the size unchanged.
    pub fn put(&mut self, key: K, value: V) {
        let entry = Entry { key, value };
        let Some(root) = self.root.as_mut() else {
            self.root = Some(Node::leaf(entry));
            self.size = 1;
            return;
        };

        let (inserted, split) = root.insert(entry);
        if inserted {
            self.size += 1;
        }
        if let Some((promoted, right)) = split {
            let left = self.root.take();
            self.root = Some(Node {
                entries: vec![promoted],
                children: left.into_iter().chain([right]).collect(),
            });
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.root.as_ref().and_then(|root| root.find(key))
    }

    /// Every entry, keys nondecreasing.
    pub fn entries(&self) -> Vec<(&K, &V)> {
        let mut out = Vec::with_capacity(self.size);
        if let Some(root) = &self.root {
            root.walk(&mut out);
        }
        out
    }

    /// Number of node levels; 0 for an empty tree.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self.root.as_ref();
        while let Some(n) = node {
            depth += 1;
            node = n.children.first();
        }
        depth
    }
}

impl<K: Serialize, V: Serialize> DiskWrite for BTree<K, V> {
    fn to_bytes(&self) -> DbResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode_config())
            .map_err(|e| DbError::Codec(format!("encode btree: {e}")))
    }
}

impl<K: DeserializeOwned, V: DeserializeOwned> DiskRead for BTree<K, V> {
    fn load_from(&mut self, reader: &mut dyn Read) -> DbResult<()> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let (tree, _) = bincode::serde::decode_from_slice(&buf, bincode_config())
            .map_err(|e| DbError::Codec(format!("decode btree: {e}")))?;
        *self = tree;
        Ok(())
    }
}
