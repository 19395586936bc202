//! Balanced spatial tree over n-dimensional bounding rectangles.
//!
//! The tree is an R-tree variant: leaves hold (rectangle, record id)
//! entries, internal nodes hold (bounding rectangle, child) entries, and
//! every internal entry's rectangle is the minimum bounding rectangle of
//! its child. All leaves sit at the same depth. Nodes live in an arena
//! addressed by stable indices, with parent links stored as indices.

use crate::error::{LocusError, Result};
use crate::types::{IndexConfig, RecordId, Rect};
use bytes::Bytes;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::BinaryHeap;
use tracing::debug;

#[derive(Debug, Clone)]
enum EntryTarget {
    /// Arena index of a child node (internal nodes only)
    Child(usize),
    /// Indexed record (leaf nodes only)
    Record(RecordId),
}

#[derive(Debug, Clone)]
struct Entry {
    rect: Rect,
    target: EntryTarget,
}

#[derive(Debug)]
struct Node {
    /// Distance from the leaf level; leaves are level 0
    level: usize,
    parent: Option<usize>,
    entries: Vec<Entry>,
}

impl Node {
    fn empty_leaf() -> Self {
        Self {
            level: 0,
            parent: None,
            entries: Vec::new(),
        }
    }
}

/// Balanced spatial index over bounding rectangles.
///
/// Supports insertion, removal, range queries, and incremental
/// nearest-neighbor search. Invariants (tight bounding rectangles,
/// uniform leaf depth, fill bounds) hold after every operation.
///
/// # Examples
///
/// ```rust
/// use locus::{IndexConfig, Rect, SpatialIndex};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut index = SpatialIndex::new(&IndexConfig::default())?;
/// index.insert("a", Rect::point(vec![1.0, 1.0]))?;
/// index.insert("b", Rect::point(vec![5.0, 5.0]))?;
///
/// let region = Rect::new(vec![0.0, 0.0], vec![2.0, 2.0])?;
/// let hits = index.range_query(&region);
/// assert_eq!(hits.len(), 1);
///
/// let closest = index.nearest(&[4.0, 4.0], 1, None)?;
/// assert_eq!(closest[0].0.as_ref(), b"b");
/// # Ok(())
/// # }
/// ```
pub struct SpatialIndex {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: usize,
    leaf_capacity: usize,
    min_fill: usize,
    /// Reverse map used for O(1) membership and rectangle lookup
    rects: FxHashMap<RecordId, Rect>,
    dims: Option<usize>,
}

impl SpatialIndex {
    /// Create an empty index with the given tuning parameters.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            nodes: vec![Node::empty_leaf()],
            free: Vec::new(),
            root: 0,
            leaf_capacity: config.leaf_capacity,
            min_fill: config.min_fill(),
            rects: FxHashMap::default(),
            dims: None,
        })
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Tree height: 1 for a lone leaf, growing by one per root split.
    pub fn height(&self) -> usize {
        self.nodes[self.root].level + 1
    }

    /// Dimensionality of the indexed rectangles, once any are present.
    pub fn dimensions(&self) -> Option<usize> {
        self.dims
    }

    /// Whether a record identifier is indexed.
    pub fn contains(&self, id: impl AsRef<[u8]>) -> bool {
        self.rects.contains_key(id.as_ref())
    }

    /// Rectangle recorded for an identifier, if indexed.
    pub fn rect_of(&self, id: impl AsRef<[u8]>) -> Option<&Rect> {
        self.rects.get(id.as_ref())
    }

    /// Minimum bounding rectangle of the whole index.
    pub fn bounds(&self) -> Option<Rect> {
        self.node_mbr(self.root)
    }

    /// Iterate over all (identifier, rectangle) pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &Rect)> {
        self.rects.iter()
    }

    /// Insert a record with its bounding rectangle.
    ///
    /// Fails with [`LocusError::InvalidGeometry`] for rectangles below two
    /// dimensions or mismatching the index dimensionality, and with
    /// [`LocusError::DuplicateIdentifier`] if the id is already present.
    /// A failed insert leaves the tree untouched.
    pub fn insert(&mut self, id: impl AsRef<[u8]>, rect: Rect) -> Result<()> {
        let id = Bytes::copy_from_slice(id.as_ref());
        self.check_rect(&rect)?;
        if self.rects.contains_key(&id) {
            return Err(LocusError::DuplicateIdentifier);
        }

        self.dims = Some(rect.dimensions());
        self.rects.insert(id.clone(), rect.clone());
        self.insert_entry(rect, id);
        Ok(())
    }

    /// Remove a record by identifier.
    ///
    /// Underfull nodes are condensed: their surviving entries are
    /// reinserted from the root, and the root sheds levels while it has a
    /// single child.
    pub fn remove(&mut self, id: impl AsRef<[u8]>) -> Result<()> {
        let id = Bytes::copy_from_slice(id.as_ref());
        let rect = self.rects.get(&id).cloned().ok_or(LocusError::NotFound)?;
        let leaf = self.find_leaf(self.root, &rect, &id).ok_or_else(|| {
            LocusError::StructuralInconsistency(
                "identifier tracked in the reverse map but absent from the tree".to_string(),
            )
        })?;

        self.rects.remove(&id);
        self.nodes[leaf]
            .entries
            .retain(|e| !matches!(&e.target, EntryTarget::Record(r) if *r == id));
        self.condense(leaf);
        Ok(())
    }

    /// All record identifiers whose rectangle intersects `region`.
    pub fn range_query(&self, region: &Rect) -> FxHashSet<RecordId> {
        let mut out = FxHashSet::default();
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            for entry in &self.nodes[idx].entries {
                if !entry.rect.intersects(region) {
                    continue;
                }
                match &entry.target {
                    EntryTarget::Record(id) => {
                        out.insert(id.clone());
                    }
                    EntryTarget::Child(child) => stack.push(*child),
                }
            }
        }
        out
    }

    /// Up to `k` records closest to `point`, in non-decreasing distance
    /// order, optionally stopping once distance exceeds `max_distance`.
    pub fn nearest(
        &self,
        point: &[f64],
        k: usize,
        max_distance: Option<f64>,
    ) -> Result<Vec<(RecordId, f64)>> {
        let mut iter = self.nearest_iter(point)?;
        iter.max_distance = max_distance;
        Ok(iter.take(k).collect())
    }

    /// Lazy best-first nearest-neighbor traversal.
    ///
    /// Yields records in strictly non-decreasing distance order. The
    /// sequence is finite and non-restartable; collect what you need.
    pub fn nearest_iter(&self, point: &[f64]) -> Result<Nearest<'_>> {
        if point.len() < 2 || point.iter().any(|c| !c.is_finite()) {
            return Err(LocusError::InvalidGeometry(
                "query point needs at least two finite coordinates".to_string(),
            ));
        }
        if let Some(dims) = self.dims {
            if !self.rects.is_empty() && point.len() != dims {
                return Err(LocusError::InvalidGeometry(format!(
                    "query point has {} dimensions, index has {}",
                    point.len(),
                    dims
                )));
            }
        }

        let mut heap = BinaryHeap::new();
        if !self.rects.is_empty() {
            heap.push(QueueEntry {
                dist: 0.0,
                item: QueueItem::Node(self.root),
            });
        }
        Ok(Nearest {
            index: self,
            point: SmallVec::from_slice(point),
            heap,
            max_distance: None,
        })
    }

    /// Build a dense index from a static batch, packing nodes bottom-up.
    ///
    /// Entries are sorted by center along the dominant axis and packed to
    /// capacity level by level, which yields a better-balanced tree than
    /// repeated insertion.
    pub fn bulk_load(items: Vec<(RecordId, Rect)>, config: &IndexConfig) -> Result<Self> {
        let mut index = Self::new(config)?;
        if items.is_empty() {
            return Ok(index);
        }

        let dims = items[0].1.dimensions();
        for (id, rect) in &items {
            index.check_rect(rect)?;
            if rect.dimensions() != dims {
                return Err(LocusError::InvalidGeometry(format!(
                    "mixed dimensionality in bulk load: {} and {}",
                    dims,
                    rect.dimensions()
                )));
            }
            if index.rects.insert(id.clone(), rect.clone()).is_some() {
                return Err(LocusError::DuplicateIdentifier);
            }
        }
        index.dims = Some(dims);
        index.nodes.clear();
        index.free.clear();

        let mut entries: Vec<Entry> = items
            .into_iter()
            .map(|(id, rect)| Entry {
                rect,
                target: EntryTarget::Record(id),
            })
            .collect();
        let mut level = 0;
        loop {
            let axis = dominant_axis(&entries, dims);
            entries.sort_by(|a, b| a.rect.center(axis).total_cmp(&b.rect.center(axis)));

            let sizes = partition_sizes(entries.len(), index.leaf_capacity);
            let mut upper: Vec<Entry> = Vec::with_capacity(sizes.len());
            let mut drain = entries.into_iter();
            for size in sizes {
                let chunk: Vec<Entry> = drain.by_ref().take(size).collect();
                let rect = mbr_of_entries(&chunk);
                let node = index.alloc(Node {
                    level,
                    parent: None,
                    entries: chunk,
                });
                index.reparent_children(node);
                upper.push(Entry {
                    rect,
                    target: EntryTarget::Child(node),
                });
            }

            if upper.len() == 1 {
                if let EntryTarget::Child(root) = upper[0].target {
                    index.root = root;
                }
                break;
            }
            entries = upper;
            level += 1;
        }

        debug!(
            records = index.rects.len(),
            height = index.height(),
            "bulk loaded spatial index"
        );
        Ok(index)
    }

    /// Re-check every structural invariant.
    ///
    /// Walks the whole tree verifying tight bounding rectangles, uniform
    /// leaf depth, fill bounds, parent links, and agreement with the
    /// reverse map. Used by combined-index cross-checks and tests.
    pub fn validate(&self) -> Result<()> {
        let root = &self.nodes[self.root];
        if root.parent.is_some() {
            return Err(LocusError::StructuralInconsistency(
                "root has a parent link".to_string(),
            ));
        }
        if root.level > 0 && root.entries.len() < 2 {
            return Err(LocusError::StructuralInconsistency(
                "internal root holds fewer than two children".to_string(),
            ));
        }

        let mut seen = FxHashSet::default();
        self.validate_node(self.root, None, &mut seen)?;
        if seen.len() != self.rects.len() {
            return Err(LocusError::StructuralInconsistency(format!(
                "tree holds {} records, reverse map holds {}",
                seen.len(),
                self.rects.len()
            )));
        }
        Ok(())
    }

    fn validate_node(
        &self,
        idx: usize,
        parent: Option<usize>,
        seen: &mut FxHashSet<RecordId>,
    ) -> Result<()> {
        let node = &self.nodes[idx];
        if node.parent != parent {
            return Err(LocusError::StructuralInconsistency(format!(
                "node {} has a stale parent link",
                idx
            )));
        }
        if node.entries.len() > self.leaf_capacity {
            return Err(LocusError::StructuralInconsistency(format!(
                "node {} exceeds capacity",
                idx
            )));
        }
        if parent.is_some() && node.entries.len() < self.min_fill {
            return Err(LocusError::StructuralInconsistency(format!(
                "node {} is below the minimum fill",
                idx
            )));
        }

        for entry in &node.entries {
            match &entry.target {
                EntryTarget::Record(id) => {
                    if node.level != 0 {
                        return Err(LocusError::StructuralInconsistency(
                            "record entry in an internal node".to_string(),
                        ));
                    }
                    if !seen.insert(id.clone()) {
                        return Err(LocusError::StructuralInconsistency(
                            "identifier appears in two leaves".to_string(),
                        ));
                    }
                    if self.rects.get(id) != Some(&entry.rect) {
                        return Err(LocusError::StructuralInconsistency(
                            "leaf rectangle disagrees with the reverse map".to_string(),
                        ));
                    }
                }
                EntryTarget::Child(child) => {
                    if node.level == 0 {
                        return Err(LocusError::StructuralInconsistency(
                            "child entry in a leaf".to_string(),
                        ));
                    }
                    if self.nodes[*child].level + 1 != node.level {
                        return Err(LocusError::StructuralInconsistency(
                            "child level is not one below its parent".to_string(),
                        ));
                    }
                    match self.node_mbr(*child) {
                        Some(mbr) if mbr == entry.rect => {}
                        _ => {
                            return Err(LocusError::StructuralInconsistency(format!(
                                "entry for node {} is not its minimum bounding rectangle",
                                child
                            )));
                        }
                    }
                    self.validate_node(*child, Some(idx), seen)?;
                }
            }
        }
        Ok(())
    }

    fn check_rect(&self, rect: &Rect) -> Result<()> {
        if rect.dimensions() < 2 {
            return Err(LocusError::InvalidGeometry(
                "rectangles need at least two dimensions".to_string(),
            ));
        }
        if let Some(dims) = self.dims {
            if !self.rects.is_empty() && rect.dimensions() != dims {
                return Err(LocusError::InvalidGeometry(format!(
                    "rectangle has {} dimensions, index has {}",
                    rect.dimensions(),
                    dims
                )));
            }
        }
        Ok(())
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = node;
            idx
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, idx: usize) {
        self.nodes[idx] = Node::empty_leaf();
        self.free.push(idx);
    }

    fn node_mbr(&self, idx: usize) -> Option<Rect> {
        let entries = &self.nodes[idx].entries;
        let first = entries.first()?;
        Some(
            entries
                .iter()
                .skip(1)
                .fold(first.rect.clone(), |acc, e| acc.union(&e.rect)),
        )
    }

    fn insert_entry(&mut self, rect: Rect, id: RecordId) {
        let leaf = self.choose_leaf(&rect);
        self.nodes[leaf].entries.push(Entry {
            rect,
            target: EntryTarget::Record(id),
        });
        self.adjust_upward(leaf);
    }

    /// Descend to the leaf whose bounding rectangle needs the least
    /// enlargement; ties break on smaller area, then lowest child index.
    fn choose_leaf(&self, rect: &Rect) -> usize {
        let mut idx = self.root;
        loop {
            let node = &self.nodes[idx];
            if node.level == 0 {
                return idx;
            }
            let mut best: Option<(usize, f64, f64)> = None;
            for entry in &node.entries {
                if let EntryTarget::Child(child) = entry.target {
                    let enlargement = entry.rect.enlargement(rect);
                    let area = entry.rect.union(rect).area();
                    let better = match best {
                        None => true,
                        Some((_, be, ba)) => {
                            enlargement < be || (enlargement == be && area < ba)
                        }
                    };
                    if better {
                        best = Some((child, enlargement, area));
                    }
                }
            }
            let Some((child, _, _)) = best else {
                return idx;
            };
            idx = child;
        }
    }

    /// Refresh bounding rectangles along the path to the root, splitting
    /// overflowing nodes along the way.
    fn adjust_upward(&mut self, start: usize) {
        let mut idx = start;
        loop {
            let split = if self.nodes[idx].entries.len() > self.leaf_capacity {
                Some(self.split_node(idx))
            } else {
                None
            };

            match self.nodes[idx].parent {
                Some(parent) => {
                    if let Some(rect) = self.node_mbr(idx) {
                        self.set_child_rect(parent, idx, rect);
                    }
                    if let Some(new_node) = split {
                        if let Some(rect) = self.node_mbr(new_node) {
                            self.nodes[new_node].parent = Some(parent);
                            self.nodes[parent].entries.push(Entry {
                                rect,
                                target: EntryTarget::Child(new_node),
                            });
                        }
                    }
                    idx = parent;
                }
                None => {
                    if let Some(new_node) = split {
                        self.grow_root(idx, new_node);
                    }
                    return;
                }
            }
        }
    }

    /// Split an overflowing node with quadratic seed picking: the two
    /// entries wasting the most area when paired become seeds, the rest go
    /// to whichever group needs the smaller enlargement, with forced
    /// assignment once a group must absorb all remaining entries to reach
    /// the minimum fill.
    fn split_node(&mut self, idx: usize) -> usize {
        let level = self.nodes[idx].level;
        let parent = self.nodes[idx].parent;
        let entries = std::mem::take(&mut self.nodes[idx].entries);
        let (group_a, group_b) = distribute(entries, self.min_fill);

        self.nodes[idx].entries = group_a;
        let new_node = self.alloc(Node {
            level,
            parent,
            entries: group_b,
        });
        self.reparent_children(new_node);
        debug!(level, "split spatial node");
        new_node
    }

    fn reparent_children(&mut self, idx: usize) {
        if self.nodes[idx].level == 0 {
            return;
        }
        let children: Vec<usize> = self.nodes[idx]
            .entries
            .iter()
            .filter_map(|e| match e.target {
                EntryTarget::Child(c) => Some(c),
                EntryTarget::Record(_) => None,
            })
            .collect();
        for child in children {
            self.nodes[child].parent = Some(idx);
        }
    }

    fn set_child_rect(&mut self, parent: usize, child: usize, rect: Rect) {
        for entry in &mut self.nodes[parent].entries {
            if matches!(entry.target, EntryTarget::Child(c) if c == child) {
                entry.rect = rect;
                return;
            }
        }
    }

    fn remove_child_entry(&mut self, parent: usize, child: usize) {
        self.nodes[parent]
            .entries
            .retain(|e| !matches!(e.target, EntryTarget::Child(c) if c == child));
    }

    fn grow_root(&mut self, left: usize, right: usize) {
        let level = self.nodes[left].level + 1;
        let new_root = self.alloc(Node {
            level,
            parent: None,
            entries: Vec::new(),
        });
        for child in [left, right] {
            if let Some(rect) = self.node_mbr(child) {
                self.nodes[new_root].entries.push(Entry {
                    rect,
                    target: EntryTarget::Child(child),
                });
            }
            self.nodes[child].parent = Some(new_root);
        }
        self.root = new_root;
        debug!(height = self.height(), "spatial tree grew");
    }

    fn find_leaf(&self, idx: usize, rect: &Rect, id: &RecordId) -> Option<usize> {
        let node = &self.nodes[idx];
        if node.level == 0 {
            return node
                .entries
                .iter()
                .any(|e| matches!(&e.target, EntryTarget::Record(r) if r == id))
                .then_some(idx);
        }
        for entry in &node.entries {
            if let EntryTarget::Child(child) = entry.target {
                if entry.rect.contains_rect(rect) {
                    if let Some(found) = self.find_leaf(child, rect, id) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    /// Walk from a shrunken leaf to the root, orphaning underfull nodes
    /// and reinserting their surviving records from the top.
    fn condense(&mut self, start: usize) {
        let mut orphans = Vec::new();
        let mut idx = start;
        while let Some(parent) = self.nodes[idx].parent {
            if self.nodes[idx].entries.len() < self.min_fill {
                self.remove_child_entry(parent, idx);
                orphans.push(idx);
            } else if let Some(rect) = self.node_mbr(idx) {
                self.set_child_rect(parent, idx, rect);
            }
            idx = parent;
        }

        let mut reinsert = Vec::new();
        for orphan in &orphans {
            self.collect_records(*orphan, &mut reinsert);
        }
        for orphan in orphans {
            self.free_subtree(orphan);
        }

        while self.nodes[self.root].level > 0 && self.nodes[self.root].entries.len() == 1 {
            let EntryTarget::Child(child) = self.nodes[self.root].entries[0].target else {
                break;
            };
            let old_root = self.root;
            self.nodes[child].parent = None;
            self.root = child;
            self.release(old_root);
            debug!(height = self.height(), "spatial tree shrank");
        }
        if self.nodes[self.root].level > 0 && self.nodes[self.root].entries.is_empty() {
            self.nodes[self.root].level = 0;
        }

        for (rect, id) in reinsert {
            self.insert_entry(rect, id);
        }
    }

    fn collect_records(&self, idx: usize, out: &mut Vec<(Rect, RecordId)>) {
        for entry in &self.nodes[idx].entries {
            match &entry.target {
                EntryTarget::Record(id) => out.push((entry.rect.clone(), id.clone())),
                EntryTarget::Child(child) => self.collect_records(*child, out),
            }
        }
    }

    fn free_subtree(&mut self, idx: usize) {
        let children: Vec<usize> = self.nodes[idx]
            .entries
            .iter()
            .filter_map(|e| match e.target {
                EntryTarget::Child(c) => Some(c),
                EntryTarget::Record(_) => None,
            })
            .collect();
        for child in children {
            self.free_subtree(child);
        }
        self.release(idx);
    }
}

/// Quadratic split distribution over an overflowing node's entries.
fn distribute(mut entries: Vec<Entry>, min_fill: usize) -> (Vec<Entry>, Vec<Entry>) {
    let (first, second) = pick_seeds(&entries);
    let seed_b = entries.remove(second);
    let seed_a = entries.remove(first);

    let mut rect_a = seed_a.rect.clone();
    let mut rect_b = seed_b.rect.clone();
    let mut group_a = vec![seed_a];
    let mut group_b = vec![seed_b];

    let total = entries.len();
    for (i, entry) in entries.into_iter().enumerate() {
        let remaining = total - i;
        if group_a.len() + remaining <= min_fill {
            rect_a = rect_a.union(&entry.rect);
            group_a.push(entry);
            continue;
        }
        if group_b.len() + remaining <= min_fill {
            rect_b = rect_b.union(&entry.rect);
            group_b.push(entry);
            continue;
        }

        let grow_a = rect_a.enlargement(&entry.rect);
        let grow_b = rect_b.enlargement(&entry.rect);
        let to_a = if grow_a != grow_b {
            grow_a < grow_b
        } else if rect_a.area() != rect_b.area() {
            rect_a.area() < rect_b.area()
        } else {
            group_a.len() <= group_b.len()
        };
        if to_a {
            rect_a = rect_a.union(&entry.rect);
            group_a.push(entry);
        } else {
            rect_b = rect_b.union(&entry.rect);
            group_b.push(entry);
        }
    }
    (group_a, group_b)
}

/// Seed pair whose combined rectangle wastes the most area.
fn pick_seeds(entries: &[Entry]) -> (usize, usize) {
    let mut worst = f64::NEG_INFINITY;
    let mut pair = (0, 1);
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let waste = entries[i].rect.union(&entries[j].rect).area()
                - entries[i].rect.area()
                - entries[j].rect.area();
            if waste > worst {
                worst = waste;
                pair = (i, j);
            }
        }
    }
    pair
}

fn mbr_of_entries(entries: &[Entry]) -> Rect {
    let mut rect = entries[0].rect.clone();
    for entry in &entries[1..] {
        rect = rect.union(&entry.rect);
    }
    rect
}

/// Axis along which entry centers spread the widest.
fn dominant_axis(entries: &[Entry], dims: usize) -> usize {
    let mut best_axis = 0;
    let mut best_spread = f64::NEG_INFINITY;
    for axis in 0..dims {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for entry in entries {
            let center = entry.rect.center(axis);
            lo = lo.min(center);
            hi = hi.max(center);
        }
        if hi - lo > best_spread {
            best_spread = hi - lo;
            best_axis = axis;
        }
    }
    best_axis
}

/// Even partition of `n` entries into groups of at most `capacity`.
///
/// Groups differ in size by at most one, so no group falls below half of
/// capacity when more than one is needed.
fn partition_sizes(n: usize, capacity: usize) -> Vec<usize> {
    let groups = n.div_ceil(capacity);
    let base = n / groups;
    let extra = n % groups;
    (0..groups)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

enum QueueItem {
    Node(usize),
    Record(RecordId),
}

struct QueueEntry {
    dist: f64,
    item: QueueItem,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist.total_cmp(&other.dist).is_eq()
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so the BinaryHeap pops the closest entry first
        other.dist.total_cmp(&self.dist)
    }
}

/// Incremental nearest-neighbor traversal over a [`SpatialIndex`].
///
/// Pops the closest unexpanded node, pushes its children with their own
/// minimum distances, and yields leaf records in non-decreasing distance
/// order regardless of tree shape.
pub struct Nearest<'a> {
    index: &'a SpatialIndex,
    point: SmallVec<[f64; 4]>,
    heap: BinaryHeap<QueueEntry>,
    max_distance: Option<f64>,
}

impl Iterator for Nearest<'_> {
    type Item = (RecordId, f64);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(next) = self.heap.pop() {
            if let Some(max) = self.max_distance {
                if next.dist > max {
                    return None;
                }
            }
            match next.item {
                QueueItem::Record(id) => return Some((id, next.dist)),
                QueueItem::Node(idx) => {
                    for entry in &self.index.nodes[idx].entries {
                        let dist = entry.rect.distance_to_point(&self.point);
                        let item = match &entry.target {
                            EntryTarget::Record(id) => QueueItem::Record(id.clone()),
                            EntryTarget::Child(child) => QueueItem::Node(*child),
                        };
                        self.heap.push(QueueEntry { dist, item });
                    }
                }
            }
        }
        None
    }
}
