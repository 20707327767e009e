//! Generator graph: an arena of node instances linked by handles.
//!
//! Nodes refer to their children by [`NodeKey`]. Evaluation recurses from
//! the root through [`Render::accumulate`], which lifts each node out of its
//! slot while it runs so the node can pull its children from the same arena.

use std::collections::VecDeque;
use std::fmt;

use ph_ir::{BufferPool, PlayState};
use slotmap::{new_key_type, SecondaryMap, SlotMap};

use crate::generator::{Clock, Generator};

new_key_type! {
    /// Handle of a node inside a [`Graph`].
    pub struct NodeKey;
}

struct Slot {
    clock: Clock,
    /// `None` while the node is being evaluated.
    generator: Option<Box<dyn Generator>>,
}

/// The node arena of one graph instance.
pub struct Nodes {
    slots: SlotMap<NodeKey, Slot>,
}

impl Nodes {
    /// Play state of the node at `key`.
    ///
    /// A dangling key is silence and reports `Constant`.
    pub fn finished(&self, key: NodeKey) -> PlayState {
        match self.slots.get(key) {
            Some(Slot { generator: Some(g), .. }) => g.finished(self),
            // Being evaluated further up the call tree.
            Some(Slot { generator: None, .. }) => PlayState::Playing,
            None => PlayState::Constant,
        }
    }

    /// Combined play state of several children.
    pub fn resolve(&self, keys: &[NodeKey]) -> PlayState {
        ph_ir::resolve(keys.iter().map(|&k| self.finished(k)))
    }

    /// The clock of the node at `key`.
    pub fn clock(&self, key: NodeKey) -> Option<Clock> {
        self.slots.get(key).map(|s| s.clock)
    }
}

/// Evaluation context for one accumulation call tree.
pub struct Render<'a> {
    nodes: &'a mut Nodes,
    pool: &'a BufferPool,
    block: usize,
}

impl<'a> Render<'a> {
    fn new(nodes: &'a mut Nodes, pool: &'a BufferPool, preferred_block: usize) -> Self {
        let block = preferred_block.clamp(1, pool.scratch_len().max(1));
        Self { nodes, pool, block }
    }

    /// Produce `size` samples of the node at `key` into `out[start..start + size]`,
    /// then advance that node's clock.
    ///
    /// A dangling key, or a node reached again while it is still being
    /// evaluated (a cycle), writes silence.
    pub fn accumulate(&mut self, key: NodeKey, out: &mut [f32], start: usize, size: usize) {
        if size == 0 {
            return;
        }
        let Some(slot) = self.nodes.slots.get_mut(key) else {
            out[start..start + size].fill(0.0);
            return;
        };
        let Some(mut generator) = slot.generator.take() else {
            debug_assert!(false, "cycle in generator graph");
            out[start..start + size].fill(0.0);
            return;
        };
        let clock = slot.clock;

        generator.accumulate_impl(&clock, self, out, start, size);

        let slot = &mut self.nodes.slots[key];
        slot.generator = Some(generator);
        slot.clock.advance(size);
    }

    /// Play state of a child.
    pub fn finished(&self, key: NodeKey) -> PlayState {
        self.nodes.finished(key)
    }

    /// Largest chunk a node should pull through a scratch buffer.
    pub fn block_size(&self) -> usize {
        self.block
    }

    /// Pool for scratch and persistent buffers.
    pub fn pool(&self) -> &'a BufferPool {
        self.pool
    }
}

/// Split the window `[start, start + size)` into `(chunk_start, chunk_len)`
/// pieces of at most `block` samples.
pub fn blocks(start: usize, size: usize, block: usize) -> impl Iterator<Item = (usize, usize)> {
    let block = block.max(1);
    (0..size)
        .step_by(block)
        .map(move |off| (start + off, block.min(size - off)))
}

/// A root node plus everything reachable through its inputs.
pub struct Graph {
    nodes: Nodes,
    root: Option<NodeKey>,
    sample_rate: u32,
    torn_down: bool,
}

impl Graph {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            nodes: Nodes {
                slots: SlotMap::with_key(),
            },
            root: None,
            sample_rate,
            torn_down: false,
        }
    }

    /// Add a node with a fresh clock and return its key.
    pub fn insert<G: Generator + 'static>(&mut self, generator: G) -> NodeKey {
        self.nodes.slots.insert(Slot {
            clock: Clock::new(self.sample_rate),
            generator: Some(Box::new(generator)),
        })
    }

    pub fn set_root(&mut self, key: NodeKey) {
        self.root = Some(key);
    }

    pub fn root(&self) -> Option<NodeKey> {
        self.root
    }

    /// Put a new node above the current root, e.g. a meter or a gain stage.
    /// Returns the new root, or `None` if the graph has no root yet.
    pub fn wrap_root<G, F>(&mut self, wrap: F) -> Option<NodeKey>
    where
        G: Generator + 'static,
        F: FnOnce(NodeKey) -> G,
    {
        let root = self.root?;
        let key = self.insert(wrap(root));
        self.root = Some(key);
        Some(key)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.slots.is_empty()
    }

    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    pub fn clock(&self, key: NodeKey) -> Option<Clock> {
        self.nodes.clock(key)
    }

    /// Produce `size` samples of the root into `out[start..start + size]`.
    ///
    /// `out` must hold at least `start + size` samples. A graph without a
    /// root writes silence.
    pub fn accumulate(
        &mut self,
        out: &mut [f32],
        start: usize,
        size: usize,
        preferred_block: usize,
        pool: &BufferPool,
    ) {
        match self.root {
            Some(root) => {
                Render::new(&mut self.nodes, pool, preferred_block).accumulate(root, out, start, size)
            }
            None => out[start..start + size].fill(0.0),
        }
    }

    /// Play state of the whole graph. A graph without a root is `Finished`.
    pub fn finished(&self) -> PlayState {
        self.root
            .map_or(PlayState::Finished, |root| self.nodes.finished(root))
    }

    /// Breadth-first closure of `root` over reported children. Each node
    /// appears once, even when shared by several parents.
    pub fn collect_reachable(&self, root: NodeKey) -> Vec<NodeKey> {
        let mut seen: SecondaryMap<NodeKey, ()> = SecondaryMap::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        let mut children = Vec::new();
        queue.push_back(root);
        while let Some(key) = queue.pop_front() {
            let Some(slot) = self.nodes.slots.get(key) else {
                continue;
            };
            if seen.insert(key, ()).is_some() {
                continue;
            }
            order.push(key);
            if let Some(g) = &slot.generator {
                children.clear();
                g.report_children(&mut children);
                queue.extend(children.iter().copied());
            }
        }
        order
    }

    /// Call `release` on every node reachable from the root.
    pub fn release_hierarchy(&mut self) {
        let Some(root) = self.root else { return };
        for key in self.collect_reachable(root) {
            if let Some(g) = self.nodes.slots[key].generator.as_mut() {
                g.release();
            }
        }
    }

    /// Call `deconstruct` on every node reachable from the root, handing
    /// persistent buffers back to `pool`. Later calls do nothing.
    pub fn deconstruct_hierarchy(&mut self, pool: &BufferPool) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let Some(root) = self.root else { return };
        for key in self.collect_reachable(root) {
            if let Some(g) = self.nodes.slots[key].generator.as_mut() {
                g.deconstruct(pool);
            }
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = match self.root {
            Some(root) => self
                .collect_reachable(root)
                .into_iter()
                .filter_map(|k| self.nodes.slots[k].generator.as_ref().map(|g| g.name()))
                .collect(),
            None => Vec::new(),
        };
        f.debug_struct("Graph")
            .field("nodes", &names)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
