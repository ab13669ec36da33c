//! Control-flow graph of a function and its loop back-edges.

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, FuncId, Module};

/// Predecessor and successor relations of one function's blocks.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub entry: Option<BlockId>,
    /// Blocks in layout order.
    pub blocks: Vec<BlockId>,
    /// Distinct predecessors of each block, in layout order of the predecessor.
    pub predecessors: HashMap<BlockId, Vec<BlockId>>,
    /// Distinct successors of each block, in terminator operand order.
    pub successors: HashMap<BlockId, Vec<BlockId>>,
}

impl Cfg {
    pub fn new(module: &Module, func: FuncId) -> Self {
        let function = module.function(func);
        let mut predecessors: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut successors: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

        for &block in &function.blocks {
            predecessors.entry(block).or_default();
            let succs = successors.entry(block).or_default();
            for succ in module.successors(block) {
                if !succs.contains(&succ) {
                    succs.push(succ);
                }
            }
        }
        for &block in &function.blocks {
            for &succ in &successors[&block] {
                predecessors.entry(succ).or_default().push(block);
            }
        }

        Self {
            entry: function.entry(),
            blocks: function.blocks.clone(),
            predecessors,
            successors,
        }
    }

    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.successors.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Blocks reachable from the entry without crossing a back-edge, in reverse
    /// post-order. Every forward predecessor of a block comes before it.
    pub fn reverse_post_order(&self, back_edges: &BackEdges) -> Vec<BlockId> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };

        let mut post_order = Vec::with_capacity(self.blocks.len());
        let mut visited = HashSet::new();
        // Explicit stack of (block, index of the next successor to visit).
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);

        while let Some(top) = stack.last_mut() {
            let block = top.0;
            let succs = self.successors(block);
            if top.1 < succs.len() {
                let succ = succs[top.1];
                top.1 += 1;
                if !back_edges.contains(block, succ) && visited.insert(succ) {
                    stack.push((succ, 0));
                }
            } else {
                post_order.push(block);
                stack.pop();
            }
        }

        post_order.reverse();
        post_order
    }
}

/// Loop back-edges, as a relation from a block to the predecessors that re-enter it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackEdges {
    edges: HashMap<BlockId, HashSet<BlockId>>,
}

impl BackEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `from -> to` as a back-edge.
    pub fn insert(&mut self, from: BlockId, to: BlockId) {
        self.edges.entry(to).or_default().insert(from);
    }

    pub fn contains(&self, from: BlockId, to: BlockId) -> bool {
        self.edges.get(&to).is_some_and(|preds| preds.contains(&from))
    }

    /// Predecessors of `block` whose edge into it is a back-edge.
    pub fn sources(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.edges.get(&block).into_iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds back-edges by depth-first search from the entry: an edge is a back-edge
    /// when it targets a block that is still on the search stack.
    pub fn compute(cfg: &Cfg) -> Self {
        let mut back_edges = Self::new();
        let Some(entry) = cfg.entry else {
            return back_edges;
        };

        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);
        on_stack.insert(entry);

        while let Some(top) = stack.last_mut() {
            let block = top.0;
            let succs = cfg.successors(block);
            if top.1 < succs.len() {
                let succ = succs[top.1];
                top.1 += 1;
                if on_stack.contains(&succ) {
                    back_edges.insert(block, succ);
                } else if visited.insert(succ) {
                    on_stack.insert(succ);
                    stack.push((succ, 0));
                }
            } else {
                on_stack.remove(&block);
                stack.pop();
            }
        }

        back_edges
    }
}

impl FromIterator<(BlockId, BlockId)> for BackEdges {
    fn from_iter<I: IntoIterator<Item = (BlockId, BlockId)>>(iter: I) -> Self {
        let mut back_edges = Self::new();
        for (from, to) in iter {
            back_edges.insert(from, to);
        }
        back_edges
    }
}
