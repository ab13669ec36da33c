//! Block-level range propagation over one function.
//!
//! Blocks are visited once, in reverse post-order of the forward (non-back-edge)
//! graph, so every forward predecessor of a block is final before the block is. For
//! each incoming edge the predecessor's map is copied and narrowed by the edge's
//! branch or switch condition; the narrowed maps are joined into the block's map and
//! the block's instructions are run through [`Transfer`].
//!
//! Back-edges are never followed: a loop body sees the values entering the loop, not
//! the ones carried around it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use log::{debug, warn};
use num_bigint::BigUint;

use crate::apint::ApInt;
use crate::cfg::{BackEdges, Cfg};
use crate::config::AnalysisConfig;
use crate::ir::{BlockId, FuncId, InstKind, Module, ValueId, ValueKind};
use crate::memory::OutOfRangeAccess;
use crate::range::IntRange;
use crate::store::{RangeMap, SharedRanges};
use crate::transfer::{outcome_range, value_range, IncomingMaps, Transfer};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlockState {
    Unvisited,
    /// Incoming edges have been merged.
    RangeComputed,
    /// Instructions have been run.
    Emitted,
    /// Every incoming edge is infeasible.
    Unreachable,
}

/// A branch direction that can never be taken: `cmp` never evaluates to `outcome`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ImpossibleBranch {
    pub cmp: ValueId,
    pub outcome: bool,
}

impl fmt::Display for ImpossibleBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is never {}", self.cmp, self.outcome)
    }
}

/// Ranges computed for one function.
#[derive(Debug, Clone)]
pub struct FunctionRanges {
    pub func: FuncId,
    states: HashMap<BlockId, BlockState>,
    /// Map of each emitted block after its instructions ran.
    block_maps: HashMap<BlockId, RangeMap>,
    /// Narrowed maps of the feasible forward edges into each emitted block.
    edge_maps: HashMap<BlockId, IncomingMaps>,
    impossible_branches: BTreeSet<ImpossibleBranch>,
    out_of_range: BTreeMap<ValueId, OutOfRangeAccess>,
}

impl FunctionRanges {
    fn new(func: FuncId, blocks: &[BlockId]) -> Self {
        Self {
            func,
            states: blocks.iter().map(|&b| (b, BlockState::Unvisited)).collect(),
            block_maps: HashMap::new(),
            edge_maps: HashMap::new(),
            impossible_branches: BTreeSet::new(),
            out_of_range: BTreeMap::new(),
        }
    }

    pub fn state(&self, block: BlockId) -> BlockState {
        self.states.get(&block).copied().unwrap_or(BlockState::Unvisited)
    }

    /// The map of `block` at its end, if the block was emitted.
    pub fn block_map(&self, block: BlockId) -> Option<&RangeMap> {
        self.block_maps.get(&block)
    }

    /// The narrowed map of the edge `pred -> block`, if the edge is feasible and forward.
    pub fn edge_map(&self, pred: BlockId, block: BlockId) -> Option<&RangeMap> {
        self.edge_maps.get(&block)?.get(&pred)
    }

    /// Maps of every emitted block.
    pub fn block_maps(&self) -> impl Iterator<Item = (BlockId, &RangeMap)> {
        self.block_maps.iter().map(|(&b, m)| (b, m))
    }

    pub fn impossible_branches(&self) -> &BTreeSet<ImpossibleBranch> {
        &self.impossible_branches
    }

    pub fn out_of_range(&self) -> &BTreeMap<ValueId, OutOfRangeAccess> {
        &self.out_of_range
    }
}

/// Propagates ranges through every block of `func` reachable over forward edges.
pub fn propagate(
    module: &Module,
    config: &AnalysisConfig,
    shared: &mut SharedRanges,
    func: FuncId,
    cfg: &Cfg,
    back_edges: &BackEdges,
) -> FunctionRanges {
    let mut result = FunctionRanges::new(func, &cfg.blocks);

    for block in cfg.reverse_post_order(back_edges) {
        debug!("visit {}", module.block_label(block));

        let mut merged = (Some(block) == cfg.entry).then(RangeMap::new);
        let mut incoming = IncomingMaps::new();
        for &pred in cfg.predecessors(block) {
            if back_edges.contains(pred, block) {
                debug!("skip back-edge {} -> {}", module.block_label(pred), module.block_label(block));
                continue;
            }
            let Some(pred_map) = result.block_maps.get(&pred) else {
                continue;
            };
            let edge = narrow_edge(module, config, shared, pred, block, pred_map, &mut result.impossible_branches);
            let Some(edge) = edge else {
                debug!("edge {} -> {} is infeasible", module.block_label(pred), module.block_label(block));
                continue;
            };
            debug!("merge {} -> {}", module.block_label(pred), module.block_label(block));
            merged = Some(match merged.take() {
                Some(mut map) => {
                    map.join_with(&edge, |side, value| unnarrowed_range(module, config, &*shared, side, value));
                    map
                }
                None => edge.clone(),
            });
            incoming.insert(pred, edge);
        }

        let Some(mut map) = merged else {
            debug!("{} is unreachable", module.block_label(block));
            result.states.insert(block, BlockState::Unreachable);
            continue;
        };
        result.states.insert(block, BlockState::RangeComputed);

        let mut transfer = Transfer::new(module, config, shared, func, &mut result.out_of_range);
        for &inst in &module.block(block).insts {
            transfer.apply(&mut map, inst, &incoming);
        }

        result.states.insert(block, BlockState::Emitted);
        result.block_maps.insert(block, map);
        result.edge_maps.insert(block, incoming);
    }

    result
}

/// Range a predecessor map implies for a value it never narrowed. Instructions missing
/// from a map are not defined on that path and contribute nothing.
fn unnarrowed_range(
    module: &Module,
    config: &AnalysisConfig,
    shared: &SharedRanges,
    map: &RangeMap,
    value: ValueId,
) -> Option<IntRange> {
    match module.value(value).kind {
        ValueKind::Inst { .. } => None,
        _ => value_range(module, config, shared, map, value),
    }
}

/// Copies `pred_map` and narrows it by the condition under which `pred` branches to
/// `block`. Returns `None` when that condition can never hold.
fn narrow_edge(
    module: &Module,
    config: &AnalysisConfig,
    shared: &SharedRanges,
    pred: BlockId,
    block: BlockId,
    pred_map: &RangeMap,
    impossible: &mut BTreeSet<ImpossibleBranch>,
) -> Option<RangeMap> {
    let mut map = pred_map.clone();
    let range = |map: &RangeMap, value: ValueId| value_range(module, config, shared, map, value);

    match module.terminator(pred) {
        Some(InstKind::Br { .. }) => {}

        Some(&InstKind::CondBr { cond, on_true, on_false }) => {
            if on_true == on_false {
                return Some(map);
            }
            let outcome = block == on_true;

            if let Some(&InstKind::ICmp { pred: p, lhs, rhs }) = module.inst(cond) {
                let (Some(l), Some(r)) = (range(&map, lhs), range(&map, rhs)) else {
                    warn!("branch on non-integer comparison {}", module.label(cond));
                    return Some(map);
                };
                let p = if outcome { p } else { p.inverse() };
                let new_l = l.intersect(&IntRange::make_allowed_icmp_region(p, &r));
                let new_r = r.intersect(&IntRange::make_allowed_icmp_region(p.swapped(), &l));
                if new_l.is_empty() || new_r.is_empty() {
                    let branch = ImpossibleBranch { cmp: cond, outcome };
                    debug!("impossible branch: {}", branch);
                    impossible.insert(branch);
                    return None;
                }
                debug!(
                    "narrow on {} {}: {} -> {}, {} -> {}",
                    module.label(cond),
                    outcome,
                    l,
                    new_l,
                    r,
                    new_r
                );
                if module.as_const(lhs).is_none() {
                    map.insert(lhs, new_l);
                }
                if module.as_const(rhs).is_none() {
                    map.insert(rhs, new_r);
                }
            } else if range(&map, cond).is_some_and(|r| !r.contains(outcome_range(outcome).lower())) {
                return None;
            }
            if module.as_const(cond).is_none() {
                map.insert(cond, outcome_range(outcome));
            }
        }

        Some(InstKind::Switch { cond, default, cases }) => {
            let Some(c) = range(&map, *cond) else {
                warn!("switch on non-integer {}", module.label(*cond));
                return Some(map);
            };
            let width = c.width();
            let to_case = |dest: BlockId| {
                cases
                    .iter()
                    .filter(|(_, d)| *d == dest)
                    .fold(IntRange::empty(width), |acc, (v, _)| acc.union(&IntRange::single(v.clone())))
            };
            let allowed = if block != *default {
                to_case(block)
            } else if cases.iter().any(|(_, d)| *d == block) {
                IntRange::full(width)
            } else {
                default_region(width, cases.iter().map(|(v, _)| v))
            };
            let narrowed = c.intersect(&allowed);
            if narrowed.is_empty() {
                return None;
            }
            debug!("narrow on switch {}: {} -> {}", module.label(*cond), c, narrowed);
            if module.as_const(*cond).is_none() {
                map.insert(*cond, narrowed);
            }
        }

        other => {
            warn!(
                "unrecognized terminator {} in {}",
                other.map_or("none", InstKind::name),
                module.block_label(pred)
            );
        }
    }

    Some(map)
}

/// Values reaching the default destination of a switch: the exact complement of the
/// case values when they form one interval, else everything.
fn default_region<'v>(width: u32, values: impl Iterator<Item = &'v ApInt>) -> IntRange {
    let values: BTreeSet<_> = values.map(|v| v.value().clone()).collect();
    let hull = values
        .iter()
        .map(|v| IntRange::single(ApInt::from_biguint(width, v.clone())))
        .fold(IntRange::empty(width), |acc, r| acc.union(&r));
    if hull.size() == BigUint::from(values.len()) {
        hull.inverse()
    } else {
        IntRange::full(width)
    }
}
