//! Checkpoint (cut-point) graph
//!
//! Checkpoints are the entry block, the reachable return blocks and the
//! targets of DFS back edges. Every cycle of the control-flow graph passes
//! through a back-edge target, so the blocks strictly between two checkpoints
//! form an acyclic region.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write;

use serde::Serialize;

use crate::mir::{BlockId, MirFunction};

/// A distinguished basic block used as an analysis boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Checkpoint {
    block: BlockId,
}

impl Checkpoint {
    pub fn block(&self) -> BlockId {
        self.block
    }
}

/// Reachability edge between two checkpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpEdge {
    pub src: Checkpoint,
    pub dst: Checkpoint,
    /// Blocks on checkpoint-free paths from `src` to `dst`, in topological
    /// order. Starts with `src`; ends with `dst` unless the edge is a loop.
    pub blocks: Vec<BlockId>,
}

impl CpEdge {
    /// A loop edge leaves and re-enters the same checkpoint
    pub fn is_loop(&self) -> bool {
        self.src == self.dst && self.blocks.len() > 1
    }
}

/// Read-only view of the checkpoints of one procedure
pub trait CheckpointGraph {
    fn entry_checkpoint(&self) -> Checkpoint;

    fn checkpoint_of(&self, block: BlockId) -> Option<Checkpoint>;

    fn is_checkpoint(&self, block: BlockId) -> bool {
        self.checkpoint_of(block).is_some()
    }

    fn edge(&self, src: Checkpoint, dst: Checkpoint) -> Option<&CpEdge>;

    fn has_edge(&self, src: Checkpoint, dst: Checkpoint) -> bool {
        self.edge(src, dst).is_some()
    }
}

/// Checkpoint graph computed from a function's control flow
#[derive(Debug, Clone, Serialize)]
pub struct CutPointGraph {
    checkpoints: Vec<Checkpoint>,
    edges: BTreeMap<(Checkpoint, Checkpoint), CpEdge>,
}

impl CutPointGraph {
    pub fn build(func: &MirFunction) -> Self {
        if func.blocks.is_empty() {
            return Self {
                checkpoints: Vec::new(),
                edges: BTreeMap::new(),
            };
        }
        let reachable = reachable_from(func, func.entry());

        let mut cp_blocks: BTreeSet<BlockId> = BTreeSet::new();
        cp_blocks.insert(func.entry());
        for block in func.return_blocks() {
            if reachable.contains(&block) {
                cp_blocks.insert(block);
            }
        }
        cp_blocks.extend(back_edge_targets(func));

        let checkpoints: Vec<Checkpoint> = cp_blocks
            .iter()
            .map(|&block| Checkpoint { block })
            .collect();

        let mut edges = BTreeMap::new();
        for &src in &checkpoints {
            if func.blocks[src.block].terminator.is_return() {
                edges.insert(
                    (src, src),
                    CpEdge {
                        src,
                        dst: src,
                        blocks: vec![src.block],
                    },
                );
                continue;
            }

            let forward = forward_region(func, src.block, &cp_blocks);
            for &dst in &checkpoints {
                let reached = if dst == src {
                    func.predecessors(src.block)
                        .iter()
                        .any(|p| forward.contains(p) && !is_other_cp(*p, src, &cp_blocks))
                } else {
                    forward.contains(&dst.block)
                };
                if !reached {
                    continue;
                }
                let backward = backward_region(func, dst.block, &cp_blocks);
                let region: HashSet<BlockId> = forward
                    .intersection(&backward)
                    .copied()
                    .filter(|&b| b == src.block || b == dst.block || !cp_blocks.contains(&b))
                    .chain([src.block, dst.block])
                    .collect();
                let blocks = topological_order(func, &region, src.block, dst.block);
                edges.insert((src, dst), CpEdge { src, dst, blocks });
            }
        }

        Self { checkpoints, edges }
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn edges(&self) -> impl Iterator<Item = &CpEdge> {
        self.edges.values()
    }

    /// Human-readable listing for the `cpg` command
    pub fn render(&self, func: &MirFunction) -> String {
        let label = |b: BlockId| func.blocks[b].label.as_str();
        let mut out = String::new();
        let names: Vec<&str> = self.checkpoints.iter().map(|c| label(c.block)).collect();
        let _ = writeln!(out, "fn {}: checkpoints [{}]", func.name, names.join(", "));
        for edge in self.edges.values() {
            let region: Vec<&str> = edge.blocks.iter().map(|&b| label(b)).collect();
            let _ = writeln!(
                out,
                "  {} -> {}: [{}]",
                label(edge.src.block),
                label(edge.dst.block),
                region.join(", ")
            );
        }
        out
    }
}

impl CheckpointGraph for CutPointGraph {
    fn entry_checkpoint(&self) -> Checkpoint {
        Checkpoint { block: 0 }
    }

    fn checkpoint_of(&self, block: BlockId) -> Option<Checkpoint> {
        self.checkpoints.iter().copied().find(|c| c.block == block)
    }

    fn edge(&self, src: Checkpoint, dst: Checkpoint) -> Option<&CpEdge> {
        self.edges.get(&(src, dst))
    }
}

fn is_other_cp(block: BlockId, src: Checkpoint, cps: &BTreeSet<BlockId>) -> bool {
    block != src.block && cps.contains(&block)
}

fn reachable_from(func: &MirFunction, start: BlockId) -> HashSet<BlockId> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(b) = stack.pop() {
        if seen.insert(b) {
            stack.extend(func.successors(b));
        }
    }
    seen
}

/// Targets of back edges found by an iterative DFS from the entry
fn back_edge_targets(func: &MirFunction) -> BTreeSet<BlockId> {
    let n = func.blocks.len();
    let mut targets = BTreeSet::new();
    let mut visited = vec![false; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<(BlockId, usize)> = Vec::new();

    if n == 0 {
        return targets;
    }
    visited[func.entry()] = true;
    on_stack[func.entry()] = true;
    stack.push((func.entry(), 0));

    while let Some((block, next)) = stack.last().copied() {
        let succs = func.successors(block);
        if next < succs.len() {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let s = succs[next];
            if on_stack[s] {
                targets.insert(s);
            } else if !visited[s] {
                visited[s] = true;
                on_stack[s] = true;
                stack.push((s, 0));
            }
        } else {
            on_stack[block] = false;
            stack.pop();
        }
    }
    targets
}

/// Blocks reachable from `src` without expanding through other checkpoints
fn forward_region(func: &MirFunction, src: BlockId, cps: &BTreeSet<BlockId>) -> HashSet<BlockId> {
    let mut seen = HashSet::from([src]);
    let mut stack = func.successors(src);
    while let Some(b) = stack.pop() {
        if seen.insert(b) && !cps.contains(&b) {
            stack.extend(func.successors(b));
        }
    }
    seen
}

/// Blocks reaching `dst` without passing through other checkpoints
fn backward_region(func: &MirFunction, dst: BlockId, cps: &BTreeSet<BlockId>) -> HashSet<BlockId> {
    let mut seen = HashSet::from([dst]);
    let mut stack = func.predecessors(dst);
    while let Some(b) = stack.pop() {
        if seen.insert(b) && !cps.contains(&b) {
            stack.extend(func.predecessors(b));
        }
    }
    seen
}

/// Kahn's algorithm over the region, ignoring edges into `src` and out of
/// `dst`; ties are broken by block index
fn topological_order(
    func: &MirFunction,
    region: &HashSet<BlockId>,
    src: BlockId,
    dst: BlockId,
) -> Vec<BlockId> {
    let region_edges = |b: BlockId| -> Vec<BlockId> {
        if b == dst && b != src {
            return Vec::new();
        }
        func.successors(b)
            .into_iter()
            .filter(|s| *s != src && region.contains(s))
            .collect()
    };

    let mut in_degree: BTreeMap<BlockId, usize> = region.iter().map(|&b| (b, 0)).collect();
    for &b in region {
        for s in region_edges(b) {
            if let Some(d) = in_degree.get_mut(&s) {
                *d += 1;
            }
        }
    }

    let mut ready: BTreeSet<BlockId> = in_degree
        .iter()
        .filter(|&(_, &d)| d == 0)
        .map(|(&b, _)| b)
        .collect();
    let mut order = Vec::with_capacity(region.len());
    while let Some(b) = ready.pop_first() {
        order.push(b);
        for s in region_edges(b) {
            if let Some(d) = in_degree.get_mut(&s) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(s);
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn function(source: &str) -> MirFunction {
        let tokens = tokenize(source).unwrap();
        parse("test.mir", source, tokens).unwrap().functions.remove(0)
    }

    fn cp(graph: &CutPointGraph, func: &MirFunction, label: &str) -> Checkpoint {
        graph.checkpoint_of(func.block_index(label).unwrap()).unwrap()
    }

    #[test]
    fn test_straight_line_has_entry_and_return() {
        let f = function("fn f() -> void { entry: goto mid; mid: goto exit; exit: ret; }");
        let g = CutPointGraph::build(&f);
        assert_eq!(g.checkpoints().len(), 2);
        assert!(!g.is_checkpoint(1));
        let edge = g.edge(cp(&g, &f, "entry"), cp(&g, &f, "exit")).unwrap();
        assert_eq!(edge.blocks, vec![0, 1, 2]);
    }

    #[test]
    fn test_diamond_region_is_topological() {
        let f = function(
            "fn f(%c: bool) -> void {
             entry: br %c, a, b;
             a: goto join;
             b: goto join;
             join: goto exit;
             exit: ret;
             }",
        );
        let g = CutPointGraph::build(&f);
        let edge = g.edge(g.entry_checkpoint(), cp(&g, &f, "exit")).unwrap();
        assert_eq!(edge.blocks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_loop_header_is_checkpoint() {
        let f = function(
            "fn f(%c: bool) -> void {
             entry: goto head;
             head: br %c, body, exit;
             body: goto head;
             exit: ret;
             }",
        );
        let g = CutPointGraph::build(&f);
        let head = cp(&g, &f, "head");
        let exit = cp(&g, &f, "exit");
        assert!(g.is_checkpoint(head.block()));
        assert!(!g.has_edge(g.entry_checkpoint(), exit));
        assert!(g.has_edge(g.entry_checkpoint(), head));
        assert!(g.has_edge(head, exit));
        let back = g.edge(head, head).unwrap();
        assert!(back.is_loop());
        assert_eq!(back.blocks, vec![1, 2]);
    }

    #[test]
    fn test_entry_return_is_degenerate_edge() {
        let f = function("fn f() -> i32 { entry: ret 0; }");
        let g = CutPointGraph::build(&f);
        let entry = g.entry_checkpoint();
        let edge = g.edge(entry, entry).unwrap();
        assert_eq!(edge.blocks, vec![0]);
        assert!(!edge.is_loop());
    }

    #[test]
    fn test_unreachable_return_is_not_checkpoint() {
        let f = function(
            "fn f() -> void {
             entry: unreachable;
             dead: ret;
             }",
        );
        let g = CutPointGraph::build(&f);
        assert_eq!(g.checkpoints().len(), 1);
        assert!(!g.is_checkpoint(1));
    }

    #[test]
    fn test_render_lists_edges() {
        let f = function("fn f() -> void { entry: goto exit; exit: ret; }");
        let g = CutPointGraph::build(&f);
        let text = g.render(&f);
        assert!(text.starts_with("fn f: checkpoints [entry, exit]"));
        assert!(text.contains("  entry -> exit: [entry, exit]"));
    }
}
