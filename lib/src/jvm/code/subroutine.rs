//! Legacy subroutines (`jsr`/`ret`)
//!
//! A `jsr` jumps to a subroutine while pushing a return address, and `ret` jumps back to
//! whatever address is stored in a local. Nothing in the instructions says where a `ret` goes, so
//! the CFG built while emitting code has no edges out of blocks ending in `ret`. Blocks ending in
//! `jsr` instead get two edges:
//!
//!   1. a _virtual_ edge to the instruction after the `jsr` (where the subroutine will return to)
//!   2. the real jump edge to the start of the subroutine
//!
//! The analysis here first finds which blocks belong to which subroutine, then replaces the
//! virtual edges with real ones, from each `ret` block to the continuation of every caller of its
//! subroutine.
//!
//! ### Subroutine membership
//!
//! The main body of the method is subroutine [`SubroutineId::MAIN`]. Blocks reachable from a
//! subroutine entry (without following nested calls into other subroutines) belong to it. When a
//! block is reachable from several subroutines, the one marked first keeps it. Subroutines are
//! marked in order of discovery, so a subroutine always gets marked before the subroutines it
//! calls.

use crate::jvm::code::{ControlFlowGraph, EdgeInfo, LabelFlags, LabelId};
use crate::jvm::Error;
use std::collections::HashSet;

/// Identifier of a subroutine
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubroutineId(u16);

impl SubroutineId {
    /// Main body of the method
    pub const MAIN: SubroutineId = SubroutineId(1);

    pub fn next(self) -> SubroutineId {
        SubroutineId(self.0 + 1)
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl ControlFlowGraph {
    /// Push the successors of `block` that are not already queued onto the worklist
    ///
    /// The jump into the subroutine called at the end of a `jsr` block is skipped: the code in
    /// that subroutine does not run as part of whatever is being traversed.
    fn push_successors(
        &self,
        block: LabelId,
        worklist: &mut Vec<LabelId>,
        queued: &mut HashSet<LabelId>,
    ) -> Result<(), Error> {
        let label = self.label(block);
        let is_caller = label.flags.contains(LabelFlags::SUBROUTINE_CALLER);
        if is_caller {
            label.subroutine_call_edges()?;
        }
        for (index, edge) in label.outgoing_edges().enumerate() {
            if is_caller && index == 1 {
                continue;
            }
            if queued.insert(edge.successor) {
                worklist.push(edge.successor);
            }
        }
        Ok(())
    }

    /// Assign `subroutine` to every block reachable from `entry` that has no subroutine yet
    ///
    /// Returns how many blocks were assigned.
    pub fn mark_subroutine(
        &mut self,
        entry: LabelId,
        subroutine: SubroutineId,
    ) -> Result<usize, Error> {
        let mut marked = 0;
        let mut worklist = vec![entry];
        let mut queued = HashSet::from([entry]);
        while let Some(block) = worklist.pop() {
            queued.remove(&block);
            let label = self.label_mut(block);
            if label.subroutine.is_none() {
                label.subroutine = Some(subroutine);
                marked += 1;
                self.push_successors(block, &mut worklist, &mut queued)?;
            }
        }
        log::debug!(
            "Marked {} blocks from {:?} as subroutine {}",
            marked,
            entry,
            subroutine.get()
        );
        Ok(marked)
    }

    /// Add edges from the `ret` blocks of the subroutine starting at `entry` back to the
    /// instruction following the `jsr` at the end of `caller`
    ///
    /// Every block reachable from `entry` is visited once. A `ret` block gets an edge when it
    /// does not belong to the subroutine of the caller (a `ret` in the caller's own subroutine
    /// returns to the caller's caller instead). Returns how many edges were added.
    pub fn add_subroutine_ret_successors(
        &mut self,
        entry: LabelId,
        caller: LabelId,
    ) -> Result<usize, Error> {
        let caller_label = self.label(caller);
        let caller_subroutine = caller_label.subroutine;
        let (continuation, _) = caller_label.subroutine_call_edges()?;
        let continuation = continuation.successor;

        let mut added = 0;
        let mut worklist = vec![entry];
        let mut visited = HashSet::from([entry]);
        while let Some(block) = worklist.pop() {
            let label = self.label(block);
            if label.flags.contains(LabelFlags::SUBROUTINE_END)
                && label.subroutine != caller_subroutine
            {
                let output_stack_size = label.output_stack_size;
                self.add_edge(block, continuation, EdgeInfo::Jump(output_stack_size));
                added += 1;
            }
            self.push_successors(block, &mut worklist, &mut visited)?;
        }
        log::trace!(
            "Added {} return edges from subroutine {:?} to {:?}",
            added,
            entry,
            continuation
        );
        Ok(added)
    }

    /// Find all subroutines and connect their `ret` blocks to the callers' continuations
    ///
    /// Returns the number of subroutines, including the main body of the method (so `1` means
    /// there were no real subroutines).
    pub fn analyze_subroutines(&mut self) -> Result<u16, Error> {
        let first_block = match self.first_block() {
            Some(first_block) => first_block,
            None => return Ok(0),
        };

        // Mark subroutines, oldest first
        self.mark_subroutine(first_block, SubroutineId::MAIN)?;
        let mut last_subroutine = SubroutineId::MAIN;
        let mut current_subroutine = SubroutineId::MAIN;
        while current_subroutine <= last_subroutine {
            for index in 0..self.blocks().len() {
                let block = self.blocks()[index];
                let label = self.label(block);
                if !label.flags.contains(LabelFlags::SUBROUTINE_CALLER)
                    || label.subroutine != Some(current_subroutine)
                {
                    continue;
                }
                let entry = label.subroutine_call_edges()?.1.successor;
                if self.label(entry).subroutine.is_none() {
                    last_subroutine = last_subroutine.next();
                    self.mark_subroutine(entry, last_subroutine)?;
                }
            }
            current_subroutine = current_subroutine.next();
        }

        // Close the `ret` edges
        for index in 0..self.blocks().len() {
            let block = self.blocks()[index];
            let label = self.label(block);
            if label.flags.contains(LabelFlags::SUBROUTINE_CALLER) {
                let entry = label.subroutine_call_edges()?.1.successor;
                self.add_subroutine_ret_successors(entry, block)?;
            }
        }

        Ok(last_subroutine.get())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::LabelGenerator;

    #[test]
    fn subroutine_ids_count_up_from_main() {
        let main: u16 = SubroutineId::MAIN.get();
        assert_eq!(main, 1);
        assert_eq!(SubroutineId::MAIN.next().get(), 2);
        assert!(SubroutineId::MAIN < SubroutineId::MAIN.next());
    }

    /// Graph where blocks are placed in creation order
    fn graph_with_blocks(count: usize) -> (ControlFlowGraph, Vec<LabelId>) {
        let mut graph = ControlFlowGraph::new();
        let blocks: Vec<LabelId> = (0..count).map(|_| graph.fresh_label()).collect();
        for block in &blocks {
            graph.push_block(*block);
        }
        (graph, blocks)
    }

    /// Make `caller` end in a `jsr` to `entry` returning to `continuation`
    fn add_call(
        graph: &mut ControlFlowGraph,
        caller: LabelId,
        entry: LabelId,
        continuation: LabelId,
    ) {
        graph.label_mut(caller).flags |= LabelFlags::SUBROUTINE_CALLER;
        graph.label_mut(entry).flags |= LabelFlags::SUBROUTINE_START;
        graph.add_edge(caller, entry, EdgeInfo::Jump(1));
        graph.add_edge(caller, continuation, EdgeInfo::Jump(0));
    }

    fn mark_ret(graph: &mut ControlFlowGraph, block: LabelId) {
        graph.label_mut(block).flags |= LabelFlags::SUBROUTINE_END;
    }

    fn subroutine_of(graph: &ControlFlowGraph, block: LabelId) -> Option<u16> {
        graph.label(block).subroutine.map(SubroutineId::get)
    }

    fn successors(graph: &ControlFlowGraph, block: LabelId) -> Vec<LabelId> {
        graph.successors(block).map(|edge| edge.successor).collect()
    }

    #[test]
    fn marking_does_not_enter_called_subroutine() {
        let (mut graph, blocks) = graph_with_blocks(4);
        let (s, c, e, r) = (blocks[0], blocks[1], blocks[2], blocks[3]);
        add_call(&mut graph, s, e, c);
        graph.add_edge(e, r, EdgeInfo::Jump(1));
        mark_ret(&mut graph, r);

        assert_eq!(graph.mark_subroutine(e, SubroutineId(2)).unwrap(), 2);
        assert_eq!(subroutine_of(&graph, e), Some(2));
        assert_eq!(subroutine_of(&graph, r), Some(2));
        assert_eq!(subroutine_of(&graph, c), None, "continuation is not part of the subroutine");

        assert_eq!(graph.mark_subroutine(s, SubroutineId::MAIN).unwrap(), 2);
        assert_eq!(subroutine_of(&graph, s), Some(1));
        assert_eq!(subroutine_of(&graph, c), Some(1));
        assert_eq!(subroutine_of(&graph, e), Some(2), "first marking wins");
    }

    #[test]
    fn marking_follows_cycles() {
        let (mut graph, blocks) = graph_with_blocks(3);
        graph.add_edge(blocks[0], blocks[1], EdgeInfo::Jump(0));
        graph.add_edge(blocks[1], blocks[2], EdgeInfo::Jump(0));
        graph.add_edge(blocks[2], blocks[1], EdgeInfo::Jump(0));
        graph.add_edge(blocks[2], blocks[0], EdgeInfo::Jump(0));

        assert_eq!(graph.mark_subroutine(blocks[1], SubroutineId(4)).unwrap(), 3);
        for block in &blocks {
            assert_eq!(subroutine_of(&graph, *block), Some(4));
        }

        // Nothing left to mark, and no traversal state survives the first run
        assert_eq!(graph.mark_subroutine(blocks[0], SubroutineId(5)).unwrap(), 0);
    }

    #[test]
    fn marking_through_malformed_caller() {
        let (mut graph, blocks) = graph_with_blocks(2);
        graph.label_mut(blocks[0]).flags |= LabelFlags::SUBROUTINE_CALLER;
        graph.add_edge(blocks[0], blocks[1], EdgeInfo::Jump(0));
        match graph.mark_subroutine(blocks[0], SubroutineId::MAIN) {
            Err(Error::MalformedSubroutineGraph {
                block,
                outgoing_edges,
            }) => {
                assert_eq!(block, blocks[0]);
                assert_eq!(outgoing_edges, 1);
            }
            other => panic!("expected malformed graph, got {:?}", other),
        }
    }

    #[test]
    fn one_return_edge_per_ret_block() {
        // s: jsr e; c: ...
        // e: if ... goto b
        // a: goto r
        // b: goto r
        // r: ret
        let (mut graph, blocks) = graph_with_blocks(6);
        let (s, c, e, a, b, r) = (
            blocks[0], blocks[1], blocks[2], blocks[3], blocks[4], blocks[5],
        );
        add_call(&mut graph, s, e, c);
        graph.add_edge(e, b, EdgeInfo::Jump(1));
        graph.add_edge(e, a, EdgeInfo::Jump(1));
        graph.add_edge(a, r, EdgeInfo::Jump(1));
        graph.add_edge(b, r, EdgeInfo::Jump(1));
        mark_ret(&mut graph, r);
        graph.label_mut(r).output_stack_size = 0;

        graph.mark_subroutine(s, SubroutineId::MAIN).unwrap();
        graph.mark_subroutine(e, SubroutineId(2)).unwrap();

        assert_eq!(graph.add_subroutine_ret_successors(e, s).unwrap(), 1);
        assert_eq!(successors(&graph, r), vec![c]);
        assert_eq!(
            graph.successors(r).next().map(|edge| edge.info),
            Some(EdgeInfo::Jump(0))
        );
    }

    #[test]
    fn ret_in_caller_subroutine_is_left_alone() {
        // A subroutine whose `ret` is reachable from its own nested call site
        let (mut graph, blocks) = graph_with_blocks(3);
        let (caller, continuation, entry) = (blocks[0], blocks[1], blocks[2]);
        add_call(&mut graph, caller, entry, continuation);
        mark_ret(&mut graph, continuation);
        graph.label_mut(caller).subroutine = Some(SubroutineId(2));
        graph.label_mut(continuation).subroutine = Some(SubroutineId(2));
        graph.label_mut(entry).subroutine = Some(SubroutineId(3));
        graph.add_edge(entry, continuation, EdgeInfo::Jump(0));

        assert_eq!(
            graph.add_subroutine_ret_successors(entry, caller).unwrap(),
            0
        );
        assert_eq!(successors(&graph, continuation), vec![]);
    }

    #[test]
    fn analyze_two_calls_to_one_subroutine() {
        // b0: jsr s
        // b1: jsr s
        // b2: return
        // s:  ret
        let (mut graph, blocks) = graph_with_blocks(4);
        let (b0, b1, b2, s) = (blocks[0], blocks[1], blocks[2], blocks[3]);
        add_call(&mut graph, b0, s, b1);
        add_call(&mut graph, b1, s, b2);
        mark_ret(&mut graph, s);

        assert_eq!(graph.analyze_subroutines().unwrap(), 2);
        assert_eq!(subroutine_of(&graph, b0), Some(1));
        assert_eq!(subroutine_of(&graph, b1), Some(1));
        assert_eq!(subroutine_of(&graph, b2), Some(1));
        assert_eq!(subroutine_of(&graph, s), Some(2));
        assert_eq!(successors(&graph, s), vec![b2, b1]);
    }

    #[test]
    fn analyze_nested_subroutines() {
        // b0: jsr s1
        // b1: return
        // s1: jsr s2
        // k:  ret
        // s2: ret
        let (mut graph, blocks) = graph_with_blocks(5);
        let (b0, b1, s1, k, s2) = (blocks[0], blocks[1], blocks[2], blocks[3], blocks[4]);
        add_call(&mut graph, b0, s1, b1);
        add_call(&mut graph, s1, s2, k);
        mark_ret(&mut graph, k);
        mark_ret(&mut graph, s2);

        assert_eq!(graph.analyze_subroutines().unwrap(), 3);
        assert_eq!(subroutine_of(&graph, b0), Some(1));
        assert_eq!(subroutine_of(&graph, b1), Some(1));
        assert_eq!(subroutine_of(&graph, s1), Some(2));
        assert_eq!(subroutine_of(&graph, k), Some(2));
        assert_eq!(subroutine_of(&graph, s2), Some(3));

        // `s2` returns into `s1`, which returns into the main body
        assert_eq!(successors(&graph, s2), vec![k]);
        assert_eq!(successors(&graph, k), vec![b1]);
    }

    #[test]
    fn analysis_is_deterministic() {
        let build = || {
            let (mut graph, blocks) = graph_with_blocks(6);
            add_call(&mut graph, blocks[0], blocks[3], blocks[1]);
            add_call(&mut graph, blocks[1], blocks[4], blocks[2]);
            graph.add_edge(blocks[3], blocks[5], EdgeInfo::Jump(1));
            graph.add_edge(blocks[4], blocks[5], EdgeInfo::Jump(1));
            mark_ret(&mut graph, blocks[5]);
            (graph, blocks)
        };

        let (mut first, blocks) = build();
        let (mut second, _) = build();
        first.analyze_subroutines().unwrap();
        second.analyze_subroutines().unwrap();
        for block in &blocks {
            assert_eq!(subroutine_of(&first, *block), subroutine_of(&second, *block));
            assert_eq!(successors(&first, *block), successors(&second, *block));
        }

        // Shared tail belongs to the older subroutine
        assert_eq!(subroutine_of(&first, blocks[5]), Some(2));
    }

    #[test]
    fn empty_graph_has_no_subroutines() {
        let mut graph = ControlFlowGraph::new();
        assert_eq!(graph.analyze_subroutines().unwrap(), 0);
    }
}
