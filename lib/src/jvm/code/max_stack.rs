use crate::jvm::code::{ControlFlowGraph, LabelFlags, LabelId};
use crate::jvm::Error;
use std::collections::HashSet;

impl ControlFlowGraph {
    /// Compute the maximum operand stack height over all blocks reachable from the first block
    ///
    /// This fills in the input stack size of every reachable block and flags it `REACHABLE`.
    /// Each block is visited once: in valid bytecode, every path into a block arrives with the
    /// same stack height, so the first one found is as good as any.
    ///
    /// If there are `jsr` blocks, [`ControlFlowGraph::analyze_subroutines`] must have run first.
    /// The virtual continuation edge of a `jsr` block is not followed, since the continuation
    /// is really reached from the `ret` of the subroutine.
    pub fn compute_max_stack(&mut self) -> Result<usize, Error> {
        let first_block = match self.first_block() {
            Some(first_block) => first_block,
            None => return Ok(0),
        };
        let first_label = self.label_mut(first_block);
        first_label.input_stack_size = 0;
        first_label.flags |= LabelFlags::REACHABLE;

        let mut max_stack_size: i32 = 0;
        let mut worklist = vec![first_block];
        let mut queued = HashSet::from([first_block]);
        while let Some(block) = worklist.pop() {
            let label = self.label(block);
            let input_stack_size = label.input_stack_size;
            max_stack_size = max_stack_size.max(input_stack_size + label.output_stack_max);

            let skip = if label.flags.contains(LabelFlags::SUBROUTINE_CALLER) {
                1
            } else {
                0
            };
            let successors: Vec<(LabelId, i32)> = label
                .outgoing_edges()
                .skip(skip)
                .map(|edge| {
                    (
                        edge.successor,
                        edge.successor_input_stack_size(input_stack_size),
                    )
                })
                .collect();

            for (successor, successor_input_stack_size) in successors {
                if !queued.insert(successor) {
                    continue;
                }
                if successor_input_stack_size < 0 {
                    return Err(Error::StackUnderflow(successor));
                }
                let successor_label = self.label_mut(successor);
                successor_label.input_stack_size = successor_input_stack_size;
                successor_label.flags |= LabelFlags::REACHABLE;
                worklist.push(successor);
            }
        }

        log::debug!("Computed max stack size {}", max_stack_size);
        Ok(max_stack_size as usize)
    }
}

#[cfg(test)]
mod test {
    use crate::jvm::code::{
        ControlFlowGraph, EdgeInfo, LabelFlags, LabelGenerator, LabelId, SubroutineId,
    };
    use crate::jvm::Error;

    fn blocks(graph: &mut ControlFlowGraph, count: usize) -> Vec<LabelId> {
        (0..count)
            .map(|_| {
                let block = graph.fresh_label();
                graph.push_block(block);
                block
            })
            .collect()
    }

    #[test]
    fn straight_line_and_branches() {
        let mut graph = ControlFlowGraph::new();
        let b = blocks(&mut graph, 4);
        graph.label_mut(b[0]).output_stack_max = 2;
        graph.add_edge(b[0], b[1], EdgeInfo::Jump(1));
        graph.add_edge(b[0], b[2], EdgeInfo::Jump(0));
        graph.label_mut(b[1]).output_stack_max = 3;
        graph.label_mut(b[2]).output_stack_max = 1;

        assert_eq!(graph.compute_max_stack().unwrap(), 4);
        assert_eq!(graph.label(b[1]).input_stack_size, 1);
        assert_eq!(graph.label(b[2]).input_stack_size, 0);
        assert!(graph.label(b[1]).flags.contains(LabelFlags::REACHABLE));
        assert!(
            !graph.label(b[3]).flags.contains(LabelFlags::REACHABLE),
            "dead block should stay unreachable"
        );
    }

    #[test]
    fn exception_handlers_start_with_one_slot() {
        let mut graph = ControlFlowGraph::new();
        let b = blocks(&mut graph, 2);
        graph.label_mut(b[0]).output_stack_max = 1;
        graph.add_exception_edge(b[0], b[1]).unwrap();
        graph.label_mut(b[1]).output_stack_max = 2;

        assert_eq!(graph.compute_max_stack().unwrap(), 3);
        assert_eq!(graph.label(b[1]).input_stack_size, 1);
    }

    #[test]
    fn continuation_is_reached_through_ret() {
        // b0: push 2 values, jsr s
        // b1: (continuation) pops
        // s:  astore, ret
        let mut graph = ControlFlowGraph::new();
        let b = blocks(&mut graph, 3);
        let (b0, b1, s) = (b[0], b[1], b[2]);
        graph.label_mut(b0).output_stack_max = 2;
        graph.label_mut(b0).flags |= LabelFlags::SUBROUTINE_CALLER;
        graph.add_edge(b0, s, EdgeInfo::Jump(3));
        graph.add_edge(b0, b1, EdgeInfo::Jump(2));
        graph.label_mut(s).flags |= LabelFlags::SUBROUTINE_START | LabelFlags::SUBROUTINE_END;
        graph.label_mut(s).output_stack_size = -1;
        graph.label_mut(b1).output_stack_max = 0;

        assert_eq!(graph.analyze_subroutines().unwrap(), 2);
        assert_eq!(graph.label(s).subroutine, Some(SubroutineId::MAIN.next()));
        assert_eq!(graph.compute_max_stack().unwrap(), 3);
        assert_eq!(graph.label(s).input_stack_size, 3);
        assert_eq!(graph.label(b1).input_stack_size, 2);
    }

    #[test]
    fn underflow_is_reported() {
        let mut graph = ControlFlowGraph::new();
        let b = blocks(&mut graph, 2);
        graph.add_edge(b[0], b[1], EdgeInfo::Jump(-1));
        match graph.compute_max_stack() {
            Err(Error::StackUnderflow(block)) => assert_eq!(block, b[1]),
            other => panic!("expected underflow, got {:?}", other),
        }
    }
}
