use crate::jvm::code::LabelId;

/// What flows along a CFG edge
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EdgeInfo {
    /// Normal control transfer, carrying the stack height at the jump relative to the stack
    /// height at the start of the source block
    Jump(i32),

    /// Transfer to an exception handler (the handler always starts with just the exception on
    /// the stack)
    Exception,
}

/// Directed arc of the control flow graph
///
/// The source block is whichever label owns the edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    pub info: EdgeInfo,

    /// First label of the successor block
    pub successor: LabelId,
}

impl Edge {
    pub fn jump(stack_size: i32, successor: LabelId) -> Edge {
        Edge {
            info: EdgeInfo::Jump(stack_size),
            successor,
        }
    }

    pub fn exception(handler: LabelId) -> Edge {
        Edge {
            info: EdgeInfo::Exception,
            successor: handler,
        }
    }

    /// Stack height when entering the successor, given the stack height entering the source
    pub fn successor_input_stack_size(&self, source_input_stack_size: i32) -> i32 {
        match self.info {
            EdgeInfo::Jump(relative) => source_input_stack_size + relative,
            EdgeInfo::Exception => 1,
        }
    }
}
