use crate::jvm::code::LabelId;
use crate::util::Offset;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// The offset of a label was requested before the label was placed
    UnresolvedLabel(LabelId),

    /// A label was placed twice (indicates a bug)
    DuplicateLabel(LabelId),

    /// A narrow reference to an already placed label does not fit in a signed 16-bit offset
    JumpOffsetOverflow { source: Offset, target: Offset },

    /// A narrow forward reference overflowed, but the instruction it belongs to is not one of
    /// the branches that have a wide pseudo variant
    NotABranchInstruction { offset: Offset, opcode: u8 },

    /// `push_jump` was called with an opcode that does not jump
    NotAJumpOpcode(u8),

    /// `push_instruction` was called with an instruction that transfers control, which needs
    /// one of the dedicated methods instead
    ControlFlowInstruction(u8),

    /// A label placed as debug-only was used as a jump target
    NotABlock(LabelId),

    /// The subroutine structure of the CFG is inconsistent (indicates a bug in whatever built
    /// the graph)
    MalformedSubroutineGraph {
        block: LabelId,
        outgoing_edges: usize,
    },

    /// Some path into this block pops more than was pushed
    StackUnderflow(LabelId),

    /// An exception handler range does not cover a sequence of placed blocks
    InvalidHandlerRange { start: LabelId, end: LabelId },

    MethodCodeNotFinished {
        pending_block: Option<LabelId>,
        unplaced_labels: Vec<LabelId>,
    },
    MethodCodeOverflow(Offset),
    MethodCodeMaxStackOverflow(Offset),
    MethodCodeMaxLocalsOverflow(Offset),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "IO error: {}", err),
            Error::UnresolvedLabel(label) => {
                write!(f, "label {:?} has not been placed yet", label)
            }
            Error::DuplicateLabel(label) => write!(f, "label {:?} was placed twice", label),
            Error::JumpOffsetOverflow { source, target } => write!(
                f,
                "jump from {:?} to {:?} does not fit in a 16-bit offset",
                source, target
            ),
            Error::NotABranchInstruction { offset, opcode } => write!(
                f,
                "opcode 0x{:02x} at {:?} is not a narrow branch",
                opcode, offset
            ),
            Error::NotAJumpOpcode(opcode) => write!(f, "opcode 0x{:02x} is not a jump", opcode),
            Error::ControlFlowInstruction(opcode) => write!(
                f,
                "opcode 0x{:02x} transfers control and cannot be pushed as a plain instruction",
                opcode
            ),
            Error::NotABlock(label) => {
                write!(f, "debug-only label {:?} cannot be a jump target", label)
            }
            Error::MalformedSubroutineGraph {
                block,
                outgoing_edges,
            } => write!(
                f,
                "subroutine caller {:?} has {} outgoing edges (expected at least 2)",
                block, outgoing_edges
            ),
            Error::StackUnderflow(label) => write!(f, "stack underflow entering {:?}", label),
            Error::InvalidHandlerRange { start, end } => write!(
                f,
                "exception handler range {:?}..{:?} does not span placed blocks",
                start, end
            ),
            Error::MethodCodeNotFinished {
                pending_block,
                unplaced_labels,
            } => write!(
                f,
                "method code not finished (open block {:?}, unplaced labels {:?})",
                pending_block, unplaced_labels
            ),
            Error::MethodCodeOverflow(len) => write!(f, "method code is too long ({:?})", len),
            Error::MethodCodeMaxStackOverflow(max) => {
                write!(f, "maximum stack size is too large ({:?})", max)
            }
            Error::MethodCodeMaxLocalsOverflow(max) => {
                write!(f, "maximum locals size is too large ({:?})", max)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
