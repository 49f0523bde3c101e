use crate::jvm::code::{Edge, ReferenceWidth, RelocationLedger, SubroutineId};
use crate::jvm::Error;
use crate::util::{ByteVector, Offset};
use bitflags::bitflags;
use std::collections::VecDeque;
use std::fmt;

/// Opaque label handle
///
/// Labels live in the [`ControlFlowGraph`](super::ControlFlowGraph) of one method body, and the
/// handle is just the index of the label in that graph. Handles from one method are meaningless
/// in another.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct LabelId(usize);

impl LabelId {
    /// Label for the first block in the method
    pub const START: LabelId = LabelId(0);

    /// Get the next fresh label
    pub fn next(&self) -> LabelId {
        LabelId(self.0 + 1)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for LabelId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Generates new labels
pub trait LabelGenerator<Label> {
    /// Generate a fresh label
    fn fresh_label(&mut self) -> Label;
}

bitflags! {
    /// What a label is used for and what the analyses found out about its block
    pub struct LabelFlags: u16 {
        /// Only used by debug information (eg. line numbers), so it does not start a block
        const DEBUG_ONLY = 0x0001;

        /// Target of at least one jump or switch
        const JUMP_TARGET = 0x0002;

        /// Block is reachable from the start of the method
        const REACHABLE = 0x0008;

        /// Block ends with `jsr`/`jsr_w`
        ///
        /// The first outgoing edge of such a block goes to the instruction following the call and
        /// the second to the start of the subroutine.
        const SUBROUTINE_CALLER = 0x0010;

        /// Block is the target of a `jsr`/`jsr_w`
        const SUBROUTINE_START = 0x0020;

        /// Block ends with `ret`
        const SUBROUTINE_END = 0x0040;
    }
}

/// Whether the offset of a label is known yet
#[derive(Clone, Debug, PartialEq, Eq)]
enum LabelState {
    /// Label not placed yet, but maybe already referred to
    Unresolved { ledger: RelocationLedger },

    /// Label placed at a known offset
    Resolved { offset: Offset },
}

/// A position in a method body and, if it starts a basic block, that block's node in the CFG
#[derive(Clone, Debug)]
pub struct Label {
    id: LabelId,

    pub flags: LabelFlags,

    state: LabelState,

    /// First source line number attached to the label
    line_number: Option<u16>,

    /// Any further source line numbers
    other_line_numbers: Vec<u16>,

    /// Subroutine the block belongs to (filled in by the subroutine analysis)
    pub subroutine: Option<SubroutineId>,

    /// Stack height when entering the block (filled in by the max stack analysis)
    pub input_stack_size: i32,

    /// Stack height at the end of the block, relative to `input_stack_size`
    pub output_stack_size: i32,

    /// Largest stack height inside the block, relative to `input_stack_size`
    pub output_stack_max: i32,

    /// Outgoing CFG edges, most recently added first
    outgoing_edges: VecDeque<Edge>,
}

impl Label {
    pub fn new(id: LabelId) -> Label {
        Label {
            id,
            flags: LabelFlags::empty(),
            state: LabelState::Unresolved {
                ledger: RelocationLedger::new(),
            },
            line_number: None,
            other_line_numbers: vec![],
            subroutine: None,
            input_stack_size: 0,
            output_stack_size: 0,
            output_stack_max: 0,
            outgoing_edges: VecDeque::new(),
        }
    }

    pub fn id(&self) -> LabelId {
        self.id
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, LabelState::Resolved { .. })
    }

    /// Offset of the label, if it has been placed
    pub fn try_offset(&self) -> Option<Offset> {
        match self.state {
            LabelState::Resolved { offset } => Some(offset),
            LabelState::Unresolved { .. } => None,
        }
    }

    /// Offset of the label
    ///
    /// Asking for this before the label is placed is a bug in the caller.
    pub fn offset(&self) -> Result<Offset, Error> {
        self.try_offset().ok_or(Error::UnresolvedLabel(self.id))
    }

    /// Forward references waiting for this label to be placed
    pub fn pending_references(&self) -> usize {
        match &self.state {
            LabelState::Unresolved { ledger } => ledger.len(),
            LabelState::Resolved { .. } => 0,
        }
    }

    /// Write a reference to this label for the instruction starting at `source_offset`
    ///
    /// The reference is written at the cursor of `code`. If the label is already placed, the
    /// final relative offset is written straight away. Otherwise a placeholder is written and
    /// recorded, to be patched by [`Label::resolve`].
    pub fn put_reference(
        &mut self,
        code: &mut ByteVector,
        source_offset: Offset,
        width: ReferenceWidth,
    ) -> Result<(), Error> {
        match &mut self.state {
            LabelState::Unresolved { ledger } => {
                ledger.push_placeholder(code, source_offset, width);
            }
            LabelState::Resolved { offset } => {
                let relative_offset = *offset - source_offset;
                match width {
                    ReferenceWidth::Narrow => {
                        let relative_offset = i16::try_from(relative_offset).map_err(|_| {
                            Error::JumpOffsetOverflow {
                                source: source_offset,
                                target: *offset,
                            }
                        })?;
                        code.put_i16(relative_offset);
                    }
                    ReferenceWidth::Wide => {
                        let relative_offset = i32::try_from(relative_offset).map_err(|_| {
                            Error::JumpOffsetOverflow {
                                source: source_offset,
                                target: *offset,
                            }
                        })?;
                        code.put_i32(relative_offset);
                    }
                }
            }
        }
        Ok(())
    }

    /// Place the label at `offset` and patch every forward reference made to it so far
    ///
    /// Returns `true` if some narrow reference was too long and its instruction got rewritten to
    /// a pseudo instruction that must later be widened. If some reference cannot be patched, the
    /// label stays unplaced and its references stay pending.
    pub fn resolve(&mut self, code: &mut ByteVector, offset: Offset) -> Result<bool, Error> {
        let has_pseudo_instructions = match &self.state {
            LabelState::Unresolved { ledger } => ledger.resolve(code, offset)?,
            LabelState::Resolved { .. } => return Err(Error::DuplicateLabel(self.id)),
        };
        self.state = LabelState::Resolved { offset };
        Ok(has_pseudo_instructions)
    }

    /// Attach a source line number
    pub fn add_line_number(&mut self, line_number: u16) {
        if self.line_number.is_none() {
            self.line_number = Some(line_number);
        } else {
            self.other_line_numbers.push(line_number);
        }
    }

    /// Source line numbers, in the order they were added
    pub fn line_numbers(&self) -> impl Iterator<Item = u16> + '_ {
        self.line_number
            .iter()
            .copied()
            .chain(self.other_line_numbers.iter().copied())
    }

    /// Outgoing edges, most recently added first
    pub fn outgoing_edges(&self) -> impl ExactSizeIterator<Item = &Edge> + '_ {
        self.outgoing_edges.iter()
    }

    pub(crate) fn outgoing_edges_mut(&mut self) -> &mut VecDeque<Edge> {
        &mut self.outgoing_edges
    }

    /// Edges of a block ending in `jsr`: the continuation after the call returns and the entry of
    /// the called subroutine
    pub fn subroutine_call_edges(&self) -> Result<(&Edge, &Edge), Error> {
        let malformed = Error::MalformedSubroutineGraph {
            block: self.id,
            outgoing_edges: self.outgoing_edges.len(),
        };
        if !self.flags.contains(LabelFlags::SUBROUTINE_CALLER) {
            return Err(malformed);
        }
        match (self.outgoing_edges.get(0), self.outgoing_edges.get(1)) {
            (Some(continuation), Some(subroutine)) => Ok((continuation, subroutine)),
            _ => Err(malformed),
        }
    }
}
