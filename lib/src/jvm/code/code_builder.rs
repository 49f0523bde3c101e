use crate::jvm::code::{
    opcodes, Code, ControlFlowGraph, EdgeInfo, ExceptionTableEntry, LabelFlags, LabelGenerator,
    LabelId, LineNumberEntry, LocalInstruction, ReferenceWidth, Settings,
};
use crate::jvm::Error;
use crate::util::{ByteVector, Offset};

/// This provides an interface for emitting a method body from top to bottom. It does internal
/// bookkeeping to track labels, forward references, basic blocks, and stack heights.
///
/// ### Labels and forward references
///
/// Jumps may refer to labels that have not been placed yet. The jump is then written with a
/// placeholder offset, which gets patched as soon as the label is placed. A forward `goto` or
/// `if*` whose distance ends up not fitting in 16 bits is rewritten into a pseudo instruction and
/// flagged in [`Code::requires_jump_widening`]. Backward jumps are never a problem: the distance
/// is known, so far ones are emitted with `goto_w` from the start.
///
/// ### Basic blocks
///
/// Every placed label (except debug-only ones) starts a new basic block, and so does the
/// instruction following any conditional branch or `jsr`. Instructions after a `goto`, `ret`,
/// switch, return or `athrow` are dead until the next label is placed. Blocks record the
/// stack height relative to their start, and edges record the relative stack height at the
/// transfer, which is all that is needed to compute the maximum stack size at the end.
pub struct CodeBuilder {
    settings: Settings,

    /// Bytecode emitted so far
    code: ByteVector,

    /// Labels and CFG of the method
    graph: ControlFlowGraph,

    /// Block currently under construction (`None` when the code being emitted is unreachable)
    current_block: Option<LabelId>,

    /// Stack height in the current block, relative to its start
    relative_stack_size: i32,

    /// Largest stack height in the current block, relative to its start
    max_relative_stack_size: i32,

    /// Was the current block entered by falling through (or returning from a `jsr`)?
    falls_into_current_block: bool,

    /// Maximum size of locals so far
    max_locals: usize,

    /// Maximum sizes to use when they are not computed
    declared_maxs: (u16, u16),

    exception_handlers: Vec<ExceptionHandler>,

    /// Line numbers, in the order they were added
    line_numbers: Vec<(LabelId, u16)>,

    /// Has any `jsr` been emitted?
    has_subroutines: bool,

    /// Has any forward jump been rewritten to a pseudo instruction?
    has_pseudo_instructions: bool,
}

#[derive(Copy, Clone, Debug)]
struct ExceptionHandler {
    start: LabelId,
    end: LabelId,
    handler: LabelId,
    catch_type: u16,
}

impl CodeBuilder {
    /// Create a builder for a new method
    ///
    /// `parameter_slots` is the number of local slots taken by the parameters (including `this`
    /// for instance methods).
    pub fn new(settings: Settings, parameter_slots: u16) -> CodeBuilder {
        let mut code = ByteVector::new();
        let mut graph = ControlFlowGraph::new();
        let start = graph.fresh_label();
        graph
            .label_mut(start)
            .resolve(&mut code, Offset(0))
            .expect("fresh label cannot already be placed");
        graph.push_block(start);

        CodeBuilder {
            settings,
            code,
            graph,
            current_block: Some(start),
            relative_stack_size: 0,
            max_relative_stack_size: 0,
            falls_into_current_block: false,
            max_locals: parameter_slots as usize,
            declared_maxs: (0, 0),
            exception_handlers: vec![],
            line_numbers: vec![],
            has_subroutines: false,
            has_pseudo_instructions: false,
        }
    }

    /// Label which only marks a position for debug information
    ///
    /// Placing it does not start a new block. Using it as a jump target before it is placed
    /// turns it into a regular label.
    pub fn fresh_debug_label(&mut self) -> LabelId {
        let label = self.graph.fresh_label();
        self.graph.label_mut(label).flags |= LabelFlags::DEBUG_ONLY;
        label
    }

    /// Offset of the next instruction
    pub fn current_offset(&self) -> Offset {
        self.code.cursor()
    }

    /// Bytecode emitted so far
    pub fn code(&self) -> &ByteVector {
        &self.code
    }

    pub fn graph(&self) -> &ControlFlowGraph {
        &self.graph
    }

    /// Is the next instruction reachable by falling through?
    pub fn is_reachable(&self) -> bool {
        self.current_block.is_some()
    }

    fn adjust_stack(&mut self, stack_delta: i32) {
        if self.current_block.is_some() {
            self.relative_stack_size += stack_delta;
            self.max_relative_stack_size = self
                .max_relative_stack_size
                .max(self.relative_stack_size);
        }
    }

    /// Record the stack sizes of the current block and stop tracking it
    fn close_current_block(&mut self) -> Option<LabelId> {
        let block = self.current_block.take()?;
        let label = self.graph.label_mut(block);
        label.output_stack_size = self.relative_stack_size;
        label.output_stack_max = self.max_relative_stack_size;
        Some(block)
    }

    /// Start a new block at `label`, falling through from the current block (if any)
    fn start_block(&mut self, label: LabelId) {
        let relative_stack_size = self.relative_stack_size;
        self.falls_into_current_block = false;
        if let Some(previous) = self.close_current_block() {
            self.graph
                .add_edge(previous, label, EdgeInfo::Jump(relative_stack_size));
            self.falls_into_current_block = true;
        }
        self.current_block = Some(label);
        self.relative_stack_size = 0;
        self.max_relative_stack_size = 0;
        self.graph.push_block(label);
    }

    /// Mark a label as something control can be transferred to
    fn mark_jump_target(&mut self, label: LabelId) -> Result<(), Error> {
        let target = self.graph.label_mut(label);
        if target.flags.contains(LabelFlags::DEBUG_ONLY) {
            if target.is_resolved() {
                return Err(Error::NotABlock(label));
            }
            target.flags.remove(LabelFlags::DEBUG_ONLY);
        }
        target.flags |= LabelFlags::JUMP_TARGET;
        Ok(())
    }

    /// Place a label at the current offset
    ///
    /// Every forward reference to the label gets patched now.
    pub fn place_label(&mut self, label: LabelId) -> Result<(), Error> {
        let offset = self.code.cursor();
        let has_pseudo_instructions = self.graph.label_mut(label).resolve(&mut self.code, offset)?;
        self.has_pseudo_instructions |= has_pseudo_instructions;
        log::trace!("Placed {:?} at {:?}", label, offset);

        if !self
            .graph
            .label(label)
            .flags
            .contains(LabelFlags::DEBUG_ONLY)
        {
            self.start_block(label);
        }
        Ok(())
    }

    /// Push a straight-line instruction
    ///
    /// `bytes` is the full encoded instruction and `stack_delta` its effect on the stack height.
    /// Returns and `athrow` end the current block. Instructions that jump or use locals have
    /// dedicated methods instead.
    pub fn push_instruction(&mut self, bytes: &[u8], stack_delta: i32) -> Result<(), Error> {
        let opcode = match bytes.first() {
            Some(opcode) => *opcode,
            None => return Ok(()),
        };
        if opcodes::is_jump(opcode)
            || matches!(
                opcode,
                opcodes::RET | opcodes::TABLESWITCH | opcodes::LOOKUPSWITCH
            )
        {
            return Err(Error::ControlFlowInstruction(opcode));
        }

        self.code.put_bytes(bytes);
        self.adjust_stack(stack_delta);
        if opcodes::is_terminal(opcode) {
            self.close_current_block();
        }
        Ok(())
    }

    /// Push an instruction operating on a local variable
    pub fn push_local_instruction(&mut self, insn: LocalInstruction) -> Result<(), Error> {
        insn.serialize(&mut self.code);
        self.max_locals = self.max_locals.max(insn.locals_needed());
        self.adjust_stack(insn.stack_delta());

        if let LocalInstruction::Ret(_) = insn {
            if let Some(block) = self.close_current_block() {
                self.graph.label_mut(block).flags |= LabelFlags::SUBROUTINE_END;
            }
        }
        Ok(())
    }

    /// Push a jump (`goto`, `if*`, `jsr` or their wide variants) to `target`
    pub fn push_jump(&mut self, opcode: u8, target: LabelId) -> Result<(), Error> {
        if !opcodes::is_jump(opcode) {
            return Err(Error::NotAJumpOpcode(opcode));
        }
        self.mark_jump_target(target)?;
        let base_opcode = opcodes::base_jump_opcode(opcode);
        let source = self.code.cursor();

        let is_far_backward_jump = match self.graph.label(target).try_offset() {
            Some(target_offset) => target_offset - source < i16::MIN as isize,
            None => false,
        };
        let mut next_is_jump_target = false;
        if is_far_backward_jump {
            if base_opcode == opcodes::GOTO || base_opcode == opcodes::JSR {
                let wide_opcode = if base_opcode == opcodes::GOTO {
                    opcodes::GOTO_W
                } else {
                    opcodes::JSR_W
                };
                self.code.put_u8(wide_opcode);
                self.graph
                    .label_mut(target)
                    .put_reference(&mut self.code, source, ReferenceWidth::Wide)?;
            } else {
                // `if* target` becomes `ifnot* next; goto_w target; next:`
                let inverted_opcode =
                    opcodes::invert_branch(base_opcode).ok_or(Error::NotAJumpOpcode(opcode))?;
                self.code.put_u8(inverted_opcode);
                self.code.put_i16(8);
                let goto_source = self.code.cursor();
                self.code.put_u8(opcodes::GOTO_W);
                self.graph.label_mut(target).put_reference(
                    &mut self.code,
                    goto_source,
                    ReferenceWidth::Wide,
                )?;
                next_is_jump_target = true;
            }
        } else {
            let width = if base_opcode != opcode {
                ReferenceWidth::Wide
            } else {
                ReferenceWidth::Narrow
            };
            self.code.put_u8(opcode);
            self.graph
                .label_mut(target)
                .put_reference(&mut self.code, source, width)?;
        }
        log::trace!("Jump 0x{:02x} at {:?} to {:?}", opcode, source, target);

        let block = match self.current_block {
            Some(block) => block,
            None => return Ok(()),
        };
        if base_opcode == opcodes::JSR {
            self.has_subroutines = true;
            self.graph.label_mut(target).flags |= LabelFlags::SUBROUTINE_START;
            self.graph.label_mut(block).flags |= LabelFlags::SUBROUTINE_CALLER;

            // The subroutine starts with the return address on the stack
            self.graph
                .add_edge(block, target, EdgeInfo::Jump(self.relative_stack_size + 1));

            // Placing the continuation adds the fall-through edge, which ends up first
            let continuation = self.graph.fresh_label();
            self.place_label(continuation)?;
        } else {
            self.adjust_stack(opcodes::jump_stack_delta(base_opcode));
            self.graph
                .add_edge(block, target, EdgeInfo::Jump(self.relative_stack_size));
            if base_opcode == opcodes::GOTO {
                self.close_current_block();
            } else {
                let next = self.graph.fresh_label();
                if next_is_jump_target {
                    self.graph.label_mut(next).flags |= LabelFlags::JUMP_TARGET;
                }
                self.place_label(next)?;
            }
        }
        Ok(())
    }

    /// Push a `tableswitch` for keys `low` to `high` (inclusive)
    ///
    /// `targets` should contain `high - low + 1` labels.
    pub fn push_table_switch(
        &mut self,
        low: i32,
        high: i32,
        default: LabelId,
        targets: &[LabelId],
    ) -> Result<(), Error> {
        let source = self.code.cursor();
        self.code.put_u8(opcodes::TABLESWITCH);
        self.code.pad_to(4);
        self.graph
            .label_mut(default)
            .put_reference(&mut self.code, source, ReferenceWidth::Wide)?;
        self.code.put_i32(low);
        self.code.put_i32(high);
        for target in targets {
            self.graph
                .label_mut(*target)
                .put_reference(&mut self.code, source, ReferenceWidth::Wide)?;
        }
        self.end_switch(default, targets.iter().copied())
    }

    /// Push a `lookupswitch`
    ///
    /// The cases are sorted by key, as the JVM requires.
    pub fn push_lookup_switch(
        &mut self,
        default: LabelId,
        cases: &[(i32, LabelId)],
    ) -> Result<(), Error> {
        let mut cases = cases.to_vec();
        cases.sort_by_key(|(key, _)| *key);

        let source = self.code.cursor();
        self.code.put_u8(opcodes::LOOKUPSWITCH);
        self.code.pad_to(4);
        self.graph
            .label_mut(default)
            .put_reference(&mut self.code, source, ReferenceWidth::Wide)?;
        self.code.put_i32(cases.len() as i32);
        for (key, target) in &cases {
            self.code.put_i32(*key);
            self.graph
                .label_mut(*target)
                .put_reference(&mut self.code, source, ReferenceWidth::Wide)?;
        }
        self.end_switch(default, cases.iter().map(|(_, target)| *target))
    }

    fn end_switch(
        &mut self,
        default: LabelId,
        targets: impl Iterator<Item = LabelId>,
    ) -> Result<(), Error> {
        // The key is popped
        self.adjust_stack(-1);
        for target in std::iter::once(default).chain(targets) {
            self.mark_jump_target(target)?;
            if let Some(block) = self.current_block {
                self.graph
                    .add_edge(block, target, EdgeInfo::Jump(self.relative_stack_size));
            }
        }
        self.close_current_block();
        Ok(())
    }

    /// Attach a source line number to a label
    pub fn add_line_number(&mut self, label: LabelId, line_number: u16) {
        self.graph.label_mut(label).add_line_number(line_number);
        self.line_numbers.push((label, line_number));
    }

    /// Protect the blocks from `start` (inclusive) to `end` (exclusive) with a handler
    ///
    /// `catch_type` is the class constant index of the exception to catch, or `0` to catch
    /// everything. The labels need not be placed yet, but they must all end up starting blocks.
    pub fn add_exception_handler(
        &mut self,
        start: LabelId,
        end: LabelId,
        handler: LabelId,
        catch_type: u16,
    ) -> Result<(), Error> {
        for label in [start, end] {
            let label = self.graph.label_mut(label);
            if !label.is_resolved() {
                label.flags.remove(LabelFlags::DEBUG_ONLY);
            }
        }
        self.mark_jump_target(handler)?;
        self.exception_handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type,
        });
        Ok(())
    }

    /// Maximum stack and locals sizes, used when `compute_maxs` is disabled
    pub fn set_maxs(&mut self, max_stack: u16, max_locals: u16) {
        self.declared_maxs = (max_stack, max_locals);
    }

    /// Add exception edges from every block protected by a handler
    fn add_exception_edges(&mut self) -> Result<(), Error> {
        for handler in &self.exception_handlers {
            let invalid_range = || Error::InvalidHandlerRange {
                start: handler.start,
                end: handler.end,
            };
            let blocks = self.graph.blocks();
            let start_index = blocks
                .iter()
                .position(|block| *block == handler.start)
                .ok_or_else(invalid_range)?;
            let end_index = blocks
                .iter()
                .position(|block| *block == handler.end)
                .ok_or_else(invalid_range)?;
            if start_index >= end_index {
                return Err(invalid_range());
            }
            let protected_blocks = blocks[start_index..end_index].to_vec();
            for block in protected_blocks {
                self.graph.add_exception_edge(block, handler.handler)?;
            }
        }
        Ok(())
    }

    /// Resolved offset of a label, as stored in class file tables
    fn bytecode_index(&self, label: LabelId) -> Result<u16, Error> {
        let offset = self.graph.label(label).offset()?;
        u16::try_from(offset.0).map_err(|_| Error::MethodCodeOverflow(offset))
    }

    /// Turn the builder into the finished method code
    pub fn result(mut self) -> Result<Code, Error> {
        // Weed out some error cases early. An empty block at the very end is fine, unless
        // control can actually get there.
        let code_end = self.code.cursor();
        let pending_block = self.current_block.filter(|block| {
            let label = self.graph.label(*block);
            label.try_offset() != Some(code_end)
                || self.falls_into_current_block
                || label.flags.contains(LabelFlags::JUMP_TARGET)
        });
        let unplaced_labels: Vec<LabelId> = self
            .graph
            .labels()
            .filter(|label| {
                !label.is_resolved()
                    && (label.pending_references() > 0
                        || label.flags.contains(LabelFlags::JUMP_TARGET))
            })
            .map(|label| label.id())
            .collect();
        if pending_block.is_some() || !unplaced_labels.is_empty() {
            return Err(Error::MethodCodeNotFinished {
                pending_block,
                unplaced_labels,
            });
        }
        if code_end.0 > self.settings.max_code_length {
            return Err(Error::MethodCodeOverflow(code_end));
        }
        self.close_current_block();

        self.add_exception_edges()?;
        if self.has_subroutines {
            let subroutines = self.graph.analyze_subroutines()?;
            log::debug!("Found {} subroutines", subroutines.saturating_sub(1));
        }

        let (max_stack, max_locals) = if self.settings.compute_maxs {
            let max_stack = self.graph.compute_max_stack()?;
            let max_stack = u16::try_from(max_stack)
                .map_err(|_| Error::MethodCodeMaxStackOverflow(Offset(max_stack)))?;
            let max_locals = u16::try_from(self.max_locals)
                .map_err(|_| Error::MethodCodeMaxLocalsOverflow(Offset(self.max_locals)))?;
            (max_stack, max_locals)
        } else {
            self.declared_maxs
        };

        let exception_table = self
            .exception_handlers
            .iter()
            .map(|handler| {
                Ok(ExceptionTableEntry {
                    start_pc: self.bytecode_index(handler.start)?,
                    end_pc: self.bytecode_index(handler.end)?,
                    handler_pc: self.bytecode_index(handler.handler)?,
                    catch_type: handler.catch_type,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let line_numbers = if self.settings.emit_line_numbers {
            self.line_numbers
                .iter()
                .map(|(label, line_number)| {
                    Ok(LineNumberEntry {
                        start_pc: self.bytecode_index(*label)?,
                        line_number: *line_number,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?
        } else {
            vec![]
        };

        if self.has_pseudo_instructions {
            log::debug!("Method code contains jumps that need widening");
        }

        Ok(Code {
            code_array: self.code.into_vec(),
            max_stack,
            max_locals,
            exception_table,
            line_numbers,
            requires_jump_widening: self.has_pseudo_instructions,
            graph: self.graph,
        })
    }
}

impl LabelGenerator<LabelId> for CodeBuilder {
    fn fresh_label(&mut self) -> LabelId {
        self.graph.fresh_label()
    }
}
