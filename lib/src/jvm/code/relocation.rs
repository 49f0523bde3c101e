use crate::jvm::code::opcodes;
use crate::jvm::Error;
use crate::util::{ByteVector, Offset};

/// How many bytes a reference to a label takes up in the instruction stream
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceWidth {
    /// Signed 16-bit offset (`goto`, `if*`, `jsr`)
    Narrow,

    /// Signed 32-bit offset (`goto_w`, `jsr_w`, switch targets)
    Wide,
}

impl ReferenceWidth {
    pub fn bytes(self) -> usize {
        match self {
            ReferenceWidth::Narrow => 2,
            ReferenceWidth::Wide => 4,
        }
    }
}

/// Reference to a label whose offset was not yet known when the reference was written
///
/// Jump offsets in JVM bytecode are relative to the start of the jumping instruction, which is
/// why both the instruction offset and the offset of the placeholder bytes are needed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ForwardReference {
    /// Offset of the opcode of the instruction containing the reference
    pub source_offset: Offset,

    /// Size of the placeholder
    pub width: ReferenceWidth,

    /// Offset of the placeholder bytes
    pub patch_site: Offset,
}

/// What to write over the placeholder of one reference
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Patch {
    Narrow(i16),
    Wide(i32),

    /// Rewrite the opcode to its pseudo variant, whose operand is an unsigned 16-bit offset
    Pseudo { opcode: u8, relative_offset: u16 },
}

impl ForwardReference {
    /// Work out the patch for `target` without writing anything
    fn plan(&self, code: &ByteVector, target: Offset) -> Result<Patch, Error> {
        let relative_offset = target - self.source_offset;
        match self.width {
            ReferenceWidth::Wide => i32::try_from(relative_offset)
                .map(Patch::Wide)
                .map_err(|_| Error::MethodCodeOverflow(target)),
            ReferenceWidth::Narrow => {
                if let Ok(relative_offset) = i16::try_from(relative_offset) {
                    return Ok(Patch::Narrow(relative_offset));
                }
                let opcode = code.get_u8(self.source_offset);
                let pseudo_opcode =
                    opcodes::pseudo_wide_opcode(opcode).ok_or(Error::NotABranchInstruction {
                        offset: self.source_offset,
                        opcode,
                    })?;
                let relative_offset = u16::try_from(relative_offset)
                    .map_err(|_| Error::MethodCodeOverflow(target))?;
                Ok(Patch::Pseudo {
                    opcode: pseudo_opcode,
                    relative_offset,
                })
            }
        }
    }

    /// Write a planned patch, returning whether it introduced a pseudo instruction
    fn apply(&self, code: &mut ByteVector, patch: Patch) -> bool {
        match patch {
            Patch::Narrow(relative_offset) => {
                code.patch_i16(self.patch_site, relative_offset);
                false
            }
            Patch::Wide(relative_offset) => {
                code.patch_i32(self.patch_site, relative_offset);
                false
            }
            Patch::Pseudo {
                opcode,
                relative_offset,
            } => {
                log::debug!(
                    "Jump at {:?} overflows by {}, rewriting 0x{:02x} to 0x{:02x}",
                    self.source_offset,
                    relative_offset,
                    code.get_u8(self.source_offset),
                    opcode
                );
                code.patch_u8(self.source_offset, opcode);
                code.patch_u16(self.patch_site, relative_offset);
                true
            }
        }
    }

    /// Overwrite the placeholder now that the target is known
    ///
    /// Returns `true` when a narrow reference did not fit and the instruction was rewritten to a
    /// pseudo opcode (the operand is then an unsigned 16-bit offset).
    pub fn patch(&self, code: &mut ByteVector, target: Offset) -> Result<bool, Error> {
        let patch = self.plan(code, target)?;
        Ok(self.apply(code, patch))
    }
}

/// Forward references to one label, in the order they were made
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelocationLedger {
    references: Vec<ForwardReference>,
}

impl RelocationLedger {
    pub fn new() -> RelocationLedger {
        RelocationLedger { references: vec![] }
    }

    /// Record a reference and write its placeholder (`-1`) at the cursor
    pub fn push_placeholder(
        &mut self,
        code: &mut ByteVector,
        source_offset: Offset,
        width: ReferenceWidth,
    ) {
        let patch_site = code.cursor();
        match width {
            ReferenceWidth::Narrow => code.put_i16(-1),
            ReferenceWidth::Wide => code.put_i32(-1),
        }
        self.references.push(ForwardReference {
            source_offset,
            width,
            patch_site,
        });
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn references(&self) -> &[ForwardReference] {
        &self.references
    }

    /// Patch every reference to point at `target`
    ///
    /// Returns whether any reference required a pseudo instruction. Every reference is checked
    /// before anything gets written, so on error `code` is left untouched.
    pub fn resolve(&self, code: &mut ByteVector, target: Offset) -> Result<bool, Error> {
        let patches = self
            .references
            .iter()
            .map(|reference| reference.plan(code, target))
            .collect::<Result<Vec<Patch>, Error>>()?;

        let mut has_pseudo_instructions = false;
        for (reference, patch) in self.references.iter().zip(patches) {
            log::trace!(
                "Patching {:?} reference from {:?} to {:?}",
                reference.width,
                reference.source_offset,
                target
            );
            has_pseudo_instructions |= reference.apply(code, patch);
        }
        Ok(has_pseudo_instructions)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Buffer of `len` `nop`s with the given opcodes sprinkled in
    fn code_with(len: usize, opcodes_at: &[(usize, u8)]) -> ByteVector {
        let mut code = ByteVector::new();
        for _ in 0..len {
            code.put_u8(opcodes::NOP);
        }
        for (at, opcode) in opcodes_at {
            code.patch_u8(Offset(*at), *opcode);
        }
        code
    }

    #[test]
    fn placeholders_are_minus_one() {
        let mut code = code_with(1, &[(0, opcodes::GOTO)]);
        let mut ledger = RelocationLedger::new();
        ledger.push_placeholder(&mut code, Offset(0), ReferenceWidth::Narrow);
        assert_eq!(code.as_slice(), &[opcodes::GOTO, 0xff, 0xff]);

        let mut code = code_with(1, &[(0, opcodes::GOTO_W)]);
        ledger.push_placeholder(&mut code, Offset(0), ReferenceWidth::Wide);
        assert_eq!(code.as_slice(), &[opcodes::GOTO_W, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn ledger_keeps_every_reference() {
        let mut code = ByteVector::new();
        let mut ledger = RelocationLedger::new();
        for i in 0..100 {
            code.put_u8(opcodes::GOTO);
            ledger.push_placeholder(&mut code, Offset(i * 3), ReferenceWidth::Narrow);
        }
        assert_eq!(ledger.len(), 100);

        let target = code.cursor();
        assert!(!ledger.resolve(&mut code, target).unwrap());
        for i in 0..100 {
            let source = Offset(i * 3);
            assert_eq!(
                code.get_i16(source + 1) as isize,
                target - source,
                "wrong offset patched for jump {}",
                i
            );
        }
    }

    #[test]
    fn narrow_overflow_rewrites_opcode() {
        let mut code = code_with(10, &[(0, opcodes::IFEQ), (4, opcodes::IFNULL)]);
        let mut ledger = RelocationLedger::new();
        ledger.push_placeholder(&mut code, Offset(0), ReferenceWidth::Narrow);
        ledger.push_placeholder(&mut code, Offset(4), ReferenceWidth::Narrow);

        let target = Offset(40_000);
        assert!(ledger.resolve(&mut code, target).unwrap());
        assert_eq!(code.get_u8(Offset(0)), opcodes::ASM_IFEQ);
        assert_eq!(code.get_u8(Offset(4)), opcodes::ASM_IFNULL);
        assert_eq!(code.get_u16(Offset(10)), 40_000);
        assert_eq!(code.get_u16(Offset(12)), 39_996);
    }

    #[test]
    fn narrow_overflow_on_non_branch() {
        let mut code = code_with(1, &[(0, opcodes::IADD)]);
        let mut ledger = RelocationLedger::new();
        ledger.push_placeholder(&mut code, Offset(0), ReferenceWidth::Narrow);
        match ledger.resolve(&mut code, Offset(50_000)) {
            Err(Error::NotABranchInstruction { offset, opcode }) => {
                assert_eq!(offset, Offset(0));
                assert_eq!(opcode, opcodes::IADD);
            }
            other => panic!("expected a branch error, got {:?}", other),
        }
    }

    #[test]
    fn failed_resolve_writes_nothing() {
        let mut code = code_with(6, &[(0, opcodes::GOTO), (3, opcodes::IADD)]);
        let mut ledger = RelocationLedger::new();
        ledger.push_placeholder(&mut code, Offset(0), ReferenceWidth::Narrow);
        ledger.push_placeholder(&mut code, Offset(3), ReferenceWidth::Narrow);
        let before = code.clone();

        assert!(matches!(
            ledger.resolve(&mut code, Offset(50_000)),
            Err(Error::NotABranchInstruction { .. })
        ));
        assert_eq!(code, before, "the `goto` must not be rewritten either");
        assert_eq!(ledger.len(), 2);
    }
}
