use crate::jvm::code::opcodes;
use crate::util::ByteVector;

/// Instructions that address a local variable slot
///
/// Each variant covers the short form (eg. `iload_2`), the normal form, and the `wide` form of
/// the instruction - the narrowest encoding is picked when serializing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LocalInstruction {
    ILoad(u16),
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IStore(u16),
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IInc(u16, i16),
    Ret(u16),
}

impl LocalInstruction {
    /// Opcode of the normal (non-short, non-wide) form
    pub fn opcode(&self) -> u8 {
        match self {
            LocalInstruction::ILoad(_) => opcodes::ILOAD,
            LocalInstruction::LLoad(_) => opcodes::LLOAD,
            LocalInstruction::FLoad(_) => opcodes::FLOAD,
            LocalInstruction::DLoad(_) => opcodes::DLOAD,
            LocalInstruction::ALoad(_) => opcodes::ALOAD,
            LocalInstruction::IStore(_) => opcodes::ISTORE,
            LocalInstruction::LStore(_) => opcodes::LSTORE,
            LocalInstruction::FStore(_) => opcodes::FSTORE,
            LocalInstruction::DStore(_) => opcodes::DSTORE,
            LocalInstruction::AStore(_) => opcodes::ASTORE,
            LocalInstruction::IInc(_, _) => opcodes::IINC,
            LocalInstruction::Ret(_) => opcodes::RET,
        }
    }

    /// Local variable slot
    pub fn index(&self) -> u16 {
        match self {
            LocalInstruction::ILoad(idx)
            | LocalInstruction::LLoad(idx)
            | LocalInstruction::FLoad(idx)
            | LocalInstruction::DLoad(idx)
            | LocalInstruction::ALoad(idx)
            | LocalInstruction::IStore(idx)
            | LocalInstruction::LStore(idx)
            | LocalInstruction::FStore(idx)
            | LocalInstruction::DStore(idx)
            | LocalInstruction::AStore(idx)
            | LocalInstruction::IInc(idx, _)
            | LocalInstruction::Ret(idx) => *idx,
        }
    }

    /// Number of local slots used by the value (`long` and `double` take two)
    pub fn slot_width(&self) -> u16 {
        match self {
            LocalInstruction::LLoad(_)
            | LocalInstruction::DLoad(_)
            | LocalInstruction::LStore(_)
            | LocalInstruction::DStore(_) => 2,
            _ => 1,
        }
    }

    /// Change in operand stack height
    pub fn stack_delta(&self) -> i32 {
        match self {
            LocalInstruction::ILoad(_)
            | LocalInstruction::FLoad(_)
            | LocalInstruction::ALoad(_) => 1,
            LocalInstruction::LLoad(_) | LocalInstruction::DLoad(_) => 2,
            LocalInstruction::IStore(_)
            | LocalInstruction::FStore(_)
            | LocalInstruction::AStore(_) => -1,
            LocalInstruction::LStore(_) | LocalInstruction::DStore(_) => -2,
            LocalInstruction::IInc(_, _) | LocalInstruction::Ret(_) => 0,
        }
    }

    /// Number of local slots that must exist for this instruction to be valid
    pub fn locals_needed(&self) -> usize {
        self.index() as usize + self.slot_width() as usize
    }

    /// Append the instruction to `code`
    pub fn serialize(&self, code: &mut ByteVector) {
        let opcode = self.opcode();
        let index = self.index();
        match self {
            LocalInstruction::IInc(_, constant) => {
                match (u8::try_from(index), i8::try_from(*constant)) {
                    (Ok(index), Ok(constant)) => {
                        code.put_u8(opcode);
                        code.put_u8(index);
                        code.put_i8(constant);
                    }
                    _ => {
                        code.put_u8(opcodes::WIDE);
                        code.put_u8(opcode);
                        code.put_u16(index);
                        code.put_i16(*constant);
                    }
                }
            }
            LocalInstruction::Ret(_) => match u8::try_from(index) {
                Ok(index) => {
                    code.put_u8(opcode);
                    code.put_u8(index);
                }
                Err(_) => {
                    code.put_u8(opcodes::WIDE);
                    code.put_u8(opcode);
                    code.put_u16(index);
                }
            },
            _ => {
                if index < 4 {
                    let short_opcode = if opcode < opcodes::ISTORE {
                        opcodes::ILOAD_0 + ((opcode - opcodes::ILOAD) << 2) + index as u8
                    } else {
                        opcodes::ISTORE_0 + ((opcode - opcodes::ISTORE) << 2) + index as u8
                    };
                    code.put_u8(short_opcode);
                } else if let Ok(index) = u8::try_from(index) {
                    code.put_u8(opcode);
                    code.put_u8(index);
                } else {
                    code.put_u8(opcodes::WIDE);
                    code.put_u8(opcode);
                    code.put_u16(index);
                }
            }
        }
    }
}
