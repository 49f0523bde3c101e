use crate::jvm::code::ControlFlowGraph;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Result;

/// Big-endian serialization of the tables that reference code offsets
///
/// Class file sequences are prefixed with their length as a `u16`.
pub trait Serialize: Sized {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

/// Finished method body
///
/// Everything that refers to code offsets has been resolved. The constant pool is not involved
/// at all, so `catch_type` in the exception table is whatever class constant index the caller
/// supplied.
#[derive(Debug)]
pub struct Code {
    /// Bytecode
    pub code_array: Vec<u8>,

    /// Maximum size of stack through the method
    pub max_stack: u16,

    /// Maximum size of locals through the method
    pub max_locals: u16,

    pub exception_table: Vec<ExceptionTableEntry>,

    /// Line number table (empty if line numbers are disabled in the settings)
    pub line_numbers: Vec<LineNumberEntry>,

    /// Whether some forward jumps did not fit in 16 bits and were written as pseudo instructions
    ///
    /// When set, the code array contains opcodes from `ASM_IFEQ` to `ASM_GOTO_W` that need to be
    /// rewritten before the code is valid.
    pub requires_jump_widening: bool,

    /// Control flow graph of the method, with subroutines and max stack information filled in
    pub graph: ControlFlowGraph,
}

/// Entry in the exception table of a `Code` attribute
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// Start of the protected range (inclusive)
    pub start_pc: u16,

    /// End of the protected range (exclusive)
    pub end_pc: u16,

    /// Start of the handler
    pub handler_pc: u16,

    /// Class constant of the caught exception, or `0` to catch everything
    pub catch_type: u16,
}

impl Serialize for ExceptionTableEntry {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

/// Entry in a `LineNumberTable` attribute
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

impl Serialize for LineNumberEntry {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exception_table_bytes() {
        let table = vec![ExceptionTableEntry {
            start_pc: 0,
            end_pc: 0x10,
            handler_pc: 0x0102,
            catch_type: 7,
        }];
        let mut bytes = vec![];
        table.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 1, 0, 0, 0, 0x10, 0x01, 0x02, 0, 7]);
    }

    #[test]
    fn line_number_table_bytes() {
        let table = vec![
            LineNumberEntry {
                start_pc: 0,
                line_number: 3,
            },
            LineNumberEntry {
                start_pc: 4,
                line_number: 5,
            },
        ];
        let mut bytes = vec![];
        table.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 2, 0, 0, 0, 3, 0, 4, 0, 5]);
    }
}
