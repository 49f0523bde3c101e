//! The slice of the JVM opcode table that label resolution and block tracking need
//!
//! Besides the real opcodes, this defines the _pseudo_ opcodes `asm_ifeq` through `asm_goto_w`.
//! These never appear in a finished class file. When a narrow forward jump turns out to be too
//! long once its label is placed, the branch opcode is rewritten in place to its pseudo variant,
//! whose 2-byte operand is read as _unsigned_. A later pass has to replace every pseudo
//! instruction with a real `goto_w`-based sequence (see
//! [`Code::requires_jump_widening`](super::Code::requires_jump_widening)).

use std::ops::RangeInclusive;

pub const NOP: u8 = 0x00;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1a;
pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3a;
pub const ISTORE_0: u8 = 0x3b;
pub const POP: u8 = 0x57;
pub const IADD: u8 = 0x60;
pub const IINC: u8 = 0x84;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IFLT: u8 = 0x9b;
pub const IFGE: u8 = 0x9c;
pub const IFGT: u8 = 0x9d;
pub const IFLE: u8 = 0x9e;
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ICMPNE: u8 = 0xa0;
pub const IF_ICMPLT: u8 = 0xa1;
pub const IF_ICMPGE: u8 = 0xa2;
pub const IF_ICMPGT: u8 = 0xa3;
pub const IF_ICMPLE: u8 = 0xa4;
pub const IF_ACMPEQ: u8 = 0xa5;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const RETURN: u8 = 0xb1;
pub const ATHROW: u8 = 0xbf;
pub const WIDE: u8 = 0xc4;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;

/// Distance from `goto_w`/`jsr_w` to `goto`/`jsr`
const WIDE_JUMP_OPCODE_DELTA: u8 = GOTO_W - GOTO;

/// Distance from `ifeq`..`jsr` to their pseudo variants
const PSEUDO_OPCODE_DELTA: u8 = 49;

/// Distance from `ifnull`/`ifnonnull` to their pseudo variants
const PSEUDO_IFNULL_OPCODE_DELTA: u8 = 20;

pub const ASM_IFEQ: u8 = IFEQ + PSEUDO_OPCODE_DELTA;
pub const ASM_GOTO: u8 = GOTO + PSEUDO_OPCODE_DELTA;
pub const ASM_JSR: u8 = JSR + PSEUDO_OPCODE_DELTA;
pub const ASM_IFNULL: u8 = IFNULL + PSEUDO_IFNULL_OPCODE_DELTA;
pub const ASM_IFNONNULL: u8 = IFNONNULL + PSEUDO_IFNULL_OPCODE_DELTA;
pub const ASM_GOTO_W: u8 = 0xdc;

/// Branches whose offset is a signed 16-bit integer (`ifeq` through `jsr`)
const NARROW_BRANCHES: RangeInclusive<u8> = IFEQ..=JSR;

/// Is this a branch that encodes its target as a signed 16-bit offset?
pub fn is_narrow_branch(opcode: u8) -> bool {
    NARROW_BRANCHES.contains(&opcode) || opcode == IFNULL || opcode == IFNONNULL
}

/// Is this a (narrow or wide) jump that takes a single label operand?
pub fn is_jump(opcode: u8) -> bool {
    is_narrow_branch(opcode) || opcode == GOTO_W || opcode == JSR_W
}

/// Is this a conditional branch (ie. one that may also fall through)?
pub fn is_conditional_branch(opcode: u8) -> bool {
    (IFEQ..=IF_ACMPNE).contains(&opcode) || opcode == IFNULL || opcode == IFNONNULL
}

/// Map `goto_w` and `jsr_w` onto `goto` and `jsr`, leaving everything else alone
pub fn base_jump_opcode(opcode: u8) -> u8 {
    if opcode == GOTO_W || opcode == JSR_W {
        opcode - WIDE_JUMP_OPCODE_DELTA
    } else {
        opcode
    }
}

/// Does this instruction end a block with no successor at all?
pub fn is_terminal(opcode: u8) -> bool {
    (IRETURN..=RETURN).contains(&opcode) || opcode == ATHROW
}

/// Change in stack height caused by a jump
///
/// `jsr` is reported as `0`: the return address it pushes is only visible inside the
/// subroutine, and that is accounted for on the edge into the subroutine.
pub fn jump_stack_delta(opcode: u8) -> i32 {
    match base_jump_opcode(opcode) {
        IFEQ..=IFLE | IFNULL | IFNONNULL => -1,
        IF_ICMPEQ..=IF_ACMPNE => -2,
        _ => 0,
    }
}

/// Branch testing the opposite condition
///
/// Only defined for conditional branches. Conditions come in adjacent pairs (`ifeq`/`ifne`,
/// `iflt`/`ifge`, ...), but the pairs start at an odd opcode before `ifnull` and at an even one
/// from `ifnull` on.
pub fn invert_branch(opcode: u8) -> Option<u8> {
    if !is_conditional_branch(opcode) {
        None
    } else if opcode >= IFNULL {
        Some(opcode ^ 1)
    } else {
        Some(((opcode + 1) ^ 1) - 1)
    }
}

/// Pseudo variant of a narrow branch, used when its forward offset overflows
pub fn pseudo_wide_opcode(opcode: u8) -> Option<u8> {
    if NARROW_BRANCHES.contains(&opcode) {
        Some(opcode + PSEUDO_OPCODE_DELTA)
    } else if opcode == IFNULL || opcode == IFNONNULL {
        Some(opcode + PSEUDO_IFNULL_OPCODE_DELTA)
    } else {
        None
    }
}

/// Real branch opcode behind a pseudo opcode
pub fn unpseudo_opcode(opcode: u8) -> Option<u8> {
    match opcode {
        ASM_IFEQ..=ASM_JSR => Some(opcode - PSEUDO_OPCODE_DELTA),
        ASM_IFNULL | ASM_IFNONNULL => Some(opcode - PSEUDO_IFNULL_OPCODE_DELTA),
        ASM_GOTO_W => Some(GOTO_W),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pseudo_opcodes_are_unused_real_opcodes() {
        assert_eq!(ASM_IFEQ, 0xca);
        assert_eq!(ASM_GOTO, 0xd8);
        assert_eq!(ASM_JSR, 0xd9);
        assert_eq!(ASM_IFNULL, 0xda);
        assert_eq!(ASM_IFNONNULL, 0xdb);
        assert!(ASM_IFNONNULL < ASM_GOTO_W);
    }

    #[test]
    fn pseudo_round_trip() {
        for opcode in (IFEQ..=JSR).chain([IFNULL, IFNONNULL]) {
            let pseudo = pseudo_wide_opcode(opcode).expect("narrow branch");
            assert_eq!(unpseudo_opcode(pseudo), Some(opcode));
        }
        assert_eq!(pseudo_wide_opcode(GOTO_W), None);
        assert_eq!(pseudo_wide_opcode(IADD), None);
    }

    #[test]
    fn inversions() {
        assert_eq!(invert_branch(IFEQ), Some(IFNE));
        assert_eq!(invert_branch(IFNE), Some(IFEQ));
        assert_eq!(invert_branch(IFLT), Some(IFGE));
        assert_eq!(invert_branch(IF_ICMPLE), Some(IF_ICMPGT));
        assert_eq!(invert_branch(IF_ACMPEQ), Some(IF_ACMPNE));
        assert_eq!(invert_branch(IFNULL), Some(IFNONNULL));
        assert_eq!(invert_branch(IFNONNULL), Some(IFNULL));
        assert_eq!(invert_branch(GOTO), None);
        assert_eq!(invert_branch(JSR), None);
    }

    #[test]
    fn every_return_is_terminal() {
        // `lreturn`, `freturn`, `dreturn` and `areturn` sit between these two
        for opcode in IRETURN..=RETURN {
            assert!(is_terminal(opcode), "0x{:02x}", opcode);
        }
        assert!(is_terminal(ATHROW));
        assert!(!is_terminal(GOTO));
        assert!(!is_terminal(RET));
    }

    #[test]
    fn stack_deltas() {
        assert_eq!(jump_stack_delta(IFEQ), -1);
        assert_eq!(jump_stack_delta(IF_ICMPGE), -2);
        assert_eq!(jump_stack_delta(IFNONNULL), -1);
        assert_eq!(jump_stack_delta(GOTO_W), 0);
        assert_eq!(jump_stack_delta(JSR), 0);
    }
}
