//! Assemble JVM method bodies
//!
//! The interesting part of emitting bytecode is not writing the instructions - it is keeping
//! track of where jumps go. Jump targets are usually not known when the jump is written, so the
//! jump gets a placeholder and the target [label](jvm::code::Label) remembers where to patch it.
//! Along the way, the blocks between labels are connected into a control flow graph from which
//! the maximum stack depth can be computed, even in the presence of `jsr`/`ret` subroutines.

pub mod jvm;
pub mod util;
