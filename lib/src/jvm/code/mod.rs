//! Bytecode generation
//!
//! ### Structure
//!
//! Method bodies are essentially a CFG of basic blocks, with an operand stack and a stack of local
//! variables. Every basic block starts at a [`Label`], so the labels double as the nodes of the
//! [`ControlFlowGraph`]. Labels also keep track of where they are referenced from: jumps to labels
//! that have not been placed yet are written with placeholder offsets, recorded in a
//! [`RelocationLedger`], and patched once the label gets its offset.
//!
//! ### Code generation
//!
//! It is tedious and error prone to compute offsets, stack sizes, and control flow by hand, so
//! [`CodeBuilder`] provides an interface for generating method code from top to bottom and doing
//! the bookkeeping incrementally. Once everything is emitted, it produces the finished [`Code`].
//!
//! ### Subroutines
//!
//! The `jsr` and `ret` instructions are deprecated, but still valid in old class files. Since the
//! target of a `ret` is not explicit, subroutines need a dedicated analysis to complete the CFG.
//! See [`ControlFlowGraph::analyze_subroutines`].

mod code;
mod code_builder;
mod edge;
mod graph;
mod instructions;
mod label;
mod max_stack;
pub mod opcodes;
mod relocation;
mod settings;
mod subroutine;

pub use code::*;
pub use code_builder::*;
pub use edge::*;
pub use graph::*;
pub use instructions::*;
pub use label::*;
pub use relocation::*;
pub use settings::*;
pub use subroutine::*;
