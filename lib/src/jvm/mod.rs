//! Emit JVM method bodies
//!
//! ### Simple example
//!
//! Consider the following Java method:
//!
//! ```java,ignore,no_run
//! static int sign(int x) {
//!     if (x < 0) {
//!         return -1;
//!     }
//!     return 1;
//! }
//! ```
//!
//! The body can be assembled as follows, without knowing ahead of time where the `ifge` jump
//! will land:
//!
//! ```
//! use jvmasm::jvm::code::{opcodes, CodeBuilder, LabelGenerator, LocalInstruction, Settings};
//! use jvmasm::jvm::Error;
//!
//! # fn assemble() -> Result<(), Error> {
//! let mut code = CodeBuilder::new(Settings::default(), 1);
//! let positive = code.fresh_label();
//!
//! code.push_local_instruction(LocalInstruction::ILoad(0))?;
//! code.push_jump(opcodes::IFGE, positive)?;
//! code.push_instruction(&[opcodes::ICONST_M1], 1)?;
//! code.push_instruction(&[opcodes::IRETURN], -1)?;
//! code.place_label(positive)?;
//! code.push_instruction(&[opcodes::ICONST_1], 1)?;
//! code.push_instruction(&[opcodes::IRETURN], -1)?;
//!
//! let code = code.result()?;
//! assert_eq!(code.max_stack, 1);
//! assert_eq!(code.max_locals, 1);
//! assert_eq!(code.code_array, vec![0x1a, 0x9c, 0x00, 0x05, 0x02, 0xac, 0x04, 0xac]);
//! # Ok(())
//! # }
//! # assemble().unwrap();
//! ```

pub mod code;
mod errors;

pub use errors::*;
