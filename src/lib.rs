//! Triangle Abstract Machine.
//!
//! Provides the object loader, the interpreter, and an assembler and disassembler for
//! TAM code.

pub mod utils;
pub mod virtual_machine;
