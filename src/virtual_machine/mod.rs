//! The Triangle Abstract Machine.
//!
//! A stack machine with separate code and data stores. Programs are loaded from object
//! files of fixed four-word instruction records and run by a fetch-execute loop until
//! they halt or fault.
//!
//! # Architecture
//!
//! - **Code store**: up to 1024 instructions from `CB` to `CT`
//! - **Data store**: 1024 words; the stack grows up from `SB`, the heap down from `HB`
//! - **Registers**: `ST`, `HT`, `LB`, `CP` and `CT` are mutable; `L1`..`L6` are found by
//!   following static links from `LB`
//! - **Primitives**: `CALL` targets in `PB..PT` run built-in routines for arithmetic,
//!   comparison, heap allocation and console I/O
//! - **Faults**: every failure is a terminal [`status::Status`]; nothing panics
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, diagnostics, and object code generation
//! - [`errors`]: Loader and assembler error types
//! - [`isa`]: Instruction set definition, registers and machine constants
//! - [`primitives`]: The primitive routine table
//! - [`program`]: Object file format
//! - [`status`]: Machine status, faults and the post-mortem dump
//! - [`vm`]: The fetch-execute machine

pub mod assembler;
pub mod errors;
pub mod isa;
pub mod primitives;
pub mod program;
pub mod status;
pub mod vm;
