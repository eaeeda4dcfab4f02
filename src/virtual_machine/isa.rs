//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the TAM instruction set. The [`for_each_instruction!`](crate::for_each_instruction)
//! macro holds the canonical instruction definitions and invokes a callback macro for code
//! generation. This enables multiple modules to generate instruction-related
//! code without duplicating definitions.
//!
//! This module generates:
//! - The [`Opcode`] enum with opcode mappings
//! - `TryFrom<Word>` for decoding opcodes
//! - [`Opcode::mnemonic`] and the operand shape used by the disassembler
//!
//! See [`assembler`](super::assembler) for the parsing side of the same table.
//!
//! # Instruction format
//!
//! Every instruction is a fixed record of four words, `op r n d`:
//! - `op`: opcode tag
//! - `r`: register selector used to form the address `d + content(r)`
//! - `n`: small count (words moved), static-link register (`CALL`) or test value (`JUMPIF`)
//! - `d`: displacement or literal
//!
//! Fields an instruction does not use are written as zero.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::primitives::Primitive;
use std::fmt;

/// A machine word.
pub type Word = i32;

/// Number of words in the data store.
pub const DATA_STORE_SIZE: usize = 1024;
/// Number of instructions the code store can hold.
pub const CODE_STORE_SIZE: usize = 1024;

/// Code base.
pub const CB: Word = 0;
/// Stack base.
pub const SB: Word = 0;
/// Heap base, one past the last data store address.
pub const HB: Word = DATA_STORE_SIZE as Word;
/// Primitive base: call targets at or above this address are primitive routines.
pub const PB: Word = CODE_STORE_SIZE as Word;
/// Primitive top.
pub const PT: Word = PB + 30;

/// Largest representable integer; arithmetic results must lie in `[-MAXINT, MAXINT]`.
pub const MAXINT: Word = 32767;
pub const FALSE_REP: Word = 0;
pub const TRUE_REP: Word = 1;

/// Static link, dynamic link and return address.
pub const LINK_DATA_SIZE: Word = 3;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry lists the operands the instruction reads, in assembly order:
/// - `Count`: `n` written in parentheses, `LOAD(2)`
/// - `Link`: `n` written as a register in parentheses, `CALL(LB)`
/// - `Address`: `d[r]`, `3[LB]`
/// - `Literal`: bare `d`
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Load and store
            // =========================
            /// LOAD(n) d[r] ; push n words copied from d + content(r)
            Load = 0, "LOAD" => [n: Count, d: Address],
            /// LOADA d[r] ; push the address d + content(r)
            LoadA = 1, "LOADA" => [d: Address],
            /// LOADI(n) ; pop an address, push n words copied from it
            LoadI = 2, "LOADI" => [n: Count],
            /// LOADL d ; push the literal d
            LoadL = 3, "LOADL" => [d: Literal],
            /// STORE(n) d[r] ; pop n words to d + content(r)
            Store = 4, "STORE" => [n: Count, d: Address],
            /// STOREI(n) ; pop an address, then pop n words to it
            StoreI = 5, "STOREI" => [n: Count],
            // =========================
            // Routines
            // =========================
            /// CALL(n) d[r] ; call the routine at d + content(r) with static link content(n)
            Call = 6, "CALL" => [n: Link, d: Address],
            /// CALLI ; pop a closure (static link, code address) and call it
            CallI = 7, "CALLI" => [],
            /// RETURN(n) d ; return n result words, discarding d argument words
            Return = 8, "RETURN" => [n: Count, d: Literal],
            // =========================
            // Stack
            // =========================
            /// PUSH d ; grow the stack by d words
            Push = 10, "PUSH" => [d: Literal],
            /// POP(n) d ; discard d words beneath the top n words
            Pop = 11, "POP" => [n: Count, d: Literal],
            // =========================
            // Control flow
            // =========================
            /// JUMP d[r] ; CP = d + content(r)
            Jump = 12, "JUMP" => [d: Address],
            /// JUMPI ; pop an address, CP = it
            JumpI = 13, "JUMPI" => [],
            /// JUMPIF(n) d[r] ; pop a word, jump to d + content(r) if it equals n
            JumpIf = 14, "JUMPIF" => [n: Count, d: Address],
            /// HALT ; stop execution
            Halt = 15, "HALT" => [],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        // =========================
        // Opcode enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<Word> for Opcode {
            type Error = VMError;

            fn try_from(value: Word) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(VMError::InvalidOpcode { opcode: value }),
                }
            }
        }

        impl Opcode {
            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand shapes of this instruction, in assembly order.
            pub const fn operands(&self) -> &'static [OperandKind] {
                match self {
                    $( Opcode::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }
        }
    };
}

/// How an instruction operand is written in assembly.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// `(n)` holding a count or test value.
    Count,
    /// `(REG)` holding the static-link register of a call.
    Link,
    /// `d[REG]`.
    Address,
    /// Bare `d`.
    Literal,
}

for_each_instruction!(define_instructions);

/// Register selectors as they appear in the `r` and `n` fields.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Register {
    CB = 0,
    CT = 1,
    PB = 2,
    PT = 3,
    SB = 4,
    ST = 5,
    HB = 6,
    HT = 7,
    LB = 8,
    L1 = 9,
    L2 = 10,
    L3 = 11,
    L4 = 12,
    L5 = 13,
    L6 = 14,
    CP = 15,
}

const REGISTERS: [Register; 16] = [
    Register::CB,
    Register::CT,
    Register::PB,
    Register::PT,
    Register::SB,
    Register::ST,
    Register::HB,
    Register::HT,
    Register::LB,
    Register::L1,
    Register::L2,
    Register::L3,
    Register::L4,
    Register::L5,
    Register::L6,
    Register::CP,
];

impl Register {
    pub const fn name(&self) -> &'static str {
        match self {
            Register::CB => "CB",
            Register::CT => "CT",
            Register::PB => "PB",
            Register::PT => "PT",
            Register::SB => "SB",
            Register::ST => "ST",
            Register::HB => "HB",
            Register::HT => "HT",
            Register::LB => "LB",
            Register::L1 => "L1",
            Register::L2 => "L2",
            Register::L3 => "L3",
            Register::L4 => "L4",
            Register::L5 => "L5",
            Register::L6 => "L6",
            Register::CP => "CP",
        }
    }

    /// Looks a register up by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Register> {
        REGISTERS
            .iter()
            .copied()
            .find(|reg| reg.name().eq_ignore_ascii_case(name))
    }

    /// Number of static links chased to resolve this register, if it is a level register.
    pub const fn level(&self) -> Option<u32> {
        match self {
            Register::L1 => Some(1),
            Register::L2 => Some(2),
            Register::L3 => Some(3),
            Register::L4 => Some(4),
            Register::L5 => Some(5),
            Register::L6 => Some(6),
            _ => None,
        }
    }
}

impl TryFrom<Word> for Register {
    type Error = VMError;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| REGISTERS.get(idx).copied())
            .ok_or(VMError::InvalidRegister {
                token: value.to_string(),
            })
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One object-program record.
///
/// Fields are kept exactly as loaded; decoding into an [`Opcode`] happens at fetch time,
/// so an unknown opcode only matters if it is executed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Instruction {
    pub op: Word,
    pub r: Word,
    pub n: Word,
    pub d: Word,
}

impl Instruction {
    pub const fn new(op: Opcode, r: Word, n: Word, d: Word) -> Self {
        Self {
            op: op as Word,
            r,
            n,
            d,
        }
    }

    /// Decodes the opcode field.
    pub fn opcode(&self) -> Result<Opcode, VMError> {
        Opcode::try_from(self.op)
    }

    /// The primitive a `CALL` to `d[PB]` invokes, if this is one.
    fn primitive_target(&self) -> Option<Primitive> {
        if self.r == Register::PB as Word {
            Primitive::try_from(self.d).ok()
        } else {
            None
        }
    }
}

/// Writes a register selector, falling back to its number when it names no register.
fn write_register(f: &mut fmt::Formatter<'_>, selector: Word) -> fmt::Result {
    match Register::try_from(selector) {
        Ok(reg) => write!(f, "{reg}"),
        Err(_) => write!(f, "{selector}"),
    }
}

/// Disassembly, in the notation the assembler accepts.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(op) = self.opcode() else {
            return write!(f, "??? {} {} {} {}", self.op, self.r, self.n, self.d);
        };

        if op == Opcode::Call
            && let Some(primitive) = self.primitive_target()
        {
            return write!(f, "CALL {}", primitive.name());
        }

        f.write_str(op.mnemonic())?;
        for kind in op.operands() {
            match kind {
                OperandKind::Count => write!(f, "({})", self.n)?,
                OperandKind::Link => {
                    f.write_str("(")?;
                    write_register(f, self.n)?;
                    f.write_str(")")?;
                }
                OperandKind::Address => {
                    write!(f, " {}[", self.d)?;
                    write_register(f, self.r)?;
                    f.write_str("]")?;
                }
                OperandKind::Literal => write!(f, " {}", self.d)?,
            }
        }
        Ok(())
    }
}
