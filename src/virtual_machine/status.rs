//! Machine status and the post-mortem report.
//!
//! A running program ends either by executing `HALT` or with a [`Fault`]. The report
//! printed afterwards names the outcome and, for anything but a normal halt, draws the
//! data store: the heap from `HB - 1` down to `HT`, then the stack from `ST - 1` down
//! to `SB` with every frame's link words annotated.

use crate::virtual_machine::isa::{HB, SB, Word};
use crate::virtual_machine::vm::{DataStore, Registers};
use std::fmt::{self, Write};

/// Reasons a program stops abnormally.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Fault {
    /// The stack would have grown into the heap, or an access fell outside the store.
    StoreExhausted,
    /// The code pointer left the loaded program.
    InvalidCodeAddress,
    /// Unknown opcode, static-link register or primitive, or a negative count.
    InvalidInstruction,
    /// An arithmetic result fell outside `[-MAXINT, MAXINT]`.
    Overflow,
    ZeroDivide,
    /// Reading or writing the console failed.
    IoError,
    /// `indexcheck` rejected its operands.
    IndexOutOfBounds,
}

impl Fault {
    pub const fn describe(&self) -> &'static str {
        match self {
            Fault::StoreExhausted => "Program has failed due to exhaustion of Data Store.",
            Fault::InvalidCodeAddress => "Program has failed due to an invalid code address.",
            Fault::InvalidInstruction => "Program has failed due to an invalid instruction.",
            Fault::Overflow => "Program has failed due to overflow.",
            Fault::ZeroDivide => "Program has failed due to division by zero.",
            Fault::IoError => "Program has failed due to an IO error.",
            Fault::IndexOutOfBounds => "Program has failed due to an Index Out of Bounds",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Machine status. Execution continues only while `Running`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Status {
    Running,
    Halted,
    Failed(Fault),
}

impl Status {
    pub const fn describe(&self) -> &'static str {
        match self {
            Status::Running => "Program is running.",
            Status::Halted => "Program has halted normally.",
            Status::Failed(fault) => fault.describe(),
        }
    }

    pub const fn is_running(&self) -> bool {
        matches!(self, Status::Running)
    }

    pub const fn fault(&self) -> Option<Fault> {
        match self {
            Status::Failed(fault) => Some(*fault),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

impl From<Fault> for Status {
    fn from(fault: Fault) -> Self {
        Status::Failed(fault)
    }
}

const BORDER: &str = "            |--------|";
const HATCH: &str = "            |////////|";
const LEVEL_LABELS: [&str; 7] = [" LB-->", " L1-->", " L2-->", " L3-->", " L4-->", " L5-->", " L6-->"];

/// Writes the status line, followed by a store dump unless the program halted normally.
pub fn write_report<W: Write>(
    out: &mut W,
    status: Status,
    store: &DataStore,
    registers: &Registers,
) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "{status}")?;
    if status != Status::Halted {
        write_dump(out, store, registers)?;
    }
    Ok(())
}

/// Renders [`write_report`] into a string.
pub fn report(status: Status, store: &DataStore, registers: &Registers) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, status, store, registers);
    out
}

/// Draws the heap and the stack, labelling frames found by walking the links.
pub fn write_dump<W: Write>(out: &mut W, store: &DataStore, registers: &Registers) -> fmt::Result {
    let word = |addr: Word| store.get(addr).unwrap_or(0);

    writeln!(out)?;
    writeln!(out, "State of data store and registers:")?;
    writeln!(out)?;

    if registers.ht == HB {
        writeln!(out, "{BORDER}          (heap is empty)")?;
    } else {
        writeln!(out, "       HB-->")?;
        writeln!(out, "{BORDER}")?;
        for addr in (registers.ht..HB).rev() {
            let marker = if addr == registers.ht { " HT-->" } else { "      " };
            writeln!(out, "{addr}:{marker}|{}|", word(addr))?;
        }
        writeln!(out, "{BORDER}")?;
    }

    writeln!(out, "{HATCH}")?;
    writeln!(out, "{HATCH}")?;

    if registers.st == SB {
        writeln!(out, "{BORDER}          (stack is empty)")?;
    } else {
        let mut dynamic_link = registers.lb;
        let mut static_link = registers.lb;
        let mut level = 0usize;

        writeln!(out, "      ST--> |////////|")?;
        writeln!(out, "{BORDER}")?;
        for addr in (SB..registers.st).rev() {
            let marker = if addr == SB {
                " SB-->"
            } else if addr == static_link {
                let label = LEVEL_LABELS.get(level).copied().unwrap_or("      ");
                static_link = word(addr);
                level += 1;
                label
            } else {
                "      "
            };

            let value = word(addr);
            let link_slot = if dynamic_link != SB {
                i64::from(addr) - i64::from(dynamic_link)
            } else {
                -1
            };
            match link_slot {
                0 => writeln!(out, "{addr}:{marker}|SL={value}|")?,
                1 => writeln!(out, "{addr}:{marker}|DL={value}|")?,
                2 => writeln!(out, "{addr}:{marker}|RA={value}|")?,
                _ => writeln!(out, "{addr}:{marker}|{value}|")?,
            }

            if addr == dynamic_link {
                writeln!(out, "{BORDER}")?;
                dynamic_link = word(addr + 1);
            }
        }
    }

    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_messages() {
        assert_eq!(Status::Running.describe(), "Program is running.");
        assert_eq!(Status::Halted.to_string(), "Program has halted normally.");
        assert_eq!(
            Status::Failed(Fault::StoreExhausted).to_string(),
            "Program has failed due to exhaustion of Data Store."
        );
        assert_eq!(
            Status::from(Fault::IndexOutOfBounds).describe(),
            "Program has failed due to an Index Out of Bounds"
        );
        assert_eq!(Status::Failed(Fault::ZeroDivide).fault(), Some(Fault::ZeroDivide));
        assert_eq!(Status::Halted.fault(), None);
        assert!(Status::Running.is_running());
    }
}
