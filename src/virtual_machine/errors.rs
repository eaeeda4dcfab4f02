use std::io;
use tam_derive::Error;

/// Errors raised by the object loader, the assembler and the command-line tools.
///
/// Faults of a running program are not errors; see [`Fault`](super::status::Fault).
#[derive(Debug, Error)]
pub enum VMError {
    /// Opcode field that names no instruction.
    #[error("invalid opcode {opcode}")]
    InvalidOpcode { opcode: i32 },
    /// Unrecognized instruction mnemonic during assembly.
    #[error("unknown instruction '{name}'")]
    InvalidInstructionName { name: String },
    /// Wrong number of operands for an instruction.
    #[error("operand count mismatch: {instruction} expects {expected}, got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Register name or selector that names no register.
    #[error("invalid register '{token}'")]
    InvalidRegister { token: String },
    /// Operand that does not have the shape the instruction expects.
    #[error("invalid operand '{token}': expected {expected}")]
    InvalidOperand {
        token: String,
        expected: &'static str,
    },
    /// `CALL name` with a name that is not a primitive routine.
    #[error("unknown primitive '{name}'")]
    UnknownPrimitive { name: String },
    /// Label defined more than once.
    #[error("duplicate label '{label}'")]
    DuplicateLabel { label: String },
    /// Reference to undefined label.
    #[error("undefined label '{label}'")]
    UndefinedLabel { label: String },
    /// Malformed token, reported before operands are interpreted.
    #[error("{message}")]
    ParseError {
        line: usize,
        offset: usize,
        message: &'static str,
    },
    /// Assembly error with line and column context.
    #[error("line {line}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// Object program larger than the code store.
    #[error("object program does not fit in the code store ({limit} instructions)")]
    CodeStoreFull { limit: usize },
    /// Opening or reading a file failed.
    #[error("{path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Stream-level I/O failure without a file name.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_errors_expose_their_cause() {
        let err = VMError::IoError {
            path: "obj.tam".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.to_string(), "obj.tam: no such file");
        let cause = err.source().expect("missing source");
        assert_eq!(cause.to_string(), "no such file");

        let err = VMError::from(io::Error::other("truncated"));
        assert!(err.source().is_some());
    }

    #[test]
    fn assembler_errors_have_no_cause() {
        let err = VMError::UndefinedLabel {
            label: "loop".to_string(),
        };
        assert_eq!(err.to_string(), "undefined label 'loop'");
        assert!(err.source().is_none());
    }
}
