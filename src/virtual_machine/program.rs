//! Object program representation and serialization.
//!
//! An object file is a bare sequence of instruction records, each four big-endian
//! 32-bit signed integers in the order `op r n d`. There is no header and no count:
//! the program ends at the end of the stream, and a partial trailing record is
//! ignored.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{CODE_STORE_SIZE, Instruction, Word};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

/// Bytes per instruction record.
pub const RECORD_SIZE: usize = 16;

/// Object program: the instructions to place in the code store, starting at `CB`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Serializes the program to the object file format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.instructions.len() * RECORD_SIZE);
        for instr in &self.instructions {
            for word in [instr.op, instr.r, instr.n, instr.d] {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        out
    }

    /// Decodes a program from its object file representation.
    ///
    /// Trailing bytes that do not make up a whole record are ignored.
    pub fn from_bytes(input: &[u8]) -> Result<Self, VMError> {
        Self::read_from(input)
    }

    /// Reads records until the stream ends.
    ///
    /// Fails with [`VMError::CodeStoreFull`] if the stream holds more records than
    /// the code store.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, VMError> {
        let mut instructions = Vec::new();
        let mut record = [0u8; RECORD_SIZE];

        while read_record(&mut reader, &mut record)? {
            if instructions.len() == CODE_STORE_SIZE {
                return Err(VMError::CodeStoreFull {
                    limit: CODE_STORE_SIZE,
                });
            }
            instructions.push(decode_record(&record));
        }

        Ok(Self { instructions })
    }

    /// Writes the program in object file format.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), VMError> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// Fills `record`, returning `false` at a clean or partial end of stream.
fn read_record<R: Read>(reader: &mut R, record: &mut [u8; RECORD_SIZE]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < RECORD_SIZE {
        match reader.read(&mut record[filled..]) {
            Ok(0) => return Ok(false),
            Ok(read) => filled += read,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn decode_record(record: &[u8; RECORD_SIZE]) -> Instruction {
    let word = |i: usize| {
        Word::from_be_bytes([
            record[i * 4],
            record[i * 4 + 1],
            record[i * 4 + 2],
            record[i * 4 + 3],
        ])
    };
    Instruction {
        op: word(0),
        r: word(1),
        n: word(2),
        d: word(3),
    }
}

/// Loads an object program from a file.
pub fn load_object_file<P: AsRef<Path>>(path: P) -> Result<Program, VMError> {
    let path = path.as_ref();
    let with_path = |source: io::Error| VMError::IoError {
        path: path.display().to_string(),
        source,
    };

    let file = File::open(path).map_err(with_path)?;
    match Program::read_from(BufReader::new(file)) {
        Err(VMError::Io(source)) => Err(with_path(source)),
        other => other,
    }
}

/// Writes an object program to a file, replacing any previous content.
pub fn write_object_file<P: AsRef<Path>>(path: P, program: &Program) -> Result<(), VMError> {
    let path = path.as_ref();
    let with_path = |source: io::Error| VMError::IoError {
        path: path.display().to_string(),
        source,
    };

    let file = File::create(path).map_err(with_path)?;
    match program.write_to(BufWriter::new(file)) {
        Err(VMError::Io(source)) => Err(with_path(source)),
        other => other,
    }
}
