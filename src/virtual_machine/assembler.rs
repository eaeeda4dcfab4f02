//! TAM assembly parser.
//!
//! Converts textual TAM code into an object [`Program`]. Uses
//! [`for_each_instruction!`](crate::for_each_instruction) to generate the mnemonic
//! lookup and the per-instruction operand parsing, so the assembler always accepts
//! exactly the notation the disassembler prints.
//!
//! # Syntax
//!
//! ```text
//! label:  MNEMONIC(count) operand   ; optional comment
//! ```
//!
//! - One instruction per line; mnemonics are case-insensitive
//! - `label:` names the address of the next instruction and may share its line
//! - `(n)` carries the count of `LOAD`, `STORE`, `RETURN`, `POP`, `JUMPIF`, ... and the
//!   static-link register of `CALL` (`CALL(L1)`, defaults to `SB`)
//! - Address operands are `d[REG]` (`3[LB]`, `-2[LB]`, `loop[CB]`), a bare label or
//!   integer (meaning `[CB]`), or a primitive name (`CALL add` is `CALL(SB) 8[PB]`)
//! - Literal operands are decimal integers, labels or character literals (`'a'`, `'\n'`)
//! - Comments start with `;`

use crate::for_each_instruction;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{CODE_STORE_SIZE, Instruction, OperandKind, Opcode, Register, Word};
use crate::virtual_machine::primitives::Primitive;
use crate::virtual_machine::program::Program;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: u8 = b';';
const QUOTE_CHAR: u8 = b'\'';
const LABEL_SUFFIX: char = ':';

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            source,
        } => Some((*line, *offset, source.clone())),
        VMError::ParseError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.to_string())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
pub fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Emit a helpful diagnostic to stderr for assembly errors.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    if let Some((line, offset, message)) = assembly_error_location(err) {
        eprintln!(
            "{}",
            render_assembly_diagnostic(file, source, line, offset, &message)
        );
    } else {
        eprintln!("error: {err}");
    }
}

/// Attaches a source position to an error that does not have one yet.
fn at(line: usize, offset: usize, err: VMError) -> VMError {
    match err {
        located @ (VMError::AssemblyError { .. } | VMError::ParseError { .. }) => located,
        other => VMError::AssemblyError {
            line,
            offset,
            source: other.to_string(),
        },
    }
}

/// Label table built by the first pass.
pub struct AsmContext {
    /// Label definitions mapping names to code addresses.
    pub(crate) labels: HashMap<String, Word>,
}

impl AsmContext {
    /// Creates an empty assembly context.
    pub fn new() -> Self {
        Self {
            labels: HashMap::new(),
        }
    }

    /// Registers a label at the given code address.
    pub(crate) fn define_label(&mut self, name: &str, addr: Word) -> Result<(), VMError> {
        if self.labels.contains_key(name) {
            return Err(VMError::DuplicateLabel {
                label: name.to_string(),
            });
        }
        self.labels.insert(name.to_string(), addr);
        Ok(())
    }

    /// Resolves a label to its code address.
    pub(crate) fn resolve_label(&self, name: &str) -> Result<Word, VMError> {
        self.labels
            .get(name)
            .copied()
            .ok_or(VMError::UndefinedLabel {
                label: name.to_string(),
            })
    }

    fn has_label(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }
}

impl Default for AsmContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `;` starts a comment
/// - commas and whitespace separate tokens
/// - a quoted character literal is kept whole, even if it holds a separator
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut out = Vec::with_capacity(4);

    let mut start: Option<usize> = None;
    let mut in_quote = false;

    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if in_quote {
            match b {
                b'\\' => i += 2,
                QUOTE_CHAR => {
                    in_quote = false;
                    i += 1;
                }
                _ => i += 1,
            }
            continue;
        }

        match b {
            COMMENT_CHAR => break,
            QUOTE_CHAR => {
                if start.is_none() {
                    start = Some(i);
                }
                in_quote = true;
                i += 1;
            }
            b',' | b' ' | b'\t' | b'\r' => {
                push_token(line, &mut start, i, &mut out);
                i += 1;
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
                i += 1;
            }
        }
    }

    if in_quote {
        return Err(VMError::ParseError {
            line: line_no,
            offset: start.map(|s| s + 1).unwrap_or(1),
            message: "unterminated character literal (missing closing quote)",
        });
    }

    let end = i.min(bytes.len());
    push_token(line, &mut start, end, &mut out);

    Ok(out)
}

fn push_token<'a>(line: &'a str, start: &mut Option<usize>, end: usize, out: &mut Vec<Token<'a>>) {
    if let Some(s) = start.take() {
        out.push(Token {
            text: &line[s..end],
            offset: s + 1,
        });
    }
}

/// Parse a decimal word like `42`, `-7`, `+3`.
pub(crate) fn parse_word(tok: &str) -> Result<Word, VMError> {
    tok.parse::<Word>().map_err(|_| VMError::InvalidOperand {
        token: tok.to_string(),
        expected: "an integer",
    })
}

/// Parse a register name (`LB`, `l1`) or selector number (`8`).
pub(crate) fn parse_register(tok: &str) -> Result<Word, VMError> {
    if let Some(reg) = Register::from_name(tok) {
        return Ok(reg as Word);
    }
    tok.parse::<Word>()
        .ok()
        .and_then(|sel| Register::try_from(sel).ok())
        .map(|reg| reg as Word)
        .ok_or(VMError::InvalidRegister {
            token: tok.to_string(),
        })
}

/// Parse a character literal like `'a'`, `'\n'` or `'\''`.
pub(crate) fn parse_char(tok: &str) -> Result<Word, VMError> {
    let invalid = || VMError::InvalidOperand {
        token: tok.to_string(),
        expected: "a character literal",
    };
    let inner = tok
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .ok_or_else(invalid)?;

    let mut chars = inner.chars();
    let ch = match (chars.next(), chars.next(), chars.next()) {
        (Some('\\'), Some(esc), None) => match esc {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            _ => return Err(invalid()),
        },
        (Some(ch), None, None) => ch,
        _ => return Err(invalid()),
    };
    Ok(ch as Word)
}

/// Whether `tok` can name a label.
fn is_identifier(tok: &str) -> bool {
    let mut chars = tok.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$')
}

/// Checks if a token is a label definition (ends with `:`)
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

/// Operands of one instruction line, consumed in table order.
struct Operands<'a> {
    line: usize,
    head: Token<'a>,
    paren: Option<Token<'a>>,
    args: std::slice::Iter<'a, Token<'a>>,
}

impl<'a> Operands<'a> {
    /// Splits `MNEMONIC(x) arg` into its parts and checks them against the opcode's shape.
    fn new(line: usize, op: Opcode, tokens: &'a [Token<'a>]) -> Result<Self, VMError> {
        let first = tokens[0];
        let (head, paren, args) = match first.text.find('(') {
            Some(open) => {
                let inner = &first.text[open + 1..];
                let paren = Token {
                    text: inner,
                    offset: first.offset + open + 1,
                };
                let head = Token {
                    text: &first.text[..open],
                    offset: first.offset,
                };
                (head, Some(paren), &tokens[1..])
            }
            None => match tokens.get(1) {
                Some(next) if next.text.starts_with('(') => {
                    let paren = Token {
                        text: &next.text[1..],
                        offset: next.offset + 1,
                    };
                    (first, Some(paren), &tokens[2..])
                }
                _ => (first, None, &tokens[1..]),
            },
        };

        let paren = match paren {
            Some(tok) => {
                let inner = tok.text.strip_suffix(')').ok_or_else(|| {
                    at(
                        line,
                        tok.offset,
                        VMError::InvalidOperand {
                            token: tok.text.to_string(),
                            expected: "a closing parenthesis",
                        },
                    )
                })?;
                Some(Token {
                    text: inner.trim(),
                    offset: tok.offset,
                })
            }
            None => None,
        };

        let kinds = op.operands();
        let takes_paren = kinds
            .iter()
            .any(|k| matches!(k, OperandKind::Count | OperandKind::Link));
        if let Some(tok) = paren
            && !takes_paren
        {
            return Err(at(
                line,
                tok.offset,
                VMError::InvalidOperand {
                    token: format!("({})", tok.text),
                    expected: "no parenthesised operand",
                },
            ));
        }

        let expected = kinds
            .iter()
            .filter(|k| matches!(k, OperandKind::Address | OperandKind::Literal))
            .count();
        if args.len() != expected {
            let offset = args.get(expected).map(|t| t.offset).unwrap_or(head.offset);
            return Err(at(
                line,
                offset,
                VMError::ArityMismatch {
                    instruction: op.mnemonic().to_string(),
                    expected,
                    actual: args.len(),
                },
            ));
        }

        Ok(Self {
            line,
            head,
            paren,
            args: args.iter(),
        })
    }

    fn err(&self, offset: usize, err: VMError) -> VMError {
        at(self.line, offset, err)
    }

    /// `(n)`: required.
    fn count(&mut self) -> Result<Word, VMError> {
        let tok = self.paren.ok_or_else(|| {
            self.err(
                self.head.offset,
                VMError::InvalidOperand {
                    token: self.head.text.to_string(),
                    expected: "a count in parentheses, e.g. LOAD(1)",
                },
            )
        })?;
        parse_word(tok.text).map_err(|e| self.err(tok.offset, e))
    }

    /// `(REG)`: defaults to `SB`.
    fn link(&mut self) -> Result<Word, VMError> {
        match self.paren {
            Some(tok) => parse_register(tok.text).map_err(|e| self.err(tok.offset, e)),
            None => Ok(Register::SB as Word),
        }
    }

    fn next_arg(&mut self) -> Result<Token<'a>, VMError> {
        // Arity was checked in `new`.
        self.args.next().copied().ok_or_else(|| {
            self.err(
                self.head.offset,
                VMError::ArityMismatch {
                    instruction: self.head.text.to_string(),
                    expected: 1,
                    actual: 0,
                },
            )
        })
    }

    /// `d[REG]`, a bare label or integer (`[CB]`), or a primitive name (`[PB]`).
    fn address(&mut self, ctx: &AsmContext) -> Result<(Word, Word), VMError> {
        let tok = self.next_arg()?;
        let text = tok.text;

        let resolved = if let Some(open) = text.find('[') {
            let reg_text = text[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| VMError::InvalidOperand {
                    token: text.to_string(),
                    expected: "an address like 3[LB]",
                });
            reg_text.and_then(|reg_text| {
                let r = parse_register(reg_text.trim())?;
                let disp = &text[..open];
                let d = if disp.is_empty() {
                    0
                } else if r == Register::PB as Word && is_identifier(disp) && !ctx.has_label(disp) {
                    Primitive::from_name(&disp.to_ascii_lowercase())
                        .map(|p| p.displacement())
                        .ok_or(VMError::UnknownPrimitive {
                            name: disp.to_string(),
                        })?
                } else {
                    word_or_label(disp, ctx)?
                };
                Ok((r, d))
            })
        } else if let Ok(d) = text.parse::<Word>() {
            Ok((Register::CB as Word, d))
        } else if ctx.has_label(text) {
            ctx.resolve_label(text).map(|d| (Register::CB as Word, d))
        } else if let Some(primitive) = Primitive::from_name(&text.to_ascii_lowercase()) {
            Ok((Register::PB as Word, primitive.displacement()))
        } else if is_identifier(text) {
            Err(VMError::UndefinedLabel {
                label: text.to_string(),
            })
        } else {
            Err(VMError::InvalidOperand {
                token: text.to_string(),
                expected: "an address like 3[LB], a label or a primitive name",
            })
        };

        resolved.map_err(|e| self.err(tok.offset, e))
    }

    /// Integer, character literal or label.
    fn literal(&mut self, ctx: &AsmContext) -> Result<Word, VMError> {
        let tok = self.next_arg()?;
        let value = if tok.text.starts_with('\'') {
            parse_char(tok.text)
        } else {
            word_or_label(tok.text, ctx)
        };
        value.map_err(|e| self.err(tok.offset, e))
    }
}

fn word_or_label(tok: &str, ctx: &AsmContext) -> Result<Word, VMError> {
    if let Ok(v) = tok.parse::<Word>() {
        return Ok(v);
    }
    if is_identifier(tok) {
        return ctx.resolve_label(tok);
    }
    Err(VMError::InvalidOperand {
        token: tok.to_string(),
        expected: "an integer or a label",
    })
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        fn opcode_from_str(name: &str) -> Result<Opcode, VMError> {
            match name.to_ascii_uppercase().as_str() {
                $( $mnemonic => Ok(Opcode::$name), )*
                _ => Err(VMError::InvalidInstructionName {
                    name: name.to_string(),
                }),
            }
        }

        /// Parse one instruction line (labels already stripped) into a record.
        fn parse_instruction(
            ctx: &AsmContext,
            line: usize,
            tokens: &[Token],
        ) -> Result<Instruction, VMError> {
            let Some(first) = tokens.first() else {
                return Err(VMError::ArityMismatch {
                    instruction: "<missing opcode>".to_string(),
                    expected: 1,
                    actual: 0,
                });
            };

            let name = first.text.split('(').next().unwrap_or(first.text);
            let op = opcode_from_str(name).map_err(|e| at(line, first.offset, e))?;
            let mut operands = Operands::new(line, op, tokens)?;
            let mut instr = Instruction::new(op, 0, 0, 0);

            match op {
                $(
                    Opcode::$name => {
                        $(
                            define_parse_instruction!(@parse_operand $kind, instr, operands, ctx);
                        )*
                    }
                )*
            }

            Ok(instr)
        }
    };

    (@parse_operand Count, $instr:ident, $ops:ident, $ctx:ident) => {
        $instr.n = $ops.count()?;
    };

    (@parse_operand Link, $instr:ident, $ops:ident, $ctx:ident) => {
        $instr.n = $ops.link()?;
    };

    (@parse_operand Address, $instr:ident, $ops:ident, $ctx:ident) => {{
        let (r, d) = $ops.address($ctx)?;
        $instr.r = r;
        $instr.d = d;
    }};

    (@parse_operand Literal, $instr:ident, $ops:ident, $ctx:ident) => {
        $instr.d = $ops.literal($ctx)?;
    };
}

for_each_instruction!(define_parse_instruction);

/// Performs two-pass assembly.
///
/// Pass 1: Tokenizes all lines and records label addresses (instruction indexes).
///
/// Pass 2: Parses instructions with label resolution.
fn assemble_lines(source: &str) -> Result<Program, VMError> {
    let mut ctx = AsmContext::new();
    let mut lines: Vec<(usize, Vec<Token>)> = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let mut tokens = tokenize(line_no, line)?;

        let mut start = 0;
        while start < tokens.len() && is_label_def(tokens[start].text) {
            let tok = tokens[start];
            let name = label_name(tok.text);
            if !is_identifier(name) {
                return Err(at(
                    line_no,
                    tok.offset,
                    VMError::InvalidOperand {
                        token: name.to_string(),
                        expected: "a label name",
                    },
                ));
            }
            ctx.define_label(name, lines.len() as Word)
                .map_err(|e| at(line_no, tok.offset, e))?;
            start += 1;
        }

        if start < tokens.len() {
            if lines.len() == CODE_STORE_SIZE {
                return Err(at(
                    line_no,
                    tokens[start].offset,
                    VMError::CodeStoreFull {
                        limit: CODE_STORE_SIZE,
                    },
                ));
            }
            lines.push((line_no, tokens.split_off(start)));
        }
    }

    let mut instructions = Vec::with_capacity(lines.len());
    for (line_no, tokens) in &lines {
        instructions.push(parse_instruction(&ctx, *line_no, tokens)?);
    }

    Ok(Program::new(instructions))
}

/// Assemble a full source string into an object program.
///
/// Labels may be used before they are defined.
pub fn assemble_source(source: impl AsRef<str>) -> Result<Program, VMError> {
    assemble_source_with_name(source.as_ref(), "<source>")
}

/// Assembles source with an associated filename for error diagnostics.
///
/// Logs a compiler-style diagnostic to stderr on failure.
fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Program, VMError> {
    let result = assemble_lines(source);
    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: path_ref.display().to_string(),
        source: e,
    })?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}

/// Renders a program back into assembly, one `address: instruction` line each.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    for (addr, instr) in program.instructions.iter().enumerate() {
        let _ = writeln!(out, "{addr}: {instr}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(source: &str) -> Instruction {
        assemble_source(source).unwrap().instructions[0]
    }

    #[test]
    fn assemble_empty_source() {
        assert!(assemble_source("").unwrap().is_empty());
    }

    #[test]
    fn assemble_comments_and_blank_lines() {
        let source = "
            ; this is a comment

            ; another comment
        ";
        assert!(assemble_source(source).unwrap().is_empty());
    }

    #[test]
    fn assemble_inline_comment() {
        let program = assemble_source("LOADL 42 ; push the answer").unwrap();
        assert_eq!(program.instructions, vec![Instruction::new(Opcode::LoadL, 0, 0, 42)]);
    }

    #[test]
    fn assemble_address_operands() {
        assert_eq!(
            first("LOAD(1) 3[LB]"),
            Instruction::new(Opcode::Load, Register::LB as Word, 1, 3)
        );
        assert_eq!(
            first("STORE(2) -4[LB]"),
            Instruction::new(Opcode::Store, Register::LB as Word, 2, -4)
        );
        assert_eq!(
            first("loada 0[sb]"),
            Instruction::new(Opcode::LoadA, Register::SB as Word, 0, 0)
        );
        assert_eq!(
            first("JUMP 7"),
            Instruction::new(Opcode::Jump, Register::CB as Word, 0, 7)
        );
        assert_eq!(
            first("LOAD(1) 2[8]"),
            Instruction::new(Opcode::Load, Register::LB as Word, 1, 2)
        );
    }

    #[test]
    fn assemble_count_with_space() {
        assert_eq!(
            first("LOAD (1) 3[LB]"),
            Instruction::new(Opcode::Load, Register::LB as Word, 1, 3)
        );
    }

    #[test]
    fn assemble_call_forms() {
        assert_eq!(
            first("CALL add"),
            Instruction::new(Opcode::Call, Register::PB as Word, Register::SB as Word, 8)
        );
        assert_eq!(
            first("CALL(L1) 0[CB]"),
            Instruction::new(Opcode::Call, Register::CB as Word, Register::L1 as Word, 0)
        );
        assert_eq!(
            first("CALL putint"),
            Instruction::new(Opcode::Call, Register::PB as Word, Register::SB as Word, 26)
        );
    }

    #[test]
    fn assemble_named_primitive_displacement() {
        assert_eq!(
            first("CALL(SB) mult[PB]"),
            Instruction::new(Opcode::Call, Register::PB as Word, Register::SB as Word, 10)
        );
        let err = assemble_source("CALL(SB) frob[PB]").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { ref source, .. } if source.contains("unknown primitive 'frob'")
        ));
    }

    #[test]
    fn assemble_literals() {
        assert_eq!(first("LOADL 'a'").d, 97);
        assert_eq!(first("LOADL '\\n'").d, 10);
        assert_eq!(first("LOADL ' '").d, 32);
        assert_eq!(first("LOADL ';'").d, 59);
        assert_eq!(first("LOADL -32767").d, -32767);
        assert_eq!(
            first("RETURN(1) 2"),
            Instruction::new(Opcode::Return, 0, 1, 2)
        );
        assert_eq!(first("POP(0) 3"), Instruction::new(Opcode::Pop, 0, 0, 3));
    }

    #[test]
    fn assemble_labels() {
        let source = "
                JUMP start
            double: LOAD(1) -1[LB]
                LOADL 2
                CALL mult
                RETURN(1) 1
            start:
                LOADL 21
                CALL(SB) double
                HALT
        ";
        let program = assemble_source(source).unwrap();
        assert_eq!(program.len(), 8);
        assert_eq!(program.instructions[0], Instruction::new(Opcode::Jump, 0, 0, 5));
        assert_eq!(
            program.instructions[6],
            Instruction::new(Opcode::Call, 0, Register::SB as Word, 1)
        );
    }

    #[test]
    fn assemble_label_as_literal() {
        let program = assemble_source("LOADA 0[SB]\nLOADL target\ntarget: HALT").unwrap();
        assert_eq!(program.instructions[1].d, 2);
    }

    #[test]
    fn assemble_invalid_instruction() {
        let err = assemble_source("FROB 3").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 1, offset: 1, ref source } if source.contains("unknown instruction")
        ));
    }

    #[test]
    fn assemble_wrong_arity() {
        let err = assemble_source("HALT 3").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 1, offset: 6, ref source } if source.contains("operand count mismatch")
        ));

        let err = assemble_source("\nLOADL").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 2, .. }));
    }

    #[test]
    fn assemble_missing_count() {
        let err = assemble_source("LOAD 3[LB]").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { ref source, .. } if source.contains("count in parentheses")
        ));
    }

    #[test]
    fn assemble_unexpected_count() {
        assert!(assemble_source("LOADL(1) 3").is_err());
    }

    #[test]
    fn assemble_bad_register() {
        let err = assemble_source("LOAD(1) 3[XX]").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { offset: 9, ref source, .. } if source.contains("invalid register")
        ));
        assert!(assemble_source("CALL(Q) 0[CB]").is_err());
    }

    #[test]
    fn assemble_duplicate_label() {
        let err = assemble_source("a: HALT\na: HALT").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 2, ref source, .. } if source.contains("duplicate label")
        ));
    }

    #[test]
    fn assemble_undefined_label() {
        let err = assemble_source("JUMP nowhere").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 1, offset: 6, ref source } if source.contains("undefined label")
        ));
    }

    #[test]
    fn assemble_unterminated_char() {
        assert!(matches!(
            assemble_source("LOADL 'a").unwrap_err(),
            VMError::ParseError { line: 1, offset: 7, .. }
        ));
    }

    #[test]
    fn tokenize_splits_and_strips_comments() {
        let tokens = tokenize(1, "  LOAD(1)  3[LB], ; tail").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["LOAD(1)", "3[LB]"]);
        assert_eq!(tokens[0].offset, 3);
        assert_eq!(tokens[1].offset, 12);
    }

    #[test]
    fn parse_char_escapes() {
        assert_eq!(parse_char("'\\''").unwrap(), 39);
        assert_eq!(parse_char("'\\\\'").unwrap(), 92);
        assert!(parse_char("'ab'").is_err());
        assert!(parse_char("''").is_err());
    }

    #[test]
    fn opcode_from_str_ignores_case() {
        assert_eq!(opcode_from_str("jumpif").unwrap(), Opcode::JumpIf);
        assert_eq!(opcode_from_str("Halt").unwrap(), Opcode::Halt);
        assert!(matches!(
            opcode_from_str("ADDI"),
            Err(VMError::InvalidInstructionName { .. })
        ));
    }

    #[test]
    fn disassembly_reassembles() {
        let source = "
            LOADL 5
            CALL(LB) 4[CB]
            CALL succ
            JUMPIF(0) 1[CB]
            STOREI(2)
            HALT
        ";
        let program = assemble_source(source).unwrap();
        let text = disassemble(&program);
        assert!(text.starts_with("0: LOADL 5\n1: CALL(LB) 4[CB]\n2: CALL succ\n"));

        let stripped: String = text
            .lines()
            .map(|l| l.split_once(": ").map(|(_, i)| i).unwrap_or(l))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(assemble_source(stripped).unwrap(), program);
    }

    #[test]
    fn diagnostic_points_at_column() {
        let diag = render_assembly_diagnostic("prog.tasm", "LOADL 1\nJUMP nowhere", 2, 6, "undefined label");
        assert!(diag.contains("error: undefined label"));
        assert!(diag.contains(" --> prog.tasm:2:6"));
        assert!(diag.contains("   2 | JUMP nowhere"));
        assert!(diag.contains("  |      ^"));
    }
}
