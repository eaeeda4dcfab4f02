//! Fetch-execute dispatcher.
//!
//! [`Machine`] owns the code store, the data store, the registers and the console. Each
//! [`step`](Machine::step) fetches the instruction at `CP`, decodes its opcode and runs the
//! matching handler. Handlers return `Result<(), Fault>`; an `Err` becomes the terminal
//! status and nothing else is executed.
//!
//! Handlers check every address before writing, so a store fault never leaves a
//! partially written block behind.

mod console;
mod registers;
mod store;

pub use console::{BufferConsole, Console, StdConsole};
pub use registers::Registers;
pub use store::DataStore;

use crate::debug;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{
    CB, CODE_STORE_SIZE, FALSE_REP, Instruction, LINK_DATA_SIZE, MAXINT, Opcode, PB, Register,
    SB, TRUE_REP, Word,
};
use crate::virtual_machine::primitives::Primitive;
use crate::virtual_machine::program::{Program, load_object_file};
use crate::virtual_machine::status::{self, Fault, Status};
use std::path::Path;

/// Value of the last character read before any input, and after end of input.
const NO_CHAR: Word = 0;
const END_OF_INPUT: Word = -1;

macro_rules! exec_vm {
    (
        vm = $vm:ident,
        op = $op:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident ),* ) ),* $(,)? }
    ) => {{
        match $op {
            $(
                Opcode::$variant => $vm.$handler( $( $instr.$field ),* ),
            )*
        }
    }};
}

fn to_word(b: bool) -> Word {
    if b { TRUE_REP } else { FALSE_REP }
}

fn is_true(w: Word) -> bool {
    w == TRUE_REP
}

/// Narrows an exact result to a word, failing outside `[-MAXINT, MAXINT]`.
fn overflow_checked(value: i64) -> Result<Word, Fault> {
    if (-i64::from(MAXINT)..=i64::from(MAXINT)).contains(&value) {
        Ok(value as Word)
    } else {
        Err(Fault::Overflow)
    }
}

/// Instruction counts and sizes must not be negative.
fn count(n: Word) -> Result<Word, Fault> {
    if n < 0 {
        Err(Fault::InvalidInstruction)
    } else {
        Ok(n)
    }
}

/// Whitespace as skipped by `getint`.
fn is_space(c: Word) -> bool {
    matches!(c, 0x09..=0x0D | 0x1C..=0x20)
}

fn is_digit(c: Word) -> bool {
    (Word::from(b'0')..=Word::from(b'9')).contains(&c)
}

/// The Triangle Abstract Machine.
pub struct Machine<C: Console = StdConsole> {
    code: Vec<Instruction>,
    store: DataStore,
    registers: Registers,
    status: Status,
    /// Last character read by an input primitive, `-1` after end of input.
    current_char: Word,
    console: C,
    trace: bool,
}

impl Machine<StdConsole> {
    /// Creates a machine wired to standard input and output.
    pub fn with_std_console() -> Self {
        Self::new(StdConsole::new())
    }
}

impl<C: Console> Machine<C> {
    /// Creates a machine with an empty code store.
    pub fn new(console: C) -> Self {
        Self {
            code: Vec::new(),
            store: DataStore::new(),
            registers: Registers::new(CB),
            status: Status::Running,
            current_char: NO_CHAR,
            console,
            trace: false,
        }
    }

    /// Logs every fetched instruction at debug level.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Places `program` in the code store and resets the machine.
    pub fn load(&mut self, program: Program) -> Result<(), VMError> {
        if program.len() > CODE_STORE_SIZE {
            self.unload();
            return Err(VMError::CodeStoreFull {
                limit: CODE_STORE_SIZE,
            });
        }
        self.code = program.instructions;
        self.reset();
        Ok(())
    }

    /// Loads an object file. On failure the code store is left empty (`CT == CB`).
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), VMError> {
        match load_object_file(path) {
            Ok(program) => self.load(program),
            Err(e) => {
                self.unload();
                Err(e)
            }
        }
    }

    fn unload(&mut self) {
        self.code.clear();
        self.reset();
    }

    /// Whether a program is loaded, i.e. `CT != CB`.
    pub fn is_loaded(&self) -> bool {
        self.registers.ct != CB
    }

    /// Puts the registers in their start state: empty stack and heap, `CP = CB`, running.
    pub fn reset(&mut self) {
        self.store = DataStore::new();
        self.registers = Registers::new(self.code.len() as Word);
        self.status = Status::Running;
        self.current_char = NO_CHAR;
    }

    /// Runs the loaded program from the start until it halts or faults.
    ///
    /// With nothing loaded (`CT == CB`) no instruction is executed and the status stays
    /// `Running`.
    pub fn run(&mut self) -> Status {
        self.reset();
        if !self.is_loaded() {
            return self.status;
        }
        while self.step().is_running() {}
        if self.console.flush().is_err() && self.status == Status::Halted {
            self.status = Status::Failed(Fault::IoError);
        }
        self.status
    }

    /// Executes one fetch-execute cycle and returns the resulting status.
    ///
    /// Does nothing once the machine has stopped.
    pub fn step(&mut self) -> Status {
        if !self.status.is_running() {
            return self.status;
        }

        if let Err(fault) = self.execute() {
            self.status = Status::Failed(fault);
        }

        // The first fault wins over a code pointer left out of range.
        if self.status.is_running() && !self.registers.in_code(self.registers.cp) {
            self.status = Status::Failed(Fault::InvalidCodeAddress);
        }

        self.status
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    /// Current value of a register, resolving `L1`..`L6` through the static links.
    pub fn content(&self, selector: Word) -> Result<Word, Fault> {
        self.registers.content(selector, &self.store)
    }

    /// The words currently on the stack, bottom first.
    pub fn stack(&self) -> &[Word] {
        self.store.words(SB..self.registers.st)
    }

    /// Status line plus, unless halted normally, the store dump.
    pub fn report(&self) -> String {
        status::report(self.status, &self.store, &self.registers)
    }

    fn fetch(&self) -> Result<Instruction, Fault> {
        let cp = self.registers.cp;
        if !self.registers.in_code(cp) {
            return Err(Fault::InvalidCodeAddress);
        }
        usize::try_from(cp)
            .ok()
            .and_then(|idx| self.code.get(idx).copied())
            .ok_or(Fault::InvalidCodeAddress)
    }

    fn execute(&mut self) -> Result<(), Fault> {
        let instr = self.fetch()?;
        if self.trace {
            debug!("{:>4}: {}", self.registers.cp, instr);
        }
        let op = instr.opcode().map_err(|_| Fault::InvalidInstruction)?;

        exec_vm! {
            vm = self,
            op = op,
            instr = instr,
            {
                Load => op_load(n, r, d),
                LoadA => op_loada(r, d),
                LoadI => op_loadi(n),
                LoadL => op_loadl(d),
                Store => op_store(n, r, d),
                StoreI => op_storei(n),
                Call => op_call(n, r, d),
                CallI => op_calli(),
                Return => op_return(n, d),
                Push => op_push(d),
                Pop => op_pop(n, d),
                Jump => op_jump(r, d),
                JumpI => op_jumpi(),
                JumpIf => op_jumpif(n, r, d),
                Halt => op_halt(),
            }
        }
    }

    // ==================== Stack helpers ====================

    /// Fails unless the stack can grow by `needed` words without meeting the heap.
    fn check_space(&self, needed: Word) -> Result<(), Fault> {
        let free = i64::from(self.registers.ht) - i64::from(self.registers.st);
        if free < i64::from(needed) {
            Err(Fault::StoreExhausted)
        } else {
            Ok(())
        }
    }

    /// Address of the word `depth` below the stack top (depth 1 is the top word).
    fn slot(&self, depth: Word) -> Result<Word, Fault> {
        let addr = i64::from(self.registers.st) - i64::from(depth);
        if addr < i64::from(SB) {
            Err(Fault::StoreExhausted)
        } else {
            Ok(addr as Word)
        }
    }

    fn peek(&self, depth: Word) -> Result<Word, Fault> {
        self.store.read(self.slot(depth)?)
    }

    fn push(&mut self, value: Word) -> Result<(), Fault> {
        self.check_space(1)?;
        self.store.write(self.registers.st, value)?;
        self.registers.st += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Word, Fault> {
        let value = self.peek(1)?;
        self.registers.st -= 1;
        Ok(value)
    }

    fn address(&self, r: Word, d: Word) -> Result<Word, Fault> {
        Ok(d.wrapping_add(self.content(r)?))
    }

    fn advance(&mut self) -> Result<(), Fault> {
        self.registers.cp += 1;
        Ok(())
    }

    // ==================== Load and store ====================

    fn op_load(&mut self, n: Word, r: Word, d: Word) -> Result<(), Fault> {
        let n = count(n)?;
        let addr = self.address(r, d)?;
        self.check_space(n)?;
        let words = self.store.read_block(addr, n)?;
        self.store.write_block(self.registers.st, &words)?;
        self.registers.st += n;
        self.advance()
    }

    fn op_loada(&mut self, r: Word, d: Word) -> Result<(), Fault> {
        let addr = self.address(r, d)?;
        self.push(addr)?;
        self.advance()
    }

    fn op_loadi(&mut self, n: Word) -> Result<(), Fault> {
        let n = count(n)?;
        let base = self.slot(1)?;
        let addr = self.store.read(base)?;
        if i64::from(self.registers.ht) - i64::from(base) < i64::from(n) {
            return Err(Fault::StoreExhausted);
        }
        let words = self.store.read_block(addr, n)?;
        self.store.write_block(base, &words)?;
        self.registers.st = base + n;
        self.advance()
    }

    fn op_loadl(&mut self, d: Word) -> Result<(), Fault> {
        self.push(d)?;
        self.advance()
    }

    fn op_store(&mut self, n: Word, r: Word, d: Word) -> Result<(), Fault> {
        let n = count(n)?;
        let addr = self.address(r, d)?;
        let base = self.slot(n)?;
        let words = self.store.read_block(base, n)?;
        self.store.write_block(addr, &words)?;
        self.registers.st = base;
        self.advance()
    }

    fn op_storei(&mut self, n: Word) -> Result<(), Fault> {
        let n = count(n)?;
        let addr = self.peek(1)?;
        let base = self.slot(n.saturating_add(1))?;
        let words = self.store.read_block(base, n)?;
        self.store.write_block(addr, &words)?;
        self.registers.st = base;
        self.advance()
    }

    // ==================== Routines ====================

    fn op_call(&mut self, n: Word, r: Word, d: Word) -> Result<(), Fault> {
        let target = self.address(r, d)?;
        if target >= PB {
            self.call_primitive(target - PB)?;
            return self.advance();
        }

        self.check_space(LINK_DATA_SIZE)?;
        if Register::try_from(n).is_err() {
            return Err(Fault::InvalidInstruction);
        }
        let static_link = self.content(n)?;
        let frame = self.registers.st;
        self.store
            .write_block(frame, &[static_link, self.registers.lb, self.registers.cp + 1])?;
        self.registers.lb = frame;
        self.registers.st = frame + LINK_DATA_SIZE;
        self.registers.cp = target;
        Ok(())
    }

    fn op_calli(&mut self) -> Result<(), Fault> {
        let frame = self.slot(2)?;
        let target = self.store.read(frame + 1)?;
        if target >= PB {
            // The closure is consumed before the primitive runs.
            self.registers.st = frame;
            self.call_primitive(target - PB)?;
            return self.advance();
        }

        // The closure's static link becomes the frame's first word; one more word is needed.
        self.check_space(1)?;
        self.store
            .write_block(frame + 1, &[self.registers.lb, self.registers.cp + 1])?;
        self.registers.lb = frame;
        self.registers.st = frame + LINK_DATA_SIZE;
        self.registers.cp = target;
        Ok(())
    }

    fn op_return(&mut self, n: Word, d: Word) -> Result<(), Fault> {
        let n = count(n)?;
        let lb = self.registers.lb;
        let result = lb.wrapping_sub(d);
        let return_address = self.store.read(lb.wrapping_add(2))?;
        let dynamic_link = self.store.read(lb.wrapping_add(1))?;
        let base = self.slot(n)?;
        let words = self.store.read_block(base, n)?;
        if result < SB || i64::from(result) + i64::from(n) > i64::from(self.registers.ht) {
            return Err(Fault::StoreExhausted);
        }
        self.store.write_block(result, &words)?;
        self.registers.cp = return_address;
        self.registers.lb = dynamic_link;
        self.registers.st = result + n;
        Ok(())
    }

    // ==================== Stack ====================

    fn op_push(&mut self, d: Word) -> Result<(), Fault> {
        let d = count(d)?;
        self.check_space(d)?;
        self.registers.st += d;
        self.advance()
    }

    fn op_pop(&mut self, n: Word, d: Word) -> Result<(), Fault> {
        let n = count(n)?;
        let d = count(d)?;
        let base = self.slot(n)?;
        let dest = base - d;
        if dest < SB {
            return Err(Fault::StoreExhausted);
        }
        let words = self.store.read_block(base, n)?;
        self.store.write_block(dest, &words)?;
        self.registers.st = dest + n;
        self.advance()
    }

    // ==================== Control flow ====================

    fn op_jump(&mut self, r: Word, d: Word) -> Result<(), Fault> {
        self.registers.cp = self.address(r, d)?;
        Ok(())
    }

    fn op_jumpi(&mut self) -> Result<(), Fault> {
        self.registers.cp = self.pop()?;
        Ok(())
    }

    fn op_jumpif(&mut self, n: Word, r: Word, d: Word) -> Result<(), Fault> {
        // The target is formed after the pop, so `d[ST]` sees the smaller stack.
        let value = self.pop()?;
        self.registers.cp = if value == n {
            self.address(r, d)?
        } else {
            self.registers.cp + 1
        };
        Ok(())
    }

    fn op_halt(&mut self) -> Result<(), Fault> {
        self.status = Status::Halted;
        Ok(())
    }

    // ==================== Primitives ====================

    /// Runs the primitive at `PB + displacement`. Primitives never touch `LB` or `CP`.
    fn call_primitive(&mut self, displacement: Word) -> Result<(), Fault> {
        let primitive = Primitive::try_from(displacement).map_err(|_| Fault::InvalidInstruction)?;

        match primitive {
            Primitive::Id => Ok(()),
            Primitive::Not => self.unary(|a| Ok(to_word(!is_true(a)))),
            Primitive::And => self.binary(|a, b| Ok(to_word(is_true(a) & is_true(b)))),
            Primitive::Or => self.binary(|a, b| Ok(to_word(is_true(a) | is_true(b)))),
            Primitive::Succ => self.unary(|a| overflow_checked(i64::from(a) + 1)),
            Primitive::Pred => self.unary(|a| overflow_checked(i64::from(a) - 1)),
            Primitive::Neg => self.unary(|a| Ok(a.wrapping_neg())),
            Primitive::Add => self.binary(|a, b| overflow_checked(i64::from(a) + i64::from(b))),
            Primitive::Sub => self.binary(|a, b| overflow_checked(i64::from(a) - i64::from(b))),
            Primitive::Mult => self.binary(|a, b| overflow_checked(i64::from(a) * i64::from(b))),
            Primitive::Div => self.binary(|a, b| {
                if b == 0 {
                    Err(Fault::ZeroDivide)
                } else {
                    Ok((i64::from(a) / i64::from(b)) as Word)
                }
            }),
            Primitive::Mod => self.binary(|a, b| {
                if b == 0 {
                    Err(Fault::ZeroDivide)
                } else {
                    Ok((i64::from(a) % i64::from(b)) as Word)
                }
            }),
            Primitive::Lt => self.binary(|a, b| Ok(to_word(a < b))),
            Primitive::Le => self.binary(|a, b| Ok(to_word(a <= b))),
            Primitive::Ge => self.binary(|a, b| Ok(to_word(a >= b))),
            Primitive::Gt => self.binary(|a, b| Ok(to_word(a > b))),
            Primitive::Eq => self.compare(true),
            Primitive::Ne => self.compare(false),
            Primitive::Eol => self.push(to_word(self.current_char == Word::from(b'\n'))),
            Primitive::Eof => self.push(to_word(self.current_char == END_OF_INPUT)),
            Primitive::Get => self.prim_get(),
            Primitive::Put => self.prim_put(),
            Primitive::GetEol => self.prim_geteol(),
            Primitive::PutEol => self.write("\n"),
            Primitive::GetInt => self.prim_getint(),
            Primitive::PutInt => {
                let value = self.pop()?;
                self.write(&value.to_string())
            }
            Primitive::New => self.prim_new(),
            Primitive::Dispose => self.pop().map(|_| ()),
            Primitive::IndexCheck => self.prim_indexcheck(),
        }
    }

    /// Replaces the top word with `f(top)`.
    fn unary(&mut self, f: impl FnOnce(Word) -> Result<Word, Fault>) -> Result<(), Fault> {
        let addr = self.slot(1)?;
        let result = f(self.store.read(addr)?)?;
        self.store.write(addr, result)
    }

    /// Pops two words and pushes `f(below, top)`.
    ///
    /// If `f` fails the operands are still consumed and the result slot keeps its old value.
    fn binary(&mut self, f: impl FnOnce(Word, Word) -> Result<Word, Fault>) -> Result<(), Fault> {
        let left_addr = self.slot(2)?;
        let left = self.store.read(left_addr)?;
        let right = self.store.read(left_addr + 1)?;
        self.registers.st -= 1;
        let result = f(left, right)?;
        self.store.write(left_addr, result)
    }

    /// `eq`/`ne`: compares two values whose size sits on top of the stack.
    fn compare(&mut self, want_equal: bool) -> Result<(), Fault> {
        let size = self.peek(1)?;
        if size < 0 {
            return Err(Fault::StoreExhausted);
        }
        let new_st = self.slot(size.saturating_mul(2))?;
        let first = new_st - 1;
        let left = self.store.read_block(first, size)?;
        let right = self.store.read_block(first + size, size)?;
        self.store.write(first, to_word((left == right) == want_equal))?;
        self.registers.st = new_st;
        Ok(())
    }

    fn prim_new(&mut self) -> Result<(), Fault> {
        let addr = self.slot(1)?;
        let size = self.store.read(addr)?;
        if size < 0 {
            return Err(Fault::StoreExhausted);
        }
        self.check_space(size)?;
        let block = self.registers.ht - size;
        self.store.write(addr, block)?;
        self.registers.ht = block;
        Ok(())
    }

    fn prim_indexcheck(&mut self) -> Result<(), Fault> {
        let w1 = self.peek(1)?;
        let w2 = self.peek(2)?;
        let w3 = self.peek(3)?;
        if w1 <= w3 || w2 > w3 {
            return Err(Fault::IndexOutOfBounds);
        }
        self.registers.st -= 3;
        Ok(())
    }

    // ==================== Console ====================

    /// Reads one character into `current_char`.
    fn read_char(&mut self) -> Result<Word, Fault> {
        let c = match self.console.read_byte() {
            Ok(Some(byte)) => Word::from(byte),
            Ok(None) => END_OF_INPUT,
            Err(_) => return Err(Fault::IoError),
        };
        self.current_char = c;
        Ok(c)
    }

    fn write(&mut self, text: &str) -> Result<(), Fault> {
        self.console.write_str(text).map_err(|_| Fault::IoError)
    }

    fn prim_get(&mut self) -> Result<(), Fault> {
        let addr = self.peek(1)?;
        let c = self.read_char()?;
        self.registers.st -= 1;
        self.store.write(addr, c)
    }

    fn prim_put(&mut self) -> Result<(), Fault> {
        let value = self.pop()?;
        let ch = char::from_u32((value & 0xFFFF) as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
        let mut buf = [0u8; 4];
        self.write(ch.encode_utf8(&mut buf))
    }

    fn prim_geteol(&mut self) -> Result<(), Fault> {
        loop {
            let c = self.read_char()?;
            if c == Word::from(b'\n') || c == END_OF_INPUT {
                return Ok(());
            }
        }
    }

    fn prim_getint(&mut self) -> Result<(), Fault> {
        let addr = self.peek(1)?;
        let value = self.read_int()?;
        self.registers.st -= 1;
        self.store.write(addr, value)
    }

    /// Skips whitespace, then reads optional signs (the last one counts) and decimal
    /// digits. The character that ends the number stays in `current_char`.
    fn read_int(&mut self) -> Result<Word, Fault> {
        let mut c = self.read_char()?;
        while is_space(c) {
            c = self.read_char()?;
        }

        let mut sign: Word = 1;
        while c == Word::from(b'-') || c == Word::from(b'+') {
            sign = if c == Word::from(b'-') { -1 } else { 1 };
            c = self.read_char()?;
        }

        let mut value: Word = 0;
        while is_digit(c) {
            value = value.wrapping_mul(10).wrapping_add(c - Word::from(b'0'));
            c = self.read_char()?;
        }

        Ok(sign.wrapping_mul(value))
    }
}
