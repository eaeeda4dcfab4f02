use super::store::DataStore;
use crate::virtual_machine::isa::{CB, HB, PB, PT, Register, SB, Word};
use crate::virtual_machine::status::Fault;

/// The machine's mutable registers.
///
/// `CB`, `SB`, `HB`, `PB` and `PT` are constants and live in [`isa`](crate::virtual_machine::isa).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Registers {
    /// Code top: one past the last loaded instruction.
    pub ct: Word,
    /// Stack top: one past the topmost stack word.
    pub st: Word,
    /// Heap top: the lowest heap word.
    pub ht: Word,
    /// Local base: the current frame.
    pub lb: Word,
    /// Code pointer.
    pub cp: Word,
}

impl Registers {
    pub(super) fn new(ct: Word) -> Self {
        Self {
            ct,
            st: SB,
            ht: HB,
            lb: SB,
            cp: CB,
        }
    }

    /// Current value of the register named by `selector`.
    ///
    /// `L1`..`L6` chase the static-link chain from `LB`; a link pointing outside the
    /// store is [`Fault::StoreExhausted`]. Selectors that name no register resolve to 0.
    pub fn content(&self, selector: Word, store: &DataStore) -> Result<Word, Fault> {
        let Ok(register) = Register::try_from(selector) else {
            return Ok(0);
        };

        if let Some(level) = register.level() {
            let mut frame = self.lb;
            for _ in 0..level {
                frame = store.read(frame)?;
            }
            return Ok(frame);
        }

        Ok(match register {
            Register::CB => CB,
            Register::CT => self.ct,
            Register::PB => PB,
            Register::PT => PT,
            Register::SB => SB,
            Register::ST => self.st,
            Register::HB => HB,
            Register::HT => self.ht,
            Register::LB => self.lb,
            Register::CP => self.cp,
            Register::L1
            | Register::L2
            | Register::L3
            | Register::L4
            | Register::L5
            | Register::L6 => 0,
        })
    }

    /// Whether `addr` lies in the loaded code segment.
    pub fn in_code(&self, addr: Word) -> bool {
        (CB..self.ct).contains(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_registers() {
        let store = DataStore::new();
        let regs = Registers {
            ct: 7,
            st: 12,
            ht: 1000,
            lb: 4,
            cp: 3,
        };
        assert_eq!(regs.content(Register::CT as Word, &store), Ok(7));
        assert_eq!(regs.content(Register::ST as Word, &store), Ok(12));
        assert_eq!(regs.content(Register::HT as Word, &store), Ok(1000));
        assert_eq!(regs.content(Register::LB as Word, &store), Ok(4));
        assert_eq!(regs.content(Register::CP as Word, &store), Ok(3));
        assert_eq!(regs.content(Register::PB as Word, &store), Ok(PB));
        assert_eq!(regs.content(Register::PT as Word, &store), Ok(PT));
        assert_eq!(regs.content(Register::HB as Word, &store), Ok(HB));
    }

    #[test]
    fn unknown_selector_is_zero() {
        let store = DataStore::new();
        let regs = Registers::new(1);
        assert_eq!(regs.content(16, &store), Ok(0));
        assert_eq!(regs.content(-1, &store), Ok(0));
    }

    #[test]
    fn level_registers_chase_static_links() {
        let mut store = DataStore::new();
        // frame at 20 links to 10, which links to 0
        store.write(20, 10).unwrap();
        store.write(10, 0).unwrap();
        let mut regs = Registers::new(1);
        regs.lb = 20;
        assert_eq!(regs.content(Register::L1 as Word, &store), Ok(10));
        assert_eq!(regs.content(Register::L2 as Word, &store), Ok(0));

        store.write(20, -4).unwrap();
        assert_eq!(
            regs.content(Register::L2 as Word, &store),
            Err(Fault::StoreExhausted)
        );
    }
}
