//! Primitive routine table.
//!
//! Primitive routines live at code addresses `PB + displacement` and are reached with
//! `CALL` or `CALLI`. Like the instruction set, the table is a single macro
//! ([`for_each_primitive!`](crate::for_each_primitive)) expanded into the
//! [`Primitive`] enum, its displacement decoding and its assembly names.

use crate::virtual_machine::isa::Word;

/// Invokes a callback macro with the complete primitive definition list.
#[macro_export]
macro_rules! for_each_primitive {
    ($callback:ident) => {
        $callback! {
            /// id ; no effect
            Id = 1, "id",
            /// not ; logical negation of the top word
            Not = 2, "not",
            /// and ; logical conjunction of the two top words
            And = 3, "and",
            /// or ; logical disjunction of the two top words
            Or = 4, "or",
            /// succ ; top + 1, overflow-checked
            Succ = 5, "succ",
            /// pred ; top - 1, overflow-checked
            Pred = 6, "pred",
            /// neg ; arithmetic negation of the top word
            Neg = 7, "neg",
            /// add ; overflow-checked sum
            Add = 8, "add",
            /// sub ; overflow-checked difference
            Sub = 9, "sub",
            /// mult ; overflow-checked product
            Mult = 10, "mult",
            /// div ; truncating quotient
            Div = 11, "div",
            /// mod ; remainder of the truncating quotient
            Mod = 12, "mod",
            /// lt ; less than
            Lt = 13, "lt",
            /// le ; less than or equal
            Le = 14, "le",
            /// ge ; greater than or equal
            Ge = 15, "ge",
            /// gt ; greater than
            Gt = 16, "gt",
            /// eq ; equality of two values whose size is on top of the stack
            Eq = 17, "eq",
            /// ne ; inequality of two values whose size is on top of the stack
            Ne = 18, "ne",
            /// eol ; push whether the last character read was a newline
            Eol = 19, "eol",
            /// eof ; push whether input is exhausted
            Eof = 20, "eof",
            /// get ; read a character into the word at the popped address
            Get = 21, "get",
            /// put ; write the popped word as a character
            Put = 22, "put",
            /// geteol ; skip input through the next newline
            GetEol = 23, "geteol",
            /// puteol ; write a newline
            PutEol = 24, "puteol",
            /// getint ; read a decimal integer into the word at the popped address
            GetInt = 25, "getint",
            /// putint ; write the popped word in decimal
            PutInt = 26, "putint",
            /// new ; replace the size on top of the stack with a fresh heap block address
            New = 27, "new",
            /// dispose ; pop a heap block address
            Dispose = 28, "dispose",
            /// indexcheck ; check an index against its bounds
            IndexCheck = 29, "indexcheck",
        }
    };
}

#[macro_export]
macro_rules! define_primitives {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $displacement:literal, $label:literal
        ),* $(,)?
    ) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Primitive {
            $(
                $(#[$doc])*
                $name = $displacement,
            )*
        }

        impl TryFrom<Word> for Primitive {
            type Error = Word;

            /// Decodes a displacement from `PB`; the displacement is returned on failure.
            fn try_from(value: Word) -> Result<Self, Self::Error> {
                match value {
                    $( $displacement => Ok(Primitive::$name), )*
                    _ => Err(value),
                }
            }
        }

        impl Primitive {
            /// Name used by `CALL name` in assembly.
            pub const fn name(&self) -> &'static str {
                match self {
                    $( Primitive::$name => $label, )*
                }
            }

            pub fn from_name(name: &str) -> Option<Primitive> {
                match name {
                    $( $label => Some(Primitive::$name), )*
                    _ => None,
                }
            }

            pub const fn displacement(&self) -> Word {
                *self as Word
            }
        }
    };
}

for_each_primitive!(define_primitives);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::{PB, PT};

    #[test]
    fn displacements_fit_primitive_segment() {
        for d in 0..(PT - PB) {
            if let Ok(p) = Primitive::try_from(d) {
                assert_eq!(p.displacement(), d);
                assert_eq!(Primitive::from_name(p.name()), Some(p));
            }
        }
        assert_eq!(Primitive::try_from(0), Err(0));
        assert_eq!(Primitive::try_from(30), Err(30));
    }

    #[test]
    fn names_round_trip() {
        assert_eq!(Primitive::from_name("indexcheck"), Some(Primitive::IndexCheck));
        assert_eq!(Primitive::from_name("putint").map(|p| p.displacement()), Some(26));
        assert_eq!(Primitive::from_name("ADD"), None);
    }
}
