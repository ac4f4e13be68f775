use std::io;

use crate::{arena::Tag, runtime::bus::Width};

/// Every condition that ends a run.
///
/// There is no recovery tier: the first error stops evaluation, gets
/// reported together with a stack dump, and is handed back to the host.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unmatched close paren")]
    UnmatchedCloseParen,
    #[error("{op}: expected {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: Tag,
        found: Tag,
    },
    #[error("{op}: stack underflow")]
    StackUnderflow { op: &'static str },
    #[error("{name}: undefined symbol ({during})")]
    Unbound { name: String, during: &'static str },
    #[error("stack overflow")]
    StackOverflow,
    #[error("dictionary full")]
    DictionaryFull,
    #[error("out of memory")]
    OutOfMemory,
    #[error("{op}: division by zero")]
    DivisionByZero { op: &'static str },
    #[error("no data after quote")]
    MissingQuotedDatum,
    #[error("popr: return stack is empty")]
    ReturnStackUnderflow,
    #[error("bus fault: {width} access at {addr:#x}")]
    BusFault { addr: u64, width: Width },
    #[error("raw memory access needs the unsafe constructor")]
    RawBusRefused,
    #[error("stale heap reference")]
    StaleReference,
    #[error("corrupt return stack frame")]
    CorruptFrame,
    #[error("end of input")]
    EndOfInput,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn mismatch(op: &'static str, expected: Tag, found: Tag) -> Self {
        Error::TypeMismatch {
            op,
            expected,
            found,
        }
    }

    /// Whether this error is the ordinary end of a hosted session rather
    /// than a panic.
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, Error::EndOfInput)
    }
}
