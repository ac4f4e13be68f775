//! Representation of runtime values
//!
//! Every slot of every heap cell, every evaluation stack entry and every root
//! holds one [`Value`]. A value is a tag plus a payload; the payload is either
//! inline (integers, primitive ids, dictionary offsets) or a [`CellRef`] into
//! the active semi-space.
use core::fmt;

use crate::runtime::primitives::Primitive;

/// Handle to a two-slot heap cell.
///
/// The `epoch` is the collection count the handle was minted in. Every
/// collection relocates all live cells and bumps the epoch, so a handle that
/// survived a collection without being rewritten as a root is detectably
/// stale instead of silently pointing at somebody else's cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub(crate) index: u32,
    pub(crate) epoch: u32,
}

impl fmt::Debug for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.epoch)
    }
}

/// Byte offset of a null-terminated name inside the dictionary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NameRef(pub(crate) u32);

/// A body of code plus the environment it closes over.
///
/// Also used for return-stack frames, where `body` is the *remaining* part of
/// the body and becomes `None` once the frame is exhausted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Closure {
    pub body: Option<CellRef>,
    pub env: Option<CellRef>,
}

impl Closure {
    pub fn body(&self) -> Value {
        Value::list(self.body)
    }

    pub fn env(&self) -> Value {
        Value::list(self.env)
    }
}

// Type that stores all possible values!
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Value {
    // the empty list, also the false value
    #[default]
    Nil,
    Symbol(NameRef),
    // Two's-complement bit pattern. Arithmetic reinterprets as i64 where
    // signedness matters.
    Integer(u64),
    Cons(CellRef),
    Procedure(Closure),
    Primitive(Primitive),
}

/// Kind of a value, as reported in diagnostics and by the `tag` primitive.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Tag {
    Nil,
    Cons,
    Symbol,
    Integer,
    Procedure,
    Primitive,
}

impl Tag {
    /// Numeric code exposed to programs. `Nil` shares the list code with
    /// `Cons`; programs tell them apart with `eq`.
    pub fn code(self) -> u64 {
        match self {
            Tag::Nil | Tag::Cons => 0,
            Tag::Symbol => 1,
            Tag::Integer => 2,
            Tag::Procedure => 3,
            Tag::Primitive => 4,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tag::Nil => "nil",
            Tag::Cons => "cons",
            Tag::Symbol => "symbol",
            Tag::Integer => "integer",
            Tag::Procedure => "procedure",
            Tag::Primitive => "primitive",
        };
        f.write_str(name)
    }
}

impl Value {
    /// `Nil` for `None`, otherwise the cons cell.
    pub fn list(head: Option<CellRef>) -> Self {
        head.map_or(Value::Nil, Value::Cons)
    }

    pub fn integer(value: i64) -> Self {
        Value::Integer(value as u64)
    }

    pub fn tag(&self) -> Tag {
        match self {
            Value::Nil => Tag::Nil,
            Value::Symbol(_) => Tag::Symbol,
            Value::Integer(_) => Tag::Integer,
            Value::Cons(_) => Tag::Cons,
            Value::Procedure(_) => Tag::Procedure,
            Value::Primitive(_) => Tag::Primitive,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Value::Integer(int) => Some(*int),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<NameRef> {
        match self {
            Value::Symbol(name) => Some(*name),
            _ => None,
        }
    }

    /// Interprets the value as a list head: `Nil` is the empty list.
    pub fn as_list(&self) -> Option<Option<CellRef>> {
        match self {
            Value::Nil => Some(None),
            Value::Cons(cell) => Some(Some(*cell)),
            _ => None,
        }
    }
}
