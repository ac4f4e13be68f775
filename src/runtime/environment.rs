//! Association-list environments
//!
//! An environment is a list of `(symbol . value)` pairs, newest first.
//! Extending conses a new head and shares the tail, so closures holding the
//! old head never see the new binding. Setting overwrites the value slot of
//! the nearest existing pair in place, which every environment sharing that
//! pair observes.
use crate::{
    arena::{Arena, CellRef, NameRef, Tag, Value},
    Error,
};

/// The pair binding `name`, nearest first.
pub fn binding(arena: &Arena, env: Value, name: NameRef) -> Result<Option<CellRef>, Error> {
    let mut cursor = env;
    while let Value::Cons(cell) = cursor {
        let (entry, rest) = arena.pair(cell)?;
        let Value::Cons(pair) = entry else {
            return Err(Error::mismatch("lookup", Tag::Cons, entry.tag()));
        };
        if let Value::Symbol(bound) = arena.car(pair)? {
            if arena.same_name(bound, name) {
                return Ok(Some(pair));
            }
        }
        cursor = rest;
    }
    Ok(None)
}

pub fn lookup(arena: &Arena, env: Value, name: NameRef) -> Result<Value, Error> {
    match binding(arena, env, name)? {
        Some(pair) => arena.cdr(pair),
        None => Err(Error::Unbound {
            name: arena.name_lossy(name),
            during: "lookup",
        }),
    }
}

pub fn set(arena: &mut Arena, env: Value, name: NameRef, value: Value) -> Result<(), Error> {
    match binding(arena, env, name)? {
        Some(pair) => arena.set_cdr(pair, value),
        None => Err(Error::Unbound {
            name: arena.name_lossy(name),
            during: "set",
        }),
    }
}

/// New environment with `name` bound in front of `env`.
pub fn extend(
    arena: &mut Arena,
    mut env: Value,
    name: NameRef,
    mut value: Value,
) -> Result<Value, Error> {
    arena.reserve(2, &mut [&mut env, &mut value])?;
    let pair = arena.alloc(Value::Symbol(name), value)?;
    Ok(Value::Cons(arena.alloc(Value::Cons(pair), env)?))
}
