//! Textual form of values
//!
//! Printing walks an explicit work list, so neither long nor deeply nested
//! structures touch the host stack. Nesting deeper than the configured limit
//! is cut off with `...`.
use crate::{
    arena::{Arena, Value},
    Error,
};

pub const DEFAULT_PRINT_DEPTH: usize = 1000;

enum Work {
    Value(Value, usize),
    /// Remaining elements of a list or procedure body.
    Items { list: Value, depth: usize, first: bool },
    Text(&'static [u8]),
}

/// Append the printed form of `value` to `out`.
pub fn print_value(
    arena: &Arena,
    value: Value,
    max_depth: usize,
    out: &mut Vec<u8>,
) -> Result<(), Error> {
    let mut work = vec![Work::Value(value, 0)];
    while let Some(item) = work.pop() {
        match item {
            Work::Text(text) => out.extend_from_slice(text),
            Work::Value(value, depth) => match value {
                Value::Nil => out.extend_from_slice(b"nil"),
                Value::Integer(bits) => out.extend_from_slice((bits as i64).to_string().as_bytes()),
                Value::Symbol(name) => out.extend_from_slice(arena.name(name)),
                Value::Primitive(prim) => {
                    out.extend_from_slice(b"#<primitive ");
                    out.extend_from_slice(prim.name().as_bytes());
                    out.push(b'>');
                }
                Value::Cons(_) | Value::Procedure(_) if depth >= max_depth => {
                    out.extend_from_slice(b"...");
                }
                Value::Cons(_) => {
                    out.push(b'(');
                    work.push(Work::Text(b")"));
                    work.push(Work::Items {
                        list: value,
                        depth: depth + 1,
                        first: true,
                    });
                }
                Value::Procedure(closure) => {
                    out.push(b'[');
                    work.push(Work::Text(b"]"));
                    work.push(Work::Items {
                        list: closure.body(),
                        depth: depth + 1,
                        first: true,
                    });
                }
            },
            Work::Items { list, depth, first } => match list {
                Value::Nil => {}
                Value::Cons(cell) => {
                    let (car, cdr) = arena.pair(cell)?;
                    work.push(Work::Items {
                        list: cdr,
                        depth,
                        first: false,
                    });
                    work.push(Work::Value(car, depth));
                    if !first {
                        work.push(Work::Text(b" "));
                    }
                }
                // improper tail
                tail => {
                    work.push(Work::Value(tail, depth));
                    work.push(Work::Text(b" . "));
                }
            },
        }
    }
    Ok(())
}

/// Printed form as a string, with invalid UTF-8 in names replaced.
pub fn render(arena: &Arena, value: Value, max_depth: usize) -> Result<String, Error> {
    let mut out = Vec::new();
    print_value(arena, value, max_depth, &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
