//! Turns tokens into values
//!
//! Lists are read without host recursion: every open `(` and every reader
//! macro still waiting for its operand sits on a small work stack, and list
//! elements are parked on the evaluation stack (which the collector already
//! treats as roots) until the closing paren turns them into cons cells.
//!
//! The four reader macros expand into plain values handed out one per read.
//! `'E` reads as `quote` followed by `E`; `$E`, `^E` and `:E` additionally
//! append `push`, `pops` or `pope`. Whatever is still owed goes to a pending
//! queue, a heap list rooted in [`Roots::pending`](crate::arena::Roots),
//! which always drains before another byte of input is consumed.
use tracing::trace;

use crate::{
    arena::{Arena, NameRef, Value},
    lexer::{Scanner, Token},
    port::Console,
    runtime::WellKnown,
    Error,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Datum {
    Value(Value),
    /// A `)` with no list open.
    Close,
}

#[derive(Clone, Copy, Debug)]
enum Open {
    /// List whose elements start at this evaluation stack depth.
    List { base: usize },
    /// Reader macro waiting for its operand, with the operation to append.
    Macro { append: Option<NameRef> },
}

#[derive(Default)]
pub struct Reader {
    scanner: Scanner,
}

impl Reader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one datum, pending expansions first.
    ///
    /// End of input anywhere, even in the middle of a list, is
    /// [`Error::EndOfInput`].
    pub fn read<C: Console + ?Sized>(
        &mut self,
        arena: &mut Arena,
        console: &mut C,
        known: &WellKnown,
    ) -> Result<Datum, Error> {
        let mut opens: Vec<Open> = Vec::new();
        loop {
            let mut item = match dequeue(arena)? {
                Some(value) => Datum::Value(value),
                None => match self.scanner.next_token(console)? {
                    None => return Err(Error::EndOfInput),
                    Some(Token::Open) => {
                        opens.push(Open::List {
                            base: arena.stack().len(),
                        });
                        continue;
                    }
                    Some(Token::Quote) => {
                        opens.push(Open::Macro { append: None });
                        continue;
                    }
                    Some(Token::Push) => {
                        opens.push(Open::Macro {
                            append: Some(known.push),
                        });
                        continue;
                    }
                    Some(Token::PopSet) => {
                        opens.push(Open::Macro {
                            append: Some(known.pops),
                        });
                        continue;
                    }
                    Some(Token::PopExtend) => {
                        opens.push(Open::Macro {
                            append: Some(known.pope),
                        });
                        continue;
                    }
                    Some(Token::Close) => Datum::Close,
                    Some(Token::Integer(value)) => Datum::Value(Value::Integer(value)),
                    Some(Token::Nil) => Datum::Value(Value::Nil),
                    Some(Token::Symbol(name)) => Datum::Value(Value::Symbol(arena.intern(&name)?)),
                },
            };

            // hand the item to whatever is waiting for it
            loop {
                match (opens.last().copied(), item) {
                    (None, item) => return Ok(item),
                    (Some(Open::List { .. }), Datum::Value(value)) => {
                        arena.push(value)?;
                        break;
                    }
                    (Some(Open::List { base }), Datum::Close) => {
                        opens.pop();
                        item = Datum::Value(list_from_stack(arena, base)?);
                    }
                    (Some(Open::Macro { .. }), Datum::Close) => {
                        return Err(Error::MissingQuotedDatum);
                    }
                    (Some(Open::Macro { append }), Datum::Value(value)) => {
                        opens.pop();
                        expand(arena, value, append)?;
                        item = Datum::Value(Value::Symbol(known.quote));
                    }
                }
            }
        }
    }
}

fn dequeue(arena: &mut Arena) -> Result<Option<Value>, Error> {
    let Value::Cons(cell) = arena.roots.pending else {
        return Ok(None);
    };
    let (head, rest) = arena.pair(cell)?;
    arena.roots.pending = rest;
    Ok(Some(head))
}

/// Queue `operand` ahead of whatever its own read left pending, and `append`
/// behind it.
fn expand(arena: &mut Arena, operand: Value, append: Option<NameRef>) -> Result<(), Error> {
    let pending = arena.roots.pending;
    let front = arena.cons(operand, pending)?;
    arena.roots.pending = Value::Cons(front);

    let Some(op) = append else {
        return Ok(());
    };
    let last = arena.cons(Value::Symbol(op), Value::Nil)?;
    // the allocation may have moved the queue, walk it from the root
    let mut cursor = match arena.roots.pending {
        Value::Cons(cell) => cell,
        _ => return Err(Error::StaleReference),
    };
    while let Value::Cons(next) = arena.cdr(cursor)? {
        cursor = next;
    }
    arena.set_cdr(cursor, Value::Cons(last))?;
    trace!(depth = arena.stack().len(), "expanded reader macro");
    Ok(())
}

/// Pop everything above `base` into a list, deepest value first.
fn list_from_stack(arena: &mut Arena, base: usize) -> Result<Value, Error> {
    let count = arena.stack().len().saturating_sub(base);
    arena.reserve(count, &mut [])?;
    let mut list = Value::Nil;
    for _ in 0..count {
        let value = arena.pop("read")?;
        list = Value::Cons(arena.alloc(value, list)?);
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use arbitrary::Arbitrary;
    use arbtest::arbtest;
    use assert2::{check, let_assert};

    use super::{Datum, Reader};
    use crate::{
        arena::{Arena, Layout},
        port::StdConsole,
        printer::render,
        runtime::WellKnown,
        Error,
    };

    /// Read every datum in `source`, rendering each one.
    fn read_all(arena: &mut Arena, source: &str) -> Result<Vec<String>, Error> {
        let known = WellKnown::intern(arena)?;
        let mut console = StdConsole::new(source.as_bytes(), Vec::new(), Vec::new());
        let mut reader = Reader::new();
        let mut out = Vec::new();
        loop {
            match reader.read(arena, &mut console, &known) {
                Ok(Datum::Value(value)) => out.push(render(arena, value, 1000)?),
                Ok(Datum::Close) => out.push(")".to_owned()),
                Err(Error::EndOfInput) => return Ok(out),
                Err(e) => return Err(e),
            }
        }
    }

    fn read(source: &str) -> Vec<String> {
        let mut arena = Arena::new(Layout::default());
        read_all(&mut arena, source).unwrap()
    }

    #[test]
    fn atoms_and_lists() {
        check!(read("1 -2 foo") == ["1", "-2", "foo"]);
        check!(read("(1 (2 3) ())") == ["(1 (2 3) nil)"]);
        check!(read("() nil") == ["nil", "nil"]);
    }

    #[test]
    fn quote_expands_to_two_reads() {
        check!(read("'(1 2 3)") == ["quote", "(1 2 3)"]);
        check!(read("''x") == ["quote", "quote", "x"]);
    }

    #[test]
    fn binding_macros_append_their_operation() {
        check!(read("$x") == ["quote", "x", "push"]);
        check!(read("^x") == ["quote", "x", "pops"]);
        check!(read(":x y") == ["quote", "x", "pope", "y"]);
    }

    #[test]
    fn macros_inside_lists_splice_into_the_list() {
        check!(read("(:x $x 'y)") == ["(quote x pope quote x push quote y)"]);
    }

    #[test]
    fn nested_macros_keep_operand_order() {
        check!(read("$'x") == ["quote", "quote", "x", "push"]);
    }

    #[test]
    fn stray_close_is_reported_as_such() {
        check!(read("1 ) 2") == ["1", ")", "2"]);
    }

    #[test]
    fn macro_without_operand() {
        let mut arena = Arena::new(Layout::default());
        let_assert!(Err(Error::MissingQuotedDatum) = read_all(&mut arena, "(')"));
    }

    #[test]
    fn unterminated_list_is_end_of_input() {
        let mut arena = Arena::new(Layout::default());
        check!(read_all(&mut arena, "(1 2").unwrap().is_empty());
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 20_000;
        let source = format!("{}{}", "(".repeat(depth), ")".repeat(depth));
        let mut arena = Arena::new(Layout {
            memory_words: 1 << 18,
        });
        let_assert!(Ok(out) = read_all(&mut arena, &source));
        check!(out.len() == 1);
    }

    #[test]
    fn lists_survive_collection_mid_read() {
        // 256 words: 32 cells per semi-space
        let mut arena = Arena::new(Layout { memory_words: 256 });
        let source = format!("{} (17 18)", "(1 2 3 4 5 6 7 8) ".repeat(5));
        let out = read_all(&mut arena, &source).unwrap();
        check!(out.len() == 6);
        check!(out[0] == "(1 2 3 4 5 6 7 8)");
        check!(out[5] == "(17 18)");
        check!(arena.stats().collections > 0);
    }

    #[derive(Arbitrary, Debug)]
    enum Datumish {
        Nil,
        Int(i64),
        Sym(#[arbitrary(with = symbol_name)] String),
        List(Vec<Datumish>),
    }

    fn symbol_name(u: &mut arbitrary::Unstructured) -> arbitrary::Result<String> {
        let len = u.int_in_range(1..=6)?;
        let name: String = (0..len)
            .map(|_| u.int_in_range(b'a'..=b'z').map(char::from))
            .collect::<arbitrary::Result<_>>()?;
        Ok(if name == "nil" { "nul".to_owned() } else { name })
    }

    impl Datumish {
        fn size(&self) -> usize {
            match self {
                Datumish::List(items) => 1 + items.iter().map(Datumish::size).sum::<usize>(),
                _ => 1,
            }
        }

        fn source(&self, out: &mut String) {
            match self {
                Datumish::Nil => out.push_str("nil"),
                Datumish::Int(n) => out.push_str(&n.to_string()),
                Datumish::Sym(name) => out.push_str(name),
                Datumish::List(items) => {
                    out.push('(');
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push(' ');
                        }
                        item.source(out);
                    }
                    out.push(')');
                }
            }
        }
    }

    // printing what was read and reading it again is a fixed point
    #[test]
    fn print_read_round_trip() {
        arbtest(|u| {
            let datum: Datumish = u.arbitrary()?;
            if datum.size() > 2000 {
                return Ok(());
            }
            let mut source = String::new();
            datum.source(&mut source);

            let mut arena = Arena::new(Layout::default());
            let_assert!(Ok(printed) = read_all(&mut arena, &source));
            let_assert!([printed] = &printed[..]);
            let_assert!(Ok(again) = read_all(&mut arena, printed));
            check!(again == [printed.clone()]);
            Ok(())
        })
        .size_max(1 << 12);
    }
}
