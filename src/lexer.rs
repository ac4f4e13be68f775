//! Splits the input byte stream into tokens
//!
//! Bytes are pulled from a [`Console`] one at a time, with a single byte of
//! lookahead and no other buffering, so the lexer never consumes input the
//! program has not asked for yet. Once a run of atom bytes is isolated, a
//! small `logos` lexer decides whether it is an integer, `nil`, or a symbol.
use logos::{Lexer, Logos};

use crate::{port::Console, Error};

/// Integer literals accumulate with 64-bit wraparound, like the arithmetic.
fn parse_integer(lexer: &mut Lexer<Atom>) -> u64 {
    let text = lexer.slice();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, text),
    };
    let magnitude = digits.bytes().fold(0u64, |acc, digit| {
        acc.wrapping_mul(10).wrapping_add(u64::from(digit - b'0'))
    });
    if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    }
}

#[derive(Logos, Debug, PartialEq, Clone, Copy)]
enum Atom {
    #[regex("-?[0-9]+", parse_integer, priority = 3)]
    Integer(u64),
    #[token("nil", priority = 4)]
    Nil,
    #[regex(r"[^ \t\n\r\x00'$^:()]+")]
    Symbol,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
    Open,
    Close,
    /// `'`
    Quote,
    /// `$`
    Push,
    /// `^`
    PopSet,
    /// `:`
    PopExtend,
    Integer(u64),
    Nil,
    Symbol(Box<[u8]>),
}

impl Token {
    fn single(byte: u8) -> Option<Self> {
        Some(match byte {
            b'(' => Token::Open,
            b')' => Token::Close,
            b'\'' => Token::Quote,
            b'$' => Token::Push,
            b'^' => Token::PopSet,
            b':' => Token::PopExtend,
            _ => return None,
        })
    }

    /// Classify an isolated run of atom bytes.
    fn atom(text: Vec<u8>) -> Self {
        let Ok(source) = std::str::from_utf8(&text) else {
            return Token::Symbol(text.into_boxed_slice());
        };
        let mut lexer = Atom::lexer(source);
        let atom = lexer.next();
        if lexer.span().end != source.len() {
            return Token::Symbol(text.into_boxed_slice());
        }
        match atom {
            Some(Ok(Atom::Integer(value))) => Token::Integer(value),
            Some(Ok(Atom::Nil)) => Token::Nil,
            _ => Token::Symbol(text.into_boxed_slice()),
        }
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0)
}

fn is_delimiter(byte: u8) -> bool {
    is_whitespace(byte) || Token::single(byte).is_some()
}

#[derive(Default)]
pub struct Scanner {
    /// `None` until a byte is needed, then `Some(None)` at end of input.
    peeked: Option<Option<u8>>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    fn peek<C: Console + ?Sized>(&mut self, console: &mut C) -> Result<Option<u8>, Error> {
        match self.peeked {
            Some(byte) => Ok(byte),
            None => {
                let byte = console.read_byte()?;
                self.peeked = Some(byte);
                Ok(byte)
            }
        }
    }

    fn bump(&mut self) {
        self.peeked = None;
    }

    /// Next token, or `None` once the input is exhausted.
    pub fn next_token<C: Console + ?Sized>(
        &mut self,
        console: &mut C,
    ) -> Result<Option<Token>, Error> {
        // skip whitespace
        let first = loop {
            match self.peek(console)? {
                None => return Ok(None),
                Some(byte) if is_whitespace(byte) => self.bump(),
                Some(byte) => break byte,
            }
        };
        self.bump();

        if let Some(token) = Token::single(first) {
            return Ok(Some(token));
        }

        let mut text = vec![first];
        while let Some(byte) = self.peek(console)? {
            if is_delimiter(byte) {
                break;
            }
            text.push(byte);
            self.bump();
        }
        Ok(Some(Token::atom(text)))
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::{Scanner, Token};
    use crate::port::StdConsole;

    fn tokens(source: &str) -> Vec<Token> {
        let mut console = StdConsole::new(source.as_bytes(), Vec::new(), Vec::new());
        let mut scanner = Scanner::new();
        let mut out = Vec::new();
        while let Some(token) = scanner.next_token(&mut console).unwrap() {
            out.push(token);
        }
        out
    }

    fn symbol(name: &str) -> Token {
        Token::Symbol(name.as_bytes().into())
    }

    #[test]
    fn punctuation_splits_atoms() {
        check!(
            tokens("(a'b$c^d:e)")
                == [
                    Token::Open,
                    symbol("a"),
                    Token::Quote,
                    symbol("b"),
                    Token::Push,
                    symbol("c"),
                    Token::PopSet,
                    symbol("d"),
                    Token::PopExtend,
                    symbol("e"),
                    Token::Close,
                ]
        );
    }

    #[test]
    fn whitespace_includes_carriage_return_and_nul() {
        check!(tokens(" a\t\r\n\0b ") == [symbol("a"), symbol("b")]);
        check!(tokens(" \n\t").is_empty());
    }

    #[test]
    fn integers() {
        check!(tokens("0 42 -7") == [Token::Integer(0), Token::Integer(42), Token::Integer(u64::MAX - 6)]);
        // wraps around instead of failing
        check!(tokens("18446744073709551617") == [Token::Integer(1)]);
    }

    #[test]
    fn integer_lookalikes_are_symbols() {
        check!(tokens("- 12abc -x 1-2") == [symbol("-"), symbol("12abc"), symbol("-x"), symbol("1-2")]);
    }

    #[test]
    fn nil_is_its_own_token() {
        check!(tokens("nil nils") == [Token::Nil, symbol("nils")]);
    }

    #[test]
    fn non_utf8_bytes_are_symbols() {
        let mut console = StdConsole::new(&b"\xff\xfe x"[..], Vec::new(), Vec::new());
        let mut scanner = Scanner::new();
        let_assert!(Ok(Some(Token::Symbol(name))) = scanner.next_token(&mut console));
        check!(&name[..] == b"\xff\xfe");
    }

    #[test]
    fn lookahead_is_one_byte() {
        let mut console = StdConsole::new(&b"ab(cd"[..], Vec::new(), Vec::new());
        let mut scanner = Scanner::new();
        let_assert!(Ok(Some(Token::Symbol(_))) = scanner.next_token(&mut console));
        // the `(` was peeked, `cd` is still unread
        let (reader, _, _) = console.into_parts();
        check!(reader == b"cd");
    }
}
