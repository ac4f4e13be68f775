//! The built-in vocabulary
//!
//! Every primitive works directly on the evaluation stack. Operands are
//! checked while still on the stack, so a panic dump shows exactly what the
//! failing primitive was handed.
use super::{bus::Width, environment, Runtime};
use crate::{
    arena::{NameRef, Tag, Value},
    port::Console,
    printer::print_value,
    Error,
};

macro_rules! primitives {
    ($($variant:ident => $name:literal),* $(,)?) => {
        #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
        pub enum Primitive {
            $($variant),*
        }

        impl Primitive {
            /// Every primitive, in the order the root environment binds them.
            pub const ALL: &'static [Primitive] = &[$(Primitive::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Primitive::$variant => $name),*
                }
            }
        }
    };
}

primitives! {
    Push => "push",
    Pops => "pops",
    Pope => "pope",
    Pushr => "pushr",
    Popr => "popr",
    Eq => "eq",
    Cons => "cons",
    Car => "car",
    Cdr => "cdr",
    Cswap => "cswap",
    Tag => "tag",
    Read => "read",
    Print => "print",
    Sstack => "sstack",
    Env => "env",
    Dup => "dup",
    Drop => "drop",
    Add => "add",
    Sub => "sub",
    Mul => "mul",
    Div => "div",
    Mod => "mod",
    Lsh => "lsh",
    Rsh => "rsh",
    Nand => "nand",
    Or => "or",
    Load => "load",
    Loadw => "loadw",
    Loadh => "loadh",
    Loadb => "loadb",
    Store => "store",
    Storew => "storew",
    Storeh => "storeh",
    Storeb => "storeb",
}

fn integer(op: &'static str, value: Value) -> Result<u64, Error> {
    value
        .as_integer()
        .ok_or_else(|| Error::mismatch(op, Tag::Integer, value.tag()))
}

fn symbol(op: &'static str, value: Value) -> Result<NameRef, Error> {
    value
        .as_symbol()
        .ok_or_else(|| Error::mismatch(op, Tag::Symbol, value.tag()))
}

fn signed(value: u64) -> i64 {
    value as i64
}

impl<C: Console> Runtime<C> {
    pub(super) fn invoke(&mut self, prim: Primitive) -> Result<(), Error> {
        let op = prim.name();
        match prim {
            Primitive::Push => {
                let name = symbol(op, self.arena.peek(op)?)?;
                let env = self.current_env()?;
                let value = environment::lookup(&self.arena, env, name)?;
                self.arena.pop(op)?;
                self.arena.push(value)?;
            }
            Primitive::Pope => {
                let [_, name] = self.arena.peek_n::<2>(op)?;
                let name = symbol(op, name)?;
                let [value, _] = self.arena.pop_n::<2>(op)?;
                let env = self.current_env()?;
                let env = environment::extend(&mut self.arena, env, name, value)?;
                self.set_current_env(env)?;
            }
            Primitive::Pops => {
                let [value, name] = self.arena.peek_n::<2>(op)?;
                let name = symbol(op, name)?;
                let env = self.current_env()?;
                environment::set(&mut self.arena, env, name, value)?;
                self.arena.pop_n::<2>(op)?;
            }
            Primitive::Pushr => {
                let top = self.arena.peek(op)?;
                let Value::Procedure(closure) = top else {
                    return Err(Error::mismatch(op, Tag::Procedure, top.tag()));
                };
                self.arena.pop(op)?;
                self.push_frame(closure)?;
            }
            Primitive::Popr => self.pop_frame()?,
            Primitive::Eq => {
                let [a, b] = self.arena.pop_n::<2>(op)?;
                let same = match (a, b) {
                    (Value::Symbol(a), Value::Symbol(b)) => self.arena.same_name(a, b),
                    (a, b) => a == b,
                };
                let result = if same {
                    Value::Symbol(self.known.t)
                } else {
                    Value::Nil
                };
                self.arena.push(result)?;
            }
            Primitive::Cons => {
                let [cdr, car] = self.arena.pop_n::<2>(op)?;
                let cell = self.arena.cons(car, cdr)?;
                self.arena.push(Value::Cons(cell))?;
            }
            Primitive::Car | Primitive::Cdr => {
                let top = self.arena.peek(op)?;
                let Value::Cons(cell) = top else {
                    return Err(Error::mismatch(op, Tag::Cons, top.tag()));
                };
                let (car, cdr) = self.arena.pair(cell)?;
                self.arena.pop(op)?;
                self.arena
                    .push(if prim == Primitive::Car { car } else { cdr })?;
            }
            Primitive::Cswap => {
                let [a, b, flag] = self.arena.pop_n::<3>(op)?;
                let t = self.known.t;
                let swap =
                    matches!(flag, Value::Symbol(name) if self.arena.same_name(name, t));
                let (lower, upper) = if swap { (b, a) } else { (a, b) };
                self.arena.push(lower)?;
                self.arena.push(upper)?;
            }
            Primitive::Tag => {
                let value = self.arena.pop(op)?;
                self.arena.push(Value::Integer(value.tag().code()))?;
            }
            Primitive::Read => {
                let value = self.read_value()?;
                self.arena.push(value)?;
            }
            Primitive::Print => {
                let value = self.arena.peek(op)?;
                let mut out = Vec::new();
                print_value(&self.arena, value, self.print_depth, &mut out)?;
                out.push(b'\n');
                self.arena.pop(op)?;
                self.console.write_bytes(&out)?;
            }
            Primitive::Sstack => {
                let mut out = Vec::new();
                self.dump_stack(&mut out)?;
                self.console.write_bytes(&out)?;
            }
            Primitive::Env => {
                let env = self.current_env()?;
                self.arena.push(env)?;
            }
            Primitive::Dup => {
                let top = self.arena.peek(op)?;
                self.arena.push(top)?;
            }
            Primitive::Drop => {
                self.arena.pop(op)?;
            }

            Primitive::Add => self.binary(op, |a, b| Ok(signed(a).wrapping_add(signed(b)) as u64))?,
            Primitive::Sub => self.binary(op, |a, b| Ok(signed(a).wrapping_sub(signed(b)) as u64))?,
            Primitive::Mul => self.binary(op, |a, b| Ok(signed(a).wrapping_mul(signed(b)) as u64))?,
            Primitive::Div => self.binary(op, |a, b| match signed(b) {
                0 => Err(Error::DivisionByZero { op }),
                b => Ok(signed(a).wrapping_div(b) as u64),
            })?,
            Primitive::Mod => self.binary(op, |a, b| match signed(b) {
                0 => Err(Error::DivisionByZero { op }),
                b => Ok(signed(a).wrapping_rem(b) as u64),
            })?,
            Primitive::Lsh => self.binary(op, |a, b| Ok(if b < 64 { a << b } else { 0 }))?,
            Primitive::Rsh => self.binary(op, |a, b| Ok(if b < 64 { a >> b } else { 0 }))?,
            Primitive::Nand => self.binary(op, |a, b| Ok(!(a & b)))?,
            Primitive::Or => self.binary(op, |a, b| Ok(a | b))?,

            Primitive::Load => self.load(op, Width::Double)?,
            Primitive::Loadw => self.load(op, Width::Word)?,
            Primitive::Loadh => self.load(op, Width::Half)?,
            Primitive::Loadb => self.load(op, Width::Byte)?,
            Primitive::Store => self.store(op, Width::Double)?,
            Primitive::Storew => self.store(op, Width::Word)?,
            Primitive::Storeh => self.store(op, Width::Half)?,
            Primitive::Storeb => self.store(op, Width::Byte)?,
        }
        Ok(())
    }

    /// `( a b -- a op b )` over integers.
    fn binary(
        &mut self,
        op: &'static str,
        f: impl FnOnce(u64, u64) -> Result<u64, Error>,
    ) -> Result<(), Error> {
        let [a, b] = self.arena.peek_n::<2>(op)?;
        let result = f(integer(op, a)?, integer(op, b)?)?;
        self.arena.pop_n::<2>(op)?;
        self.arena.push(Value::Integer(result))
    }

    /// `( addr -- value )`
    fn load(&mut self, op: &'static str, width: Width) -> Result<(), Error> {
        let addr = integer(op, self.arena.peek(op)?)?;
        let value = self.bus.load(addr, width)?;
        self.arena.pop(op)?;
        self.arena.push(Value::Integer(value))
    }

    /// `( value addr -- )`
    fn store(&mut self, op: &'static str, width: Width) -> Result<(), Error> {
        let [value, addr] = self.arena.peek_n::<2>(op)?;
        self.bus
            .store(integer(op, addr)?, width, integer(op, value)?)?;
        self.arena.pop_n::<2>(op)?;
        Ok(())
    }
}
