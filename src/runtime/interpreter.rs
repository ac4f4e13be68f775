//! The trampoline
//!
//! Calling a procedure never recurses on the host stack. Instead the callee
//! becomes a frame on the return stack, a heap list rooted in
//! [`Roots::frames`](crate::arena::Roots), and [`Runtime::step`] executes one
//! body element of the innermost frame at a time.
//!
//! A frame is a procedure value whose body is the part still to run and
//! whose environment is the one that part runs in. The position is committed
//! *before* the element is dispatched, so primitives that push or pop frames
//! themselves always see a caller that already points past them.
//!
//! When the element being dispatched is the last one of its body, the frame
//! has nothing left to return to. Installing a procedure there replaces the
//! frame instead of pushing a new one, which keeps the return stack as deep
//! as the dynamic nesting of calls and no deeper.
use tracing::trace;

use super::{environment, Runtime};
use crate::{
    arena::{CellRef, Closure, Tag, Value},
    port::Console,
    Error,
};

impl<C: Console> Runtime<C> {
    /// Evaluate a top-level form, then run the frames it installed to
    /// completion.
    pub(super) fn evaluate(&mut self, value: Value) -> Result<(), Error> {
        match value {
            // outside any body the quoted datum is the next thing read
            Value::Symbol(name) if self.arena.same_name(name, self.known.quote) => {
                let datum = self.read_value()?;
                self.arena.push(datum)?;
            }
            value => self.dispatch(value, false)?,
        }
        while self.step()? {}
        Ok(())
    }

    /// The innermost frame: its cell on the return stack and its procedure.
    fn top_frame(&self) -> Result<Option<(CellRef, Closure)>, Error> {
        let Value::Cons(top) = self.arena.roots.frames else {
            return Ok(None);
        };
        match self.arena.car(top)? {
            Value::Procedure(closure) => Ok(Some((top, closure))),
            _ => Err(Error::CorruptFrame),
        }
    }

    /// Run one body element of the innermost frame. `false` once the return
    /// stack is empty.
    pub(super) fn step(&mut self) -> Result<bool, Error> {
        let Some((top, frame)) = self.top_frame()? else {
            return Ok(false);
        };

        let Some(position) = frame.body else {
            // body exhausted: return to the caller
            self.arena.roots.frames = self.arena.cdr(top)?;
            self.return_depth = self.return_depth.saturating_sub(1);
            trace!(depth = self.return_depth, "return");
            return Ok(true);
        };

        let (element, rest) = self.arena.pair(position)?;
        let rest = rest.as_list().ok_or(Error::CorruptFrame)?;

        if matches!(element, Value::Symbol(name) if self.arena.same_name(name, self.known.quote)) {
            let quoted = rest.ok_or(Error::MissingQuotedDatum)?;
            let (datum, after) = self.arena.pair(quoted)?;
            let after = after.as_list().ok_or(Error::CorruptFrame)?;
            self.commit(top, frame, after)?;
            self.arena.push(datum)?;
            return Ok(true);
        }

        self.commit(top, frame, rest)?;
        self.dispatch(element, rest.is_none())?;
        Ok(true)
    }

    fn commit(&mut self, top: CellRef, frame: Closure, body: Option<CellRef>) -> Result<(), Error> {
        self.arena
            .set_car(top, Value::Procedure(Closure { body, ..frame }))
    }

    /// Act on a value found in code. `tail` is set when nothing is left to
    /// run after it in the current frame.
    fn dispatch(&mut self, value: Value, tail: bool) -> Result<(), Error> {
        let value = match value {
            Value::Symbol(name) => {
                let env = self.current_env()?;
                match environment::lookup(&self.arena, env, name)? {
                    // a symbol bound to a symbol is data
                    symbol @ Value::Symbol(_) => return self.arena.push(symbol),
                    bound => bound,
                }
            }
            value => value,
        };

        match value {
            Value::Nil | Value::Integer(_) | Value::Symbol(_) => self.arena.push(value),
            // code is data until installed: close over where it was found
            Value::Cons(body) => {
                let env = self.current_env()?;
                let env = env
                    .as_list()
                    .ok_or(Error::mismatch("env", Tag::Cons, env.tag()))?;
                self.arena.push(Value::Procedure(Closure {
                    body: Some(body),
                    env,
                }))
            }
            Value::Procedure(closure) => self.install(closure, tail),
            Value::Primitive(prim) => self.invoke(prim),
        }
    }

    fn install(&mut self, closure: Closure, tail: bool) -> Result<(), Error> {
        if tail {
            if let Some((top, _)) = self.top_frame()? {
                self.arena.set_car(top, Value::Procedure(closure))?;
                trace!(depth = self.return_depth, "tail call");
                return Ok(());
            }
        }
        self.push_frame(closure)
    }

    pub(super) fn push_frame(&mut self, closure: Closure) -> Result<(), Error> {
        let frames = self.arena.roots.frames;
        let cell = self.arena.cons(Value::Procedure(closure), frames)?;
        self.arena.roots.frames = Value::Cons(cell);
        self.return_depth += 1;
        self.max_return_depth = self.max_return_depth.max(self.return_depth);
        trace!(depth = self.return_depth, "call");
        Ok(())
    }

    /// Discard the innermost frame.
    pub(super) fn pop_frame(&mut self) -> Result<(), Error> {
        let Some((top, _)) = self.top_frame()? else {
            return Err(Error::ReturnStackUnderflow);
        };
        self.arena.roots.frames = self.arena.cdr(top)?;
        self.return_depth = self.return_depth.saturating_sub(1);
        trace!(depth = self.return_depth, "early return");
        Ok(())
    }

    /// The environment of the innermost frame, or the root environment when
    /// no frame is running.
    pub(super) fn current_env(&self) -> Result<Value, Error> {
        Ok(match self.top_frame()? {
            Some((_, frame)) => frame.env(),
            None => self.arena.roots.env,
        })
    }

    pub(super) fn set_current_env(&mut self, env: Value) -> Result<(), Error> {
        match self.top_frame()? {
            Some((top, frame)) => {
                let env = env
                    .as_list()
                    .ok_or(Error::mismatch("env", Tag::Cons, env.tag()))?;
                self.arena
                    .set_car(top, Value::Procedure(Closure { env, ..frame }))
            }
            None => {
                self.arena.roots.env = env;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use crate::{
        arena::Layout,
        port::StdConsole,
        runtime::{Runtime, RuntimeConfig},
        Error,
    };

    type TestRuntime = Runtime<StdConsole<&'static [u8], Vec<u8>, Vec<u8>>>;

    fn runtime(source: &'static str, memory_words: usize) -> TestRuntime {
        let console = StdConsole::new(source.as_bytes(), Vec::new(), Vec::new());
        let config = RuntimeConfig {
            layout: Layout { memory_words },
            ..RuntimeConfig::default()
        };
        Runtime::new(config, console).unwrap()
    }

    fn finish(runtime: TestRuntime) -> String {
        let (_, output, _) = runtime.into_console().into_parts();
        String::from_utf8(output).unwrap()
    }

    fn output(source: &'static str) -> String {
        let mut runtime = runtime(source, 1 << 16);
        let_assert!(Ok(()) = runtime.run());
        finish(runtime)
    }

    #[test]
    fn literal_lists_become_closures() {
        check!(output("(1 2) print") == "[1 2]\n");
        check!(output("'(1 2) print") == "(1 2)\n");
    }

    #[test]
    fn installing_runs_the_body() {
        check!(output("(1 2 add print) :three three three") == "3\n3\n");
    }

    #[test]
    fn quote_inside_a_body_skips_evaluation() {
        check!(output("('add print) :p p") == "add\n");
        check!(output("((quote) print) :p p") == "[quote]\n");
    }

    #[test]
    fn quote_at_the_end_of_a_body() {
        let mut runtime = runtime("(1 quote) :p p", 1 << 16);
        let_assert!(Err(Error::MissingQuotedDatum) = runtime.run());
    }

    #[test]
    fn symbols_bound_to_symbols_are_pushed() {
        check!(output("'b :a a print") == "b\n");
    }

    #[test]
    fn extend_is_local_to_the_frame() {
        // the inner binding disappears with the frame that made it
        check!(output("1 :x (2 :x $x print) :f f $x print") == "2\n1\n");
    }

    #[test]
    fn set_reaches_the_shared_binding() {
        check!(output("1 :x (2 ^x) :f f $x print") == "2\n");
    }

    #[test]
    fn closures_capture_their_environment() {
        let source = "(:x ($x print)) :make-printer 7 make-printer :p 8 make-printer :q p q";
        check!(output(source) == "7\n8\n");
    }

    #[test]
    fn conditionals_with_cswap() {
        let source = "(:f f) :force \
                      (:n ('small print) ('big print) $n 10 eq cswap drop force) :check \
                      10 check 3 check";
        check!(output(source) == "big\nsmall\n");
    }

    #[test]
    fn tail_calls_run_in_constant_depth() {
        let source = "(:f f) :force \
                      () :count \
                      ( :n ($n 1 add count) ($n print) $n 10000 eq cswap drop force ) ^count \
                      0 count";
        let mut runtime = runtime(source, 1 << 16);
        let_assert!(Ok(()) = runtime.run());
        let stats = runtime.stats();
        check!(stats.max_return_depth <= 2);
        check!(stats.return_depth == 0);
        check!(stats.collections > 0);
        check!(finish(runtime) == "10000\n");
    }

    #[test]
    fn non_tail_recursion_grows_the_return_stack() {
        let source = "(:f f) :force \
                      () :down \
                      ( :n ($n 1 sub down $n drop) () $n 0 eq cswap drop force ) ^down \
                      50 down 'done print";
        let mut runtime = runtime(source, 1 << 16);
        let_assert!(Ok(()) = runtime.run());
        check!(runtime.stats().max_return_depth > 50);
        check!(finish(runtime) == "done\n");
    }

    #[test]
    fn frames_survive_collections() {
        // a tiny heap forces collections while frames are live
        let source = "(:f f) :force \
                      (:a (:b ($a $b add print) force) force) :outer \
                      1 2 outer 3 4 outer 5 6 outer 7 8 outer 9 10 outer 11 12 outer";
        let mut runtime = runtime(source, 1 << 10);
        let_assert!(Ok(()) = runtime.run());
        check!(runtime.stats().collections > 0);
        check!(finish(runtime) == "3\n7\n11\n15\n19\n23\n");
    }

    #[test]
    fn unbound_symbol_is_fatal() {
        let mut runtime = runtime("1 2 frobnicate", 1 << 16);
        let_assert!(Err(Error::Unbound { name, during: "lookup" }) = runtime.run());
        check!(name == "frobnicate");
        let (_, _, errors) = runtime.into_console().into_parts();
        check!(String::from_utf8(errors).unwrap() == "PANIC: frobnicate: undefined symbol (lookup)\n1\n2\n");
    }

    #[test]
    fn runaway_pushes_overflow_the_stack() {
        let mut runtime = runtime("() :loop (1 loop) ^loop loop", 1 << 12);
        let_assert!(Err(Error::StackOverflow) = runtime.run());
    }
}
