//! The runtime context: one arena, one reader, one console, one bus
//!
//! Everything the interpreter mutates lives in a single [`Runtime`] value
//! that is built once and then driven form by form. The only ways a run ends
//! are running out of input or the first [`Error`].
use tracing::warn;

use crate::{
    arena::{Arena, ArenaStats, Layout, NameRef, Value},
    port::Console,
    printer::{print_value, DEFAULT_PRINT_DEPTH},
    reader::{Datum, Reader},
    Error,
};

pub mod bus;
mod environment;
mod interpreter;
pub mod primitives;

use self::{
    bus::{BusConfig, MemoryBus, RawBus, SandboxBus},
    primitives::Primitive,
};

/// Names the reader and the interpreter treat specially.
#[derive(Clone, Copy, Debug)]
pub struct WellKnown {
    pub quote: NameRef,
    /// The true value produced by `eq`.
    pub t: NameRef,
    pub push: NameRef,
    pub pops: NameRef,
    pub pope: NameRef,
}

impl WellKnown {
    pub fn intern(arena: &mut Arena) -> Result<Self, Error> {
        Ok(Self {
            t: arena.intern(b"t")?,
            quote: arena.intern(b"quote")?,
            push: arena.intern(Primitive::Push.name().as_bytes())?,
            pops: arena.intern(Primitive::Pops.name().as_bytes())?,
            pope: arena.intern(Primitive::Pope.name().as_bytes())?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub layout: Layout,
    /// Nesting beyond this prints as `...`.
    pub print_depth: usize,
    pub bus: BusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            print_depth: DEFAULT_PRINT_DEPTH,
            bus: BusConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub collections: u32,
    pub live_cells: usize,
    pub dictionary_bytes: usize,
    pub max_stack_depth: usize,
    pub return_depth: usize,
    pub max_return_depth: usize,
}

pub struct Runtime<C> {
    arena: Arena,
    reader: Reader,
    console: C,
    bus: Box<dyn MemoryBus>,
    known: WellKnown,
    print_depth: usize,
    return_depth: usize,
    max_return_depth: usize,
}

impl<C: Console> Runtime<C> {
    /// Build a runtime with a sandboxed memory bus.
    ///
    /// A [`BusConfig::Raw`] configuration is refused here; raw access has
    /// to be opted into through [`Runtime::new_raw`].
    pub fn new(config: RuntimeConfig, console: C) -> Result<Self, Error> {
        let bus: Box<dyn MemoryBus> = match config.bus {
            BusConfig::Sandbox { bytes } => Box::new(SandboxBus::new(bytes)),
            BusConfig::Raw => return Err(Error::RawBusRefused),
        };
        Self::with_bus(config, console, bus)
    }

    /// Build a runtime whose `load`/`store` primitives touch host memory.
    ///
    /// # Safety
    ///
    /// See [`RawBus::new`]: the program decides which addresses get
    /// accessed, so it must be trusted with the whole address space.
    pub unsafe fn new_raw(config: RuntimeConfig, console: C) -> Result<Self, Error> {
        Self::with_bus(config, console, Box::new(RawBus::new()))
    }

    pub fn with_bus(
        config: RuntimeConfig,
        console: C,
        bus: Box<dyn MemoryBus>,
    ) -> Result<Self, Error> {
        let mut arena = Arena::new(config.layout);
        let known = WellKnown::intern(&mut arena)?;

        // the root environment binds every primitive under its name
        for &prim in Primitive::ALL {
            let name = arena.intern(prim.name().as_bytes())?;
            let env = arena.roots.env;
            arena.roots.env =
                environment::extend(&mut arena, env, name, Value::Primitive(prim))?;
        }

        Ok(Self {
            arena,
            reader: Reader::new(),
            console,
            bus,
            known,
            print_depth: config.print_depth,
            return_depth: 0,
            max_return_depth: 0,
        })
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn stats(&self) -> Stats {
        let ArenaStats {
            collections,
            live_cells,
            dictionary_bytes,
            max_stack_depth,
        } = self.arena.stats();
        Stats {
            collections,
            live_cells,
            dictionary_bytes,
            max_stack_depth,
            return_depth: self.return_depth,
            max_return_depth: self.max_return_depth,
        }
    }

    /// Force a collection.
    pub fn collect(&mut self) {
        self.arena.collect();
    }

    /// Read and evaluate forms until the input runs out.
    ///
    /// Running out of input is the normal way for a session to end. Any
    /// other error is reported through the console's error channel, along
    /// with the evaluation stack, and returned.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            match self.eval_next() {
                Ok(()) => {}
                Err(Error::EndOfInput) => {
                    self.console.flush()?;
                    return Ok(());
                }
                Err(error) => {
                    self.report(&error)?;
                    return Err(error);
                }
            }
        }
    }

    /// Read one top-level form and run it to completion.
    pub fn eval_next(&mut self) -> Result<(), Error> {
        let value = self.read_value()?;
        self.evaluate(value)?;
        self.console.flush()?;
        Ok(())
    }

    fn read_value(&mut self) -> Result<Value, Error> {
        match self
            .reader
            .read(&mut self.arena, &mut self.console, &self.known)?
        {
            Datum::Value(value) => Ok(value),
            Datum::Close => Err(Error::UnmatchedCloseParen),
        }
    }

    /// Append the printed form of the evaluation stack, bottom first, one
    /// value per line.
    fn dump_stack(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        for &value in self.arena.stack() {
            print_value(&self.arena, value, self.print_depth, out)?;
            out.push(b'\n');
        }
        Ok(())
    }

    fn report(&mut self, error: &Error) -> Result<(), Error> {
        warn!(%error, depth = self.arena.stack().len(), "panic");
        let mut message = format!("PANIC: {error}\n").into_bytes();
        // a dump that fails half way is still worth showing
        _ = self.dump_stack(&mut message);
        self.console.report_error(&message)?;
        Ok(())
    }
}
