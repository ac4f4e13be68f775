pub mod arena;
mod error;
pub mod lexer;
pub mod port;
pub mod printer;
pub mod reader;
pub mod runtime;

pub use arena::{Layout, Tag, Value};
pub use error::Error;
pub use port::{Console, StdConsole, TextBufferConsole};
pub use runtime::{
    bus::{BusConfig, MemoryBus, Width},
    primitives::Primitive,
    Runtime, RuntimeConfig, Stats,
};
