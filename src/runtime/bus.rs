//! Raw memory access for the `load`/`store` family of primitives
//!
//! On bare metal these are real loads and stores, the escape hatch for
//! memory-mapped devices. A hosted runtime gets a sandbox instead: a zeroed
//! byte array with bounds checks, so a stray address is a [`Error::BusFault`]
//! rather than a segfault.
use core::fmt;

use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
    Double,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
            Width::Double => 8,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bytes() * 8)
    }
}

pub trait MemoryBus {
    /// Load `width` bytes at `addr`, zero extended.
    fn load(&mut self, addr: u64, width: Width) -> Result<u64, Error>;
    /// Store the low `width` bytes of `value` at `addr`.
    fn store(&mut self, addr: u64, width: Width, value: u64) -> Result<(), Error>;
}

impl<B: MemoryBus + ?Sized> MemoryBus for Box<B> {
    fn load(&mut self, addr: u64, width: Width) -> Result<u64, Error> {
        (**self).load(addr, width)
    }

    fn store(&mut self, addr: u64, width: Width, value: u64) -> Result<(), Error> {
        (**self).store(addr, width, value)
    }
}

/// Which bus a runtime gets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusConfig {
    /// A private little-endian byte array of the given size.
    Sandbox { bytes: usize },
    /// Unchecked volatile access to the host address space.
    Raw,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig::Sandbox { bytes: 0x1000 }
    }
}

pub struct SandboxBus {
    memory: Vec<u8>,
}

impl SandboxBus {
    pub fn new(bytes: usize) -> Self {
        Self {
            memory: vec![0; bytes],
        }
    }

    fn range(&self, addr: u64, width: Width) -> Result<core::ops::Range<usize>, Error> {
        let fault = || Error::BusFault { addr, width };
        let start = usize::try_from(addr).map_err(|_| fault())?;
        let end = start.checked_add(width.bytes()).ok_or_else(fault)?;
        if end > self.memory.len() {
            return Err(fault());
        }
        Ok(start..end)
    }
}

impl MemoryBus for SandboxBus {
    fn load(&mut self, addr: u64, width: Width) -> Result<u64, Error> {
        let range = self.range(addr, width)?;
        let mut bytes = [0u8; 8];
        bytes[..width.bytes()].copy_from_slice(&self.memory[range]);
        Ok(u64::from_le_bytes(bytes))
    }

    fn store(&mut self, addr: u64, width: Width, value: u64) -> Result<(), Error> {
        let range = self.range(addr, width)?;
        self.memory[range].copy_from_slice(&value.to_le_bytes()[..width.bytes()]);
        Ok(())
    }
}

/// Direct access to whatever lives at the given addresses.
pub struct RawBus {
    _private: (),
}

impl RawBus {
    /// # Safety
    ///
    /// Every address a program loads from or stores to must be valid for an
    /// access of that width, suitably aligned, and not aliased by anything the
    /// host relies on. Programs are untrusted input, so this is only sound on
    /// a machine the program is meant to own.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl MemoryBus for RawBus {
    fn load(&mut self, addr: u64, width: Width) -> Result<u64, Error> {
        let addr = addr as usize;
        // SAFETY: the constructor's contract covers every program address
        let value = unsafe {
            match width {
                Width::Byte => u64::from((addr as *const u8).read_volatile()),
                Width::Half => u64::from((addr as *const u16).read_volatile()),
                Width::Word => u64::from((addr as *const u32).read_volatile()),
                Width::Double => (addr as *const u64).read_volatile(),
            }
        };
        Ok(value)
    }

    fn store(&mut self, addr: u64, width: Width, value: u64) -> Result<(), Error> {
        let addr = addr as usize;
        // SAFETY: as for `load`
        unsafe {
            match width {
                Width::Byte => (addr as *mut u8).write_volatile(value as u8),
                Width::Half => (addr as *mut u16).write_volatile(value as u16),
                Width::Word => (addr as *mut u32).write_volatile(value as u32),
                Width::Double => (addr as *mut u64).write_volatile(value),
            }
        }
        Ok(())
    }
}
