//! Two-space cell heap and its copying collector
//!
//! Cells are bump allocated out of the active space. A collection swaps the
//! spaces, evacuates whatever the caller hands it as roots, then walks the
//! freshly copied cells with a trailing scan pointer (Cheney) until nothing
//! is left to evacuate. Cycles terminate because an evacuated cell leaves a
//! forwarding slot behind.
use super::value::{CellRef, Closure, Value};
use crate::Error;

#[derive(Clone, Copy, Debug)]
enum Slot {
    Pair(Value, Value),
    Forward(u32),
}

pub struct Heap {
    /// active space, allocation happens here
    from: Vec<Slot>,
    /// evacuated space, only meaningful during a collection
    to: Vec<Slot>,
    /// cells per semi-space
    capacity: usize,
    epoch: u32,
}

impl Heap {
    pub fn new(capacity: usize) -> Self {
        Self {
            from: Vec::with_capacity(capacity),
            to: Vec::with_capacity(capacity),
            capacity,
            epoch: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn live(&self) -> usize {
        self.from.len()
    }

    pub fn free(&self) -> usize {
        self.capacity - self.from.len()
    }

    /// Number of completed collections.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Bump allocate a cell. Never collects.
    pub fn alloc(&mut self, car: Value, cdr: Value) -> Result<CellRef, Error> {
        if self.from.len() >= self.capacity {
            return Err(Error::OutOfMemory);
        }
        let index = self.from.len() as u32;
        self.from.push(Slot::Pair(car, cdr));
        Ok(CellRef {
            index,
            epoch: self.epoch,
        })
    }

    fn slot(&self, cell: CellRef) -> Result<&Slot, Error> {
        if cell.epoch != self.epoch {
            return Err(Error::StaleReference);
        }
        self.from
            .get(cell.index as usize)
            .ok_or(Error::StaleReference)
    }

    fn slot_mut(&mut self, cell: CellRef) -> Result<&mut Slot, Error> {
        if cell.epoch != self.epoch {
            return Err(Error::StaleReference);
        }
        self.from
            .get_mut(cell.index as usize)
            .ok_or(Error::StaleReference)
    }

    pub fn get(&self, cell: CellRef) -> Result<(Value, Value), Error> {
        match self.slot(cell)? {
            Slot::Pair(car, cdr) => Ok((*car, *cdr)),
            Slot::Forward(_) => Err(Error::StaleReference),
        }
    }

    pub fn set_car(&mut self, cell: CellRef, value: Value) -> Result<(), Error> {
        match self.slot_mut(cell)? {
            Slot::Pair(car, _) => {
                *car = value;
                Ok(())
            }
            Slot::Forward(_) => Err(Error::StaleReference),
        }
    }

    pub fn set_cdr(&mut self, cell: CellRef, value: Value) -> Result<(), Error> {
        match self.slot_mut(cell)? {
            Slot::Pair(_, cdr) => {
                *cdr = value;
                Ok(())
            }
            Slot::Forward(_) => Err(Error::StaleReference),
        }
    }

    /// Swap the spaces and start evacuating. Every root must be passed
    /// through [`Collection::copy`] before [`Collection::finish`] runs;
    /// anything else still holding an old handle is stale afterwards.
    pub fn begin_collection(&mut self) -> Collection<'_> {
        std::mem::swap(&mut self.from, &mut self.to);
        self.from.clear();
        self.epoch = self.epoch.wrapping_add(1);
        Collection { heap: self }
    }
}

pub struct Collection<'h> {
    heap: &'h mut Heap,
}

impl<'h> Collection<'h> {
    /// Relocate a root, returning its new value.
    pub fn copy(&mut self, value: Value) -> Value {
        match value {
            Value::Cons(cell) => Value::Cons(self.evacuate(cell)),
            Value::Procedure(closure) => Value::Procedure(Closure {
                body: closure.body.map(|cell| self.evacuate(cell)),
                env: closure.env.map(|cell| self.evacuate(cell)),
            }),
            other => other,
        }
    }

    fn evacuate(&mut self, cell: CellRef) -> CellRef {
        let epoch = self.heap.epoch;
        if cell.epoch == epoch {
            // already relocated, e.g. the same root handed over twice
            return cell;
        }
        debug_assert_eq!(cell.epoch, epoch.wrapping_sub(1), "stale root");

        let old = cell.index as usize;
        let index = match self.heap.to[old] {
            Slot::Forward(index) => index,
            pair @ Slot::Pair(..) => {
                let index = self.heap.from.len() as u32;
                self.heap.from.push(pair);
                self.heap.to[old] = Slot::Forward(index);
                index
            }
        };
        CellRef { index, epoch }
    }

    /// Scan the copied cells, evacuating their children, until the scan
    /// pointer catches up with the allocation pointer.
    pub fn finish(mut self) {
        let mut scan = 0;
        while scan < self.heap.from.len() {
            if let Slot::Pair(car, cdr) = self.heap.from[scan] {
                let car = self.copy(car);
                let cdr = self.copy(cdr);
                self.heap.from[scan] = Slot::Pair(car, cdr);
            }
            scan += 1;
        }
        self.heap.to.clear();
    }
}
