//! The fixed-size memory every runtime structure lives in
//!
//! The arena is sized once, from a [`Layout`], and never grows. Its lower
//! half holds the dictionary (growing up) and the evaluation stack (growing
//! down towards it); its upper half is the cell heap, split into two
//! semi-spaces for the copying collector.
//!
//! # Rooting
//!
//! Collection relocates every live cell, so a [`CellRef`] held in a local
//! variable across an allocation would dangle. The arena rules this out by
//! construction:
//!
//! - [`Arena::reserve`] is the only place a collection can happen. It
//!   rewrites the declared [`Roots`], the evaluation stack, and whatever
//!   extra values the caller hands it.
//! - [`Arena::alloc`] never collects; without prior room it fails with
//!   [`Error::OutOfMemory`].
//!
//! So a multi-cell construction reserves everything up front and then
//! allocates freely. Handles are also epoch checked, so a handle that slipped
//! past a collection is reported as [`Error::StaleReference`] instead of
//! aliasing a different cell.
mod dictionary;
mod heap;
mod value;

use tracing::debug;

pub use self::value::{CellRef, Closure, NameRef, Tag, Value};
use self::{dictionary::Dictionary, heap::Heap};
use crate::Error;

/// Words per evaluation stack entry: one for the tag, one for the payload.
const STACK_ENTRY_WORDS: usize = 2;
/// Words per heap cell.
const CELL_WORDS: usize = 2;
const WORD_BYTES: usize = 8;

/// Sizing of the arena, fixed for the life of a runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    /// Total size in 8-byte words.
    pub memory_words: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            memory_words: 1 << 16,
        }
    }
}

impl Layout {
    /// Words shared by the dictionary and the evaluation stack.
    pub fn lower_words(&self) -> usize {
        self.memory_words / 2
    }

    /// Cells in one semi-space.
    pub fn semispace_cells(&self) -> usize {
        (self.memory_words - self.lower_words()) / 2 / CELL_WORDS
    }
}

/// Everything the collector must treat as live besides the evaluation stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct Roots {
    /// The top-level environment.
    pub env: Value,
    /// The return stack: a list of frame procedures, innermost first.
    pub frames: Value,
    /// Datums the reader has synthesized but not handed out yet.
    pub pending: Value,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub collections: u32,
    pub live_cells: usize,
    pub dictionary_bytes: usize,
    pub max_stack_depth: usize,
}

pub struct Arena {
    layout: Layout,
    heap: Heap,
    dictionary: Dictionary,
    stack: Vec<Value>,
    max_stack_depth: usize,
    pub roots: Roots,
}

impl Arena {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            heap: Heap::new(layout.semispace_cells()),
            dictionary: Dictionary::new(),
            stack: Vec::new(),
            max_stack_depth: 0,
            roots: Roots::default(),
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            collections: self.heap.epoch(),
            live_cells: self.heap.live(),
            dictionary_bytes: self.dictionary.len(),
            max_stack_depth: self.max_stack_depth,
        }
    }

    fn dictionary_words(bytes: usize) -> usize {
        bytes.div_ceil(WORD_BYTES)
    }

    // --- evaluation stack

    pub fn push(&mut self, value: Value) -> Result<(), Error> {
        let words = Self::dictionary_words(self.dictionary.len())
            + (self.stack.len() + 1) * STACK_ENTRY_WORDS;
        if words > self.layout.lower_words() {
            return Err(Error::StackOverflow);
        }
        self.stack.push(value);
        self.max_stack_depth = self.max_stack_depth.max(self.stack.len());
        Ok(())
    }

    pub fn pop(&mut self, op: &'static str) -> Result<Value, Error> {
        self.stack.pop().ok_or(Error::StackUnderflow { op })
    }

    /// Copy the top `N` values, bottom first, leaving them in place.
    pub fn peek_n<const N: usize>(&self, op: &'static str) -> Result<[Value; N], Error> {
        let base = self
            .stack
            .len()
            .checked_sub(N)
            .ok_or(Error::StackUnderflow { op })?;
        let mut out = [Value::Nil; N];
        out.copy_from_slice(&self.stack[base..]);
        Ok(out)
    }

    /// Pop `N` values, returned bottom first.
    pub fn pop_n<const N: usize>(&mut self, op: &'static str) -> Result<[Value; N], Error> {
        let out = self.peek_n::<N>(op)?;
        self.stack.truncate(self.stack.len() - N);
        Ok(out)
    }

    pub fn peek(&self, op: &'static str) -> Result<Value, Error> {
        self.stack.last().copied().ok_or(Error::StackUnderflow { op })
    }

    /// The live evaluation stack, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    // --- dictionary

    /// Find or append `name`.
    pub fn intern(&mut self, name: &[u8]) -> Result<NameRef, Error> {
        if let Some(found) = self.dictionary.find(name) {
            return Ok(found);
        }
        let words = Self::dictionary_words(self.dictionary.len_with(name))
            + self.stack.len() * STACK_ENTRY_WORDS;
        if words > self.layout.lower_words() {
            return Err(Error::DictionaryFull);
        }
        let offset = self.dictionary.append(name);
        debug!(
            name = %String::from_utf8_lossy(name),
            bytes = self.dictionary.len(),
            "dictionary grew"
        );
        Ok(offset)
    }

    pub fn name(&self, name: NameRef) -> &[u8] {
        self.dictionary.name(name)
    }

    pub fn name_lossy(&self, name: NameRef) -> String {
        String::from_utf8_lossy(self.name(name)).into_owned()
    }

    /// Symbols match by name content. Interning makes identical names share
    /// an offset, so the offset comparison is only a shortcut.
    pub fn same_name(&self, a: NameRef, b: NameRef) -> bool {
        a == b || self.name(a) == self.name(b)
    }

    // --- heap

    /// Make sure `cells` allocations will succeed, collecting if needed.
    ///
    /// Values in `extra` are treated as roots and rewritten in place; any
    /// other handle the caller still holds is stale once this returns.
    pub fn reserve(&mut self, cells: usize, extra: &mut [&mut Value]) -> Result<(), Error> {
        if self.heap.free() >= cells {
            return Ok(());
        }
        self.collect_with(extra);
        if self.heap.free() < cells {
            return Err(Error::OutOfMemory);
        }
        Ok(())
    }

    /// Allocate a cell out of previously reserved room. Never collects.
    pub fn alloc(&mut self, car: Value, cdr: Value) -> Result<CellRef, Error> {
        self.heap.alloc(car, cdr)
    }

    /// Allocate one cell, collecting first if the semi-space is full.
    pub fn cons(&mut self, mut car: Value, mut cdr: Value) -> Result<CellRef, Error> {
        self.reserve(1, &mut [&mut car, &mut cdr])?;
        self.alloc(car, cdr)
    }

    pub fn pair(&self, cell: CellRef) -> Result<(Value, Value), Error> {
        self.heap.get(cell)
    }

    pub fn car(&self, cell: CellRef) -> Result<Value, Error> {
        Ok(self.heap.get(cell)?.0)
    }

    pub fn cdr(&self, cell: CellRef) -> Result<Value, Error> {
        Ok(self.heap.get(cell)?.1)
    }

    pub fn set_car(&mut self, cell: CellRef, value: Value) -> Result<(), Error> {
        self.heap.set_car(cell, value)
    }

    pub fn set_cdr(&mut self, cell: CellRef, value: Value) -> Result<(), Error> {
        self.heap.set_cdr(cell, value)
    }

    /// Force a collection.
    pub fn collect(&mut self) {
        self.collect_with(&mut []);
    }

    fn collect_with(&mut self, extra: &mut [&mut Value]) {
        let before = self.heap.live();
        let mut gc = self.heap.begin_collection();

        self.roots.env = gc.copy(self.roots.env);
        self.roots.frames = gc.copy(self.roots.frames);
        self.roots.pending = gc.copy(self.roots.pending);
        for value in self.stack.iter_mut() {
            *value = gc.copy(*value);
        }
        for value in extra.iter_mut() {
            **value = gc.copy(**value);
        }
        gc.finish();

        debug!(
            before,
            after = self.heap.live(),
            capacity = self.heap.capacity(),
            collections = self.heap.epoch(),
            "collected"
        );
    }

    /// Build a proper list out of `values`, first element at the head.
    pub fn list(&mut self, values: &mut [Value]) -> Result<Value, Error> {
        {
            let mut extra: Vec<&mut Value> = values.iter_mut().collect();
            self.reserve(extra.len(), &mut extra)?;
        }
        let mut list = Value::Nil;
        for value in values.iter().rev() {
            list = Value::Cons(self.alloc(*value, list)?);
        }
        Ok(list)
    }

    /// Structural equality: cons cells are compared by contents, every other
    /// value by tag and payload.
    pub fn equal(&self, a: Value, b: Value) -> Result<bool, Error> {
        let mut work = vec![(a, b)];
        while let Some((a, b)) = work.pop() {
            match (a, b) {
                (Value::Cons(a), Value::Cons(b)) => {
                    let (a_car, a_cdr) = self.pair(a)?;
                    let (b_car, b_cdr) = self.pair(b)?;
                    work.push((a_cdr, b_cdr));
                    work.push((a_car, b_car));
                }
                (Value::Symbol(a), Value::Symbol(b)) => {
                    if !self.same_name(a, b) {
                        return Ok(false);
                    }
                }
                (a, b) => {
                    if a != b {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use arbitrary::Arbitrary;
    use arbtest::arbtest;
    use assert2::{assert, check, let_assert};

    use super::{Arena, Layout, Value};
    use crate::Error;

    fn small() -> Arena {
        // 64 words: 32 below the midpoint, 8 cells per semi-space
        Arena::new(Layout { memory_words: 64 })
    }

    #[test]
    fn layout_splits_memory() {
        let layout = Layout { memory_words: 4096 };
        check!(layout.lower_words() == 2048);
        check!(layout.semispace_cells() == 512);
    }

    #[test]
    fn stack_overflows_into_dictionary() {
        let mut arena = small();
        for n in 0..16 {
            arena.push(Value::Integer(n)).unwrap();
        }
        let_assert!(Err(Error::StackOverflow) = arena.push(Value::Nil));
        check!(arena.stats().max_stack_depth == 16);
    }

    #[test]
    fn dictionary_fills_up_against_stack() {
        let mut arena = small();
        for n in 0..15 {
            arena.push(Value::Integer(n)).unwrap();
        }
        // 30 words of stack leave 16 bytes of dictionary
        arena.intern(b"abcdefg").unwrap();
        arena.intern(b"hijklmn").unwrap();
        let_assert!(Err(Error::DictionaryFull) = arena.intern(b"o"));
        // already present names never need room
        assert!(arena.intern(b"abcdefg").is_ok());
    }

    #[test]
    fn interning_deduplicates() {
        let mut arena = small();
        let a = arena.intern(b"dup").unwrap();
        let b = arena.intern(b"dup").unwrap();
        check!(a == b);
        check!(arena.stats().dictionary_bytes == 4);
        check!(arena.name_lossy(a) == "dup");
    }

    #[test]
    fn underflow_names_the_operation() {
        let mut arena = small();
        let_assert!(Err(Error::StackUnderflow { op: "drop" }) = arena.pop("drop"));
        arena.push(Value::Integer(1)).unwrap();
        let_assert!(Err(Error::StackUnderflow { op: "add" }) = arena.pop_n::<2>("add"));
        check!(arena.stack() == [Value::Integer(1)]);
    }

    #[test]
    fn allocation_collects_unreachable_cells() {
        let mut arena = small();
        let kept = arena.cons(Value::Integer(1), Value::Nil).unwrap();
        arena.push(Value::Cons(kept)).unwrap();
        for n in 0..100 {
            arena.cons(Value::Integer(n), Value::Nil).unwrap();
        }
        check!(arena.stats().collections > 0);

        let_assert!(Ok(Value::Cons(kept)) = arena.pop("test"));
        let_assert!(Ok((Value::Integer(1), Value::Nil)) = arena.pair(kept));
    }

    #[test]
    fn cons_roots_its_operands() {
        let mut arena = small();
        let mut list = Value::Nil;
        for n in 0..4 {
            list = Value::Cons(arena.cons(Value::Integer(n), list).unwrap());
        }
        for n in 0..4 {
            arena.cons(Value::Integer(n), Value::Nil).unwrap();
        }
        // the semi-space is full now; only `list` keeps its cells alive
        let cell = arena.cons(Value::Integer(4), list).unwrap();
        let_assert!(Ok((Value::Integer(4), Value::Cons(next))) = arena.pair(cell));
        let_assert!(Ok((Value::Integer(3), _)) = arena.pair(next));
        check!(arena.stats().live_cells == 5);
        check!(arena.stats().collections == 1);
    }

    #[test]
    fn live_set_too_big_is_out_of_memory() {
        let mut arena = small();
        let mut list = Value::Nil;
        let result = (0..9).try_for_each(|n| {
            arena.push(list)?;
            let cell = arena.cons(Value::Integer(n), list)?;
            arena.pop("test")?;
            list = Value::Cons(cell);
            Ok::<_, Error>(())
        });
        let_assert!(Err(Error::OutOfMemory) = result);
    }

    #[test]
    fn equal_compares_structure() {
        let mut arena = small();
        let a = arena.list(&mut [Value::Integer(1), Value::Integer(2)]).unwrap();
        let b = arena.list(&mut [Value::Integer(1), Value::Integer(2)]).unwrap();
        let c = arena.list(&mut [Value::Integer(1)]).unwrap();
        check!(a != b);
        check!(arena.equal(a, b).unwrap());
        check!(!arena.equal(a, c).unwrap());
    }

    #[derive(Arbitrary, Debug)]
    enum Shape {
        Leaf(u8),
        Pair(Box<Shape>, Box<Shape>),
    }

    impl Shape {
        fn cells(&self) -> usize {
            match self {
                Shape::Leaf(_) => 0,
                Shape::Pair(car, cdr) => 1 + car.cells() + cdr.cells(),
            }
        }
    }

    fn build(arena: &mut Arena, shape: &Shape) -> Result<Value, Error> {
        match shape {
            Shape::Leaf(n) => Ok(Value::Integer(*n as u64)),
            Shape::Pair(car, cdr) => {
                let car = build(arena, car)?;
                arena.push(car)?;
                let cdr = build(arena, cdr)?;
                let car = arena.pop("build")?;
                Ok(Value::Cons(arena.cons(car, cdr)?))
            }
        }
    }

    // structure reachable from the stack survives any number of collections
    #[test]
    fn collection_is_transparent() {
        arbtest(|u| {
            let shapes: Vec<Shape> = u.arbitrary()?;
            if shapes.len() > 500 || shapes.iter().map(Shape::cells).sum::<usize>() > 1000 {
                return Ok(());
            }
            let mut arena = Arena::new(Layout { memory_words: 1 << 13 });
            let mut reference = Arena::new(Layout { memory_words: 1 << 13 });

            for shape in &shapes {
                let value = build(&mut arena, shape).unwrap();
                arena.push(value).unwrap();
                let expected = build(&mut reference, shape).unwrap();
                reference.push(expected).unwrap();
                if u.arbitrary()? {
                    arena.collect();
                }
            }
            arena.collect();

            for (&got, &expected) in arena.stack().iter().zip(reference.stack()) {
                let got = crate::printer::render(&arena, got, 1000).unwrap();
                let expected = crate::printer::render(&reference, expected, 1000).unwrap();
                check!(got == expected);
            }
            Ok(())
        })
        .size_max(1 << 12);
    }
}
