//! The name table: one contiguous run of null-terminated names
//!
//! Lookup is a linear scan and the table never shrinks. A name is identified
//! by the byte offset of its first character.
use super::value::NameRef;

#[derive(Default)]
pub struct Dictionary {
    bytes: Vec<u8>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes used, terminators included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes the table would occupy after appending `name`.
    pub fn len_with(&self, name: &[u8]) -> usize {
        self.bytes.len() + name.len() + 1
    }

    pub fn find(&self, name: &[u8]) -> Option<NameRef> {
        self.entries()
            .find(|(_, entry)| *entry == name)
            .map(|(offset, _)| offset)
    }

    /// Append without checking for an existing entry.
    pub fn append(&mut self, name: &[u8]) -> NameRef {
        debug_assert!(!name.contains(&0), "names cannot contain NUL");
        let offset = NameRef(self.bytes.len() as u32);
        self.bytes.extend_from_slice(name);
        self.bytes.push(0);
        offset
    }

    pub fn name(&self, name: NameRef) -> &[u8] {
        let rest = self.bytes.get(name.0 as usize..).unwrap_or_default();
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        &rest[..end]
    }

    pub fn entries(&self) -> impl Iterator<Item = (NameRef, &[u8])> + '_ {
        let mut offset = 0;
        self.bytes.split(|&b| b == 0).filter_map(move |entry| {
            let here = offset;
            offset += entry.len() + 1;
            // the split after the final terminator yields one empty piece
            (here < self.bytes.len()).then_some((NameRef(here as u32), entry))
        })
    }
}
