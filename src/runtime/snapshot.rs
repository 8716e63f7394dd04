//! Sparse memory image of the host runtime
//!
//! A [`HeapSnapshot`] stands in for live memory when the pipeline does not
//! run inside the host process. The host dumps the words it knows the
//! pipeline will read (type descriptors, boxed constants, strings) and the
//! pipeline reads them back through [`RuntimeIntrospection`].

use super::{
    RuntimeIntrospection, CONTAINER_ELTYPE_PARAM, DATATYPE_FLAGS_OFFSET,
    DATATYPE_LAYOUT_OFFSET, DATATYPE_PARAMETERS_OFFSET, STRING_TAG,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Word-addressed memory image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapSnapshot {
    /// Aligned address → word
    words: BTreeMap<u64, u64>,
}

impl HeapSnapshot {
    /// Empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an image from JSON
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(format!("heap snapshot: {}", e)))
    }

    /// Load an image from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&text)
    }

    /// Number of words in the image
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True if no word was recorded
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Store one word at an 8-byte aligned address
    pub fn write_word(&mut self, addr: u64, value: u64) {
        debug_assert_eq!(addr % 8, 0, "unaligned word write at 0x{:x}", addr);
        self.words.insert(addr & !7, value);
    }

    /// Store raw bytes starting at any address
    pub fn write_bytes(&mut self, addr: u64, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            let a = addr + i as u64;
            let shift = (a & 7) * 8;
            let word = self.words.entry(a & !7).or_insert(0);
            *word = (*word & !(0xff << shift)) | ((b as u64) << shift);
        }
    }

    /// Record a type descriptor with an inline size and flag bits
    pub fn define_datatype(&mut self, addr: u64, size: u64, flags: u64) {
        let layout = addr + 0x100;
        self.write_word(addr + DATATYPE_LAYOUT_OFFSET, layout);
        self.write_word(addr + DATATYPE_FLAGS_OFFSET, flags);
        self.write_word(layout, size);
    }

    /// Record a container type whose element type is described at `eltype`
    pub fn define_container_type(&mut self, addr: u64, eltype: u64) {
        let params = addr + 0x80;
        self.write_word(addr + DATATYPE_PARAMETERS_OFFSET, params);
        self.write_word(params, 3);
        self.write_word(params + 8 * (1 + CONTAINER_ELTYPE_PARAM), eltype);
    }

    /// Record a string object at `addr` (header word at `addr - 8`)
    pub fn define_string(&mut self, addr: u64, text: &str) {
        self.write_word(addr - 8, STRING_TAG);
        self.write_word(addr, text.len() as u64);
        self.write_bytes(addr + 8, text.as_bytes());
    }

    /// Record a boxed value of type `datatype` at `addr`
    pub fn define_boxed(&mut self, addr: u64, datatype: u64, bytes: &[u8]) {
        self.write_word(addr - 8, datatype);
        self.write_bytes(addr, bytes);
    }
}

impl RuntimeIntrospection for HeapSnapshot {
    fn read_word(&self, addr: u64) -> Option<u64> {
        if addr % 8 == 0 {
            return self.words.get(&addr).copied();
        }
        let bytes = self.read_bytes(addr, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Some(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerLayout, FLAG_MUTABLE};

    #[test]
    fn test_bytes_round_trip_unaligned() {
        let mut heap = HeapSnapshot::new();
        heap.write_bytes(0x1003, b"hello, world");
        assert_eq!(heap.read_bytes(0x1003, 12).unwrap(), b"hello, world");
        assert_eq!(heap.read_bytes(0x2000, 1), None);
    }

    #[test]
    fn test_layout_walk_inline() {
        let mut heap = HeapSnapshot::new();
        heap.define_datatype(0x5000, 8, 0);
        heap.define_container_type(0x9000, 0x5000);
        assert_eq!(heap.read_layout(0x9000), Some(ContainerLayout::inline(8)));
    }

    #[test]
    fn test_layout_walk_mutable() {
        let mut heap = HeapSnapshot::new();
        heap.define_datatype(0x5000, 24, FLAG_MUTABLE);
        heap.define_container_type(0x9000, 0x5000);
        let layout = heap.read_layout(0x9000).unwrap();
        assert!(layout.needs_zero_fill());
        assert_eq!(layout.element_size, 0);
    }

    #[test]
    fn test_json_round_trip() {
        let mut heap = HeapSnapshot::new();
        heap.define_string(0x4008, "abc");
        let text = serde_json::to_string(&heap).unwrap();
        assert_eq!(HeapSnapshot::from_json(&text).unwrap(), heap);
    }
}
