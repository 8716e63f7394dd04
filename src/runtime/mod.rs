//! # Runtime introspection
//!
//! Everything the pipeline learns from the host runtime's memory goes
//! through [`RuntimeIntrospection`]. Implementations only have to provide
//! word reads; the tag lookup and the container layout walk are built on top
//! of them with fixed offsets into the runtime's type descriptors.
//!
//! ```text
//! container type ──+16──▶ parameters svec ──+16──▶ element type
//!                                                    │  +48 flags word
//!                                                    └─ +40 layout ──▶ size word
//! ```

pub mod heap;
pub mod snapshot;
pub mod value;

pub use heap::reconstruct;
pub use snapshot::HeapSnapshot;
pub use value::Value;

use serde::{Deserialize, Serialize};

/// Tag bits stored in the low nibble of an object's header word
pub const TAG_MASK: u64 = !0xf;
/// Small type tag of the runtime's string type (already shifted)
pub const STRING_TAG: u64 = 20 << 4;
/// Tags below this are small type tags, not type descriptor pointers
pub const SMALL_TAG_LIMIT: u64 = 64 << 4;

/// Offset of the parameter vector in a type descriptor
pub const DATATYPE_PARAMETERS_OFFSET: u64 = 16;
/// Offset of the layout pointer in a type descriptor
pub const DATATYPE_LAYOUT_OFFSET: u64 = 40;
/// Offset of the flags word in a type descriptor
pub const DATATYPE_FLAGS_OFFSET: u64 = 48;
/// Parameter index of the element type of the container type
pub const CONTAINER_ELTYPE_PARAM: u64 = 1;

/// Flag bit: the type is abstract
pub const FLAG_ABSTRACT: u64 = 0x1;
/// Flag bit: the type is mutable
pub const FLAG_MUTABLE: u64 = 0x2;

/// Element layout of a container type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLayout {
    /// Elements are mutable or abstract objects stored by reference
    pub mutable_or_abstract: bool,
    /// Inline element size in bytes; 0 when `mutable_or_abstract`
    pub element_size: u64,
}

impl ContainerLayout {
    /// Layout of a container of inline fixed-size elements
    pub fn inline(element_size: u64) -> Self {
        Self {
            mutable_or_abstract: false,
            element_size,
        }
    }

    /// Layout of a container of boxed elements
    pub fn boxed() -> Self {
        Self {
            mutable_or_abstract: true,
            element_size: 0,
        }
    }

    /// Payload must be zero-filled with `calloc`
    pub fn needs_zero_fill(&self) -> bool {
        self.mutable_or_abstract
    }
}

/// Read access to the host runtime's memory
pub trait RuntimeIntrospection {
    /// Read one 8-byte little-endian word
    fn read_word(&self, addr: u64) -> Option<u64>;

    /// Read `len` raw bytes
    fn read_bytes(&self, addr: u64, len: usize) -> Option<Vec<u8>> {
        (0..len as u64)
            .map(|i| {
                let a = addr.checked_add(i)?;
                let word = self.read_word(a & !7)?;
                Some((word >> ((a & 7) * 8)) as u8)
            })
            .collect()
    }

    /// Type tag of the object at `addr` (header word just before it)
    fn read_tag(&self, addr: u64) -> Option<u64> {
        self.read_word(addr.checked_sub(8)?).map(|w| w & TAG_MASK)
    }

    /// Inline size of values of the type described at `datatype`
    fn datatype_size(&self, datatype: u64) -> Option<u64> {
        let layout = self.read_word(datatype.checked_add(DATATYPE_LAYOUT_OFFSET)?)?;
        if layout == 0 {
            return None;
        }
        self.read_word(layout).map(|w| w & 0xffff_ffff)
    }

    /// Element layout of the container type described at `type_addr`
    fn read_layout(&self, type_addr: u64) -> Option<ContainerLayout> {
        let params = self.read_word(type_addr.checked_add(DATATYPE_PARAMETERS_OFFSET)?)?;
        // svec: length word, then elements
        let eltype = self.read_word(params.checked_add(8 * (1 + CONTAINER_ELTYPE_PARAM))?)?;
        let flags = self.read_word(eltype.checked_add(DATATYPE_FLAGS_OFFSET)?)?;
        if flags & (FLAG_ABSTRACT | FLAG_MUTABLE) != 0 {
            return Some(ContainerLayout::boxed());
        }
        Some(ContainerLayout::inline(self.datatype_size(eltype)?))
    }
}
