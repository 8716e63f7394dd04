//! Best-effort reconstruction of heap values from raw memory

use super::{RuntimeIntrospection, Value, SMALL_TAG_LIMIT, STRING_TAG};

/// Largest object the reconstruction will copy out of memory
const MAX_RECONSTRUCTED_SIZE: u64 = 1 << 20;

/// Rebuild the value stored at `address`.
///
/// Strings are recognized by their small type tag; any other tag large
/// enough to be a type descriptor pointer is read as a fixed-layout value of
/// that type's inline size. Everything else yields `None`.
pub fn reconstruct(runtime: &dyn RuntimeIntrospection, address: u64) -> Option<Value> {
    let tag = runtime.read_tag(address)?;

    if tag == STRING_TAG {
        let len = runtime.read_word(address)?;
        if len > MAX_RECONSTRUCTED_SIZE {
            return None;
        }
        let bytes = runtime.read_bytes(address.checked_add(8)?, len as usize)?;
        return Some(Value::Str {
            value: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }

    if tag > SMALL_TAG_LIMIT {
        let size = runtime.datatype_size(tag)?;
        if size == 0 || size > MAX_RECONSTRUCTED_SIZE {
            return None;
        }
        let bytes = runtime.read_bytes(address, size as usize)?;
        return Some(Value::Bytes {
            type_name: format!("type@0x{:x}", tag),
            bytes,
        });
    }

    None
}
