//! IR encoding of binding values

use crate::ir::symbols::global_symbol;
use crate::runtime::Value;
use crate::{Error, Result};

/// Type, initializer and alignment of an encoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    /// IR type, e.g. `i64` or `[12 x i8]`
    pub ir_type: String,
    /// Constant initializer
    pub initializer: String,
    /// Alignment in bytes
    pub align: u64,
}

impl EncodedValue {
    /// `@sym = global <ty> <init>, align <a>`
    pub fn definition(&self, symbol: &str) -> String {
        format!(
            "{} = global {} {}, align {}",
            global_symbol(symbol),
            self.ir_type,
            self.initializer,
            self.align
        )
    }

    /// `@sym = external global <ty>, align <a>`
    pub fn declaration(&self, symbol: &str) -> String {
        format!(
            "{} = external global {}, align {}",
            global_symbol(symbol),
            self.ir_type,
            self.align
        )
    }
}

/// Encode a value as a static initializer
pub fn encode_value(identifier: &str, value: &Value) -> Result<EncodedValue> {
    let unsupported = || Error::UnsupportedValueType {
        identifier: identifier.to_string(),
        type_name: value.type_name(),
    };

    let encoded = match value {
        Value::Int { bits, value } => {
            if *bits == 0 || *bits > 128 {
                return Err(unsupported());
            }
            EncodedValue {
                ir_type: format!("i{}", bits),
                initializer: value.to_string(),
                align: (*bits as u64 / 8).clamp(1, 16),
            }
        }
        Value::Bool { value } => EncodedValue {
            ir_type: "i8".to_string(),
            initializer: if *value { "1" } else { "0" }.to_string(),
            align: 1,
        },
        Value::Float32 { value } => EncodedValue {
            ir_type: "float".to_string(),
            initializer: format!("0x{:016X}", (*value as f64).to_bits()),
            align: 4,
        },
        Value::Float64 { value } => EncodedValue {
            ir_type: "double".to_string(),
            initializer: format!("0x{:016X}", value.to_bits()),
            align: 8,
        },
        Value::Pointer { address } => {
            let initializer = if *address == 0 {
                "null".to_string()
            } else {
                tracing::warn!(
                    "binding `{}` holds a raw pointer 0x{:x}; the output will not be self-contained",
                    identifier,
                    address
                );
                format!("inttoptr (i64 {} to ptr)", address)
            };
            EncodedValue {
                ir_type: "ptr".to_string(),
                initializer,
                align: 8,
            }
        }
        Value::Bytes { bytes, .. } => byte_array(bytes),
        Value::Str { value } => byte_array(value.as_bytes()),
        Value::Function { .. } | Value::Type { .. } | Value::Opaque { .. } => {
            return Err(unsupported())
        }
    };

    Ok(encoded)
}

/// Encode a value as `(definition, declaration)` under `symbol`
pub fn encode_scalar_or_aggregate(symbol: &str, value: &Value) -> Result<(String, String)> {
    let encoded = encode_value(symbol, value)?;
    Ok((encoded.definition(symbol), encoded.declaration(symbol)))
}

fn byte_array(bytes: &[u8]) -> EncodedValue {
    let initializer = if bytes.is_empty() {
        "zeroinitializer".to_string()
    } else {
        format!("c\"{}\"", escape_bytes(bytes))
    };
    EncodedValue {
        ir_type: format!("[{} x i8]", bytes.len()),
        initializer,
        align: 8,
    }
}

/// Escape bytes for an IR `c"..."` string constant
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\{:02X}", b));
        }
    }
    out
}
