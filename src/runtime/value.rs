//! Runtime values as seen by the pipeline

use serde::{Deserialize, Serialize};

/// A value read from the host runtime, either from a namespace binding or
/// reconstructed from raw memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Value {
    /// Fixed-width integer (signed or unsigned, stored widened)
    Int {
        /// Bit width (8, 16, 32, 64 or 128)
        bits: u16,
        /// Numeric value
        value: i128,
    },
    /// 32-bit float
    Float32 {
        /// Numeric value
        value: f32,
    },
    /// 64-bit float
    Float64 {
        /// Numeric value
        value: f64,
    },
    /// Boolean, one byte in memory
    Bool {
        /// Truth value
        value: bool,
    },
    /// Raw pointer
    Pointer {
        /// Address
        address: u64,
    },
    /// Fixed-size opaque byte layout of a structured value
    Bytes {
        /// Name of the value's type
        type_name: String,
        /// Memory image of the value
        bytes: Vec<u8>,
    },
    /// String contents
    Str {
        /// Text
        value: String,
    },
    /// A function object
    Function {
        /// Function name
        name: String,
    },
    /// A type object
    Type {
        /// Type name
        name: String,
    },
    /// Any other object without a fixed bit layout
    Opaque {
        /// Name of the value's type
        type_name: String,
    },
}

impl Value {
    /// Convenience constructor for a 64-bit integer
    pub fn int64(value: i64) -> Self {
        Value::Int {
            bits: 64,
            value: value as i128,
        }
    }

    /// Type name for diagnostics
    pub fn type_name(&self) -> String {
        match self {
            Value::Int { bits, .. } => format!("Int{}", bits),
            Value::Float32 { .. } => "Float32".to_string(),
            Value::Float64 { .. } => "Float64".to_string(),
            Value::Bool { .. } => "Bool".to_string(),
            Value::Pointer { .. } => "Ptr".to_string(),
            Value::Bytes { type_name, .. } => type_name.clone(),
            Value::Str { .. } => "String".to_string(),
            Value::Function { name } => format!("typeof({})", name),
            Value::Type { .. } => "DataType".to_string(),
            Value::Opaque { type_name } => type_name.clone(),
        }
    }

    /// Functions, types and strings are never externalized as bindings
    pub fn is_externalizable(&self) -> bool {
        !matches!(
            self,
            Value::Function { .. } | Value::Type { .. } | Value::Str { .. }
        )
    }
}
