//! Error types for the statify pipeline

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Discovery errors
    /// A binding's value has no known IR encoding
    ///
    /// **Triggered by:** externalizing a cell that holds a symbol, a closure or
    /// any value without a fixed bit layout
    /// **Recovery:** Classified as Recoverable - the binding may be skipped
    #[error("Unsupported value type for `{identifier}`: {type_name}")]
    UnsupportedValueType {
        /// Binding (or reconstructed global) name
        identifier: String,
        /// Runtime type of the rejected value
        type_name: String,
    },

    /// A function handle that the host does not know about
    #[error("Unknown function handle: {0}")]
    UnknownFunction(u32),

    // Extraction errors
    /// No definition for the expected function in its IR dump
    ///
    /// **Triggered by:** call-graph discovery and the emitted IR disagreeing on
    /// the compiled name of a function
    #[error("Function `{function}` has no matching definition in its IR dump")]
    FunctionNotFound {
        /// Friendly name of the function that was looked up
        function: String,
    },

    // Rewrite errors
    /// A GC or container idiom was recognized but did not have the exact
    /// expected shape
    ///
    /// **Triggered by:** a container load without an assignment, a missing
    /// null check, or a branch in an unexpected form
    #[error("Malformed {construct} in `{function}`: {detail}")]
    MalformedConstructPattern {
        /// Function whose body contains the idiom
        function: String,
        /// Which construct was being rewritten
        construct: String,
        /// What did not match
        detail: String,
    },

    /// One container type symbol observed with two different layouts
    #[error("Container type {symbol} used with inconsistent layouts in `{namespace}`")]
    InconsistentContainerLayout {
        /// Container type symbol
        symbol: String,
        /// Namespace module in which the clash was found
        namespace: String,
    },

    /// Live memory could not be read
    #[error("Runtime read failed at 0x{address:x}: {what}")]
    RuntimeRead {
        /// Address that was read
        address: u64,
        /// What the read was for
        what: String,
    },

    // Soft conditions
    /// Heap reconstruction failed for an address referenced by a function
    #[error("No binding for address 0x{address:x} referenced by `{function}`")]
    MissingBindingForAddress {
        /// Referencing function
        function: String,
        /// Unresolved address
        address: u64,
    },

    /// Function IR still depends on runtime internals
    #[error("Function `{function}` is not self-contained: {reason}")]
    NonSelfContainedCode {
        /// Offending function
        function: String,
        /// First offending construct
        reason: String,
    },

    /// Two outputs of one run map to the same file
    ///
    /// **Triggered by:** a namespace whose globals file has the same stem as
    /// a function's output symbol
    #[error("Output file {path} would be written by both {first} and {second}")]
    OutputCollision {
        /// Colliding path
        path: String,
        /// Output planned first
        first: String,
        /// Output planned second
        second: String,
    },

    // Environment errors
    /// Filesystem failure
    #[error("I/O error on {path}: {message}")]
    Io {
        /// Path being read or written
        path: String,
        /// Underlying error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reported by the host compiler
    #[error("Host error: {0}")]
    Host(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Aborts the whole run, nothing is written
    Fatal,
    /// Affects a single item that the caller may choose to skip
    Recoverable,
    /// Reported at the end of the run; forces a non-zero exit
    Warning,
}

impl Error {
    /// Create an I/O error for a path
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Create a malformed-construct error
    pub fn malformed(
        function: impl Into<String>,
        construct: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Error::MalformedConstructPattern {
            function: function.into(),
            construct: construct.into(),
            detail: detail.into(),
        }
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::UnsupportedValueType { .. } => ErrorSeverity::Recoverable,

            Error::MissingBindingForAddress { .. } => ErrorSeverity::Warning,
            Error::NonSelfContainedCode { .. } => ErrorSeverity::Warning,

            _ => ErrorSeverity::Fatal,
        }
    }

    /// True for conditions that are collected instead of aborting
    pub fn is_soft(&self) -> bool {
        self.classify() == ErrorSeverity::Warning
    }
}

/// Result type for statify operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert_eq!(
            Error::FunctionNotFound {
                function: "f".into()
            }
            .classify(),
            ErrorSeverity::Fatal
        );
        assert!(Error::MissingBindingForAddress {
            function: "f".into(),
            address: 16
        }
        .is_soft());
        assert_eq!(
            Error::UnsupportedValueType {
                identifier: "x".into(),
                type_name: "Symbol".into()
            }
            .classify(),
            ErrorSeverity::Recoverable
        );
    }

    #[test]
    fn test_display_addresses_in_hex() {
        let err = Error::RuntimeRead {
            address: 0xdead,
            what: "layout".into(),
        };
        assert!(err.to_string().contains("0xdead"));
    }
}
