//! # Statify - static IR from a JIT runtime
//!
//! Turns the IR a managed runtime's JIT emits for a closed set of functions
//! into self-contained `.ir` files that a native toolchain can compile and
//! link without the runtime: no garbage collector, no shadow-stack frames,
//! no pointers into the live heap.
//!
//! ## Quick Start
//!
//! ```rust
//! use statify::host::{FlatMangler, Namespace, RecordedFunction, RecordedHost};
//! use statify::runtime::HeapSnapshot;
//! use statify::{Pipeline, PipelineConfig};
//!
//! # fn main() -> statify::Result<()> {
//! let mut host = RecordedHost::new();
//! let entry = host.add(RecordedFunction {
//!     name: "answer".into(),
//!     namespace: "Main".into(),
//!     argument_types: vec![],
//!     callees: vec![],
//!     ir: "define i64 @julia_answer_1() #0 {\ntop:\n  ret i64 42\n}\n".into(),
//!     compiled: true,
//! });
//!
//! let heap = HeapSnapshot::new();
//! let pipeline = Pipeline::new(PipelineConfig::default(), &FlatMangler, &heap);
//! let (assembly, report) = pipeline.assemble(&mut host, &Namespace::new("Main"), entry)?;
//!
//! let ir = assembly.functions[0].extracted_ir.as_ref().unwrap();
//! assert!(ir.function_headers[0].starts_with("define i64 @main()"));
//! assert_eq!(report.exit_code(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Namespace tree ─▶ collect_bindings ─┐
//! HostCompiler ──▶ collect_call_graph ┴▶ extract ─▶ GcPass ─▶ ContainerPass
//!                                                               │
//!                      Emitter ◀── Assembler (per namespace) ◀──┘
//! ```
//!
//! ### Main Components
//!
//! - [`collect`] - binding and call-graph discovery, value encoding
//! - [`extract`] - splits one IR dump into definitions, aliases and declarations
//! - [`passes`] - GC elimination and the container rewrite
//! - [`assemble`] - groups functions and bindings by namespace, resolves aliases
//! - [`emit`] - writes the modules, touching only files whose content changed
//! - [`runtime`] - read access to the runtime's memory and heap reconstruction
//! - [`host`] - the compiler and naming interfaces, plus a recorded host
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result<T>`]. Errors are classified by
//! [`Error::classify`]: fatal errors abort the run before anything is
//! written, soft ones end up in [`RunReport::diagnostics`] and make
//! [`RunReport::exit_code`] non-zero.

pub mod assemble;
pub mod collect;
pub mod config;
pub mod emit;
pub mod error;
pub mod extract;
pub mod host;
pub mod ir;
pub mod passes;
pub mod pipeline;
pub mod runtime;

// Re-export main types
pub use assemble::{Assembler, Assembly, CompiledFunction, FunctionPreparer, NamespaceModule};
pub use config::{GcPolicy, PipelineConfig};
pub use emit::{write_if_changed, Emitter, WriteStatus};
pub use error::{Error, ErrorSeverity, Result};
pub use extract::{extract, AddressTable, ExtractTarget, ExtractedIR};
pub use pipeline::{Pipeline, RunReport};
