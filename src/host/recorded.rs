//! A recorded host: function metadata and IR dumps captured ahead of time
//!
//! Useful when the pipeline runs outside the runtime's process, and as the
//! host for tests.

use super::{FunctionHandle, FunctionInfo, FunctionTable, HostCompiler, NamespacePath};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One recorded function signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFunction {
    /// Display name
    pub name: String,
    /// Owning namespace, dotted
    pub namespace: String,
    /// Argument types
    #[serde(default)]
    pub argument_types: Vec<String>,
    /// Indices of callee functions in the recording
    #[serde(default)]
    pub callees: Vec<usize>,
    /// IR dump emitted for this signature
    pub ir: String,
    /// Already compiled when the recording was taken
    #[serde(default)]
    pub compiled: bool,
}

/// On-disk form of a recording; callees are positions in `functions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recording {
    pub functions: Vec<RecordedFunction>,
}

/// Host backed by a recording.
///
/// Signatures are interned in a [`FunctionTable`]; a handle is the position
/// of its function in the recording. Adding a signature that is already
/// recorded replaces the earlier recording and keeps its handle.
#[derive(Debug, Clone, Default)]
pub struct RecordedHost {
    functions: Vec<RecordedFunction>,
    table: FunctionTable,
    /// Functions compiled on demand during this session, in order
    pub compiled_on_demand: Vec<FunctionHandle>,
}

impl RecordedHost {
    /// Empty recording
    pub fn new() -> Self {
        Self::default()
    }

    /// Host over a recording, with callee positions mapped to handles
    pub fn from_recording(recording: Recording) -> Result<Self> {
        let mut host = Self::new();
        let handles: Vec<FunctionHandle> = recording
            .functions
            .iter()
            .map(|f| host.add(RecordedFunction { callees: Vec::new(), ..f.clone() }))
            .collect();
        for (position, function) in recording.functions.iter().enumerate() {
            for &callee in &function.callees {
                let target = handles
                    .get(callee)
                    .copied()
                    .ok_or(Error::UnknownFunction(callee as u32))?;
                host.add_callee(handles[position], target);
            }
        }
        Ok(host)
    }

    /// Parse a recording from JSON
    pub fn from_json(text: &str) -> Result<Self> {
        let recording: Recording = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("host recording: {}", e)))?;
        Self::from_recording(recording)
    }

    /// Load a recording from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&text)
    }

    /// The recording, with callees as handle positions
    pub fn to_recording(&self) -> Recording {
        Recording {
            functions: self.functions.clone(),
        }
    }

    /// Add a function and return the handle of its signature
    pub fn add(&mut self, function: RecordedFunction) -> FunctionHandle {
        let handle = self.table.intern(FunctionInfo {
            name: function.name.clone(),
            namespace: NamespacePath::parse(&function.namespace),
            argument_types: function.argument_types.clone(),
        });
        match self.functions.get_mut(handle.0 as usize) {
            Some(existing) => *existing = function,
            None => self.functions.push(function),
        }
        handle
    }

    /// Record that `caller` embeds `callee`
    pub fn add_callee(&mut self, caller: FunctionHandle, callee: FunctionHandle) {
        if let Some(f) = self.functions.get_mut(caller.0 as usize) {
            f.callees.push(callee.0 as usize);
        }
    }

    /// First function with the given display name
    pub fn handle_of(&self, name: &str) -> Option<FunctionHandle> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FunctionHandle(i as u32))
    }

    /// Number of recorded signatures
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn get(&self, function: FunctionHandle) -> Result<&RecordedFunction> {
        self.functions
            .get(function.0 as usize)
            .ok_or(Error::UnknownFunction(function.0))
    }
}

impl HostCompiler for RecordedHost {
    fn describe(&self, function: FunctionHandle) -> Result<FunctionInfo> {
        self.table
            .get(function)
            .cloned()
            .ok_or(Error::UnknownFunction(function.0))
    }

    fn callees(&self, function: FunctionHandle) -> Result<Vec<FunctionHandle>> {
        let f = self.get(function)?;
        f.callees
            .iter()
            .map(|&idx| {
                if idx < self.functions.len() {
                    Ok(FunctionHandle(idx as u32))
                } else {
                    Err(Error::UnknownFunction(idx as u32))
                }
            })
            .collect()
    }

    fn ensure_compiled(&mut self, function: FunctionHandle) -> Result<()> {
        let f = self
            .functions
            .get_mut(function.0 as usize)
            .ok_or(Error::UnknownFunction(function.0))?;
        if !f.compiled {
            f.compiled = true;
            self.compiled_on_demand.push(function);
        }
        Ok(())
    }

    fn emit_ir(&self, function: FunctionHandle) -> Result<String> {
        let f = self.get(function)?;
        if !f.compiled {
            return Err(Error::Host(format!("`{}` was never compiled", f.name)));
        }
        Ok(f.ir.clone())
    }
}
